//! The streaming transport seam.
//!
//! A [`Transport`] turns conversation history into a cancelable stream of [`StreamEvent`]s.
//! [`CompletionClient`](crate::CompletionClient) is the HTTP implementation;
//! [`ScriptedTransport`] replays canned events and records what it was asked to send.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{ApiMessage, Role, StreamEvent};

/// A boxed stream of transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Something that can stream a chat completion.
pub trait Transport {
    /// Start streaming a completion for `history`.
    ///
    /// `history` must be non-empty and end with a user turn.  Failures, including invalid
    /// history, arrive as a `StreamEvent::Error`.  When `cancel` fires the stream ends without
    /// emitting anything further and without reporting an error.
    fn open(&self, history: Vec<ApiMessage>, cancel: CancellationToken) -> EventStream;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self, history: Vec<ApiMessage>, cancel: CancellationToken) -> EventStream {
        (**self).open(history, cancel)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&self, history: Vec<ApiMessage>, cancel: CancellationToken) -> EventStream {
        (**self).open(history, cancel)
    }
}

/// Check that `history` is something a transport may send.
pub fn validate_history(history: &[ApiMessage]) -> Result<()> {
    match history.last() {
        None => Err(Error::validation(
            "conversation history is empty",
            Some("messages".to_string()),
        )),
        Some(last) if last.role != Role::User => Err(Error::validation(
            "conversation history must end with a user turn",
            Some("messages".to_string()),
        )),
        Some(_) => Ok(()),
    }
}

///////////////////////////////////////// Scripted /////////////////////////////////////////

struct Script {
    events: Vec<StreamEvent>,
    hang: bool,
}

#[derive(Default)]
struct ScriptState {
    scripts: VecDeque<Script>,
    requests: Vec<Vec<ApiMessage>>,
    live: usize,
    max_live: usize,
}

/// A transport that replays queued scripts, one per `open`.
///
/// Clones share state, so a test can keep a handle after moving the transport into a
/// controller.  When no script is queued, `open` returns a stream that never yields.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Creates a transport with no scripts queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script whose stream ends after `events`.
    pub fn push_script(&self, events: impl IntoIterator<Item = StreamEvent>) {
        self.lock().scripts.push_back(Script {
            events: events.into_iter().collect(),
            hang: false,
        });
    }

    /// Queue a script whose stream yields `events` and then stays open.
    pub fn push_hanging_script(&self, events: impl IntoIterator<Item = StreamEvent>) {
        self.lock().scripts.push_back(Script {
            events: events.into_iter().collect(),
            hang: true,
        });
    }

    /// Histories passed to `open`, oldest first.
    pub fn requests(&self) -> Vec<Vec<ApiMessage>> {
        self.lock().requests.clone()
    }

    /// Number of times `open` was called.
    pub fn open_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Streams opened and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.lock().live
    }

    /// Highest number of simultaneously live streams observed.
    pub fn max_live_streams(&self) -> usize {
        self.lock().max_live
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, history: Vec<ApiMessage>, cancel: CancellationToken) -> EventStream {
        let mut state = self.lock();
        state.requests.push(history.clone());
        state.live += 1;
        state.max_live = state.max_live.max(state.live);
        let script = match validate_history(&history) {
            Ok(()) => state.scripts.pop_front().unwrap_or(Script {
                events: Vec::new(),
                hang: true,
            }),
            Err(err) => Script {
                events: vec![StreamEvent::Error(err.message().to_string())],
                hang: false,
            },
        };
        drop(state);
        Box::pin(ScriptedStream {
            events: script.events.into(),
            hang: script.hang,
            cancel,
            _guard: LiveGuard {
                state: Arc::clone(&self.state),
            },
        })
    }
}

struct LiveGuard {
    state: Arc<Mutex<ScriptState>>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.live = state.live.saturating_sub(1);
    }
}

struct ScriptedStream {
    events: VecDeque<StreamEvent>,
    hang: bool,
    cancel: CancellationToken,
    _guard: LiveGuard,
}

impl Stream for ScriptedStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        match self.events.pop_front() {
            Some(event) => Poll::Ready(Some(event)),
            None if self.hang => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn validate_history_rules() {
        assert!(validate_history(&[]).unwrap_err().is_validation());
        assert!(validate_history(&[ApiMessage::assistant("hi")]).is_err());
        assert!(validate_history(&[ApiMessage::assistant("hi"), ApiMessage::user("yo")]).is_ok());
    }

    #[tokio::test]
    async fn scripted_replay_and_bookkeeping() {
        let transport = ScriptedTransport::new();
        transport.push_script([StreamEvent::Chunk("a".to_string()), StreamEvent::Complete]);

        let stream = transport.open(vec![ApiMessage::user("q")], CancellationToken::new());
        assert_eq!(transport.live_streams(), 1);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("a".to_string()), StreamEvent::Complete]
        );
        assert_eq!(transport.live_streams(), 0);
        assert_eq!(transport.max_live_streams(), 1);
        assert_eq!(transport.requests(), vec![vec![ApiMessage::user("q")]]);
    }

    #[tokio::test]
    async fn invalid_history_yields_error_event() {
        let transport = ScriptedTransport::new();
        let events: Vec<_> = transport
            .open(Vec::new(), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![StreamEvent::Error("conversation history is empty".to_string())]
        );
    }

    #[tokio::test]
    async fn cancelled_script_ends() {
        let transport = ScriptedTransport::new();
        transport.push_hanging_script([StreamEvent::Chunk("a".to_string())]);
        let cancel = CancellationToken::new();
        let mut stream = transport.open(vec![ApiMessage::user("q")], cancel.clone());
        assert_eq!(stream.next().await, Some(StreamEvent::Chunk("a".to_string())));
        cancel.cancel();
        assert_eq!(stream.next().await, None);
    }
}
