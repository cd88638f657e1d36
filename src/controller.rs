//! The stream lifecycle controller.
//!
//! [`StreamController`] ties a [`Transport`] to a [`ChatStore`].  It owns the single live
//! stream, its cancellation token and the transient buffer of text received so far, and it
//! moves between these states:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Idle      (complete or error)
//!                             \-> Stopped   (cancel)
//! Stopped -> Sending                        (send or redo)
//! ```
//!
//! Nothing happens in the background.  `send` and `redo` open a stream; the caller drives it
//! by awaiting [`StreamController::step`] until it reports something other than a chunk.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability::{
    CONTROLLER_CANCELS, CONTROLLER_COMPLETIONS, CONTROLLER_FAILURES, CONTROLLER_REDOS,
    CONTROLLER_SENDS, STREAM_CHUNKS, STREAM_DURATION, STREAM_TTFB,
};
use crate::storage::Storage;
use crate::store::{ChatStore, session_title_from};
use crate::stream_logger::StreamLogger;
use crate::transport::{EventStream, Transport};
use crate::types::{
    ApiMessage, Attachment, Message, MessageDraft, MessageId, MessagePatch, SessionId,
    StreamEvent,
};

/// Where the controller is in the lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// No stream is open.
    Idle,
    /// A stream is open and nothing has arrived yet.
    Sending,
    /// A stream is open and text is arriving.
    Streaming,
    /// The last stream was cancelled; its partial text is still in the buffer.
    Stopped,
}

/// What a call to [`StreamController::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// No stream was open.
    Idle,
    /// A fragment of text arrived and was appended to the buffer.
    Chunk(String),
    /// The stream finished.  Carries the id of the assistant message holding the reply, or
    /// `None` if the reply was empty.
    Completed(Option<MessageId>),
    /// The stream failed with the given message.
    Failed(String),
}

enum StreamTarget {
    /// Append a new assistant message on completion.
    Append,
    /// Update a placeholder assistant message as text arrives.
    Placeholder(MessageId),
}

struct ActiveStream {
    events: EventStream,
    cancel: CancellationToken,
    target: StreamTarget,
    started: Instant,
    received: bool,
}

/// Orchestrates send, cancel and redo against a transport and a store.
pub struct StreamController<T: Transport, S: Storage> {
    transport: T,
    store: ChatStore<S>,
    status: StreamStatus,
    buffer: String,
    active: Option<ActiveStream>,
    logger: Option<Arc<dyn StreamLogger>>,
}

impl<T: Transport, S: Storage> StreamController<T, S> {
    /// Creates an idle controller.
    pub fn new(transport: T, store: ChatStore<S>) -> Self {
        Self {
            transport,
            store,
            status: StreamStatus::Idle,
            buffer: String::new(),
            active: None,
            logger: None,
        }
    }

    /// Attach a logger that observes requests, events and finished replies.
    pub fn with_logger(mut self, logger: Arc<dyn StreamLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn store(&self) -> &ChatStore<S> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, e.g. to switch models between streams.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Messages of the current session.
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn error(&self) -> Option<&str> {
        self.store.error()
    }

    /// Text received by the current or most recently cancelled stream.
    pub fn streaming_buffer(&self) -> &str {
        &self.buffer
    }

    /// True while a stream is open.
    pub fn is_streaming(&self) -> bool {
        matches!(self.status, StreamStatus::Sending | StreamStatus::Streaming)
    }

    pub fn is_stopped(&self) -> bool {
        self.status == StreamStatus::Stopped
    }

    /// Send a user turn and open a stream for the reply.
    ///
    /// Returns false, changing nothing, when `content` is blank.  An open stream is cancelled
    /// first.
    pub fn send(&mut self, content: &str) -> Result<bool> {
        self.send_with_attachments(content, Vec::new())
    }

    /// Like [`send`](Self::send), with files riding along on the user turn.
    pub fn send_with_attachments(
        &mut self,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }
        self.cancel()?;

        if self.store.current_session().is_none() {
            self.store.create_session(session_title_from(content))?;
        }
        self.store
            .add_message(MessageDraft::user(content).with_attachments(attachments))?;
        let history = self.store.request_history();
        CONTROLLER_SENDS.click();
        self.start(history, StreamTarget::Append);
        Ok(true)
    }

    /// Abort the open stream.
    ///
    /// Returns false when no stream is open.  The buffer keeps the partial text and nothing
    /// new is persisted.  If the stream was a redo, its placeholder keeps the partial text and
    /// is flagged stopped, or is removed when nothing had arrived.
    pub fn cancel(&mut self) -> Result<bool> {
        let Some(active) = self.active.take() else {
            return Ok(false);
        };
        active.cancel.cancel();
        drop(active.events);
        CONTROLLER_CANCELS.click();
        self.status = StreamStatus::Stopped;
        self.store.set_loading(false);

        if let StreamTarget::Placeholder(id) = active.target {
            if self.buffer.is_empty() {
                self.store.remove_message(&id)?;
            } else {
                self.store.update_message(&id, MessagePatch::stopped())?;
            }
        }
        Ok(true)
    }

    /// Regenerate the reply to the last user turn.
    ///
    /// Returns false, changing nothing, when the current session has no user message.  An
    /// open stream is cancelled first.  The previous reply, if any, is flagged stopped and kept
    /// with its content; a new empty assistant message receives the text as it arrives.  The
    /// request ends with the same user turn, which is not duplicated.
    pub fn redo(&mut self) -> Result<bool> {
        if self.store.last_user_message().is_none() {
            return Ok(false);
        }
        self.cancel()?;

        if let Some(previous) = self.store.last_reply_id() {
            self.store.update_message(&previous, MessagePatch::stopped())?;
        }
        let history = self.store.request_history();
        let placeholder = self.store.add_message(MessageDraft::assistant(""))?;
        CONTROLLER_REDOS.click();
        self.start(history, StreamTarget::Placeholder(placeholder));
        Ok(true)
    }

    /// Wait for the next event of the open stream and apply it.
    ///
    /// Returns [`StreamUpdate::Idle`] immediately when no stream is open.  A stream that ends
    /// without a terminal event is treated as complete.  If the store cannot be written the
    /// stream is torn down and the failure is reported as [`StreamUpdate::Failed`].
    pub async fn step(&mut self) -> Result<StreamUpdate> {
        let Some(active) = self.active.as_mut() else {
            return Ok(StreamUpdate::Idle);
        };
        let event = active.events.next().await.unwrap_or(StreamEvent::Complete);
        if let Some(logger) = &self.logger {
            logger.log_stream_event(&event);
        }
        let applied = match event {
            StreamEvent::Chunk(text) => Ok(self.apply_chunk(text)),
            StreamEvent::Complete => self.finish(),
            StreamEvent::Error(message) => self.fail(message),
        };
        Ok(applied.unwrap_or_else(|err| self.abort(&err)))
    }

    /// Drive the open stream to its end and return the final update.
    pub async fn run_until_idle(&mut self) -> Result<StreamUpdate> {
        loop {
            match self.step().await? {
                StreamUpdate::Chunk(_) => continue,
                update => return Ok(update),
            }
        }
    }

    /// Clear the displayed error.
    pub fn dismiss_error(&mut self) {
        self.store.set_error(None);
    }

    /// Start a new session and make it current, abandoning any open stream.
    pub fn create_session(&mut self, title: impl Into<String>) -> Result<SessionId> {
        self.interrupt()?;
        self.store.create_session(title)
    }

    /// Switch to another session, abandoning any open stream.
    pub fn load_session(&mut self, id: &SessionId) -> Result<bool> {
        if self.store.session(id).is_none() {
            return Ok(false);
        }
        self.interrupt()?;
        self.store.load_session(id)
    }

    /// Delete a session, abandoning any open stream if it is the current one.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<bool> {
        if self.store.current_session_id() == Some(id) {
            self.interrupt()?;
        }
        self.store.delete_session(id)
    }

    pub fn update_session_title(&mut self, id: &SessionId, title: impl Into<String>) -> Result<bool> {
        self.store.update_session_title(id, title)
    }

    /// Empty the current session, abandoning any open stream.
    pub fn clear_history(&mut self) -> Result<()> {
        self.interrupt()?;
        self.store.clear_history()
    }

    fn interrupt(&mut self) -> Result<()> {
        self.cancel()?;
        self.buffer.clear();
        self.status = StreamStatus::Idle;
        Ok(())
    }

    fn start(&mut self, history: Vec<ApiMessage>, target: StreamTarget) {
        self.store.set_error(None);
        self.store.set_loading(true);
        self.buffer.clear();
        self.status = StreamStatus::Sending;
        if let Some(logger) = &self.logger {
            logger.log_request(&history);
        }

        let cancel = CancellationToken::new();
        let events = self.transport.open(history, cancel.clone());
        self.active = Some(ActiveStream {
            events,
            cancel,
            target,
            started: Instant::now(),
            received: false,
        });
    }

    fn apply_chunk(&mut self, text: String) -> StreamUpdate {
        let Some(active) = self.active.as_mut() else {
            return StreamUpdate::Idle;
        };
        if !active.received {
            active.received = true;
            STREAM_TTFB.add(active.started.elapsed().as_secs_f64());
        }
        STREAM_CHUNKS.click();
        self.status = StreamStatus::Streaming;
        self.buffer.push_str(&text);
        // Placeholder text is written once the stream ends or is cancelled.
        if let StreamTarget::Placeholder(id) = &active.target {
            let id = id.clone();
            self.store.stage_message(&id, MessagePatch::content(self.buffer.clone()));
        }
        StreamUpdate::Chunk(text)
    }

    fn finish(&mut self) -> Result<StreamUpdate> {
        let Some(active) = self.active.take() else {
            return Ok(StreamUpdate::Idle);
        };
        STREAM_DURATION.add(active.started.elapsed().as_secs_f64());
        CONTROLLER_COMPLETIONS.click();
        self.status = StreamStatus::Idle;
        self.store.set_loading(false);

        let content = std::mem::take(&mut self.buffer);
        let reply = match active.target {
            StreamTarget::Append if content.is_empty() => None,
            StreamTarget::Append => Some(self.store.add_message(MessageDraft::assistant(content))?),
            StreamTarget::Placeholder(id) if content.is_empty() => {
                self.store.remove_message(&id)?;
                None
            }
            StreamTarget::Placeholder(id) => {
                self.store.update_message(&id, MessagePatch::content(content))?;
                Some(id)
            }
        };

        if let (Some(logger), Some(id)) = (&self.logger, &reply) {
            if let Some(message) = self.store.messages().iter().find(|m| &m.id == id) {
                logger.log_message(message);
            }
        }
        Ok(StreamUpdate::Completed(reply))
    }

    fn fail(&mut self, message: String) -> Result<StreamUpdate> {
        let active = self.active.take();
        if let Some(active) = &active {
            STREAM_DURATION.add(active.started.elapsed().as_secs_f64());
        }
        CONTROLLER_FAILURES.click();
        self.status = StreamStatus::Idle;
        self.buffer.clear();
        self.store.set_error(Some(message.clone()));

        if let Some(ActiveStream {
            target: StreamTarget::Placeholder(id),
            ..
        }) = active
        {
            self.store.remove_message(&id)?;
        }
        Ok(StreamUpdate::Failed(message))
    }

    fn abort(&mut self, err: &Error) -> StreamUpdate {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let StreamTarget::Placeholder(id) = &active.target {
                self.store.stage_message(id, MessagePatch::stopped());
            }
        }
        CONTROLLER_FAILURES.click();
        self.status = StreamStatus::Idle;
        self.buffer.clear();
        let message = err.message().to_string();
        self.store.set_error(Some(message.clone()));
        StreamUpdate::Failed(message)
    }
}
