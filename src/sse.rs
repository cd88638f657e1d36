//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of a `chat/completions` response into
//! [`StreamEvent`]s.  The framing is line based: every line starting with `data:` carries a
//! JSON [`ChatCompletionChunk`], and the literal payload `[DONE]` ends the stream.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_SKIPPED_LINES};
use crate::types::{ChatCompletionChunk, StreamEvent};

/// Field name that prefixes every payload line.
pub const DATA_FIELD: &str = "data:";

/// Payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

struct SseState<S> {
    stream: Pin<Box<S>>,
    buffer: Vec<u8>,
    cancel: CancellationToken,
    eof: bool,
    done: bool,
}

/// Process a stream of bytes into a stream of chat completion events.
///
/// Bytes are buffered until a full line is available, so lines (and UTF-8 sequences) may be
/// split across reads arbitrarily.  Payloads that are not valid JSON are skipped.  The stream
/// ends after the first `Complete` or `Error`; if the body ends without the `[DONE]` sentinel a
/// `Complete` is synthesized.
///
/// Reads are issued one at a time.  Once `cancel` fires no further events are produced, and a
/// read that is in flight at that moment is abandoned.
pub fn process_sse<S, E>(
    byte_stream: S,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        stream: Box::pin(byte_stream),
        buffer: Vec::new(),
        cancel,
        eof: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done || state.cancel.is_cancelled() {
                return None;
            }

            // First drain complete lines already in the buffer.
            if let Some(newline) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=newline).collect();
                let line = match std::str::from_utf8(&line[..newline]) {
                    Ok(line) => line,
                    Err(e) => {
                        STREAM_ERRORS.click();
                        state.done = true;
                        return Some((
                            StreamEvent::Error(format!("Invalid UTF-8 in stream: {e}")),
                            state,
                        ));
                    }
                };
                match parse_line(line) {
                    Some(event) => {
                        state.done = event.is_terminal();
                        return Some((event, state));
                    }
                    None => continue,
                }
            }

            if state.eof {
                state.done = true;
                return Some((StreamEvent::Complete, state));
            }

            // Read more data
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => return None,
                next = state.stream.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.buffer.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.done = true;
                    return Some((StreamEvent::Error(e.to_string()), state));
                }
                None => {
                    // End of body: flush a final unterminated line, then complete.
                    state.eof = true;
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                    }
                }
            }
        }
    })
}

/// Interpret a single line of the event stream.
///
/// Returns `None` for lines that carry nothing to emit: blank lines, comments, other fields,
/// malformed JSON and chunks without text.
fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix(DATA_FIELD)?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data == DONE_SENTINEL {
        return Some(StreamEvent::Complete);
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk.text().map(|text| StreamEvent::Chunk(text.to_string())),
        Err(_) => {
            STREAM_SKIPPED_LINES.click();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn chunk_line(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    fn byte_stream(
        parts: Vec<Vec<u8>>,
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
        stream::iter(parts.into_iter().map(|part| Ok(Bytes::from(part))))
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<StreamEvent> {
        process_sse(byte_stream(parts), CancellationToken::new())
            .collect()
            .await
    }

    #[tokio::test]
    async fn chunks_then_done() {
        let body = format!("{}{}data: [DONE]\n", chunk_line("Hi"), chunk_line(" there"));
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("Hi".to_string()),
                StreamEvent::Chunk(" there".to_string()),
                StreamEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn line_split_across_reads() {
        let line = chunk_line("Hello");
        let (a, b) = line.as_bytes().split_at(9);
        let events = collect(vec![a.to_vec(), b.to_vec(), b"data: [DONE]\n".to_vec()]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("Hello".to_string()), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn utf8_sequence_split_across_reads() {
        let line = chunk_line("héllo");
        let bytes = line.into_bytes();
        let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let events = collect(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("héllo".to_string()), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn malformed_json_is_skipped() {
        let body = format!(
            "data: {{not json\n{}: OPENROUTER PROCESSING\n\nevent: ping\n{}data: [DONE]\n",
            chunk_line("a"),
            chunk_line("b")
        );
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("a".to_string()),
                StreamEvent::Chunk("b".to_string()),
                StreamEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let body = chunk_line("x").replace('\n', "\r\n") + "data: [DONE]\r\n";
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("x".to_string()), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn body_end_without_sentinel_completes() {
        // Final line has no terminator.
        let body = chunk_line("tail");
        let body = body.trim_end().to_string();
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("tail".to_string()), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn nothing_after_done() {
        let body = format!("data: [DONE]\n{}", chunk_line("late"));
        let events = collect(vec![body.into_bytes()]).await;
        assert_eq!(events, vec![StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let events = collect(vec![b"data: \xff\xfe\n".to_vec()]).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(msg) if msg.contains("UTF-8")));
    }

    #[tokio::test]
    async fn read_error_is_reported() {
        let parts: Vec<std::result::Result<Bytes, String>> = vec![
            Ok(Bytes::from(chunk_line("a"))),
            Err("connection reset".to_string()),
        ];
        let events: Vec<_> = process_sse(stream::iter(parts), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("a".to_string()),
                StreamEvent::Error("connection reset".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_suppresses_events() {
        let cancel = CancellationToken::new();
        let body = format!("{}{}", chunk_line("one"), chunk_line("two"));
        let mut events = Box::pin(process_sse(byte_stream(vec![body.into_bytes()]), cancel.clone()));

        assert_eq!(events.next().await, Some(StreamEvent::Chunk("one".to_string())));
        cancel.cancel();
        assert_eq!(events.next().await, None);
    }

    #[test]
    fn cancellation_interrupts_pending_read() {
        let cancel = CancellationToken::new();
        let pending = stream::pending::<std::result::Result<Bytes, Infallible>>();
        let mut events = Box::pin(process_sse(pending, cancel.clone()));
        let mut next = tokio_test::task::spawn(events.next());
        tokio_test::assert_pending!(next.poll());

        cancel.cancel();
        assert!(next.is_woken());
        assert_eq!(tokio_test::assert_ready!(next.poll()), None);
    }

    #[test]
    fn parse_line_variants() {
        assert_eq!(parse_line("data: [DONE]"), Some(StreamEvent::Complete));
        assert_eq!(parse_line("data:[DONE]"), Some(StreamEvent::Complete));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("data: {\"choices\":[{\"delta\":{}}]}"), None);
    }
}
