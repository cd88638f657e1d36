//! Logging hook for stream controller activity.
//!
//! This module provides the [`StreamLogger`] trait that lets callers capture every request
//! payload, every transport event, and every finished assistant message that passes through a
//! [`StreamController`](crate::StreamController).

use crate::types::{ApiMessage, Message, StreamEvent};

/// A trait for logging stream controller activity.
///
/// # Example
///
/// ```rust,ignore
/// use chatstream::{ApiMessage, Message, StreamEvent, StreamLogger};
/// use std::io::Write;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl StreamLogger for FileLogger {
///     fn log_request(&self, history: &[ApiMessage]) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "request: {}", serde_json::to_string(history).unwrap()).unwrap();
///     }
///
///     fn log_stream_event(&self, event: &StreamEvent) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "event: {event:?}").unwrap();
///     }
///
///     fn log_message(&self, message: &Message) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "message: {}", serde_json::to_string(message).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait StreamLogger: Send + Sync {
    /// Log the conversation history about to be sent.
    ///
    /// Called once per `send` or `redo`, before the transport is opened.
    fn log_request(&self, history: &[ApiMessage]);

    /// Log a single event as the controller applies it.
    fn log_stream_event(&self, event: &StreamEvent);

    /// Log an assistant message once its stream completed.
    ///
    /// Not called for failed or cancelled streams.
    fn log_message(&self, message: &Message);
}
