/// An event produced by a streaming transport.
///
/// A well-formed stream is zero or more `Chunk`s followed by exactly one of `Complete` or
/// `Error`.  Cancellation is not an event: a cancelled stream simply ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The next text fragment, in arrival order.
    Chunk(String),
    /// The server signalled the end of the response.
    Complete,
    /// The request failed; the string is meant for the user.
    Error(String),
}

impl StreamEvent {
    /// True for `Complete` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Error(_))
    }
}
