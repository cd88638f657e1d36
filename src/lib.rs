// Public modules
pub mod chat;
pub mod client;
pub mod controller;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod storage;
pub mod store;
pub mod stream_logger;
pub mod transport;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{API_KEY_ENV, CompletionClient, DEFAULT_BASE_URL};
pub use controller::{StreamController, StreamStatus, StreamUpdate};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{ChatStore, DEFAULT_SESSION_TITLE, STORAGE_KEY};
pub use stream_logger::StreamLogger;
pub use transport::{EventStream, ScriptedTransport, Transport};
pub use types::*;
