// Public modules
pub mod attachment;
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod message;
pub mod model;
pub mod role;
pub mod session;
pub mod stream_event;

// Re-exports
pub use attachment::{Attachment, AttachmentKind, MAX_ATTACHMENT_SIZE};
pub use chat_completion::{ChatCompletion, CompletionChoice, CompletionMessage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_request::{ApiMessage, ChatCompletionRequest};
pub use message::{Message, MessageDraft, MessageId, MessagePatch};
pub use model::{KnownModel, Model};
pub use role::Role;
pub use session::{Session, SessionId};
pub use stream_event::StreamEvent;
