//! Chat application module for interactive streaming conversations.
//!
//! This module provides a streaming REPL chat interface built on top of the
//! chatstream library. It supports:
//!
//! - Streaming responses with real-time token display
//! - Ctrl+C to stop a reply mid-stream, and `/redo` to regenerate it
//! - Persistent, searchable sessions
//! - Image and PDF attachments
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Command handling and reply rendering over a stream controller
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, SessionSelector, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, default_state_dir};
pub use session::{ChatSession, Flow, SessionStats};
