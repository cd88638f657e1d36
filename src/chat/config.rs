//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::client::DEFAULT_BASE_URL;
use crate::types::Model;

/// Directory under the home directory holding persisted conversations.
const STATE_DIR_NAME: &str = ".chatstream";

/// Command-line arguments for the chatstream-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: deepseek/deepseek-r1-0528:free)", "MODEL")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arrrg(optional, "API base URL (default: https://openrouter.ai/api/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Directory for persisted conversations.
    #[arrrg(optional, "Directory for saved conversations (default: ~/.chatstream)", "DIR")]
    pub state_dir: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat run.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Base URL of the API.
    pub base_url: String,

    /// Directory holding the persisted conversation record.
    pub state_dir: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: deepseek/deepseek-r1-0528:free
    /// - Base URL: https://openrouter.ai/api/v1/
    /// - State directory: ~/.chatstream
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            state_dir: default_state_dir(),
            use_color: true,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the state directory.
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            model: args.model.map(Model::from).unwrap_or(defaults.model),
            base_url: args.base_url.unwrap_or(defaults.base_url),
            state_dir: args.state_dir.map(PathBuf::from).unwrap_or(defaults.state_dir),
            use_color: !args.no_color,
        }
    }
}

/// `~/.chatstream`, or `.chatstream` in the working directory when there is no home.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(STATE_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(STATE_DIR_NAME))
}
