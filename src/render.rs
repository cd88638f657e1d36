//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the REPL never writes to the
//! terminal directly.  The default implementation uses ANSI escape codes for role labels,
//! stopped replies and errors.

use std::io::{self, Stdout, Write};

use crate::types::{Message, Role};

/// ANSI escape code for dim text (used for stopped markers and metadata).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for role labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for user turns).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for assistant turns).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a chunk of streamed response text.
    ///
    /// This is called incrementally as fragments arrive.
    fn print_text(&mut self, text: &str);

    /// Print a stored message, e.g. when replaying a session.
    fn print_message(&mut self, message: &Message);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Give up the renderer and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&mut self, style: &str, text: &str) {
        if self.use_color {
            let _ = write!(self.out, "{style}{text}{ANSI_RESET}");
        } else {
            let _ = write!(self.out, "{text}");
        }
    }

    /// Flushes the writer to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_text(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        self.flush();
    }

    fn print_message(&mut self, message: &Message) {
        let (label, color) = match message.role {
            Role::User => ("you", ANSI_CYAN),
            Role::Assistant => ("assistant", ANSI_GREEN),
        };
        self.styled(&format!("{ANSI_BOLD}{color}"), &format!("{label}>"));
        let _ = write!(self.out, " {}", message.content);
        for attachment in message.attachments() {
            self.styled(ANSI_DIM, &format!(" [{}]", attachment.name));
        }
        if message.is_stopped() {
            self.styled(ANSI_DIM, " [stopped]");
        }
        let _ = writeln!(self.out);
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        let _ = writeln!(self.out);
        self.styled(ANSI_RED, &format!("Error: {error}"));
        let _ = writeln!(self.out);
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        let _ = writeln!(self.out, "{info}");
        self.flush();
    }

    fn finish_response(&mut self) {
        let _ = writeln!(self.out);
        self.flush();
    }

    fn print_interrupted(&mut self) {
        let _ = writeln!(self.out);
        self.styled(ANSI_DIM, "[interrupted]");
        let _ = writeln!(self.out);
        self.flush();
    }
}
