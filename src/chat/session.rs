//! Core chat session management.
//!
//! This module provides the `ChatSession` struct, which sits between the REPL and a
//! [`StreamController`]: it applies slash commands, queues attachments for the next message,
//! and renders a streaming reply while watching for interrupts.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::controller::{StreamController, StreamStatus, StreamUpdate};
use crate::error::Result;
use crate::render::Renderer;
use crate::storage::Storage;
use crate::store::DEFAULT_SESSION_TITLE;
use crate::transport::Transport;
use crate::types::{Attachment, SessionId};

use super::commands::{ChatCommand, SessionSelector, help_text};

/// What the REPL should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// A stream was opened; render it with [`ChatSession::stream_reply`].
    Stream,
    /// Exit.
    Quit,
    /// The command concerns the transport and is left to the caller.
    Unhandled(ChatCommand),
}

/// Aggregated stats for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Title of the current session, if any.
    pub title: Option<String>,
    /// Messages in the current session.
    pub message_count: usize,
    /// Replies flagged stopped in the current session.
    pub stopped_count: usize,
    /// All sessions.
    pub session_count: usize,
    /// Files waiting to ride on the next message.
    pub pending_attachments: usize,
    /// Stream state.
    pub status: StreamStatus,
}

/// A chat session driving a stream controller from user input.
pub struct ChatSession<T: Transport, S: Storage> {
    controller: StreamController<T, S>,
    pending: Vec<Attachment>,
}

impl<T: Transport, S: Storage> ChatSession<T, S> {
    /// Creates a new chat session around `controller`.
    pub fn new(controller: StreamController<T, S>) -> Self {
        Self {
            controller,
            pending: Vec::new(),
        }
    }

    pub fn controller(&self) -> &StreamController<T, S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StreamController<T, S> {
        &mut self.controller
    }

    /// Attachments queued for the next message.
    pub fn pending_attachments(&self) -> &[Attachment] {
        &self.pending
    }

    /// Send a user message with any queued attachments.
    ///
    /// Returns [`Flow::Stream`] when a stream was opened.
    pub fn send(&mut self, line: &str) -> Result<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        let attachments = std::mem::take(&mut self.pending);
        self.controller.send_with_attachments(line, attachments)?;
        Ok(Flow::Stream)
    }

    /// Apply a slash command.
    pub fn handle_command(
        &mut self,
        command: ChatCommand,
        renderer: &mut dyn Renderer,
    ) -> Result<Flow> {
        match command {
            ChatCommand::Quit => return Ok(Flow::Quit),
            ChatCommand::Help => {
                for line in help_text().lines() {
                    renderer.print_info(&format!("    {line}"));
                }
            }
            ChatCommand::Redo => {
                if self.controller.redo()? {
                    return Ok(Flow::Stream);
                }
                renderer.print_info("Nothing to redo.");
            }
            ChatCommand::New(title) => {
                let title = title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
                self.controller.create_session(title.clone())?;
                renderer.print_info(&format!("Started session \"{title}\"."));
            }
            ChatCommand::Sessions => self.list_sessions(renderer, ""),
            ChatCommand::Search(query) => self.list_sessions(renderer, &query),
            ChatCommand::Load(selector) => {
                let Some(id) = self.resolve(&selector, renderer) else {
                    return Ok(Flow::Continue);
                };
                self.controller.load_session(&id)?;
                let title = self
                    .controller
                    .store()
                    .current_session()
                    .map(|session| session.title.clone())
                    .unwrap_or_default();
                renderer.print_info(&format!("Switched to \"{title}\"."));
                for message in self.controller.messages() {
                    renderer.print_message(message);
                }
            }
            ChatCommand::Delete(selector) => {
                let Some(id) = self.resolve(&selector, renderer) else {
                    return Ok(Flow::Continue);
                };
                self.controller.delete_session(&id)?;
                renderer.print_info("Session deleted.");
            }
            ChatCommand::Title(title) => {
                match self.controller.store().current_session_id().cloned() {
                    Some(id) => {
                        self.controller.update_session_title(&id, title.clone())?;
                        renderer.print_info(&format!("Session renamed to \"{title}\"."));
                    }
                    None => renderer.print_error("No current session."),
                }
            }
            ChatCommand::Attach(path) => match Attachment::from_path(&path) {
                Ok(attachment) => {
                    renderer.print_info(&format!(
                        "Attached {} ({} bytes) to the next message.",
                        attachment.name, attachment.size
                    ));
                    self.pending.push(attachment);
                }
                Err(err) => renderer.print_error(err.message()),
            },
            ChatCommand::Clear => {
                self.controller.clear_history()?;
                self.pending.clear();
                renderer.print_info("Conversation cleared.");
            }
            ChatCommand::Stats => self.print_stats(renderer),
            ChatCommand::Invalid(message) => renderer.print_error(&message),
            command @ ChatCommand::Model(_) => return Ok(Flow::Unhandled(command)),
        }
        Ok(Flow::Continue)
    }

    /// Render the open stream until it ends or an interrupt arrives.
    ///
    /// An interrupt cancels the stream; the partial reply stays on screen.  Interrupts take
    /// priority over pending text.
    pub async fn stream_reply(
        &mut self,
        renderer: &mut dyn Renderer,
        interrupts: &mut UnboundedReceiver<()>,
    ) -> Result<()> {
        loop {
            let update = tokio::select! {
                biased;
                Some(()) = interrupts.recv() => None,
                update = self.controller.step() => Some(update?),
            };
            match update {
                None => {
                    self.controller.cancel()?;
                    renderer.print_interrupted();
                    return Ok(());
                }
                Some(StreamUpdate::Chunk(text)) => renderer.print_text(&text),
                Some(StreamUpdate::Completed(_)) | Some(StreamUpdate::Idle) => {
                    renderer.finish_response();
                    return Ok(());
                }
                Some(StreamUpdate::Failed(message)) => {
                    renderer.print_error(&message);
                    return Ok(());
                }
            }
        }
    }

    /// Stats for the current session.
    pub fn stats(&self) -> SessionStats {
        let store = self.controller.store();
        let messages = store.messages();
        SessionStats {
            title: store.current_session().map(|session| session.title.clone()),
            message_count: messages.len(),
            stopped_count: messages.iter().filter(|m| m.is_stopped()).count(),
            session_count: store.sessions().len(),
            pending_attachments: self.pending.len(),
            status: self.controller.status(),
        }
    }

    fn print_stats(&self, renderer: &mut dyn Renderer) {
        let stats = self.stats();
        renderer.print_info("    Session Statistics:");
        renderer.print_info(&format!(
            "      Session: {}",
            stats.title.as_deref().unwrap_or("(none)")
        ));
        renderer.print_info(&format!("      Messages: {}", stats.message_count));
        renderer.print_info(&format!("      Stopped replies: {}", stats.stopped_count));
        renderer.print_info(&format!("      Sessions: {}", stats.session_count));
        renderer.print_info(&format!(
            "      Pending attachments: {}",
            stats.pending_attachments
        ));
        renderer.print_info(&format!("      Stream: {:?}", stats.status));
    }

    fn list_sessions(&self, renderer: &mut dyn Renderer, query: &str) {
        let store = self.controller.store();
        let current = store.current_session_id();
        let matches = store.search_sessions(query);
        if matches.is_empty() {
            renderer.print_info("No sessions.");
            return;
        }
        for (index, session) in matches {
            let marker = if Some(&session.id) == current { "*" } else { " " };
            renderer.print_info(&format!(
                "  {marker}{:>3}. {} ({} messages)",
                index + 1,
                session.title,
                session.messages.len()
            ));
        }
    }

    fn resolve(
        &self,
        selector: &SessionSelector,
        renderer: &mut dyn Renderer,
    ) -> Option<SessionId> {
        let id = selector.resolve(self.controller.store().sessions());
        if id.is_none() {
            renderer.print_error("No such session.");
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainTextRenderer;
    use crate::storage::MemoryStorage;
    use crate::store::ChatStore;
    use crate::transport::ScriptedTransport;
    use crate::types::StreamEvent;
    use tokio::sync::mpsc::unbounded_channel;

    fn session() -> (ChatSession<ScriptedTransport, MemoryStorage>, ScriptedTransport) {
        let transport = ScriptedTransport::new();
        let store = ChatStore::load(MemoryStorage::new()).unwrap();
        let controller = StreamController::new(transport.clone(), store);
        (ChatSession::new(controller), transport)
    }

    fn renderer() -> PlainTextRenderer<Vec<u8>> {
        PlainTextRenderer::with_writer(Vec::new(), false)
    }

    fn output(renderer: PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn send_and_render_reply() {
        let (mut session, transport) = session();
        transport.push_script([
            StreamEvent::Chunk("Hi".to_string()),
            StreamEvent::Chunk(" there".to_string()),
            StreamEvent::Complete,
        ]);
        let (_tx, mut rx) = unbounded_channel();
        let mut out = renderer();

        assert_eq!(session.send("Hello").unwrap(), Flow::Stream);
        session.stream_reply(&mut out, &mut rx).await.unwrap();
        assert_eq!(output(out), "Hi there\n");
        assert_eq!(session.stats().message_count, 2);
        assert_eq!(session.send("   ").unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn interrupt_cancels_stream() {
        let (mut session, transport) = session();
        transport.push_hanging_script([StreamEvent::Chunk("Par".to_string())]);
        let (tx, mut rx) = unbounded_channel();
        let mut out = renderer();

        session.send("Test").unwrap();
        tx.send(()).unwrap();
        session.stream_reply(&mut out, &mut rx).await.unwrap();
        assert!(session.controller().is_stopped());
        assert_eq!(transport.live_streams(), 0);
        assert_eq!(output(out), "\n[interrupted]\n");
    }

    #[tokio::test]
    async fn failure_is_rendered() {
        let (mut session, transport) = session();
        transport.push_script([StreamEvent::Error("rate limited".to_string())]);
        let (_tx, mut rx) = unbounded_channel();
        let mut out = renderer();
        session.send("Hello").unwrap();
        session.stream_reply(&mut out, &mut rx).await.unwrap();
        assert_eq!(output(out), "\nError: rate limited\n");
        assert_eq!(session.controller().error(), Some("rate limited"));
    }

    #[tokio::test]
    async fn redo_command_streams() {
        let (mut session, transport) = session();
        let mut out = renderer();
        assert_eq!(session.handle_command(ChatCommand::Redo, &mut out).unwrap(), Flow::Continue);
        assert_eq!(output(out), "Nothing to redo.\n");

        transport.push_script([StreamEvent::Chunk("A".to_string()), StreamEvent::Complete]);
        session.send("Q").unwrap();
        session.controller_mut().run_until_idle().await.unwrap();
        transport.push_script([StreamEvent::Chunk("B".to_string()), StreamEvent::Complete]);
        let mut out = renderer();
        assert_eq!(session.handle_command(ChatCommand::Redo, &mut out).unwrap(), Flow::Stream);
        session.controller_mut().run_until_idle().await.unwrap();
        assert_eq!(session.stats().stopped_count, 1);
    }

    #[test]
    fn session_commands() {
        let (mut session, _) = session();
        let mut out = renderer();
        session
            .handle_command(ChatCommand::New(Some("Alpha".to_string())), &mut out)
            .unwrap();
        session.handle_command(ChatCommand::New(None), &mut out).unwrap();
        session
            .handle_command(ChatCommand::Title("Beta".to_string()), &mut out)
            .unwrap();
        session.handle_command(ChatCommand::Sessions, &mut out).unwrap();
        session
            .handle_command(ChatCommand::Load(SessionSelector::Index(2)), &mut out)
            .unwrap();
        session
            .handle_command(ChatCommand::Search("alp".to_string()), &mut out)
            .unwrap();
        session
            .handle_command(ChatCommand::Delete(SessionSelector::Index(9)), &mut out)
            .unwrap();
        session
            .handle_command(ChatCommand::Delete(SessionSelector::Index(1)), &mut out)
            .unwrap();
        assert_eq!(
            output(out),
            [
                "Started session \"Alpha\".",
                "Started session \"New Chat\".",
                "Session renamed to \"Beta\".",
                "  *  1. Beta (0 messages)",
                "     2. Alpha (0 messages)",
                "Switched to \"Alpha\".",
                "  *  2. Alpha (0 messages)",
                "",
                "Error: No such session.",
                "Session deleted.",
                "",
            ]
            .join("\n")
        );
        let stats = session.stats();
        assert_eq!(stats.session_count, 1);
        assert_eq!(stats.title.as_deref(), Some("Alpha"));
    }

    #[test]
    fn attach_queues_for_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let (mut session, transport) = session();
        let mut out = renderer();

        session
            .handle_command(ChatCommand::Attach(path.display().to_string()), &mut out)
            .unwrap();
        session
            .handle_command(ChatCommand::Attach("missing.txt".to_string()), &mut out)
            .unwrap();
        assert_eq!(session.pending_attachments().len(), 1);

        transport.push_script([StreamEvent::Complete]);
        session.send("read this").unwrap();
        assert!(session.pending_attachments().is_empty());
        assert_eq!(session.controller().messages()[0].attachments()[0].name, "doc.pdf");
    }

    #[test]
    fn model_and_quit_are_passed_back() {
        let (mut session, _) = session();
        let mut out = renderer();
        assert_eq!(
            session.handle_command(ChatCommand::Model(None), &mut out).unwrap(),
            Flow::Unhandled(ChatCommand::Model(None))
        );
        assert_eq!(session.handle_command(ChatCommand::Quit, &mut out).unwrap(), Flow::Quit);
    }
}
