//! Interactive chat application with streaming replies.
//!
//! This binary provides a streaming REPL over an OpenAI-compatible chat-completion API
//! (OpenRouter by default).  Conversations are saved under `~/.chatstream`.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! CHATSTREAM_API_KEY=sk-... chatstream-chat
//!
//! # Specify a model
//! chatstream-chat --model deepseek/deepseek-chat
//!
//! # Disable colors (useful for piping output)
//! chatstream-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/redo` - Regenerate the last reply
//! - `/sessions`, `/load <n>`, `/new` - Manage sessions
//! - `/model <name>` - Change the model
//! - `/quit` - Exit the application
//!
//! Ctrl+C while a reply is streaming stops it and keeps what arrived.

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc::unbounded_channel;

use chatstream::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, Flow, PlainTextRenderer, Renderer,
    parse_command,
};
use chatstream::{ChatStore, CompletionClient, FileStorage, Model, StreamController};

/// Main entry point for the chatstream-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("chatstream-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let client = CompletionClient::with_options(
        None,
        Some(config.base_url.clone()),
        Some(config.model.clone()),
        None,
    )?
    .with_title("chatstream");
    let storage = FileStorage::open(&config.state_dir)?;
    let store = ChatStore::load(storage)?;
    let mut session = ChatSession::new(StreamController::new(client, store));
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C during streaming arrives here; at the prompt rustyline handles it.
    let (interrupt_tx, mut interrupts) = unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    println!(
        "chatstream (model: {})",
        session.controller().transport().model()
    );
    println!("Type /help for commands, /quit to exit\n");
    if let Some(current) = session.controller().store().current_session() {
        renderer.print_info(&format!("Resuming \"{}\".", current.title));
        for message in current.messages.iter() {
            renderer.print_message(message);
        }
    }

    loop {
        let readline = rl.readline("You: ");

        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        let flow = match parse_command(line) {
            Some(command) => session.handle_command(command, &mut renderer),
            None => session.send(line),
        };
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => {
                println!("Goodbye!");
                break;
            }
            Ok(Flow::Stream) => {
                // Drop interrupts that arrived while no reply was streaming.
                while interrupts.try_recv().is_ok() {}
                println!("Assistant:");
                if let Err(err) = session.stream_reply(&mut renderer, &mut interrupts).await {
                    renderer.print_error(err.message());
                }
            }
            Ok(Flow::Unhandled(ChatCommand::Model(name))) => {
                let transport = session.controller_mut().transport_mut();
                match name {
                    Some(name) => {
                        transport.set_model(Model::from(name.as_str()));
                        renderer.print_info(&format!("Model changed to: {}", transport.model()));
                    }
                    None => renderer.print_info(&format!("Model: {}", transport.model())),
                }
            }
            Ok(Flow::Unhandled(command)) => {
                renderer.print_error(&format!("Unsupported command: {command:?}"));
            }
            Err(err) => renderer.print_error(err.message()),
        }
    }

    Ok(())
}
