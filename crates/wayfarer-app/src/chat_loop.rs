//! Interactive chat loop.
//!
//! Reads lines from stdin, dispatches slash commands, and sends everything
//! else to the chat view. A background task prints transcript changes as
//! they are published on the event bus.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wayfarer_chat::{ChatView, GenerativeClient, RejectReason, SendOutcome};
use wayfarer_core::events::ChatEvent;

use crate::commands::{self, ChatCommand};
use crate::render;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run until `/quit` or end of input.
pub async fn run<C>(view: Arc<ChatView<C>>) -> std::io::Result<()>
where
    C: GenerativeClient + 'static,
{
    println!("{}", render::render_transcript(&view.messages()));
    println!(
        "{}",
        render::info("Ask about any destination. Type /help for commands.")
    );

    let printer = spawn_printer(Arc::clone(&view));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Some(command) => {
                if handle_command(&view, command).await == Flow::Quit {
                    break;
                }
            }
            None => submit(&view, line),
        }
    }

    view.stop_speaking();
    printer.abort();
    Ok(())
}

/// Send a typed line. A blank line sends whatever dictation has buffered.
fn submit<C>(view: &Arc<ChatView<C>>, line: String)
where
    C: GenerativeClient + 'static,
{
    if !line.trim().is_empty() {
        view.input().set(line);
    }
    if let Some(notice) = pending_notice(
        &view.input().get(),
        view.connectivity().is_online(),
        view.is_sending(),
    ) {
        println!("{}", render::info(notice));
    }
    let view = Arc::clone(view);
    tokio::spawn(async move {
        match view.send_input().await {
            SendOutcome::Delivered { message_id } => debug!(%message_id, "Reply delivered"),
            SendOutcome::Failed { reason, .. } => debug!(%reason, "Reply failed"),
            SendOutcome::Rejected(RejectReason::Empty) => {}
            SendOutcome::Rejected(RejectReason::Offline) => println!(
                "{}",
                render::warning("You are offline. Messages can be sent once the connection returns.")
            ),
            SendOutcome::Rejected(RejectReason::Busy) => println!(
                "{}",
                render::warning("Still waiting for the previous reply.")
            ),
        }
    });
}

/// Notice shown while a send that will be accepted waits for its reply.
fn pending_notice(input: &str, online: bool, busy: bool) -> Option<&'static str> {
    (!input.trim().is_empty() && online && !busy).then_some("Guide is thinking...")
}

async fn handle_command<C>(view: &ChatView<C>, command: ChatCommand) -> Flow
where
    C: GenerativeClient,
{
    match command {
        ChatCommand::Help => commands::print_help(),
        ChatCommand::Clear => {
            if let Err(e) = view.clear_history() {
                warn!(error = %e, "Failed to erase saved history");
                println!("{}", render::warning("History cleared, but the saved copy could not be erased."));
            }
        }
        ChatCommand::Reset => {
            view.reset_conversation().await;
            println!("{}", render::info("Started a new conversation."));
        }
        ChatCommand::Speak(position) => speak(view, position),
        ChatCommand::Stop => view.stop_speaking(),
        ChatCommand::Listen => match view.listen() {
            Ok(()) if view.voice().is_listening() => {
                println!("{}", render::info("Listening. Press Enter to send what you said."));
            }
            Ok(()) => {}
            Err(e) => warn!(error = %e, "Failed to start speech capture"),
        },
        ChatCommand::History => println!("{}", render::render_transcript(&view.messages())),
        ChatCommand::Quit => return Flow::Quit,
        ChatCommand::Unknown(cmd) => println!(
            "{}",
            render::warning(&format!("Unknown command {}. Type /help for a list.", cmd))
        ),
    }
    Flow::Continue
}

fn speak<C>(view: &ChatView<C>, position: Option<usize>)
where
    C: GenerativeClient,
{
    let messages = view.messages();
    let target = match position {
        Some(n) => messages.get(n.saturating_sub(1)),
        None => messages
            .iter()
            .rev()
            .find(|m| !m.is_user() && !m.is_error()),
    };
    let Some(target) = target else {
        println!("{}", render::warning("There is no such message."));
        return;
    };

    match view.speak_message(target.id()) {
        Ok(true) => {}
        Ok(false) => println!("{}", render::warning("Only guide replies can be read aloud.")),
        Err(e) => warn!(error = %e, "Speech playback failed"),
    }
}

/// Print transcript changes as they happen.
fn spawn_printer<C>(view: Arc<ChatView<C>>) -> JoinHandle<()>
where
    C: GenerativeClient + 'static,
{
    let mut subscription = view.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event {
                ChatEvent::MessageAppended { message_id, .. } => {
                    let messages = view.messages();
                    if let Some(pos) = messages.iter().position(|m| m.id() == message_id) {
                        println!("{}", render::render_message(pos + 1, &messages[pos]));
                    }
                }
                ChatEvent::HistoryCleared { .. } => {
                    println!("{}", render::info("Chat history cleared."));
                }
                ChatEvent::ConnectivityChanged { online: false, .. } => {
                    println!("{}", render::warning("Connection lost. Sending is paused."));
                }
                ChatEvent::ConnectivityChanged { online: true, .. } => {
                    println!("{}", render::info("Back online."));
                }
                ChatEvent::TranscriptRecognized { transcript, .. } => {
                    println!("{}", render::info(&format!("Heard: {}", transcript)));
                }
                _ => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_notice_only_for_accepted_sends() {
        assert_eq!(
            pending_notice("Sights in Porto", true, false),
            Some("Guide is thinking...")
        );
        assert_eq!(pending_notice("   ", true, false), None);
        assert_eq!(pending_notice("Sights in Porto", false, false), None);
        assert_eq!(pending_notice("Sights in Porto", true, true), None);
    }
}
