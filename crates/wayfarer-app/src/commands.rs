//! Slash commands available in the chat loop.

use console::style;

#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    /// Erase the transcript and its saved copy.
    Clear,
    /// Start a new conversation context; the transcript is kept.
    Reset,
    /// Toggle playback of the n-th message, or the latest reply.
    Speak(Option<usize>),
    Stop,
    Listen,
    History,
    Quit,
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/clear" => ChatCommand::Clear,
        "/reset" | "/new" => ChatCommand::Reset,
        "/speak" => match arg.map(str::parse::<usize>) {
            None => ChatCommand::Speak(None),
            Some(Ok(n)) if n > 0 => ChatCommand::Speak(Some(n)),
            Some(_) => ChatCommand::Unknown("/speak expects a message number".to_string()),
        },
        "/stop" => ChatCommand::Stop,
        "/listen" | "/mic" => ChatCommand::Listen,
        "/history" => ChatCommand::History,
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

pub fn print_help() {
    let rows = [
        ("/help", "Show this help message"),
        ("/clear", "Erase the chat history"),
        ("/reset", "Start a new conversation"),
        ("/speak [n]", "Read message n (or the latest reply) aloud"),
        ("/stop", "Stop speaking"),
        ("/listen", "Dictate your next message"),
        ("/history", "Show the whole transcript"),
        ("/quit", "Leave Wayfarer"),
    ];
    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    for (cmd, text) in rows {
        println!("  {:<12} {}", style(cmd).cyan(), text);
    }
    println!();
}
