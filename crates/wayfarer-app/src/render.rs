//! Terminal rendering of transcript messages.
//!
//! Headings are bold, subheadings are cyan, and error replies are red.
//! Renderers return strings so the loop decides where to print.

use console::style;

use wayfarer_core::types::{Author, Block, Message, MessageBody};

/// Render one message with its 1-based position in the transcript.
pub fn render_message(position: usize, message: &Message) -> String {
    let who = match message.author() {
        Author::User => style("You").green().bold(),
        Author::Assistant => style("Guide").magenta().bold(),
    };
    let mut out = format!(
        "{} {} {}",
        style(format!("[{}]", position)).dim(),
        who,
        style(message.timestamp()).dim()
    );
    if let Some(status) = message.status() {
        out.push_str(&format!(" {}", style(status).dim()));
    }
    out.push('\n');

    if message.is_error() {
        out.push_str(&format!("  {}\n", style(message.plain_text()).red()));
        return out;
    }

    match message.body() {
        MessageBody::Plain(text) => {
            for line in text.lines() {
                out.push_str(&format!("  {}\n", line));
            }
        }
        MessageBody::Formatted(content) => {
            for block in content.blocks() {
                out.push_str(&render_block(block));
            }
        }
    }
    out
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading(text) => format!("  {}\n", style(text).bold().underlined()),
        Block::Subheading(text) => format!("  {}\n", style(text).cyan().bold()),
        Block::Paragraph(text) => format!("    {}\n", text),
    }
}

/// Render the whole transcript, or a hint when it is empty.
pub fn render_transcript(messages: &[Message]) -> String {
    if messages.is_empty() {
        return format!(
            "  {}\n",
            style("No messages yet. Ask about a destination to get started.").dim()
        );
    }
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| render_message(i + 1, m))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn info(text: &str) -> String {
    format!("  {} {}", style("i").blue().bold(), text)
}

pub fn warning(text: &str) -> String {
    format!("  {} {}", style("!").yellow().bold(), style(text).yellow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::types::StructuredContent;

    fn plain(s: String) -> String {
        console::strip_ansi_codes(&s).to_string()
    }

    #[test]
    fn test_render_user_message() {
        let out = plain(render_message(1, &Message::user("Lisbon please")));
        assert!(out.starts_with("[1] You "));
        assert!(out.lines().next().unwrap().ends_with(" sent"));
        assert!(out.contains("  Lisbon please"));
    }

    #[test]
    fn test_reply_header_has_no_status() {
        let reply = Message::assistant(MessageBody::Plain("Try the tram".into()));
        let out = plain(render_message(2, &reply));
        assert!(!out.lines().next().unwrap().contains("sent"));
    }

    #[test]
    fn test_render_formatted_reply() {
        let content = StructuredContent::new(vec![
            Block::Heading("Lisbon".into()),
            Block::Subheading("Local Specialty".into()),
            Block::Paragraph("Pastel de nata".into()),
        ]);
        let out = plain(render_message(2, &Message::assistant(MessageBody::Formatted(content))));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("[2] Guide "));
        assert_eq!(lines[1], "  Lisbon");
        assert_eq!(lines[2], "  Local Specialty");
        assert_eq!(lines[3], "    Pastel de nata");
    }

    #[test]
    fn test_render_error_reply() {
        let out = plain(render_message(3, &Message::assistant_error("Sorry")));
        assert!(out.contains("  Sorry"));
    }

    #[test]
    fn test_render_empty_transcript() {
        let out = plain(render_transcript(&[]));
        assert!(out.contains("No messages yet"));
    }
}
