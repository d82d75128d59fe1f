use std::io::{self, Write};

use peng_stream::{Conversation, ConversationUpdate, Message, MessageKind, Role};

const SUMMARY_WIDTH: usize = 60;

/// Prints the transcript incrementally as a reply streams in.
///
/// Remembers how many bytes of each message are already on screen, so every
/// update only writes the new tail. User rows are never echoed back since the
/// user just typed them.
pub struct TranscriptPrinter<W> {
    out: W,
    printed: Vec<usize>,
}

impl TranscriptPrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints messages that were in the conversation before the session started.
    pub fn print_history(&mut self, conversation: &Conversation) -> io::Result<()> {
        for message in conversation.messages().iter().skip(self.printed.len()) {
            match message.role {
                Role::User => writeln!(self.out, "you: {}", message.content)?,
                Role::Assistant if message.folded => {
                    writeln!(self.out, "{}", summary_line(message))?
                }
                Role::Assistant => writeln!(self.out, "{}", message.content)?,
            }
            self.printed.push(message.content.len());
        }
        self.out.flush()
    }

    pub fn render(
        &mut self,
        conversation: &Conversation,
        update: &ConversationUpdate,
    ) -> io::Result<()> {
        self.write_new_text(conversation.messages())?;

        match update {
            ConversationUpdate::Ignored | ConversationUpdate::Changed => {}
            ConversationUpdate::Completed(summary) => {
                writeln!(self.out)?;
                if summary.folded > 0 {
                    writeln!(self.out, "  ({} tool/reasoning rows folded)", summary.folded)?;
                }
            }
            ConversationUpdate::Failed(reason) => {
                writeln!(self.out)?;
                match conversation.error() {
                    Some(error) => writeln!(self.out, "  [error] {error}")?,
                    None => writeln!(self.out, "  [{reason}]")?,
                }
            }
        }
        self.out.flush()
    }

    fn write_new_text(&mut self, messages: &[Message]) -> io::Result<()> {
        for (index, message) in messages.iter().enumerate() {
            let Some(&shown) = self.printed.get(index) else {
                if message.role == Role::Assistant {
                    if let Some(label) = row_label(message.kind) {
                        write!(self.out, "\n[{label}] ")?;
                    } else {
                        writeln!(self.out)?;
                    }
                    write!(self.out, "{}", message.content)?;
                }
                self.printed.push(message.content.len());
                continue;
            };

            // Finalizing can shrink the text; only growth is printed.
            if message.content.len() > shown && message.content.is_char_boundary(shown) {
                write!(self.out, "{}", &message.content[shown..])?;
                self.printed[index] = message.content.len();
            }
        }
        Ok(())
    }
}

fn row_label(kind: Option<MessageKind>) -> Option<&'static str> {
    match kind? {
        MessageKind::ToolCalls => Some("tool call"),
        MessageKind::ToolOutput => Some("tool output"),
        MessageKind::ReasoningSummary => Some("thinking"),
        MessageKind::User | MessageKind::Assistant | MessageKind::OutputText => None,
    }
}

/// One-line preview of a folded row.
pub fn summary_line(message: &Message) -> String {
    let label = row_label(message.kind).unwrap_or("assistant");
    let first_line = message.content.lines().next().unwrap_or_default().trim();
    let mut preview: String = first_line.chars().take(SUMMARY_WIDTH).collect();
    if first_line.chars().count() > SUMMARY_WIDTH || message.content.lines().nth(1).is_some() {
        preview.push('…');
    }
    format!("[{label}] {preview}")
}
