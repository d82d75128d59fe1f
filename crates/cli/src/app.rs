use std::path::PathBuf;
use std::sync::Arc;

use peng_stream::{
    ChatTransport, Conversation, Draft, HttpTransport, MemoryRecord, MemoryToken, SessionState,
    StreamError, SubmitRejection, TokenProvider,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use crate::render::TranscriptPrinter;
use crate::settings::{ChatSettings, SettingsError, SettingsStore};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to create chat transport on `{stage}`: {source}"))]
    CreateTransport {
        stage: &'static str,
        source: StreamError,
    },
    #[snafu(display("failed to read memory file {path:?} on `{stage}`: {source}"))]
    ReadMemories {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse memory file {path:?} on `{stage}`: {source}"))]
    ParseMemories {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to save settings on `{stage}`: {source}"))]
    SaveSettings {
        stage: &'static str,
        source: SettingsError,
    },
}

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Memory,
    Model(Option<String>),
    Tool(String),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Prompt(line.to_string());
        };
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        match name {
            "quit" | "exit" => Self::Quit,
            "memory" => Self::Memory,
            "model" if argument.is_empty() => Self::Model(None),
            "model" => Self::Model(Some(argument.to_string())),
            "tool" if !argument.is_empty() => Self::Tool(argument.to_string()),
            "help" => Self::Help,
            // Unknown slash commands go to the model as plain text.
            _ => Self::Prompt(line.to_string()),
        }
    }
}

pub fn load_memories(settings: &ChatSettings) -> Result<Vec<MemoryRecord>, AppError> {
    let Some(path) = settings.memory_file.as_ref() else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path).context(ReadMemoriesSnafu {
        stage: "read-memory-file",
        path: path.clone(),
    })?;
    let records: Vec<MemoryRecord> = serde_json::from_str(&content).context(ParseMemoriesSnafu {
        stage: "parse-memory-file",
        path: path.clone(),
    })?;
    tracing::info!(count = records.len(), path = ?path, "loaded selected memories");
    Ok(records)
}

/// Ctrl-C presses. The signal handler is installed once, for the whole session.
pub struct Interrupts {
    presses: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    pub fn listen() -> Self {
        let (press_tx, presses) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if press_tx.send(()).is_err() {
                    break;
                }
            }
            tracing::warn!("ctrl-c listener stopped");
        });
        Self { presses }
    }

    async fn next(&mut self) {
        if self.presses.recv().await.is_none() {
            // Listener is gone; never report a press again.
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Interrupted,
    Closed,
}

async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupts: &mut Interrupts,
) -> Result<Input, AppError>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        biased;
        _ = interrupts.next() => Ok(Input::Interrupted),
        line = lines.next_line() => {
            let line = line.context(ReadInputSnafu {
                stage: "read-prompt-line",
            })?;
            Ok(line.map_or(Input::Closed, Input::Line))
        }
    }
}

pub async fn run(store: SettingsStore) -> Result<(), AppError> {
    let settings = store.settings();
    let tokens: Arc<dyn TokenProvider> = Arc::new(MemoryToken::new(settings.token()));
    let transport: Arc<dyn ChatTransport> = Arc::new(
        HttpTransport::new(settings.endpoint.clone(), tokens).context(CreateTransportSnafu {
            stage: "create-http-transport",
        })?,
    );

    let mut conversation = Conversation::new(settings.user_name.clone())
        .with_catalog(settings.catalog())
        .with_memories(&load_memories(&settings)?);
    conversation.select_model(settings.base_model.clone());
    for tool in &settings.tools_name {
        conversation.set_tool_selected(tool, true);
    }
    conversation.set_long_term_memory(settings.long_term_memory.clone());

    let mut printer = TranscriptPrinter::stdout();
    printer.print_history(&conversation).context(WriteOutputSnafu {
        stage: "print-history",
    })?;
    println!(
        "chatting with {} at {} (/help for commands)",
        conversation.base_model(),
        settings.endpoint
    );

    let mut interrupts = Interrupts::listen();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = match next_input(&mut lines, &mut interrupts).await? {
            Input::Line(line) => line,
            Input::Interrupted => {
                println!();
                break;
            }
            Input::Closed => break,
        };

        match Command::parse(&line) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Memory => {
                let ids = conversation.short_term_memory().ids();
                if ids.is_empty() {
                    println!("short-term memory is empty");
                } else {
                    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                    println!("short-term memory: [{}]", ids.join(", "));
                }
            }
            Command::Model(None) => println!("current model: {}", conversation.base_model()),
            Command::Model(Some(model)) => {
                conversation.select_model(model.clone());
                let mut updated = (*store.settings()).clone();
                updated.base_model = model;
                store.update(updated).context(SaveSettingsSnafu {
                    stage: "save-selected-model",
                })?;
                println!("model set to {}", conversation.base_model());
            }
            Command::Tool(tool) => {
                let selected = !conversation.tools_name().contains(&tool);
                conversation.set_tool_selected(&tool, selected);
                println!("tools: [{}]", conversation.tools_name().join(", "));
            }
            Command::Prompt(text) => {
                let transport = transport.clone();
                stream_reply(&mut conversation, transport, &mut printer, &mut interrupts, text)
                    .await?;
            }
        }
    }

    Ok(())
}

async fn stream_reply(
    conversation: &mut Conversation,
    transport: Arc<dyn ChatTransport>,
    printer: &mut TranscriptPrinter<std::io::Stdout>,
    interrupts: &mut Interrupts,
    text: String,
) -> Result<(), AppError> {
    let handle = match conversation.send(transport, Draft::text(text)) {
        Ok(handle) => handle,
        Err(SubmitRejection::Empty) => return Ok(()),
        Err(SubmitRejection::Busy) => {
            println!("still waiting for the previous reply");
            return Ok(());
        }
    };

    let mut stream = handle.stream;
    let worker = tokio::spawn(handle.worker);

    let mut write_error = None;
    let interrupted = tokio::select! {
        _ = conversation.drive(&mut stream, |conversation, update| {
            if write_error.is_some() {
                return;
            }
            if let Err(error) = printer.render(conversation, update) {
                write_error = Some(error);
            }
        }) => false,
        _ = interrupts.next() => true,
    };

    if interrupted {
        let update = conversation.cancel(&mut stream);
        printer.render(conversation, &update).context(WriteOutputSnafu {
            stage: "print-cancelled-reply",
        })?;
    }
    drop(stream);

    if let Err(error) = worker.await {
        tracing::warn!(%error, "chat stream worker did not finish cleanly");
    }
    if let Some(source) = write_error {
        return Err(AppError::WriteOutput {
            stage: "print-streamed-reply",
            source,
        });
    }

    if let SessionState::Failed(reason) = conversation.session_state() {
        tracing::debug!(%reason, "reply ended without completing");
    }
    Ok(())
}

fn prompt() {
    use std::io::Write;

    print!("\n> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("/model [name]  show or switch the base model");
    println!("/tool <name>   toggle a tool for the next requests");
    println!("/memory        show remembered turn ids");
    println!("/quit          leave (Ctrl-C at the prompt does too)");
    println!("Ctrl-C while a reply streams stops it.");
}
