use serde::{Deserialize, Serialize};

use crate::chunk::ChunkKind;
use crate::ids::MessageId;

/// Text shown in place of a reply when a stream fails.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error.";

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Display type of a message: either a plain turn or one of the stream chunk kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolCalls,
    ToolOutput,
    ReasoningSummary,
    OutputText,
}

impl MessageKind {
    pub fn chunk_kind(self) -> Option<ChunkKind> {
        match self {
            Self::ToolCalls => Some(ChunkKind::ToolCalls),
            Self::ToolOutput => Some(ChunkKind::ToolOutput),
            Self::ReasoningSummary => Some(ChunkKind::ReasoningSummary),
            Self::OutputText => Some(ChunkKind::OutputText),
            Self::User | Self::Assistant => None,
        }
    }
}

impl From<ChunkKind> for MessageKind {
    fn from(kind: ChunkKind) -> Self {
        match kind {
            ChunkKind::ToolCalls => Self::ToolCalls,
            ChunkKind::ToolOutput => Self::ToolOutput,
            ChunkKind::ReasoningSummary => Self::ReasoningSummary,
            ChunkKind::OutputText => Self::OutputText,
        }
    }
}

/// One row of the conversation as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub folded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            kind: Some(MessageKind::User),
            folded: false,
            message_id: None,
            images,
        }
    }

    /// Plain assistant turn, used for preloaded history.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            kind: Some(MessageKind::Assistant),
            folded: false,
            message_id: None,
            images: Vec::new(),
        }
    }

    pub fn chunk(kind: ChunkKind, content: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            kind: Some(kind.into()),
            folded: false,
            message_id: Some(message_id),
            images: Vec::new(),
        }
    }

    pub fn error_reply(message_id: MessageId) -> Self {
        Self::chunk(ChunkKind::OutputText, ERROR_REPLY, message_id)
    }

    /// True when this message belongs to `message_id` and has the given chunk kind.
    pub fn continues(&self, kind: ChunkKind, message_id: MessageId) -> bool {
        self.message_id == Some(message_id) && self.kind == Some(kind.into())
    }
}
