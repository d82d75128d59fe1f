use serde::{Deserialize, Deserializer, Serialize};

use crate::chunk::ChunkKind;
use crate::ids::{MessageId, TurnId};
use crate::message::{Message, MessageKind};

/// Ordered turn ids sent back to the backend as `short_term_memory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortTermMemory {
    ids: Vec<TurnId>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = TurnId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn push(&mut self, id: TurnId) {
        self.ids.push(id);
    }

    pub fn ids(&self) -> &[TurnId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_vec(&self) -> Vec<TurnId> {
        self.ids.clone()
    }
}

/// Past exchange selected from the memory list, used to seed a new chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub base_model: String,
    #[serde(default)]
    pub knowledge_base: String,
    pub human_input: String,
    pub ai_response: String,
}

impl MemoryRecord {
    pub fn turn_id(&self) -> Option<TurnId> {
        self.id.trim().parse::<i64>().ok().map(TurnId::new)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(id) => id.to_string(),
        RawId::Text(id) => id,
    })
}

/// What finalizing one completed reply changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalizeSummary {
    pub folded: usize,
    pub normalized: usize,
    pub remembered: Option<TurnId>,
}

/// Folds tool and reasoning rows, tidies output text and records the turn id.
pub fn finalize_turn(
    messages: &mut [Message],
    message_id: MessageId,
    turn_id: Option<TurnId>,
    memory: &mut ShortTermMemory,
) -> FinalizeSummary {
    let mut summary = FinalizeSummary::default();

    for message in messages
        .iter_mut()
        .filter(|message| message.message_id == Some(message_id))
    {
        match message.kind.and_then(MessageKind::chunk_kind) {
            Some(kind) if kind.is_foldable() => {
                message.folded = true;
                summary.folded += 1;
            }
            Some(ChunkKind::OutputText) => {
                message.content = collapse_newline_runs(&message.content);
                summary.normalized += 1;
            }
            _ => {}
        }
    }

    if let Some(turn_id) = turn_id {
        memory.push(turn_id);
        summary.remembered = Some(turn_id);
    }

    tracing::debug!(
        %message_id,
        folded = summary.folded,
        normalized = summary.normalized,
        remembered = ?summary.remembered,
        memory_len = memory.len(),
        "finalized streamed reply"
    );
    summary
}

/// Replaces every run of two or more `\n` with a single `\n`.
pub fn collapse_newline_runs(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut previous_newline = false;
    for character in text.chars() {
        let newline = character == '\n';
        if !(newline && previous_newline) {
            collapsed.push(character);
        }
        previous_newline = newline;
    }
    collapsed
}
