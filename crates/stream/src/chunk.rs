use serde::{Deserialize, Deserializer, Serialize};
use snafu::ResultExt;

use crate::error::{DecodeSnafu, StreamResult};
use crate::ids::TurnId;

/// Typed tag of one streamed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    ToolCalls,
    ToolOutput,
    ReasoningSummary,
    OutputText,
}

impl ChunkKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "tool_calls" => Some(Self::ToolCalls),
            "tool_output" => Some(Self::ToolOutput),
            "reasoning_summary" => Some(Self::ReasoningSummary),
            "output_text" => Some(Self::OutputText),
            _ => None,
        }
    }

    /// Kinds that are collapsed once the stream completes.
    pub fn is_foldable(self) -> bool {
        matches!(
            self,
            Self::ToolCalls | Self::ToolOutput | Self::ReasoningSummary
        )
    }
}

/// One line of the chat response stream.
///
/// The server emits its terminal frame as `{"chunk": "", "done": true}` without
/// a `type`, so the tag is optional and unknown tags decode to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkEnvelope {
    #[serde(default, deserialize_with = "nullable_string")]
    pub chunk: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: Option<ChunkKind>,
    #[serde(default)]
    pub done: bool,
}

impl ChunkEnvelope {
    pub fn new(chunk: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            chunk: chunk.into(),
            kind: Some(kind),
            done: false,
        }
    }

    pub fn terminal(chunk: impl Into<String>) -> Self {
        Self {
            chunk: chunk.into(),
            kind: None,
            done: true,
        }
    }

    /// Conversation-turn id smuggled in the text of a `done` frame, if any.
    pub fn trailing_turn_id(&self) -> Option<TurnId> {
        if !self.done {
            return None;
        }
        extract_turn_id(&self.chunk)
    }
}

/// Decodes one complete, non-blank line.
pub fn decode_line(line: &str) -> StreamResult<ChunkEnvelope> {
    serde_json::from_str(line.trim()).context(DecodeSnafu {
        stage: "decode-chunk-line",
    })
}

/// Returns the first signed integer token (`-?[0-9]+`) found in `text`.
///
/// Digit runs that overflow `i64` are treated as absent.
pub fn extract_turn_id(text: &str) -> Option<TurnId> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let end = bytes[start..]
        .iter()
        .position(|byte| !byte.is_ascii_digit())
        .map_or(bytes.len(), |offset| start + offset);
    let signed_start = if start > 0 && bytes[start - 1] == b'-' {
        start - 1
    } else {
        start
    };

    text[signed_start..end].parse::<i64>().ok().map(TurnId::new)
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<Option<ChunkKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let tag = Option::<String>::deserialize(deserializer)?;
    Ok(tag.as_deref().and_then(ChunkKind::from_tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_envelope() {
        let envelope =
            decode_line(r#"{"chunk":"Hel","type":"output_text","done":false}"#).unwrap();
        assert_eq!(envelope, ChunkEnvelope::new("Hel", ChunkKind::OutputText));
    }

    #[test]
    fn decodes_untyped_terminal_frame() {
        let envelope = decode_line(r#"{"chunk": "", "done": true}"#).unwrap();
        assert_eq!(envelope, ChunkEnvelope::terminal(""));
    }

    #[test]
    fn unknown_tag_and_null_chunk_are_tolerated() {
        let envelope = decode_line(r#"{"chunk":null,"type":"image_url"}"#).unwrap();
        assert_eq!(envelope.chunk, "");
        assert_eq!(envelope.kind, None);
        assert!(!envelope.done);
    }

    #[test]
    fn rejects_partial_json() {
        let error = decode_line(r#"{"chunk":"Hel","ty"#).unwrap_err();
        assert!(error.to_string().contains("decode-chunk-line"));
    }

    #[test]
    fn extracts_first_signed_integer() {
        assert_eq!(extract_turn_id(" 42 "), Some(TurnId::new(42)));
        assert_eq!(extract_turn_id("id=-17;next=3"), Some(TurnId::new(-17)));
        assert_eq!(extract_turn_id("chat 5-6"), Some(TurnId::new(5)));
        assert_eq!(extract_turn_id("abc"), None);
        assert_eq!(extract_turn_id(""), None);
        assert_eq!(extract_turn_id("-"), None);
        assert_eq!(extract_turn_id("99999999999999999999"), None);
    }

    #[test]
    fn only_done_frames_carry_turn_ids() {
        let mut envelope = ChunkEnvelope::new("12", ChunkKind::OutputText);
        assert_eq!(envelope.trailing_turn_id(), None);
        envelope.done = true;
        assert_eq!(envelope.trailing_turn_id(), Some(TurnId::new(12)));
    }

    #[test]
    fn known_tags_decode_and_unknown_tags_do_not() {
        assert_eq!(ChunkKind::from_tag("tool_output"), Some(ChunkKind::ToolOutput));
        assert_eq!(
            ChunkKind::from_tag("reasoning_summary"),
            Some(ChunkKind::ReasoningSummary)
        );
        assert_eq!(ChunkKind::from_tag("image"), None);
        assert!(ChunkKind::ToolCalls.is_foldable());
        assert!(!ChunkKind::OutputText.is_foldable());
    }
}
