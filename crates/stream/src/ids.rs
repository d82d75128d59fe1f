use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared by every assistant message produced for one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Backend conversation-turn id, carried by the terminal chunk of a stream and
/// echoed back through `short_term_memory` on later requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub i64);

impl TurnId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique_per_request() {
        assert_ne!(MessageId::new_v7(), MessageId::new_v7());
    }

    #[test]
    fn message_id_serializes_as_uuid_string() {
        let id = MessageId::new_v7();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn turn_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&vec![TurnId::new(7), TurnId::new(-3)]).unwrap();
        assert_eq!(json, "[7,-3]");
    }
}
