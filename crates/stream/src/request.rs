use serde::{Deserialize, Serialize};

use crate::ids::TurnId;

/// Per-request backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub operator: String,
    pub base_model: String,
    #[serde(default)]
    pub tools_name: Vec<String>,
    #[serde(default)]
    pub short_term_memory: Vec<TurnId>,
    #[serde(default)]
    pub long_term_memory: Vec<String>,
}

/// JSON body POSTed to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_name: String,
    pub message: String,
    // Storage paths of images uploaded beforehand, never inline bytes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<String>,
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(
        user_name: impl Into<String>,
        message: impl Into<String>,
        config: ChatConfig,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            message: message.into(),
            image: Vec::new(),
            config,
        }
    }

    pub fn with_images(mut self, paths: Vec<String>) -> Self {
        self.image = paths;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChatConfig {
        ChatConfig {
            operator: "openai".to_string(),
            base_model: "gpt-4.1".to_string(),
            tools_name: vec!["search".to_string()],
            short_term_memory: vec![TurnId::new(3), TurnId::new(9)],
            long_term_memory: Vec::new(),
        }
    }

    #[test]
    fn body_matches_wire_shape() {
        let request = ChatRequest::new("alice", "hi", config());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "user_name": "alice",
                "message": "hi",
                "config": {
                    "operator": "openai",
                    "base_model": "gpt-4.1",
                    "tools_name": ["search"],
                    "short_term_memory": [3, 9],
                    "long_term_memory": []
                }
            })
        );
    }

    #[test]
    fn image_paths_are_sent_when_present() {
        let request = ChatRequest::new("alice", "look", config())
            .with_images(vec!["uploads/a.png".to_string()]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["image"], serde_json::json!(["uploads/a.png"]));
    }
}
