use serde::{Deserialize, Serialize};

pub const DEFAULT_OPERATOR: &str = "openai";
pub const DEFAULT_BASE_MODEL: &str = "gpt-4";

/// Base model entry as listed by the backend model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub operator: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub model_name: String,
    #[serde(rename = "isAvailable", default = "available_by_default")]
    pub is_available: bool,
}

impl ModelInfo {
    pub fn base(
        id: impl Into<String>,
        operator: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            model_type: "base".to_string(),
            model_name: model_name.into(),
            is_available: true,
        }
    }
}

/// Models offered when the backend list cannot be fetched.
pub fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::base("1", "openai", "gpt-4"),
        ModelInfo::base("2", "openai", "gpt-3.5-turbo"),
        ModelInfo::base("3", "anthropic", "claude-3-opus"),
        ModelInfo::base("4", "anthropic", "claude-3-sonnet"),
    ]
}

/// Resolves the operator serving `model_name`, defaulting to [`DEFAULT_OPERATOR`].
pub fn operator_for_model<'a>(catalog: &'a [ModelInfo], model_name: &str) -> &'a str {
    catalog
        .iter()
        .find(|model| model.model_name == model_name)
        .map_or(DEFAULT_OPERATOR, |model| model.operator.as_str())
}

fn available_by_default() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_lookup_falls_back_to_openai() {
        let catalog = fallback_models();
        assert_eq!(operator_for_model(&catalog, "claude-3-opus"), "anthropic");
        assert_eq!(operator_for_model(&catalog, "gpt-4"), "openai");
        assert_eq!(operator_for_model(&catalog, "unknown"), DEFAULT_OPERATOR);
        assert_eq!(operator_for_model(&[], "claude-3-opus"), DEFAULT_OPERATOR);
    }

    #[test]
    fn decodes_backend_model_rows() {
        let model: ModelInfo = serde_json::from_str(
            r#"{"id":"7","operator":"gemini","type":"base",
                "model_name":"gemini-pro","isAvailable":false}"#,
        )
        .unwrap();
        assert_eq!(model.operator, "gemini");
        assert!(!model.is_available);
    }
}
