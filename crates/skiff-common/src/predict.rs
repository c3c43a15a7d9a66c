use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /{app}/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictRequest {
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub output: Value,

    /// True when the application's default output was returned instead of a
    /// model prediction.
    pub default: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_explanation: Option<String>,
}

impl PredictResponse {
    pub fn prediction(output: Value) -> Self {
        Self {
            output,
            default: false,
            default_explanation: None,
        }
    }

    pub fn fallback(output: Value, explanation: impl Into<String>) -> Self {
        Self {
            output,
            default: true,
            default_explanation: Some(explanation.into()),
        }
    }
}
