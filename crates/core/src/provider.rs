//! Provider trait: the abstraction over model backends.
//!
//! A Provider knows how to send a prompt to a model and get one complete
//! response back. The pipeline only ever asks for JSON-schema-constrained
//! output, so the request carries an optional [`ResponseFormat`].
//!
//! Implementations: OpenAI-compatible endpoints, scripted test providers.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The prompt messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Structured output contract the model must follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn default_temperature() -> f32 {
    0.2
}

/// A structured response contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form JSON object.
    JsonObject,
    /// JSON constrained by a named schema.
    JsonSchema {
        name: String,
        schema: serde_json::Value,
        #[serde(default = "default_strict")]
        strict: bool,
    },
}

fn default_strict() -> bool {
    true
}

impl ResponseFormat {
    /// Build a strict JSON-schema format.
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::JsonSchema {
            name: name.into(),
            schema,
            strict: true,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Raw text content of the first choice
    pub content: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Provider-side response identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Prompt tokens served from the provider's cache
    #[serde(default)]
    pub cached_tokens: u32,
    /// Hidden reasoning tokens billed as output
    #[serde(default)]
    pub reasoning_tokens: u32,
}

/// The core Provider trait.
///
/// The Tier 2 orchestrator calls `complete()` without knowing which backend
/// is in use. One call per stage; retries are never performed here.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest =
            serde_json::from_value(serde_json::json!({"model": "m", "messages": []})).unwrap();
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
        assert!(req.response_format.is_none());
    }

    #[test]
    fn response_format_serialization() {
        let format = ResponseFormat::json_schema(
            "situational_assessment",
            serde_json::json!({"type": "object"}),
        );
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["name"], "situational_assessment");
        assert_eq!(json["strict"], true);
    }

    #[test]
    fn usage_defaults_optional_counters() {
        let usage: Usage = serde_json::from_value(serde_json::json!({
            "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15
        }))
        .unwrap();
        assert_eq!(usage.cached_tokens, 0);
        assert_eq!(usage.reasoning_tokens, 0);
    }
}
