//! Text provider abstraction
//!
//! The network call to a generative model lives behind [`TextProvider`].
//! Implementations own transport, retries and timeouts; nothing in this
//! crate retries or times out a provider call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A fully resolved completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// User prompt
    pub prompt: String,
    /// System prompt
    pub system_prompt: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of output
    Stop,
    /// Hit the token limit; the reply is probably truncated
    Length,
    /// Blocked by the provider's content filter
    ContentFilter,
    /// Anything else the provider reports
    Other(String),
}

impl FinishReason {
    /// Map a provider's raw finish reason string
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Raw provider reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text, unsanitized
    pub text: String,
    /// Tokens billed for the call
    pub tokens_used: u64,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// A generative text backend
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider name, part of every cache key
    fn name(&self) -> &str;

    /// Run one completion
    async fn complete_text(&self, request: &CompletionRequest) -> Result<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_maps_known_values() {
        assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("max_tokens"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_provider("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(
            FinishReason::from_provider("tool_use"),
            FinishReason::Other("tool_use".to_string())
        );
    }

    #[test]
    fn finish_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FinishReason::ContentFilter).unwrap();
        assert_eq!(json, "\"content_filter\"");
    }
}
