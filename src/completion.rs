//! Chat completion provider.
//!
//! A completion is a single non-streaming request: one system message, one
//! user message, an output-token budget and a temperature. JSON mode asks
//! the model for a JSON object but the reply is still plain text to the
//! caller; parsing it is the assistant's job.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::http;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Request `response_format: {"type": "json_object"}`.
    pub json: bool,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// OpenAI-compatible `POST {base_url}/chat/completions`.
pub struct OpenAIChatProvider {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    pub fn new(config: &ChatConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(url = %self.url, model = %self.model, json = request.json, "Requesting completion");
        let reply = http::post_json_with_retry(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;
        parse_completion(&reply)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Provider("Invalid completion response: missing content".into()))
}

/// Build the configured chat provider, or `None` when running without one.
pub fn create_chat_provider(config: &ChatConfig) -> Option<Arc<dyn ChatProvider>> {
    if !config.is_enabled() {
        return None;
    }
    let api_key = match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!(
                env = %config.api_key_env,
                "Chat API key not set; assistant runs in fallback mode"
            );
            return None;
        }
    };
    match OpenAIChatProvider::new(config, api_key) {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            warn!(error = %e, "Failed to build chat client; assistant runs in fallback mode");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice_content() {
        let reply = json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        });
        assert_eq!(parse_completion(&reply).unwrap(), "Hi there");
    }

    #[test]
    fn missing_content_is_provider_error() {
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn disabled_config_has_no_provider() {
        let config = ChatConfig {
            provider: "disabled".into(),
            ..ChatConfig::default()
        };
        assert!(create_chat_provider(&config).is_none());
    }
}
