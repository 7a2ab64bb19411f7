//! HTTP client for hosted chat models.
//!
//! Supports the Anthropic Messages API and OpenAI-compatible chat completion
//! APIs; the provider, model name, endpoint and key variable come from
//! [`ModelConfig`].

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use super::LanguageModel;
use crate::config::{ModelConfig, Provider};
use crate::error::{Error, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A [`LanguageModel`] backed by a provider's HTTP API
#[derive(Debug, Clone)]
pub struct ChatModel {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatModel {
    /// Create a client with an explicit endpoint and key
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: ModelConfig::default().max_tokens,
        }
    }

    /// Create a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let key_env = config.resolved_api_key_env();
        let api_key = std::env::var(&key_env).map_err(|_| {
            Error::config(format!(
                "Environment variable {} is not set; it must hold the model API key",
                key_env
            ))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url: config.resolved_base_url(),
            api_key,
            model: config.name.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, url: String, request: reqwest::RequestBuilder) -> Result<JsonValue> {
        let response = request.send().await.map_err(|e| {
            Error::model(format!("Request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::model(format!(
                "Model provider returned HTTP {}: {}",
                status, body
            )));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| Error::model(format!("Invalid response body from {}: {}", url, e)))
    }

    async fn generate_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });
        let request = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let value = self.post(url, request).await?;
        let text: Vec<&str> = value
            .get("content")
            .and_then(JsonValue::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(JsonValue::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(JsonValue::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::model("Response contained no text content"));
        }
        Ok(text.concat())
    }

    async fn generate_openai(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let request = self.http.post(&url).bearer_auth(&self.api_key).json(&body);

        let value = self.post(url, request).await?;
        value
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .map(String::from)
            .ok_or_else(|| Error::model("Response contained no message content"))
    }
}

#[async_trait]
impl LanguageModel for ChatModel {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        match self.provider {
            Provider::Anthropic => self.generate_anthropic(system, user).await,
            Provider::OpenAi => self.generate_openai(system, user).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_anthropic_joins_text_blocks() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "secret"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Hello "},
                    {"type": "text", "text": "world"}
                ]
            })))
            .mount(&server)
            .await;

        let model = ChatModel::new(Provider::Anthropic, server.uri(), "secret", "test-model");
        assert_eq!(model.generate("sys", "user").await?, "Hello world");
        Ok(())
    }

    #[tokio::test]
    async fn test_openai_reads_first_choice() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "answer"}}]
            })))
            .mount(&server)
            .await;

        let model = ChatModel::new(Provider::OpenAi, server.uri(), "secret", "gpt-test");
        assert_eq!(model.generate("sys", "user").await?, "answer");
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let model = ChatModel::new(Provider::Anthropic, server.uri(), "k", "m");
        let err = model.generate("s", "u").await.unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_empty_content_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let model = ChatModel::new(Provider::Anthropic, server.uri(), "k", "m");
        assert!(matches!(
            model.generate("s", "u").await,
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ModelConfig {
            api_key_env: Some("APIFORGE_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..ModelConfig::default()
        };
        assert!(matches!(
            ChatModel::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
