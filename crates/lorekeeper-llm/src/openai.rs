//! # OpenAI chat completions
//!
//! [`LlmProvider`] over the OpenAI chat-completions HTTP API, using a
//! blocking client. Image parts are sent inline as base64 data URLs.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{LlmError, Result};
use crate::provider::{LlmMessage, LlmProvider, LlmResponse, MessageBody, MessageContent, MessageRole};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "OPENAI_MODEL";
pub const API_URL_ENV: &str = "OPENAI_API_URL";

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Connection settings for [`OpenAiProvider`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_url: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl OpenAiConfig {
    /// Creates a config for `api_key` with default model, limit and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Reads `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_API_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`OpenAiConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = set(API_KEY_ENV).ok_or(LlmError::MissingApiKey)?;
        let mut config = Self::new(api_key);
        if let Some(model) = set(MODEL_ENV) {
            config.model = model;
        }
        if let Some(url) = set(API_URL_ENV) {
            config.api_url = url;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

/// MIME type sent for an image file, chosen by extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

fn image_part(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    let url = format!("data:{};base64,{}", mime_type_for(path), STANDARD.encode(bytes));
    Ok(json!({
        "type": "image_url",
        "image_url": { "url": url, "detail": "high" },
    }))
}

fn message_json(message: &LlmMessage) -> Result<Value> {
    let content = match &message.body {
        MessageBody::Text(text) => Value::String(text.clone()),
        MessageBody::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    MessageContent::Text(text) => Ok(json!({ "type": "text", "text": text })),
                    MessageContent::Image(path) => image_part(path),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(json!({ "role": message.role.as_str(), "content": content }))
}

fn parse_response(body: &Value) -> Result<LlmResponse> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))?;
    let tokens = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_u64)
            .ok_or_else(|| LlmError::InvalidResponse(format!("missing {pointer}")))
    };

    Ok(LlmResponse {
        content: content.to_string(),
        input_tokens: tokens("/usage/prompt_tokens")?,
        output_tokens: tokens("/usage/completion_tokens")?,
    })
}

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    /// Provider built from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Request body for `messages`, with the system prompt first.
    pub fn build_payload(&self, messages: &[LlmMessage], system_prompt: Option<&str>) -> Result<Value> {
        let mut formatted = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = system_prompt {
            formatted.push(json!({ "role": MessageRole::System.as_str(), "content": prompt }));
        }
        for message in messages {
            formatted.push(message_json(message)?);
        }

        Ok(json!({
            "model": self.config.model,
            "messages": formatted,
            "max_tokens": self.config.max_tokens,
        }))
    }
}

impl LlmProvider for OpenAiProvider {
    fn send_message(
        &self,
        messages: &[LlmMessage],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        let payload = self.build_payload(messages, system_prompt)?;
        debug!(model = %self.config.model, messages = messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json()?;
        let reply = parse_response(&body)?;
        debug!(
            input_tokens = reply.input_tokens,
            output_tokens = reply.output_tokens,
            "Chat completion finished"
        );
        Ok(reply)
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_images(&self) -> bool {
        self.config.model.contains("gpt-4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn provider(model: &str) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig::new("sk-test").with_model(model)).unwrap()
    }

    #[test]
    fn config_requires_api_key() {
        assert!(matches!(
            OpenAiConfig::from_lookup(lookup(&[])),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiConfig::from_lookup(lookup(&[(API_KEY_ENV, "  ")])),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = OpenAiConfig::from_lookup(lookup(&[(API_KEY_ENV, "sk-1")])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.api_url, DEFAULT_API_URL);

        let config = OpenAiConfig::from_lookup(lookup(&[
            (API_KEY_ENV, "sk-1"),
            (MODEL_ENV, "gpt-4.1-mini"),
            (API_URL_ENV, "http://localhost:8080/v1/chat/completions"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.api_url, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let text = format!("{:?}", OpenAiConfig::new("sk-secret"));
        assert!(!text.contains("sk-secret"));
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.gif")), "image/gif");
        assert_eq!(mime_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn payload_puts_system_prompt_first_and_inlines_images() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("map.png");
        fs::write(&image, b"\x89PNG").unwrap();

        let messages = [LlmMessage::parts(
            MessageRole::User,
            vec![
                MessageContent::Text("describe".into()),
                MessageContent::Image(image),
            ],
        )];
        let payload = provider("gpt-4o").build_payload(&messages, Some("be terse")).unwrap();

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["max_tokens"], 4096);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][0]["content"], "be terse");

        let parts = &payload["messages"][1]["content"];
        assert_eq!(parts[0], json!({ "type": "text", "text": "describe" }));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["detail"], "high");
        assert_eq!(
            parts[1]["image_url"]["url"],
            format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG"))
        );
    }

    #[test]
    fn payload_without_system_prompt() {
        let messages = [LlmMessage::text(MessageRole::User, "hi")];
        let payload = provider("gpt-4o").build_payload(&messages, None).unwrap();
        assert_eq!(payload["messages"], json!([{ "role": "user", "content": "hi" }]));
    }

    #[test]
    fn missing_image_file_is_an_error() {
        let messages = [LlmMessage::parts(
            MessageRole::User,
            vec![MessageContent::Image(PathBuf::from("/nonexistent/map.png"))],
        )];
        assert!(matches!(
            provider("gpt-4o").build_payload(&messages, None),
            Err(LlmError::Io(_))
        ));
    }

    #[test]
    fn parses_choices_and_usage() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"a\":1}" } }],
            "usage": { "prompt_tokens": 1200, "completion_tokens": 80 },
        });
        let reply = parse_response(&body).unwrap();
        assert_eq!(reply.content, "{\"a\":1}");
        assert_eq!(reply.input_tokens, 1200);
        assert_eq!(reply.output_tokens, 80);

        let body = json!({ "choices": [], "usage": {} });
        assert!(matches!(parse_response(&body), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn image_support_by_model_family() {
        assert!(provider("gpt-4o").supports_images());
        assert!(provider("gpt-4-turbo").supports_images());
        assert!(!provider("gpt-3.5-turbo").supports_images());
        assert_eq!(provider("gpt-4o").provider_name(), "OpenAI");
    }

    #[test]
    fn unreachable_endpoint_is_an_http_error() {
        let config = OpenAiConfig::new("sk-test").with_api_url("http://127.0.0.1:9/v1/chat/completions");
        let provider = OpenAiProvider::new(config).unwrap();
        let result = provider.send_message(&[LlmMessage::text(MessageRole::User, "hi")], None);
        assert!(matches!(result, Err(LlmError::Http(_))));
    }
}
