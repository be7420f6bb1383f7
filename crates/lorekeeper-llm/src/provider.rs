//! # Provider abstraction
//!
//! Provider-neutral message types and the [`LlmProvider`] trait the
//! annotator talks to.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::error::Result;
use crate::openai::{OpenAiConfig, OpenAiProvider};

/// Environment variable selecting the provider.
pub const PROVIDER_ENV: &str = "DM_THIS_CHAT_LLM";

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Image file, read and encoded when the request is built.
    Image(PathBuf),
}

/// Body of a message: plain text or a list of parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Parts(Vec<MessageContent>),
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub body: MessageBody,
}

impl LlmMessage {
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn parts(role: MessageRole, parts: Vec<MessageContent>) -> Self {
        Self {
            role,
            body: MessageBody::Parts(parts),
        }
    }
}

/// A completed model reply with token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A chat-completion backend.
pub trait LlmProvider {
    /// Sends `messages`, preceded by `system_prompt` when given, and waits
    /// for the reply.
    fn send_message(
        &self,
        messages: &[LlmMessage],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse>;

    /// Display name of the backend.
    fn provider_name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model_name(&self) -> &str;

    /// Whether the model accepts image parts.
    fn supports_images(&self) -> bool;
}

impl<P: LlmProvider + ?Sized> LlmProvider for Box<P> {
    fn send_message(
        &self,
        messages: &[LlmMessage],
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        (**self).send_message(messages, system_prompt)
    }

    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn supports_images(&self) -> bool {
        (**self).supports_images()
    }
}

/// Known provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown LLM provider: {other}")),
        }
    }
}

impl ProviderKind {
    /// Reads [`PROVIDER_ENV`], falling back to OpenAI when unset or unknown.
    pub fn from_env() -> Self {
        Self::from_setting(std::env::var(PROVIDER_ENV).ok().as_deref())
    }

    fn from_setting(value: Option<&str>) -> Self {
        match value {
            None => ProviderKind::default(),
            Some(value) => value.parse().unwrap_or_else(|e| {
                warn!(value, error = %e, "Falling back to OpenAI");
                ProviderKind::default()
            }),
        }
    }
}

/// Builds the provider selected by the environment.
///
/// `model` overrides the provider's configured model.
pub fn default_provider(model: Option<&str>) -> Result<Box<dyn LlmProvider>> {
    match ProviderKind::from_env() {
        ProviderKind::OpenAi => {
            let mut config = OpenAiConfig::from_env()?;
            if let Some(model) = model {
                config = config.with_model(model);
            }
            Ok(Box::new(OpenAiProvider::new(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn unknown_or_missing_setting_falls_back_to_openai() {
        assert_eq!(ProviderKind::from_setting(None), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_setting(Some("mystery")), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_setting(Some(" openai ")), ProviderKind::OpenAi);
    }

    #[test]
    fn message_constructors() {
        let msg = LlmMessage::text(MessageRole::User, "hello");
        assert_eq!(msg.body, MessageBody::Text("hello".into()));
        assert_eq!(msg.role.to_string(), "user");

        let msg = LlmMessage::parts(
            MessageRole::User,
            vec![MessageContent::Image(PathBuf::from("a.png"))],
        );
        assert!(matches!(msg.body, MessageBody::Parts(ref p) if p.len() == 1));
    }
}
