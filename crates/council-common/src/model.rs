//! Model selection types.

use serde::{Deserialize, Serialize};

/// Supported LLM gateway providers.
///
/// Each provider (except a local Ollama) authenticates with a key read from
/// its own environment variable:
/// - OpenRouter - `OPENROUTER_API_KEY`
/// - OpenAI - `OPENAI_API_KEY`
/// - Anthropic - `ANTHROPIC_API_KEY`
/// - DeepSeek - `DEEPSEEK_API_KEY`
/// - Gemini - `GEMINI_API_KEY`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenRouter,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    DeepSeek,
    Gemini,
    Ollama,
}

impl Provider {
    pub fn all() -> &'static [Provider] {
        &[
            Provider::OpenRouter,
            Provider::OpenAI,
            Provider::Anthropic,
            Provider::DeepSeek,
            Provider::Gemini,
            Provider::Ollama,
        ]
    }

    /// Environment variable holding this provider's API key, if it needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Ollama => None,
        }
    }

    /// OpenAI-compatible endpoint used when a config carries no `base_url`.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Gemini => "gemini",
            Provider::Ollama => "ollama",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openrouter" => Ok(Provider::OpenRouter),
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "deepseek" => Ok(Provider::DeepSeek),
            "gemini" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(format!(
                "Invalid provider '{}'. Valid values: openrouter, openai, anthropic, deepseek, gemini, ollama",
                s
            )),
        }
    }
}

/// Fully resolved model selection for one ability invocation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelConfig {
    pub fn new(provider: Provider, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Base URL to call, falling back to the provider's default endpoint.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Replace each field the override sets; leave the rest untouched.
    pub fn apply(&mut self, over: &ModelOverride) {
        if let Some(provider) = over.provider {
            self.provider = provider;
        }
        if let Some(ref name) = over.model_name {
            self.model_name = name.clone();
        }
        if let Some(ref key) = over.api_key {
            self.api_key = Some(key.clone());
        }
        if let Some(ref url) = over.base_url {
            self.base_url = Some(url.clone());
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model_name", &self.model_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Field-level override of a [`ModelConfig`]. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelOverride {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none()
            && self.model_name.is_none()
            && self.api_key.is_none()
            && self.base_url.is_none()
    }

    /// Layer `other` on top of `self`; fields `other` sets win.
    pub fn merged_with(&self, other: &ModelOverride) -> ModelOverride {
        ModelOverride {
            provider: other.provider.or(self.provider),
            model_name: other.model_name.clone().or_else(|| self.model_name.clone()),
            api_key: other.api_key.clone().or_else(|| self.api_key.clone()),
            base_url: other.base_url.clone().or_else(|| self.base_url.clone()),
        }
    }
}
