//! Chat-completion ability backed by an OpenAI-compatible gateway.

use crate::ability::{Ability, AbilityContext};
use crate::errors::AbilityError;
use async_trait::async_trait;
use council_common::{MemoryConfig, MemoryStrategy, ModelConfig, Patch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Produces text for a system/user prompt pair with a given model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        model: &ModelConfig,
    ) -> Result<String, AbilityError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    temperature: f32,
}

impl GatewayClient {
    pub fn new(timeout: Duration) -> Result<Self, AbilityError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            temperature: 0.7,
        })
    }
}

#[async_trait]
impl TextGenerator for GatewayClient {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        model: &ModelConfig,
    ) -> Result<String, AbilityError> {
        if model.api_key.is_none() && model.provider.api_key_env().is_some() {
            return Err(AbilityError::MissingApiKey {
                provider: model.provider.to_string(),
            });
        }

        let url = format!("{}/chat/completions", model.endpoint().trim_end_matches('/'));
        let body = ChatRequest {
            model: &model.model_name,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(ref key) = model.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(url = %url, model = %model.model_name, "Sending chat completion");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AbilityError::GatewayStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AbilityError::EmptyResponse)
    }
}

/// Render the memory policy as a line of guidance for the model.
pub(crate) fn memory_guidance(memory: &MemoryConfig) -> String {
    match (memory.strategy, memory.top_k) {
        (MemoryStrategy::History, _) => {
            "Ground your answer in the running history provided.".to_string()
        }
        (MemoryStrategy::Situation, Some(k)) => format!(
            "Draw on the {} most similar past situations you are aware of.",
            k
        ),
        (MemoryStrategy::Situation, None) => {
            "Draw on similar past situations you are aware of.".to_string()
        }
    }
}

/// Pretty-printed input slice, the user content of most prompts.
pub(crate) fn render_input(input: &Patch) -> String {
    serde_json::to_string_pretty(&Value::Object(input.clone())).unwrap_or_default()
}

/// Text written in place of a reply when the gateway call fails and the
/// ability is configured to degrade.
pub(crate) fn unavailable(ability: &str, err: &AbilityError) -> String {
    format!("[{} unavailable: {}]", ability, err)
}

/// One chat completion whose reply becomes a single output field.
pub struct ChatAbility {
    generator: Arc<dyn TextGenerator>,
    instructions: String,
    output_key: Option<String>,
    degrade_on_error: bool,
}

impl ChatAbility {
    pub fn new(generator: Arc<dyn TextGenerator>, instructions: impl Into<String>) -> Self {
        Self {
            generator,
            instructions: instructions.into(),
            output_key: None,
            degrade_on_error: false,
        }
    }

    /// Write the reply here instead of the unit's first declared output.
    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Turn gateway failures into a placeholder reply instead of an error.
    pub fn degrade_on_error(mut self, degrade: bool) -> Self {
        self.degrade_on_error = degrade;
        self
    }

    fn system_prompt(&self, ctx: &AbilityContext) -> String {
        format!(
            "{}\nYou are acting as: {}.\n{}",
            self.instructions,
            ctx.display_text,
            memory_guidance(&ctx.memory)
        )
    }
}

#[async_trait]
impl Ability for ChatAbility {
    async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
        let Some(key) = self.output_key.as_deref().or(ctx.primary_output()) else {
            anyhow::bail!("Unit '{}' declares no output for its reply", ctx.unit_id);
        };

        let system = self.system_prompt(ctx);
        let user = format!("Current state:\n{}", render_input(&input));
        let reply = match self.generator.generate(&system, &user, &ctx.model).await {
            Ok(text) => text,
            Err(err) if self.degrade_on_error => {
                tracing::warn!(unit = %ctx.unit_id, error = %err, "Chat ability degraded");
                unavailable(&ctx.ability, &err)
            }
            Err(err) => return Err(err.into()),
        };

        let mut patch = Patch::new();
        patch.insert(key.to_string(), Value::String(reply));
        Ok(Some(patch))
    }
}
