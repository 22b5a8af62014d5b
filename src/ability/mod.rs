//! Abilities: the async functions units invoke, and the registry resolving them.
//!
//! An ability receives the slice of state its unit declared as inputs plus an
//! [`AbilityContext`] carrying the resolved model and memory configuration.
//! It returns a patch (or `None` for an empty one). Abilities never read
//! process-wide configuration; everything they need arrives through the context.
//!
//! Bundled implementations:
//! - [`ChatAbility`] - one chat completion against an OpenAI-compatible gateway
//! - [`DebateTurnAbility`] - one member's turn in a debate, appended to the debate sub-state
//! - [`DryRunAbility`] - deterministic offline stand-in
//! - [`RecordingAbility`] - wraps another ability and logs every invocation

pub mod chat;
pub mod debate;
pub mod dry_run;
pub mod recording;

pub use chat::{ChatAbility, GatewayClient, TextGenerator};
pub use debate::DebateTurnAbility;
pub use dry_run::DryRunAbility;
pub use recording::RecordingAbility;

use crate::errors::ConfigError;
use crate::pipeline::{DebateSeat, Unit};
use async_trait::async_trait;
use council_common::{MemoryConfig, ModelConfig, Patch};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Everything an ability learns about the invocation besides its input slice.
#[derive(Debug, Clone)]
pub struct AbilityContext {
    pub unit_id: String,
    pub display_text: String,
    pub ability: String,
    /// Output fields the unit declared, in declaration order.
    pub outputs: Vec<String>,
    pub model: ModelConfig,
    pub memory: MemoryConfig,
    pub debate: Option<DebateSeat>,
}

impl AbilityContext {
    pub fn for_unit(unit: &Unit, model: ModelConfig, memory: MemoryConfig) -> Self {
        Self {
            unit_id: unit.id.clone(),
            display_text: unit.display_text.clone(),
            ability: unit.ability.clone(),
            outputs: unit.outputs.clone(),
            model,
            memory,
            debate: unit.debate.clone(),
        }
    }

    /// Label used when the unit speaks in a transcript.
    pub fn speaker(&self) -> &str {
        self.debate
            .as_ref()
            .map(|seat| seat.member_text.as_str())
            .unwrap_or(&self.display_text)
    }

    /// First declared output, the default destination for single-output abilities.
    pub fn primary_output(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }
}

#[async_trait]
pub trait Ability: Send + Sync {
    async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>>;
}

/// Adapts an async closure into an [`Ability`].
pub struct FnAbility<F> {
    f: F,
}

impl<F> FnAbility<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Ability for FnAbility<F>
where
    F: Fn(Patch, AbilityContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Patch>>> + Send,
{
    async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
        (self.f)(input, ctx.clone()).await
    }
}

/// Lookup from ability key to implementation. Populated before a run starts
/// and read-only while it executes.
#[derive(Clone, Default)]
pub struct AbilityRegistry {
    abilities: HashMap<String, Arc<dyn Ability>>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ability, replacing any previous entry for the key.
    pub fn register(&mut self, key: impl Into<String>, ability: Arc<dyn Ability>) -> &mut Self {
        self.abilities.insert(key.into(), ability);
        self
    }

    pub fn with(mut self, key: impl Into<String>, ability: impl Ability + 'static) -> Self {
        self.register(key, Arc::new(ability));
        self
    }

    /// Register an async closure.
    pub fn with_fn<F, Fut>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Patch, AbilityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Patch>>> + Send + 'static,
    {
        self.with(key, FnAbility::new(f))
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Ability>> {
        self.abilities.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.abilities.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.abilities.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Fail on the first unit whose ability key has no registration.
    pub fn check(&self, units: &[Unit]) -> Result<(), ConfigError> {
        match units.iter().find(|u| !self.contains(&u.ability)) {
            Some(unit) => Err(ConfigError::UnknownAbility {
                unit_id: unit.id.clone(),
                ability: unit.ability.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Replace every entry with `wrap(key, ability)`.
    pub fn map<W>(mut self, wrap: W) -> Self
    where
        W: Fn(&str, Arc<dyn Ability>) -> Arc<dyn Ability>,
    {
        self.abilities = self
            .abilities
            .into_iter()
            .map(|(key, ability)| {
                let wrapped = wrap(&key, ability);
                (key, wrapped)
            })
            .collect();
        self
    }
}

impl std::fmt::Debug for AbilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityRegistry")
            .field("abilities", &self.keys())
            .finish()
    }
}
