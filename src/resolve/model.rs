use council_common::{ModelConfig, ModelOverride, Provider};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Table key consulted when an ability has no entry of its own.
pub const DEFAULT_MODEL_KEY: &str = "default";

static DEFAULT_MODELS: LazyLock<HashMap<&'static str, ModelConfig>> = LazyLock::new(|| {
    let quick = |name: &str| ModelConfig::new(Provider::OpenRouter, name);
    HashMap::from([
        (DEFAULT_MODEL_KEY, quick("openai/gpt-4o-mini")),
        ("market_analyst", quick("openai/gpt-4o-mini")),
        ("social_analyst", quick("openai/gpt-4o-mini")),
        ("news_analyst", quick("openai/gpt-4o-mini")),
        ("fundamentals_analyst", quick("openai/gpt-4o-mini")),
        ("bull_researcher", quick("deepseek/deepseek-chat")),
        ("bear_researcher", quick("deepseek/deepseek-chat")),
        ("research_manager", quick("openai/gpt-4o")),
        ("trader", quick("openai/gpt-4o")),
        ("risky_analyst", quick("deepseek/deepseek-chat")),
        ("safe_analyst", quick("deepseek/deepseek-chat")),
        ("neutral_analyst", quick("deepseek/deepseek-chat")),
        ("risk_manager", quick("openai/gpt-4o")),
    ])
});

/// The built-in per-ability model table. Read-only and shared across runs.
pub fn default_model_table() -> &'static HashMap<&'static str, ModelConfig> {
    &DEFAULT_MODELS
}

/// Provider -> API key map, captured once so resolution stays pure.
#[derive(Clone, Default)]
pub struct ProviderKeys {
    keys: HashMap<Provider, String>,
}

impl ProviderKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read each provider's key variable from the process environment.
    /// Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read each provider's key variable through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = Provider::all()
            .iter()
            .filter_map(|p| {
                let value = lookup(p.api_key_env()?)?;
                (!value.trim().is_empty()).then_some((*p, value))
            })
            .collect();
        Self { keys }
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.keys.insert(provider, key.into());
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }

    /// Providers with a key available.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.keys.keys().copied().collect();
        providers.sort_by_key(|p| p.to_string());
        providers
    }
}

impl std::fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderKeys")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Resolves the model configuration for an ability key.
///
/// Lookup order for the default: entries registered on this resolver, then the
/// built-in table, then the built-in table's `default` entry. A runtime
/// override is merged field by field on top of that default. An API key is
/// filled from [`ProviderKeys`] only when neither the default nor the override
/// supplied one.
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    table: HashMap<String, ModelConfig>,
    keys: ProviderKeys,
}

impl ModelResolver {
    pub fn new(keys: ProviderKeys) -> Self {
        Self {
            table: HashMap::new(),
            keys,
        }
    }

    /// Resolver backed by the built-in table and the process environment.
    pub fn from_env() -> Self {
        Self::new(ProviderKeys::from_env())
    }

    /// Register (or replace) the default for one ability key.
    pub fn with_default(mut self, ability: impl Into<String>, config: ModelConfig) -> Self {
        self.table.insert(ability.into(), config);
        self
    }

    pub fn keys(&self) -> &ProviderKeys {
        &self.keys
    }

    /// Default configuration for an ability before any override is applied.
    pub fn default_for(&self, ability: &str) -> ModelConfig {
        self.table
            .get(ability)
            .or_else(|| DEFAULT_MODELS.get(ability))
            .or_else(|| self.table.get(DEFAULT_MODEL_KEY))
            .or_else(|| DEFAULT_MODELS.get(DEFAULT_MODEL_KEY))
            .cloned()
            .unwrap_or_else(|| ModelConfig::new(Provider::OpenRouter, "openai/gpt-4o-mini"))
    }

    pub fn resolve(&self, ability: &str, runtime: Option<&ModelOverride>) -> ModelConfig {
        let mut config = self.default_for(ability);
        if let Some(over) = runtime {
            config.apply(over);
        }
        if config.api_key.is_none()
            && let Some(key) = self.keys.get(config.provider)
        {
            config.api_key = Some(key.to_string());
        }
        config
    }
}

/// Resolve against the built-in table, reading provider keys from the
/// environment.
pub fn resolve_model(ability: &str, runtime: Option<&ModelOverride>) -> ModelConfig {
    ModelResolver::from_env().resolve(ability, runtime)
}
