//! Project configuration read from `.council/council.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags. Model
//! overrides can target ability keys by glob pattern; when several patterns
//! match, longer (more specific) patterns are applied later and win.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "research-desk"
//! pipeline = "pipeline.yaml"
//!
//! [defaults]
//! memory_strategy = "situation"
//! top_k = 2
//! degrade_on_error = true
//! request_timeout_secs = 120
//! ui = "full"
//!
//! [models.default]
//! provider = "openrouter"
//! model_name = "openai/gpt-4o-mini"
//!
//! [models.overrides."*_manager"]
//! model_name = "openai/gpt-4o"
//!
//! [models.overrides."risk_manager"]
//! provider = "openai"
//! model_name = "gpt-4o"
//! ```

use anyhow::{Context, Result};
use council_common::{MemoryConfig, MemoryStrategy, ModelOverride, Provider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "council.toml";
pub const DEFAULT_PIPELINE_FILE: &str = "pipeline.yaml";

pub const ENV_MEMORY_STRATEGY: &str = "COUNCIL_MEMORY_STRATEGY";
pub const ENV_TOP_K: &str = "COUNCIL_TOP_K";
pub const ENV_PROVIDER: &str = "COUNCIL_PROVIDER";
pub const ENV_MODEL: &str = "COUNCIL_MODEL";
pub const ENV_BASE_URL: &str = "COUNCIL_BASE_URL";

/// Project-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Display name (defaults to the directory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pipeline file, relative to `.council/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

/// Defaults applied to every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Memory strategy for units that declare none
    #[serde(default)]
    pub memory_strategy: MemoryStrategy,
    /// Neighbours retrieved by the situation strategy
    #[serde(default = "default_top_k", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Replace failed gateway calls with a placeholder instead of failing the run
    #[serde(default = "default_degrade_on_error")]
    pub degrade_on_error: bool,
    /// Per-request timeout for the LLM gateway
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Progress display: full, minimal or json
    #[serde(default = "default_ui")]
    pub ui: String,
}

fn default_top_k() -> Option<u32> {
    MemoryConfig::DEFAULT.top_k
}

fn default_degrade_on_error() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_ui() -> String {
    "full".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            memory_strategy: MemoryStrategy::default(),
            top_k: default_top_k(),
            degrade_on_error: default_degrade_on_error(),
            request_timeout_secs: default_request_timeout_secs(),
            ui: default_ui(),
        }
    }
}

impl DefaultsSection {
    pub fn memory(&self) -> MemoryConfig {
        MemoryConfig {
            strategy: self.memory_strategy,
            top_k: self.top_k,
        }
    }
}

/// Model overrides: one for every ability plus glob-keyed ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsSection {
    #[serde(default, skip_serializing_if = "ModelOverride::is_empty")]
    pub default: ModelOverride,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, ModelOverride>,
}

/// The complete council.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouncilToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub models: ModelsSection,
}

impl CouncilToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse council.toml")
    }

    /// Load `.council/council.toml`, or defaults when the file does not exist.
    pub fn load_or_default(council_dir: &Path) -> Result<Self> {
        let config_path = council_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize council.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Model override for one ability key: `[models.default]` first, then
    /// every matching pattern from shortest to longest.
    pub fn model_override_for(&self, ability: &str) -> ModelOverride {
        let mut matching: Vec<(&String, &ModelOverride)> = self
            .models
            .overrides
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, ability))
            .collect();
        matching.sort_by_key(|(pattern, _)| pattern.len());

        matching
            .into_iter()
            .fold(self.models.default.clone(), |acc, (_, over)| acc.merged_with(over))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.top_k == Some(0) {
            warnings.push("defaults.top_k is 0: situation memory will retrieve nothing".to_string());
        }
        if self.defaults.memory_strategy == MemoryStrategy::History && self.defaults.top_k.is_some() {
            warnings.push("defaults.top_k is ignored by the history memory strategy".to_string());
        }
        if self.defaults.request_timeout_secs == 0 {
            warnings.push("defaults.request_timeout_secs is 0: every gateway call will time out".to_string());
        }
        if !matches!(self.defaults.ui.as_str(), "full" | "minimal" | "json") {
            warnings.push(format!(
                "Invalid ui '{}': should be full, minimal or json",
                self.defaults.ui
            ));
        }

        let layers = std::iter::once(("models.default".to_string(), &self.models.default)).chain(
            self.models
                .overrides
                .iter()
                .map(|(pattern, over)| (format!("models.overrides.\"{}\"", pattern), over)),
        );
        for (name, over) in layers {
            if over.api_key.is_some() {
                warnings.push(format!(
                    "{} stores an api_key in council.toml; prefer the provider's environment variable",
                    name
                ));
            }
            if let Some(ref url) = over.base_url
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                warnings.push(format!("{} has base_url '{}' without an http(s) scheme", name, url));
            }
        }

        for pattern in self.models.overrides.keys() {
            if pattern.trim().is_empty() {
                warnings.push("Empty pattern in [models.overrides]".to_string());
            }
        }

        warnings
    }
}

/// Check if a pattern matches an ability key, case-insensitively.
/// Supports simple glob patterns:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    glob_match(&pattern, &name)
}

fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            let rest = trim_leading_stars(rest);
            if rest.is_empty() {
                return true;
            }
            (0..=text.len()).any(|i| glob_match(rest, &text[i..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

fn trim_leading_stars(pattern: &[char]) -> &[char] {
    let skip = pattern.iter().take_while(|&&c| c == '*').count();
    &pattern[skip..]
}

/// Values read from `COUNCIL_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub memory_strategy: Option<MemoryStrategy>,
    pub top_k: Option<u32>,
    pub model: ModelOverride,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let memory_strategy = get(ENV_MEMORY_STRATEGY)
            .map(|v| v.parse::<MemoryStrategy>().map_err(anyhow::Error::msg))
            .transpose()
            .with_context(|| format!("Invalid {}", ENV_MEMORY_STRATEGY))?;
        let top_k = get(ENV_TOP_K)
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .with_context(|| format!("Invalid {}", ENV_TOP_K))?;
        let provider = get(ENV_PROVIDER)
            .map(|v| v.parse::<Provider>().map_err(anyhow::Error::msg))
            .transpose()
            .with_context(|| format!("Invalid {}", ENV_PROVIDER))?;

        Ok(Self {
            memory_strategy,
            top_k,
            model: ModelOverride {
                provider,
                model_name: get(ENV_MODEL),
                api_key: None,
                base_url: get(ENV_BASE_URL),
            },
        })
    }
}

/// File plus environment configuration for one project directory.
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    pub project_dir: PathBuf,
    pub council_dir: PathBuf,
    pub toml: CouncilToml,
    pub env: EnvOverrides,
}

impl CouncilConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let env = EnvOverrides::from_env()?;
        Self::with_env(project_dir, env)
    }

    pub fn with_env(project_dir: PathBuf, env: EnvOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let council_dir = project_dir.join(crate::init::COUNCIL_DIR);
        let toml = CouncilToml::load_or_default(&council_dir)?;

        Ok(Self {
            project_dir,
            council_dir,
            toml,
            env,
        })
    }

    pub fn project_name(&self) -> String {
        self.toml
            .project
            .name
            .clone()
            .or_else(|| {
                self.project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "council".to_string())
    }

    pub fn config_file(&self) -> PathBuf {
        self.council_dir.join(CONFIG_FILE)
    }

    pub fn pipeline_file(&self) -> PathBuf {
        let name = self
            .toml
            .project
            .pipeline
            .as_deref()
            .unwrap_or(DEFAULT_PIPELINE_FILE);
        self.council_dir.join(name)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.council_dir.join("sessions")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.council_dir.join("logs")
    }

    /// Global memory default from the file.
    pub fn default_memory(&self) -> MemoryConfig {
        self.toml.defaults.memory()
    }

    /// Memory override from the environment, if the strategy is set there.
    pub fn env_memory(&self) -> Option<MemoryConfig> {
        self.env.memory_strategy.map(|strategy| MemoryConfig {
            strategy,
            top_k: self.env.top_k.or(self.toml.defaults.top_k),
        })
    }

    /// File override for `ability` with the environment layered on top.
    pub fn model_override_for(&self, ability: &str) -> ModelOverride {
        self.toml
            .model_override_for(ability)
            .merged_with(&self.env.model)
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = CouncilToml::parse("").unwrap();
        assert_eq!(config.defaults.memory(), MemoryConfig::DEFAULT);
        assert!(config.defaults.degrade_on_error);
        assert_eq!(config.defaults.request_timeout_secs, 120);
        assert_eq!(config.defaults.ui, "full");
        assert!(config.models.overrides.is_empty());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
[project]
name = "desk"
pipeline = "custom.yaml"

[defaults]
memory_strategy = "history"
degrade_on_error = false

[models.default]
provider = "openrouter"
model_name = "openai/gpt-4o-mini"

[models.overrides."*_analyst"]
model_name = "deepseek/deepseek-chat"

[models.overrides."news_analyst"]
provider = "openai"
model_name = "gpt-4o"
"#;
        let config = CouncilToml::parse(content).unwrap();
        assert_eq!(config.project.name.as_deref(), Some("desk"));
        assert_eq!(config.defaults.memory_strategy, MemoryStrategy::History);
        assert!(!config.defaults.degrade_on_error);

        let market = config.model_override_for("market_analyst");
        assert_eq!(market.provider, Some(Provider::OpenRouter));
        assert_eq!(market.model_name.as_deref(), Some("deepseek/deepseek-chat"));

        let news = config.model_override_for("news_analyst");
        assert_eq!(news.provider, Some(Provider::OpenAI));
        assert_eq!(news.model_name.as_deref(), Some("gpt-4o"));

        let trader = config.model_override_for("trader");
        assert_eq!(trader.model_name.as_deref(), Some("openai/gpt-4o-mini"));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*_analyst", "market_analyst"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("risk_*", "RISK_manager"));
        assert!(pattern_matches("b??r_researcher", "bear_researcher"));
        assert!(pattern_matches("*research*", "bull_researcher"));
        assert!(pattern_matches("**", ""));
        assert!(!pattern_matches("*_analyst", "trader"));
        assert!(!pattern_matches("trader", "trader_x"));
        assert!(!pattern_matches("?", ""));
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[defaults]
top_k = 0
ui = "fancy"
request_timeout_secs = 0

[models.overrides."trader"]
api_key = "sk-inline"
base_url = "localhost:8080"
"#;
        let warnings = CouncilToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 5, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("api_key")));
        assert!(warnings.iter().any(|w| w.contains("http(s)")));
        assert!(warnings.iter().any(|w| w.contains("fancy")));
    }

    #[test]
    fn test_env_overrides_parse() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MEMORY_STRATEGY, "history"),
            (ENV_TOP_K, " 4 "),
            (ENV_PROVIDER, "ollama"),
            (ENV_MODEL, "llama3"),
            (ENV_BASE_URL, ""),
        ]);
        let env = EnvOverrides::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(env.memory_strategy, Some(MemoryStrategy::History));
        assert_eq!(env.top_k, Some(4));
        assert_eq!(env.model.provider, Some(Provider::Ollama));
        assert_eq!(env.model.model_name.as_deref(), Some("llama3"));
        assert!(env.model.base_url.is_none());
    }

    #[test]
    fn test_env_overrides_reject_bad_values() {
        let err = EnvOverrides::from_lookup(|k| (k == ENV_TOP_K).then(|| "many".to_string()))
            .unwrap_err();
        assert!(format!("{:#}", err).contains(ENV_TOP_K));

        let err = EnvOverrides::from_lookup(|k| (k == ENV_PROVIDER).then(|| "bedrock".to_string()))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("bedrock"));
    }

    #[test]
    fn test_council_config_layers_env_over_file() {
        let dir = TempDir::new().unwrap();
        let council_dir = dir.path().join(".council");
        std::fs::create_dir_all(&council_dir).unwrap();
        std::fs::write(
            council_dir.join(CONFIG_FILE),
            "[defaults]\ntop_k = 3\n\n[models.default]\nmodel_name = \"file-model\"\n",
        )
        .unwrap();

        let env = EnvOverrides {
            memory_strategy: Some(MemoryStrategy::Situation),
            top_k: None,
            model: ModelOverride {
                model_name: Some("env-model".into()),
                ..Default::default()
            },
        };
        let config = CouncilConfig::with_env(dir.path().to_path_buf(), env).unwrap();

        assert_eq!(config.default_memory(), MemoryConfig::situation(3));
        assert_eq!(config.env_memory(), Some(MemoryConfig::situation(3)));
        assert_eq!(
            config.model_override_for("trader").model_name.as_deref(),
            Some("env-model")
        );
        assert!(config.pipeline_file().ends_with(".council/pipeline.yaml"));
        assert!(config.sessions_dir().ends_with(".council/sessions"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = CouncilToml::default();
        config.models.overrides.insert(
            "*_manager".into(),
            ModelOverride {
                model_name: Some("openai/gpt-4o".into()),
                ..Default::default()
            },
        );
        config.save(&path).unwrap();

        let loaded = CouncilToml::load(&path).unwrap();
        assert_eq!(
            loaded.model_override_for("risk_manager").model_name.as_deref(),
            Some("openai/gpt-4o")
        );
    }
}
