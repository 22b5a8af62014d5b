use anyhow::{Context, Result};
use council_common::{MemoryConfig, MemoryStrategy, ModelOverride, Provider};
use std::path::PathBuf;
use std::time::Duration;

use crate::council_config::CouncilConfig;
use crate::pipeline::{RunOptions, Unit};
use crate::ui::UiMode;

/// Overrides given on the command line. They sit above the environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub memory_strategy: Option<MemoryStrategy>,
    pub top_k: Option<u32>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub fail_fast: bool,
    pub ui: Option<UiMode>,
}

impl CliOverrides {
    fn model(&self) -> ModelOverride {
        ModelOverride {
            provider: self.provider,
            model_name: self.model.clone(),
            api_key: None,
            base_url: self.base_url.clone(),
        }
    }
}

/// Runtime configuration for one command.
///
/// Bridges [`CouncilConfig`] (file and environment) with CLI flags and
/// produces the [`RunOptions`] the executor consumes.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub pipeline_file: PathBuf,
    pub sessions_dir: PathBuf,
    pub log_dir: PathBuf,
    pub verbose: bool,
    pub degrade_on_error: bool,
    pub request_timeout: Duration,
    pub ui: UiMode,
    council: CouncilConfig,
    cli: CliOverrides,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool, cli: CliOverrides) -> Result<Self> {
        let council = CouncilConfig::new(project_dir)?;
        Ok(Self::from_council(council, verbose, cli))
    }

    pub fn from_council(council: CouncilConfig, verbose: bool, cli: CliOverrides) -> Self {
        let defaults = &council.toml.defaults;
        let ui = cli
            .ui
            .or_else(|| defaults.ui.parse().ok())
            .unwrap_or_default();

        Self {
            project_dir: council.project_dir.clone(),
            pipeline_file: council.pipeline_file(),
            sessions_dir: council.sessions_dir(),
            log_dir: council.log_dir(),
            verbose,
            degrade_on_error: defaults.degrade_on_error && !cli.fail_fast,
            request_timeout: Duration::from_secs(defaults.request_timeout_secs),
            ui,
            council,
            cli,
        }
    }

    pub fn council(&self) -> &CouncilConfig {
        &self.council
    }

    /// Memory forced on every unit: CLI first, then environment.
    pub fn memory_override(&self) -> Option<MemoryConfig> {
        match self.cli.memory_strategy {
            Some(strategy) => Some(MemoryConfig {
                strategy,
                top_k: self
                    .cli
                    .top_k
                    .or(self.council.env.top_k)
                    .or(self.council.toml.defaults.top_k),
            }),
            None => self.council.env_memory().map(|mut memory| {
                if let Some(top_k) = self.cli.top_k {
                    memory.top_k = Some(top_k);
                }
                memory
            }),
        }
    }

    /// Memory for units that declare none, with a CLI `--top-k` applied.
    pub fn default_memory(&self) -> MemoryConfig {
        let mut memory = self.council.default_memory();
        if let Some(top_k) = self.cli.top_k {
            memory.top_k = Some(top_k);
        }
        memory
    }

    /// Model override for `ability`: file, then environment, then CLI.
    pub fn model_override_for(&self, ability: &str) -> ModelOverride {
        self.council
            .model_override_for(ability)
            .merged_with(&self.cli.model())
    }

    /// Executor options covering every ability the units reference.
    pub fn run_options(&self, units: &[Unit]) -> RunOptions {
        let mut options = RunOptions::default().with_default_memory(self.default_memory());
        if let Some(memory) = self.memory_override() {
            options = options.with_memory(memory);
        }
        for unit in units {
            if options.ability_models.contains_key(&unit.ability) {
                continue;
            }
            let over = self.model_override_for(&unit.ability);
            if !over.is_empty() {
                options = options.with_ability_model(unit.ability.clone(), over);
            }
        }
        options
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.sessions_dir)
            .context("Failed to create sessions directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council_config::{CONFIG_FILE, EnvOverrides};
    use crate::pipeline::{Step, expand};
    use std::fs;
    use tempfile::tempdir;

    fn council_with(toml: &str, env: EnvOverrides) -> (tempfile::TempDir, CouncilConfig) {
        let dir = tempdir().unwrap();
        let council_dir = dir.path().join(".council");
        fs::create_dir_all(&council_dir).unwrap();
        fs::write(council_dir.join(CONFIG_FILE), toml).unwrap();
        let council = CouncilConfig::with_env(dir.path().to_path_buf(), env).unwrap();
        (dir, council)
    }

    #[test]
    fn test_paths_live_under_council_dir() {
        let (dir, council) = council_with("", EnvOverrides::default());
        let config = Config::from_council(council, false, CliOverrides::default());
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.pipeline_file, root.join(".council/pipeline.yaml"));
        assert_eq!(config.sessions_dir, root.join(".council/sessions"));
        assert_eq!(config.log_dir, root.join(".council/logs"));
        assert_eq!(config.ui, UiMode::Full);
        assert!(config.degrade_on_error);
    }

    #[test]
    fn test_no_memory_override_without_env_or_cli() {
        let (_dir, council) = council_with("", EnvOverrides::default());
        let config = Config::from_council(council, false, CliOverrides::default());
        assert_eq!(config.memory_override(), None);
        assert_eq!(config.default_memory(), MemoryConfig::DEFAULT);
    }

    #[test]
    fn test_cli_memory_beats_env() {
        let env = EnvOverrides {
            memory_strategy: Some(MemoryStrategy::Situation),
            top_k: Some(7),
            ..Default::default()
        };
        let (_dir, council) = council_with("", env);
        let cli = CliOverrides {
            memory_strategy: Some(MemoryStrategy::History),
            ..Default::default()
        };
        let config = Config::from_council(council, false, cli);
        let memory = config.memory_override().unwrap();
        assert_eq!(memory.strategy, MemoryStrategy::History);
        assert_eq!(memory.top_k, Some(7));
    }

    #[test]
    fn test_cli_top_k_applies_to_env_strategy() {
        let env = EnvOverrides {
            memory_strategy: Some(MemoryStrategy::Situation),
            ..Default::default()
        };
        let (_dir, council) = council_with("", env);
        let cli = CliOverrides {
            top_k: Some(4),
            ..Default::default()
        };
        let config = Config::from_council(council, false, cli);
        assert_eq!(config.memory_override(), Some(MemoryConfig::situation(4)));
        assert_eq!(config.default_memory(), MemoryConfig::situation(4));
    }

    #[test]
    fn test_model_layers_file_env_cli() {
        let toml = r#"
[models.default]
provider = "openrouter"
model_name = "file-default"

[models.overrides."trader"]
model_name = "file-trader"
base_url = "https://file.example"
"#;
        let env = EnvOverrides {
            model: ModelOverride {
                base_url: Some("https://env.example".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (_dir, council) = council_with(toml, env);
        let cli = CliOverrides {
            provider: Some(Provider::Ollama),
            ..Default::default()
        };
        let config = Config::from_council(council, false, cli);

        let trader = config.model_override_for("trader");
        assert_eq!(trader.provider, Some(Provider::Ollama));
        assert_eq!(trader.model_name.as_deref(), Some("file-trader"));
        assert_eq!(trader.base_url.as_deref(), Some("https://env.example"));

        let other = config.model_override_for("market_analyst");
        assert_eq!(other.model_name.as_deref(), Some("file-default"));
    }

    #[test]
    fn test_run_options_cover_referenced_abilities() {
        let toml = "[models.overrides.\"*_manager\"]\nmodel_name = \"big\"\n";
        let (_dir, council) = council_with(toml, EnvOverrides::default());
        let config = Config::from_council(council, false, CliOverrides::default());
        let units = expand(&[
            Step::new("t", "Trader", "trader", &[], &[]).into(),
            Step::new("rm", "Risk Manager", "risk_manager", &[], &[]).into(),
        ])
        .unwrap();

        let options = config.run_options(&units);
        assert!(options.memory.is_none());
        assert_eq!(options.ability_models.len(), 1);
        assert_eq!(
            options.model_override("risk_manager").unwrap().model_name.as_deref(),
            Some("big")
        );
        assert!(options.model_override("trader").is_none());
    }

    #[test]
    fn test_fail_fast_disables_degrade_and_ui_from_file() {
        let (_dir, council) = council_with("[defaults]\nui = \"json\"\n", EnvOverrides::default());
        let cli = CliOverrides {
            fail_fast: true,
            ..Default::default()
        };
        let config = Config::from_council(council, true, cli);
        assert!(!config.degrade_on_error);
        assert_eq!(config.ui, UiMode::Json);
        assert!(config.verbose);
    }

    #[test]
    fn test_ensure_directories() {
        let (_dir, council) = council_with("", EnvOverrides::default());
        let config = Config::from_council(council, false, CliOverrides::default());
        config.ensure_directories().unwrap();
        assert!(config.sessions_dir.is_dir());
        assert!(config.log_dir.is_dir());
    }
}
