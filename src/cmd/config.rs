//! Configuration view and validation commands (`council config`).

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use council::council_config::{CONFIG_FILE, CouncilConfig, CouncilToml};
    use council::init::get_council_dir;

    let council_dir = get_council_dir(project_dir);
    let config_path = council_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Council Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No council.toml found at {}, using defaults", config_path.display());
            }
            println!();

            let config = CouncilConfig::new(project_dir.to_path_buf())?;
            let toml = &config.toml;

            println!("[defaults]");
            println!("  memory_strategy = \"{}\"", toml.defaults.memory_strategy);
            if let Some(top_k) = toml.defaults.top_k {
                println!("  top_k = {}", top_k);
            }
            println!("  degrade_on_error = {}", toml.defaults.degrade_on_error);
            println!("  request_timeout_secs = {}", toml.defaults.request_timeout_secs);
            println!("  ui = \"{}\"", toml.defaults.ui);
            println!();

            if !toml.models.default.is_empty() || !toml.models.overrides.is_empty() {
                println!("[models]");
                print_override("default", &toml.models.default);
                for (pattern, over) in &toml.models.overrides {
                    print_override(&format!("\"{}\"", pattern), over);
                }
                println!();
            }

            println!("Effective values (with env overrides):");
            println!("  pipeline = {}", config.pipeline_file().display());
            match config.env_memory() {
                Some(memory) => println!("  memory override = {}", memory.strategy),
                None => println!("  memory default = {}", config.default_memory().strategy),
            }
            if !config.env.model.is_empty() {
                print_override("env", &config.env.model);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No council.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = CouncilToml::load(&config_path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("council.toml already exists at {}", config_path.display());
                return Ok(());
            }
            std::fs::create_dir_all(&council_dir)?;
            CouncilToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}

fn print_override(label: &str, over: &council_common::ModelOverride) {
    let mut parts = Vec::new();
    if let Some(provider) = over.provider {
        parts.push(format!("provider = \"{}\"", provider));
    }
    if let Some(ref model) = over.model_name {
        parts.push(format!("model_name = \"{}\"", model));
    }
    if let Some(ref url) = over.base_url {
        parts.push(format!("base_url = \"{}\"", url));
    }
    if over.api_key.is_some() {
        parts.push("api_key = <set>".to_string());
    }
    println!("  {}: {}", label, parts.join(", "));
}
