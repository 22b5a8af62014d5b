//! `council plan`: show the expanded unit order without running anything.

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};

use super::super::Cli;

pub fn cmd_plan(cli: &Cli, project_dir: &Path, pipeline: Option<&PathBuf>, json: bool) -> Result<()> {
    use council::config::{CliOverrides, Config};

    let config = Config::new(project_dir.to_path_buf(), cli.verbose, CliOverrides::default())?;
    let pipeline = super::load_pipeline(&config, pipeline.map(PathBuf::as_path))?;
    pipeline.validate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(pipeline.units())?);
        return Ok(());
    }

    println!();
    println!(
        "{} ({} units)",
        style(pipeline.name()).bold(),
        pipeline.units().len()
    );
    println!();

    let options = config.run_options(pipeline.units());
    for (index, unit) in pipeline.units().iter().enumerate() {
        let label = match &unit.debate {
            Some(seat) => format!("{} [{} round {}]", unit.display_text, seat.group, seat.round),
            None => unit.display_text.clone(),
        };
        println!(
            "{:>3}. {:<18} {}",
            index + 1,
            style(&unit.id).cyan(),
            label
        );
        println!(
            "     {} {} -> {}",
            style(&unit.ability).dim(),
            unit.inputs.join(", "),
            unit.outputs.join(", ")
        );
        if cli.verbose {
            let memory = unit.memory_config(options.memory.as_ref(), &options.default_memory);
            println!("     memory: {}", memory.strategy);
        }
    }
    println!();

    Ok(())
}
