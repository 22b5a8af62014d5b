//! `council init`: create the `.council/` directory for a project.
//!
//! ```text
//! .council/
//! ├── council.toml     # Project configuration
//! ├── pipeline.yaml    # Pipeline definition (investment debate by default)
//! ├── sessions/        # One directory per run
//! └── logs/            # Daily rolling log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::catalog;
use crate::council_config::{CONFIG_FILE, CouncilToml, DEFAULT_PIPELINE_FILE};

/// The name of the council configuration directory.
pub const COUNCIL_DIR: &str = ".council";

/// Result of initializing a council project.
#[derive(Debug)]
pub struct InitResult {
    pub council_dir: PathBuf,
    /// False if the directory already existed
    pub created: bool,
    /// Files written by this call; existing files are never overwritten
    pub written: Vec<PathBuf>,
}

/// Initialize a council project in `project_dir`.
///
/// Running it again fills in whatever is missing and leaves existing files
/// untouched.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let council_dir = project_dir.join(COUNCIL_DIR);
    let created = !council_dir.exists();

    for sub in ["sessions", "logs"] {
        let dir = council_dir.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let mut written = Vec::new();

    let config_file = council_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        CouncilToml::default().save(&config_file)?;
        written.push(config_file);
    }

    let pipeline_file = council_dir.join(DEFAULT_PIPELINE_FILE);
    if !pipeline_file.exists() {
        catalog::default_pipeline_file().save(&pipeline_file)?;
        written.push(pipeline_file);
    }

    Ok(InitResult {
        council_dir,
        created,
        written,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(COUNCIL_DIR).exists()
}

pub fn get_council_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(COUNCIL_DIR)
}
