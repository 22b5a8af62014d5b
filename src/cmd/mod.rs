//! CLI command implementations.
//!
//! | Module    | Commands handled         |
//! |-----------|--------------------------|
//! | `init`    | `Init`                   |
//! | `plan`    | `Plan`                   |
//! | `run`     | `Run`                    |
//! | `session` | `Session list/show`      |
//! | `config`  | `Config show/validate/init` |

pub mod config;
pub mod init;
pub mod plan;
pub mod run;
pub mod session;

pub use config::cmd_config;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use run::cmd_run;
pub use session::cmd_session;

use anyhow::{Context, Result};
use std::path::Path;

/// Resolve the pipeline to use: an explicit file, then the project's
/// pipeline file, then the built-in investment debate.
pub(crate) fn load_pipeline(
    config: &council::config::Config,
    explicit: Option<&Path>,
) -> Result<council::pipeline::Pipeline> {
    use council::catalog;
    use council::pipeline::{Pipeline, PipelineFile};

    let file = match explicit {
        Some(path) => PipelineFile::load(path)?,
        None if config.pipeline_file.exists() => PipelineFile::load(&config.pipeline_file)?,
        None => {
            tracing::debug!("No pipeline file found, using the built-in investment debate");
            catalog::default_pipeline_file()
        }
    };

    let name = file.name.clone();
    Pipeline::from_file(file).with_context(|| format!("Invalid pipeline '{}'", name))
}
