//! `council run <company> <trade-date>`.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::super::{Cli, RunArgs};

/// Exit status of a run stopped by Ctrl-C or `--stop-after`.
pub const EXIT_ABORTED: u8 = 130;

pub async fn cmd_run(cli: &Cli, project_dir: &Path, args: &RunArgs) -> Result<ExitCode> {
    use council::ability::{DryRunAbility, GatewayClient, RecordingAbility};
    use council::catalog;
    use council::config::Config;
    use council::errors::PipelineError;
    use council::pipeline::{PipelineExecutor, RunStatus, initial_state};
    use council::progress::{ProgressFanout, ProgressSink};
    use council::resolve::ModelResolver;
    use council::session::{SessionLog, SessionMeta};
    use council::ui::{RunUi, UiMode};
    use council_common::state::FINAL_TRADE_DECISION;
    use council_common::{ProgressEvent, ProgressStatus};
    use tokio_util::sync::CancellationToken;

    let config = Config::new(project_dir.to_path_buf(), cli.verbose, args.overrides())?;
    config.ensure_directories()?;
    for warning in config.council().validate() {
        tracing::warn!("{}", warning);
    }

    let pipeline = super::load_pipeline(&config, args.pipeline.as_deref())?;
    pipeline.validate()?;
    let units = pipeline.units();

    if let Some(ref stop_after) = args.stop_after
        && !units.iter().any(|u| &u.id == stop_after)
    {
        anyhow::bail!(
            "Unknown unit '{}' for --stop-after. Run `council plan` to list unit ids",
            stop_after
        );
    }

    let extra = match args.seed {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse seed JSON: {}", path.display()))?;
            Some(value)
        }
        None => None,
    };
    let initial = initial_state(&args.company, &args.trade_date, extra)?;

    let meta = SessionMeta::new(SessionLog::new_id(), pipeline.name())
        .with_subject(&args.company, &args.trade_date);
    let log = Arc::new(SessionLog::create(&config.sessions_dir, &meta)?);
    tracing::info!(session = %log.id(), pipeline = %pipeline.name(), "Session started");

    let registry = if args.dry_run {
        DryRunAbility::registry_for(units)
    } else {
        let generator = Arc::new(
            GatewayClient::new(config.request_timeout).context("Failed to build gateway client")?,
        );
        catalog::live_registry(units, generator, config.degrade_on_error)
    };
    let registry = RecordingAbility::wrap_registry(registry, log.clone());

    let executor = PipelineExecutor::new(registry, ModelResolver::from_env())
        .with_options(config.run_options(units));

    let cancel = CancellationToken::new();
    let ui = Arc::new(RunUi::new(pipeline.name(), units.len(), config.ui, cli.verbose));
    let mut sink = ProgressFanout::new()
        .with(log.clone() as Arc<dyn ProgressSink>)
        .with(ui.clone() as Arc<dyn ProgressSink>);
    if let Some(target) = args.stop_after.clone() {
        let cancel = cancel.clone();
        let stopper = move |event: &ProgressEvent| {
            if event.status == ProgressStatus::Completed && event.unit_id == target {
                cancel.cancel();
            }
        };
        sink = sink.with(Arc::new(stopper) as Arc<dyn ProgressSink>);
    }

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("Interrupt received, stopping after the current unit (Ctrl-C again to exit now)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Second interrupt received, exiting");
                std::process::exit(i32::from(EXIT_ABORTED));
            }
        })
    };

    let outcome = pipeline.run(&executor, initial, &sink, Some(&cancel)).await;
    interrupt.abort();

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            log.finish(RunStatus::Failed)?;
            tracing::error!(session = %log.id(), error = %e, "Run failed");
            if let PipelineError::AbilityFailed {
                ref unit_id,
                ref message,
                ref state,
            } = e
            {
                let failure = Some((unit_id.as_str(), message.as_str()));
                ui.print_partial_state(RunStatus::Failed, failure, state);
            }
            return Err(e).with_context(|| format!("Session {} failed", log.id()));
        }
    };

    log.finish(report.status)?;
    ui.print_summary(report.summary.completed, report.summary.total_units, report.duration());

    if report.is_aborted() {
        ui.print_partial_state(RunStatus::Aborted, None, &report.state);
        if ui.mode() != UiMode::Json {
            println!("Session: {}", log.id());
        }
        return Ok(ExitCode::from(EXIT_ABORTED));
    }

    if ui.mode() != UiMode::Json {
        if let Some(decision) = report.state.get_str(FINAL_TRADE_DECISION) {
            println!();
            println!("{}", console::style("Final trade decision").bold());
            println!("{}", decision);
        }
        println!();
        println!("Session: {}", log.id());
    }

    Ok(ExitCode::SUCCESS)
}
