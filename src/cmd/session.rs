//! `council session list` and `council session show <id>`.

use anyhow::Result;
use console::style;
use std::path::Path;

use super::super::SessionCommands;

pub fn cmd_session(project_dir: &Path, command: &SessionCommands) -> Result<()> {
    use council::init::get_council_dir;

    let sessions_dir = get_council_dir(project_dir).join("sessions");
    match command {
        SessionCommands::List { limit } => list(&sessions_dir, *limit),
        SessionCommands::Show { id, events } => show(&sessions_dir, id, *events),
    }
}

fn list(sessions_dir: &Path, limit: usize) -> Result<()> {
    use council::session::SessionLog;

    let sessions = SessionLog::list_sessions(sessions_dir)?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for meta in sessions.iter().take(limit) {
        println!(
            "{}  {:<10} {:<18} {} {}  {}",
            meta.id,
            meta.status.to_string(),
            meta.pipeline,
            meta.company.as_deref().unwrap_or("-"),
            meta.trade_date.as_deref().unwrap_or("-"),
            style(meta.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
        );
    }
    if sessions.len() > limit {
        println!("... and {} more", sessions.len() - limit);
    }
    Ok(())
}

fn show(sessions_dir: &Path, id: &str, show_events: bool) -> Result<()> {
    use council::session::SessionLog;
    use council::ui::format_duration;
    use council::ui::icons::{CHECK, CROSS};
    use std::time::Duration;

    let log = SessionLog::open(sessions_dir, id)?;
    let meta = log.meta()?;
    let invocations = log.read_invocations()?;
    let events = log.read_events()?;

    println!();
    println!("Session {}", style(&meta.id).bold());
    println!("  pipeline: {}", meta.pipeline);
    if let (Some(company), Some(date)) = (&meta.company, &meta.trade_date) {
        println!("  subject:  {} on {}", company, date);
    }
    println!("  status:   {}", meta.status);
    println!("  started:  {}", meta.started_at.to_rfc3339());
    if let Some(finished) = meta.finished_at {
        println!("  finished: {}", finished.to_rfc3339());
    }
    println!();

    println!("Invocations ({}):", invocations.len());
    for record in &invocations {
        let icon = if record.succeeded() { CHECK } else { CROSS };
        println!(
            "  {}{:<18} {:<22} {}",
            icon,
            record.unit_id,
            record.ability,
            format_duration(Duration::from_millis(record.duration_ms))
        );
        if let Some(ref error) = record.error {
            println!("      {}", style(error).red());
        }
    }

    if show_events {
        println!();
        println!("Events ({}):", events.len());
        for event in &events {
            println!(
                "  {:>3} {:>3}% {:<10} {}",
                event.seq, event.progress_percent, event.status.to_string(), event.unit_id
            );
        }
    } else {
        println!();
        println!("{} events recorded (use --events to list them)", events.len());
    }
    println!();

    Ok(())
}
