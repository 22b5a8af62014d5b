//! Terminal rendering of a pipeline run.
//!
//! [`RunUi`] is a [`ProgressSink`] with three output modes:
//! - `full`: a progress bar for the run plus a spinner for the active unit
//! - `minimal`: one line per finished unit
//! - `json`: each event as a JSON line on stdout

use crate::pipeline::RunStatus;
use crate::progress::ProgressSink;
use crate::ui::icons::{CHECK, CLOCK, CROSS, DEBATE, RUNNING, SPARKLE, STOP};
use council_common::{PipelineState, ProgressEvent, ProgressStatus};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bars and colors
    #[default]
    Full,
    /// One line per finished unit
    Minimal,
    /// JSON lines
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid ui mode '{}'. Valid values: full, minimal, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for UiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiMode::Full => write!(f, "full"),
            UiMode::Minimal => write!(f, "minimal"),
            UiMode::Json => write!(f, "json"),
        }
    }
}

/// Progress display for one run.
pub struct RunUi {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    /// Spinner for the unit currently in flight.
    unit_bar: Mutex<Option<ProgressBar>>,
    verbose: bool,
    term: Term,
}

impl RunUi {
    pub fn new(pipeline: &str, total_units: usize, mode: UiMode, verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let header_bar = match mode {
            UiMode::Full => multi.add(ProgressBar::new(100)),
            UiMode::Minimal | UiMode::Json => ProgressBar::hidden(),
        };

        if let Ok(header_style) = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            header_bar.set_style(header_style.progress_chars("█▓▒░"));
        }
        header_bar.set_prefix(pipeline.to_string());
        header_bar.set_message(format!("{} units", total_units));

        Self {
            mode,
            multi,
            header_bar,
            unit_bar: Mutex::new(None),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn handle_json(&self, event: &ProgressEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &ProgressEvent) {
        let line = match event.status {
            ProgressStatus::Started => return,
            ProgressStatus::Completed if event.is_final() => {
                format!("Done ({}%)", event.progress_percent)
            }
            ProgressStatus::Completed => {
                format!("✓ {} ({}%)", unit_label(event), event.progress_percent)
            }
            ProgressStatus::Error => format!(
                "✗ {} ({})",
                unit_label(event),
                event.error.as_deref().unwrap_or("failed")
            ),
            ProgressStatus::Aborted => format!("Aborted at {}%", event.progress_percent),
        };
        let _ = writeln!(&self.term, "{}", line);
    }

    fn handle_full(&self, event: &ProgressEvent) {
        self.header_bar
            .set_position(u64::from(event.progress_percent));

        match event.status {
            ProgressStatus::Started => self.on_unit_started(event),
            ProgressStatus::Completed if event.is_final() => {
                self.finish_unit_bar();
                self.header_bar
                    .finish_with_message(format!("{}complete", SPARKLE));
            }
            ProgressStatus::Completed => self.on_unit_completed(event),
            ProgressStatus::Error => self.on_unit_failed(event),
            ProgressStatus::Aborted => {
                self.finish_unit_bar();
                self.header_bar.abandon_with_message(format!(
                    "{}aborted at {}%",
                    STOP, event.progress_percent
                ));
            }
        }
    }

    fn on_unit_started(&self, event: &ProgressEvent) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("  {spinner} {msg}") {
            bar.set_style(spinner_style);
        }
        let icon = if event.debate_round.is_some() {
            DEBATE
        } else {
            RUNNING
        };
        bar.set_message(format!("{}{}", icon, style(unit_label(event)).cyan()));
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut slot) = self.unit_bar.lock()
            && let Some(previous) = slot.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn on_unit_completed(&self, event: &ProgressEvent) {
        self.finish_unit_bar();
        self.print_line(format!(
            "  {}{}",
            CHECK,
            style(unit_label(event)).green()
        ));
        if self.verbose
            && let Some(ref result) = event.result
        {
            for (key, value) in result.as_object().into_iter().flatten() {
                self.print_line(format!(
                    "      {} {}",
                    style(format!("{}:", key)).dim(),
                    style(preview(value)).dim()
                ));
            }
        }
    }

    fn on_unit_failed(&self, event: &ProgressEvent) {
        self.finish_unit_bar();
        self.print_line(format!(
            "  {}{} {}",
            CROSS,
            style(unit_label(event)).red(),
            style(event.error.as_deref().unwrap_or("failed")).red().dim()
        ));
        self.header_bar
            .abandon_with_message(format!("failed at {}", event.unit_id));
    }

    fn finish_unit_bar(&self) {
        if let Ok(mut slot) = self.unit_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }

    /// Print the closing summary line (full and minimal modes).
    pub fn print_summary(&self, completed: usize, total: usize, elapsed: Duration) {
        let line = format!(
            "{}{}/{} units in {}",
            CLOCK,
            completed,
            total,
            format_duration(elapsed)
        );
        self.print_report_line(line);
    }

    /// Report a run that stopped early: the failing unit (if any) and the
    /// state accumulated before it stopped.
    ///
    /// JSON mode prints one object carrying the whole state.
    pub fn print_partial_state(
        &self,
        status: RunStatus,
        failure: Option<(&str, &str)>,
        state: &PipelineState,
    ) {
        if self.mode == UiMode::Json {
            let report = serde_json::json!({
                "status": status,
                "unitId": failure.map(|(unit, _)| unit),
                "error": failure.map(|(_, message)| message),
                "state": state,
            });
            let _ = writeln!(&self.term, "{}", report);
            return;
        }

        match failure {
            Some((unit, message)) => self.print_report_line(format!(
                "{}Run failed at '{}': {}",
                CROSS,
                style(unit).red(),
                message
            )),
            None => self.print_report_line(format!("{}Run {}", STOP, status)),
        }

        let fields = defined_fields(state);
        self.print_report_line(format!(
            "Partial state ({} fields): {}",
            fields.len(),
            fields.join(", ")
        ));
        if self.verbose {
            for field in fields {
                if let Some(value) = state.get(field) {
                    self.print_report_line(format!(
                        "  {} {}",
                        style(format!("{}:", field)).dim(),
                        preview(value)
                    ));
                }
            }
        }
    }

    fn print_report_line(&self, line: String) {
        match self.mode {
            UiMode::Json => {}
            UiMode::Minimal => {
                let _ = writeln!(&self.term, "{}", line);
            }
            UiMode::Full => self.print_line(line),
        }
    }
}

impl ProgressSink for RunUi {
    fn on_event(&self, event: &ProgressEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }
}

fn unit_label(event: &ProgressEvent) -> String {
    match event.debate_round {
        Some(round) => format!("{} (round {})", event.display_text, round),
        None => event.display_text.clone(),
    }
}

/// Fields holding a value, in key order.
fn defined_fields(state: &PipelineState) -> Vec<&str> {
    state
        .keys()
        .filter(|k| state.contains(k))
        .map(String::as_str)
        .collect()
}

/// First line of a value, cut to 80 characters.
fn preview(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > 80 {
        format!("{}…", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Format a duration as `450ms`, `12s` or `3m 5s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
