//! Run status and result types returned by the executor.

use council_common::{Patch, PipelineState};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Not started yet
    #[default]
    Idle,
    /// Units are being dispatched
    Running,
    /// Every unit completed
    Completed,
    /// Stopped by the cancellation signal
    Aborted,
    /// An ability failed
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Aborted => write!(f, "aborted"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Counts and timing for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_units: usize,
    pub completed: usize,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(total_units: usize) -> Self {
        Self {
            total_units,
            ..Default::default()
        }
    }

    pub fn all_completed(&self) -> bool {
        self.completed == self.total_units
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total_units as f64) * 100.0
    }
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub state: PipelineState,
    /// Patch returned by each completed unit, in dispatch order.
    pub patches: Vec<Patch>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.status == RunStatus::Aborted
    }

    pub fn duration(&self) -> Duration {
        self.summary.duration
    }
}

/// Wall-clock timer for a run.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Durations serialize as whole milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
