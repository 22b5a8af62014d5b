//! Progress events emitted by the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit id carried by the terminal event of a completed run.
pub const FINAL_UNIT_ID: &str = "final";
/// Unit id carried by the terminal event of a cancelled run.
pub const ABORTED_UNIT_ID: &str = "aborted";

/// Lifecycle transition a progress event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Completed,
    Error,
    Aborted,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::Started => write!(f, "started"),
            ProgressStatus::Completed => write!(f, "completed"),
            ProgressStatus::Error => write!(f, "error"),
            ProgressStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// What kind of pipeline item produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Step,
    Debate,
    /// Terminal markers (`final` / `aborted`) that belong to the run, not a unit.
    Pipeline,
}

/// One progress notification. Emitted, never stored by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Position in the run's event stream, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub unit_id: String,
    pub display_text: String,
    pub status: ProgressStatus,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_member_text: Option<String>,
}

impl ProgressEvent {
    pub fn new(
        unit_id: impl Into<String>,
        display_text: impl Into<String>,
        status: ProgressStatus,
        progress_percent: u8,
        item_type: ItemType,
    ) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            unit_id: unit_id.into(),
            display_text: display_text.into(),
            status,
            progress_percent,
            result: None,
            error: None,
            item_type,
            debate_group: None,
            debate_round: None,
            debate_member_id: None,
            debate_member_text: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach debate coordinates.
    pub fn with_debate(
        mut self,
        group: impl Into<String>,
        round: u32,
        member_id: impl Into<String>,
        member_text: impl Into<String>,
    ) -> Self {
        self.debate_group = Some(group.into());
        self.debate_round = Some(round);
        self.debate_member_id = Some(member_id.into());
        self.debate_member_text = Some(member_text.into());
        self
    }

    /// True for the `final` and `aborted` markers that close a run.
    pub fn is_terminal(&self) -> bool {
        self.item_type == ItemType::Pipeline
    }

    /// True for the synthetic event closing a successful run.
    pub fn is_final(&self) -> bool {
        self.is_terminal() && self.status == ProgressStatus::Completed
    }
}
