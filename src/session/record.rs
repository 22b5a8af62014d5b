use crate::pipeline::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header of one session, rewritten when the run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub pipeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl SessionMeta {
    pub fn new(id: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipeline: pipeline.into(),
            company: None,
            trade_date: None,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
        }
    }

    pub fn with_subject(mut self, company: &str, trade_date: &str) -> Self {
        self.company = Some(company.to_string());
        self.trade_date = Some(trade_date.to_string());
        self
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// One raw ability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub unit_id: String,
    pub ability: String,
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl InvocationRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
