//! Append-only session logs.
//!
//! Each run gets a directory under `.council/sessions/<id>/`:
//!
//! ```text
//! session.json        # SessionMeta, rewritten on finish
//! events.jsonl        # one ProgressEvent per line
//! invocations.jsonl   # one InvocationRecord per line
//! ```

mod record;

pub use record::{InvocationRecord, SessionMeta};

use crate::pipeline::RunStatus;
use crate::progress::ProgressSink;
use anyhow::{Context, Result, bail};
use council_common::ProgressEvent;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const META_FILE: &str = "session.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const INVOCATIONS_FILE: &str = "invocations.jsonl";

/// Handle to one session directory.
#[derive(Debug, Clone)]
pub struct SessionLog {
    id: String,
    dir: PathBuf,
}

impl SessionLog {
    /// Fresh opaque session id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create the session directory and write its header.
    pub fn create(sessions_dir: &Path, meta: &SessionMeta) -> Result<Self> {
        validate_id(&meta.id)?;
        let dir = sessions_dir.join(&meta.id);
        if dir.join(META_FILE).exists() {
            bail!("Session '{}' already exists", meta.id);
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory: {}", dir.display()))?;

        let log = Self {
            id: meta.id.clone(),
            dir,
        };
        log.write_meta(meta)?;
        Ok(log)
    }

    /// Open an existing session.
    pub fn open(sessions_dir: &Path, id: &str) -> Result<Self> {
        validate_id(id)?;
        let dir = sessions_dir.join(id);
        if !dir.join(META_FILE).exists() {
            bail!("Session '{}' not found in {}", id, sessions_dir.display());
        }
        Ok(Self {
            id: id.to_string(),
            dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> Result<SessionMeta> {
        let path = self.dir.join(META_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session header: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse session header")
    }

    /// Record the run's terminal status.
    pub fn finish(&self, status: RunStatus) -> Result<()> {
        let mut meta = self.meta()?;
        meta.finish(status);
        self.write_meta(&meta)
    }

    pub fn append_event(&self, event: &ProgressEvent) -> Result<()> {
        self.append_line(EVENTS_FILE, event)
    }

    pub fn append_invocation(&self, record: &InvocationRecord) -> Result<()> {
        self.append_line(INVOCATIONS_FILE, record)
    }

    pub fn read_events(&self) -> Result<Vec<ProgressEvent>> {
        self.read_lines(EVENTS_FILE)
    }

    pub fn read_invocations(&self) -> Result<Vec<InvocationRecord>> {
        self.read_lines(INVOCATIONS_FILE)
    }

    /// Headers of every session in `sessions_dir`, most recent first.
    pub fn list_sessions(sessions_dir: &Path) -> Result<Vec<SessionMeta>> {
        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(sessions_dir)
            .with_context(|| format!("Failed to read {}", sessions_dir.display()))?
        {
            let path = entry?.path().join(META_FILE);
            if !path.exists() {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<SessionMeta>(&c).map_err(Into::into))
            {
                Ok(meta) => sessions.push(meta),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    fn write_meta(&self, meta: &SessionMeta) -> Result<()> {
        let path = self.dir.join(META_FILE);
        let json = serde_json::to_string_pretty(meta).context("Failed to serialize session header")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write session header: {}", path.display()))
    }

    fn append_line<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let mut line = serde_json::to_string(value).context("Failed to serialize log entry")?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .with_context(|| format!("Failed to open {}", file))?
            .write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", file))?;

        Ok(())
    }

    fn read_lines<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Malformed entry at {}:{}", file, n + 1))
            })
            .collect()
    }
}

/// Persists every progress event to the session's event log.
impl ProgressSink for SessionLog {
    fn on_event(&self, event: &ProgressEvent) {
        if let Err(e) = self.append_event(event) {
            tracing::warn!(session = %self.id, error = %e, "Failed to persist progress event");
        }
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
    {
        bail!("Invalid session id '{}'", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use council_common::{ItemType, ProgressStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn create(dir: &TempDir, id: &str) -> SessionLog {
        let meta = SessionMeta::new(id, "investment-debate").with_subject("AAPL", "2024-01-02");
        SessionLog::create(dir.path(), &meta).unwrap()
    }

    #[test]
    fn test_events_append_and_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let log = create(&dir, "s1");

        for (seq, id) in ["a", "b"].iter().enumerate() {
            let event = ProgressEvent::new(*id, *id, ProgressStatus::Started, 0, ItemType::Step)
                .with_seq(seq as u64);
            log.on_event(&event);
        }

        let events = log.read_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].unit_id, "a");
        assert_eq!(events[1].seq, 1);

        let raw = fs::read_to_string(log.dir().join(EVENTS_FILE)).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"unitId\":\"a\""));
    }

    #[test]
    fn test_invocations_record_request_and_outcome() {
        let dir = TempDir::new().unwrap();
        let log = create(&dir, "s1");

        log.append_invocation(&InvocationRecord {
            unit_id: "market".into(),
            ability: "market_analyst".into(),
            request: json!({"trade_date": "2024-01-02"}),
            response: Some(json!({"market_report": "ok"})),
            error: None,
            started_at: Utc::now(),
            duration_ms: 12,
        })
        .unwrap();
        log.append_invocation(&InvocationRecord {
            unit_id: "news".into(),
            ability: "news_analyst".into(),
            request: json!({}),
            response: None,
            error: Some("rate limited".into()),
            started_at: Utc::now(),
            duration_ms: 3,
        })
        .unwrap();

        let records = log.read_invocations().unwrap();
        assert!(records[0].succeeded());
        assert!(!records[1].succeeded());
        assert_eq!(records[1].error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_finish_updates_header() {
        let dir = TempDir::new().unwrap();
        let log = create(&dir, "s1");
        assert_eq!(log.meta().unwrap().status, RunStatus::Running);

        log.finish(RunStatus::Aborted).unwrap();
        let meta = SessionLog::open(dir.path(), "s1").unwrap().meta().unwrap();
        assert_eq!(meta.status, RunStatus::Aborted);
        assert!(meta.finished_at.is_some());
        assert_eq!(meta.company.as_deref(), Some("AAPL"));
    }

    #[test]
    fn test_list_sessions_newest_first() {
        let dir = TempDir::new().unwrap();
        let mut older = SessionMeta::new("old", "p");
        older.started_at = Utc::now() - chrono::Duration::minutes(5);
        SessionLog::create(dir.path(), &older).unwrap();
        create(&dir, "new");
        fs::create_dir_all(dir.path().join("stray")).unwrap();

        let ids: Vec<String> = SessionLog::list_sessions(dir.path())
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_duplicate_and_missing_sessions_are_errors() {
        let dir = TempDir::new().unwrap();
        create(&dir, "s1");
        let meta = SessionMeta::new("s1", "p");
        assert!(SessionLog::create(dir.path(), &meta).is_err());
        assert!(SessionLog::open(dir.path(), "nope").is_err());
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        for id in ["", "..", "a/b", "a\\b"] {
            assert!(SessionLog::create(dir.path(), &SessionMeta::new(id, "p")).is_err());
        }
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(SessionLog::new_id(), SessionLog::new_id());
    }

    #[test]
    fn test_missing_logs_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = create(&dir, "s1");
        assert!(log.read_events().unwrap().is_empty());
        assert!(SessionLog::list_sessions(&dir.path().join("absent")).unwrap().is_empty());
    }
}
