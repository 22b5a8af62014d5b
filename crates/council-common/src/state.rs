//! The pipeline state model.
//!
//! A run threads one [`PipelineState`] through every unit. Units never see the
//! whole record: the executor hands each ability a slice holding only the keys
//! the unit declared as inputs, and merges back only the keys it declared as
//! outputs. Merging never removes a field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A partial object produced by an ability (or handed to one as its input slice).
pub type Patch = Map<String, Value>;

/// Field names every investment pipeline understands.
pub const COMPANY_OF_INTEREST: &str = "company_of_interest";
pub const TRADE_DATE: &str = "trade_date";
pub const MARKET_REPORT: &str = "market_report";
pub const SENTIMENT_REPORT: &str = "sentiment_report";
pub const NEWS_REPORT: &str = "news_report";
pub const FUNDAMENTALS_REPORT: &str = "fundamentals_report";
pub const INVESTMENT_DEBATE_STATE: &str = "investment_debate_state";
pub const INVESTMENT_PLAN: &str = "investment_plan";
pub const TRADER_INVESTMENT_PLAN: &str = "trader_investment_plan";
pub const RISK_DEBATE_STATE: &str = "risk_debate_state";
pub const FINAL_TRADE_DECISION: &str = "final_trade_decision";

const KNOWN_FIELDS: &[&str] = &[
    COMPANY_OF_INTEREST,
    TRADE_DATE,
    MARKET_REPORT,
    SENTIMENT_REPORT,
    NEWS_REPORT,
    FUNDAMENTALS_REPORT,
    INVESTMENT_DEBATE_STATE,
    INVESTMENT_PLAN,
    TRADER_INVESTMENT_PLAN,
    RISK_DEBATE_STATE,
    FINAL_TRADE_DECISION,
];

/// Errors building a state from caller-supplied data.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Initial state must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Failed to serialize state field '{field}': {source}")]
    Serialize {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The set of field names a pipeline definition may read or write.
///
/// Known investment fields are always accepted; ability-specific extras must be
/// registered explicitly so that a typo in a pipeline file is caught when the
/// pipeline is defined rather than surfacing as a silently missing input.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    extras: BTreeSet<String>,
}

impl StateSchema {
    /// Schema accepting only the known investment fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an additional field name.
    pub fn with_extra(mut self, name: impl Into<String>) -> Self {
        self.extras.insert(name.into());
        self
    }

    /// Accept several additional field names.
    pub fn with_extras<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extras.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_known(&self, name: &str) -> bool {
        KNOWN_FIELDS.contains(&name) || self.extras.contains(name)
    }

    pub fn known_fields() -> &'static [&'static str] {
        KNOWN_FIELDS
    }
}

/// Nested sub-state shared by the members of one debate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateState {
    /// Full transcript, one `"<Speaker>: <argument>"` entry per line.
    #[serde(default)]
    pub history: String,
    /// Most recent argument, for the next speaker to rebut.
    #[serde(default)]
    pub current_response: String,
    /// Verdict written by the judge once the debate closes.
    #[serde(default)]
    pub judge_decision: String,
    /// Number of turns taken so far.
    #[serde(default)]
    pub count: u32,
    /// Per-speaker transcripts keyed by speaker label.
    #[serde(default)]
    pub speakers: BTreeMap<String, String>,
}

impl DebateState {
    /// Record one turn for `speaker`.
    pub fn record_turn(&mut self, speaker: &str, argument: &str) {
        let line = format!("{}: {}", speaker, argument);
        append_line(&mut self.history, &line);
        append_line(self.speakers.entry(speaker.to_string()).or_default(), &line);
        self.current_response = line;
        self.count += 1;
    }

    /// Parse a debate sub-state out of a state value, tolerating a missing one.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

/// Shared record threaded through one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState {
    fields: Map<String, Value>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state for an investment run: company, trade date and empty debates.
    pub fn seed(company: &str, trade_date: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(COMPANY_OF_INTEREST.into(), Value::String(company.into()));
        fields.insert(TRADE_DATE.into(), Value::String(trade_date.into()));
        fields.insert(
            INVESTMENT_DEBATE_STATE.into(),
            DebateState::default().to_value(),
        );
        fields.insert(RISK_DEBATE_STATE.into(), DebateState::default().to_value());
        Self { fields }
    }

    /// Build a state from an arbitrary JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, StateError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(StateError::NotAnObject("null")),
            Value::Bool(_) => Err(StateError::NotAnObject("a boolean")),
            Value::Number(_) => Err(StateError::NotAnObject("a number")),
            Value::String(_) => Err(StateError::NotAnObject("a string")),
            Value::Array(_) => Err(StateError::NotAnObject("an array")),
        }
    }

    /// A field is defined when present and not `null`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a field directly. Used by callers building a seed.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(|source| StateError::Serialize {
            field: key.to_string(),
            source,
        })?;
        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    /// Copy the declared keys that are currently defined. Undefined keys are
    /// omitted, never defaulted.
    pub fn slice(&self, keys: &[String]) -> Patch {
        keys.iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Stage the declared outputs of a patch: a produced value wins, otherwise
    /// the current value passes through. Keys neither produced nor present are
    /// left out.
    pub fn stage(&self, outputs: &[String], patch: &Patch) -> Patch {
        outputs
            .iter()
            .filter_map(|k| {
                patch
                    .get(k)
                    .filter(|v| !v.is_null())
                    .or_else(|| self.get(k))
                    .map(|v| (k.clone(), v.clone()))
            })
            .collect()
    }

    /// Merge staged values. Never removes a field.
    pub fn merge(&mut self, staged: Patch) {
        for (key, value) in staged {
            if !value.is_null() {
                self.fields.insert(key, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}
