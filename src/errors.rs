//! Typed error hierarchy for the council orchestrator.
//!
//! Three top-level enums cover the three failure surfaces:
//! - `ConfigError` - invalid pipeline definitions, raised before any unit runs
//! - `PipelineError` - run-level failures surfaced by the executor
//! - `AbilityError` - failures inside the bundled gateway abilities

use council_common::{PipelineState, StateError};
use thiserror::Error;

/// Which side of a unit's contract a field name appeared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDirection {
    Input,
    Output,
}

impl std::fmt::Display for FieldDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldDirection::Input => write!(f, "input"),
            FieldDirection::Output => write!(f, "output"),
        }
    }
}

/// Pipeline definition errors. Fatal to the whole run; nothing executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Debate group '{group}' has no members")]
    EmptyDebateGroup { group: String },

    #[error("Debate group '{group}' declares zero rounds")]
    ZeroRounds { group: String },

    #[error(
        "Debate group '{group}' has conflicting member rounds: {first} vs {conflicting} (member '{member}'); declare rounds on the group"
    )]
    DivergentRounds {
        group: String,
        first: u32,
        conflicting: u32,
        member: String,
    },

    #[error("Unit id '{unit_id}' appears more than once in the pipeline")]
    DuplicateUnitId { unit_id: String },

    #[error("Unit '{unit_id}' uses unknown ability '{ability}'")]
    UnknownAbility { unit_id: String, ability: String },

    #[error("Unit '{unit_id}' declares unknown {direction} field '{field}'")]
    UndeclaredField {
        unit_id: String,
        field: String,
        direction: FieldDirection,
    },

    #[error("Invalid initial state: {0}")]
    InvalidSeed(#[from] StateError),
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An ability threw. The state merged from earlier units travels with it.
    #[error("Unit '{unit_id}' failed: {message}")]
    AbilityFailed {
        unit_id: String,
        message: String,
        state: Box<PipelineState>,
    },
}

impl PipelineError {
    /// State accumulated before the failure, when the run got that far.
    pub fn partial_state(&self) -> Option<&PipelineState> {
        match self {
            PipelineError::AbilityFailed { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Id of the unit that failed, for ability failures.
    pub fn failed_unit(&self) -> Option<&str> {
        match self {
            PipelineError::AbilityFailed { unit_id, .. } => Some(unit_id),
            _ => None,
        }
    }
}

/// Errors from the bundled LLM gateway abilities.
#[derive(Debug, Error)]
pub enum AbilityError {
    #[error("No API key configured for provider {provider}")]
    MissingApiKey { provider: String },

    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {status}: {body}")]
    GatewayStatus { status: u16, body: String },

    #[error("Gateway response had no message content")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_empty_group_names_group() {
        let err = ConfigError::EmptyDebateGroup {
            group: "research".into(),
        };
        assert!(err.to_string().contains("research"));
        assert!(matches!(err, ConfigError::EmptyDebateGroup { .. }));
    }

    #[test]
    fn config_error_divergent_rounds_carries_both_values() {
        let err = ConfigError::DivergentRounds {
            group: "risk".into(),
            first: 2,
            conflicting: 3,
            member: "safe".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains('2') && msg.contains('3'));
        assert!(msg.contains("safe"));
    }

    #[test]
    fn pipeline_error_converts_from_config_error() {
        let inner = ConfigError::UnknownAbility {
            unit_id: "trader".into(),
            ability: "tradr".into(),
        };
        let err: PipelineError = inner.into();
        match &err {
            PipelineError::Config(ConfigError::UnknownAbility { ability, .. }) => {
                assert_eq!(ability, "tradr");
            }
            _ => panic!("Expected PipelineError::Config(UnknownAbility)"),
        }
        assert!(err.partial_state().is_none());
        assert!(err.failed_unit().is_none());
    }

    #[test]
    fn ability_failed_exposes_partial_state() {
        let state = PipelineState::seed("AAPL", "2024-01-02");
        let err = PipelineError::AbilityFailed {
            unit_id: "news".into(),
            message: "rate limited".into(),
            state: Box::new(state.clone()),
        };
        assert_eq!(err.failed_unit(), Some("news"));
        assert_eq!(err.partial_state(), Some(&state));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn undeclared_field_mentions_direction() {
        let err = ConfigError::UndeclaredField {
            unit_id: "market".into(),
            field: "markt_report".into(),
            direction: FieldDirection::Output,
        };
        assert!(err.to_string().contains("output field 'markt_report'"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ConfigError::ZeroRounds { group: "g".into() });
        assert_std_error(&PipelineError::Config(ConfigError::ZeroRounds { group: "g".into() }));
        assert_std_error(&AbilityError::EmptyResponse);
    }
}
