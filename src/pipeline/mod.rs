//! Pipeline definition, expansion and execution.
//!
//! - [`item`] - declarative steps and debate groups, pipeline files
//! - [`expander`] - flattening items into ordered [`Unit`]s
//! - [`executor`] - the sequential run loop
//! - [`report`] - run status and summary types

pub mod executor;
pub mod expander;
pub mod item;
pub mod report;

pub use executor::{PipelineExecutor, RunOptions};
pub use expander::{DebateSeat, Unit, effective_rounds, expand};
pub use item::{DebateGroup, DebateMember, PipelineFile, PipelineItem, Step};
pub use report::{ExecutionTimer, RunReport, RunStatus, RunSummary};

use crate::errors::{ConfigError, FieldDirection, PipelineError};
use crate::progress::ProgressSink;
use council_common::{PipelineState, StateSchema};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;

/// A named, expanded pipeline ready to run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    units: Vec<Unit>,
    schema: StateSchema,
}

impl Pipeline {
    /// Expand `items`. Configuration errors surface here, before anything runs.
    pub fn new(name: impl Into<String>, items: Vec<PipelineItem>) -> Result<Self, ConfigError> {
        let units = expand(&items)?;
        Ok(Self {
            name: name.into(),
            units,
            schema: StateSchema::new(),
        })
    }

    pub fn from_file(file: PipelineFile) -> Result<Self, ConfigError> {
        let pipeline = Self::new(file.name, file.items)?;
        Ok(pipeline.with_schema(StateSchema::new().with_extras(file.extra_fields)))
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Distinct ability keys, sorted.
    pub fn abilities(&self) -> BTreeSet<&str> {
        self.units.iter().map(|u| u.ability.as_str()).collect()
    }

    /// Check every declared input and output against the pipeline's schema.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for unit in &self.units {
            let declared = unit
                .inputs
                .iter()
                .map(|f| (f, FieldDirection::Input))
                .chain(unit.outputs.iter().map(|f| (f, FieldDirection::Output)));
            for (field, direction) in declared {
                if !self.schema.is_known(field) {
                    return Err(ConfigError::UndeclaredField {
                        unit_id: unit.id.clone(),
                        field: field.clone(),
                        direction,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate, then run every unit with `executor`.
    pub async fn run(
        &self,
        executor: &PipelineExecutor,
        initial: PipelineState,
        sink: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<RunReport, PipelineError> {
        self.validate()?;
        tracing::info!(pipeline = %self.name, "Running pipeline");
        executor.run(&self.units, initial, sink, cancel).await
    }
}

/// Initial state for a run: the company and trade date seed with `extra`
/// layered on top. `extra` must be a JSON object; its `null` fields are ignored.
pub fn initial_state(
    company: &str,
    trade_date: &str,
    extra: Option<serde_json::Value>,
) -> Result<PipelineState, ConfigError> {
    let mut state = PipelineState::seed(company, trade_date);
    if let Some(value) = extra {
        let extra = PipelineState::from_value(value)?;
        state.merge(extra.as_map().clone());
    }
    Ok(state)
}
