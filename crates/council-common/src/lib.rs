//! Shared domain types for the council pipeline orchestrator.
//!
//! These types are the vocabulary exchanged between the orchestration core,
//! the abilities it invokes, and whatever transport forwards progress to an
//! observer:
//!
//! - [`PipelineState`] / [`Patch`] - the shared record threaded through a run
//! - [`MemoryConfig`] - memory retrieval policy handed to each ability
//! - [`ModelConfig`] / [`ModelOverride`] - resolved model selection per unit
//! - [`ProgressEvent`] - lifecycle notifications emitted by the executor

pub mod memory;
pub mod model;
pub mod progress;
pub mod state;

pub use memory::{MemoryConfig, MemoryStrategy};
pub use model::{ModelConfig, ModelOverride, Provider};
pub use progress::{ABORTED_UNIT_ID, FINAL_UNIT_ID, ItemType, ProgressEvent, ProgressStatus};
pub use state::{DebateState, Patch, PipelineState, StateError, StateSchema};
