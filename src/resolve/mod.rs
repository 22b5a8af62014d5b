//! Configuration resolvers.
//!
//! Both resolvers share one precedence shape: runtime override, then the
//! unit (or debate member), then the debate group, then a global default.
//! The first layer that supplies a value wins. Neither resolver touches
//! pipeline state.

mod memory;
mod model;

pub use memory::resolve_memory;
pub use model::{DEFAULT_MODEL_KEY, ModelResolver, ProviderKeys, default_model_table, resolve_model};
