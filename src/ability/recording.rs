use crate::ability::{Ability, AbilityContext, AbilityRegistry};
use crate::session::{InvocationRecord, SessionLog};
use async_trait::async_trait;
use chrono::Utc;
use council_common::Patch;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Wraps an ability and appends one [`InvocationRecord`] per call.
///
/// The wrapped result is returned unchanged; a failure to write the log is
/// only reported through tracing.
pub struct RecordingAbility {
    inner: Arc<dyn Ability>,
    log: Arc<SessionLog>,
}

impl RecordingAbility {
    pub fn new(inner: Arc<dyn Ability>, log: Arc<SessionLog>) -> Self {
        Self { inner, log }
    }

    /// Wrap every entry of a registry.
    pub fn wrap_registry(registry: AbilityRegistry, log: Arc<SessionLog>) -> AbilityRegistry {
        registry.map(|_, ability| Arc::new(RecordingAbility::new(ability, log.clone())) as Arc<dyn Ability>)
    }
}

#[async_trait]
impl Ability for RecordingAbility {
    async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let request = Value::Object(input.clone());

        let result = self.inner.invoke(input, ctx).await;

        let (response, error) = match &result {
            Ok(patch) => (Some(Value::Object(patch.clone().unwrap_or_default())), None),
            Err(e) => (None, Some(format!("{:#}", e))),
        };
        let record = InvocationRecord {
            unit_id: ctx.unit_id.clone(),
            ability: ctx.ability.clone(),
            request,
            response,
            error,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
        };
        if let Err(e) = self.log.append_invocation(&record) {
            tracing::warn!(unit = %ctx.unit_id, error = %e, "Failed to record invocation");
        }

        result
    }
}
