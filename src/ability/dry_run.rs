use crate::ability::{Ability, AbilityContext, AbilityRegistry};
use crate::pipeline::Unit;
use async_trait::async_trait;
use council_common::{DebateState, Patch};
use serde_json::Value;

/// Offline stand-in that fills every declared output with a marker.
///
/// Outputs already holding an object in the input slice are treated as debate
/// sub-states and get a turn appended instead of being replaced.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunAbility;

impl DryRunAbility {
    /// A registry answering every ability key the units use.
    pub fn registry_for(units: &[Unit]) -> AbilityRegistry {
        units.iter().fold(AbilityRegistry::new(), |registry, unit| {
            if registry.contains(&unit.ability) {
                registry
            } else {
                registry.with(unit.ability.clone(), DryRunAbility)
            }
        })
    }
}

#[async_trait]
impl Ability for DryRunAbility {
    async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
        let marker = format!("[dry-run] {}", ctx.ability);

        let patch = ctx
            .outputs
            .iter()
            .map(|key| {
                let value = match input.get(key) {
                    Some(existing @ Value::Object(_)) => {
                        let mut debate = DebateState::from_value(Some(existing));
                        debate.record_turn(ctx.speaker(), &marker);
                        debate.to_value()
                    }
                    _ => Value::String(marker.clone()),
                };
                (key.clone(), value)
            })
            .collect();

        Ok(Some(patch))
    }
}
