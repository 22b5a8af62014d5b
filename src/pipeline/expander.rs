//! Flattens pipeline items into the ordered unit sequence the executor runs.

use crate::errors::ConfigError;
use crate::pipeline::item::{DebateGroup, DebateMember, PipelineItem, Step};
use crate::resolve::resolve_memory;
use council_common::{ItemType, MemoryConfig};
use serde::Serialize;
use std::collections::HashSet;

/// Where a debate unit sits inside its group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSeat {
    pub group: String,
    pub round: u32,
    pub member_id: String,
    pub member_text: String,
}

/// One executable invocation: a step, or one member speaking in one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub display_text: String,
    pub ability: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub item_type: ItemType,
    /// Memory declared on the step or member itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
    /// Memory declared on the enclosing debate group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_memory: Option<MemoryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debate: Option<DebateSeat>,
}

impl Unit {
    fn from_step(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            display_text: step.text.clone(),
            ability: step.ability.clone(),
            inputs: step.inputs.clone(),
            outputs: step.outputs.clone(),
            item_type: ItemType::Step,
            memory: step.memory,
            group_memory: None,
            debate: None,
        }
    }

    fn from_member(group: &DebateGroup, member: &DebateMember, round: u32) -> Self {
        Self {
            id: format!("{}_r{}", member.id, round),
            display_text: member.text.clone(),
            ability: member.ability.clone(),
            inputs: member.inputs.clone(),
            outputs: member.outputs.clone(),
            item_type: ItemType::Debate,
            memory: member.memory,
            group_memory: group.memory,
            debate: Some(DebateSeat {
                group: group.group.clone(),
                round,
                member_id: member.id.clone(),
                member_text: member.text.clone(),
            }),
        }
    }

    /// Effective memory for this unit: runtime override, then the unit's own
    /// declaration, then its group's, then `global`.
    pub fn memory_config(&self, runtime: Option<&MemoryConfig>, global: &MemoryConfig) -> MemoryConfig {
        resolve_memory(
            runtime,
            self.memory.as_ref(),
            self.group_memory.as_ref(),
            global,
        )
    }

    pub fn is_debate(&self) -> bool {
        self.item_type == ItemType::Debate
    }
}

/// Number of rounds a debate group runs.
///
/// The group's own `rounds` wins. Without it, member declarations must agree;
/// no declaration at all means a single round.
pub fn effective_rounds(group: &DebateGroup) -> Result<u32, ConfigError> {
    let rounds = match group.rounds {
        Some(rounds) => rounds,
        None => {
            let mut agreed: Option<u32> = None;
            for member in &group.members {
                let Some(declared) = member.rounds else {
                    continue;
                };
                match agreed {
                    None => agreed = Some(declared),
                    Some(first) if first != declared => {
                        return Err(ConfigError::DivergentRounds {
                            group: group.group.clone(),
                            first,
                            conflicting: declared,
                            member: member.id.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
            agreed.unwrap_or(1)
        }
    };

    if rounds == 0 {
        return Err(ConfigError::ZeroRounds {
            group: group.group.clone(),
        });
    }
    Ok(rounds)
}

/// Members in speaking order: by `order`, falling back to declaration index.
/// The sort is stable so equal keys keep declaration order.
fn speaking_order(group: &DebateGroup) -> Vec<&DebateMember> {
    let mut members: Vec<(i64, &DebateMember)> = group
        .members
        .iter()
        .enumerate()
        .map(|(index, m)| (m.order.map(i64::from).unwrap_or(index as i64), m))
        .collect();
    members.sort_by_key(|(key, _)| *key);
    members.into_iter().map(|(_, m)| m).collect()
}

/// Expand pipeline items into units, round-major and member-minor inside each
/// debate group.
pub fn expand(items: &[PipelineItem]) -> Result<Vec<Unit>, ConfigError> {
    let mut units = Vec::new();

    for item in items {
        match item {
            PipelineItem::Step(step) => units.push(Unit::from_step(step)),
            PipelineItem::Debate(group) => {
                if group.members.is_empty() {
                    return Err(ConfigError::EmptyDebateGroup {
                        group: group.group.clone(),
                    });
                }
                let rounds = effective_rounds(group)?;
                let members = speaking_order(group);
                for round in 1..=rounds {
                    for member in &members {
                        units.push(Unit::from_member(group, member, round));
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for unit in &units {
        if !seen.insert(unit.id.as_str()) {
            return Err(ConfigError::DuplicateUnitId {
                unit_id: unit.id.clone(),
            });
        }
    }

    Ok(units)
}
