use crate::ability::chat::{memory_guidance, render_input, unavailable};
use crate::ability::{Ability, AbilityContext, TextGenerator};
use async_trait::async_trait;
use council_common::{DebateState, Patch};
use std::sync::Arc;

/// One member's turn in a debate.
///
/// Reads the debate sub-state from the input slice, asks the generator for a
/// rebuttal to the latest argument, and returns the sub-state with the turn
/// recorded. Other input fields are passed to the model as background.
pub struct DebateTurnAbility {
    generator: Arc<dyn TextGenerator>,
    instructions: String,
    debate_key: Option<String>,
    degrade_on_error: bool,
}

impl DebateTurnAbility {
    pub fn new(generator: Arc<dyn TextGenerator>, instructions: impl Into<String>) -> Self {
        Self {
            generator,
            instructions: instructions.into(),
            debate_key: None,
            degrade_on_error: false,
        }
    }

    /// Debate sub-state field, when it is not the unit's first output.
    pub fn with_debate_key(mut self, key: impl Into<String>) -> Self {
        self.debate_key = Some(key.into());
        self
    }

    pub fn degrade_on_error(mut self, degrade: bool) -> Self {
        self.degrade_on_error = degrade;
        self
    }

    fn prompts(&self, ctx: &AbilityContext, debate: &DebateState, background: &Patch) -> (String, String) {
        let round = ctx.debate.as_ref().map(|seat| seat.round).unwrap_or(1);
        let system = format!(
            "{}\nYou are {} in round {} of the debate.\n{}",
            self.instructions,
            ctx.speaker(),
            round,
            memory_guidance(&ctx.memory)
        );

        let mut user = String::new();
        if debate.history.is_empty() {
            user.push_str("You open the debate.\n");
        } else {
            user.push_str(&format!("Debate so far:\n{}\n\n", debate.history));
            user.push_str(&format!("Respond to the last argument:\n{}\n", debate.current_response));
        }
        if !background.is_empty() {
            user.push_str(&format!("\nBackground:\n{}", render_input(background)));
        }
        (system, user)
    }
}

#[async_trait]
impl Ability for DebateTurnAbility {
    async fn invoke(&self, mut input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
        let Some(key) = self.debate_key.as_deref().or(ctx.primary_output()) else {
            anyhow::bail!("Unit '{}' declares no debate field", ctx.unit_id);
        };

        let mut debate = DebateState::from_value(input.remove(key).as_ref());
        let (system, user) = self.prompts(ctx, &debate, &input);

        let argument = match self.generator.generate(&system, &user, &ctx.model).await {
            Ok(text) => text,
            Err(err) if self.degrade_on_error => {
                tracing::warn!(unit = %ctx.unit_id, error = %err, "Debate turn degraded");
                unavailable(&ctx.ability, &err)
            }
            Err(err) => return Err(err.into()),
        };

        debate.record_turn(ctx.speaker(), argument.trim());

        let mut patch = Patch::new();
        patch.insert(key.to_string(), debate.to_value());
        Ok(Some(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::chat::tests::ScriptedGenerator;
    use crate::pipeline::{DebateGroup, DebateMember, expand};
    use council_common::{MemoryConfig, ModelConfig, Provider};
    use serde_json::json;

    fn contexts() -> Vec<AbilityContext> {
        let members = vec![
            DebateMember::new(
                "bull",
                "Bull Analyst",
                "bull_researcher",
                &["investment_debate_state"],
                &["investment_debate_state"],
            ),
            DebateMember::new(
                "bear",
                "Bear Analyst",
                "bear_researcher",
                &["investment_debate_state"],
                &["investment_debate_state"],
            ),
        ];
        let units = expand(&[DebateGroup::new("research", members).into()]).unwrap();
        units
            .iter()
            .map(|u| {
                AbilityContext::for_unit(
                    u,
                    ModelConfig::new(Provider::OpenRouter, "m"),
                    MemoryConfig::history(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_turns_accumulate_in_debate_state() {
        let contexts = contexts();
        let generator = Arc::new(ScriptedGenerator::replying("  Growth is strong. "));
        let ability = DebateTurnAbility::new(generator.clone(), "Argue your side.");

        let mut input = Patch::new();
        input.insert("investment_debate_state".into(), DebateState::default().to_value());
        input.insert("market_report".into(), json!("Uptrend"));
        let first = ability.invoke(input, &contexts[0]).await.unwrap().unwrap();

        let state = DebateState::from_value(first.get("investment_debate_state"));
        assert_eq!(state.count, 1);
        assert_eq!(state.current_response, "Bull Analyst: Growth is strong.");
        assert_eq!(first.len(), 1);

        let second = ability.invoke(first, &contexts[1]).await.unwrap().unwrap();
        let state = DebateState::from_value(second.get("investment_debate_state"));
        assert_eq!(state.count, 2);
        assert_eq!(
            state.history,
            "Bull Analyst: Growth is strong.\nBear Analyst: Growth is strong."
        );
        assert!(state.speakers.contains_key("Bear Analyst"));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("You open the debate."));
        assert!(prompts[0].1.contains("Uptrend"));
        assert!(prompts[1].1.contains("Respond to the last argument"));
        assert!(prompts[1].0.contains("Bear Analyst in round 1"));
    }

    #[tokio::test]
    async fn test_missing_sub_state_starts_fresh() {
        let ability = DebateTurnAbility::new(Arc::new(ScriptedGenerator::replying("Open.")), "x");
        let patch = ability.invoke(Patch::new(), &contexts()[0]).await.unwrap().unwrap();
        let state = DebateState::from_value(patch.get("investment_debate_state"));
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn test_degraded_turn_is_recorded() {
        let ability =
            DebateTurnAbility::new(Arc::new(ScriptedGenerator::failing()), "x").degrade_on_error(true);
        let patch = ability.invoke(Patch::new(), &contexts()[0]).await.unwrap().unwrap();
        let state = DebateState::from_value(patch.get("investment_debate_state"));
        assert!(state.current_response.contains("[bull_researcher unavailable:"));
    }
}
