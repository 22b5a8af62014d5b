//! Built-in pipeline declarations and the abilities that back them.

use crate::ability::{AbilityRegistry, ChatAbility, DebateTurnAbility, TextGenerator};
use crate::pipeline::{DebateGroup, DebateMember, PipelineFile, PipelineItem, Step, Unit};
use council_common::MemoryConfig;
use council_common::state::{
    COMPANY_OF_INTEREST, FINAL_TRADE_DECISION, FUNDAMENTALS_REPORT, INVESTMENT_DEBATE_STATE,
    INVESTMENT_PLAN, MARKET_REPORT, NEWS_REPORT, RISK_DEBATE_STATE, SENTIMENT_REPORT,
    TRADE_DATE, TRADER_INVESTMENT_PLAN,
};
use std::sync::Arc;

pub const INVESTMENT_DEBATE: &str = "investment-debate";

const REPORTS: [&str; 4] = [MARKET_REPORT, SENTIMENT_REPORT, NEWS_REPORT, FUNDAMENTALS_REPORT];

/// Role instructions for the built-in ability keys.
pub fn instructions_for(ability: &str) -> Option<&'static str> {
    let text = match ability {
        "market_analyst" => {
            "You are a market analyst. Assess price action, trend and volatility for the company on the trade date."
        }
        "social_analyst" => {
            "You are a social media analyst. Summarise public sentiment about the company and how it is shifting."
        }
        "news_analyst" => {
            "You are a news analyst. Report the macro and company news that matters for trading this stock."
        }
        "fundamentals_analyst" => {
            "You are a fundamentals analyst. Review financial statements, valuation and insider activity."
        }
        "bull_researcher" => {
            "You are the bull researcher. Build the strongest evidence-based case for investing and rebut the bear."
        }
        "bear_researcher" => {
            "You are the bear researcher. Build the strongest evidence-based case against investing and rebut the bull."
        }
        "research_manager" => {
            "You are the research manager. Judge the bull/bear debate and write a concrete investment plan with a clear stance."
        }
        "trader" => {
            "You are the trader. Turn the investment plan into a trading proposal ending with BUY, HOLD or SELL."
        }
        "risky_analyst" => {
            "You are the aggressive risk analyst. Champion high-reward opportunities in the trader's plan."
        }
        "safe_analyst" => {
            "You are the conservative risk analyst. Protect capital and point out what could go wrong."
        }
        "neutral_analyst" => {
            "You are the neutral risk analyst. Weigh both sides and argue for a balanced position."
        }
        "risk_manager" => {
            "You are the risk manager. Judge the risk debate and give the final decision: BUY, HOLD or SELL, with reasoning."
        }
        _ => return None,
    };
    Some(text)
}

fn analyst(id: &str, text: &str, output: &str) -> PipelineItem {
    Step::new(id, text, &format!("{}_analyst", id), &[COMPANY_OF_INTEREST, TRADE_DATE], &[output]).into()
}

fn debater(id: &str, text: &str, ability: &str, inputs: &[&str], debate: &str, order: i32) -> DebateMember {
    DebateMember::new(id, text, ability, inputs, &[debate]).with_order(order)
}

/// The full investment-debate workflow: four analysts, a bull/bear research
/// debate, the research manager, the trader, a three-way risk debate and the
/// risk manager's final decision.
pub fn investment_debate(research_rounds: u32, risk_rounds: u32) -> Vec<PipelineItem> {
    let research_inputs: Vec<&str> = [COMPANY_OF_INTEREST]
        .into_iter()
        .chain(REPORTS)
        .chain([INVESTMENT_DEBATE_STATE])
        .collect();
    let risk_inputs = [
        COMPANY_OF_INTEREST,
        MARKET_REPORT,
        SENTIMENT_REPORT,
        NEWS_REPORT,
        FUNDAMENTALS_REPORT,
        TRADER_INVESTMENT_PLAN,
        RISK_DEBATE_STATE,
    ];

    vec![
        analyst("market", "Market Analyst", MARKET_REPORT),
        analyst("social", "Social Media Analyst", SENTIMENT_REPORT),
        analyst("news", "News Analyst", NEWS_REPORT),
        analyst("fundamentals", "Fundamentals Analyst", FUNDAMENTALS_REPORT),
        DebateGroup::new(
            "research",
            vec![
                debater("bull", "Bull Researcher", "bull_researcher", &research_inputs, INVESTMENT_DEBATE_STATE, 1),
                debater("bear", "Bear Researcher", "bear_researcher", &research_inputs, INVESTMENT_DEBATE_STATE, 2),
            ],
        )
        .with_rounds(research_rounds)
        .with_memory(MemoryConfig::history())
        .into(),
        Step::new(
            "research_manager",
            "Research Manager",
            "research_manager",
            &research_inputs,
            &[INVESTMENT_PLAN],
        )
        .into(),
        Step::new(
            "trader",
            "Trader",
            "trader",
            &[COMPANY_OF_INTEREST, INVESTMENT_PLAN, MARKET_REPORT, NEWS_REPORT],
            &[TRADER_INVESTMENT_PLAN],
        )
        .into(),
        DebateGroup::new(
            "risk",
            vec![
                debater("risky", "Aggressive Analyst", "risky_analyst", &risk_inputs, RISK_DEBATE_STATE, 1),
                debater("safe", "Conservative Analyst", "safe_analyst", &risk_inputs, RISK_DEBATE_STATE, 2),
                debater("neutral", "Neutral Analyst", "neutral_analyst", &risk_inputs, RISK_DEBATE_STATE, 3),
            ],
        )
        .with_rounds(risk_rounds)
        .into(),
        Step::new(
            "risk_manager",
            "Risk Manager",
            "risk_manager",
            &[COMPANY_OF_INTEREST, TRADER_INVESTMENT_PLAN, RISK_DEBATE_STATE],
            &[FINAL_TRADE_DECISION],
        )
        .into(),
    ]
}

/// Pipeline file written by `council init`.
pub fn default_pipeline_file() -> PipelineFile {
    PipelineFile {
        name: INVESTMENT_DEBATE.to_string(),
        description: Some(
            "Analyst reports, bull/bear research debate, trading plan and risk debate".to_string(),
        ),
        extra_fields: Vec::new(),
        items: investment_debate(2, 1),
    }
}

/// Registry of live abilities for every unit, all sharing one generator.
///
/// Debate members get a [`DebateTurnAbility`]; steps get a [`ChatAbility`].
/// Ability keys without built-in instructions fall back to the unit's
/// display text as their role.
pub fn live_registry(
    units: &[Unit],
    generator: Arc<dyn TextGenerator>,
    degrade_on_error: bool,
) -> AbilityRegistry {
    let mut registry = AbilityRegistry::new();
    for unit in units {
        if registry.contains(&unit.ability) {
            continue;
        }
        let instructions = instructions_for(&unit.ability)
            .map(str::to_string)
            .unwrap_or_else(|| format!("You are the {}.", unit.display_text));

        if unit.is_debate() {
            let ability = DebateTurnAbility::new(generator.clone(), instructions)
                .degrade_on_error(degrade_on_error);
            registry.register(unit.ability.clone(), Arc::new(ability));
        } else {
            let ability =
                ChatAbility::new(generator.clone(), instructions).degrade_on_error(degrade_on_error);
            registry.register(unit.ability.clone(), Arc::new(ability));
        }
    }
    registry
}
