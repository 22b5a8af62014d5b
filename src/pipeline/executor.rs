//! Sequential executor: runs units one at a time against the shared state.
//!
//! For each unit the executor slices the declared inputs out of the state,
//! resolves the unit's memory and model configuration, awaits the ability,
//! stages the declared outputs and merges them. Every transition is reported
//! to the progress sink before the next one happens, so the event stream is
//! totally ordered. A cancellation token is checked before each dispatch;
//! an ability already in flight always runs to completion.

use crate::ability::{AbilityContext, AbilityRegistry};
use crate::errors::{ConfigError, PipelineError};
use crate::pipeline::expander::Unit;
use crate::pipeline::report::{ExecutionTimer, RunReport, RunStatus, RunSummary};
use crate::progress::ProgressSink;
use crate::resolve::ModelResolver;
use council_common::{
    ABORTED_UNIT_ID, FINAL_UNIT_ID, ItemType, MemoryConfig, ModelConfig, ModelOverride, Patch,
    PipelineState, ProgressEvent, ProgressStatus,
};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Runtime overrides applied on top of the pipeline's own configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Memory configuration forced on every unit.
    pub memory: Option<MemoryConfig>,
    /// Fallback for units whose item and group declare no memory.
    pub default_memory: MemoryConfig,
    /// Model override applied to every ability.
    pub model: Option<ModelOverride>,
    /// Per-ability model overrides, layered over `model`.
    pub ability_models: HashMap<String, ModelOverride>,
}

impl RunOptions {
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_default_memory(mut self, memory: MemoryConfig) -> Self {
        self.default_memory = memory;
        self
    }

    pub fn with_model(mut self, over: ModelOverride) -> Self {
        self.model = Some(over);
        self
    }

    pub fn with_ability_model(mut self, ability: impl Into<String>, over: ModelOverride) -> Self {
        self.ability_models.insert(ability.into(), over);
        self
    }

    /// Effective override for one ability key, if any layer sets something.
    pub fn model_override(&self, ability: &str) -> Option<ModelOverride> {
        let merged = match (&self.model, self.ability_models.get(ability)) {
            (None, None) => return None,
            (Some(global), None) => global.clone(),
            (None, Some(specific)) => specific.clone(),
            (Some(global), Some(specific)) => global.merged_with(specific),
        };
        (!merged.is_empty()).then_some(merged)
    }
}

/// Integer percentage of `done` out of `total`, rounded half up.
fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round() as u8
}

/// Stamps sequence numbers and forwards events to the sink.
struct Emitter<'a> {
    sink: &'a dyn ProgressSink,
    next_seq: u64,
}

impl<'a> Emitter<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, next_seq: 0 }
    }

    fn emit(&mut self, event: ProgressEvent) {
        let event = event.with_seq(self.next_seq);
        self.next_seq += 1;
        self.sink.on_event(&event);
    }
}

fn unit_event(unit: &Unit, status: ProgressStatus, progress: u8) -> ProgressEvent {
    let event = ProgressEvent::new(
        unit.id.clone(),
        unit.display_text.clone(),
        status,
        progress,
        unit.item_type,
    );
    match &unit.debate {
        Some(seat) => event.with_debate(
            seat.group.clone(),
            seat.round,
            seat.member_id.clone(),
            seat.member_text.clone(),
        ),
        None => event,
    }
}

/// Runs expanded units in order. Shareable across concurrent runs.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: AbilityRegistry,
    resolver: ModelResolver,
    options: RunOptions,
}

impl PipelineExecutor {
    pub fn new(registry: AbilityRegistry, resolver: ModelResolver) -> Self {
        Self {
            registry,
            resolver,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Model configuration a unit with this ability key would run with.
    pub fn model_for(&self, ability: &str) -> ModelConfig {
        self.resolver
            .resolve(ability, self.options.model_override(ability).as_ref())
    }

    /// Run `units` against `initial`.
    ///
    /// Returns the final state when every unit completed, or the state reached
    /// so far when the token was cancelled. An ability failure is reported as
    /// an `error` event and returned as [`PipelineError::AbilityFailed`]
    /// carrying the state merged from earlier units.
    pub async fn run(
        &self,
        units: &[Unit],
        initial: PipelineState,
        sink: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<RunReport, PipelineError> {
        self.registry.check(units)?;

        let timer = ExecutionTimer::start();
        let total = units.len();
        let mut emitter = Emitter::new(sink);
        let mut state = initial;
        let mut patches: Vec<Patch> = Vec::with_capacity(total);
        let mut summary = RunSummary::new(total);

        tracing::info!(units = total, "Pipeline started");

        for (i, unit) in units.iter().enumerate() {
            let progress_before = percent(i, total);

            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::warn!(next_unit = %unit.id, completed = i, "Pipeline aborted");
                emitter.emit(ProgressEvent::new(
                    ABORTED_UNIT_ID,
                    "Pipeline aborted",
                    ProgressStatus::Aborted,
                    progress_before,
                    ItemType::Pipeline,
                ));
                summary.duration = timer.elapsed();
                return Ok(RunReport {
                    status: RunStatus::Aborted,
                    state,
                    patches,
                    summary,
                });
            }

            emitter.emit(unit_event(unit, ProgressStatus::Started, progress_before));
            tracing::info!(unit = %unit.id, ability = %unit.ability, "Unit started");

            let ability = self.registry.get(&unit.ability).ok_or_else(|| {
                ConfigError::UnknownAbility {
                    unit_id: unit.id.clone(),
                    ability: unit.ability.clone(),
                }
            })?;
            let memory = unit.memory_config(
                self.options.memory.as_ref(),
                &self.options.default_memory,
            );
            let model = self.model_for(&unit.ability);
            tracing::debug!(
                unit = %unit.id,
                provider = %model.provider,
                model = %model.model_name,
                memory = %memory.strategy,
                top_k = ?memory.top_k,
                "Resolved unit configuration"
            );

            let ctx = AbilityContext::for_unit(unit, model, memory);
            let input = state.slice(&unit.inputs);

            match ability.invoke(input, &ctx).await {
                Ok(result) => {
                    let patch = result.unwrap_or_default();
                    let staged = state.stage(&unit.outputs, &patch);
                    state.merge(staged);
                    summary.completed += 1;

                    emitter.emit(
                        unit_event(unit, ProgressStatus::Completed, percent(i + 1, total))
                            .with_result(Value::Object(patch.clone())),
                    );
                    tracing::info!(unit = %unit.id, "Unit completed");
                    patches.push(patch);
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    tracing::warn!(unit = %unit.id, error = %message, "Unit failed");
                    emitter.emit(
                        unit_event(unit, ProgressStatus::Error, progress_before)
                            .with_error(message.clone()),
                    );
                    return Err(PipelineError::AbilityFailed {
                        unit_id: unit.id.clone(),
                        message,
                        state: Box::new(state),
                    });
                }
            }
        }

        emitter.emit(
            ProgressEvent::new(
                FINAL_UNIT_ID,
                "Pipeline complete",
                ProgressStatus::Completed,
                100,
                ItemType::Pipeline,
            )
            .with_result(Value::Array(
                patches.iter().cloned().map(Value::Object).collect(),
            )),
        );

        summary.duration = timer.elapsed();
        tracing::info!(
            units = total,
            duration_ms = summary.duration.as_millis() as u64,
            "Pipeline completed"
        );

        Ok(RunReport {
            status: RunStatus::Completed,
            state,
            patches,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{Ability, AbilityContext};
    use crate::pipeline::{DebateGroup, DebateMember, PipelineItem, Step, expand};
    use crate::resolve::ProviderKeys;
    use async_trait::async_trait;
    use council_common::{MemoryStrategy, Provider};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Sink that keeps every event.
    #[derive(Default)]
    struct Collect(Mutex<Vec<ProgressEvent>>);

    impl Collect {
        fn events(&self) -> Vec<ProgressEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ProgressSink for Collect {
        fn on_event(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    /// Writes a fixed value to one key and records what it was given.
    struct Writer {
        key: &'static str,
        value: Value,
        seen: Arc<Mutex<Vec<(String, Patch, AbilityContext)>>>,
    }

    #[async_trait]
    impl Ability for Writer {
        async fn invoke(&self, input: Patch, ctx: &AbilityContext) -> anyhow::Result<Option<Patch>> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.unit_id.clone(), input, ctx.clone()));
            let mut out = Patch::new();
            out.insert(self.key.to_string(), self.value.clone());
            Ok(Some(out))
        }
    }

    type Seen = Arc<Mutex<Vec<(String, Patch, AbilityContext)>>>;

    fn writer(key: &'static str, value: Value, seen: &Seen) -> Writer {
        Writer {
            key,
            value,
            seen: seen.clone(),
        }
    }

    async fn fail(_: Patch, _: AbilityContext) -> anyhow::Result<Option<Patch>> {
        anyhow::bail!("rate limited")
    }

    async fn empty(_: Patch, _: AbilityContext) -> anyhow::Result<Option<Patch>> {
        Ok(None)
    }

    fn executor(registry: AbilityRegistry) -> PipelineExecutor {
        PipelineExecutor::new(registry, ModelResolver::new(ProviderKeys::new()))
    }

    fn statuses(events: &[ProgressEvent]) -> Vec<(String, ProgressStatus, u8)> {
        events
            .iter()
            .map(|e| (e.unit_id.clone(), e.status, e.progress_percent))
            .collect()
    }

    fn two_steps() -> Vec<Unit> {
        expand(&[
            Step::new("A", "Step A", "a", &[], &["market_report"]).into(),
            Step::new("B", "Step B", "b", &["market_report"], &["news_report"]).into(),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_steps_emit_expected_sequence() {
        let seen = Seen::default();
        let registry = AbilityRegistry::new()
            .with("a", writer("market_report", json!("up"), &seen))
            .with("b", writer("news_report", json!("calm"), &seen));
        let sink = Collect::default();

        let report = executor(registry)
            .run(&two_steps(), PipelineState::new(), &sink, None)
            .await
            .unwrap();

        use ProgressStatus::*;
        let expected: Vec<(String, ProgressStatus, u8)> = vec![
            ("A".into(), Started, 0),
            ("A".into(), Completed, 50),
            ("B".into(), Started, 50),
            ("B".into(), Completed, 100),
            (FINAL_UNIT_ID.into(), Completed, 100),
        ];
        let events = sink.events();
        assert_eq!(statuses(&events), expected);
        assert!(events.iter().enumerate().all(|(i, e)| e.seq == i as u64));

        let final_result = events.last().unwrap().result.clone().unwrap();
        assert_eq!(final_result, json!([{"market_report": "up"}, {"news_report": "calm"}]));
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.patches.len(), 2);
        assert!(report.summary.all_completed());

        let seen = seen.lock().unwrap();
        assert!(seen[0].1.is_empty());
        assert_eq!(seen[1].1["market_report"], "up");
    }

    #[tokio::test]
    async fn test_debate_units_carry_coordinates() {
        let seen = Seen::default();
        let group = DebateGroup::new(
            "main",
            vec![
                DebateMember::new("bull", "Bull", "bull", &[], &[]).with_order(1),
                DebateMember::new("bear", "Bear", "bear", &[], &[]).with_order(2),
            ],
        )
        .with_rounds(2);
        let units = expand(&[group.into()]).unwrap();
        let registry = AbilityRegistry::new()
            .with("bull", writer("x", json!(1), &seen))
            .with("bear", writer("x", json!(2), &seen));
        let sink = Collect::default();

        executor(registry)
            .run(&units, PipelineState::new(), &sink, None)
            .await
            .unwrap();

        let started: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.status == ProgressStatus::Started)
            .collect();
        let ids: Vec<&str> = started.iter().map(|e| e.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["bull_r1", "bear_r1", "bull_r2", "bear_r2"]);
        assert_eq!(started[2].debate_round, Some(2));
        assert_eq!(started[2].debate_group.as_deref(), Some("main"));
        assert_eq!(started[1].debate_member_id.as_deref(), Some("bear"));
        assert_eq!(started[1].item_type, ItemType::Debate);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[3].2.debate.as_ref().unwrap().round, 2);
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_keeps_prior_state() {
        let seen = Seen::default();
        let units = expand(&[
            Step::new("one", "One", "ok", &[], &["market_report"]).into(),
            Step::new("two", "Two", "boom", &[], &["news_report"]).into(),
            Step::new("three", "Three", "later", &[], &["investment_plan"]).into(),
        ])
        .unwrap();
        let registry = AbilityRegistry::new()
            .with("ok", writer("market_report", json!("done"), &seen))
            .with_fn("boom", fail)
            .with("later", writer("investment_plan", json!("never"), &seen));
        let sink = Collect::default();

        let err = executor(registry)
            .run(&units, PipelineState::new(), &sink, None)
            .await
            .unwrap_err();

        let events = sink.events();
        let error = events.last().unwrap();
        assert_eq!(error.unit_id, "two");
        assert_eq!(error.status, ProgressStatus::Error);
        assert_eq!(error.error.as_deref(), Some("rate limited"));
        assert_eq!(error.progress_percent, 33);
        assert!(!events.iter().any(|e| e.unit_id == "three"));
        assert!(!events.iter().any(|e| e.is_terminal()));

        assert_eq!(err.failed_unit(), Some("two"));
        let partial = err.partial_state().unwrap();
        assert_eq!(partial.get_str("market_report"), Some("done"));
        assert!(!partial.contains("news_report"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_unit_lets_it_finish() {
        let token = CancellationToken::new();
        let cancel_inside = token.clone();
        let registry = AbilityRegistry::new()
            .with_fn("a", move |_: Patch, _: AbilityContext| {
                let token = cancel_inside.clone();
                async move {
                    token.cancel();
                    let mut out = Patch::new();
                    out.insert("market_report".into(), json!("finished anyway"));
                    Ok::<_, anyhow::Error>(Some(out))
                }
            })
            .with_fn("b", empty);
        let sink = Collect::default();

        let report = executor(registry)
            .run(&two_steps(), PipelineState::new(), &sink, Some(&token))
            .await
            .unwrap();

        use ProgressStatus::*;
        let expected: Vec<(String, ProgressStatus, u8)> = vec![
            ("A".into(), Started, 0),
            ("A".into(), Completed, 50),
            (ABORTED_UNIT_ID.into(), Aborted, 50),
        ];
        assert_eq!(statuses(&sink.events()), expected);
        assert!(report.is_aborted());
        assert_eq!(report.state.get_str("market_report"), Some("finished anyway"));
        assert_eq!(report.summary.completed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let registry = AbilityRegistry::new().with_fn("a", fail).with_fn("b", fail);
        let sink = Collect::default();

        let report = executor(registry)
            .run(&two_steps(), PipelineState::new(), &sink, Some(&token))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].unit_id, ABORTED_UNIT_ID);
        assert_eq!(events[0].progress_percent, 0);
        assert_eq!(report.status, RunStatus::Aborted);
    }

    #[tokio::test]
    async fn test_unproduced_and_null_outputs_pass_through() {
        let seen = Seen::default();
        let units = expand(&[
            Step::new("keep", "Keep", "silent", &[], &["market_report"]).into(),
            Step::new("null", "Null", "nuller", &[], &["market_report"]).into(),
        ])
        .unwrap();
        let registry = AbilityRegistry::new()
            .with_fn("silent", empty)
            .with("nuller", writer("market_report", Value::Null, &seen));
        let mut initial = PipelineState::new();
        initial.set("market_report", "seeded").unwrap();

        let report = executor(registry)
            .run(&units, initial, &crate::progress::NullSink, None)
            .await
            .unwrap();
        assert_eq!(report.state.get_str("market_report"), Some("seeded"));
    }

    #[tokio::test]
    async fn test_undeclared_patch_keys_are_not_merged() {
        let seen = Seen::default();
        let units = expand(&[Step::new("a", "A", "a", &[], &["market_report"]).into()]).unwrap();
        let registry = AbilityRegistry::new().with("a", writer("news_report", json!("x"), &seen));

        let report = executor(registry)
            .run(&units, PipelineState::new(), &crate::progress::NullSink, None)
            .await
            .unwrap();
        assert!(!report.state.contains("news_report"));
        assert_eq!(report.patches[0]["news_report"], "x");
    }

    #[tokio::test]
    async fn test_unknown_ability_fails_before_any_event() {
        let units = two_steps();
        let registry = AbilityRegistry::new().with_fn("a", empty);
        let sink = Collect::default();

        let err = executor(registry)
            .run(&units, PipelineState::new(), &sink, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownAbility { ref ability, .. }) if ability == "b"
        ));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_completed_percentages_are_monotonic() {
        let items: Vec<PipelineItem> = (0..7)
            .map(|i| Step::new(&format!("s{}", i), "S", "x", &[], &[]).into())
            .collect();
        let units = expand(&items).unwrap();
        let sink = Collect::default();

        executor(AbilityRegistry::new().with_fn("x", empty))
            .run(&units, PipelineState::new(), &sink, None)
            .await
            .unwrap();

        let completed: Vec<u8> = sink
            .events()
            .iter()
            .filter(|e| e.status == ProgressStatus::Completed)
            .map(|e| e.progress_percent)
            .collect();
        assert!(completed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(completed.last(), Some(&100));
        assert_eq!(completed[0], 14);
    }

    #[tokio::test]
    async fn test_runtime_overrides_reach_the_ability() {
        let seen = Seen::default();
        let units = two_steps();
        let registry = AbilityRegistry::new()
            .with("a", writer("market_report", json!(1), &seen))
            .with("b", writer("news_report", json!(2), &seen));
        let options = RunOptions::default()
            .with_memory(MemoryConfig::history())
            .with_model(ModelOverride {
                provider: Some(Provider::Ollama),
                ..Default::default()
            })
            .with_ability_model(
                "b",
                ModelOverride {
                    model_name: Some("llama3".into()),
                    ..Default::default()
                },
            );

        executor(registry)
            .with_options(options)
            .run(&units, PipelineState::new(), &crate::progress::NullSink, None)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let (a, b) = (&seen[0].2, &seen[1].2);
        assert_eq!(a.memory.strategy, MemoryStrategy::History);
        assert_eq!(a.model.provider, Provider::Ollama);
        assert_eq!(b.model.provider, Provider::Ollama);
        assert_eq!(b.model.model_name, "llama3");
        assert_ne!(a.model.model_name, "llama3");
    }

    #[tokio::test]
    async fn test_empty_pipeline_only_emits_final() {
        let sink = Collect::default();
        let report = executor(AbilityRegistry::new())
            .run(&[], PipelineState::new(), &sink, None)
            .await
            .unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_final());
        assert_eq!(events[0].progress_percent, 100);
        assert_eq!(report.summary.completion_percentage(), 100.0);
    }

    #[test]
    fn test_percent_rounds_half_up() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_model_override_layers() {
        let options = RunOptions::default();
        assert!(options.model_override("x").is_none());

        let options = options.with_ability_model("x", ModelOverride::default());
        assert!(options.model_override("x").is_none());
    }
}
