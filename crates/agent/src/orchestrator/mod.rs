//! The turn orchestrator: the multi-phase pipeline behind every turn.
//!
//! ```text
//! classify → enrich → specialize → invoke_llm → execute_tools → assemble_envelope → done
//!     └──────────┴──────────┴────────────┴──────────────┴─────────────────┴──→ error
//! ```
//!
//! [`TurnOrchestrator::handle_turn`] never fails. Validation errors,
//! pipeline failures, cancellation and panics all come back as a
//! [`ResponseEnvelope`] with `outcome = error` and a populated error field.
//! Only this module has side effects: LLM calls, tool execution and the
//! idempotency store.

pub mod classify;
pub mod envelope;
pub mod idempotency;
pub mod invoke;
pub mod ledger;
pub mod specialist;
pub mod state_builder;

#[cfg(test)]
pub(crate) mod test_support;

use crate::context::render;
use crate::context::{AssemblyRequest, ContextAssembler, ContextPack, ModelSettings};
use classify::{Classification, TurnKind};
use decisionflow_config::AppConfig;
use decisionflow_core::error::{ProviderError, ToolError};
use decisionflow_core::event::{DomainEvent, EventBus};
use decisionflow_core::provider::Provider;
use decisionflow_core::request::TurnRequest;
use decisionflow_core::state::DecisionState;
use decisionflow_core::tool::{SideEffects, ToolCall, ToolContext, ToolOutcome, ToolRegistry};
use decisionflow_core::{
    Block, DecisionStage, ErrorCode, Lineage, Observability, Outcome, ResponseEnvelope,
    StageIndicator, SuggestedAction,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use idempotency::{IdempotencyStore, InMemoryIdempotencyStore, InflightRegistration};
use invoke::{InvokerSettings, LlmInvoker, LlmReply};
use specialist::{Specialist, SpecialistAdvice, SpecialistInput, StuckDetector};
use state_builder::BuiltState;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

pub use classify::classify;
pub use idempotency::InflightTurn;

/// Assistant text for pipeline failures. Never carries internals.
pub const PIPELINE_ERROR_TEXT: &str =
    "Sorry, something went wrong while working on that. Please try again.";
pub const CANCELLED_TEXT: &str = "The request was cancelled before it finished.";

// ── Settings ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub model_route: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub ack_timeout_ms: u64,
    pub reasoning_timeout_ms: u64,
    pub ack_fallback_text: String,
    pub production: bool,
    pub prompt_version: String,
    pub knowledge_version: Option<String>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            model_route: config.llm.provider.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            ack_timeout_ms: config.orchestrator.ack_timeout_ms,
            reasoning_timeout_ms: config.orchestrator.reasoning_timeout_ms,
            ack_fallback_text: config.orchestrator.ack_fallback_text.clone(),
            production: config.orchestrator.production,
            prompt_version: config.context.prompt_version.clone(),
            knowledge_version: config.knowledge.version.clone(),
        }
    }

    fn invoker_settings(&self) -> InvokerSettings {
        InvokerSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ack_timeout_ms: self.ack_timeout_ms,
            reasoning_timeout_ms: self.reasoning_timeout_ms,
            ack_fallback_text: self.ack_fallback_text.clone(),
        }
    }
}

// ── Phases ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Classify,
    Enrich,
    Specialize,
    InvokeLlm,
    ExecuteTools,
    AssembleEnvelope,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Classify => "classify",
            Phase::Enrich => "enrich",
            Phase::Specialize => "specialize",
            Phase::InvokeLlm => "invoke_llm",
            Phase::ExecuteTools => "execute_tools",
            Phase::AssembleEnvelope => "assemble_envelope",
            Phase::Done => "done",
        }
    }
}

/// Why a run stopped early.
#[derive(Debug)]
struct PhaseFailure {
    code: ErrorCode,
    diagnostics: String,
}

impl PhaseFailure {
    fn pipeline(diagnostics: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::PipelineError,
            diagnostics: diagnostics.into(),
        }
    }

    fn cancelled(phase: Phase) -> Self {
        Self {
            code: ErrorCode::Cancelled,
            diagnostics: format!("cancelled at {}", phase.as_str()),
        }
    }

    fn safe_message(&self) -> &'static str {
        match self.code {
            ErrorCode::Cancelled => CANCELLED_TEXT,
            _ => PIPELINE_ERROR_TEXT,
        }
    }
}

/// Everything the enrich phase derives from a request.
struct Enriched {
    classification: Classification,
    state: DecisionState,
    stage: DecisionStage,
    confidence: f64,
    seed: u64,
    pack: ContextPack,
    degraded_reasons: Vec<String>,
}

/// Mutable state of one run, filled in phase by phase.
struct TurnRun {
    request: TurnRequest,
    request_id: String,
    classification: Option<Classification>,
    enriched: Option<Enriched>,
    advice: SpecialistAdvice,
    reply: Option<LlmReply>,
    pending_calls: Vec<ToolCall>,
    model_actions: Vec<SuggestedAction>,
    tool_outcomes: Vec<ToolOutcome>,
    effects: SideEffects,
    degraded_reasons: Vec<String>,
    timings: BTreeMap<String, u64>,
    envelope: Option<ResponseEnvelope>,
}

impl TurnRun {
    fn new(request: TurnRequest) -> Self {
        Self {
            request,
            request_id: uuid::Uuid::new_v4().to_string(),
            classification: None,
            enriched: None,
            advice: SpecialistAdvice::default(),
            reply: None,
            pending_calls: Vec::new(),
            model_actions: Vec::new(),
            tool_outcomes: Vec::new(),
            effects: SideEffects::default(),
            degraded_reasons: Vec::new(),
            timings: BTreeMap::new(),
            envelope: None,
        }
    }
}

/// Takes the field rather than the run so other fields stay borrowable.
fn require_enriched(slot: &Option<Enriched>) -> Result<&Enriched, PhaseFailure> {
    slot.as_ref()
        .ok_or_else(|| PhaseFailure::pipeline("enrich phase produced no context"))
}

// ── Orchestrator ──────────────────────────────────────────────────────────

/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct TurnOrchestrator {
    tools: Arc<ToolRegistry>,
    assembler: Arc<ContextAssembler>,
    invoker: Arc<LlmInvoker>,
    store: Arc<dyn IdempotencyStore>,
    specialists: Vec<Arc<dyn Specialist>>,
    event_bus: Arc<EventBus>,
    settings: Arc<OrchestratorSettings>,
}

impl TurnOrchestrator {
    /// Wire an orchestrator from configuration.
    ///
    /// Defaults: in-memory idempotency store, the stuck detector as the only
    /// specialist, a fresh event bus, and the response and pack caches when
    /// enabled in config.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let settings = OrchestratorSettings::from_config(config);
        let mut invoker = LlmInvoker::new(provider, settings.invoker_settings());
        let mut assembler = ContextAssembler::new(config.context.clone());
        if config.orchestrator.response_cache_enabled {
            invoker = invoker.with_response_cache(config.orchestrator.response_cache_capacity);
            assembler = assembler.with_pack_cache(config.orchestrator.response_cache_capacity);
        }
        Self {
            tools,
            assembler: Arc::new(assembler),
            invoker: Arc::new(invoker),
            store: Arc::new(InMemoryIdempotencyStore::new(
                config.orchestrator.idempotency_capacity,
            )),
            specialists: vec![Arc::new(StuckDetector::default())],
            event_bus: Arc::new(EventBus::default()),
            settings: Arc::new(settings),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_specialist(mut self, specialist: Arc<dyn Specialist>) -> Self {
        self.specialists.push(specialist);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// A context pack assembled by an earlier turn or preview.
    pub fn cached_pack(&self, context_hash: &str) -> Option<ContextPack> {
        self.assembler.cached_pack(context_hash)
    }

    /// Test reset hook for the response and pack caches.
    pub fn clear_caches(&self) {
        self.invoker.clear_cache();
        self.assembler.clear_cache();
    }

    /// The context pack a turn would send, without calling the LLM.
    pub fn preview(&self, request: &TurnRequest) -> Result<ContextPack, String> {
        request.validate()?;
        let classification = classify(request);
        Ok(self.enrich(request, classification).pack)
    }

    /// Run a turn end to end. Always returns an envelope.
    ///
    /// Retries with the same `client_turn_id` get the stored envelope, or
    /// await the run already in flight. The first caller's cancellation
    /// token governs a shared run; a caller that joined a run which then
    /// failed runs the turn again under its own token. Error envelopes are
    /// not stored, so a retry after a failure runs again.
    ///
    /// `TurnCompleted` is published by every caller that ran or joined a
    /// run, but not for replays of a stored envelope.
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> ResponseEnvelope {
        let started = Instant::now();
        let turn_id = request.client_turn_id.clone();

        if let Err(reason) = request.validate() {
            warn!(turn_id = %turn_id, %reason, "Rejecting invalid turn request");
            let mut envelope =
                ResponseEnvelope::failure(&turn_id, ErrorCode::InvalidRequest, reason);
            envelope.observability.request_id = uuid::Uuid::new_v4().to_string();
            return envelope;
        }

        if let Some(stored) = self.store.get(&turn_id).await {
            debug!(turn_id = %turn_id, "Returning stored envelope");
            return stored;
        }

        // Lazy: nothing runs until the owning caller awaits it.
        let this = self.clone();
        let run: BoxFuture<'static, ResponseEnvelope> =
            async move { this.run_guarded(request, cancel).await }.boxed();
        let shared = run.shared();

        let registration = match self.store.register_inflight(&turn_id, shared.clone()) {
            None => InflightRegistration::new(self.store.clone(), &turn_id, shared.clone()),
            Some(existing) => {
                debug!(turn_id = %turn_id, "Joining turn already in flight");
                let envelope = existing.clone().await;
                if envelope.outcome != Outcome::Error {
                    let envelope = self.store.set_if_absent(&turn_id, envelope).await;
                    return self.finish(&turn_id, envelope, started);
                }
                debug!(turn_id = %turn_id, "Joined run failed, running again");
                self.store.clear_inflight(&turn_id, &existing);
                match self.store.register_inflight(&turn_id, shared.clone()) {
                    None => {
                        InflightRegistration::new(self.store.clone(), &turn_id, shared.clone())
                    }
                    Some(other) => {
                        let envelope = other.await;
                        return self.finish(&turn_id, envelope, started);
                    }
                }
            }
        };

        // Another run may have completed between the lookup and registering.
        if let Some(stored) = self.store.get(&turn_id).await {
            debug!(turn_id = %turn_id, "Returning envelope stored while registering");
            return stored;
        }

        let envelope = shared.await;
        let envelope = if envelope.outcome == Outcome::Error {
            envelope
        } else {
            self.store.set_if_absent(&turn_id, envelope).await
        };
        drop(registration);
        self.finish(&turn_id, envelope, started)
    }

    fn finish(&self, turn_id: &str, envelope: ResponseEnvelope, started: Instant) -> ResponseEnvelope {
        self.event_bus.publish(DomainEvent::TurnCompleted {
            turn_id: turn_id.to_string(),
            outcome: envelope.outcome.as_str().to_string(),
            duration_ms: elapsed_ms(started),
            timestamp: chrono::Utc::now(),
        });
        envelope
    }

    /// Run the phases, converting a panic into a pipeline error envelope.
    async fn run_guarded(&self, request: TurnRequest, cancel: CancellationToken) -> ResponseEnvelope {
        let turn_id = request.client_turn_id.clone();
        let span = tracing::info_span!(
            "turn",
            turn_id = %turn_id,
            scenario_id = %request.scenario_id,
        );
        let result = AssertUnwindSafe(self.run(request, cancel).instrument(span))
            .catch_unwind()
            .await;
        match result {
            Ok(envelope) => envelope,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(turn_id = %turn_id, panic = %detail, "Turn pipeline panicked");
                let mut envelope =
                    ResponseEnvelope::failure(&turn_id, ErrorCode::PipelineError, PIPELINE_ERROR_TEXT);
                envelope.observability.request_id = uuid::Uuid::new_v4().to_string();
                if !self.settings.production {
                    envelope.observability.diagnostics = Some(format!("panic: {detail}"));
                }
                envelope
            }
        }
    }

    async fn run(&self, request: TurnRequest, cancel: CancellationToken) -> ResponseEnvelope {
        let mut run = TurnRun::new(request);
        self.event_bus.publish(DomainEvent::TurnReceived {
            turn_id: run.request.client_turn_id.clone(),
            scenario_id: run.request.scenario_id.clone(),
            system_event: run.request.system_event.is_some(),
            timestamp: chrono::Utc::now(),
        });
        info!("Turn started");

        let mut phase = Phase::Classify;
        while phase != Phase::Done {
            if cancel.is_cancelled() {
                return self.failure_envelope(&run, PhaseFailure::cancelled(phase));
            }
            let started = Instant::now();
            let result = self.step(phase, &mut run, &cancel).await;
            let duration_ms = elapsed_ms(started);
            run.timings.insert(phase.as_str().to_string(), duration_ms);
            debug!(phase = phase.as_str(), duration_ms, "Phase finished");
            match result {
                Ok(next) => phase = next,
                Err(failure) => {
                    warn!(phase = phase.as_str(), code = ?failure.code, diagnostics = %failure.diagnostics, "Turn failed");
                    return self.failure_envelope(&run, failure);
                }
            }
        }

        let Some(mut envelope) = run.envelope.take() else {
            return self.failure_envelope(&run, PhaseFailure::pipeline("no envelope assembled"));
        };
        envelope.observability.phase_timings_ms = run.timings;
        info!(outcome = envelope.outcome.as_str(), "Turn finished");
        envelope
    }

    async fn step(
        &self,
        phase: Phase,
        run: &mut TurnRun,
        cancel: &CancellationToken,
    ) -> Result<Phase, PhaseFailure> {
        match phase {
            Phase::Classify => {
                let classification = classify(&run.request);
                debug!(
                    route = %classification.route,
                    intent = %classification.intent,
                    kind = ?classification.kind,
                    "Turn classified"
                );
                run.classification = Some(classification);
                Ok(Phase::Enrich)
            }
            Phase::Enrich => {
                let classification = run
                    .classification
                    .clone()
                    .ok_or_else(|| PhaseFailure::pipeline("classify phase produced nothing"))?;
                let enriched = self.enrich(&run.request, classification);
                self.event_bus.publish(DomainEvent::ContextAssembled {
                    turn_id: run.request.client_turn_id.clone(),
                    context_hash: enriched.pack.context_hash.clone(),
                    total_tokens: enriched.pack.budget.total_tokens,
                    within_budget: enriched.pack.budget.within_budget,
                    timestamp: chrono::Utc::now(),
                });
                run.degraded_reasons.extend(enriched.degraded_reasons.iter().cloned());
                run.enriched = Some(enriched);
                Ok(Phase::Specialize)
            }
            Phase::Specialize => {
                let enriched = require_enriched(&run.enriched)?;
                let input = SpecialistInput {
                    stage: enriched.stage,
                    state: &enriched.state,
                    turns: &run.request.context.messages,
                    message: &run.request.message,
                };
                run.advice = specialist::run_specialists(&self.specialists, &input);
                Ok(Phase::InvokeLlm)
            }
            Phase::InvokeLlm => {
                self.invoke_llm(run, cancel).await?;
                Ok(Phase::ExecuteTools)
            }
            Phase::ExecuteTools => {
                self.execute_tools(run, cancel).await?;
                Ok(Phase::AssembleEnvelope)
            }
            Phase::AssembleEnvelope => {
                let envelope = self.assemble_envelope(run)?;
                run.envelope = Some(envelope);
                Ok(Phase::Done)
            }
            Phase::Done => Ok(Phase::Done),
        }
    }

    /// Build the decision state, infer the stage and assemble the context.
    fn enrich(&self, request: &TurnRequest, classification: Classification) -> Enriched {
        let BuiltState {
            state,
            mut degraded_reasons,
        } = state_builder::build_state(&request.context);
        let (stage, confidence) = state_builder::infer_stage(&state);
        let seed = scenario_seed(&request.scenario_id);
        let model = self.model_settings(seed, classification.kind);

        let pack = self.assembler.assemble(&AssemblyRequest {
            prompt_version: &self.settings.prompt_version,
            route: classification.route,
            stage,
            state: &state,
            turns: &request.context.messages,
            current_message: &request.message,
            selected_elements: &request.selected_elements,
            clarification_answers: &request.clarification_answers,
            model: &model,
            seed_graph: request.context.graph.as_ref(),
            retrieval: &[],
        });

        if pack.outcome != Outcome::Ok {
            degraded_reasons.push(
                pack.budget
                    .degraded_reason
                    .clone()
                    .unwrap_or_else(|| format!("context_over_budget: {} tokens", pack.budget.overage_tokens)),
            );
        }

        Enriched {
            classification,
            state,
            stage,
            confidence,
            seed,
            pack,
            degraded_reasons,
        }
    }

    fn model_settings(&self, seed: u64, kind: TurnKind) -> ModelSettings {
        ModelSettings {
            model_id: self.settings.model.clone(),
            model_route: Some(self.settings.model_route.clone()),
            seed: Some(seed),
            capability: Some(
                match kind {
                    TurnKind::Acknowledge => "chat",
                    TurnKind::Full => "tools",
                }
                .to_string(),
            ),
            config: serde_json::json!({
                "temperature": self.settings.temperature,
                "max_tokens": self.settings.max_tokens,
            }),
        }
    }

    async fn invoke_llm(
        &self,
        run: &mut TurnRun,
        cancel: &CancellationToken,
    ) -> Result<(), PhaseFailure> {
        let enriched = require_enriched(&run.enriched)?;
        let classification = &enriched.classification;

        // A system event that maps to a tool needs no model call.
        if let Some(tool) = &classification.forced_tool {
            run.pending_calls.push(ToolCall {
                id: format!("event_{tool}"),
                name: tool.clone(),
                arguments: run
                    .request
                    .system_event
                    .as_ref()
                    .map(|e| e.payload.clone())
                    .unwrap_or(serde_json::Value::Null),
            });
            return Ok(());
        }

        let reply = match classification.kind {
            TurnKind::Acknowledge => {
                let kind = run
                    .request
                    .system_event
                    .as_ref()
                    .map_or("event", |e| e.kind.as_str());
                self.invoker.acknowledge(&enriched.pack, kind, cancel).await
            }
            TurnKind::Full => {
                let mut tools = self.tools.definitions();
                tools.push(envelope::suggest_actions_definition());
                self.invoker
                    .reason(&enriched.pack, &run.advice.advice, tools, cancel)
                    .await
                    .map_err(|e| match e {
                        ProviderError::Cancelled => PhaseFailure::cancelled(Phase::InvokeLlm),
                        other => PhaseFailure::pipeline(format!("llm: {other}")),
                    })?
            }
        };

        self.event_bus.publish(DomainEvent::LlmInvoked {
            turn_id: run.request.client_turn_id.clone(),
            path: reply.path.as_str().to_string(),
            success: reply.outcome == Outcome::Ok,
            duration_ms: reply.duration_ms,
            timestamp: chrono::Utc::now(),
        });

        if let Some(reason) = &reply.degraded_reason {
            run.degraded_reasons.push(reason.clone());
        }
        for call in &reply.tool_calls {
            if call.name == envelope::SUGGEST_ACTIONS_TOOL {
                run.model_actions
                    .extend(envelope::parse_suggested_actions(&call.arguments));
            } else {
                run.pending_calls.push(call.clone());
            }
        }
        run.reply = Some(reply);
        Ok(())
    }

    async fn execute_tools(
        &self,
        run: &mut TurnRun,
        cancel: &CancellationToken,
    ) -> Result<(), PhaseFailure> {
        if run.pending_calls.is_empty() {
            return Ok(());
        }
        let enriched = require_enriched(&run.enriched)?;
        let ctx = ToolContext {
            scenario_id: run.request.scenario_id.clone(),
            state: enriched.state.clone(),
            graph: run.request.context.graph.clone(),
            seed: enriched.seed,
        };

        let calls = std::mem::take(&mut run.pending_calls);
        for call in &calls {
            if cancel.is_cancelled() {
                return Err(PhaseFailure::cancelled(Phase::ExecuteTools));
            }
            let started = Instant::now();
            let result = self.tools.execute(&ctx, call).await;
            self.event_bus.publish(DomainEvent::ToolExecuted {
                turn_id: run.request.client_turn_id.clone(),
                tool_name: call.name.clone(),
                success: result.as_ref().is_ok_and(|o| o.success),
                duration_ms: elapsed_ms(started),
                timestamp: chrono::Utc::now(),
            });

            match result {
                Ok(outcome) => {
                    debug!(tool = %call.name, success = outcome.success, "Tool executed");
                    run.effects.merge(outcome.side_effects);
                    run.tool_outcomes.push(outcome);
                }
                Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_))) => {
                    warn!(tool = %call.name, error = %e, "Tool call rejected");
                    run.degraded_reasons
                        .push(format!("tool_rejected: {}: {e}", call.name));
                }
                Err(e) => {
                    return Err(PhaseFailure::pipeline(format!("tool {}: {e}", call.name)));
                }
            }
        }
        Ok(())
    }

    fn assemble_envelope(&self, run: &TurnRun) -> Result<ResponseEnvelope, PhaseFailure> {
        let enriched = require_enriched(&run.enriched)?;
        let classification = &enriched.classification;
        let pack = &enriched.pack;
        let acknowledged = classification.kind == TurnKind::Acknowledge;

        let tool_texts: Vec<String> = run
            .tool_outcomes
            .iter()
            .filter_map(|o| o.text.clone())
            .collect();
        let llm_text = run.reply.as_ref().map_or("", |r| r.text.as_str());
        let mut assistant_text = envelope::final_text(llm_text, &tool_texts);
        if assistant_text.is_empty() && acknowledged {
            assistant_text = self.settings.ack_fallback_text.clone();
        }

        let blocks: Vec<Block> = run
            .tool_outcomes
            .iter()
            .flat_map(|o| o.blocks.iter().cloned())
            .collect();

        let transition = envelope::stage_transition(enriched.stage, run.effects);
        let stage = StageIndicator {
            current: transition.map_or(enriched.stage, |t| t.to),
            confidence: enriched.confidence,
            transition,
        };

        let known_facts = render::canonical_fact_ids(&pack.zones.zone3);
        let science_ledger =
            ledger::build_ledger(&assistant_text, &known_facts, &run.advice.technique_ids);

        let lineage = Lineage {
            context_hash: pack.context_hash.clone(),
            lineage_hash: envelope::lineage_hash(&envelope::LineageInput {
                scenario_id: &run.request.scenario_id,
                stage: enriched.stage,
                intent: &classification.intent,
                route: classification.route,
                prompt_version: &pack.prompt_version,
                brief_hash: &pack.hashes.brief_hash,
                config_hash: &pack.hashes.config_hash,
                graph: run.request.context.graph.as_ref(),
                analysis: run.request.context.analysis_response.as_ref(),
                knowledge_version: self.settings.knowledge_version.as_deref(),
            }),
            knowledge_hash: envelope::knowledge_hash(self.settings.knowledge_version.as_deref()),
            prompt_version: pack.prompt_version.clone(),
        };

        let llm_path = match &run.reply {
            Some(reply) if reply.cached => "cached",
            Some(reply) => reply.path.as_str(),
            None => "none",
        };

        let mut extensions = BTreeMap::new();
        extensions.insert(
            "cache_boundary".to_string(),
            serde_json::to_value(&pack.cache_boundary).unwrap_or_default(),
        );
        if let Some(usage) = run.reply.as_ref().and_then(|r| r.usage) {
            extensions.insert(
                "usage".to_string(),
                serde_json::to_value(usage).unwrap_or_default(),
            );
        }

        let outcome = if run.degraded_reasons.is_empty() {
            Outcome::Ok
        } else {
            Outcome::Degraded
        };

        Ok(ResponseEnvelope {
            turn_id: run.request.client_turn_id.clone(),
            assistant_text,
            blocks,
            suggested_actions: envelope::merge_actions(
                run.model_actions.clone(),
                run.advice.rescue_actions.clone(),
            ),
            lineage,
            stage,
            science_ledger,
            progress: envelope::progress_marker(run.effects, acknowledged),
            observability: Observability {
                request_id: run.request_id.clone(),
                route: Some(classification.route),
                intent: Some(classification.intent.clone()),
                routing: classification.routing,
                llm_path: llm_path.to_string(),
                phase_timings_ms: BTreeMap::new(),
                context_tokens: pack.budget.total_tokens,
                within_budget: pack.budget.within_budget,
                overage_tokens: pack.budget.overage_tokens,
                cascade_steps: pack
                    .budget
                    .cascade_steps
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
                degraded_reasons: run.degraded_reasons.clone(),
                diagnostics: None,
                extensions,
            },
            outcome,
            error: None,
        })
    }

    fn failure_envelope(&self, run: &TurnRun, failure: PhaseFailure) -> ResponseEnvelope {
        let mut envelope = ResponseEnvelope::failure(
            &run.request.client_turn_id,
            failure.code,
            failure.safe_message(),
        );
        let obs = &mut envelope.observability;
        obs.request_id = run.request_id.clone();
        obs.phase_timings_ms = run.timings.clone();
        obs.degraded_reasons = run.degraded_reasons.clone();
        if let Some(c) = &run.classification {
            obs.route = Some(c.route);
            obs.intent = Some(c.intent.clone());
            obs.routing = c.routing;
        }
        if let Some(enriched) = &run.enriched {
            envelope.lineage.context_hash = enriched.pack.context_hash.clone();
            envelope.lineage.prompt_version = enriched.pack.prompt_version.clone();
            envelope.stage.current = enriched.stage;
            envelope.stage.confidence = enriched.confidence;
        }
        if !self.settings.production {
            envelope.observability.diagnostics = Some(failure.diagnostics);
        }
        envelope
    }
}

/// Deterministic per-scenario seed: the first 8 bytes of sha256(scenario id).
pub fn scenario_seed(scenario_id: &str) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(scenario_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
