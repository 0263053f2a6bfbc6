//! Context assembler. Composes the zones, enforces the budget, and
//! computes the content hashes.
//!
//! # Algorithm
//!
//! 1. Resolve the route profile and compute the budget. A budget error is
//!    logged and replaced by the degraded allocation.
//! 2. Render zones 1 and 2, then run the truncation cascade on zone 3.
//! 3. Hash each semantically distinct input and derive the context hash and
//!    the cache boundary keys.
//!
//! `assemble` never fails. Overflow and budget errors come back as an
//! [`Outcome::Degraded`] pack with the reason recorded.
//!
//! # Determinism
//!
//! Identical inputs produce byte-identical zones and hashes. Nothing here
//! reads the clock or a random source.

use crate::cache::BoundedCache;
use crate::context::budget::{self, BudgetAllocation, CascadeStep};
use crate::context::canonical;
use crate::context::profile::RouteProfile;
use crate::context::render::{self, RenderInput, Zone3Plan, Zones};
use crate::context::token;
use decisionflow_config::ContextConfig;
use decisionflow_core::message::ConversationTurn;
use decisionflow_core::state::DecisionState;
use decisionflow_core::{ClarificationAnswer, DecisionStage, Outcome, Route};
use serde::{Deserialize, Serialize};

// ── Types ─────────────────────────────────────────────────────────────────

/// Model-side settings folded into the config hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Any further request configuration. Key order is irrelevant.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// All inputs for one assembly.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRequest<'a> {
    pub prompt_version: &'a str,
    pub route: Route,
    pub stage: DecisionStage,
    pub state: &'a DecisionState,
    pub turns: &'a [ConversationTurn],
    pub current_message: &'a str,
    pub selected_elements: &'a [String],
    pub clarification_answers: &'a [ClarificationAnswer],
    pub model: &'a ModelSettings,
    pub seed_graph: Option<&'a serde_json::Value>,
    pub retrieval: &'a [serde_json::Value],
}

/// One hash per semantically distinct input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHashes {
    /// The current user message.
    pub brief_hash: String,
    /// Zone 1 and zone 2 text plus prompt version.
    pub prompt_hash: String,
    pub config_hash: String,
    pub clarification_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_graph_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_hash: Option<String>,
}

/// Keys a provider-side prompt cache can use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBoundary {
    /// Prompt content and config only.
    pub cache_prefix_key: String,
    /// Brief and seed graph.
    pub dynamic_suffix_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub allocation: BudgetAllocation,
    pub zone1_tokens: usize,
    pub zone2_tokens: usize,
    pub zone3_tokens: usize,
    pub total_tokens: usize,
    pub within_budget: bool,
    pub overage_tokens: usize,
    pub cascade_steps: Vec<CascadeStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// The assembler's output. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    pub prompt_version: String,
    pub route: Route,
    pub stage: DecisionStage,
    pub zones: Zones,
    pub hashes: ContextHashes,
    pub context_hash: String,
    pub cache_boundary: CacheBoundary,
    pub budget: BudgetReport,
    pub outcome: Outcome,
}

impl ContextPack {
    /// The zones joined as one system prompt.
    pub fn system_prompt(&self) -> String {
        format!(
            "{}\n\n{}\n\n{}",
            self.zones.zone1, self.zones.zone2, self.zones.zone3
        )
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    config: ContextConfig,
    packs: Option<BoundedCache<ContextPack>>,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            packs: None,
        }
    }

    /// Keep assembled packs in a bounded cache keyed by context hash.
    pub fn with_pack_cache(mut self, capacity: usize) -> Self {
        self.packs = Some(BoundedCache::new(capacity));
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn profile(&self, route: Route) -> RouteProfile {
        RouteProfile::resolve(route, &self.config)
    }

    /// A previously assembled pack, by context hash.
    pub fn cached_pack(&self, context_hash: &str) -> Option<ContextPack> {
        self.packs.as_ref()?.get(context_hash)
    }

    /// Test reset hook for the pack cache.
    pub fn clear_cache(&self) {
        if let Some(packs) = &self.packs {
            packs.clear();
        }
    }

    pub fn assemble(&self, req: &AssemblyRequest<'_>) -> ContextPack {
        let profile = self.profile(req.route);
        let mut degraded_reason = None;

        let allocation = match budget::compute_budget(&profile, self.config.safety_factor) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(route = %req.route, error = %e, "Budget allocation failed, using degraded allocation");
                degraded_reason = Some(e.to_string());
                budget::degraded_allocation(&profile, self.config.safety_factor)
            }
        };

        let input = RenderInput {
            prompt_version: req.prompt_version,
            profile: &profile,
            stage: req.stage,
            state: req.state,
            turns: req.turns,
            current_message: req.current_message,
            selected_elements: req.selected_elements,
        };

        let zone1 = render::render_zone1(req.prompt_version);
        let zone2 = render::render_zone2(req.route, req.stage);
        let cascade = budget::run_cascade(
            Zone3Plan::from_profile(&profile, req.state),
            allocation.zone3,
            req.turns.len(),
            !req.selected_elements.is_empty(),
            |plan| render::render_zone3(&input, plan),
        );

        let zones = Zones {
            zone1,
            zone2,
            zone3: cascade.zone3,
        };
        let budget = budget_report(&zones, allocation, cascade.steps, degraded_reason);
        if !budget.within_budget {
            tracing::warn!(
                route = %req.route,
                overage_tokens = budget.overage_tokens,
                cascade_steps = budget.cascade_steps.len(),
                "Context exceeds budget after full cascade"
            );
        }

        let hashes = compute_hashes(req, &zones);
        let context_hash = canonical::hash_parts(&[
            "context",
            &zones.zone1,
            &zones.zone2,
            &zones.zone3,
            req.route.as_str(),
            req.stage.as_str(),
            req.prompt_version,
            &hashes.config_hash,
            &hashes.clarification_hash,
            hashes.seed_graph_hash.as_deref().unwrap_or(""),
            hashes.retrieval_hash.as_deref().unwrap_or(""),
        ]);
        let cache_boundary = CacheBoundary {
            cache_prefix_key: canonical::hash_parts(&[
                "prefix",
                &hashes.prompt_hash,
                &hashes.config_hash,
            ]),
            dynamic_suffix_key: canonical::hash_parts(&[
                "suffix",
                &hashes.brief_hash,
                hashes.seed_graph_hash.as_deref().unwrap_or(""),
            ]),
        };

        let outcome = if budget.within_budget && budget.degraded_reason.is_none() {
            Outcome::Ok
        } else {
            Outcome::Degraded
        };

        let pack = ContextPack {
            prompt_version: req.prompt_version.to_string(),
            route: req.route,
            stage: req.stage,
            zones,
            hashes,
            context_hash,
            cache_boundary,
            budget,
            outcome,
        };

        tracing::debug!(
            route = %pack.route,
            context_hash = %pack.context_hash,
            total_tokens = pack.budget.total_tokens,
            "Context assembled"
        );

        if let Some(packs) = &self.packs {
            packs.insert(pack.context_hash.clone(), pack.clone());
        }
        pack
    }
}

fn budget_report(
    zones: &Zones,
    allocation: BudgetAllocation,
    cascade_steps: Vec<CascadeStep>,
    degraded_reason: Option<String>,
) -> BudgetReport {
    let zone1_tokens = token::estimate_tokens(&zones.zone1);
    let zone2_tokens = token::estimate_tokens(&zones.zone2);
    let zone3_tokens = token::estimate_tokens(&zones.zone3);
    let overage_tokens = zone1_tokens.saturating_sub(allocation.zone1)
        + zone2_tokens.saturating_sub(allocation.zone2)
        + zone3_tokens.saturating_sub(allocation.zone3);
    BudgetReport {
        allocation,
        zone1_tokens,
        zone2_tokens,
        zone3_tokens,
        total_tokens: zone1_tokens + zone2_tokens + zone3_tokens,
        within_budget: overage_tokens == 0,
        overage_tokens,
        cascade_steps,
        degraded_reason,
    }
}

fn compute_hashes(req: &AssemblyRequest<'_>, zones: &Zones) -> ContextHashes {
    ContextHashes {
        brief_hash: canonical::hash_parts(&["brief", req.current_message]),
        prompt_hash: canonical::hash_parts(&[
            "prompt",
            req.prompt_version,
            &zones.zone1,
            &zones.zone2,
        ]),
        config_hash: canonical::hash_serializable(req.model),
        clarification_hash: canonical::hash_clarifications(req.clarification_answers),
        seed_graph_hash: req.seed_graph.map(canonical::hash_value),
        retrieval_hash: (!req.retrieval.is_empty())
            .then(|| canonical::hash_serializable(req.retrieval)),
    }
}
