//! Budget manager and truncation cascade.
//!
//! Allocations are derived from the route profile: the effective budget is
//! `floor(total × safety_factor)`, zones 1 and 2 get their fixed shares, and
//! zone 3 gets the rest. When the rendered zone 3 does not fit, the cascade
//! removes content one step at a time in a fixed order:
//!
//! 1. shrink the conversation window, one turn per step
//! 2. drop the echoed selected-element ids
//! 3. drop sensitivity drivers, lowest sensitivity first
//! 4. drop fragile edges, last listed first
//! 5. drop the margin
//! 6. drop the winner
//!
//! Analysis records are removed whole, so a value never loses its fact id.

use crate::context::profile::RouteProfile;
use crate::context::render::Zone3Plan;
use crate::context::token;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAFETY_FACTOR: f64 = 0.9;

/// Token allocations per zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub total: usize,
    pub effective: usize,
    pub zone1: usize,
    pub zone2: usize,
    pub zone3: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetError {
    #[error("safety factor {0} must be in (0, 1]")]
    InvalidSafetyFactor(f64),

    #[error(
        "zone1 ({zone1}) + zone2 ({zone2}) exceed the effective budget ({effective}) for route {route}"
    )]
    NegativeZone3 {
        route: String,
        effective: usize,
        zone1: usize,
        zone2: usize,
    },
}

fn effective_budget(total: usize, safety_factor: f64) -> usize {
    (total as f64 * safety_factor).floor() as usize
}

/// Compute per-zone allocations for a route.
pub fn compute_budget(
    profile: &RouteProfile,
    safety_factor: f64,
) -> Result<BudgetAllocation, BudgetError> {
    if !(safety_factor > 0.0 && safety_factor <= 1.0) {
        return Err(BudgetError::InvalidSafetyFactor(safety_factor));
    }
    let effective = effective_budget(profile.total_tokens, safety_factor);
    let fixed = profile.zone1_tokens + profile.zone2_tokens;
    if fixed > effective {
        return Err(BudgetError::NegativeZone3 {
            route: profile.route.to_string(),
            effective,
            zone1: profile.zone1_tokens,
            zone2: profile.zone2_tokens,
        });
    }
    Ok(BudgetAllocation {
        total: profile.total_tokens,
        effective,
        zone1: profile.zone1_tokens,
        zone2: profile.zone2_tokens,
        zone3: effective - fixed,
    })
}

/// The maximally degraded allocation: zone 1 only.
pub fn degraded_allocation(profile: &RouteProfile, safety_factor: f64) -> BudgetAllocation {
    let factor = if safety_factor > 0.0 && safety_factor <= 1.0 {
        safety_factor
    } else {
        DEFAULT_SAFETY_FACTOR
    };
    let effective = effective_budget(profile.total_tokens, factor);
    BudgetAllocation {
        total: profile.total_tokens,
        effective,
        zone1: profile.zone1_tokens.min(effective),
        zone2: 0,
        zone3: 0,
    }
}

/// One size-reduction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    ShrinkWindow,
    DropSelectedElements,
    DropDriver,
    DropFragileEdge,
    DropMargin,
    DropWinner,
}

impl CascadeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CascadeStep::ShrinkWindow => "shrink_window",
            CascadeStep::DropSelectedElements => "drop_selected_elements",
            CascadeStep::DropDriver => "drop_driver",
            CascadeStep::DropFragileEdge => "drop_fragile_edge",
            CascadeStep::DropMargin => "drop_margin",
            CascadeStep::DropWinner => "drop_winner",
        }
    }
}

/// Apply the next cascade step to `plan`. Returns `None` once nothing is
/// left to remove.
///
/// `turn_count` and `has_selected` describe the request so that steps with
/// nothing to remove are skipped.
pub fn apply_next_step(
    plan: &mut Zone3Plan,
    turn_count: usize,
    has_selected: bool,
) -> Option<CascadeStep> {
    let visible_turns = plan.window.min(turn_count);
    if visible_turns > 0 {
        plan.window = visible_turns - 1;
        return Some(CascadeStep::ShrinkWindow);
    }
    if plan.echo_selected && has_selected {
        plan.echo_selected = false;
        return Some(CascadeStep::DropSelectedElements);
    }
    let analysis = plan.analysis.as_mut()?;
    if !analysis.drivers.is_empty() {
        let weakest = analysis
            .drivers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.sensitivity.total_cmp(&b.sensitivity))
            .map(|(i, _)| i)?;
        analysis.drivers.remove(weakest);
        return Some(CascadeStep::DropDriver);
    }
    if analysis.fragile_edges.pop().is_some() {
        return Some(CascadeStep::DropFragileEdge);
    }
    if analysis.margin.take().is_some() {
        return Some(CascadeStep::DropMargin);
    }
    if analysis.winner.take().is_some() {
        return Some(CascadeStep::DropWinner);
    }
    None
}

/// Result of running the cascade against a zone 3 allocation.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub zone3: String,
    pub plan: Zone3Plan,
    pub steps: Vec<CascadeStep>,
    pub fits: bool,
}

/// Render, and keep applying cascade steps until zone 3 fits `limit`
/// tokens or nothing more can be removed.
pub fn run_cascade<F>(
    mut plan: Zone3Plan,
    limit: usize,
    turn_count: usize,
    has_selected: bool,
    render: F,
) -> CascadeOutcome
where
    F: Fn(&Zone3Plan) -> String,
{
    let mut steps = Vec::new();
    let mut zone3 = render(&plan);
    while token::estimate_tokens(&zone3) > limit {
        match apply_next_step(&mut plan, turn_count, has_selected) {
            Some(step) => {
                steps.push(step);
                zone3 = render(&plan);
            }
            None => break,
        }
    }
    let fits = token::estimate_tokens(&zone3) <= limit;
    CascadeOutcome {
        zone3,
        plan,
        steps,
        fits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decisionflow_core::Route;
    use decisionflow_core::state::{AnalysisSummary, Cited, Driver, FragileEdge, Winner};

    fn analysis() -> AnalysisSummary {
        AnalysisSummary {
            winner: Some(Winner {
                option_id: "opt_a".into(),
                probability: 0.6,
                fact_id: Some("f_w".into()),
            }),
            margin: Some(Cited::new(0.1, Some("f_m".into()))),
            robustness: None,
            drivers: vec![
                Driver {
                    node_id: "d_high".into(),
                    sensitivity: 0.4,
                    fact_id: Some("f_d1".into()),
                },
                Driver {
                    node_id: "d_low".into(),
                    sensitivity: 0.1,
                    fact_id: Some("f_d2".into()),
                },
            ],
            fragile_edges: vec![
                FragileEdge {
                    edge_id: "e_first".into(),
                    fact_id: None,
                },
                FragileEdge {
                    edge_id: "e_last".into(),
                    fact_id: Some("f_e".into()),
                },
            ],
        }
    }

    #[test]
    fn chat_budget_uses_safety_factor() {
        let profile = RouteProfile::builtin(Route::Chat);
        let alloc = compute_budget(&profile, 0.9).unwrap();
        assert_eq!(alloc.effective, 7200);
        assert_eq!(alloc.zone3, 7200 - 600 - 900);
    }

    #[test]
    fn negative_zone3_is_an_error() {
        let mut profile = RouteProfile::builtin(Route::Chat);
        profile.total_tokens = 1000;
        let err = compute_budget(&profile, 0.9).unwrap_err();
        assert!(matches!(err, BudgetError::NegativeZone3 { .. }));

        let degraded = degraded_allocation(&profile, 0.9);
        assert_eq!(degraded.zone2, 0);
        assert_eq!(degraded.zone3, 0);
        assert_eq!(degraded.zone1, 600);
    }

    #[test]
    fn invalid_safety_factor_rejected() {
        let profile = RouteProfile::builtin(Route::Chat);
        assert!(compute_budget(&profile, 0.0).is_err());
        assert!(compute_budget(&profile, 1.5).is_err());
        assert_eq!(degraded_allocation(&profile, f64::NAN).effective, 7200);
    }

    #[test]
    fn cascade_order() {
        let mut plan = Zone3Plan {
            window: 2,
            echo_selected: true,
            analysis: Some(analysis()),
        };
        let mut steps = Vec::new();
        while let Some(step) = apply_next_step(&mut plan, 5, true) {
            steps.push(step);
        }
        use CascadeStep::*;
        assert_eq!(
            steps,
            vec![
                ShrinkWindow,
                ShrinkWindow,
                DropSelectedElements,
                DropDriver,
                DropDriver,
                DropFragileEdge,
                DropFragileEdge,
                DropMargin,
                DropWinner,
            ]
        );
    }

    #[test]
    fn lowest_sensitivity_driver_and_last_edge_go_first() {
        let mut plan = Zone3Plan {
            window: 0,
            echo_selected: false,
            analysis: Some(analysis()),
        };
        apply_next_step(&mut plan, 0, false);
        let a = plan.analysis.as_ref().unwrap();
        assert_eq!(a.drivers.len(), 1);
        assert_eq!(a.drivers[0].node_id, "d_high");

        apply_next_step(&mut plan, 0, false);
        apply_next_step(&mut plan, 0, false);
        let a = plan.analysis.as_ref().unwrap();
        assert_eq!(a.fragile_edges.len(), 1);
        assert_eq!(a.fragile_edges[0].edge_id, "e_first");
    }

    #[test]
    fn skips_steps_with_nothing_to_remove() {
        let mut plan = Zone3Plan {
            window: 6,
            echo_selected: true,
            analysis: None,
        };
        assert_eq!(apply_next_step(&mut plan, 0, false), None);
    }

    #[test]
    fn run_cascade_stops_when_it_fits() {
        let plan = Zone3Plan {
            window: 3,
            echo_selected: false,
            analysis: None,
        };
        // 40 tokens per visible turn
        let outcome = run_cascade(plan, 90, 3, false, |p| "x".repeat(160 * p.window));
        assert!(outcome.fits);
        assert_eq!(outcome.steps, vec![CascadeStep::ShrinkWindow]);
        assert_eq!(outcome.plan.window, 2);
    }

    #[test]
    fn run_cascade_reports_overflow() {
        let plan = Zone3Plan {
            window: 1,
            echo_selected: false,
            analysis: None,
        };
        let outcome = run_cascade(plan, 1, 1, false, |_| "y".repeat(100));
        assert!(!outcome.fits);
        assert_eq!(outcome.steps.len(), 1);
    }
}
