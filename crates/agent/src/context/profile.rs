//! Route profiles: what each route includes and how many tokens it gets.

use decisionflow_config::{ContextConfig, RouteProfileOverride};
use decisionflow_core::Route;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    pub route: Route,
    /// Render the full causal-edge digest, not only counts and ids.
    pub include_full_graph: bool,
    pub include_graph_summary: bool,
    pub include_analysis_summary: bool,
    /// Sliding conversation window size.
    pub max_turns: usize,
    pub echo_selected_elements: bool,
    /// Total token budget before the safety factor.
    pub total_tokens: usize,
    pub zone1_tokens: usize,
    pub zone2_tokens: usize,
}

impl RouteProfile {
    /// The built-in profile for a route.
    pub fn builtin(route: Route) -> Self {
        let base = Self {
            route,
            include_full_graph: false,
            include_graph_summary: true,
            include_analysis_summary: true,
            max_turns: 6,
            echo_selected_elements: false,
            total_tokens: 8000,
            zone1_tokens: 600,
            zone2_tokens: 900,
        };
        match route {
            Route::Chat => base,
            Route::DraftGraph => Self {
                include_analysis_summary: false,
                max_turns: 4,
                total_tokens: 12_000,
                zone2_tokens: 1400,
                ..base
            },
            Route::EditGraph => Self {
                include_full_graph: true,
                echo_selected_elements: true,
                total_tokens: 10_000,
                ..base
            },
            Route::ExplainResults => Self {
                echo_selected_elements: true,
                ..base
            },
            Route::GenerateBrief => Self {
                include_full_graph: true,
                max_turns: 2,
                total_tokens: 10_000,
                ..base
            },
        }
    }

    /// The built-in profile with any configured override applied.
    pub fn resolve(route: Route, config: &ContextConfig) -> Self {
        let mut profile = Self::builtin(route);
        if let Some(ov) = config.route_override(route) {
            profile.apply_override(ov);
        }
        profile
    }

    pub fn apply_override(&mut self, ov: &RouteProfileOverride) {
        if let Some(v) = ov.max_turns {
            self.max_turns = v;
        }
        if let Some(v) = ov.total_tokens {
            self.total_tokens = v;
        }
        if let Some(v) = ov.zone1_tokens {
            self.zone1_tokens = v;
        }
        if let Some(v) = ov.zone2_tokens {
            self.zone2_tokens = v;
        }
        if let Some(v) = ov.echo_selected_elements {
            self.echo_selected_elements = v;
        }
    }
}
