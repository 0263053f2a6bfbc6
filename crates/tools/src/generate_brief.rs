//! Generate brief tool. Renders a markdown decision brief from the
//! canonical fields of the Decision State.
//!
//! The brief is deterministic: the same state always yields the same
//! markdown. Numbers carry their `[fact:ID]` citation when one exists.

use async_trait::async_trait;
use decisionflow_core::envelope::Block;
use decisionflow_core::error::ToolError;
use decisionflow_core::state::DecisionState;
use decisionflow_core::tool::{SideEffects, Tool, ToolContext, ToolOutcome};
use std::fmt::Write;

pub struct GenerateBriefTool;

fn cite(fact_id: Option<&str>) -> String {
    fact_id.map(|id| format!(" [fact:{id}]")).unwrap_or_default()
}

pub fn render_brief(state: &DecisionState) -> String {
    let mut md = String::from("# Decision brief\n");

    md.push_str("\n## Goal\n\n");
    match (&state.framing.goal, state.graph.as_ref().and_then(|g| g.goal_id.as_deref())) {
        (Some(goal), _) => {
            let _ = writeln!(md, "{goal}");
        }
        (None, Some(id)) => {
            let _ = writeln!(md, "Goal node `{id}`");
        }
        (None, None) => md.push_str("Not stated yet.\n"),
    }

    let options: Vec<&str> = match &state.graph {
        Some(g) if !g.option_ids.is_empty() => g.option_ids.iter().map(String::as_str).collect(),
        _ => state.framing.options.iter().map(String::as_str).collect(),
    };
    md.push_str("\n## Options\n\n");
    if options.is_empty() {
        md.push_str("None listed yet.\n");
    }
    for option in &options {
        let _ = writeln!(md, "- {option}");
    }

    if !state.framing.constraints.is_empty() {
        md.push_str("\n## Constraints\n\n");
        for c in &state.framing.constraints {
            let _ = writeln!(md, "- {c}");
        }
    }

    md.push_str("\n## Findings\n\n");
    match &state.analysis {
        Some(a) if !a.is_empty() => {
            if let Some(w) = &a.winner {
                let _ = writeln!(
                    md,
                    "- Leading option: `{}` with probability {:.2}{}",
                    w.option_id,
                    w.probability,
                    cite(w.fact_id.as_deref())
                );
            }
            if let Some(m) = &a.margin {
                let _ = writeln!(md, "- Margin over the runner-up: {:.2}{}", m.value, cite(m.fact_id.as_deref()));
            }
            if let Some(r) = a.robustness {
                let _ = writeln!(md, "- Robustness: {}", r.as_str());
            }
            if !a.drivers.is_empty() {
                md.push_str("\n### Key drivers\n\n");
                for d in &a.drivers {
                    let _ = writeln!(
                        md,
                        "- `{}` (sensitivity {:.2}){}",
                        d.node_id,
                        d.sensitivity,
                        cite(d.fact_id.as_deref())
                    );
                }
            }
            if !a.fragile_edges.is_empty() {
                md.push_str("\n### Fragile links\n\n");
                for e in &a.fragile_edges {
                    let _ = writeln!(md, "- `{}`{}", e.edge_id, cite(e.fact_id.as_deref()));
                }
            }
        }
        _ => md.push_str("The analysis has not been run yet.\n"),
    }

    if !state.unresolved_questions.is_empty() {
        md.push_str("\n## Open questions\n\n");
        for q in &state.unresolved_questions {
            let _ = writeln!(md, "- {q}");
        }
    }

    md
}

#[async_trait]
impl Tool for GenerateBriefTool {
    fn name(&self) -> &str {
        "generate_brief"
    }

    fn description(&self) -> &str {
        "Write a decision brief summarising the goal, options, analysis findings, and open questions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        let markdown = render_brief(&ctx.state);
        let text = if ctx.state.analysis.is_some() {
            "Your decision brief is ready."
        } else {
            "Your decision brief is ready. It will be more useful once the analysis has run."
        };

        Ok(ToolOutcome {
            success: true,
            text: Some(text.to_string()),
            blocks: vec![Block::Brief { markdown }],
            side_effects: SideEffects {
                brief_generated: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decisionflow_core::state::{
        AnalysisSummary, Cited, Driver, Framing, GraphSummary, RobustnessLevel, Winner,
    };

    fn state() -> DecisionState {
        DecisionState {
            graph: Some(GraphSummary {
                node_count: 4,
                edge_count: 3,
                goal_id: Some("goal".into()),
                option_ids: vec!["opt_a".into(), "opt_b".into()],
                edges: vec![],
            }),
            analysis: Some(AnalysisSummary {
                winner: Some(Winner {
                    option_id: "opt_a".into(),
                    probability: 0.62,
                    fact_id: Some("f_win".into()),
                }),
                margin: Some(Cited::new(0.08, Some("f_margin".into()))),
                robustness: Some(RobustnessLevel::Medium),
                drivers: vec![Driver {
                    node_id: "churn".into(),
                    sensitivity: 0.41,
                    fact_id: None,
                }],
                fragile_edges: vec![],
            }),
            framing: Framing {
                goal: Some("Grow revenue 20%".into()),
                constraints: vec!["No layoffs".into()],
                ..Default::default()
            },
            unresolved_questions: vec!["How fast do competitors react?".into()],
            ..Default::default()
        }
    }

    #[test]
    fn brief_cites_facts() {
        let md = render_brief(&state());
        assert!(md.starts_with("# Decision brief\n"));
        assert!(md.contains("Grow revenue 20%"));
        assert!(md.contains("- opt_b"));
        assert!(md.contains("probability 0.62 [fact:f_win]"));
        assert!(md.contains("0.08 [fact:f_margin]"));
        assert!(md.contains("`churn` (sensitivity 0.41)\n"));
        assert!(md.contains("## Open questions"));
    }

    #[test]
    fn brief_is_deterministic() {
        assert_eq!(render_brief(&state()), render_brief(&state()));
    }

    #[test]
    fn empty_state_brief() {
        let md = render_brief(&DecisionState::default());
        assert!(md.contains("Not stated yet."));
        assert!(md.contains("None listed yet."));
        assert!(md.contains("not been run yet"));
    }

    #[tokio::test]
    async fn tool_marks_brief_generated() {
        let ctx = ToolContext {
            state: state(),
            ..Default::default()
        };
        let outcome = GenerateBriefTool
            .execute(&ctx, serde_json::json!({}))
            .await
            .unwrap();
        assert!(outcome.side_effects.brief_generated);
        assert_eq!(outcome.text.as_deref(), Some("Your decision brief is ready."));
        assert!(matches!(outcome.blocks[0], Block::Brief { .. }));
    }
}
