//! Deterministic specialists run in the `specialize` phase.
//!
//! Archetype, bias and readiness heuristics plug in through [`Specialist`].
//! The built-in [`StuckDetector`] watches for a user going in circles and
//! offers stage-specific rescue actions.

use decisionflow_core::message::{ConversationTurn, TurnRole};
use decisionflow_core::state::DecisionState;
use decisionflow_core::{DecisionStage, SuggestedAction};
use std::sync::Arc;

pub struct SpecialistInput<'a> {
    pub stage: DecisionStage,
    pub state: &'a DecisionState,
    pub turns: &'a [ConversationTurn],
    pub message: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialistAdvice {
    /// Technique ids that went into the LLM call.
    pub technique_ids: Vec<String>,
    /// System-authored notes appended to the prompt.
    pub advice: Vec<String>,
    pub stuck: bool,
    pub rescue_actions: Vec<SuggestedAction>,
}

impl SpecialistAdvice {
    pub fn merge(&mut self, other: SpecialistAdvice) {
        for id in other.technique_ids {
            if !self.technique_ids.contains(&id) {
                self.technique_ids.push(id);
            }
        }
        self.advice.extend(other.advice);
        self.stuck |= other.stuck;
        self.rescue_actions.extend(other.rescue_actions);
    }

    pub fn is_empty(&self) -> bool {
        self.technique_ids.is_empty() && self.advice.is_empty() && self.rescue_actions.is_empty()
    }
}

pub trait Specialist: Send + Sync {
    fn name(&self) -> &str;

    fn advise(&self, input: &SpecialistInput<'_>) -> SpecialistAdvice;
}

/// Run every specialist in order and merge their advice.
pub fn run_specialists(
    specialists: &[Arc<dyn Specialist>],
    input: &SpecialistInput<'_>,
) -> SpecialistAdvice {
    let mut merged = SpecialistAdvice::default();
    for specialist in specialists {
        let advice = specialist.advise(input);
        if !advice.is_empty() {
            tracing::debug!(specialist = specialist.name(), stuck = advice.stuck, "Specialist advised");
        }
        merged.merge(advice);
    }
    merged
}

// ── Stuck detection ───────────────────────────────────────────────────────

const UNCERTAINTY_MARKERS: &[&str] = &[
    "not sure",
    "unsure",
    "don't know",
    "dont know",
    "no idea",
    "idk",
    "i'm stuck",
    "im stuck",
    "confused",
    "what should i do",
];

pub const STUCK_TECHNIQUE: &str = "stuck_rescue";

/// Flags a user who has been uncertain for several turns or keeps repeating
/// the same message.
pub struct StuckDetector {
    threshold: usize,
}

impl StuckDetector {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    fn is_uncertain(text: &str) -> bool {
        let lowered = text.to_lowercase();
        UNCERTAINTY_MARKERS.iter().any(|m| lowered.contains(m))
    }

    fn normalized(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Consecutive uncertain user messages, counting back from the current one.
    fn uncertain_streak(input: &SpecialistInput<'_>) -> usize {
        std::iter::once(input.message)
            .chain(
                input
                    .turns
                    .iter()
                    .rev()
                    .filter(|t| t.role == TurnRole::User)
                    .map(|t| t.content.as_str()),
            )
            .take_while(|text| Self::is_uncertain(text))
            .count()
    }

    fn repeated(input: &SpecialistInput<'_>) -> bool {
        let current = Self::normalized(input.message);
        if current.is_empty() {
            return false;
        }
        input
            .turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .is_some_and(|t| Self::normalized(&t.content) == current)
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Specialist for StuckDetector {
    fn name(&self) -> &str {
        "stuck_detector"
    }

    fn advise(&self, input: &SpecialistInput<'_>) -> SpecialistAdvice {
        let streak = Self::uncertain_streak(input);
        let repeated = Self::repeated(input);
        if streak < self.threshold && !repeated {
            return SpecialistAdvice::default();
        }

        let note = if repeated {
            "The user repeated their last message. Answer differently and offer a concrete next step."
        } else {
            "The user has been uncertain for several turns. Narrow the choice to one small next step."
        };

        SpecialistAdvice {
            technique_ids: vec![STUCK_TECHNIQUE.to_string()],
            advice: vec![note.to_string()],
            stuck: true,
            rescue_actions: rescue_actions(input.stage),
        }
    }
}

pub fn rescue_actions(stage: DecisionStage) -> Vec<SuggestedAction> {
    let pairs: &[(&str, &str)] = match stage {
        DecisionStage::Frame => &[
            ("State the goal", "Help me state the one goal this decision should serve."),
            ("List the options", "Help me list the options I am choosing between."),
        ],
        DecisionStage::Ideate => &[
            ("Add an option", "Suggest one more option I have not considered."),
            ("Find key factors", "What factors most affect how well each option meets my goal?"),
        ],
        DecisionStage::EvaluatePre => &[
            ("Run the analysis", "Run the analysis on my current model."),
            ("Check the model", "Is anything important missing from my model?"),
        ],
        DecisionStage::EvaluatePost => &[
            ("Explain the result", "Explain in plain terms why the leading option wins."),
            ("What could change it", "Which assumption, if wrong, would change the result?"),
        ],
        DecisionStage::Decide => &[
            ("Write the brief", "Generate a decision brief I can share."),
            ("Test my confidence", "What would I need to believe to pick a different option?"),
        ],
        DecisionStage::Optimise => &[
            ("Review fragile links", "Which links in my model are most fragile?"),
            ("Plan a check-in", "What should I monitor after making this decision?"),
        ],
    };
    pairs
        .iter()
        .map(|(label, prompt)| SuggestedAction::rescue(*label, *prompt))
        .collect()
}
