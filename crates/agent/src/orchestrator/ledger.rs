//! Science ledger: which facts and techniques the answer relied on.

use crate::context::render;
use decisionflow_core::ScienceLedger;
use std::collections::BTreeSet;

/// Phrases that claim more certainty than a probabilistic model supports.
const OVERCLAIMING_PHRASES: &[&str] = &[
    "guaranteed",
    "guarantees",
    "proves that",
    "proven fact",
    "100% certain",
    "definitely will",
    "there is no risk",
    "cannot fail",
    "without any doubt",
];

/// Build the ledger for the final assistant text.
///
/// `known_facts` are the fact ids rendered in the canonical state; a citation
/// of anything else is a scope violation.
pub fn build_ledger(
    text: &str,
    known_facts: &BTreeSet<String>,
    techniques: &[String],
) -> ScienceLedger {
    let cited = render::cited_fact_ids(text);
    let claims_used = cited.intersection(known_facts).cloned().collect();
    let scope_violations = cited.difference(known_facts).cloned().collect();

    let lowered = text.to_lowercase();
    let phrasing_violations = OVERCLAIMING_PHRASES
        .iter()
        .filter(|p| lowered.contains(*p))
        .map(|p| p.to_string())
        .collect();

    ScienceLedger {
        claims_used,
        techniques_used: techniques.to_vec(),
        scope_violations,
        phrasing_violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> BTreeSet<String> {
        ["f_win", "f_margin"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn citations_split_into_used_and_violations() {
        let ledger = build_ledger(
            "A wins at 72.3% [fact:f_win] and B is close [fact:f_made_up].",
            &known(),
            &[],
        );
        assert_eq!(ledger.claims_used, vec!["f_win"]);
        assert_eq!(ledger.scope_violations, vec!["f_made_up"]);
        assert!(ledger.phrasing_violations.is_empty());
    }

    #[test]
    fn overclaiming_is_flagged() {
        let ledger = build_ledger("This Proves That A is best. Success is guaranteed.", &known(), &[]);
        assert_eq!(ledger.phrasing_violations, vec!["guaranteed", "proves that"]);
    }

    #[test]
    fn techniques_carried_through() {
        let ledger = build_ledger("ok", &known(), &["stuck_rescue".to_string()]);
        assert_eq!(ledger.techniques_used, vec!["stuck_rescue"]);
        assert!(ledger.claims_used.is_empty());
    }
}
