//! Built-in turn tools for decisionflow.
//!
//! Tools act on the client's decision graph: drafting a new one, editing
//! the current one, running the analysis over it, and writing a brief.
//! Each reports the side effects it caused so the orchestrator can pick
//! the progress marker and any stage transition.

pub mod draft_graph;
pub mod edit_graph;
pub mod generate_brief;
pub mod graph;
pub mod run_analysis;

use decisionflow_core::AnalysisEngine;
use decisionflow_core::tool::ToolRegistry;
use std::sync::Arc;

pub use draft_graph::DraftGraphTool;
pub use edit_graph::{EditGraphTool, EditOp};
pub use generate_brief::GenerateBriefTool;
pub use graph::Graph;
pub use run_analysis::RunAnalysisTool;

/// Create a registry with all built-in tools.
///
/// `run_analysis` is always registered; without an engine it reports
/// itself as not configured when called.
pub fn default_registry(engine: Option<Arc<dyn AnalysisEngine>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(DraftGraphTool));
    registry.register(Box::new(EditGraphTool));
    registry.register(Box::new(RunAnalysisTool::new(engine)));
    registry.register(Box::new(GenerateBriefTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_tools_in_name_order() {
        let registry = default_registry(None);
        assert_eq!(
            registry.names(),
            vec!["draft_graph", "edit_graph", "generate_brief", "run_analysis"]
        );
        assert_eq!(registry.definitions().len(), 4);
    }
}
