//! LLM provider and analysis engine clients for decisionflow.
//!
//! All LLM providers implement `decisionflow_core::Provider`; the analysis
//! client implements `decisionflow_core::AnalysisEngine`. [`build_from_config`]
//! picks the provider named in configuration.

pub mod analysis;
pub mod openai_compat;
pub mod router;

pub use analysis::HttpAnalysisEngine;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_analysis_engine, build_from_config};
