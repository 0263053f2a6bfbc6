//! # decisionflow core
//!
//! Domain types, collaborator traits, and error definitions for the
//! decisionflow turn pipeline. This crate has **no framework
//! dependencies**: it defines the vocabulary that the context assembler,
//! the turn orchestrator, the providers, and the gateway all share.
//!
//! ## Layout
//!
//! - [`state`] is the plain Decision State snapshot (no behavior).
//! - [`message`] holds conversation turns and the provider wire message.
//! - [`envelope`] is the response envelope produced for every turn.
//! - [`provider`], [`tool`], and [`analysis`] are the seams to the outside
//!   world (LLM, side-effecting tools, analysis engine).

pub mod analysis;
pub mod envelope;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod request;
pub mod route;
pub mod state;
pub mod tool;

pub use analysis::AnalysisEngine;
pub use envelope::{
    ActionSource, Block, EnvelopeError, ErrorCode, Lineage, Observability, Outcome,
    ProgressMarker, ResponseEnvelope, RoutingMode, ScienceLedger, StageIndicator,
    StageTransition, SuggestedAction,
};
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationTurn, Message, MessageToolCall, Role, ToolOutputRecord, TurnRole};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use request::{ClarificationAnswer, SystemEvent, SystemEventKind, TurnContext, TurnRequest};
pub use route::{DecisionStage, Route};
pub use state::{
    AnalysisSummary, CausalEdge, Cited, DecisionState, Driver, FragileEdge, Framing,
    GraphSummary, RobustnessLevel, UserClaim, Winner,
};
pub use tool::{SideEffects, Tool, ToolCall, ToolContext, ToolOutcome, ToolRegistry};
