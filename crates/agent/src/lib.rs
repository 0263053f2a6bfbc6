//! The decisionflow turn pipeline.
//!
//! A turn flows through two halves:
//!
//! 1. **Context assembly** ([`context`]) renders a bounded, three-zone
//!    prompt from trusted machine state and untrusted conversation text,
//!    enforces the token budget, and hashes everything that matters.
//! 2. **Orchestration** ([`orchestrator`]) classifies the turn, calls the
//!    assembler, invokes the LLM on the ack or full path, runs tools, and
//!    assembles the response envelope.
//!
//! Assembly is synchronous and pure. Only the orchestrator suspends or
//! touches shared state.

pub mod cache;
pub mod context;
pub mod orchestrator;

pub use cache::BoundedCache;
pub use context::{
    AssemblyRequest, BudgetReport, CacheBoundary, ContextAssembler, ContextHashes, ContextPack,
    ModelSettings,
};
pub use orchestrator::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use orchestrator::specialist::{Specialist, SpecialistAdvice, SpecialistInput, StuckDetector};
pub use orchestrator::{OrchestratorSettings, TurnOrchestrator};
