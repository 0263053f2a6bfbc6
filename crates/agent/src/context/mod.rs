//! Context assembly: three zones under a hard token budget.
//!
//! | Module | Role |
//! |--------|------|
//! | [`profile`] | Route profiles and configured overrides |
//! | [`render`] | Zone renderer, untrusted wrapping, canonical state |
//! | [`budget`] | Per-zone allocations and the truncation cascade |
//! | [`canonical`] | Canonical JSON and hashing |
//! | [`assembler`] | Composes the above into a [`ContextPack`] |

pub mod assembler;
pub mod budget;
pub mod canonical;
pub mod profile;
pub mod render;
pub mod token;

pub use assembler::{
    AssemblyRequest, BudgetReport, CacheBoundary, ContextAssembler, ContextHashes, ContextPack,
    ModelSettings,
};
pub use budget::{BudgetAllocation, BudgetError, CascadeStep};
pub use profile::RouteProfile;
pub use render::Zones;
