//! # Store crate: in-process governance service
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | [`Registry`], the authoritative role, profile and course rules |
//! | `memory` | [`MemoryService`] / [`MemoryConnection`], a shared registry behind the `api::GovernanceService` contract, with injectable failures and a call journal |
//!
//! Used by the client tests and by the console when no remote service is configured.

pub mod registry;

mod memory;
pub use memory::{CallRecord, MemoryConnection, MemoryService, JOURNAL_LIMIT};
pub use registry::{CommandError, Registry};
