//! # Client crate: role-gated session over the governance service
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`identity`] | `AuthClient` lifecycle over an `IdentityProvider` (create, login, logout) |
//! | [`role`] | `resolve_role`: ask the service, adopt its answer, fall back to `Guest` |
//! | [`sync`] | `sync` and `SessionSnapshot`: role-scoped fetch, replaced as a whole |
//! | [`dispatch`] | `Command`, local role/state checks, `offered_commands`, result unwrapping |
//! | [`session`] | `Session`: the one controller tying the above together, with epochs and notifications |
//!
//! The service handle comes from an `api::ClientFactory`; tests use
//! `store::MemoryService`, the console can use either that or `api::AgentFactory`.

pub mod dispatch;
pub mod identity;
pub mod role;
pub mod session;
pub mod sync;

pub use dispatch::{offered_commands, Command, CourseAction, DispatchError, Receipt};
pub use identity::{AuthClient, AuthError, IdentityProvider, LoginOptions, StaticIdentityProvider};
pub use role::resolve_role;
pub use session::{FetchedRefresh, Notification, NotificationLevel, PendingRefresh, Session};
pub use sync::{SessionSnapshot, SyncError};
