//! # API crate: the remote governance service as seen by its clients
//!
//! This crate defines everything a client needs to talk to the course governance
//! service: the identity type calls are attributed to, the decoded domain models,
//! the wire codec, the service trait and the HTTP agent that implements it.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`principal`] | `Principal` (re-exported from `candid`), `Identity`, development principals |
//! | [`models`] | `Role`, `CourseStatus` and its transition graph, `Course`, `UserProfile`, `ProfileDraft`, `RoleAssignment` |
//! | [`wire`] | Tagged-record enums, optional-as-sequence fields, command results; encode/decode to and from [`models`] |
//! | [`service`] | `GovernanceService` (remote operations) and `ClientFactory` (identity-bound handles), `CallError` |
//! | [`agent`] | `HttpAgent` / `AgentFactory`, the JSON-over-HTTP implementation with trust bootstrap |
//! | [`settings`] | `Settings` loaded from defaults, `duniversity.toml` and `DUNIVERSITY_*` variables |
//!
//! ## Remote operations
//!
//! - **Roles**: `login_as_role`, `my_role`, `whoami`, `list_users`, `list_principals`, `assign_role`
//! - **Profiles**: `get_my_profile`, `create_or_update_my_profile`
//! - **Courses**: `list_courses`, `get_course_details`, `get_my_enrolled_courses`,
//!   `create_course`, `propose_course`, `vote_for_course`, `approve_course`,
//!   `reject_course`, `enroll_in_course`

pub mod agent;
pub mod models;
pub mod principal;
pub mod service;
pub mod settings;
pub mod wire;

pub use agent::{AgentFactory, HttpAgent};
pub use models::{Course, CourseId, CourseStatus, ProfileDraft, Role, RoleAssignment, UserProfile};
pub use principal::{random_principal, Identity, Principal};
pub use service::{CallError, ClientFactory, GovernanceService};
pub use settings::{Network, Settings, SettingsError};
pub use wire::WireError;
