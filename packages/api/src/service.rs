//! # Remote service surface
//!
//! [`GovernanceService`] is the set of remote operations a client consumes. Every
//! method is one request/response unit bound to the identity the handle was built
//! for; there is no retry at this layer. Arguments and results are wire values from
//! [`crate::wire`] so that implementations (the HTTP [`crate::agent::HttpAgent`], the
//! in-process `store::MemoryService`) share one contract.
//!
//! [`ClientFactory`] builds such a handle for an [`Identity`]. A handle is never
//! re-targeted: when the identity changes, a new one is made.

use std::future::Future;

use thiserror::Error;

use crate::principal::{Identity, Principal};
use crate::wire::{Opt, Tagged, WireCourse, WireProfile, WireResult};

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The request did not complete (connection, timeout, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),
    /// The service refused the call outright (e.g. an authorization trap).
    #[error("call rejected ({code}): {message}")]
    Rejected { code: u32, message: String },
    /// The reply did not have the expected shape.
    #[error("malformed reply: {0}")]
    Decode(String),
    /// Trust material could not be obtained or is missing.
    #[error("trust bootstrap failed: {0}")]
    TrustBootstrap(String),
}

/// Reject code used when the service traps on a failed precondition.
pub const REJECT_CANISTER_ERROR: u32 = 5;

/// Remote operations of the governance service, called as the bound identity.
pub trait GovernanceService {
    fn login_as_role(
        &self,
        requested: Tagged,
    ) -> impl Future<Output = Result<Tagged, CallError>>;
    fn my_role(&self) -> impl Future<Output = Result<Tagged, CallError>>;
    fn whoami(&self) -> impl Future<Output = Result<Principal, CallError>>;

    fn get_my_profile(&self) -> impl Future<Output = Result<Opt<WireProfile>, CallError>>;
    fn create_or_update_my_profile(
        &self,
        profile: WireProfile,
    ) -> impl Future<Output = Result<(), CallError>>;

    fn list_courses(
        &self,
        filter: Opt<Tagged>,
    ) -> impl Future<Output = Result<Vec<WireCourse>, CallError>>;
    fn get_course_details(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<Opt<WireCourse>, CallError>>;
    fn get_my_enrolled_courses(
        &self,
    ) -> impl Future<Output = Result<Vec<WireCourse>, CallError>>;

    fn create_course(
        &self,
        title: String,
        description: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;
    fn propose_course(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;
    fn vote_for_course(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;
    fn approve_course(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;
    fn reject_course(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;
    fn enroll_in_course(
        &self,
        course_id: String,
    ) -> impl Future<Output = Result<WireResult<WireCourse>, CallError>>;

    fn list_users(&self) -> impl Future<Output = Result<Vec<(Principal, Tagged)>, CallError>>;
    fn list_principals(&self) -> impl Future<Output = Result<Vec<Principal>, CallError>>;
    fn assign_role(
        &self,
        user: Principal,
        role: Tagged,
    ) -> impl Future<Output = Result<(), CallError>>;
}

/// Builds service handles bound to one identity.
pub trait ClientFactory {
    type Client: GovernanceService + Clone;

    fn make_client(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Self::Client, CallError>>;
}
