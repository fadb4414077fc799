//! # Data synchronization
//!
//! [`sync`] pulls everything a role is allowed to see and returns it as one
//! [`SessionSnapshot`]. Nothing is patched incrementally: a snapshot is either
//! complete for its role or not produced at all.
//!
//! | Role | Fetched |
//! |------|---------|
//! | every role | own profile, course collection |
//! | `Admin` | + user → role listing, principal listing |
//! | `Student` | + enrolled courses (empty on failure) |
//! | `Professor`, `Guest` | nothing more |

use api::wire::{self, Opt, WireError};
use api::{CallError, Course, CourseStatus, GovernanceService, Principal, Role, RoleAssignment, UserProfile};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("{method} failed: {source}")]
    Call {
        method: &'static str,
        #[source]
        source: CallError,
    },
    #[error("malformed {what} from service: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: WireError,
    },
}

fn call_failed(method: &'static str) -> impl FnOnce(CallError) -> SyncError {
    move |source| SyncError::Call { method, source }
}

fn malformed(what: &'static str) -> impl FnOnce(WireError) -> SyncError {
    move |source| SyncError::Decode { what, source }
}

/// Role-scoped view of the service held by a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Caller the snapshot was taken for; `None` when signed out.
    pub principal: Option<Principal>,
    pub role: Role,
    pub profile: Option<UserProfile>,
    pub courses: Vec<Course>,
    pub enrolled_courses: Vec<Course>,
    pub users: Vec<RoleAssignment>,
    pub principals: Vec<Principal>,
}

impl SessionSnapshot {
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Least-privileged view for a signed-in caller whose data could not be loaded.
    pub fn guest(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            ..Self::default()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.principal
            .as_ref()
            .is_some_and(|principal| *principal != Principal::anonymous())
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|course| course.id == id)
    }

    pub fn courses_with_status(&self, status: CourseStatus) -> impl Iterator<Item = &Course> {
        self.courses.iter().filter(move |course| course.status == status)
    }

    /// Courses students can currently vote on.
    pub fn open_for_voting(&self) -> impl Iterator<Item = &Course> {
        self.courses.iter().filter(|course| course.status.is_voteable())
    }

    pub fn approved_courses(&self) -> impl Iterator<Item = &Course> {
        self.courses_with_status(CourseStatus::Approved)
    }

    pub fn courses_owned_by<'a>(&'a self, professor: &'a Principal) -> impl Iterator<Item = &'a Course> {
        self.courses.iter().filter(move |course| course.is_owned_by(professor))
    }

    pub fn has_voted_for(&self, course_id: &str) -> bool {
        match (&self.principal, self.course(course_id)) {
            (Some(me), Some(course)) => course.has_voted(me),
            _ => false,
        }
    }

    pub fn is_enrolled_in(&self, course_id: &str) -> bool {
        if self.enrolled_courses.iter().any(|course| course.id == course_id) {
            return true;
        }
        match (&self.principal, self.course(course_id)) {
            (Some(me), Some(course)) => course.is_enrolled(me),
            _ => false,
        }
    }
}

/// Fetch the snapshot `role` is entitled to for `principal`.
pub async fn sync<C: GovernanceService>(
    client: &C,
    principal: Principal,
    role: Role,
) -> Result<SessionSnapshot, SyncError> {
    let profile = client
        .get_my_profile()
        .await
        .map_err(call_failed("get_my_profile"))?
        .into_option("profile")
        .map_err(malformed("profile"))?
        .map(wire::decode_profile)
        .transpose()
        .map_err(malformed("profile"))?;

    let courses = client
        .list_courses(Opt::none())
        .await
        .map_err(call_failed("list_courses"))?;
    let courses = wire::decode_courses(courses).map_err(malformed("course"))?;

    let mut snapshot = SessionSnapshot {
        principal: Some(principal),
        role,
        profile,
        courses,
        ..SessionSnapshot::default()
    };

    match role {
        Role::Admin => {
            let users = client
                .list_users()
                .await
                .map_err(call_failed("list_users"))?;
            snapshot.users = wire::decode_assignments(users);
            snapshot.principals = client
                .list_principals()
                .await
                .map_err(call_failed("list_principals"))?;
        }
        Role::Student => {
            snapshot.enrolled_courses = match client.get_my_enrolled_courses().await {
                Ok(courses) => wire::decode_courses(courses).unwrap_or_else(|err| {
                    tracing::warn!(%err, "malformed enrolled courses, showing none");
                    Vec::new()
                }),
                Err(err) => {
                    tracing::warn!(%err, "could not fetch enrolled courses, showing none");
                    Vec::new()
                }
            };
        }
        Role::Professor | Role::Guest => {}
    }

    tracing::debug!(
        %role,
        courses = snapshot.courses.len(),
        users = snapshot.users.len(),
        "snapshot synchronized"
    );
    Ok(snapshot)
}
