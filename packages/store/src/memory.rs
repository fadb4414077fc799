use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use api::service::REJECT_CANISTER_ERROR;
use api::wire::{self, Opt, Tagged, WireCourse, WireProfile, WireResult};
use api::{CallError, ClientFactory, Course, GovernanceService, Identity, Principal};
use chrono::Utc;

use crate::registry::{CommandError, Registry};

/// Calls kept in the journal; older entries are dropped first.
pub const JOURNAL_LIMIT: usize = 1024;

/// One call as observed by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub caller: Principal,
    pub method: &'static str,
}

#[derive(Debug)]
struct Inner {
    registry: Registry,
    journal: VecDeque<CallRecord>,
    failures: HashMap<&'static str, CallError>,
}

/// In-process governance service for tests and offline use.
///
/// Every [`MemoryConnection`] made from the same service shares one [`Registry`].
#[derive(Clone, Debug)]
pub struct MemoryService {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryService {
    pub fn new(deployer: Principal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                registry: Registry::new(deployer),
                journal: VecDeque::new(),
                failures: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A handle that calls as `identity`.
    pub fn connect(&self, identity: &Identity) -> MemoryConnection {
        MemoryConnection {
            service: self.clone(),
            caller: identity.principal().clone(),
        }
    }

    /// Make every later call to `method` fail with `error` until cleared.
    pub fn fail_method(&self, method: &'static str, error: CallError) {
        self.lock().failures.insert(method, error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// The most recent calls received, oldest first, at most [`JOURNAL_LIMIT`].
    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().journal.iter().cloned().collect()
    }

    pub fn calls_by(&self, caller: &Principal) -> Vec<&'static str> {
        self.lock()
            .journal
            .iter()
            .filter(|record| &record.caller == caller)
            .map(|record| record.method)
            .collect()
    }

    /// Direct access to the rules engine, bypassing the call journal.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.lock().registry)
    }
}

impl ClientFactory for MemoryService {
    type Client = MemoryConnection;

    async fn make_client(&self, identity: &Identity) -> Result<MemoryConnection, CallError> {
        Ok(self.connect(identity))
    }
}

/// A [`GovernanceService`] handle bound to one caller of a [`MemoryService`].
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    service: MemoryService,
    caller: Principal,
}

fn trap(message: impl Into<String>) -> CallError {
    CallError::Rejected {
        code: REJECT_CANISTER_ERROR,
        message: message.into(),
    }
}

fn into_call_error(error: CommandError) -> CallError {
    trap(error.to_string())
}

/// Split a rules outcome into a rejected call or a command result.
fn command_result(outcome: Result<Course, CommandError>) -> Result<WireResult<WireCourse>, CallError> {
    match outcome {
        Ok(course) => Ok(WireResult::Ok(wire::encode_course(&course))),
        Err(CommandError::Rejected(message)) => Ok(WireResult::Err(message)),
        Err(trapped @ CommandError::Trap(_)) => Err(into_call_error(trapped)),
    }
}

fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

impl MemoryConnection {
    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    /// Record the call and apply any injected failure before touching the registry.
    fn enter(&self, method: &'static str) -> Result<MutexGuard<'_, Inner>, CallError> {
        let mut inner = self.service.lock();
        if inner.journal.len() == JOURNAL_LIMIT {
            inner.journal.pop_front();
        }
        inner.journal.push_back(CallRecord {
            caller: self.caller.clone(),
            method,
        });
        if let Some(error) = inner.failures.get(method) {
            tracing::debug!(method, caller = %self.caller, "injected failure");
            return Err(error.clone());
        }
        Ok(inner)
    }
}

impl GovernanceService for MemoryConnection {
    async fn login_as_role(&self, requested: Tagged) -> Result<Tagged, CallError> {
        let mut inner = self.enter("login_as_role")?;
        let requested = wire::decode_role(&requested).map_err(|e| trap(e.to_string()))?;
        let role = inner
            .registry
            .login_as_role(&self.caller, requested)
            .map_err(into_call_error)?;
        Ok(wire::encode_role(role))
    }

    async fn my_role(&self) -> Result<Tagged, CallError> {
        let inner = self.enter("my_role")?;
        Ok(wire::encode_role(inner.registry.my_role(&self.caller)))
    }

    async fn whoami(&self) -> Result<Principal, CallError> {
        let _inner = self.enter("whoami")?;
        Ok(self.caller.clone())
    }

    async fn get_my_profile(&self) -> Result<Opt<WireProfile>, CallError> {
        let inner = self.enter("get_my_profile")?;
        Ok(inner
            .registry
            .profile(&self.caller)
            .as_ref()
            .map(wire::encode_stored_profile)
            .into())
    }

    async fn create_or_update_my_profile(&self, profile: WireProfile) -> Result<(), CallError> {
        let mut inner = self.enter("create_or_update_my_profile")?;
        let profile = wire::decode_profile(profile).map_err(|e| trap(e.to_string()))?;
        inner
            .registry
            .save_profile(&self.caller, profile)
            .map_err(into_call_error)
    }

    async fn list_courses(&self, filter: Opt<Tagged>) -> Result<Vec<WireCourse>, CallError> {
        let inner = self.enter("list_courses")?;
        let filter = filter
            .into_option("status_filter")
            .and_then(|status| status.as_ref().map(wire::decode_status).transpose())
            .map_err(|e| trap(e.to_string()))?;
        Ok(inner
            .registry
            .list_courses(&self.caller, filter)
            .iter()
            .map(wire::encode_course)
            .collect())
    }

    async fn get_course_details(&self, course_id: String) -> Result<Opt<WireCourse>, CallError> {
        let inner = self.enter("get_course_details")?;
        Ok(inner
            .registry
            .course(&course_id)
            .as_ref()
            .map(wire::encode_course)
            .into())
    }

    async fn get_my_enrolled_courses(&self) -> Result<Vec<WireCourse>, CallError> {
        let inner = self.enter("get_my_enrolled_courses")?;
        let courses = inner
            .registry
            .enrolled_courses(&self.caller)
            .map_err(into_call_error)?;
        Ok(courses.iter().map(wire::encode_course).collect())
    }

    async fn create_course(
        &self,
        title: String,
        description: String,
    ) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("create_course")?;
        command_result(
            inner
                .registry
                .create_course(&self.caller, &title, &description, now_nanos()),
        )
    }

    async fn propose_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("propose_course")?;
        command_result(inner.registry.propose_course(&self.caller, &course_id))
    }

    async fn vote_for_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("vote_for_course")?;
        command_result(inner.registry.vote_for_course(&self.caller, &course_id))
    }

    async fn approve_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("approve_course")?;
        command_result(inner.registry.approve_course(&self.caller, &course_id))
    }

    async fn reject_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("reject_course")?;
        command_result(inner.registry.reject_course(&self.caller, &course_id))
    }

    async fn enroll_in_course(&self, course_id: String) -> Result<WireResult<WireCourse>, CallError> {
        let mut inner = self.enter("enroll_in_course")?;
        command_result(inner.registry.enroll_in_course(&self.caller, &course_id))
    }

    async fn list_users(&self) -> Result<Vec<(Principal, Tagged)>, CallError> {
        let inner = self.enter("list_users")?;
        let users = inner
            .registry
            .list_users(&self.caller)
            .map_err(into_call_error)?;
        Ok(users
            .into_iter()
            .map(|assignment| (assignment.principal, wire::encode_role(assignment.role)))
            .collect())
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, CallError> {
        let inner = self.enter("list_principals")?;
        Ok(inner.registry.list_principals())
    }

    async fn assign_role(&self, user: Principal, role: Tagged) -> Result<(), CallError> {
        let mut inner = self.enter("assign_role")?;
        let role = wire::decode_role(&role).map_err(|e| trap(e.to_string()))?;
        inner
            .registry
            .assign_role(&self.caller, &user, role)
            .map_err(into_call_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{CourseStatus, Role};

    fn identity(n: u8) -> Identity {
        Identity::new(Principal::from_slice(&[n; 10]), None)
    }

    #[tokio::test]
    async fn test_connections_share_one_registry() {
        let admin = identity(1);
        let service = MemoryService::new(admin.principal().clone());
        let professor = service.connect(&identity(2));
        let student = service.connect(&identity(3));

        professor
            .login_as_role(wire::encode_role(Role::Professor))
            .await
            .unwrap();
        student
            .login_as_role(wire::encode_role(Role::Student))
            .await
            .unwrap();

        let created = professor
            .create_course("Compilers".into(), "Parsing and codegen".into())
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(created.id, "course-1");
        assert_eq!(wire::decode_status(&created.status).unwrap(), CourseStatus::Draft);

        // Drafts are invisible to students.
        assert!(student.list_courses(Opt::none()).await.unwrap().is_empty());
        professor.propose_course(created.id.clone()).await.unwrap();
        assert_eq!(student.list_courses(Opt::none()).await.unwrap().len(), 1);

        let admin_conn = service.connect(&admin);
        let users = admin_conn.list_users().await.unwrap();
        assert_eq!(users.len(), 3);
    }

    #[tokio::test]
    async fn test_traps_become_rejected_calls() {
        let service = MemoryService::new(identity(1).principal().clone());
        let student = service.connect(&identity(3));
        student
            .login_as_role(wire::encode_role(Role::Student))
            .await
            .unwrap();

        let err = student
            .create_course("A".into(), "B".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Rejected { code: REJECT_CANISTER_ERROR, .. }
        ));

        let anonymous = service.connect(&Identity::anonymous());
        assert!(anonymous
            .login_as_role(wire::encode_role(Role::Student))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_business_rule_failures_are_command_errors() {
        let service = MemoryService::new(identity(1).principal().clone());
        let student = service.connect(&identity(3));
        student
            .login_as_role(wire::encode_role(Role::Student))
            .await
            .unwrap();

        let outcome = student.vote_for_course("course-404".into()).await.unwrap();
        assert_eq!(outcome, WireResult::Err("Course not found.".into()));
    }

    #[tokio::test]
    async fn test_injected_failures_and_journal() {
        let service = MemoryService::new(identity(1).principal().clone());
        let conn = service.connect(&identity(4));
        service.fail_method("my_role", CallError::Transport("connection reset".into()));

        assert_eq!(
            conn.my_role().await.unwrap_err(),
            CallError::Transport("connection reset".into())
        );
        assert_eq!(conn.whoami().await.unwrap(), *identity(4).principal());

        service.clear_failures();
        let role = conn.my_role().await.unwrap();
        assert_eq!(wire::decode_role(&role).unwrap(), Role::Guest);

        assert_eq!(
            service.calls_by(identity(4).principal()),
            vec!["my_role", "whoami", "my_role"]
        );
        assert_eq!(service.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_journal_keeps_only_recent_calls() {
        let service = MemoryService::new(identity(1).principal().clone());
        let conn = service.connect(&identity(4));
        conn.whoami().await.unwrap();
        for _ in 0..JOURNAL_LIMIT {
            conn.my_role().await.unwrap();
        }

        let calls = service.calls();
        assert_eq!(calls.len(), JOURNAL_LIMIT);
        assert!(calls.iter().all(|record| record.method == "my_role"));
    }

    #[tokio::test]
    async fn test_course_details_by_id() {
        let service = MemoryService::new(identity(1).principal().clone());
        let professor = service.connect(&identity(2));
        professor
            .login_as_role(wire::encode_role(Role::Professor))
            .await
            .unwrap();
        let created = professor
            .create_course("Networks".into(), "Packets".into())
            .await
            .unwrap()
            .into_result()
            .unwrap();

        let found = professor
            .get_course_details(created.id.clone())
            .await
            .unwrap()
            .into_option("course")
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "Networks");
        assert_eq!(found.professor_id, *identity(2).principal());

        let missing = professor
            .get_course_details("course-404".into())
            .await
            .unwrap();
        assert!(missing.0.is_empty());
    }

    #[tokio::test]
    async fn test_profile_roundtrip_through_service() {
        let service = MemoryService::new(identity(1).principal().clone());
        let me = identity(5);
        let conn = service.make_client(&me).await.unwrap();
        conn.login_as_role(wire::encode_role(Role::Student))
            .await
            .unwrap();

        assert!(conn.get_my_profile().await.unwrap().0.is_empty());
        let draft = api::ProfileDraft::new("Grace").with_bio("  ");
        conn.create_or_update_my_profile(wire::encode_profile(&draft, me.principal()))
            .await
            .unwrap();

        let stored = conn
            .get_my_profile()
            .await
            .unwrap()
            .into_option("profile")
            .unwrap()
            .unwrap();
        let profile = wire::decode_profile(stored).unwrap();
        assert_eq!(profile.name, "Grace");
        assert_eq!(profile.bio, None);
        assert_eq!(profile.owner, *me.principal());
    }
}
