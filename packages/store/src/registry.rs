//! # Registry: the authoritative governance rules
//!
//! [`Registry`] owns roles, profiles, courses and enrollments and enforces every rule
//! the service applies, independently of what a client believes. Each operation takes
//! the caller explicitly; nothing is read from ambient state.
//!
//! ## Failure modes
//!
//! | Variant | Meaning | Surfaces to a client as |
//! |---------|---------|-------------------------|
//! | [`CommandError::Trap`] | The caller may not invoke the operation at all (anonymous, wrong role). | a rejected call |
//! | [`CommandError::Rejected`] | The operation ran but a business rule refused it (wrong state, not owner, duplicate vote). | an `Err` command result |
//!
//! ## Visibility of courses
//!
//! | Status | Visible to |
//! |--------|-----------|
//! | `Draft` | admins, the owning professor |
//! | `Proposed`, `Voting` | admins, students, the owning professor |
//! | `Approved` | admins, students, professors |
//! | `Rejected`, `Archived` | admins, the owning professor |

use std::collections::{BTreeMap, BTreeSet};

use api::{Course, CourseId, CourseStatus, Principal, Role, RoleAssignment, UserProfile};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{0}")]
    Trap(String),
    #[error("{0}")]
    Rejected(String),
}

pub type CommandResult<T> = Result<T, CommandError>;

fn rejected<T>(message: impl Into<String>) -> CommandResult<T> {
    Err(CommandError::Rejected(message.into()))
}

/// Roles, profiles, courses and enrollments of one service instance.
#[derive(Debug, Clone)]
pub struct Registry {
    roles: BTreeMap<Principal, Role>,
    profiles: BTreeMap<Principal, UserProfile>,
    courses: BTreeMap<CourseId, Course>,
    enrollments: BTreeMap<Principal, Vec<CourseId>>,
    next_course: u64,
}

impl Registry {
    /// A fresh registry whose deployer is the first admin.
    pub fn new(deployer: Principal) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(deployer, Role::Admin);
        Self {
            roles,
            profiles: BTreeMap::new(),
            courses: BTreeMap::new(),
            enrollments: BTreeMap::new(),
            next_course: 1,
        }
    }

    fn role_of(&self, principal: &Principal) -> Option<Role> {
        self.roles.get(principal).copied()
    }

    fn require_authenticated(caller: &Principal) -> CommandResult<()> {
        if *caller == Principal::anonymous() {
            return Err(CommandError::Trap(
                "Authentication required: Caller is anonymous.".to_string(),
            ));
        }
        Ok(())
    }

    fn require_role(&self, caller: &Principal, role: Role) -> CommandResult<()> {
        Self::require_authenticated(caller)?;
        if self.role_of(caller) != Some(role) {
            return Err(CommandError::Trap(format!(
                "Authorization failed: Only {}s can call this method.",
                role.as_str().to_lowercase()
            )));
        }
        Ok(())
    }

    fn require_registered(&self, caller: &Principal) -> CommandResult<()> {
        Self::require_authenticated(caller)?;
        if !self.roles.contains_key(caller) {
            return Err(CommandError::Trap(
                "Authorization failed: Only registered users can call this method.".to_string(),
            ));
        }
        Ok(())
    }

    // --- roles ---

    /// Register the caller with the requested role, or return the role it already has.
    pub fn login_as_role(&mut self, caller: &Principal, requested: Role) -> CommandResult<Role> {
        if *caller == Principal::anonymous() {
            return Err(CommandError::Trap(
                "Cannot login with an anonymous principal.".to_string(),
            ));
        }
        if let Some(existing) = self.role_of(caller) {
            tracing::debug!(%caller, %existing, %requested, "returning registered role");
            return Ok(existing);
        }
        let assigned = match requested {
            Role::Admin if self.roles.values().any(|r| *r == Role::Admin) => Role::Guest,
            other => other,
        };
        self.roles.insert(caller.clone(), assigned);
        tracing::info!(%caller, %requested, %assigned, "registered new principal");
        Ok(assigned)
    }

    pub fn my_role(&self, caller: &Principal) -> Role {
        self.role_of(caller).unwrap_or_default()
    }

    pub fn assign_role(&mut self, caller: &Principal, user: &Principal, role: Role) -> CommandResult<()> {
        self.require_role(caller, Role::Admin)?;
        self.roles.insert(user.clone(), role);
        tracing::info!(%caller, %user, %role, "role assigned");
        Ok(())
    }

    pub fn list_users(&self, caller: &Principal) -> CommandResult<Vec<RoleAssignment>> {
        self.require_role(caller, Role::Admin)?;
        Ok(self
            .roles
            .iter()
            .map(|(principal, role)| RoleAssignment {
                principal: principal.clone(),
                role: *role,
            })
            .collect())
    }

    pub fn list_principals(&self) -> Vec<Principal> {
        self.roles.keys().cloned().collect()
    }

    // --- profiles ---

    /// Upsert the caller's profile. The owner is always the caller.
    pub fn save_profile(&mut self, caller: &Principal, mut profile: UserProfile) -> CommandResult<()> {
        self.require_registered(caller)?;
        if profile.name.trim().is_empty() {
            return Err(CommandError::Trap("Profile name is required.".to_string()));
        }
        profile.owner = caller.clone();
        self.profiles.insert(caller.clone(), profile);
        Ok(())
    }

    pub fn profile(&self, caller: &Principal) -> Option<UserProfile> {
        self.profiles.get(caller).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    // --- courses ---

    pub fn create_course(
        &mut self,
        caller: &Principal,
        title: &str,
        description: &str,
        now: u64,
    ) -> CommandResult<Course> {
        self.require_role(caller, Role::Professor)?;
        if title.trim().is_empty() || description.trim().is_empty() {
            return rejected("Course title and description are required.");
        }

        let id = format!("course-{}", self.next_course);
        if self.courses.contains_key(&id) {
            return rejected("Course ID collision, please try again.");
        }
        self.next_course += 1;

        let course = Course {
            id: id.clone(),
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            professor_id: caller.clone(),
            status: CourseStatus::Draft,
            created_at: now,
            vote_count: 0,
            voters: BTreeSet::new(),
            enrolled_students: BTreeSet::new(),
        };
        self.courses.insert(id.clone(), course.clone());
        tracing::info!(%caller, course = %id, "course created");
        Ok(course)
    }

    fn course_mut(&mut self, course_id: &str) -> CommandResult<&mut Course> {
        match self.courses.get_mut(course_id) {
            Some(course) => Ok(course),
            None => rejected("Course not found."),
        }
    }

    pub fn propose_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.require_role(caller, Role::Professor)?;
        let course = self.course_mut(course_id)?;
        if &course.professor_id != caller {
            return rejected("Only the professor who created this course can propose it.");
        }
        if course.status != CourseStatus::Draft {
            return rejected(format!(
                "Course is not in Draft status. Current status: {}",
                course.status
            ));
        }
        advance(course, CourseStatus::Proposed)?;
        tracing::info!(%caller, course = course_id, "course proposed");
        Ok(course.clone())
    }

    pub fn vote_for_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.require_role(caller, Role::Student)?;
        let course = self.course_mut(course_id)?;
        if !course.status.is_voteable() {
            return rejected(format!(
                "Course is not open for voting. Current status: {}",
                course.status
            ));
        }
        if course.voters.contains(caller) {
            return rejected("You have already voted for this course.");
        }
        course.vote_count += 1;
        course.voters.insert(caller.clone());
        if course.status == CourseStatus::Proposed {
            advance(course, CourseStatus::Voting)?;
        }
        tracing::info!(%caller, course = course_id, votes = course.vote_count, "vote recorded");
        Ok(course.clone())
    }

    pub fn approve_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.decide(caller, course_id, CourseStatus::Approved)
    }

    pub fn reject_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.decide(caller, course_id, CourseStatus::Rejected)
    }

    fn decide(&mut self, caller: &Principal, course_id: &str, outcome: CourseStatus) -> CommandResult<Course> {
        self.require_role(caller, Role::Admin)?;
        let course = self.course_mut(course_id)?;
        if !course.status.awaits_decision() {
            return rejected(format!(
                "Course cannot be {} from current status: {}",
                outcome.as_str().to_lowercase(),
                course.status
            ));
        }
        advance(course, outcome)?;
        tracing::info!(%caller, course = course_id, status = %outcome, "course decided");
        Ok(course.clone())
    }

    /// Administrative housekeeping: retire a decided course.
    pub fn archive_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.require_role(caller, Role::Admin)?;
        let course = self.course_mut(course_id)?;
        if !course.status.can_transition_to(CourseStatus::Archived) {
            return rejected(format!(
                "Only approved or rejected courses can be archived. Current status: {}",
                course.status
            ));
        }
        advance(course, CourseStatus::Archived)?;
        Ok(course.clone())
    }

    pub fn enroll_in_course(&mut self, caller: &Principal, course_id: &str) -> CommandResult<Course> {
        self.require_role(caller, Role::Student)?;
        let course = self.course_mut(course_id)?;
        if !course.status.is_enrollable() {
            return rejected("Course is not approved for enrollment.");
        }
        if course.enrolled_students.contains(caller) {
            return rejected("You are already enrolled in this course.");
        }
        course.enrolled_students.insert(caller.clone());
        let course = course.clone();

        self.enrollments
            .entry(caller.clone())
            .or_default()
            .push(course_id.to_string());
        tracing::info!(%caller, course = course_id, "student enrolled");
        Ok(course)
    }

    pub fn enrolled_courses(&self, caller: &Principal) -> CommandResult<Vec<Course>> {
        self.require_role(caller, Role::Student)?;
        Ok(self
            .enrollments
            .get(caller)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.courses.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn course(&self, course_id: &str) -> Option<Course> {
        self.courses.get(course_id).cloned()
    }

    /// Courses the caller may see, optionally restricted to one status.
    pub fn list_courses(&self, caller: &Principal, filter: Option<CourseStatus>) -> Vec<Course> {
        let role = self.role_of(caller);
        let is_admin = role == Some(Role::Admin);
        let is_professor = role == Some(Role::Professor);
        let is_student = role == Some(Role::Student);

        self.courses
            .values()
            .filter(|course| filter.map_or(true, |status| course.status == status))
            .filter(|course| {
                let owns = is_professor && &course.professor_id == caller;
                match course.status {
                    CourseStatus::Draft => is_admin || owns,
                    CourseStatus::Proposed | CourseStatus::Voting => is_admin || is_student || owns,
                    CourseStatus::Approved => is_admin || is_student || is_professor,
                    CourseStatus::Rejected | CourseStatus::Archived => is_admin || owns,
                }
            })
            .cloned()
            .collect()
    }
}

/// Move a course one step along the governance graph.
fn advance(course: &mut Course, next: CourseStatus) -> CommandResult<()> {
    if !course.status.can_transition_to(next) {
        return rejected(format!(
            "Illegal course transition: {} -> {}",
            course.status, next
        ));
    }
    course.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(n: u8) -> Principal {
        Principal::from_slice(&[n; 10])
    }

    struct Fixture {
        registry: Registry,
        admin: Principal,
        professor: Principal,
        student: Principal,
    }

    fn fixture() -> Fixture {
        let admin = principal(1);
        let professor = principal(2);
        let student = principal(3);
        let mut registry = Registry::new(admin.clone());
        registry.login_as_role(&professor, Role::Professor).unwrap();
        registry.login_as_role(&student, Role::Student).unwrap();
        Fixture {
            registry,
            admin,
            professor,
            student,
        }
    }

    #[test]
    fn test_login_as_role_registers_once() {
        let mut f = fixture();
        assert_eq!(f.registry.my_role(&f.student), Role::Student);
        // A registered principal keeps its role whatever it asks for.
        assert_eq!(
            f.registry.login_as_role(&f.student, Role::Admin).unwrap(),
            Role::Student
        );
    }

    #[test]
    fn test_admin_request_downgraded_when_admin_exists() {
        let mut f = fixture();
        let newcomer = principal(9);
        assert_eq!(
            f.registry.login_as_role(&newcomer, Role::Admin).unwrap(),
            Role::Guest
        );
    }

    #[test]
    fn test_anonymous_login_trapped() {
        let mut f = fixture();
        assert!(matches!(
            f.registry.login_as_role(&Principal::anonymous(), Role::Student),
            Err(CommandError::Trap(_))
        ));
        assert_eq!(f.registry.my_role(&Principal::anonymous()), Role::Guest);
    }

    #[test]
    fn test_governance_lifecycle() {
        let mut f = fixture();
        let course = f
            .registry
            .create_course(&f.professor, "Algorithms", "Intro", 42)
            .unwrap();
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.vote_count, 0);
        assert_eq!(course.professor_id, f.professor);

        let proposed = f.registry.propose_course(&f.professor, &course.id).unwrap();
        assert_eq!(proposed.status, CourseStatus::Proposed);

        let voted = f.registry.vote_for_course(&f.student, &course.id).unwrap();
        assert_eq!(voted.vote_count, 1);
        assert_eq!(voted.status, CourseStatus::Voting);

        let again = f.registry.vote_for_course(&f.student, &course.id);
        assert_eq!(
            again,
            Err(CommandError::Rejected("You have already voted for this course.".into()))
        );

        let approved = f.registry.approve_course(&f.admin, &course.id).unwrap();
        assert_eq!(approved.status, CourseStatus::Approved);

        let enrolled = f.registry.enroll_in_course(&f.student, &course.id).unwrap();
        assert_eq!(enrolled.enrolled_students.len(), 1);
        assert!(f.registry.enroll_in_course(&f.student, &course.id).is_err());
        assert_eq!(f.registry.course(&course.id).unwrap().enrolled_students.len(), 1);
        assert_eq!(f.registry.enrolled_courses(&f.student).unwrap().len(), 1);

        let archived = f.registry.archive_course(&f.admin, &course.id).unwrap();
        assert_eq!(archived.status, CourseStatus::Archived);
    }

    #[test]
    fn test_only_owner_proposes_from_draft() {
        let mut f = fixture();
        let other = principal(7);
        f.registry.login_as_role(&other, Role::Professor).unwrap();
        let course = f.registry.create_course(&f.professor, "A", "B", 0).unwrap();

        assert!(matches!(
            f.registry.propose_course(&other, &course.id),
            Err(CommandError::Rejected(_))
        ));
        f.registry.propose_course(&f.professor, &course.id).unwrap();
        assert!(matches!(
            f.registry.propose_course(&f.professor, &course.id),
            Err(CommandError::Rejected(_))
        ));
    }

    #[test]
    fn test_decisions_require_pending_course() {
        let mut f = fixture();
        let course = f.registry.create_course(&f.professor, "A", "B", 0).unwrap();
        assert!(f.registry.approve_course(&f.admin, &course.id).is_err());
        assert!(f.registry.reject_course(&f.admin, &course.id).is_err());
        assert!(f.registry.enroll_in_course(&f.student, &course.id).is_err());

        f.registry.propose_course(&f.professor, &course.id).unwrap();
        let rejected = f.registry.reject_course(&f.admin, &course.id).unwrap();
        assert_eq!(rejected.status, CourseStatus::Rejected);
        assert!(f.registry.approve_course(&f.admin, &course.id).is_err());
    }

    #[test]
    fn test_role_gates_trap() {
        let mut f = fixture();
        assert!(matches!(
            f.registry.create_course(&f.student, "A", "B", 0),
            Err(CommandError::Trap(_))
        ));
        assert!(matches!(
            f.registry.list_users(&f.professor),
            Err(CommandError::Trap(_))
        ));
        assert!(matches!(
            f.registry.assign_role(&f.student, &f.student, Role::Admin),
            Err(CommandError::Trap(_))
        ));
        assert_eq!(f.registry.list_users(&f.admin).unwrap().len(), 3);
    }

    #[test]
    fn test_course_visibility() {
        let mut f = fixture();
        let draft = f.registry.create_course(&f.professor, "Draft", "d", 0).unwrap();
        let open = f.registry.create_course(&f.professor, "Open", "d", 0).unwrap();
        f.registry.propose_course(&f.professor, &open.id).unwrap();

        assert_eq!(f.registry.list_courses(&f.admin, None).len(), 2);
        assert_eq!(f.registry.list_courses(&f.professor, None).len(), 2);
        let student_view = f.registry.list_courses(&f.student, None);
        assert_eq!(student_view.len(), 1);
        assert_eq!(student_view[0].id, open.id);
        assert!(f.registry.list_courses(&principal(8), None).is_empty());

        let drafts = f.registry.list_courses(&f.admin, Some(CourseStatus::Draft));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, draft.id);
    }

    #[test]
    fn test_profile_upsert_keyed_by_caller() {
        let mut f = fixture();
        let first = UserProfile {
            owner: principal(99),
            name: "Ada".into(),
            bio: Some("first".into()),
            contact_email: None,
            github_username: None,
        };
        f.registry.save_profile(&f.student, first).unwrap();
        let second = UserProfile {
            owner: f.student.clone(),
            name: "Ada L.".into(),
            bio: None,
            contact_email: Some("ada@example.com".into()),
            github_username: None,
        };
        f.registry.save_profile(&f.student, second.clone()).unwrap();

        assert_eq!(f.registry.profile_count(), 1);
        assert_eq!(f.registry.profile(&f.student), Some(second));
        assert!(f
            .registry
            .save_profile(&principal(50), UserProfile {
                owner: principal(50),
                name: "x".into(),
                bio: None,
                contact_email: None,
                github_username: None,
            })
            .is_err());
    }
}
