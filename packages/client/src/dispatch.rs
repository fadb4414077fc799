//! # Command dispatcher
//!
//! Every mutating command goes through [`dispatch`]: it is checked against the
//! caller's role and the course's current state in the snapshot, sent only if
//! the check passes, and its result is unwrapped into a [`Receipt`] or a
//! [`DispatchError`]. The service re-validates everything; the checks here only
//! keep obviously doomed calls from being sent.
//!
//! ## Commands
//!
//! | Command | Role | Precondition |
//! |---------|------|--------------|
//! | `CreateCourse` | Professor | title and description non-empty |
//! | `ProposeCourse` | Professor | owns the course, course is `Draft` |
//! | `VoteForCourse` | Student | course `Proposed` or `Voting`, not voted yet |
//! | `ApproveCourse` / `RejectCourse` | Admin | course `Proposed` or `Voting` |
//! | `EnrollInCourse` | Student | course `Approved`, not enrolled yet |
//! | `AssignRole` | Admin | principal text is well-formed |
//! | `SaveProfile` | any signed-in role | name non-empty |

use api::wire::{self, WireCourse, WireResult};
use api::{CallError, Course, CourseId, CourseStatus, GovernanceService, Principal, ProfileDraft, Role};
use thiserror::Error;

use crate::sync::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateCourse { title: String, description: String },
    ProposeCourse(CourseId),
    VoteForCourse(CourseId),
    ApproveCourse(CourseId),
    RejectCourse(CourseId),
    EnrollInCourse(CourseId),
    /// Target principal in text form, as typed by an admin.
    AssignRole { principal: String, role: Role },
    SaveProfile(ProfileDraft),
}

impl Command {
    /// Short description used in messages ("propose courses").
    pub fn action(&self) -> &'static str {
        match self {
            Command::CreateCourse { .. } => "create courses",
            Command::ProposeCourse(_) => "propose courses",
            Command::VoteForCourse(_) => "vote for courses",
            Command::ApproveCourse(_) => "approve courses",
            Command::RejectCourse(_) => "reject courses",
            Command::EnrollInCourse(_) => "enroll in courses",
            Command::AssignRole { .. } => "assign roles",
            Command::SaveProfile(_) => "save a profile",
        }
    }

    /// Roles the command is offered to. Empty means every signed-in role.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Command::CreateCourse { .. } | Command::ProposeCourse(_) => &[Role::Professor],
            Command::VoteForCourse(_) | Command::EnrollInCourse(_) => &[Role::Student],
            Command::ApproveCourse(_) | Command::RejectCourse(_) | Command::AssignRole { .. } => {
                &[Role::Admin]
            }
            Command::SaveProfile(_) => &[],
        }
    }
}

/// A per-course action a front-end may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseAction {
    Propose,
    Vote,
    Approve,
    Reject,
    Enroll,
}

impl CourseAction {
    pub fn command(self, course_id: impl Into<CourseId>) -> Command {
        let id = course_id.into();
        match self {
            CourseAction::Propose => Command::ProposeCourse(id),
            CourseAction::Vote => Command::VoteForCourse(id),
            CourseAction::Approve => Command::ApproveCourse(id),
            CourseAction::Reject => Command::RejectCourse(id),
            CourseAction::Enroll => Command::EnrollInCourse(id),
        }
    }
}

/// Course actions `caller` holding `role` may take on `course` in its current state.
pub fn offered_commands(role: Role, caller: &Principal, course: &Course) -> Vec<CourseAction> {
    let mut offered = Vec::new();
    match role {
        Role::Professor if course.is_owned_by(caller) && course.status == CourseStatus::Draft => {
            offered.push(CourseAction::Propose);
        }
        Role::Student => {
            if course.status.is_voteable() && !course.has_voted(caller) {
                offered.push(CourseAction::Vote);
            }
            if course.status.is_enrollable() && !course.is_enrolled(caller) {
                offered.push(CourseAction::Enroll);
            }
        }
        Role::Admin if course.status.awaits_decision() => {
            offered.push(CourseAction::Approve);
            offered.push(CourseAction::Reject);
        }
        _ => {}
    }
    offered
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("please log in first")]
    Unauthenticated,
    #[error("authorization failed: {role}s cannot {action}")]
    Forbidden { role: Role, action: &'static str },
    #[error("{0}")]
    Validation(String),
    #[error("course {id} is {status}; cannot {action}")]
    InvalidState {
        id: CourseId,
        status: CourseStatus,
        action: &'static str,
    },
    #[error("only the professor who created course {0} can propose it")]
    NotOwner(CourseId),
    #[error("unknown course {0}")]
    UnknownCourse(CourseId),
    #[error("you have already voted for course {0}")]
    AlreadyVoted(CourseId),
    #[error("you are already enrolled in course {0}")]
    AlreadyEnrolled(CourseId),
    /// Business-rule refusal reported by the service, verbatim.
    #[error("{0}")]
    Domain(String),
    #[error(transparent)]
    Call(#[from] CallError),
}

/// What a successful command did.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub action: &'static str,
    pub message: String,
    pub course: Option<Course>,
}

/// A command that passed the local checks, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prepared {
    CreateCourse { title: String, description: String },
    Course { action: CourseAction, id: CourseId },
    AssignRole { principal: Principal, role: Role },
    SaveProfile { draft: ProfileDraft, owner: Principal },
}

fn check_course<'a>(
    snapshot: &'a SessionSnapshot,
    id: &str,
    action: &'static str,
    allowed: impl Fn(CourseStatus) -> bool,
) -> Result<&'a Course, DispatchError> {
    let course = snapshot
        .course(id)
        .ok_or_else(|| DispatchError::UnknownCourse(id.to_string()))?;
    if !allowed(course.status) {
        return Err(DispatchError::InvalidState {
            id: id.to_string(),
            status: course.status,
            action,
        });
    }
    Ok(course)
}

/// Validate `command` against the snapshot without sending anything.
pub fn check(command: &Command, snapshot: &SessionSnapshot) -> Result<(), DispatchError> {
    prepare(command, snapshot).map(|_| ())
}

fn prepare(command: &Command, snapshot: &SessionSnapshot) -> Result<Prepared, DispatchError> {
    let caller = match &snapshot.principal {
        Some(principal) if *principal != Principal::anonymous() => principal,
        _ => return Err(DispatchError::Unauthenticated),
    };

    let allowed = command.allowed_roles();
    if !allowed.is_empty() && !allowed.contains(&snapshot.role) {
        return Err(DispatchError::Forbidden {
            role: snapshot.role,
            action: command.action(),
        });
    }

    match command {
        Command::CreateCourse { title, description } => {
            if title.trim().is_empty() || description.trim().is_empty() {
                return Err(DispatchError::Validation(
                    "Course title and description are required.".to_string(),
                ));
            }
            Ok(Prepared::CreateCourse {
                title: title.trim().to_string(),
                description: description.trim().to_string(),
            })
        }
        Command::ProposeCourse(id) => {
            let course = check_course(snapshot, id, "propose it", |s| s == CourseStatus::Draft)?;
            if !course.is_owned_by(caller) {
                return Err(DispatchError::NotOwner(id.clone()));
            }
            Ok(Prepared::Course {
                action: CourseAction::Propose,
                id: id.clone(),
            })
        }
        Command::VoteForCourse(id) => {
            let course = check_course(snapshot, id, "vote for it", |s| s.is_voteable())?;
            if course.has_voted(caller) {
                return Err(DispatchError::AlreadyVoted(id.clone()));
            }
            Ok(Prepared::Course {
                action: CourseAction::Vote,
                id: id.clone(),
            })
        }
        Command::ApproveCourse(id) | Command::RejectCourse(id) => {
            check_course(snapshot, id, "decide on it", |s| s.awaits_decision())?;
            let action = match command {
                Command::ApproveCourse(_) => CourseAction::Approve,
                _ => CourseAction::Reject,
            };
            Ok(Prepared::Course {
                action,
                id: id.clone(),
            })
        }
        Command::EnrollInCourse(id) => {
            check_course(snapshot, id, "enroll in it", |s| s.is_enrollable())?;
            if snapshot.is_enrolled_in(id) {
                return Err(DispatchError::AlreadyEnrolled(id.clone()));
            }
            Ok(Prepared::Course {
                action: CourseAction::Enroll,
                id: id.clone(),
            })
        }
        Command::AssignRole { principal, role } => {
            let principal = Principal::from_text(principal.trim()).map_err(|err| {
                DispatchError::Validation(format!("Invalid principal '{}': {err}", principal.trim()))
            })?;
            Ok(Prepared::AssignRole {
                principal,
                role: *role,
            })
        }
        Command::SaveProfile(draft) => {
            let draft = draft.normalized();
            if draft.name.is_empty() {
                return Err(DispatchError::Validation("Name is required.".to_string()));
            }
            Ok(Prepared::SaveProfile {
                draft,
                owner: caller.clone(),
            })
        }
    }
}

fn course_receipt(
    action: &'static str,
    reply: WireResult<WireCourse>,
    describe: impl FnOnce(&Course) -> String,
) -> Result<Receipt, DispatchError> {
    let course = reply.into_result().map_err(DispatchError::Domain)?;
    let course = wire::decode_course(course)
        .map_err(|err| DispatchError::Call(CallError::Decode(err.to_string())))?;
    Ok(Receipt {
        action,
        message: describe(&course),
        course: Some(course),
    })
}

/// Check `command`, send it, and unwrap the result.
pub async fn dispatch<C: GovernanceService>(
    client: &C,
    snapshot: &SessionSnapshot,
    command: &Command,
) -> Result<Receipt, DispatchError> {
    let prepared = prepare(command, snapshot)?;
    let action = command.action();
    tracing::debug!(action, "dispatching command");

    let receipt = match prepared {
        Prepared::CreateCourse { title, description } => {
            let reply = client.create_course(title, description).await?;
            course_receipt(action, reply, |c| format!("Course '{}' created as {}.", c.title, c.status))?
        }
        Prepared::Course { action: course_action, id } => {
            let reply = match course_action {
                CourseAction::Propose => client.propose_course(id).await?,
                CourseAction::Vote => client.vote_for_course(id).await?,
                CourseAction::Approve => client.approve_course(id).await?,
                CourseAction::Reject => client.reject_course(id).await?,
                CourseAction::Enroll => client.enroll_in_course(id).await?,
            };
            course_receipt(action, reply, |c| match course_action {
                CourseAction::Propose => format!("Course '{}' proposed.", c.title),
                CourseAction::Vote => {
                    format!("Vote recorded for '{}' ({} votes).", c.title, c.vote_count)
                }
                CourseAction::Approve => format!("Course '{}' approved.", c.title),
                CourseAction::Reject => format!("Course '{}' rejected.", c.title),
                CourseAction::Enroll => format!("Enrolled in '{}'.", c.title),
            })?
        }
        Prepared::AssignRole { principal, role } => {
            client
                .assign_role(principal.clone(), wire::encode_role(role))
                .await?;
            Receipt {
                action,
                message: format!("Assigned {role} to {principal}."),
                course: None,
            }
        }
        Prepared::SaveProfile { draft, owner } => {
            client
                .create_or_update_my_profile(wire::encode_profile(&draft, &owner))
                .await?;
            Receipt {
                action,
                message: "Profile saved.".to_string(),
                course: None,
            }
        }
    };

    tracing::info!(action, "command succeeded");
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn principal(n: u8) -> Principal {
        Principal::from_slice(&[n; 10])
    }

    fn course(id: &str, owner: &Principal, status: CourseStatus) -> Course {
        Course {
            id: id.to_string(),
            title: "Algorithms".into(),
            description: "Intro".into(),
            professor_id: owner.clone(),
            status,
            created_at: 0,
            vote_count: 0,
            voters: BTreeSet::new(),
            enrolled_students: BTreeSet::new(),
        }
    }

    fn snapshot(me: &Principal, role: Role, courses: Vec<Course>) -> SessionSnapshot {
        SessionSnapshot {
            principal: Some(me.clone()),
            role,
            courses,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn test_signed_out_is_unauthenticated() {
        let command = Command::SaveProfile(ProfileDraft::new("Ada"));
        assert_eq!(
            check(&command, &SessionSnapshot::signed_out()),
            Err(DispatchError::Unauthenticated)
        );
    }

    #[test]
    fn test_role_gate() {
        let me = principal(3);
        let command = Command::CreateCourse {
            title: "A".into(),
            description: "B".into(),
        };
        assert_eq!(
            check(&command, &snapshot(&me, Role::Student, vec![])),
            Err(DispatchError::Forbidden {
                role: Role::Student,
                action: "create courses",
            })
        );
        assert!(check(&command, &snapshot(&me, Role::Professor, vec![])).is_ok());
    }

    #[test]
    fn test_empty_fields_fail_validation() {
        let me = principal(2);
        let command = Command::CreateCourse {
            title: "  ".into(),
            description: "B".into(),
        };
        assert!(matches!(
            check(&command, &snapshot(&me, Role::Professor, vec![])),
            Err(DispatchError::Validation(_))
        ));
        let profile = Command::SaveProfile(ProfileDraft::new(" "));
        assert!(matches!(
            check(&profile, &snapshot(&me, Role::Guest, vec![])),
            Err(DispatchError::Validation(_))
        ));
    }

    #[test]
    fn test_propose_requires_owner_and_draft() {
        let owner = principal(2);
        let other = principal(7);
        let draft = course("course-1", &owner, CourseStatus::Draft);
        let command = Command::ProposeCourse("course-1".into());

        assert_eq!(
            check(&command, &snapshot(&other, Role::Professor, vec![draft.clone()])),
            Err(DispatchError::NotOwner("course-1".into()))
        );
        assert!(check(&command, &snapshot(&owner, Role::Professor, vec![draft])).is_ok());

        let proposed = course("course-1", &owner, CourseStatus::Proposed);
        assert!(matches!(
            check(&command, &snapshot(&owner, Role::Professor, vec![proposed])),
            Err(DispatchError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_vote_and_enroll_gates() {
        let owner = principal(2);
        let me = principal(3);
        let mut voting = course("course-1", &owner, CourseStatus::Voting);
        voting.voters.insert(me.clone());
        let draft = course("course-2", &owner, CourseStatus::Draft);
        let snap = snapshot(&me, Role::Student, vec![voting, draft]);

        assert_eq!(
            check(&Command::VoteForCourse("course-1".into()), &snap),
            Err(DispatchError::AlreadyVoted("course-1".into()))
        );
        assert!(matches!(
            check(&Command::EnrollInCourse("course-2".into()), &snap),
            Err(DispatchError::InvalidState { .. })
        ));
        assert_eq!(
            check(&Command::EnrollInCourse("course-9".into()), &snap),
            Err(DispatchError::UnknownCourse("course-9".into()))
        );
    }

    #[test]
    fn test_malformed_principal_rejected() {
        let me = principal(1);
        let command = Command::AssignRole {
            principal: "not-a-principal".into(),
            role: Role::Professor,
        };
        assert!(matches!(
            check(&command, &snapshot(&me, Role::Admin, vec![])),
            Err(DispatchError::Validation(_))
        ));
        let command = Command::AssignRole {
            principal: principal(5).to_text(),
            role: Role::Professor,
        };
        assert!(check(&command, &snapshot(&me, Role::Admin, vec![])).is_ok());
    }

    #[test]
    fn test_offered_commands_follow_state() {
        let owner = principal(2);
        let student = principal(3);
        let admin = principal(1);

        let draft = course("c", &owner, CourseStatus::Draft);
        assert_eq!(offered_commands(Role::Professor, &owner, &draft), vec![CourseAction::Propose]);
        assert!(offered_commands(Role::Professor, &student, &draft).is_empty());
        assert!(offered_commands(Role::Student, &student, &draft).is_empty());

        let mut voting = course("c", &owner, CourseStatus::Voting);
        assert_eq!(offered_commands(Role::Student, &student, &voting), vec![CourseAction::Vote]);
        assert_eq!(
            offered_commands(Role::Admin, &admin, &voting),
            vec![CourseAction::Approve, CourseAction::Reject]
        );
        voting.voters.insert(student.clone());
        assert!(offered_commands(Role::Student, &student, &voting).is_empty());

        let approved = course("c", &owner, CourseStatus::Approved);
        assert_eq!(offered_commands(Role::Student, &student, &approved), vec![CourseAction::Enroll]);
        assert!(offered_commands(Role::Admin, &admin, &approved).is_empty());
        assert!(offered_commands(Role::Guest, &student, &approved).is_empty());
    }
}
