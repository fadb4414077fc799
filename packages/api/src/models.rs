//! # Domain models shared by the service and its clients
//!
//! These are the decoded, plain forms. Nothing here knows about the wire shape;
//! [`crate::wire`] converts between the two.
//!
//! | Type | Represents |
//! |------|-----------|
//! | [`Role`] | Access level of a principal. Closed set, `Guest` by default. |
//! | [`CourseStatus`] | Governance state of a course, with the transition graph in [`CourseStatus::can_transition_to`]. |
//! | [`Course`] | A course record with its vote and enrollment sets. |
//! | [`UserProfile`] | The optional profile a principal keeps about itself. |
//! | [`ProfileDraft`] | Profile form input before it is sent; blank optional fields become "not provided". |
//! | [`RoleAssignment`] | One `principal → role` row of the administrative listing. |

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::principal::Principal;

/// Access level of a principal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Professor,
    Student,
    #[default]
    Guest,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Professor, Role::Student, Role::Guest];

    /// Variant name, which is also its wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Professor => "Professor",
            Role::Student => "Student",
            Role::Guest => "Guest",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Role> {
        Self::ALL.into_iter().find(|r| r.as_str() == tag)
    }

    /// Case-insensitive lookup for human input ("student", "ADMIN").
    pub fn parse_loose(input: &str) -> Option<Role> {
        let input = input.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(input))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Governance state of a course.
///
/// ```text
/// Draft → Proposed → Voting ─┬→ Approved ─┬→ Archived
///            └───────────────┴→ Rejected ─┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CourseStatus {
    Draft,
    Proposed,
    Voting,
    Approved,
    Rejected,
    Archived,
}

impl CourseStatus {
    pub const ALL: [CourseStatus; 6] = [
        CourseStatus::Draft,
        CourseStatus::Proposed,
        CourseStatus::Voting,
        CourseStatus::Approved,
        CourseStatus::Rejected,
        CourseStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "Draft",
            CourseStatus::Proposed => "Proposed",
            CourseStatus::Voting => "Voting",
            CourseStatus::Approved => "Approved",
            CourseStatus::Rejected => "Rejected",
            CourseStatus::Archived => "Archived",
        }
    }

    pub fn from_tag(tag: &str) -> Option<CourseStatus> {
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }

    /// Whether `next` is a single legal step from `self`.
    pub fn can_transition_to(&self, next: CourseStatus) -> bool {
        use CourseStatus::*;
        matches!(
            (self, next),
            (Draft, Proposed)
                | (Proposed, Voting)
                | (Proposed, Approved)
                | (Proposed, Rejected)
                | (Voting, Approved)
                | (Voting, Rejected)
                | (Approved, Archived)
                | (Rejected, Archived)
        )
    }

    /// Students may vote while a course is `Proposed` or `Voting`.
    pub fn is_voteable(&self) -> bool {
        matches!(self, CourseStatus::Proposed | CourseStatus::Voting)
    }

    /// An admin decision (approve/reject) is pending.
    pub fn awaits_decision(&self) -> bool {
        self.is_voteable()
    }

    pub fn is_enrollable(&self) -> bool {
        matches!(self, CourseStatus::Approved)
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable course identifier assigned by the service.
pub type CourseId = String;

/// A course record in decoded form.
#[derive(Clone, Debug, PartialEq)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    /// Creator; never changes after creation.
    pub professor_id: Principal,
    pub status: CourseStatus,
    /// Nanoseconds since the Unix epoch.
    pub created_at: u64,
    pub vote_count: u64,
    pub voters: BTreeSet<Principal>,
    pub enrolled_students: BTreeSet<Principal>,
}

impl Course {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let nanos = i64::try_from(self.created_at).ok()?;
        Some(DateTime::from_timestamp_nanos(nanos))
    }

    pub fn is_owned_by(&self, principal: &Principal) -> bool {
        &self.professor_id == principal
    }

    pub fn has_voted(&self, principal: &Principal) -> bool {
        self.voters.contains(principal)
    }

    pub fn is_enrolled(&self, principal: &Principal) -> bool {
        self.enrolled_students.contains(principal)
    }
}

/// A principal's own profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub owner: Principal,
    pub name: String,
    pub bio: Option<String>,
    pub contact_email: Option<String>,
    pub github_username: Option<String>,
}

/// Profile form input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub bio: Option<String>,
    pub contact_email: Option<String>,
    pub github_username: Option<String>,
}

impl ProfileDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    pub fn with_github_username(mut self, username: impl Into<String>) -> Self {
        self.github_username = Some(username.into());
        self
    }

    /// Trim every field and turn blank optional fields into `None`.
    pub fn normalized(&self) -> Self {
        fn field(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            name: self.name.trim().to_string(),
            bio: field(&self.bio),
            contact_email: field(&self.contact_email),
            github_username: field(&self.github_username),
        }
    }
}

/// One row of the administrative role listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleAssignment {
    pub principal: Principal,
    pub role: Role,
}
