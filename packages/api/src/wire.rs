//! # Wire codec: the only place that knows how values look on the wire
//!
//! The remote service speaks a variant-oriented encoding:
//!
//! | Concept | Wire shape | Type here |
//! |---------|-----------|-----------|
//! | enum value | single-key record, `{"Student": null}` | [`Tagged`] |
//! | optional scalar | zero-or-one element array, `[]` / `["text"]` | [`Opt`] |
//! | fallible command result | `{"Ok": value}` / `{"Err": "text"}` | [`WireResult`] |
//! | map of principals | list of `(principal, bool)` pairs | `Vec<(Principal, bool)>` |
//! | principal | canonical text, `"2vxsx-fae"` | [`Principal`] (serde impl) |
//!
//! Encoders take domain values from [`crate::models`] and produce wire records;
//! decoders go the other way and fail with [`WireError`] on anything that is not
//! exactly the expected shape. No other module inspects wire values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{Course, CourseStatus, ProfileDraft, Role, RoleAssignment, UserProfile};
use crate::principal::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("tagged record must have exactly one key, found {0}")]
    TagCount(usize),
    #[error("unknown {kind} tag '{tag}'")]
    UnknownTag { kind: &'static str, tag: String },
    #[error("optional field '{field}' carries {len} values")]
    OptArity { field: &'static str, len: usize },
}

/// A single-key tagged record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tagged(pub Map<String, Value>);

impl Tagged {
    pub fn unit(tag: &str) -> Self {
        let mut map = Map::new();
        map.insert(tag.to_string(), Value::Null);
        Self(map)
    }

    /// The single key, or an error when the record has zero or several keys.
    pub fn tag(&self) -> Result<&str, WireError> {
        let mut keys = self.0.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key.as_str()),
            _ => Err(WireError::TagCount(self.0.len())),
        }
    }
}

/// An optional value encoded as a zero-or-one element sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opt<T>(pub Vec<T>);

impl<T> Opt<T> {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn some(value: T) -> Self {
        Self(vec![value])
    }

    pub fn into_option(self, field: &'static str) -> Result<Option<T>, WireError> {
        let len = self.0.len();
        if len > 1 {
            return Err(WireError::OptArity { field, len });
        }
        Ok(self.0.into_iter().next())
    }
}

impl<T> Default for Opt<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> From<Option<T>> for Opt<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::some(v),
            None => Self::none(),
        }
    }
}

/// Result of a fallible command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WireResult<T> {
    Ok(T),
    Err(String),
}

impl<T> WireResult<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            WireResult::Ok(v) => Ok(v),
            WireResult::Err(e) => Err(e),
        }
    }
}

impl<T> From<Result<T, String>> for WireResult<T> {
    fn from(value: Result<T, String>) -> Self {
        match value {
            Ok(v) => WireResult::Ok(v),
            Err(e) => WireResult::Err(e),
        }
    }
}

/// Course record as exchanged with the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireCourse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub professor_id: Principal,
    pub status: Tagged,
    pub created_at: u64,
    pub vote_count: u64,
    pub voters: Vec<(Principal, bool)>,
    pub enrolled_students: Vec<(Principal, bool)>,
}

/// Profile record as exchanged with the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireProfile {
    pub profile_id: Principal,
    pub name: String,
    pub bio: Opt<String>,
    pub contact_email: Opt<String>,
    pub github_username: Opt<String>,
}

pub fn encode_role(role: Role) -> Tagged {
    Tagged::unit(role.as_str())
}

pub fn decode_role(tagged: &Tagged) -> Result<Role, WireError> {
    let tag = tagged.tag()?;
    Role::from_tag(tag).ok_or_else(|| WireError::UnknownTag {
        kind: "role",
        tag: tag.to_string(),
    })
}

pub fn encode_status(status: CourseStatus) -> Tagged {
    Tagged::unit(status.as_str())
}

pub fn decode_status(tagged: &Tagged) -> Result<CourseStatus, WireError> {
    let tag = tagged.tag()?;
    CourseStatus::from_tag(tag).ok_or_else(|| WireError::UnknownTag {
        kind: "course status",
        tag: tag.to_string(),
    })
}

fn encode_set(set: &BTreeSet<Principal>) -> Vec<(Principal, bool)> {
    set.iter().map(|p| (p.clone(), true)).collect()
}

fn decode_set(pairs: Vec<(Principal, bool)>) -> BTreeSet<Principal> {
    pairs
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(p, _)| p)
        .collect()
}

pub fn encode_course(course: &Course) -> WireCourse {
    WireCourse {
        id: course.id.clone(),
        title: course.title.clone(),
        description: course.description.clone(),
        professor_id: course.professor_id.clone(),
        status: encode_status(course.status),
        created_at: course.created_at,
        vote_count: course.vote_count,
        voters: encode_set(&course.voters),
        enrolled_students: encode_set(&course.enrolled_students),
    }
}

pub fn decode_course(wire: WireCourse) -> Result<Course, WireError> {
    Ok(Course {
        status: decode_status(&wire.status)?,
        id: wire.id,
        title: wire.title,
        description: wire.description,
        professor_id: wire.professor_id,
        created_at: wire.created_at,
        vote_count: wire.vote_count,
        voters: decode_set(wire.voters),
        enrolled_students: decode_set(wire.enrolled_students),
    })
}

pub fn decode_courses(wire: Vec<WireCourse>) -> Result<Vec<Course>, WireError> {
    wire.into_iter().map(decode_course).collect()
}

/// Encode a profile draft for the caller. Blank optional fields are sent as
/// "not provided" (`[]`), never as empty strings.
pub fn encode_profile(draft: &ProfileDraft, owner: &Principal) -> WireProfile {
    let draft = draft.normalized();
    WireProfile {
        profile_id: owner.clone(),
        name: draft.name,
        bio: draft.bio.into(),
        contact_email: draft.contact_email.into(),
        github_username: draft.github_username.into(),
    }
}

pub fn encode_stored_profile(profile: &UserProfile) -> WireProfile {
    WireProfile {
        profile_id: profile.owner.clone(),
        name: profile.name.clone(),
        bio: profile.bio.clone().into(),
        contact_email: profile.contact_email.clone().into(),
        github_username: profile.github_username.clone().into(),
    }
}

pub fn decode_profile(wire: WireProfile) -> Result<UserProfile, WireError> {
    Ok(UserProfile {
        owner: wire.profile_id,
        name: wire.name,
        bio: wire.bio.into_option("bio")?,
        contact_email: wire.contact_email.into_option("contact_email")?,
        github_username: wire.github_username.into_option("github_username")?,
    })
}

/// Decode the administrative listing. Roles this client does not know are listed as
/// `Guest` rather than failing the whole listing.
pub fn decode_assignments(wire: Vec<(Principal, Tagged)>) -> Vec<RoleAssignment> {
    wire.into_iter()
        .map(|(principal, tagged)| {
            let role = decode_role(&tagged).unwrap_or_else(|err| {
                tracing::warn!(%principal, %err, "unrecognized role in listing");
                Role::Guest
            });
            RoleAssignment { principal, role }
        })
        .collect()
}
