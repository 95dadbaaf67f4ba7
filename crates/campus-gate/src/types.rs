//! Core types for the session gate
//!
//! Defines the values the gate reasons about:
//! - Identities issued by the external auth provider
//! - Roles, including corrupt role values read back from the store
//! - Session profiles and their load state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque subject identifier issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    /// Create uid from any string-like value
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Authenticated subject as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject identifier
    pub uid: Uid,
    /// Email the subject signed in with, if the provider exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Create identity for uid
    #[inline]
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Uid::new(uid),
            email: None,
        }
    }

    /// With email
    #[inline]
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// The closed set of application roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Enrolled student
    Student,
    /// Teaching staff
    Teacher,
    /// Administrator
    Admin,
}

impl Role {
    /// All known roles
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    /// Wire name of the role
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// Landing screen for the role
    #[inline]
    #[must_use]
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Student => "/student-dashboard",
            Role::Teacher => "/teacher-dashboard",
            Role::Admin => "/admin-dashboard",
        }
    }

    /// Whether a freshly registered account of this role starts approved
    #[inline]
    #[must_use]
    pub fn approved_on_registration(&self) -> bool {
        matches!(self, Role::Student)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Role as stored on a profile record.
///
/// Records are written by clients, so the stored string may not name a known
/// role. Such values are kept verbatim instead of failing the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoleValue {
    /// One of the known roles
    Known(Role),
    /// Anything else
    Unknown(String),
}

impl RoleValue {
    /// Known role, if any
    #[inline]
    #[must_use]
    pub fn known(&self) -> Option<Role> {
        match self {
            RoleValue::Known(role) => Some(*role),
            RoleValue::Unknown(_) => None,
        }
    }

    /// Check membership in a set of roles. Unknown values are never members.
    #[must_use]
    pub fn is_one_of(&self, roles: &[Role]) -> bool {
        self.known().is_some_and(|role| roles.contains(&role))
    }

    /// Landing screen for this value; unknown values land on the login screen
    #[inline]
    #[must_use]
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            RoleValue::Known(role) => role.dashboard_path(),
            RoleValue::Unknown(_) => crate::gate::LOGIN_PATH,
        }
    }

    /// Stored string
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RoleValue::Known(role) => role.as_str(),
            RoleValue::Unknown(raw) => raw,
        }
    }
}

impl From<Role> for RoleValue {
    fn from(role: Role) -> Self {
        RoleValue::Known(role)
    }
}

impl From<String> for RoleValue {
    fn from(raw: String) -> Self {
        match raw.parse::<Role>() {
            Ok(role) => RoleValue::Known(role),
            Err(_) => RoleValue::Unknown(raw),
        }
    }
}

impl From<&str> for RoleValue {
    fn from(raw: &str) -> Self {
        RoleValue::from(raw.to_string())
    }
}

impl From<RoleValue> for String {
    fn from(value: RoleValue) -> Self {
        match value {
            RoleValue::Known(role) => role.as_str().to_string(),
            RoleValue::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for RoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level record attached to an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    /// Identity this profile belongs to
    pub uid: Uid,
    /// Contact email
    pub email: String,
    /// Display name
    pub name: String,
    /// Stored role
    pub role: RoleValue,
    /// Administrative approval flag
    pub approved: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl SessionProfile {
    /// Create profile with the approval flag a new registration gets for its role
    #[must_use]
    pub fn new(
        uid: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<RoleValue>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let role = role.into();
        let approved = role.known().is_some_and(|r| r.approved_on_registration());
        Self {
            uid: Uid::new(uid),
            email: email.into(),
            name: name.into(),
            role,
            approved,
            created_at,
        }
    }

    /// With approval flag
    #[inline]
    #[must_use]
    pub fn with_approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }
}

/// Load state of the session profile
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "profile", rename_all = "snake_case")]
pub enum ProfileState {
    /// Fetch has not completed yet
    #[default]
    Pending,
    /// Profile resolved
    Present(SessionProfile),
    /// Resolved to no profile
    Absent,
}

impl ProfileState {
    /// Resolved profile, if any
    #[inline]
    #[must_use]
    pub fn profile(&self) -> Option<&SessionProfile> {
        match self {
            ProfileState::Present(profile) => Some(profile),
            _ => None,
        }
    }

    /// Whether the profile is still loading
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, ProfileState::Pending)
    }
}

impl From<Option<SessionProfile>> for ProfileState {
    fn from(value: Option<SessionProfile>) -> Self {
        match value {
            Some(profile) => ProfileState::Present(profile),
            None => ProfileState::Absent,
        }
    }
}
