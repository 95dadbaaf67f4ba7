//! Registration and login routing
//!
//! Registration creates the session profile the gate later reads; students
//! start approved, staff accounts wait for an administrator. Login routing
//! sends a freshly signed-in subject to the right first screen.

use crate::collaborators::ProfileStore;
use crate::error::{LoginError, RegistrationError};
use crate::gate::APPROVAL_WAITING_PATH;
use crate::types::{Role, RoleValue, SessionProfile, Uid};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Sign-up form contents
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    /// Display name; may be blank
    #[serde(default)]
    pub name: String,
    /// Email address
    pub email: String,
    /// Chosen password
    pub password: String,
    /// Password confirmation
    pub confirm_password: String,
    /// Requested role
    pub role: Role,
}

impl RegistrationRequest {
    /// Check the form before anything is written
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.password != self.confirm_password {
            return Err(RegistrationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegistrationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(RegistrationError::InvalidEmail(self.email.clone())),
        }
    }

    /// Name to store: the given name, or the email's local part when blank
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            let email = self.email.trim();
            email.split('@').next().unwrap_or(email).to_string()
        } else {
            name.to_string()
        }
    }

    /// Build the profile this request would create
    #[must_use]
    pub fn into_profile(self, uid: Uid, created_at: DateTime<Utc>) -> SessionProfile {
        SessionProfile {
            name: self.display_name(),
            email: self.email.trim().to_string(),
            approved: self.role.approved_on_registration(),
            role: RoleValue::Known(self.role),
            uid,
            created_at,
        }
    }
}

/// Register a newly created identity
///
/// # Errors
/// - validation failures from [`RegistrationRequest::validate`]
/// - `AlreadyRegistered` if the identity already has a profile
/// - `Store` if the store rejects the read or write
pub async fn register(
    store: &dyn ProfileStore,
    uid: Uid,
    request: RegistrationRequest,
    created_at: DateTime<Utc>,
) -> Result<SessionProfile, RegistrationError> {
    request.validate()?;

    if store.fetch(&uid).await?.is_some() {
        return Err(RegistrationError::AlreadyRegistered(uid));
    }

    let profile = request.into_profile(uid, created_at);
    store.put(profile.clone()).await?;

    tracing::info!(
        uid = %profile.uid,
        role = %profile.role,
        approved = profile.approved,
        "registered profile"
    );
    Ok(profile)
}

/// First screen after a successful sign-in
///
/// # Errors
/// - `ProfileNotFound` when the identity has no profile record
/// - `UnknownRole` when an approved profile carries an unrecognised role
pub fn login_outcome(profile: Option<&SessionProfile>) -> Result<&'static str, LoginError> {
    let profile = profile.ok_or(LoginError::ProfileNotFound)?;

    if !profile.approved {
        return Ok(APPROVAL_WAITING_PATH);
    }

    match &profile.role {
        RoleValue::Known(role) => Ok(role.dashboard_path()),
        RoleValue::Unknown(raw) => Err(LoginError::UnknownRole(raw.clone())),
    }
}
