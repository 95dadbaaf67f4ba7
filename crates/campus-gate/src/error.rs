//! Error types for campus-gate
//!
//! The gate itself never fails: every input resolves to a decision. Errors
//! exist only at the collaborator seams:
//! - Profile store access (transient, recovered through the cache)
//! - Registration and login outcome
//! - Administrator approval
//! - Configuration loading
//! - Session driver plumbing

use crate::types::Uid;
use std::path::PathBuf;

/// Errors reported by a profile store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("profile store unavailable: {0}")]
    Unavailable(String),

    /// Store did not answer in time
    #[error("profile store timed out after {0}ms")]
    Timeout(u64),

    /// Record does not exist
    #[error("no profile for {0}")]
    NotFound(Uid),

    /// Any other backend failure
    #[error("profile store error: {0}")]
    Backend(String),
}

/// Errors during registration
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Password and confirmation differ
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Password below minimum length
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Required length
        min: usize,
    },

    /// Email missing or malformed
    #[error("invalid email address: '{0}'")]
    InvalidEmail(String),

    /// Identity already has a profile
    #[error("profile already exists for {0}")]
    AlreadyRegistered(Uid),

    /// Store failure while writing the profile
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors when routing a freshly signed-in user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    /// Signed in but no profile record exists
    #[error("profile not found")]
    ProfileNotFound,

    /// Stored role is not one of the known roles
    #[error("unknown role '{0}', contact an administrator")]
    UnknownRole(String),
}

/// Errors during administrator approval
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// Approver is not an approved admin
    #[error("{0} is not allowed to approve accounts")]
    NotAuthorized(Uid),

    /// Target profile does not exist
    #[error("no profile for {0}")]
    TargetNotFound(Uid),

    /// Target is already approved
    #[error("{0} is already approved")]
    AlreadyApproved(Uid),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the session driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Driver task has stopped
    #[error("session closed")]
    Closed,
}

/// Combined error
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Profile store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registration rejected
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Login could not be routed
    #[error("login error: {0}")]
    Login(#[from] LoginError),

    /// Approval rejected
    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Session driver stopped
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Scenario file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Scenario JSON is malformed
    #[error("scenario error: {0}")]
    Scenario(#[from] serde_json::Error),
}

/// Result type alias for campus-gate operations
pub type GateResult<T> = Result<T, GateError>;
