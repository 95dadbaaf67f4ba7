//! Session/role gate
//!
//! A pure decision function: given whether an identity is signed in, the
//! profile load state and the roles a screen permits, decide whether the
//! screen renders, redirects or waits. The gate performs no I/O; callers
//! re-run it whenever one of its inputs changes.

use crate::types::{ProfileState, Role};
use serde::Serialize;

/// Login screen
pub const LOGIN_PATH: &str = "/login";

/// Screen shown to accounts awaiting administrator approval
pub const APPROVAL_WAITING_PATH: &str = "/approval-waiting";

/// Application root
pub const ROOT_PATH: &str = "/";

/// Outcome of a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum GateDecision {
    /// Mount the requested screen
    Render,
    /// Navigate elsewhere
    Redirect(&'static str),
    /// Render nothing observable yet
    Wait,
}

impl GateDecision {
    /// Redirect target, if this is a redirect
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<&'static str> {
        match self {
            GateDecision::Redirect(target) => Some(target),
            _ => None,
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDecision::Render => f.write_str("RENDER"),
            GateDecision::Redirect(target) => write!(f, "REDIRECT({target})"),
            GateDecision::Wait => f.write_str("WAIT"),
        }
    }
}

/// Everything the gate looks at
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    /// An identity is signed in
    pub authenticated: bool,
    /// Profile load state
    pub profile: &'a ProfileState,
    /// Roles the screen permits; empty means any approved user
    pub permitted: &'a [Role],
}

impl<'a> GateInput<'a> {
    /// Create input for a screen open to any approved user
    #[inline]
    #[must_use]
    pub fn new(authenticated: bool, profile: &'a ProfileState) -> Self {
        Self {
            authenticated,
            profile,
            permitted: &[],
        }
    }

    /// Restrict to roles
    #[inline]
    #[must_use]
    pub fn permitting(mut self, permitted: &'a [Role]) -> Self {
        self.permitted = permitted;
        self
    }
}

/// Decide what a requested screen should do.
///
/// Rules are priority ordered, first match wins:
/// 1. profile still loading: wait
/// 2. nobody signed in: login
/// 3. no profile record: login
/// 4. not approved: approval waiting screen
/// 5. role outside a non-empty permitted set: the role's own dashboard,
///    or login when the stored role is not a known one
/// 6. render
#[must_use]
pub fn evaluate(input: &GateInput<'_>) -> GateDecision {
    let profile = match input.profile {
        ProfileState::Pending => return GateDecision::Wait,
        ProfileState::Absent => None,
        ProfileState::Present(profile) => Some(profile),
    };

    if !input.authenticated {
        return GateDecision::Redirect(LOGIN_PATH);
    }

    let Some(profile) = profile else {
        return GateDecision::Redirect(LOGIN_PATH);
    };

    if !profile.approved {
        return GateDecision::Redirect(APPROVAL_WAITING_PATH);
    }

    if input.permitted.is_empty() || profile.role.is_one_of(input.permitted) {
        GateDecision::Render
    } else {
        GateDecision::Redirect(profile.role.dashboard_path())
    }
}

/// Where a signed-in user lands when asking for the application root.
///
/// Follows the gate's priority order; an approved profile lands on its own
/// dashboard instead of rendering the root.
#[must_use]
pub fn landing(authenticated: bool, profile: &ProfileState) -> GateDecision {
    match evaluate(&GateInput::new(authenticated, profile)) {
        GateDecision::Render => match profile.profile() {
            Some(p) => GateDecision::Redirect(p.role.dashboard_path()),
            None => GateDecision::Redirect(LOGIN_PATH),
        },
        other => other,
    }
}
