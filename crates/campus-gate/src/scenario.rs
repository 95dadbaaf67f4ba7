//! Deterministic session replays
//!
//! A scenario is a JSON list of session events plus the path being
//! requested. Replaying it drives a [`SessionContext`] directly, with fetch
//! results supplied by the scenario instead of a live store, and records the
//! gate decision after every step.

use crate::cache::ProfileCache;
use crate::config::GateConfig;
use crate::error::{GateError, GateResult, StoreError};
use crate::gate::GateDecision;
use crate::routes::RouteTable;
use crate::session::{FetchTicket, Followup, SessionContext, SessionEvent};
use crate::types::{Identity, SessionProfile, Uid};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One scripted step
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Step {
    /// Identity provider reports a sign-in (or token refresh for the same uid)
    SignedIn {
        /// Subject
        uid: Uid,
    },
    /// Identity provider reports a sign-out
    SignedOut,
    /// Store returned a profile
    ProfileLoaded {
        /// Returned record
        profile: SessionProfile,
    },
    /// Store has no record
    ProfileMissing {
        /// Subject
        uid: Uid,
    },
    /// Store could not be reached
    FetchFailed {
        /// Subject
        uid: Uid,
        /// Failure description
        #[serde(default = "default_failure")]
        reason: String,
    },
    /// Reachability changed
    Connectivity {
        /// New state
        online: bool,
    },
}

fn default_failure() -> String {
    "unreachable".to_string()
}

impl Step {
    fn label(&self) -> String {
        match self {
            Step::SignedIn { uid } => format!("signed_in({uid})"),
            Step::SignedOut => "signed_out".to_string(),
            Step::ProfileLoaded { profile } => format!("profile_loaded({})", profile.uid),
            Step::ProfileMissing { uid } => format!("profile_missing({uid})"),
            Step::FetchFailed { uid, .. } => format!("fetch_failed({uid})"),
            Step::Connectivity { online } => format!("connectivity({online})"),
        }
    }

    /// Scripted fetch results answer the latest fetch the session issued for
    /// that uid; with none outstanding they are unsolicited and ignored.
    fn into_event(self, outstanding: Option<&FetchTicket>) -> SessionEvent {
        let answering = |uid: Uid| match outstanding {
            Some(ticket) if ticket.uid == uid => ticket.clone(),
            _ => FetchTicket::unsolicited(uid),
        };
        match self {
            Step::SignedIn { uid } => SessionEvent::IdentityChanged(Some(Identity { uid, email: None })),
            Step::SignedOut => SessionEvent::IdentityChanged(None),
            Step::ProfileLoaded { profile } => SessionEvent::ProfileFetched {
                ticket: answering(profile.uid.clone()),
                result: Ok(Some(profile)),
            },
            Step::ProfileMissing { uid } => SessionEvent::ProfileFetched {
                ticket: answering(uid),
                result: Ok(None),
            },
            Step::FetchFailed { uid, reason } => SessionEvent::ProfileFetched {
                ticket: answering(uid),
                result: Err(StoreError::Unavailable(reason)),
            },
            Step::Connectivity { online } => SessionEvent::ConnectivityChanged(online),
        }
    }
}

/// A scripted session
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Requested path, evaluated after each step
    pub path: String,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// Decision recorded after one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayLine {
    /// Step number, starting at 1
    pub step: usize,
    /// Short description of the step
    pub event: String,
    /// Gate decision for the scenario path
    pub decision: GateDecision,
    /// Profile fetch the session asked for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<Uid>,
}

impl Scenario {
    /// Parse scenario JSON
    pub fn from_json(text: &str) -> GateResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a scenario file
    pub fn from_file(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| GateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Replay against a fresh session
    ///
    /// The cache is memory-only so a replay never touches a configured
    /// profile snapshot.
    pub async fn replay(&self, config: &GateConfig, routes: &RouteTable) -> Vec<ReplayLine> {
        let mut context = SessionContext::new(ProfileCache::in_memory(config), config);
        let mut outstanding: Option<FetchTicket> = None;
        let mut lines = Vec::with_capacity(self.steps.len() + 1);

        lines.push(ReplayLine {
            step: 0,
            event: "start".to_string(),
            decision: context.snapshot().resolve(routes, &self.path),
            fetch: None,
        });

        for (index, step) in self.steps.iter().cloned().enumerate() {
            let label = step.label();
            let fetch = match context.apply(step.into_event(outstanding.as_ref())).await {
                Followup::Fetch(ticket) => {
                    let uid = ticket.uid.clone();
                    outstanding = Some(ticket);
                    Some(uid)
                }
                Followup::None => None,
            };
            lines.push(ReplayLine {
                step: index + 1,
                event: label,
                decision: context.snapshot().resolve(routes, &self.path),
                fetch,
            });
        }

        lines
    }
}
