//! Testing utilities for campus-gate
//!
//! Shared profile fixtures and session wiring.

#![allow(missing_docs)]

use campus_gate::collaborators::{MemoryIdentityProvider, MemoryProfileStore};
use campus_gate::{
    GateConfig, ProfileCache, ProfileState, Role, RoleValue, SessionDriver, SessionHandle,
    SessionProfile,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Fixed timestamp so fixtures compare equal across runs
pub fn fixed_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn profile(uid: &str, role: impl Into<RoleValue>, approved: bool) -> SessionProfile {
    SessionProfile::new(uid, format!("{uid}@campus.edu"), uid, role, fixed_time())
        .with_approved(approved)
}

pub fn approved(uid: &str, role: Role) -> SessionProfile {
    profile(uid, role, true)
}

pub fn present(role: impl Into<RoleValue>, approved: bool) -> ProfileState {
    ProfileState::Present(profile("fixture", role, approved))
}

/// A running session wired to in-memory collaborators
pub struct TestSession {
    pub identity: Arc<MemoryIdentityProvider>,
    pub store: Arc<MemoryProfileStore>,
    pub cache: ProfileCache,
    pub handle: SessionHandle,
}

pub fn spawn_session(config: &GateConfig, store: MemoryProfileStore) -> TestSession {
    let identity = Arc::new(MemoryIdentityProvider::new());
    let store = Arc::new(store);
    let cache = ProfileCache::from_config(config);
    let handle = SessionDriver::new(config, identity.clone(), store.clone(), cache.clone())
        .spawn(config.event_buffer);
    TestSession {
        identity,
        store,
        cache,
        handle,
    }
}
