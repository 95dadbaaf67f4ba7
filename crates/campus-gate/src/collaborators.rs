//! External collaborator seams
//!
//! The identity provider and the profile store are hosted services. The gate
//! only sees them through these traits. In-memory implementations back the
//! tests and the CLI.

use crate::error::StoreError;
use crate::types::{Identity, SessionProfile, Uid};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Notification from the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// A subject signed in
    SignedIn(Identity),
    /// The current subject signed out
    SignedOut,
    /// The current subject's token was refreshed
    TokenRefreshed(Identity),
}

impl IdentityEvent {
    /// Identity after this event
    #[inline]
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityEvent::SignedIn(identity) | IdentityEvent::TokenRefreshed(identity) => {
                Some(identity)
            }
            IdentityEvent::SignedOut => None,
        }
    }
}

/// Subscription to identity changes
pub type IdentityEvents = broadcast::Receiver<IdentityEvent>;

/// Source of "who is signed in"
pub trait IdentityProvider: Send + Sync {
    /// Current identity, if any
    fn current(&self) -> Option<Identity>;

    /// Subscribe to sign-in, sign-out and token refresh notifications
    fn subscribe(&self) -> IdentityEvents;

    /// End the current session
    fn sign_out(&self);
}

/// Store holding session profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for uid; `Ok(None)` when no record exists
    async fn fetch(&self, uid: &Uid) -> Result<Option<SessionProfile>, StoreError>;

    /// Write a profile record
    async fn put(&self, profile: SessionProfile) -> Result<(), StoreError>;

    /// Set the approval flag on an existing record
    async fn set_approved(&self, uid: &Uid) -> Result<SessionProfile, StoreError>;

    /// All profile records
    async fn list(&self) -> Result<Vec<SessionProfile>, StoreError>;
}

/// In-process identity provider
#[derive(Debug)]
pub struct MemoryIdentityProvider {
    current: RwLock<Option<Identity>>,
    events: broadcast::Sender<IdentityEvent>,
}

impl MemoryIdentityProvider {
    /// Create provider with nobody signed in
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            current: RwLock::new(None),
            events,
        }
    }

    /// Sign a subject in
    pub fn sign_in(&self, identity: Identity) {
        *self.current.write() = Some(identity.clone());
        self.publish(IdentityEvent::SignedIn(identity));
    }

    /// Refresh the current subject's token; no-op when signed out
    pub fn refresh(&self) {
        let current = self.current.read().clone();
        if let Some(identity) = current {
            self.publish(IdentityEvent::TokenRefreshed(identity));
        }
    }

    fn publish(&self, event: IdentityEvent) {
        // No receivers is fine: nobody is gating yet.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.current.read().clone()
    }

    fn subscribe(&self) -> IdentityEvents {
        self.events.subscribe()
    }

    fn sign_out(&self) {
        *self.current.write() = None;
        self.publish(IdentityEvent::SignedOut);
    }
}

/// In-process profile store
///
/// Can be switched offline to simulate an unreachable backend and given an
/// artificial latency to exercise fetch timeouts.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    records: Arc<DashMap<Uid, SessionProfile>>,
    offline: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl MemoryProfileStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With artificial latency on every call
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed a record without going through the async API
    pub fn insert(&self, profile: SessionProfile) {
        self.records.insert(profile.uid.clone(), profile);
    }

    /// Remove a record
    pub fn remove(&self, uid: &Uid) -> Option<SessionProfile> {
        self.records.remove(uid).map(|(_, p)| p)
    }

    /// Toggle reachability
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Check reachability
    #[must_use]
    pub fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store offline".to_string()))
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch(&self, uid: &Uid) -> Result<Option<SessionProfile>, StoreError> {
        self.round_trip().await?;
        Ok(self.records.get(uid).map(|entry| entry.value().clone()))
    }

    async fn put(&self, profile: SessionProfile) -> Result<(), StoreError> {
        self.round_trip().await?;
        self.insert(profile);
        Ok(())
    }

    async fn set_approved(&self, uid: &Uid) -> Result<SessionProfile, StoreError> {
        self.round_trip().await?;
        let mut entry = self
            .records
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(uid.clone()))?;
        entry.approved = true;
        Ok(entry.value().clone())
    }

    async fn list(&self) -> Result<Vec<SessionProfile>, StoreError> {
        self.round_trip().await?;
        Ok(self.records.iter().map(|e| e.value().clone()).collect())
    }
}
