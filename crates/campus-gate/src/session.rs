//! Session context
//!
//! Replaces ambient "current user" state with an explicit object created at
//! start-up and torn down at sign-out. Identity changes and profile fetch
//! results arrive as discrete events; each one is applied on a single
//! evaluation path and the gate is re-run against the resulting snapshot.
//!
//! [`SessionContext`] is the synchronous-in-spirit state machine.
//! [`SessionDriver`] wires it to an [`IdentityProvider`] and a
//! [`ProfileStore`], performs fetches and publishes snapshots.

use crate::cache::ProfileCache;
use crate::collaborators::{IdentityProvider, ProfileStore};
use crate::config::GateConfig;
use crate::error::{SessionError, StoreError};
use crate::gate::{self, GateDecision, GateInput};
use crate::routes::RouteTable;
use crate::types::{Identity, ProfileState, Role, SessionProfile, Uid};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Input to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Identity provider reported a new current identity (or none)
    IdentityChanged(Option<Identity>),
    /// A profile fetch finished
    ProfileFetched {
        /// The fetch this result answers
        ticket: FetchTicket,
        /// Fetch outcome
        result: Result<Option<SessionProfile>, StoreError>,
    },
    /// Network reachability changed
    ConnectivityChanged(bool),
}

/// Identifies one issued profile fetch
///
/// Only the result carrying the most recently issued ticket is applied, so
/// overlapping fetches for the same identity cannot land out of order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    /// Identity the fetch was issued for
    pub uid: Uid,
    /// Issue order within the session, starting at 1
    pub seq: u64,
}

impl FetchTicket {
    /// Ticket for a result nobody asked for; never current
    #[inline]
    #[must_use]
    pub fn unsolicited(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            seq: 0,
        }
    }
}

/// Work the caller must do after applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    /// Nothing
    None,
    /// Fetch the profile and feed the result back with this ticket
    Fetch(FetchTicket),
}

impl Followup {
    /// Identity a fetch was requested for
    #[inline]
    #[must_use]
    pub fn fetch_uid(&self) -> Option<&Uid> {
        match self {
            Followup::Fetch(ticket) => Some(&ticket.uid),
            Followup::None => None,
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Signed-in identity
    pub identity: Option<Identity>,
    /// Profile load state
    pub profile: ProfileState,
    /// Last known reachability
    pub online: bool,
}

impl SessionSnapshot {
    /// Whether someone is signed in
    #[inline]
    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Run the gate for a permitted-role set
    #[must_use]
    pub fn decide(&self, permitted: &[Role]) -> GateDecision {
        gate::evaluate(&GateInput::new(self.authenticated(), &self.profile).permitting(permitted))
    }

    /// Resolve a request path through a route table
    #[must_use]
    pub fn resolve(&self, routes: &RouteTable, path: &str) -> GateDecision {
        routes.resolve(path, self.authenticated(), &self.profile)
    }
}

impl Default for SessionSnapshot {
    /// Start-up state: identity not reported yet, profile pending
    fn default() -> Self {
        Self {
            identity: None,
            profile: ProfileState::Pending,
            online: true,
        }
    }
}

/// Session state machine
#[derive(Debug)]
pub struct SessionContext {
    snapshot: SessionSnapshot,
    cache: ProfileCache,
    offline_fallback: bool,
    last_fetch: u64,
}

impl SessionContext {
    /// Create context in the start-up state
    #[must_use]
    pub fn new(cache: ProfileCache, config: &GateConfig) -> Self {
        Self {
            snapshot: SessionSnapshot::default(),
            cache,
            offline_fallback: config.offline_fallback,
            last_fetch: 0,
        }
    }

    /// Current snapshot
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Shared profile cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Gate decision for a permitted-role set
    #[inline]
    #[must_use]
    pub fn decide(&self, permitted: &[Role]) -> GateDecision {
        self.snapshot.decide(permitted)
    }

    /// Apply one event
    ///
    /// # Returns
    /// Follow-up work for the caller, usually a profile fetch
    pub async fn apply(&mut self, event: SessionEvent) -> Followup {
        match event {
            SessionEvent::IdentityChanged(Some(identity)) => self.signed_in(identity).await,
            SessionEvent::IdentityChanged(None) => {
                self.sign_out();
                Followup::None
            }
            SessionEvent::ProfileFetched { ticket, result } => {
                self.fetched(ticket, result).await;
                Followup::None
            }
            SessionEvent::ConnectivityChanged(online) => {
                let was_online = std::mem::replace(&mut self.snapshot.online, online);
                let refetch = match &self.snapshot.identity {
                    Some(identity) if online && !was_online => Some(identity.uid.clone()),
                    _ => None,
                };
                match refetch {
                    Some(uid) => {
                        tracing::info!(%uid, "back online, refreshing profile");
                        self.issue_fetch(uid)
                    }
                    None => Followup::None,
                }
            }
        }
    }

    /// Tear the session down: forget identity, profile and cached profiles
    pub fn sign_out(&mut self) {
        if let Some(identity) = self.snapshot.identity.take() {
            tracing::info!(uid = %identity.uid, "session ended");
        }
        self.snapshot.profile = ProfileState::Absent;
        self.cache.clear();
    }

    async fn signed_in(&mut self, identity: Identity) -> Followup {
        let uid = identity.uid.clone();
        let same_subject = self
            .snapshot
            .identity
            .as_ref()
            .is_some_and(|current| current.uid == uid);
        self.snapshot.identity = Some(identity);

        // A token refresh keeps the profile on screen while it is re-fetched;
        // a different subject must never see the previous subject's profile.
        if !same_subject {
            tracing::info!(%uid, "identity signed in");
            self.snapshot.profile = ProfileState::Pending;
        }

        if !self.snapshot.online && self.offline_fallback {
            if let Some(cached) = self.cache.lookup(&uid).await {
                tracing::info!(%uid, "offline, using cached profile");
                self.snapshot.profile = ProfileState::Present(cached);
                return Followup::None;
            }
        }

        self.issue_fetch(uid)
    }

    fn issue_fetch(&mut self, uid: Uid) -> Followup {
        self.last_fetch += 1;
        Followup::Fetch(FetchTicket {
            uid,
            seq: self.last_fetch,
        })
    }

    async fn fetched(
        &mut self,
        ticket: FetchTicket,
        result: Result<Option<SessionProfile>, StoreError>,
    ) {
        let current = self.snapshot.identity.as_ref().map(|i| &i.uid);
        if current != Some(&ticket.uid) || ticket.seq != self.last_fetch {
            tracing::debug!(
                uid = %ticket.uid,
                seq = ticket.seq,
                latest = self.last_fetch,
                "dropping stale profile fetch"
            );
            return;
        }
        let uid = ticket.uid;

        self.snapshot.profile = match result {
            Ok(Some(profile)) => {
                tracing::debug!(%uid, role = %profile.role, approved = profile.approved, "profile loaded");
                self.cache.store(profile.clone()).await;
                ProfileState::Present(profile)
            }
            Ok(None) => {
                tracing::info!(%uid, "no profile record for identity");
                self.cache.forget(&uid).await;
                ProfileState::Absent
            }
            Err(error) => {
                let cached = if self.offline_fallback {
                    self.cache.lookup(&uid).await
                } else {
                    None
                };
                match cached {
                    Some(profile) => {
                        tracing::warn!(%uid, %error, "profile fetch failed, using cached profile");
                        ProfileState::Present(profile)
                    }
                    None => {
                        tracing::warn!(%uid, %error, "profile fetch failed, no cached profile");
                        ProfileState::Absent
                    }
                }
            }
        };
    }
}

/// Handle to a running session driver
#[derive(Debug)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Feed an event from outside, e.g. a connectivity change
    pub async fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionSnapshot, SessionError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = match rx.wait_for(predicate).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => return Err(SessionError::Closed),
        };
        Ok(snapshot)
    }

    /// Stop the driver and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

/// Async driver for a [`SessionContext`]
pub struct SessionDriver {
    context: SessionContext,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    fetch_timeout: Duration,
}

impl SessionDriver {
    /// Create driver
    #[must_use]
    pub fn new(
        config: &GateConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        cache: ProfileCache,
    ) -> Self {
        Self {
            context: SessionContext::new(cache, config),
            identity,
            store,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Spawn the event loop on the current runtime
    #[must_use]
    pub fn spawn(self, event_buffer: usize) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(self.context.snapshot().clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(self.run(events_tx.clone(), events_rx, snapshot_tx, shutdown_rx));

        SessionHandle {
            events: events_tx,
            snapshots: snapshot_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(
        mut self,
        events_tx: mpsc::Sender<SessionEvent>,
        mut events_rx: mpsc::Receiver<SessionEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        // Subscribe before reading the current identity so nothing is missed.
        let mut identity_rx = self.identity.subscribe();
        let initial = SessionEvent::IdentityChanged(self.identity.current());
        self.step(initial, &events_tx, &snapshot_tx).await;

        loop {
            let event = tokio::select! {
                _ = &mut shutdown_rx => break,
                notification = identity_rx.recv() => match notification {
                    Ok(notification) => {
                        SessionEvent::IdentityChanged(notification.identity().cloned())
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "identity notifications lagged, re-reading provider");
                        SessionEvent::IdentityChanged(self.identity.current())
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(event) = events_rx.recv() => event,
            };
            self.step(event, &events_tx, &snapshot_tx).await;
        }

        tracing::debug!("session driver stopped");
    }

    async fn step(
        &mut self,
        event: SessionEvent,
        events_tx: &mpsc::Sender<SessionEvent>,
        snapshot_tx: &watch::Sender<SessionSnapshot>,
    ) {
        if let Followup::Fetch(ticket) = self.context.apply(event).await {
            self.spawn_fetch(ticket, events_tx.clone());
        }
        snapshot_tx.send_if_modified(|current| {
            if current == self.context.snapshot() {
                false
            } else {
                *current = self.context.snapshot().clone();
                true
            }
        });
    }

    fn spawn_fetch(&self, ticket: FetchTicket, events_tx: mpsc::Sender<SessionEvent>) {
        let store = Arc::clone(&self.store);
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, store.fetch(&ticket.uid)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };
            let _ = events_tx
                .send(SessionEvent::ProfileFetched { ticket, result })
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn context() -> SessionContext {
        SessionContext::new(ProfileCache::new(8), &GateConfig::default())
    }

    fn teacher(uid: &str) -> SessionProfile {
        SessionProfile::new(uid, format!("{uid}@campus.edu"), uid, Role::Teacher, Utc::now())
            .with_approved(true)
    }

    async fn sign_in(ctx: &mut SessionContext, uid: &str) -> FetchTicket {
        match ctx
            .apply(SessionEvent::IdentityChanged(Some(Identity::new(uid))))
            .await
        {
            Followup::Fetch(ticket) => ticket,
            Followup::None => panic!("sign-in for {uid} should request a fetch"),
        }
    }

    async fn deliver(
        ctx: &mut SessionContext,
        ticket: FetchTicket,
        result: Result<Option<SessionProfile>, StoreError>,
    ) {
        ctx.apply(SessionEvent::ProfileFetched { ticket, result }).await;
    }

    #[tokio::test]
    async fn starts_pending() {
        let ctx = context();
        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Wait);
    }

    #[tokio::test]
    async fn sign_in_requests_fetch() {
        let mut ctx = context();
        let ticket = sign_in(&mut ctx, "t1").await;
        assert_eq!(ticket.uid, Uid::new("t1"));
        assert_eq!(ticket.seq, 1);
        assert!(ctx.snapshot().profile.is_pending());
    }

    #[tokio::test]
    async fn fetch_success_renders_and_caches() {
        let mut ctx = context();
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Ok(Some(teacher("t1")))).await;

        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);
        assert!(ctx.cache().lookup(&Uid::new("t1")).await.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_cache() {
        let mut ctx = context();
        ctx.cache().store(teacher("t1")).await;
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Err(StoreError::Unavailable("offline".into()))).await;

        assert_eq!(ctx.decide(&[Role::Teacher, Role::Admin]), GateDecision::Render);
    }

    #[tokio::test]
    async fn fetch_failure_without_cache_is_absent() {
        let mut ctx = context();
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Err(StoreError::Timeout(5))).await;

        assert_eq!(ctx.snapshot().profile, ProfileState::Absent);
        assert_eq!(ctx.decide(&[]), GateDecision::Redirect(gate::LOGIN_PATH));
    }

    #[tokio::test]
    async fn fallback_disabled_ignores_cache() {
        let config = GateConfig::new().with_offline_fallback(false);
        let mut ctx = SessionContext::new(ProfileCache::new(8), &config);
        ctx.cache().store(teacher("t1")).await;
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Err(StoreError::Unavailable("offline".into()))).await;

        assert_eq!(ctx.snapshot().profile, ProfileState::Absent);
    }

    #[tokio::test]
    async fn missing_record_forgets_cache() {
        let mut ctx = context();
        ctx.cache().store(teacher("t1")).await;
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Ok(None)).await;

        assert_eq!(ctx.snapshot().profile, ProfileState::Absent);
        assert!(ctx.cache().lookup(&Uid::new("t1")).await.is_none());
    }

    #[tokio::test]
    async fn result_for_previous_identity_is_ignored() {
        let mut ctx = context();
        let first = sign_in(&mut ctx, "a").await;
        sign_in(&mut ctx, "b").await;
        deliver(&mut ctx, first, Ok(Some(teacher("a")))).await;

        assert!(ctx.snapshot().profile.is_pending());
    }

    #[tokio::test]
    async fn older_fetch_for_same_identity_cannot_overwrite_newer() {
        let mut ctx = context();
        let older = sign_in(&mut ctx, "t1").await;
        let newer = sign_in(&mut ctx, "t1").await;
        assert!(newer.seq > older.seq);

        deliver(&mut ctx, newer, Ok(Some(teacher("t1")))).await;
        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);

        deliver(&mut ctx, older, Ok(Some(teacher("t1").with_approved(false)))).await;
        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);
        let cached = ctx.cache().lookup(&Uid::new("t1")).await.unwrap();
        assert!(cached.approved);
    }

    #[tokio::test]
    async fn older_failure_cannot_replace_newer_profile() {
        let mut ctx = context();
        let older = sign_in(&mut ctx, "t1").await;
        let newer = sign_in(&mut ctx, "t1").await;

        deliver(&mut ctx, newer, Ok(Some(teacher("t1")))).await;
        deliver(&mut ctx, older, Ok(None)).await;

        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);
        assert!(ctx.cache().lookup(&Uid::new("t1")).await.is_some());
    }

    #[tokio::test]
    async fn unsolicited_result_is_ignored() {
        let mut ctx = context();
        sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, FetchTicket::unsolicited("t1"), Ok(Some(teacher("t1")))).await;

        assert!(ctx.snapshot().profile.is_pending());
    }

    #[tokio::test]
    async fn token_refresh_keeps_profile() {
        let mut ctx = context();
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket, Ok(Some(teacher("t1")))).await;

        let refresh = sign_in(&mut ctx, "t1").await;
        assert_eq!(refresh.uid, Uid::new("t1"));
        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);
    }

    #[tokio::test]
    async fn offline_sign_in_uses_cache_without_fetch() {
        let mut ctx = context();
        ctx.cache().store(teacher("t1")).await;
        ctx.apply(SessionEvent::ConnectivityChanged(false)).await;

        let followup = ctx
            .apply(SessionEvent::IdentityChanged(Some(Identity::new("t1"))))
            .await;
        assert_eq!(followup, Followup::None);
        assert_eq!(ctx.decide(&[Role::Teacher]), GateDecision::Render);

        let followup = ctx.apply(SessionEvent::ConnectivityChanged(true)).await;
        assert_eq!(followup.fetch_uid(), Some(&Uid::new("t1")));
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let mut ctx = context();
        let ticket = sign_in(&mut ctx, "t1").await;
        deliver(&mut ctx, ticket.clone(), Ok(Some(teacher("t1")))).await;
        ctx.apply(SessionEvent::IdentityChanged(None)).await;

        assert_eq!(ctx.decide(&[]), GateDecision::Redirect(gate::LOGIN_PATH));
        assert!(ctx.cache().lookup(&Uid::new("t1")).await.is_none());

        deliver(&mut ctx, ticket, Ok(Some(teacher("t1")))).await;
        assert_eq!(ctx.snapshot().profile, ProfileState::Absent);
    }
}
