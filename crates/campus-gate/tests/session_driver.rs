//! Session driver tests against in-memory collaborators.
//!
//! These exercise the asynchronous path: identity notifications, real fetches
//! with timeouts, cache fallback and teardown.

use campus_gate::collaborators::{IdentityProvider, MemoryProfileStore};
use campus_gate::gate::{APPROVAL_WAITING_PATH, LOGIN_PATH};
use campus_gate::routes::STAFF;
use campus_gate::{GateConfig, GateDecision, Identity, ProfileState, Role, RouteTable, SessionEvent, Uid};
use campus_gate_test_utils::{approved, profile, spawn_session};
use std::time::Duration;

fn settled(snapshot: &campus_gate::SessionSnapshot) -> bool {
    snapshot.identity.is_some() && !snapshot.profile.is_pending()
}

#[tokio::test]
async fn starts_waiting_then_redirects_anonymous_to_login() {
    let session = spawn_session(&GateConfig::default(), MemoryProfileStore::new());

    let snapshot = session
        .handle
        .wait_for(|s| !s.profile.is_pending())
        .await
        .unwrap();
    assert_eq!(snapshot.decide(STAFF), GateDecision::Redirect(LOGIN_PATH));

    session.handle.shutdown().await;
}

#[tokio::test]
async fn sign_in_loads_profile_and_renders() {
    let store = MemoryProfileStore::new();
    store.insert(approved("t1", Role::Teacher));
    let session = spawn_session(&GateConfig::default(), store);

    session.identity.sign_in(Identity::new("t1"));
    let snapshot = session.handle.wait_for(settled).await.unwrap();

    let routes = RouteTable::standard();
    assert_eq!(snapshot.resolve(&routes, "/teacher/grades"), GateDecision::Render);
    assert_eq!(
        snapshot.resolve(&routes, "/admin/users"),
        GateDecision::Redirect("/teacher-dashboard")
    );
    assert!(session.cache.lookup(&Uid::new("t1")).await.is_some());

    session.handle.shutdown().await;
}

#[tokio::test]
async fn unapproved_staff_waits_for_approval() {
    let store = MemoryProfileStore::new();
    store.insert(profile("a1", Role::Admin, false));
    let session = spawn_session(&GateConfig::default(), store);

    session.identity.sign_in(Identity::new("a1"));
    let snapshot = session.handle.wait_for(settled).await.unwrap();

    assert_eq!(
        snapshot.decide(&[Role::Admin]),
        GateDecision::Redirect(APPROVAL_WAITING_PATH)
    );

    session.handle.shutdown().await;
}

#[tokio::test]
async fn missing_profile_goes_to_login() {
    let session = spawn_session(&GateConfig::default(), MemoryProfileStore::new());

    session.identity.sign_in(Identity::new("ghost"));
    let snapshot = session.handle.wait_for(settled).await.unwrap();

    assert_eq!(snapshot.profile, ProfileState::Absent);
    assert_eq!(snapshot.decide(&[]), GateDecision::Redirect(LOGIN_PATH));

    session.handle.shutdown().await;
}

#[tokio::test]
async fn unreachable_store_falls_back_to_cached_profile() {
    let session = spawn_session(&GateConfig::default(), MemoryProfileStore::new());
    // Start-up with nobody signed in clears the cache, so seed it afterwards.
    session
        .handle
        .wait_for(|s| !s.profile.is_pending())
        .await
        .unwrap();
    session.cache.store(approved("t1", Role::Teacher)).await;
    session.store.set_online(false);

    session.identity.sign_in(Identity::new("t1"));
    let snapshot = session.handle.wait_for(settled).await.unwrap();

    assert_eq!(
        snapshot.profile.profile().map(|p| p.uid.clone()),
        Some(Uid::new("t1"))
    );
    assert_eq!(snapshot.decide(STAFF), GateDecision::Render);

    session.handle.shutdown().await;
}

#[tokio::test]
async fn slow_store_times_out_and_resolves_absent() {
    let store = MemoryProfileStore::new().with_latency(Duration::from_millis(500));
    store.insert(approved("t1", Role::Teacher));
    let config = GateConfig::new().with_fetch_timeout(Duration::from_millis(20));
    let session = spawn_session(&config, store);

    session.identity.sign_in(Identity::new("t1"));
    let snapshot = session.handle.wait_for(settled).await.unwrap();

    assert_eq!(snapshot.profile, ProfileState::Absent);
    assert_eq!(snapshot.decide(STAFF), GateDecision::Redirect(LOGIN_PATH));

    session.handle.shutdown().await;
}

#[tokio::test]
async fn sign_out_tears_down_session() {
    let store = MemoryProfileStore::new();
    store.insert(approved("s1", Role::Student));
    let session = spawn_session(&GateConfig::default(), store);

    session.identity.sign_in(Identity::new("s1"));
    session.handle.wait_for(settled).await.unwrap();

    session.identity.sign_out();
    let snapshot = session
        .handle
        .wait_for(|s| s.identity.is_none() && s.profile == ProfileState::Absent)
        .await
        .unwrap();

    assert_eq!(snapshot.decide(&[Role::Student]), GateDecision::Redirect(LOGIN_PATH));
    assert!(session.cache.lookup(&Uid::new("s1")).await.is_none());
    assert!(session.identity.current().is_none());

    session.handle.shutdown().await;
}

#[tokio::test]
async fn switching_identity_never_shows_previous_profile() {
    let store = MemoryProfileStore::new().with_latency(Duration::from_millis(30));
    store.insert(approved("admin", Role::Admin));
    store.insert(approved("kid", Role::Student));
    let session = spawn_session(&GateConfig::default(), store);

    session.identity.sign_in(Identity::new("admin"));
    session.handle.wait_for(settled).await.unwrap();

    session.identity.sign_in(Identity::new("kid"));
    let snapshot = session
        .handle
        .wait_for(|s| {
            s.identity.as_ref().map(|i| i.uid.as_str()) == Some("kid") && !s.profile.is_pending()
        })
        .await
        .unwrap();

    assert_eq!(
        snapshot.decide(&[Role::Admin]),
        GateDecision::Redirect("/student-dashboard")
    );

    session.handle.shutdown().await;
}

#[tokio::test]
async fn reconnect_triggers_refetch() {
    let store = MemoryProfileStore::new();
    store.insert(profile("t1", Role::Teacher, false));
    let session = spawn_session(&GateConfig::default(), store);

    session.identity.sign_in(Identity::new("t1"));
    session.handle.wait_for(settled).await.unwrap();

    // Approved while the client was offline.
    session
        .handle
        .send(SessionEvent::ConnectivityChanged(false))
        .await
        .unwrap();
    session.store.insert(approved("t1", Role::Teacher));
    session
        .handle
        .send(SessionEvent::ConnectivityChanged(true))
        .await
        .unwrap();

    let snapshot = session
        .handle
        .wait_for(|s| s.profile.profile().is_some_and(|p| p.approved))
        .await
        .unwrap();
    assert_eq!(snapshot.decide(STAFF), GateDecision::Render);

    session.handle.shutdown().await;
}

#[tokio::test]
async fn lagging_behind_identity_notifications_rereads_provider() {
    let store = MemoryProfileStore::new();
    store.insert(approved("final", Role::Admin));
    let session = spawn_session(&GateConfig::default(), store);
    session
        .handle
        .wait_for(|s| !s.profile.is_pending())
        .await
        .unwrap();

    // More notifications than the provider buffers, sent without yielding.
    for n in 0..100 {
        session.identity.sign_in(Identity::new(format!("u{n}")));
    }
    session.identity.sign_in(Identity::new("final"));

    let snapshot = session
        .handle
        .wait_for(|s| {
            s.identity.as_ref().map(|i| i.uid.as_str()) == Some("final") && !s.profile.is_pending()
        })
        .await
        .unwrap();
    assert_eq!(snapshot.decide(&[Role::Admin]), GateDecision::Render);

    session.handle.shutdown().await;
}
