//! Sync engine behaviour against a scripted directory

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use roster_core::store::keys;
use roster_core::{
    Agent, AgentDirectoryCache, ExperienceComponents, KeyValueStore, LoginMethod, ManualClock,
    MemoryStore, SessionCell, SyncPolicy,
};
use roster_directory::{AgentMapper, SyncEngine};
use roster_test_utils::{agent, capture_logs, roster_matrix, roster_value, Scripted, ScriptedDirectory};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

const T0: u64 = 1_700_000_000_000;

struct Fixture {
    engine: Arc<SyncEngine>,
    cache: AgentDirectoryCache,
    directory: Arc<ScriptedDirectory>,
    session: Arc<SessionCell>,
    tab: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn roster() -> Vec<Agent> {
    vec![
        agent("V-1001", "Ana", "1234").with_experience(ExperienceComponents::new(40, 30, 20)),
        agent("V-1002", "Luis", "5678"),
    ]
}

fn fixture() -> Fixture {
    fixture_with(|engine| engine)
}

fn fixture_with(configure: impl FnOnce(SyncEngine) -> SyncEngine) -> Fixture {
    let directory = ScriptedDirectory::new(&roster());
    let (cache, writer) = AgentDirectoryCache::new();
    let tab = Arc::new(MemoryStore::new());
    let session = Arc::new(SessionCell::new(tab.clone()));
    let clock = Arc::new(ManualClock::new(T0));
    let engine = SyncEngine::new(
        directory.clone(),
        writer,
        session.clone(),
        clock.clone(),
        SyncPolicy::default(),
    );
    Fixture {
        engine: Arc::new(configure(engine)),
        cache,
        directory,
        session,
        tab,
        clock,
    }
}

#[tokio::test]
async fn failure_opens_a_backoff_window() {
    let f = fixture();
    f.directory.fail_next(1);

    assert!(f.engine.fetch_all().await.is_empty());
    assert_eq!(f.directory.fetch_count(), 1);
    assert_eq!(f.engine.sync_state().consecutive_failures, 1);

    f.clock.set(T0 + 100_000);
    assert!(f.engine.fetch_all().await.is_empty());
    assert_eq!(f.directory.fetch_count(), 1);

    f.clock.set(T0 + 301_000);
    assert_eq!(f.engine.fetch_all().await.len(), 2);
    assert_eq!(f.directory.fetch_count(), 2);
    assert_eq!(f.cache.len(), 2);
    assert_eq!(f.engine.sync_state().last_error_ms, None);
}

#[tokio::test]
async fn reset_backoff_allows_an_immediate_retry() {
    let f = fixture();
    f.directory.fail_next(1);
    f.engine.fetch_all().await;
    f.engine.reset_backoff();
    assert_eq!(f.engine.fetch_all().await.len(), 2);
    assert_eq!(f.directory.fetch_count(), 2);
}

#[tokio::test]
async fn errors_are_logged_once_per_streak() {
    let (logs, _guard) = capture_logs();
    let f = fixture();
    f.directory.fail_next(2);

    f.engine.fetch_all().await;
    f.clock.set(T0 + 10_000);
    f.engine.fetch_all().await;
    assert_eq!(logs.count(Level::ERROR), 1);

    // past the window the second failure is quiet
    f.clock.set(T0 + 310_000);
    f.engine.fetch_all().await;
    assert_eq!(f.directory.fetch_count(), 2);
    assert_eq!(logs.count(Level::ERROR), 1);

    // a success ends the streak, the next failure is loud again
    f.clock.set(T0 + 620_000);
    f.engine.fetch_all().await;
    f.directory.fail_next(1);
    f.engine.fetch_all().await;
    assert_eq!(logs.count(Level::ERROR), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_request() {
    let f = fixture();
    f.directory.set_fetch_delay(Duration::from_secs(1));

    let (a, b) = tokio::join!(f.engine.fetch_all(), f.engine.fetch_all());
    assert_eq!(f.directory.fetch_count(), 1);
    assert_eq!(a.len() + b.len(), 2);
    assert!(!f.engine.sync_state().in_flight);
}

#[tokio::test(start_paused = true)]
async fn slow_directory_times_out_into_backoff() {
    let f = fixture();
    f.directory.set_fetch_delay(Duration::from_secs(20));
    assert!(f.engine.fetch_all().await.is_empty());
    assert!(f.engine.sync_state().last_error_ms.is_some());
    assert!(f.cache.is_empty());
}

#[tokio::test]
async fn empty_or_failed_payloads_keep_the_cache() {
    let f = fixture();
    f.engine.fetch_all().await;

    f.directory.push_reply(Scripted::Roster(json!([])));
    assert!(f.engine.fetch_all().await.is_empty());
    assert_eq!(f.cache.len(), 2);

    f.directory
        .push_reply(Scripted::Roster(json!({ "error": "sheet locked" })));
    assert!(f.engine.fetch_all().await.is_empty());
    assert_eq!(f.cache.len(), 2);
    assert_eq!(f.engine.sync_state().consecutive_failures, 1);
}

#[tokio::test]
async fn matrix_and_object_payloads_map_alike() {
    let f = fixture();
    f.directory.push_reply(Scripted::Roster(roster_matrix(&roster())));
    let from_matrix = f.engine.fetch_all().await;
    let from_objects = f.engine.fetch_all().await;

    assert_eq!(from_matrix.len(), 2);
    for (m, o) in from_matrix.iter().zip(&from_objects) {
        assert_eq!(m.id, o.id);
        assert_eq!(m.experience, o.experience);
        assert!(m.secret.matches(o.secret.expose()));
    }
    assert_eq!(from_matrix[0].experience_total(), 90);
}

#[tokio::test]
async fn live_session_follows_the_roster() {
    let f = fixture();
    f.session
        .establish(agent("V-1001", "Ana", "1234"), LoginMethod::Password, T0)
        .unwrap();

    f.engine.fetch_all().await;
    let live = f.session.agent().unwrap();
    assert_eq!(live.experience_total(), 90);

    let stored: Agent =
        serde_json::from_str(&f.tab.get(keys::SESSION_AGENT).unwrap().unwrap()).unwrap();
    assert_eq!(stored.experience_total(), 90);
}

#[tokio::test(start_paused = true)]
async fn mirror_push_is_debounced() {
    let directory = ScriptedDirectory::new(&[]);
    let mirror = directory.clone();
    let f = fixture_with(move |engine| engine.with_mirror(mirror));
    f.session
        .establish(agent("V-1001", "Ana", "1234"), LoginMethod::Password, T0)
        .unwrap();

    for _ in 0..3 {
        f.engine.fetch_all().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(directory.mirrored.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(directory.mirrored.lock().clone(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn mirror_is_skipped_after_logout() {
    let directory = ScriptedDirectory::new(&[]);
    let mirror = directory.clone();
    let f = fixture_with(move |engine| engine.with_mirror(mirror));
    f.session
        .establish(agent("V-1001", "Ana", "1234"), LoginMethod::Password, T0)
        .unwrap();

    f.engine.fetch_all().await;
    f.session.destroy();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(directory.mirrored.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refresh_subscription_fetches_at_once_then_polls_until_dropped() {
    let f = fixture();
    let subscription = f.engine.spawn_refresh();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(f.directory.fetch_count(), 1);
    assert_eq!(f.cache.len(), 2);
    tokio::time::sleep(Duration::from_millis(59_000)).await;
    assert_eq!(f.directory.fetch_count(), 1);
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(f.directory.fetch_count(), 2);

    drop(subscription);
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(f.directory.fetch_count(), 2);
}

proptest! {
    #[test]
    fn experience_is_the_sum_of_components(
        biblical in 0u32..10_000,
        participatory in 0u32..10_000,
        leadership in 0u32..10_000,
    ) {
        let source = agent("V-1", "Ana", "1234")
            .with_experience(ExperienceComponents::new(biblical, participatory, leadership));
        let mapped = AgentMapper::default()
            .map_roster(roster_value(&[source]))
            .unwrap();
        prop_assert_eq!(
            mapped[0].experience_total(),
            u64::from(biblical) + u64::from(participatory) + u64::from(leadership)
        );
    }
}
