//! Contracts with host collaborators, checked with mocks

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::eq;
use proptest::prelude::*;
use roster_core::{
    AgentDirectoryCache, ManualClock, MemoryStore, PlatformError, PlatformHost, ReloadReason,
    RosterConfig, TelemetryEvent, TelemetrySink,
};
use roster_session::{CredentialVerifier, SessionManager, SessionServices};
use roster_test_utils::{agent, FakeAuthenticator, ScriptedDirectory, ToggleNetwork};
use std::sync::Arc;

mock! {
    pub Host {}

    #[async_trait]
    impl PlatformHost for Host {
        fn confirm(&self, prompt: &str) -> bool;
        fn is_standalone(&self) -> bool;
        fn request_reload(&self, reason: ReloadReason);
        async fn clear_offline_caches(&self) -> Result<usize, PlatformError>;
        async fn unregister_background_sync(&self) -> Result<usize, PlatformError>;
    }
}

mock! {
    pub Telemetry {}

    impl TelemetrySink for Telemetry {
        fn emit(&self, event: TelemetryEvent);
    }
}

fn manager(host: MockHost, telemetry: MockTelemetry) -> Arc<SessionManager> {
    SessionManager::new(
        RosterConfig::default(),
        SessionServices {
            directory: ScriptedDirectory::new(&[agent("V-12345678", "Ana", "1234")]),
            mirror: None,
            biometric: FakeAuthenticator::new(),
            host: Arc::new(host),
            network: ToggleNetwork::online(),
            telemetry: Arc::new(telemetry),
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            tab: Arc::new(MemoryStore::new()),
            durable: Arc::new(MemoryStore::new()),
        },
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn full_logout_reloads_once_without_prompting() {
    let mut host = MockHost::new();
    host.expect_is_standalone().return_const(false);
    host.expect_confirm().never();
    host.expect_request_reload()
        .with(eq(ReloadReason::FullLogout))
        .times(1)
        .return_const(());

    let mut telemetry = MockTelemetry::new();
    telemetry
        .expect_emit()
        .withf(|e| e.name == "login_success" && e.attribute("id") == Some("V-12345678"))
        .times(1)
        .return_const(());
    telemetry
        .expect_emit()
        .withf(|e| e.name == "logout" && e.attribute("full_purge") == Some("true"))
        .times(1)
        .return_const(());

    let manager = manager(host, telemetry);
    manager.sync().fetch_all().await;
    manager.login("V-12345678", "1234").unwrap();
    manager.logout(true);
}

#[tokio::test(start_paused = true)]
async fn declined_hard_reset_touches_nothing() {
    let mut host = MockHost::new();
    host.expect_is_standalone().return_const(false);
    host.expect_confirm().times(1).return_const(false);
    host.expect_clear_offline_caches().never();
    host.expect_unregister_background_sync().never();
    host.expect_request_reload().never();

    let mut telemetry = MockTelemetry::new();
    telemetry.expect_emit().never();

    let manager = manager(host, telemetry);
    assert!(!manager.hard_reset().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn failing_cache_cleanup_does_not_block_the_reset() {
    let mut host = MockHost::new();
    host.expect_is_standalone().return_const(true);
    host.expect_confirm().return_const(true);
    host.expect_clear_offline_caches()
        .returning(|| Err(PlatformError::Unsupported("no cache storage".into())));
    host.expect_unregister_background_sync().returning(|| Ok(0));
    host.expect_request_reload()
        .with(eq(ReloadReason::HardReset))
        .times(1)
        .return_const(());

    let mut telemetry = MockTelemetry::new();
    telemetry.expect_emit().return_const(());

    let manager = manager(host, telemetry);
    assert!(manager.hard_reset().await.unwrap());
}

proptest! {
    #[test]
    fn identifiers_resolve_through_their_digits(
        digits in "[1-9][0-9]{5,8}",
        prefix in prop::sample::select(vec!["V-", "E-", "v", ""]),
        pad in " {0,3}",
    ) {
        let id = format!("V-{digits}");
        let (cache, _writer) = AgentDirectoryCache::seeded(vec![agent(&id, "Ana", "1234")]);
        let verifier = CredentialVerifier::new(cache, ScriptedDirectory::new(&[]));

        let typed = format!("{pad}{prefix}{digits}{pad}");
        let resolved = verifier.verify(&typed, " 1234 ").unwrap();
        prop_assert_eq!(resolved.id, id);
        prop_assert!(verifier.verify(&typed, "4321").is_err());
    }

    #[test]
    fn short_digit_runs_never_match_by_digits(digits in "[0-9]{1,3}") {
        let (cache, _writer) = AgentDirectoryCache::seeded(vec![agent(&format!("V-{digits}"), "Ana", "1234")]);
        let verifier = CredentialVerifier::new(cache, ScriptedDirectory::new(&[]));
        prop_assert!(verifier.resolve(&digits).is_err());
    }
}
