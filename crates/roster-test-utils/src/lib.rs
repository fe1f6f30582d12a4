//! Testing utilities for the roster workspace
//!
//! Scripted collaborators, fixtures and a log capture layer.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use roster_core::{
    Agent, Assertion, AssertionOptions, BiometricProvider, CeremonyError, DirectoryError,
    NetworkReachability, NotificationPreferences, PlatformError, PlatformHost, PromotionRequest,
    RegistrationOptions, ReloadReason, RemoteDirectory, ResetResponse, RosterMirror, SecretChange,
    TelemetryEvent, TelemetrySink,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Agent with a PIN and the default rank
pub fn agent(id: &str, name: &str, pin: &str) -> Agent {
    Agent::new(id, name).with_secret(pin)
}

/// Directory row for `agent`, using the backend's Spanish headers
pub fn agent_row(agent: &Agent) -> Value {
    json!({
        "ID": agent.id,
        "Nombre": agent.name,
        "PIN": agent.secret.expose(),
        "Rango": agent.rank,
        "Biblia": agent.experience.biblical,
        "Apuntes": agent.experience.participatory,
        "Liderazgo": agent.experience.leadership,
        "Certificados": agent.certificates,
        "Nivel de Acceso": agent.access_level,
        "Pregunta": agent.security_question,
        "Respuesta": agent.security_answer.expose(),
        "biometric_credential": agent.biometric_credential.clone().unwrap_or_default(),
        "notif_prefs": agent.notification_prefs,
    })
}

/// Object-array roster payload
pub fn roster_value(agents: &[Agent]) -> Value {
    Value::Array(agents.iter().map(agent_row).collect())
}

/// Header-row matrix payload with the same content as `roster_value`
pub fn roster_matrix(agents: &[Agent]) -> Value {
    let headers = ["ID", "Nombre", "PIN", "Rango", "Biblia", "Apuntes", "Liderazgo"];
    let mut rows = vec![json!(headers)];
    rows.extend(agents.iter().map(|a| {
        json!([
            a.id,
            a.name,
            a.secret.expose(),
            a.rank,
            a.experience.biblical,
            a.experience.participatory,
            a.experience.leadership
        ])
    }));
    Value::Array(rows)
}

// ---------------------------------------------------------------------------
// Remote directory
// ---------------------------------------------------------------------------

/// One scripted `fetch` reply
#[derive(Debug, Clone)]
pub enum Scripted {
    Roster(Value),
    Fail(String),
}

/// In-memory directory recording every write
#[derive(Debug, Default)]
pub struct ScriptedDirectory {
    roster: Mutex<Value>,
    script: Mutex<VecDeque<Scripted>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    reset_reply: Mutex<ResetResponse>,
    fail_writes: AtomicBool,
    pub pref_pushes: Mutex<Vec<(String, NotificationPreferences)>>,
    pub promotions: Mutex<Vec<PromotionRequest>>,
    pub secret_changes: Mutex<Vec<SecretChange>>,
    pub registrations: Mutex<Vec<(String, String)>>,
    pub mirrored: Mutex<Vec<usize>>,
}

impl ScriptedDirectory {
    pub fn new(agents: &[Agent]) -> Arc<Self> {
        let directory = Self::default();
        *directory.roster.lock() = roster_value(agents);
        Arc::new(directory)
    }

    /// Replace the default roster reply
    pub fn set_roster(&self, agents: &[Agent]) {
        *self.roster.lock() = roster_value(agents);
    }

    /// Queue a reply ahead of the default roster
    pub fn push_reply(&self, reply: Scripted) {
        self.script.lock().push_back(reply);
    }

    /// Queue `n` transport failures
    pub fn fail_next(&self, n: usize) {
        for _ in 0..n {
            self.push_reply(Scripted::Fail("connection refused".into()));
        }
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    pub fn set_reset_reply(&self, reply: ResetResponse) {
        *self.reset_reply.lock() = reply;
    }

    /// Make every write action fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn write_result(&self) -> Result<(), DirectoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(DirectoryError::Status(503))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteDirectory for ScriptedDirectory {
    async fn fetch(&self) -> Result<Value, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Roster(value)) => Ok(value),
            Some(Scripted::Fail(reason)) => Err(DirectoryError::Transport(reason)),
            None => Ok(self.roster.lock().clone()),
        }
    }

    async fn reset_secret_by_answer(
        &self,
        _agent_id: &str,
        _answer: &str,
    ) -> Result<ResetResponse, DirectoryError> {
        self.write_result()?;
        Ok(self.reset_reply.lock().clone())
    }

    async fn promote(&self, request: &PromotionRequest) -> Result<(), DirectoryError> {
        self.write_result()?;
        self.promotions.lock().push(request.clone());
        Ok(())
    }

    async fn update_notification_prefs(
        &self,
        agent_id: &str,
        prefs: &NotificationPreferences,
    ) -> Result<(), DirectoryError> {
        self.write_result()?;
        self.pref_pushes
            .lock()
            .push((agent_id.to_string(), prefs.clone()));
        Ok(())
    }

    async fn update_secret(&self, change: &SecretChange) -> Result<(), DirectoryError> {
        self.write_result()?;
        self.secret_changes.lock().push(change.clone());
        Ok(())
    }

    async fn register_biometric(
        &self,
        agent_id: &str,
        handle: &str,
    ) -> Result<(), DirectoryError> {
        self.write_result()?;
        self.registrations
            .lock()
            .push((agent_id.to_string(), handle.to_string()));
        Ok(())
    }
}

#[async_trait]
impl RosterMirror for ScriptedDirectory {
    async fn push(&self, agents: &[Agent]) -> Result<usize, DirectoryError> {
        self.write_result()?;
        self.mirrored.lock().push(agents.len());
        Ok(agents.len())
    }
}

// ---------------------------------------------------------------------------
// Platform authenticator
// ---------------------------------------------------------------------------

/// Software authenticator with scriptable outcomes
#[derive(Debug)]
pub struct FakeAuthenticator {
    available: AtomicBool,
    hang: AtomicBool,
    probes: AtomicUsize,
    refuse_next: Mutex<Option<CeremonyError>>,
    credentials: Mutex<Vec<Vec<u8>>>,
    pub last_registration: Mutex<Option<RegistrationOptions>>,
    pub last_assertion: Mutex<Option<AssertionOptions>>,
}

impl Default for FakeAuthenticator {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            refuse_next: Mutex::new(None),
            credentials: Mutex::new(Vec::new()),
            last_registration: Mutex::new(None),
            last_assertion: Mutex::new(None),
        }
    }
}

impl FakeAuthenticator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unavailable() -> Arc<Self> {
        let fake = Self::default();
        fake.available.store(false, Ordering::SeqCst);
        Arc::new(fake)
    }

    /// Pre-register a raw credential id
    pub fn enroll(&self, raw_id: &[u8]) {
        self.credentials.lock().push(raw_id.to_vec());
    }

    /// Fail the next ceremony with `err`
    pub fn refuse_next(&self, err: CeremonyError) {
        *self.refuse_next.lock() = Some(err);
    }

    /// Never answer ceremonies
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), CeremonyError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.refuse_next.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BiometricProvider for FakeAuthenticator {
    async fn is_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn create_credential(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Vec<u8>, CeremonyError> {
        *self.last_registration.lock() = Some(options.clone());
        self.gate().await?;
        let mut credentials = self.credentials.lock();
        if options
            .exclude_credentials
            .iter()
            .any(|excluded| credentials.contains(excluded))
        {
            return Err(CeremonyError::AlreadyRegistered);
        }
        let mut raw_id = options.user_id.clone();
        raw_id.push(u8::try_from(credentials.len() % 256).unwrap_or_default());
        credentials.push(raw_id.clone());
        Ok(raw_id)
    }

    async fn get_assertion(&self, options: &AssertionOptions) -> Result<Assertion, CeremonyError> {
        *self.last_assertion.lock() = Some(options.clone());
        self.gate().await?;
        let credentials = self.credentials.lock();
        options
            .allow_credentials
            .iter()
            .find(|allowed| credentials.contains(allowed))
            .map(|raw_id| Assertion {
                credential_id: raw_id.clone(),
                user_verified: true,
            })
            .ok_or(CeremonyError::NotAllowed)
    }
}

// ---------------------------------------------------------------------------
// Host, network, telemetry
// ---------------------------------------------------------------------------

/// Host recording reload requests
#[derive(Debug, Default)]
pub struct RecordingHost {
    confirm: AtomicBool,
    standalone: AtomicBool,
    pub reloads: Mutex<Vec<ReloadReason>>,
    pub caches_cleared: AtomicUsize,
    pub sync_unregistered: AtomicUsize,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn confirming(confirm: bool) -> Arc<Self> {
        let host = Self::default();
        host.confirm.store(confirm, Ordering::SeqCst);
        Arc::new(host)
    }

    pub fn set_standalone(&self, standalone: bool) {
        self.standalone.store(standalone, Ordering::SeqCst);
    }

    pub fn reloads(&self) -> Vec<ReloadReason> {
        self.reloads.lock().clone()
    }
}

#[async_trait]
impl PlatformHost for RecordingHost {
    fn confirm(&self, _prompt: &str) -> bool {
        self.confirm.load(Ordering::SeqCst)
    }

    fn is_standalone(&self) -> bool {
        self.standalone.load(Ordering::SeqCst)
    }

    fn request_reload(&self, reason: ReloadReason) {
        self.reloads.lock().push(reason);
    }

    async fn clear_offline_caches(&self) -> Result<usize, PlatformError> {
        Ok(self.caches_cleared.fetch_add(2, Ordering::SeqCst) + 2)
    }

    async fn unregister_background_sync(&self) -> Result<usize, PlatformError> {
        Ok(self.sync_unregistered.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Reachability flipped by the test
#[derive(Debug)]
pub struct ToggleNetwork(AtomicBool);

impl ToggleNetwork {
    pub fn online() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl NetworkReachability for ToggleNetwork {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Telemetry sink keeping every event
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Layer keeping `(level, message)` for every event on the current thread
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    /// Number of events at exactly `level`
    pub fn count(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|(l, _)| *l == level).count()
    }

    /// Messages at `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events.lock().push((*event.metadata().level(), visitor.0));
    }
}

/// Capture logs for the current thread until the guard drops
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
