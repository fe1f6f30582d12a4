//! Session manager
//!
//! Owns the login → active → logout lifecycle:
//! - `login` / `login_with_biometric` establish the session and start the
//!   watchdog and roster refresh subscriptions
//! - `tick` runs the offline watchdog and the idle state machine
//! - `logout` / `hard_reset` end the session, purge local state and ask the
//!   host to reload
//! - `restore` resumes a session left by a previous page life
//!
//! Every async effect captures the session epoch and drops its result when
//! the session it belonged to is gone.

use crate::biometric::BiometricAuthenticator;
use crate::credentials::{CredentialVerifier, RevealedSecret};
use crate::idle::{ActivityEvent, IdleMonitor, IdleState, OfflineVerdict, OfflineWatchdog};
use crate::persistence::SessionStore;
use crate::reconciler::NotificationReconciler;
use parking_lot::Mutex;
use roster_core::promotion::{self, PromotionProgress, PromotionRecord};
use roster_core::{
    Agent, AgentDirectoryCache, BiometricProvider, Clock, KeyValueStore, LoginMethod,
    NetworkReachability, PlatformHost, PromotionRequest, ReloadReason, RememberedIdentity,
    RemoteDirectory, RosterConfig, RosterError, RosterMirror, SecretChange, Session, SessionCell,
    Subscription, Subscriptions, TelemetryEvent, TelemetrySink,
};
use roster_directory::{AgentMapper, SyncEngine};
use std::sync::{Arc, Weak};
use std::time::Duration;

const HARD_RESET_PROMPT: &str =
    "This erases every local record, cache and background task on this device. Continue?";

/// Collaborators supplied by the host application
#[derive(Clone)]
pub struct SessionServices {
    /// Authoritative member directory
    pub directory: Arc<dyn RemoteDirectory>,
    /// Secondary roster store, if any
    pub mirror: Option<Arc<dyn RosterMirror>>,
    /// Platform authenticator
    pub biometric: Arc<dyn BiometricProvider>,
    /// Embedding application
    pub host: Arc<dyn PlatformHost>,
    /// Reachability signal
    pub network: Arc<dyn NetworkReachability>,
    /// Analytics sink
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Tab-scoped store
    pub tab: Arc<dyn KeyValueStore>,
    /// Durable store
    pub durable: Arc<dyn KeyValueStore>,
}

/// What `restore` found
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Resumed session
    pub session: Option<Session>,
    /// A snapshot existed but its idle window had passed
    pub expired: bool,
    /// Quick-login reference
    pub remembered: Option<RememberedIdentity>,
    /// Identifier of the last successful login
    pub last_login_id: Option<String>,
}

/// Session lifecycle owner
pub struct SessionManager {
    config: RosterConfig,
    cell: Arc<SessionCell>,
    cache: AgentDirectoryCache,
    credentials: CredentialVerifier,
    biometric: BiometricAuthenticator,
    sync: Arc<SyncEngine>,
    notifications: NotificationReconciler,
    directory: Arc<dyn RemoteDirectory>,
    store: SessionStore,
    offline: OfflineWatchdog,
    idle: IdleMonitor,
    host: Arc<dyn PlatformHost>,
    network: Arc<dyn NetworkReachability>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    subscriptions: Mutex<Subscriptions>,
    idle_state: Mutex<Option<IdleState>>,
    last_error: Mutex<Option<&'static str>>,
    this: Weak<SessionManager>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("agent", &self.cell.agent_id())
            .field("idle_state", &*self.idle_state.lock())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Wire the session subsystem. Must be called inside a tokio runtime.
    pub fn new(config: RosterConfig, services: SessionServices) -> Result<Arc<Self>, RosterError> {
        config.validate()?;
        let mapper = AgentMapper::new(&config.role_rules)?;
        let (cache, writer) = AgentDirectoryCache::new();
        let cell = Arc::new(SessionCell::new(Arc::clone(&services.tab)));

        let mut sync = SyncEngine::new(
            Arc::clone(&services.directory),
            writer,
            Arc::clone(&cell),
            Arc::clone(&services.clock),
            config.sync,
        )
        .with_mapper(mapper);
        if let Some(mirror) = services.mirror.clone() {
            sync = sync.with_mirror(mirror);
        }

        let standalone = config.session.standalone || services.host.is_standalone();
        let store = SessionStore::new(Arc::clone(&services.tab), Arc::clone(&services.durable));
        store.mark_version(&config.app_version)?;

        Ok(Arc::new_cyclic(|this| Self {
            credentials: CredentialVerifier::new(cache.clone(), Arc::clone(&services.directory)),
            biometric: BiometricAuthenticator::new(
                Arc::clone(&services.biometric),
                config.biometric.clone(),
            ),
            notifications: NotificationReconciler::new(
                Arc::clone(&services.durable),
                Arc::clone(&services.directory),
                Duration::from_millis(config.notifications.push_debounce_ms),
            ),
            offline: OfflineWatchdog::new(
                config.session.offline_grace_ms,
                Arc::clone(&services.durable),
            ),
            idle: IdleMonitor::new(&config.session, standalone),
            sync: Arc::new(sync),
            cache,
            cell,
            store,
            directory: services.directory,
            host: services.host,
            network: services.network,
            telemetry: services.telemetry,
            clock: services.clock,
            subscriptions: Mutex::new(Subscriptions::new()),
            idle_state: Mutex::new(None),
            last_error: Mutex::new(None),
            this: this.clone(),
            config,
        }))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Live session, if any
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.cell.current()
    }

    /// Whether an agent is logged in
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.cell.is_logged_in()
    }

    /// Idle state at the last tick
    #[must_use]
    pub fn idle_state(&self) -> Option<IdleState> {
        *self.idle_state.lock()
    }

    /// Reason of the last failed login, cleared by a successful one
    #[must_use]
    pub fn last_login_error(&self) -> Option<&'static str> {
        *self.last_error.lock()
    }

    /// Roster cache (read only)
    #[must_use]
    pub fn cache(&self) -> &AgentDirectoryCache {
        &self.cache
    }

    /// Sync engine
    #[must_use]
    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// Credential verifier, for the reset flow
    #[must_use]
    pub fn credentials(&self) -> &CredentialVerifier {
        &self.credentials
    }

    /// Biometric authenticator
    #[must_use]
    pub fn biometric(&self) -> &BiometricAuthenticator {
        &self.biometric
    }

    /// Notification reconciler
    #[must_use]
    pub fn notifications(&self) -> &NotificationReconciler {
        &self.notifications
    }

    /// Number of running background subscriptions
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    fn session_agent(&self) -> Result<Agent, RosterError> {
        self.cell.agent().ok_or(RosterError::NoActiveSession)
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    fn login_failed(&self, identifier: &str, err: RosterError) -> RosterError {
        *self.last_error.lock() = Some(err.reason());
        tracing::warn!(identifier, reason = err.reason(), "login failed");
        self.telemetry.emit(
            TelemetryEvent::new("login_fail")
                .with("id", identifier.trim())
                .with("reason", err.reason()),
        );
        err
    }

    fn establish(&self, agent: Agent, method: LoginMethod, active_ms: u64) -> Result<Session, RosterError> {
        let session = self.cell.establish(agent, method, active_ms)?;
        let agent = &session.agent;
        if method == LoginMethod::Restored {
            self.store.touch(active_ms)?;
        } else {
            self.store.remember(agent, active_ms)?;
        }
        self.offline.clear()?;
        if let Err(err) = self.notifications.bootstrap(agent) {
            tracing::warn!(agent_id = %agent.id, error = %err, "notification bootstrap failed");
        }
        *self.last_error.lock() = None;
        *self.idle_state.lock() = Some(IdleState::Active);
        self.start_subscriptions();

        tracing::info!(agent_id = %agent.id, session = %session.id, method = method.as_str(), "session started");
        let name = if method == LoginMethod::Restored {
            "session_restored"
        } else {
            "login_success"
        };
        self.telemetry.emit(
            TelemetryEvent::new(name)
                .with("id", agent.id.clone())
                .with("method", method.as_str()),
        );
        Ok(session)
    }

    /// Identifier + PIN login
    pub fn login(&self, identifier: &str, secret: &str) -> Result<Session, RosterError> {
        match self.credentials.verify(identifier, secret) {
            Ok(agent) => self.establish(agent, LoginMethod::Password, self.clock.now_ms()),
            Err(err) => Err(self.login_failed(identifier, err)),
        }
    }

    /// Platform authenticator login. Without an identifier the last login
    /// id is used.
    pub async fn login_with_biometric(&self, identifier: Option<&str>) -> Result<Session, RosterError> {
        let identifier = match identifier {
            Some(id) => id.to_string(),
            None => self.store.last_login_id()?.unwrap_or_default(),
        };
        let agent = match self.credentials.resolve_by_digits(&identifier) {
            Ok(agent) => agent,
            Err(err) => return Err(self.login_failed(&identifier, err)),
        };
        let Some(handle) = agent
            .biometric_credential
            .clone()
            .filter(|h| !h.trim().is_empty())
        else {
            return Err(self.login_failed(&identifier, RosterError::BiometricNotRegistered(agent.id)));
        };

        let epoch = self.cell.epoch();
        match self.biometric.verify(&handle).await {
            Ok(true) if self.cell.epoch() == epoch => {
                self.establish(agent, LoginMethod::Biometric, self.clock.now_ms())
            }
            Ok(true) => Err(self.login_failed(
                &identifier,
                RosterError::BiometricCeremonyFailed("session changed during ceremony".into()),
            )),
            Ok(false) => Err(self.login_failed(
                &identifier,
                RosterError::BiometricCeremonyFailed("user verification not confirmed".into()),
            )),
            Err(err) => Err(self.login_failed(&identifier, err)),
        }
    }

    // -----------------------------------------------------------------------
    // Background work
    // -----------------------------------------------------------------------

    fn start_subscriptions(&self) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.cancel_all();

        let this = self.this.clone();
        let period = Duration::from_millis(self.config.session.watchdog_tick_ms);
        subscriptions.push(Subscription::new(
            "session-watchdog",
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(manager) = this.upgrade() else { break };
                    if manager.tick().is_none() {
                        break;
                    }
                }
            }),
        ));
        subscriptions.push(self.sync.spawn_refresh());
    }

    /// Run the offline watchdog and the idle state machine once.
    ///
    /// Returns `None` when no session is live.
    pub fn tick(&self) -> Option<IdleState> {
        let last_active = self.cell.last_active_ms()?;
        let now = self.clock.now_ms();

        match self.offline.observe(self.network.is_online(), now) {
            Ok(OfflineVerdict::Expired) => {
                tracing::warn!(grace_ms = self.config.session.offline_grace_ms, "offline too long, logging out");
                self.telemetry.emit(TelemetryEvent::new("session_expired").with("cause", "offline"));
                self.logout(false);
                return Some(IdleState::Expired);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "offline watchdog store failed"),
        }

        let state = self.idle.evaluate(last_active, now);
        let previous = self.idle_state.lock().replace(state);
        match state {
            IdleState::Warning if previous != Some(IdleState::Warning) => {
                tracing::info!(
                    remaining_ms = self.idle.remaining_ms(last_active, now),
                    "session idle, logout pending"
                );
            }
            IdleState::Expired => {
                tracing::info!("idle window exhausted, logging out");
                self.telemetry.emit(TelemetryEvent::new("session_expired").with("cause", "idle"));
                self.logout(false);
            }
            _ => {}
        }
        Some(state)
    }

    /// Feed a host event; qualifying activity resets the idle clock
    pub fn record_activity(&self, event: ActivityEvent) -> bool {
        if !event.qualifies() {
            return false;
        }
        let now = self.clock.now_ms();
        if !self.cell.touch(now) {
            return false;
        }
        if let Err(err) = self.store.touch(now) {
            tracing::warn!(error = %err, "failed to persist activity");
        }
        *self.idle_state.lock() = Some(IdleState::Active);
        true
    }

    // -----------------------------------------------------------------------
    // Logout
    // -----------------------------------------------------------------------

    fn teardown(&self, full_purge: bool) -> Option<Session> {
        let ended = self.cell.destroy();
        self.subscriptions.lock().cancel_all();
        *self.idle_state.lock() = None;
        if let Some(session) = &ended {
            self.notifications.forget(&session.agent.id);
        }
        if let Err(err) = self.store.purge(full_purge) {
            tracing::warn!(error = %err, "failed to purge local state");
        }
        if let Err(err) = self.offline.clear() {
            tracing::warn!(error = %err, "failed to clear offline marker");
        }
        ended
    }

    /// End the session. `full_purge` also forgets the remembered identity,
    /// the last login id and notification preferences.
    pub fn logout(&self, full_purge: bool) {
        let ended = self.teardown(full_purge);
        let agent_id = ended.map(|s| s.agent.id).unwrap_or_default();
        tracing::info!(agent_id = %agent_id, full_purge, "logged out");
        self.telemetry.emit(
            TelemetryEvent::new("logout")
                .with("id", agent_id)
                .with("full_purge", full_purge.to_string()),
        );
        self.host.request_reload(if full_purge {
            ReloadReason::FullLogout
        } else {
            ReloadReason::SoftLogout
        });
    }

    /// Destroy all local state and platform caches after confirmation.
    ///
    /// Returns `false` when the user declined. A failed store wipe is
    /// returned only after the platform cleanup and the reload request.
    pub async fn hard_reset(&self) -> Result<bool, RosterError> {
        if !self.host.confirm(HARD_RESET_PROMPT) {
            tracing::info!("hard reset declined");
            return Ok(false);
        }
        self.cell.destroy();
        self.subscriptions.lock().cancel_all();
        *self.idle_state.lock() = None;
        // platform cleanup and reload still run when the wipe fails
        let wiped = self.store.wipe();
        if let Err(err) = &wiped {
            tracing::error!(error = %err, "failed to wipe local stores");
        }

        match self.host.clear_offline_caches().await {
            Ok(count) => tracing::info!(count, "offline caches cleared"),
            Err(err) => tracing::warn!(error = %err, "failed to clear offline caches"),
        }
        match self.host.unregister_background_sync().await {
            Ok(count) => tracing::info!(count, "background sync unregistered"),
            Err(err) => tracing::warn!(error = %err, "failed to unregister background sync"),
        }
        self.telemetry.emit(TelemetryEvent::new("hard_reset"));
        self.host.request_reload(ReloadReason::HardReset);
        wiped?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Resume the snapshot left in the tab store, if still within the idle
    /// window, and report the quick-login affordance either way
    pub fn restore(&self) -> Result<RestoreOutcome, RosterError> {
        let mut outcome = RestoreOutcome {
            remembered: self.store.remembered()?,
            last_login_id: self.store.last_login_id()?,
            ..RestoreOutcome::default()
        };
        let Some(agent) = self.cell.stored_snapshot()? else {
            return Ok(outcome);
        };

        let now = self.clock.now_ms();
        let last_active = self.store.last_active()?.filter(|t| *t > 0);
        if let Some(last) = last_active {
            if self.idle.evaluate(last, now) == IdleState::Expired {
                tracing::info!(agent_id = %agent.id, "stored session expired while away");
                self.teardown(false);
                outcome.expired = true;
                outcome.remembered = self.store.remembered()?;
                return Ok(outcome);
            }
        }

        let session = self.establish(agent, LoginMethod::Restored, last_active.unwrap_or(now))?;
        outcome.session = Some(session);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Account actions
    // -----------------------------------------------------------------------

    /// Register a platform credential for the logged-in agent and record its
    /// handle in the directory. Takes effect locally on the next sync.
    pub async fn register_biometric(&self) -> Result<String, RosterError> {
        let agent = self.session_agent()?;
        let epoch = self.cell.epoch();
        let handle = self
            .biometric
            .register(&agent.id, &agent.name, agent.biometric_credential.as_deref())
            .await?;
        if !self.cell.is_current(epoch) {
            return Err(RosterError::NoActiveSession);
        }
        self.directory.register_biometric(&agent.id, &handle).await?;
        self.telemetry
            .emit(TelemetryEvent::new("biometric_registered").with("id", agent.id));
        Ok(handle)
    }

    /// Replace the logged-in agent's PIN (4 to 8 digits, different from the
    /// current one), optionally with a new security question
    pub async fn change_secret(
        &self,
        new_secret: &str,
        question: Option<String>,
        answer: Option<String>,
    ) -> Result<(), RosterError> {
        let agent = self.session_agent()?;
        let new_secret = new_secret.trim();
        if !(4..=8).contains(&new_secret.len()) || !new_secret.chars().all(|c| c.is_ascii_digit()) {
            return Err(RosterError::ResetRejected("PIN must be 4 to 8 digits".into()));
        }
        let current = self.cache.get(&agent.id).unwrap_or(agent);
        if current.secret.matches(new_secret) {
            return Err(RosterError::ResetRejected(
                "new PIN must differ from the current one".into(),
            ));
        }
        self.directory
            .update_secret(&SecretChange {
                agent_id: current.id.clone(),
                new_pin: new_secret.to_string(),
                question: question.filter(|q| !q.trim().is_empty()),
                answer: answer.filter(|a| !a.trim().is_empty()),
            })
            .await?;
        tracing::info!(agent_id = %current.id, "secret changed");
        Ok(())
    }

    /// Reveal the PIN of `identifier` after a correct security answer
    pub async fn reset_secret(&self, identifier: &str, answer: &str) -> Result<RevealedSecret, RosterError> {
        self.credentials
            .reset_by_security_question(identifier, answer)
            .await
    }

    /// Promotion progress of the logged-in agent
    pub fn progress(&self) -> Result<PromotionProgress, RosterError> {
        let agent = self.session_agent()?;
        Ok(promotion::progress(&agent, &self.config.rank_table))
    }

    /// Ask the directory to promote the logged-in agent.
    ///
    /// Rejected locally when requirements are not met; the roster is not
    /// touched and the new rank arrives with the next sync.
    pub async fn request_promotion(&self) -> Result<PromotionRecord, RosterError> {
        let mut candidate = self.session_agent()?;
        let epoch = self.cell.epoch();
        let record = promotion::promote(&mut candidate, &self.config.rank_table, self.clock.now_ms())?;
        if !self.cell.is_current(epoch) {
            return Err(RosterError::NoActiveSession);
        }
        self.directory
            .promote(&PromotionRequest {
                agent_id: candidate.id.clone(),
                agent_name: candidate.name.clone(),
                new_rank: record.to.clone(),
                xp: record.xp,
                certificates: record.certificates,
            })
            .await?;
        self.telemetry.emit(
            TelemetryEvent::new("promotion_requested")
                .with("id", candidate.id)
                .with("rank", record.to.clone()),
        );
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    /// Mark a notification read for the logged-in agent
    pub fn mark_notification_read(&self, notification_id: &str) -> Result<usize, RosterError> {
        let agent = self.session_agent()?;
        Ok(self.notifications.mark_read(&agent.id, notification_id)?)
    }

    /// Delete a notification for the logged-in agent
    pub fn mark_notification_deleted(&self, notification_id: &str) -> Result<usize, RosterError> {
        let agent = self.session_agent()?;
        Ok(self.notifications.mark_deleted(&agent.id, notification_id)?)
    }

    /// Delete every visible notification for the logged-in agent
    pub fn clear_notifications(&self) -> Result<usize, RosterError> {
        let agent = self.session_agent()?;
        Ok(self.notifications.clear_all(&agent.id)?)
    }

    /// Unread badge for the logged-in agent
    pub fn unread_notifications(&self) -> Result<usize, RosterError> {
        let agent = self.session_agent()?;
        Ok(self.notifications.unread_count(&agent.id)?)
    }
}
