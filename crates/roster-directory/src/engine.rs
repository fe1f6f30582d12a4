//! Agent directory sync engine
//!
//! `fetch_all` is the only path that writes the roster cache. Each call:
//! 1. checks the backoff window and the in-flight guard under one lock
//! 2. fetches and maps the roster under a timeout
//! 3. on failure records the error time, logging once per failure streak
//! 4. on success replaces the cache, refreshes the live session's agent
//!    and schedules a debounced mirror push
//!
//! Failures never reach the caller: an empty result means "no change".

use crate::mapper::AgentMapper;
use parking_lot::Mutex;
use roster_core::{
    Agent, AgentDirectoryCache, CacheWriter, Clock, Debouncer, DirectoryError, RemoteDirectory,
    RosterMirror, SessionCell, Subscription, SyncPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide fetch bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Epoch ms of the last failed fetch in the current streak
    pub last_error_ms: Option<u64>,
    /// The current streak has already been logged
    pub error_logged: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// A fetch is running
    pub in_flight: bool,
}

impl SyncState {
    /// Milliseconds of backoff left at `now_ms`
    #[must_use]
    pub fn backoff_remaining(&self, now_ms: u64, backoff_ms: u64) -> Option<u64> {
        let since = now_ms.saturating_sub(self.last_error_ms?);
        (since < backoff_ms).then(|| backoff_ms - since)
    }
}

/// Clears the in-flight flag when the fetch ends, including on cancellation
struct InFlight<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight = false;
    }
}

/// Mirror work item: roster plus the session epoch it was produced under
type MirrorJob = (u64, Arc<Vec<Agent>>);

/// Fetches, maps and publishes the remote roster
pub struct SyncEngine {
    directory: Arc<dyn RemoteDirectory>,
    writer: CacheWriter,
    session: Arc<SessionCell>,
    mapper: AgentMapper,
    clock: Arc<dyn Clock>,
    policy: SyncPolicy,
    state: Mutex<SyncState>,
    mirror: Option<Debouncer<MirrorJob>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("policy", &self.policy)
            .field("state", &*self.state.lock())
            .field("mirrored", &self.mirror.is_some())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine owning the cache's write capability
    #[must_use]
    pub fn new(
        directory: Arc<dyn RemoteDirectory>,
        writer: CacheWriter,
        session: Arc<SessionCell>,
        clock: Arc<dyn Clock>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            directory,
            writer,
            session,
            mapper: AgentMapper::default(),
            clock,
            policy,
            state: Mutex::new(SyncState::default()),
            mirror: None,
        }
    }

    /// With a custom mapper (configured role rules)
    #[inline]
    #[must_use]
    pub fn with_mapper(mut self, mapper: AgentMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Mirror every successful sync into `mirror` after the debounce delay.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn RosterMirror>) -> Self {
        let session = Arc::clone(&self.session);
        let delay = Duration::from_millis(self.policy.mirror_debounce_ms);
        self.mirror = Some(Debouncer::new(
            "roster-mirror",
            delay,
            move |(epoch, roster): MirrorJob| {
                let mirror = Arc::clone(&mirror);
                let session = Arc::clone(&session);
                async move {
                    if !session.is_current(epoch) {
                        tracing::debug!("session ended before mirror push, skipping");
                        return;
                    }
                    match mirror.push(&roster).await {
                        Ok(written) => tracing::debug!(written, "roster mirrored"),
                        Err(err) => tracing::warn!(error = %err, "roster mirror push failed"),
                    }
                }
            },
        ));
        self
    }

    /// Read handle onto the cache this engine writes
    #[inline]
    #[must_use]
    pub fn cache(&self) -> AgentDirectoryCache {
        self.writer.reader()
    }

    /// Copy of the current bookkeeping
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Forget the failure streak so the next fetch goes to the network
    pub fn reset_backoff(&self) {
        let mut state = self.state.lock();
        state.last_error_ms = None;
        state.error_logged = false;
        state.consecutive_failures = 0;
        tracing::info!("sync backoff reset");
    }

    fn begin(&self, now_ms: u64) -> Option<InFlight<'_>> {
        let mut state = self.state.lock();
        if let Some(remaining_ms) = state.backoff_remaining(now_ms, self.policy.backoff_ms) {
            tracing::debug!(remaining_ms, "sync in backoff, skipping fetch");
            return None;
        }
        if state.in_flight {
            tracing::debug!("sync already in flight, skipping fetch");
            return None;
        }
        state.in_flight = true;
        Some(InFlight { state: &self.state })
    }

    fn record_failure(&self, err: &DirectoryError) {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock();
        state.last_error_ms = Some(now_ms);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.error_logged {
            tracing::debug!(error = %err, failures = state.consecutive_failures, "directory fetch failed");
        } else {
            state.error_logged = true;
            tracing::error!(
                error = %err,
                backoff_ms = self.policy.backoff_ms,
                "directory unavailable, backing off"
            );
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures > 0 {
            tracing::info!(failures = state.consecutive_failures, "directory reachable again");
        }
        state.last_error_ms = None;
        state.error_logged = false;
        state.consecutive_failures = 0;
    }

    async fn fetch_mapped(&self) -> Result<Vec<Agent>, DirectoryError> {
        let deadline = self.policy.fetch_timeout();
        let raw = tokio::time::timeout(deadline, self.directory.fetch())
            .await
            .map_err(|_| DirectoryError::Timeout(self.policy.fetch_timeout_ms))??;
        self.mapper.map_roster(raw)
    }

    /// Fetch the roster once. Empty means "no change", never "no agents".
    pub async fn fetch_all(&self) -> Vec<Agent> {
        let Some(_guard) = self.begin(self.clock.now_ms()) else {
            return Vec::new();
        };
        let epoch = self.session.epoch();

        let agents = match self.fetch_mapped().await {
            Ok(agents) => agents,
            Err(err) => {
                self.record_failure(&err);
                return Vec::new();
            }
        };
        self.record_success();
        if agents.is_empty() {
            return agents;
        }

        self.writer.replace(agents.clone());
        tracing::debug!(agents = agents.len(), "roster cache replaced");

        if let Err(err) = self.session.refresh_from(&agents, epoch) {
            tracing::warn!(error = %err, "failed to persist refreshed session");
        }
        if let Some(mirror) = &self.mirror {
            if self.session.is_current(epoch) {
                mirror.schedule((epoch, Arc::new(agents.clone())));
            }
        }
        agents
    }

    /// Fetch once now, then every `refresh_interval_ms` until the
    /// subscription is dropped
    #[must_use]
    pub fn spawn_refresh(self: &Arc<Self>) -> Subscription {
        let engine = Arc::clone(self);
        let period = Duration::from_millis(self.policy.refresh_interval_ms);
        Subscription::new(
            "roster-refresh",
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let fetched = engine.fetch_all().await;
                    tracing::trace!(agents = fetched.len(), "periodic roster refresh");
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_window_is_half_open() {
        let state = SyncState {
            last_error_ms: Some(1_000),
            ..SyncState::default()
        };
        assert_eq!(state.backoff_remaining(1_000, 300_000), Some(300_000));
        assert_eq!(state.backoff_remaining(300_999, 300_000), Some(1));
        assert_eq!(state.backoff_remaining(301_000, 300_000), None);
        assert_eq!(SyncState::default().backoff_remaining(5, 300_000), None);
    }
}
