//! Shared session state
//!
//! `SessionCell` is the one place the live session lives. The session
//! manager creates and destroys it; the sync engine refreshes the agent
//! snapshot in place. Every transition bumps an epoch so that async work
//! started under one session can detect that the session it belonged to
//! is gone and drop its effects.

use crate::agent::Agent;
use crate::error::StoreError;
use crate::store::{keys, KeyValueStore, KeyValueStoreExt};
use crate::text::same_id;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the session was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// Identifier + PIN
    Password,
    /// Platform authenticator
    Biometric,
    /// Restored from the tab-scoped snapshot
    Restored,
}

impl LoginMethod {
    /// Telemetry label
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Password => "password",
            LoginMethod::Biometric => "biometric",
            LoginMethod::Restored => "restored",
        }
    }
}

/// A live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id
    pub id: SessionId,
    /// Copy of the agent, refreshed in place by sync
    pub agent: Agent,
    /// Epoch ms of the last qualifying activity
    pub last_active_ms: u64,
    /// How the session started
    pub method: LoginMethod,
}

/// Quick-login reference; carries no secret material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberedIdentity {
    /// Agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Avatar
    #[serde(default)]
    pub photo_url: String,
}

impl From<&Agent> for RememberedIdentity {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            photo_url: agent.photo_url.clone(),
        }
    }
}

/// Holder of the live session and its tab-scoped snapshot
#[derive(Debug)]
pub struct SessionCell {
    state: RwLock<Option<Session>>,
    epoch: AtomicU64,
    tab: Arc<dyn KeyValueStore>,
}

impl SessionCell {
    /// Empty cell persisting snapshots into `tab`
    #[must_use]
    pub fn new(tab: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: RwLock::new(None),
            epoch: AtomicU64::new(0),
            tab,
        }
    }

    /// Current epoch; changes on every establish/destroy
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// True while the session that existed at `epoch` is still the live one
    #[must_use]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch && self.state.read().is_some()
    }

    /// Whether an agent is logged in
    #[inline]
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.state.read().is_some()
    }

    /// Copy of the live session
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.state.read().clone()
    }

    /// Copy of the live agent snapshot
    #[inline]
    #[must_use]
    pub fn agent(&self) -> Option<Agent> {
        self.state.read().as_ref().map(|s| s.agent.clone())
    }

    /// Id of the logged-in agent
    #[inline]
    #[must_use]
    pub fn agent_id(&self) -> Option<String> {
        self.state.read().as_ref().map(|s| s.agent.id.clone())
    }

    /// Last activity of the live session
    #[inline]
    #[must_use]
    pub fn last_active_ms(&self) -> Option<u64> {
        self.state.read().as_ref().map(|s| s.last_active_ms)
    }

    /// Start a session and persist its snapshot
    pub fn establish(
        &self,
        agent: Agent,
        method: LoginMethod,
        now_ms: u64,
    ) -> Result<Session, StoreError> {
        self.tab.set_json(keys::SESSION_AGENT, &agent)?;
        let session = Session {
            id: SessionId::new(),
            agent,
            last_active_ms: now_ms,
            method,
        };
        *self.state.write() = Some(session.clone());
        self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session = %session.id, agent_id = %session.agent.id, method = method.as_str(), "session established");
        Ok(session)
    }

    /// Snapshot left in the tab store by a previous page life
    pub fn stored_snapshot(&self) -> Result<Option<Agent>, StoreError> {
        self.tab.get_json(keys::SESSION_AGENT)
    }

    /// Record activity; returns false when no session is live
    pub fn touch(&self, now_ms: u64) -> bool {
        match self.state.write().as_mut() {
            Some(session) => {
                session.last_active_ms = now_ms;
                true
            }
            None => false,
        }
    }

    /// End the session and drop its snapshot
    pub fn destroy(&self) -> Option<Session> {
        let previous = self.state.write().take();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.tab.remove(keys::SESSION_AGENT) {
            tracing::warn!(error = %err, "failed to drop session snapshot");
        }
        previous
    }

    /// Replace the snapshot when the fresh roster carries a changed copy of
    /// the session's agent. No-op when the session at `epoch` is gone.
    ///
    /// Returns the new snapshot when one was written.
    pub fn refresh_from(&self, roster: &[Agent], epoch: u64) -> Result<Option<Agent>, StoreError> {
        let mut guard = self.state.write();
        if self.epoch() != epoch {
            return Ok(None);
        }
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };
        let Some(fresh) = roster.iter().find(|a| same_id(&a.id, &session.agent.id)) else {
            return Ok(None);
        };
        if *fresh == session.agent {
            return Ok(None);
        }
        self.tab.set_json(keys::SESSION_AGENT, fresh)?;
        session.agent = fresh.clone();
        tracing::info!(agent_id = %fresh.id, xp = fresh.experience_total(), rank = %fresh.rank, "session snapshot refreshed");
        Ok(Some(fresh.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExperienceComponents;
    use crate::store::MemoryStore;

    fn cell() -> (Arc<MemoryStore>, SessionCell) {
        let tab = Arc::new(MemoryStore::new());
        let cell = SessionCell::new(tab.clone());
        (tab, cell)
    }

    #[test]
    fn establish_persists_snapshot_and_bumps_epoch() {
        let (tab, cell) = cell();
        let before = cell.epoch();
        cell.establish(Agent::new("V-1", "Ana"), LoginMethod::Password, 10)
            .unwrap();
        assert!(cell.epoch() > before);
        assert!(tab.get(keys::SESSION_AGENT).unwrap().is_some());
        assert_eq!(cell.agent_id().as_deref(), Some("V-1"));
    }

    #[test]
    fn destroy_invalidates_epoch() {
        let (tab, cell) = cell();
        cell.establish(Agent::new("V-1", "Ana"), LoginMethod::Password, 10)
            .unwrap();
        let epoch = cell.epoch();
        assert!(cell.is_current(epoch));
        cell.destroy();
        assert!(!cell.is_current(epoch));
        assert!(tab.get(keys::SESSION_AGENT).unwrap().is_none());
    }

    #[test]
    fn refresh_replaces_changed_snapshot() {
        let (_tab, cell) = cell();
        cell.establish(Agent::new("V-1", "Ana"), LoginMethod::Password, 10)
            .unwrap();
        let epoch = cell.epoch();

        let fresh = Agent::new("v-1", "Ana").with_experience(ExperienceComponents::new(5, 0, 0));
        let updated = cell.refresh_from(&[fresh.clone()], epoch).unwrap();
        assert_eq!(updated, Some(fresh.clone()));
        assert_eq!(cell.agent().unwrap().experience_total(), 5);

        // unchanged roster is a no-op
        assert!(cell.refresh_from(&[fresh], epoch).unwrap().is_none());
    }

    #[test]
    fn refresh_after_logout_is_ignored() {
        let (_tab, cell) = cell();
        cell.establish(Agent::new("V-1", "Ana"), LoginMethod::Password, 10)
            .unwrap();
        let epoch = cell.epoch();
        cell.destroy();
        let fresh = Agent::new("V-1", "Ana").with_rank("ACTIVO");
        assert!(cell.refresh_from(&[fresh], epoch).unwrap().is_none());
        assert!(cell.agent().is_none());
    }
}
