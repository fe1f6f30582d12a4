//! Session persistence layering
//!
//! - tab store: the live agent snapshot (owned by `SessionCell`)
//! - durable store: last activity, remembered identity, last login id,
//!   per-agent notification preferences, client markers
//!
//! Logout purges both stores except for an allow-list of durable keys.

use roster_core::store::keys;
use roster_core::{
    Agent, KeyValueStore, KeyValueStoreExt, RememberedIdentity, StoreError,
};
use std::sync::Arc;

/// Durable keys that survive every logout
const ALWAYS_KEPT: &[&str] = &[keys::APP_VERSION, keys::PWA_DISMISSED];

/// Durable keys that additionally survive a soft logout
const SOFT_KEPT: &[&str] = &[keys::REMEMBERED_IDENTITY, keys::LAST_LOGIN_ID];

/// Whether a durable key survives a logout
#[must_use]
pub fn survives_logout(key: &str, full_purge: bool) -> bool {
    if ALWAYS_KEPT.contains(&key) {
        return true;
    }
    !full_purge && (SOFT_KEPT.contains(&key) || keys::is_notification_key(key))
}

/// Both stores behind one handle
#[derive(Debug, Clone)]
pub struct SessionStore {
    tab: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Wrap the two scopes
    #[must_use]
    pub fn new(tab: Arc<dyn KeyValueStore>, durable: Arc<dyn KeyValueStore>) -> Self {
        Self { tab, durable }
    }

    /// Tab-scoped store
    #[inline]
    #[must_use]
    pub fn tab(&self) -> &Arc<dyn KeyValueStore> {
        &self.tab
    }

    /// Durable store
    #[inline]
    #[must_use]
    pub fn durable(&self) -> &Arc<dyn KeyValueStore> {
        &self.durable
    }

    /// Record a successful login
    pub fn remember(&self, agent: &Agent, now_ms: u64) -> Result<(), StoreError> {
        self.durable
            .set_json(keys::REMEMBERED_IDENTITY, &RememberedIdentity::from(agent))?;
        self.durable.set(keys::LAST_LOGIN_ID, &agent.id)?;
        self.touch(now_ms)
    }

    /// Persist the last activity time
    pub fn touch(&self, now_ms: u64) -> Result<(), StoreError> {
        self.durable.set(keys::LAST_ACTIVE, &now_ms.to_string())
    }

    /// Last persisted activity time
    pub fn last_active(&self) -> Result<Option<u64>, StoreError> {
        self.durable.get_millis(keys::LAST_ACTIVE)
    }

    /// Quick-login reference
    pub fn remembered(&self) -> Result<Option<RememberedIdentity>, StoreError> {
        self.durable.get_json(keys::REMEMBERED_IDENTITY)
    }

    /// Identifier of the last successful login
    pub fn last_login_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .durable
            .get(keys::LAST_LOGIN_ID)?
            .filter(|id| !id.trim().is_empty()))
    }

    /// Record the client version marker
    pub fn mark_version(&self, version: &str) -> Result<(), StoreError> {
        self.durable.set(keys::APP_VERSION, version)
    }

    /// Clear everything but the allow-list; returns how many durable keys went
    pub fn purge(&self, full_purge: bool) -> Result<usize, StoreError> {
        self.tab.clear()?;
        let mut removed = 0;
        for key in self.durable.keys()? {
            if !survives_logout(&key, full_purge) {
                self.durable.remove(&key)?;
                removed += 1;
            }
        }
        tracing::debug!(full_purge, removed, "local state purged");
        Ok(removed)
    }

    /// Clear both stores completely
    pub fn wipe(&self) -> Result<(), StoreError> {
        self.tab.clear()?;
        self.durable.clear()
    }
}
