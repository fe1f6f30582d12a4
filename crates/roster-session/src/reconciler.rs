//! Notification preference reconciler
//!
//! Local state is the fast path and stays authoritative for this device.
//! The directory copy seeds it on first load and receives a debounced
//! mirror of every change. Push failures are logged and dropped.

use dashmap::DashMap;
use parking_lot::RwLock;
use roster_core::store::keys;
use roster_core::{
    Agent, Debouncer, KeyValueStore, KeyValueStoreExt, NotificationPreferences, RemoteDirectory,
    StoreError,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Reconciles read/deleted notification ids per agent
pub struct NotificationReconciler {
    durable: Arc<dyn KeyValueStore>,
    directory: Arc<dyn RemoteDirectory>,
    debounce: Duration,
    prefs: DashMap<String, NotificationPreferences>,
    feed: RwLock<Vec<String>>,
    pushes: DashMap<String, Debouncer<NotificationPreferences>>,
}

impl std::fmt::Debug for NotificationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationReconciler")
            .field("agents", &self.prefs.len())
            .field("feed", &self.feed.read().len())
            .field("push_queues", &self.pushes.len())
            .finish_non_exhaustive()
    }
}

impl NotificationReconciler {
    /// Create a reconciler pushing through `directory` after `debounce`.
    ///
    /// Changes are debounced per agent, so updates for one agent never
    /// replace another's pending push. Marking must happen inside a tokio
    /// runtime. Dropping the reconciler flushes every pending push.
    #[must_use]
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        directory: Arc<dyn RemoteDirectory>,
        debounce: Duration,
    ) -> Self {
        Self {
            durable,
            directory,
            debounce,
            prefs: DashMap::new(),
            feed: RwLock::new(Vec::new()),
            pushes: DashMap::new(),
        }
    }

    fn push_queue(&self, agent_id: &str) -> Debouncer<NotificationPreferences> {
        let directory = Arc::clone(&self.directory);
        let agent_id = agent_id.to_string();
        Debouncer::new("notification-prefs", self.debounce, move |prefs: NotificationPreferences| {
            let directory = Arc::clone(&directory);
            let agent_id = agent_id.clone();
            async move {
                match directory.update_notification_prefs(&agent_id, &prefs).await {
                    Ok(()) => tracing::debug!(agent_id = %agent_id, "notification preferences mirrored"),
                    Err(err) => {
                        tracing::debug!(agent_id = %agent_id, error = %err, "notification preference push failed");
                    }
                }
            }
        })
    }

    fn schedule_push(&self, agent_id: &str, prefs: NotificationPreferences) {
        self.pushes
            .entry(agent_id.to_string())
            .or_insert_with(|| self.push_queue(agent_id))
            .schedule(prefs);
    }

    fn load_local(&self, agent_id: &str) -> Result<NotificationPreferences, StoreError> {
        let read: Option<BTreeSet<String>> =
            self.durable.get_json(&keys::read_notifications(agent_id))?;
        let deleted: Option<BTreeSet<String>> =
            self.durable.get_json(&keys::deleted_notifications(agent_id))?;
        Ok(NotificationPreferences {
            read: read.unwrap_or_default(),
            deleted: deleted.unwrap_or_default(),
        })
    }

    fn save_local(&self, agent_id: &str, prefs: &NotificationPreferences) -> Result<(), StoreError> {
        self.durable
            .set_json(&keys::read_notifications(agent_id), &prefs.read)?;
        self.durable
            .set_json(&keys::deleted_notifications(agent_id), &prefs.deleted)
    }

    /// First load for an agent: union of the local sets and the directory
    /// copy. Never pushes; the directory is only read here.
    pub fn bootstrap(&self, agent: &Agent) -> Result<NotificationPreferences, StoreError> {
        let mut merged = self.load_local(&agent.id)?;
        let before = merged.clone();
        merged.merge(&agent.notification_prefs);
        if merged != before {
            self.save_local(&agent.id, &merged)?;
            tracing::debug!(
                agent_id = %agent.id,
                read = merged.read.len(),
                deleted = merged.deleted.len(),
                "notification preferences seeded from directory"
            );
        }
        self.prefs.insert(agent.id.clone(), merged.clone());
        Ok(merged)
    }

    /// Replace the visible notification ids
    pub fn set_feed<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.feed.write() = ids.into_iter().map(Into::into).collect();
    }

    /// Current preferences for an agent (loaded from disk if needed)
    pub fn preferences(&self, agent_id: &str) -> Result<NotificationPreferences, StoreError> {
        if let Some(prefs) = self.prefs.get(agent_id) {
            return Ok(prefs.clone());
        }
        let prefs = self.load_local(agent_id)?;
        self.prefs.insert(agent_id.to_string(), prefs.clone());
        Ok(prefs)
    }

    /// Unread badge, computed from local state only
    pub fn unread_count(&self, agent_id: &str) -> Result<usize, StoreError> {
        let prefs = self.preferences(agent_id)?;
        let feed = self.feed.read();
        Ok(prefs.unread_count(feed.iter().map(String::as_str)))
    }

    fn update<F>(&self, agent_id: &str, change: F) -> Result<usize, StoreError>
    where
        F: FnOnce(&mut NotificationPreferences) -> bool,
    {
        let mut prefs = self.preferences(agent_id)?;
        if change(&mut prefs) {
            self.save_local(agent_id, &prefs)?;
            self.prefs.insert(agent_id.to_string(), prefs.clone());
            self.schedule_push(agent_id, prefs);
        }
        self.unread_count(agent_id)
    }

    /// Mark one notification read; returns the new unread count
    pub fn mark_read(&self, agent_id: &str, notification_id: &str) -> Result<usize, StoreError> {
        self.update(agent_id, |prefs| prefs.read.insert(notification_id.to_string()))
    }

    /// Mark one notification deleted; returns the new unread count
    pub fn mark_deleted(&self, agent_id: &str, notification_id: &str) -> Result<usize, StoreError> {
        self.update(agent_id, |prefs| {
            prefs.deleted.insert(notification_id.to_string())
        })
    }

    /// Delete every notification in the feed; returns the new unread count
    pub fn clear_all(&self, agent_id: &str) -> Result<usize, StoreError> {
        let feed = self.feed.read().clone();
        self.update(agent_id, |prefs| {
            feed.into_iter()
                .fold(false, |changed, id| prefs.deleted.insert(id) || changed)
        })
    }

    /// Drop the in-memory copy for an agent; disk state is untouched
    pub fn forget(&self, agent_id: &str) {
        self.prefs.remove(agent_id);
    }
}
