//! Idle and offline policy
//!
//! Both are evaluated from epoch-ms timestamps so a watchdog tick can ask
//! "what state is the session in now" without keeping timers of its own.

use roster_core::store::keys;
use roster_core::{KeyValueStore, KeyValueStoreExt, SessionPolicy, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Idle state of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    /// Recent activity
    Active,
    /// Logout is near
    Warning,
    /// Idle window exhausted; the session must end
    Expired,
}

/// Host events observed by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    /// Mouse or pen pressed
    PointerDown,
    /// Key pressed
    KeyDown,
    /// Page scrolled
    Scroll,
    /// Touch started
    TouchStart,
    /// Pointer moved without pressing
    PointerMove,
    /// Page visibility changed
    VisibilityChange,
}

impl ActivityEvent {
    /// Whether the event counts as user activity
    #[inline]
    #[must_use]
    pub fn qualifies(self) -> bool {
        matches!(
            self,
            Self::PointerDown | Self::KeyDown | Self::Scroll | Self::TouchStart
        )
    }
}

/// Idle evaluation
#[derive(Debug, Clone, Copy)]
pub struct IdleMonitor {
    warning_after_ms: u64,
    expire_after_ms: u64,
    standalone: bool,
}

impl IdleMonitor {
    /// Create from policy. `standalone` suspends expiry entirely.
    #[must_use]
    pub fn new(policy: &SessionPolicy, standalone: bool) -> Self {
        Self {
            warning_after_ms: policy.warning_after_ms,
            expire_after_ms: policy.expire_after_ms,
            standalone,
        }
    }

    /// Idle expiry is suspended
    #[inline]
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.standalone
    }

    /// State of a session last active at `last_active_ms`
    #[must_use]
    pub fn evaluate(&self, last_active_ms: u64, now_ms: u64) -> IdleState {
        if self.standalone {
            return IdleState::Active;
        }
        let idle = now_ms.saturating_sub(last_active_ms);
        if idle >= self.expire_after_ms {
            IdleState::Expired
        } else if idle >= self.warning_after_ms {
            IdleState::Warning
        } else {
            IdleState::Active
        }
    }

    /// Milliseconds until expiry, `None` when suspended
    #[must_use]
    pub fn remaining_ms(&self, last_active_ms: u64, now_ms: u64) -> Option<u64> {
        (!self.standalone).then(|| {
            self.expire_after_ms
                .saturating_sub(now_ms.saturating_sub(last_active_ms))
        })
    }
}

/// Result of one offline observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineVerdict {
    /// Network reachable
    Online,
    /// Unreachable since the given epoch ms, still within grace
    Offline {
        /// When connectivity was first seen lost
        since_ms: u64,
    },
    /// Unreachable for longer than the grace window
    Expired,
}

/// Tracks continuous unreachability across reloads
#[derive(Debug, Clone)]
pub struct OfflineWatchdog {
    grace_ms: u64,
    durable: Arc<dyn KeyValueStore>,
}

impl OfflineWatchdog {
    /// Start time is kept in `durable` so a reload does not reset the window
    #[must_use]
    pub fn new(grace_ms: u64, durable: Arc<dyn KeyValueStore>) -> Self {
        Self { grace_ms, durable }
    }

    /// Record the current reachability
    pub fn observe(&self, online: bool, now_ms: u64) -> Result<OfflineVerdict, StoreError> {
        if online {
            self.clear()?;
            return Ok(OfflineVerdict::Online);
        }
        let since_ms = match self.durable.get_millis(keys::OFFLINE_START)? {
            Some(since) if since <= now_ms => since,
            _ => {
                self.durable.set(keys::OFFLINE_START, &now_ms.to_string())?;
                tracing::info!("network unreachable, offline grace started");
                now_ms
            }
        };
        if now_ms - since_ms >= self.grace_ms {
            self.clear()?;
            return Ok(OfflineVerdict::Expired);
        }
        Ok(OfflineVerdict::Offline { since_ms })
    }

    /// Forget any offline streak
    pub fn clear(&self) -> Result<(), StoreError> {
        self.durable.remove(keys::OFFLINE_START)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roster_core::MemoryStore;

    const T0: u64 = 1_700_000_000_000;

    fn monitor() -> IdleMonitor {
        IdleMonitor::new(&SessionPolicy::default(), false)
    }

    #[test]
    fn thresholds_are_inclusive() {
        let m = monitor();
        assert_eq!(m.evaluate(T0, T0 + 1_499_999), IdleState::Active);
        assert_eq!(m.evaluate(T0, T0 + 1_500_000), IdleState::Warning);
        assert_eq!(m.evaluate(T0, T0 + 1_799_999), IdleState::Warning);
        assert_eq!(m.evaluate(T0, T0 + 1_800_000), IdleState::Expired);
    }

    #[test]
    fn standalone_never_expires() {
        let m = IdleMonitor::new(&SessionPolicy::default(), true);
        assert_eq!(m.evaluate(0, u64::MAX), IdleState::Active);
        assert!(m.remaining_ms(0, 10).is_none());
    }

    #[test]
    fn only_presses_scrolls_and_touches_qualify() {
        assert!(ActivityEvent::PointerDown.qualifies());
        assert!(ActivityEvent::TouchStart.qualifies());
        assert!(!ActivityEvent::PointerMove.qualifies());
        assert!(!ActivityEvent::VisibilityChange.qualifies());
    }

    #[test]
    fn offline_grace_survives_a_new_watchdog() {
        let durable: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = OfflineWatchdog::new(300_000, durable.clone());
        assert_eq!(
            first.observe(false, T0).unwrap(),
            OfflineVerdict::Offline { since_ms: T0 }
        );

        // reload: a fresh watchdog sees the persisted start
        let second = OfflineWatchdog::new(300_000, durable.clone());
        assert_eq!(
            second.observe(false, T0 + 200_000).unwrap(),
            OfflineVerdict::Offline { since_ms: T0 }
        );
        assert_eq!(second.observe(false, T0 + 300_000).unwrap(), OfflineVerdict::Expired);
        assert!(durable.get(keys::OFFLINE_START).unwrap().is_none());
    }

    #[test]
    fn reconnecting_resets_the_window() {
        let durable: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let watchdog = OfflineWatchdog::new(300_000, durable);
        watchdog.observe(false, T0).unwrap();
        assert_eq!(watchdog.observe(true, T0 + 1).unwrap(), OfflineVerdict::Online);
        assert_eq!(
            watchdog.observe(false, T0 + 299_000).unwrap(),
            OfflineVerdict::Offline { since_ms: T0 + 299_000 }
        );
    }

    proptest! {
        #[test]
        fn non_qualifying_events_never_delay_expiry(
            offsets in proptest::collection::vec(0u64..1_800_000, 0..20),
        ) {
            let m = monitor();
            let last_active = T0;
            for offset in offsets {
                // background events do not touch last_active
                let state = m.evaluate(last_active, T0 + offset);
                prop_assert_ne!(state, IdleState::Expired);
            }
            prop_assert_eq!(m.evaluate(last_active, T0 + 1_500_000), IdleState::Warning);
            prop_assert_eq!(m.evaluate(last_active, T0 + 1_800_000), IdleState::Expired);
        }

        #[test]
        fn state_is_monotonic_in_idle_time(a in 0u64..4_000_000, b in 0u64..4_000_000) {
            let m = monitor();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(m.evaluate(T0, T0 + lo) <= m.evaluate(T0, T0 + hi));
        }
    }
}
