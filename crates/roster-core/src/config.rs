//! Client configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Durations are milliseconds.

use crate::agent::Role;
use crate::error::RosterError;
use crate::promotion::RankTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Idle and offline policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Inactivity before the warning state
    pub warning_after_ms: u64,
    /// Inactivity before automatic logout
    pub expire_after_ms: u64,
    /// Continuous unreachability before forced logout
    pub offline_grace_ms: u64,
    /// Watchdog evaluation period
    pub watchdog_tick_ms: u64,
    /// Suspend idle expiry (installed / kiosk app)
    pub standalone: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            warning_after_ms: 1_500_000,
            expire_after_ms: 1_800_000,
            offline_grace_ms: 300_000,
            watchdog_tick_ms: 10_000,
            standalone: false,
        }
    }
}

/// Roster sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Cooldown after a failed fetch
    pub backoff_ms: u64,
    /// Period of the background refresh
    pub refresh_interval_ms: u64,
    /// Delay before mirroring the roster
    pub mirror_debounce_ms: u64,
    /// Deadline for a single fetch
    pub fetch_timeout_ms: u64,
}

impl SyncPolicy {
    /// Fetch deadline as a `Duration`
    #[inline]
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: 300_000,
            refresh_interval_ms: 60_000,
            mirror_debounce_ms: 5_000,
            fetch_timeout_ms: 15_000,
        }
    }
}

/// Platform authenticator policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiometricPolicy {
    /// Relying party display name
    pub relying_party_name: String,
    /// Relying party id (the app origin host)
    pub relying_party_id: String,
    /// Ceremony deadline
    pub ceremony_timeout_ms: u64,
    /// Random challenge length in bytes
    pub challenge_len: usize,
}

impl Default for BiometricPolicy {
    fn default() -> Self {
        Self {
            relying_party_name: "Consagrados 2026".to_string(),
            relying_party_id: "localhost".to_string(),
            ceremony_timeout_ms: 60_000,
            challenge_len: 32,
        }
    }
}

/// Notification preference mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    /// Delay before pushing merged sets
    pub push_debounce_ms: u64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            push_debounce_ms: 1_500,
        }
    }
}

/// Where the HTTP directory lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryEndpoint {
    /// Endpoint URL (GET roster, POST actions)
    pub endpoint: String,
    /// Per-request deadline
    pub request_timeout_ms: u64,
}

impl Default for DirectoryEndpoint {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/directory".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

/// Field a role rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRuleTarget {
    /// Agent id
    Id,
    /// Access level, upper-cased without diacritics
    Access,
}

/// `pattern` (regex) on `target` grants `role`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Inspected field
    pub target: RoleRuleTarget,
    /// Regular expression
    pub pattern: String,
    /// Granted role
    pub role: Role,
}

impl RoleRule {
    /// Rule over the access level
    #[must_use]
    pub fn access(pattern: impl Into<String>, role: Role) -> Self {
        Self {
            target: RoleRuleTarget::Access,
            pattern: pattern.into(),
            role,
        }
    }

    /// Rule over the id
    #[must_use]
    pub fn id(pattern: impl Into<String>, role: Role) -> Self {
        Self {
            target: RoleRuleTarget::Id,
            pattern: pattern.into(),
            role,
        }
    }

    /// Access-level rules used when none are configured
    #[must_use]
    pub fn defaults() -> Vec<RoleRule> {
        vec![
            RoleRule::access("DIRECTOR", Role::Director),
            RoleRule::access("LIDER|LEADER", Role::Leader),
        ]
    }
}

/// Full client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Client version marker kept across logouts
    pub app_version: String,
    /// Idle / offline
    pub session: SessionPolicy,
    /// Roster sync
    pub sync: SyncPolicy,
    /// Platform authenticator
    pub biometric: BiometricPolicy,
    /// Notification mirroring
    pub notifications: NotificationPolicy,
    /// HTTP directory
    pub directory: DirectoryEndpoint,
    /// Role derivation rules
    pub role_rules: Vec<RoleRule>,
    /// Promotion ladder
    pub rank_table: RankTable,
}

impl RosterConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, RosterError> {
        let config: Self = toml::from_str(raw).map_err(|e| RosterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RosterError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, RosterError> {
        toml::to_string_pretty(self).map_err(|e| RosterError::Config(e.to_string()))
    }

    /// Reject inconsistent windows
    pub fn validate(&self) -> Result<(), RosterError> {
        let s = &self.session;
        if s.warning_after_ms >= s.expire_after_ms {
            return Err(RosterError::Config(format!(
                "session.warning_after_ms ({}) must be below session.expire_after_ms ({})",
                s.warning_after_ms, s.expire_after_ms
            )));
        }
        if s.watchdog_tick_ms == 0 || self.sync.refresh_interval_ms == 0 {
            return Err(RosterError::Config("timer periods must be non-zero".to_string()));
        }
        if self.biometric.challenge_len < 16 {
            return Err(RosterError::Config(
                "biometric.challenge_len must be at least 16 bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// With session policy
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }

    /// With sync policy
    #[inline]
    #[must_use]
    pub fn with_sync(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    /// With role rules
    #[inline]
    #[must_use]
    pub fn with_role_rules(mut self, rules: Vec<RoleRule>) -> Self {
        self.role_rules = rules;
        self
    }

    /// With rank table
    #[inline]
    #[must_use]
    pub fn with_rank_table(mut self, table: RankTable) -> Self {
        self.rank_table = table;
        self
    }

    /// Standalone (installed app) mode
    #[inline]
    #[must_use]
    pub fn standalone(mut self, standalone: bool) -> Self {
        self.session.standalone = standalone;
        self
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            session: SessionPolicy::default(),
            sync: SyncPolicy::default(),
            biometric: BiometricPolicy::default(),
            notifications: NotificationPolicy::default(),
            directory: DirectoryEndpoint::default(),
            role_rules: RoleRule::defaults(),
            rank_table: RankTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_is_default() {
        let config = RosterConfig::from_toml_str("").unwrap();
        assert_eq!(config, RosterConfig::default());
        assert_eq!(config.session.warning_after_ms, 1_500_000);
        assert_eq!(config.sync.backoff_ms, 300_000);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = RosterConfig::from_toml_str(
            r#"
            [session]
            standalone = true

            [[role_rules]]
            target = "id"
            pattern = "4251"
            role = "LEADER"

            [rank_table.recluta]
            required_xp = 100
            required_certificates = 1
            next_rank = "ACTIVO"
            "#,
        )
        .unwrap();
        assert!(config.session.standalone);
        assert_eq!(config.session.expire_after_ms, 1_800_000);
        assert_eq!(config.role_rules, vec![RoleRule::id("4251", Role::Leader)]);
        assert_eq!(config.rank_table.rule_for("RECLUTA").unwrap().required_xp, 100);
    }

    #[test]
    fn inverted_windows_are_rejected() {
        let err = RosterConfig::from_toml_str(
            "[session]\nwarning_after_ms = 10\nexpire_after_ms = 5\n",
        )
        .unwrap_err();
        assert!(matches!(err, RosterError::Config(_)));
    }

    #[test]
    fn renders_back_to_toml() {
        let rendered = RosterConfig::default().to_toml_string().unwrap();
        let parsed = RosterConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.sync, SyncPolicy::default());
    }
}
