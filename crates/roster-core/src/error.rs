//! Error types for the roster client
//!
//! Propagation policy:
//! - Authentication errors are always surfaced to the caller
//! - Directory errors are logged once per failure streak and absorbed
//! - Preference push errors are silent; local state stays authoritative
//!
//! Nothing here is fatal. The worst outcome of any failure is a forced
//! logout or a stale but self-consistent local view.

/// Main roster error type
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// No agent matches the identifier
    #[error("agent id not found: {0}")]
    IdentityNotFound(String),

    /// The identifier matched but the secret did not
    #[error("security pin mismatch for agent {0}")]
    SecretMismatch(String),

    /// The agent has no platform credential on file
    #[error("biometric credential not registered for agent {0}")]
    BiometricNotRegistered(String),

    /// The platform refused or failed the ceremony
    #[error("biometric ceremony failed: {0}")]
    BiometricCeremonyFailed(String),

    /// No platform authenticator on this device
    #[error("biometric authenticator unavailable")]
    BiometricUnavailable,

    /// Remote directory could not be reached or parsed
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[from] DirectoryError),

    /// Notification preference mirror failed
    #[error("preference sync failed: {0}")]
    PreferenceSyncFailed(String),

    /// Promotion requirements not met
    #[error("promotion rejected for rank {rank}: {reason}")]
    PromotionRejected {
        /// Rank at the time of the request
        rank: String,
        /// Human-readable reason
        reason: String,
    },

    /// Operation needs a logged-in agent
    #[error("no active session")]
    NoActiveSession,

    /// Directory declined a reset or secret change
    #[error("reset rejected: {0}")]
    ResetRejected(String),

    /// Local persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Platform collaborator failed
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Timeout
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl RosterError {
    /// Errors raised while proving identity
    #[inline]
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::IdentityNotFound(_)
                | Self::SecretMismatch(_)
                | Self::BiometricNotRegistered(_)
                | Self::BiometricCeremonyFailed(_)
                | Self::BiometricUnavailable
        )
    }

    /// Errors the user should see, as opposed to ones logged and absorbed
    #[inline]
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        !matches!(
            self,
            Self::DirectoryUnavailable(_) | Self::PreferenceSyncFailed(_)
        )
    }

    /// Short machine reason used in telemetry
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::IdentityNotFound(_) => "id_not_found",
            Self::SecretMismatch(_) => "wrong_pin",
            Self::BiometricNotRegistered(_) => "biometric_not_registered",
            Self::BiometricCeremonyFailed(_) => "biometric_failed",
            Self::BiometricUnavailable => "biometric_unavailable",
            Self::DirectoryUnavailable(_) => "directory_unavailable",
            Self::PreferenceSyncFailed(_) => "preference_sync_failed",
            Self::PromotionRejected { .. } => "promotion_rejected",
            Self::NoActiveSession => "no_session",
            Self::ResetRejected(_) => "reset_rejected",
            Self::Storage(_) => "storage",
            Self::Platform(_) => "platform",
            Self::Config(_) => "config",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Remote directory errors
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Network failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status
    #[error("http status {0}")]
    Status(u16),

    /// Body could not be interpreted as a roster or response
    #[error("invalid response: {0}")]
    Parse(String),

    /// The backend reported an error payload
    #[error("backend error: {0}")]
    Backend(String),

    /// Request exceeded its deadline
    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Key-value store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing file could not be read or written
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Platform collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Capability missing on this platform
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The platform call failed
    #[error("platform call failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_errors_are_surfaced() {
        let err = RosterError::SecretMismatch("V-1".into());
        assert!(err.is_authentication());
        assert!(err.is_surfaced());
        assert_eq!(err.reason(), "wrong_pin");
    }

    #[test]
    fn sync_errors_are_absorbed() {
        let err = RosterError::from(DirectoryError::Status(503));
        assert!(!err.is_authentication());
        assert!(!err.is_surfaced());
        assert!(!RosterError::PreferenceSyncFailed("x".into()).is_surfaced());
    }

    #[test]
    fn promotion_rejection_display() {
        let err = RosterError::PromotionRejected {
            rank: "RECLUTA".into(),
            reason: "missing 230 xp".into(),
        };
        assert!(err.to_string().contains("RECLUTA"));
    }
}
