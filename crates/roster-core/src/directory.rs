//! Remote directory contracts
//!
//! Transport and format belong to the implementation; the client only
//! relies on these request/response shapes.

use crate::agent::{Agent, NotificationPreferences};
use crate::error::DirectoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reply to a reset-by-security-question request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetResponse {
    /// Whether the answer was accepted
    #[serde(default)]
    pub success: bool,
    /// Current PIN, only when accepted
    #[serde(default, alias = "pin", alias = "revealedSecret")]
    pub revealed_secret: Option<String>,
    /// Backend message on refusal
    #[serde(default)]
    pub error: Option<String>,
}

/// Promotion write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRequest {
    /// Agent being promoted
    pub agent_id: String,
    /// Display name, kept in the promotion log
    pub agent_name: String,
    /// Rank after promotion
    pub new_rank: String,
    /// Experience at promotion time
    pub xp: u64,
    /// Certificates at promotion time
    pub certificates: u32,
}

/// PIN change write
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretChange {
    /// Agent whose PIN changes
    pub agent_id: String,
    /// New PIN
    pub new_pin: String,
    /// Optional new security question
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Optional new security answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

/// The authoritative member directory
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Raw roster: a header-row matrix, an array of objects, or either
    /// wrapped in `{ "data": ... }`
    async fn fetch(&self) -> Result<serde_json::Value, DirectoryError>;

    /// Check a security answer and reveal the PIN on success
    async fn reset_secret_by_answer(
        &self,
        agent_id: &str,
        answer: &str,
    ) -> Result<ResetResponse, DirectoryError>;

    /// Record a promotion
    async fn promote(&self, request: &PromotionRequest) -> Result<(), DirectoryError>;

    /// Mirror an agent's read/deleted notification sets
    async fn update_notification_prefs(
        &self,
        agent_id: &str,
        prefs: &NotificationPreferences,
    ) -> Result<(), DirectoryError>;

    /// Replace an agent's PIN (and optionally the security pair)
    async fn update_secret(&self, change: &SecretChange) -> Result<(), DirectoryError>;

    /// Attach a platform credential handle to an agent
    async fn register_biometric(&self, agent_id: &str, handle: &str)
        -> Result<(), DirectoryError>;
}

/// Secondary store receiving a copy of the roster
#[async_trait]
pub trait RosterMirror: Send + Sync {
    /// Upsert the whole roster; returns how many rows were written
    async fn push(&self, agents: &[Agent]) -> Result<usize, DirectoryError>;
}
