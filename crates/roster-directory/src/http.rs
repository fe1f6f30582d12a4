//! HTTP remote directory
//!
//! The backend is a single endpoint:
//! - `GET {endpoint}?timestamp={ms}` returns the roster
//! - `POST {endpoint}` with a `{"action": ..., "data": ...}` body (sent as
//!   `text/plain`) performs writes and answers `{"success": bool, "error": ...}`

use async_trait::async_trait;
use roster_core::{
    Agent, DirectoryEndpoint, DirectoryError, NotificationPreferences, PromotionRequest,
    RemoteDirectory, ResetResponse, RosterMirror, SecretChange,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Backend action names
pub mod actions {
    /// Check a security answer and reveal the PIN
    pub const RESET_SECRET: &str = "reset_password_with_answer";
    /// Replace a PIN
    pub const UPDATE_SECRET: &str = "update_user_password";
    /// Record a promotion
    pub const PROMOTE: &str = "promote_agent";
    /// Mirror notification preferences
    pub const UPDATE_NOTIFICATION_PREFS: &str = "update_notif_prefs";
    /// Attach a platform credential
    pub const REGISTER_BIOMETRIC: &str = "register_biometric";
    /// Upsert the whole roster
    pub const SYNC_ROSTER: &str = "sync_roster";
}

#[derive(Debug, Default, Deserialize)]
struct ActionReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    count: Option<usize>,
}

/// Remote directory over HTTP
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    endpoint: String,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl HttpDirectory {
    /// Create a client for `config.endpoint`
    #[must_use]
    pub fn new(config: &DirectoryEndpoint) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("roster/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: config.endpoint.clone(),
            timeout_ms: config.request_timeout_ms,
            client,
        }
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport(&self, err: &reqwest::Error) -> DirectoryError {
        if err.is_timeout() {
            DirectoryError::Timeout(self.timeout_ms)
        } else {
            DirectoryError::Transport(err.to_string())
        }
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<Value, DirectoryError> {
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let body = response.text().await.map_err(|e| self.transport(&e))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post(&self, action: &str, data: Value) -> Result<Value, DirectoryError> {
        tracing::debug!(action, "directory action");
        let body = json!({ "action": action, "data": data }).to_string();
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport(&e))?;
        self.read_json(response).await
    }

    async fn post_checked(&self, action: &str, data: Value) -> Result<ActionReply, DirectoryError> {
        let reply: ActionReply = serde_json::from_value(self.post(action, data).await?)?;
        if reply.success {
            Ok(reply)
        } else {
            Err(DirectoryError::Backend(
                reply.error.unwrap_or_else(|| format!("{action} rejected")),
            ))
        }
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[async_trait]
impl RemoteDirectory for HttpDirectory {
    async fn fetch(&self) -> Result<Value, DirectoryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("timestamp", now_ms().to_string())])
            .send()
            .await
            .map_err(|e| self.transport(&e))?;
        self.read_json(response).await
    }

    async fn reset_secret_by_answer(
        &self,
        agent_id: &str,
        answer: &str,
    ) -> Result<ResetResponse, DirectoryError> {
        let reply = self
            .post(actions::RESET_SECRET, json!({ "agentId": agent_id, "answer": answer }))
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    async fn promote(&self, request: &PromotionRequest) -> Result<(), DirectoryError> {
        self.post_checked(actions::PROMOTE, serde_json::to_value(request)?)
            .await
            .map(drop)
    }

    async fn update_notification_prefs(
        &self,
        agent_id: &str,
        prefs: &NotificationPreferences,
    ) -> Result<(), DirectoryError> {
        self.post_checked(
            actions::UPDATE_NOTIFICATION_PREFS,
            json!({ "agentId": agent_id, "prefs": prefs }),
        )
        .await
        .map(drop)
    }

    async fn update_secret(&self, change: &SecretChange) -> Result<(), DirectoryError> {
        self.post_checked(actions::UPDATE_SECRET, serde_json::to_value(change)?)
            .await
            .map(drop)
    }

    async fn register_biometric(
        &self,
        agent_id: &str,
        handle: &str,
    ) -> Result<(), DirectoryError> {
        self.post_checked(
            actions::REGISTER_BIOMETRIC,
            json!({ "agentId": agent_id, "credential": handle }),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl RosterMirror for HttpDirectory {
    async fn push(&self, agents: &[Agent]) -> Result<usize, DirectoryError> {
        let reply = self
            .post_checked(actions::SYNC_ROSTER, serde_json::to_value(agents)?)
            .await?;
        Ok(reply.count.unwrap_or(agents.len()))
    }
}
