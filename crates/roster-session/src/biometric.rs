//! Biometric authenticator
//!
//! Wraps the platform ceremony with fresh random challenges, the ceremony
//! deadline and handle encoding. Handles are the base64url (unpadded) raw
//! credential id; nothing else about the credential is kept.
//!
//! Verification is a local gate: it never contacts the remote directory.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::RngCore;
use roster_core::{
    AssertionOptions, BiometricPolicy, BiometricProvider, CeremonyError, RegistrationOptions,
    RelyingParty, RosterError,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

/// Encode a raw credential id as a storable handle
#[must_use]
pub fn encode_handle(raw_id: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw_id)
}

/// Decode a stored handle; tolerates trailing padding and handles written
/// with the standard alphabet (`+` and `/`)
pub fn decode_handle(handle: &str) -> Result<Vec<u8>, CeremonyError> {
    let trimmed = handle.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(CeremonyError::InvalidHandle("empty handle".to_string()));
    }
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| CeremonyError::InvalidHandle(e.to_string()))
}

fn ceremony_failed(err: &CeremonyError) -> RosterError {
    RosterError::BiometricCeremonyFailed(err.to_string())
}

/// Platform ceremony wrapper
pub struct BiometricAuthenticator {
    provider: Arc<dyn BiometricProvider>,
    policy: BiometricPolicy,
    available: OnceCell<bool>,
}

impl fmt::Debug for BiometricAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiometricAuthenticator")
            .field("policy", &self.policy)
            .field("available", &self.available.get())
            .finish_non_exhaustive()
    }
}

impl BiometricAuthenticator {
    /// Create an authenticator over `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn BiometricProvider>, policy: BiometricPolicy) -> Self {
        Self {
            provider,
            policy,
            available: OnceCell::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.policy.ceremony_timeout_ms)
    }

    fn challenge(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(vec![0u8; self.policy.challenge_len]);
        rand::rng().fill_bytes(bytes.as_mut_slice());
        bytes
    }

    async fn bounded<T, F>(&self, ceremony: F) -> Result<T, CeremonyError>
    where
        F: std::future::Future<Output = Result<T, CeremonyError>>,
    {
        tokio::time::timeout(self.timeout(), ceremony)
            .await
            .map_err(|_| CeremonyError::Timeout(self.policy.ceremony_timeout_ms))?
    }

    /// Capability probe, asked of the platform once per authenticator
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let available = self.provider.is_available().await;
                tracing::debug!(available, "platform authenticator probed");
                available
            })
            .await
    }

    /// Register a credential for an agent; returns the handle to store.
    ///
    /// `existing` is excluded so the platform refuses a duplicate.
    pub async fn register(
        &self,
        agent_id: &str,
        agent_name: &str,
        existing: Option<&str>,
    ) -> Result<String, RosterError> {
        if !self.is_available().await {
            return Err(RosterError::BiometricUnavailable);
        }
        let exclude_credentials = existing
            .filter(|h| !h.trim().is_empty())
            .and_then(|h| decode_handle(h).ok())
            .into_iter()
            .collect();
        let options = RegistrationOptions {
            challenge: self.challenge().to_vec(),
            relying_party: RelyingParty {
                id: self.policy.relying_party_id.clone(),
                name: self.policy.relying_party_name.clone(),
            },
            user_id: agent_id.as_bytes().to_vec(),
            user_name: agent_id.to_string(),
            display_name: agent_name.to_string(),
            exclude_credentials,
            platform_attachment: true,
            user_verification_required: true,
            timeout: self.timeout(),
        };

        match self.bounded(self.provider.create_credential(&options)).await {
            Ok(raw_id) => {
                tracing::info!(agent_id, "biometric credential registered");
                Ok(encode_handle(&raw_id))
            }
            Err(err) => {
                tracing::warn!(agent_id, error = %err, "biometric registration failed");
                Err(ceremony_failed(&err))
            }
        }
    }

    /// Run an assertion constrained to `handle`.
    ///
    /// `Ok(false)` means the platform answered without confirming the user
    /// (declined, or another credential answered).
    pub async fn verify(&self, handle: &str) -> Result<bool, RosterError> {
        if !self.is_available().await {
            return Err(RosterError::BiometricUnavailable);
        }
        let raw_id = decode_handle(handle).map_err(|e| ceremony_failed(&e))?;
        let options = AssertionOptions {
            challenge: self.challenge().to_vec(),
            relying_party_id: self.policy.relying_party_id.clone(),
            allow_credentials: vec![raw_id.clone()],
            user_verification_required: true,
            timeout: self.timeout(),
        };

        match self.bounded(self.provider.get_assertion(&options)).await {
            Ok(assertion) => Ok(assertion.user_verified && assertion.credential_id == raw_id),
            Err(CeremonyError::NotAllowed) => {
                tracing::debug!("biometric assertion declined");
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(error = %err, "biometric assertion failed");
                Err(ceremony_failed(&err))
            }
        }
    }
}
