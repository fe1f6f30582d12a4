//! Credential verifier
//!
//! Identifier resolution is two-pass:
//! 1. case-insensitive exact match on the trimmed id
//! 2. when that fails and the input carries more than three digits, match
//!    on the digits of both sides (`V-12.345.678` finds `12345678`)

use roster_core::text::{digits, same_id};
use roster_core::{Agent, AgentDirectoryCache, RemoteDirectory, RosterError, Secret};
use std::fmt;
use std::sync::Arc;

/// Minimum digit count before the digits-only fallback is tried
const DIGIT_FALLBACK_MIN: usize = 4;

/// PIN revealed by a successful reset; redacted in `Debug`, wiped on drop
#[derive(Clone, PartialEq, Eq)]
pub struct RevealedSecret(Secret);

impl RevealedSecret {
    /// The revealed PIN, for display to the user only
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RevealedSecret(***)")
    }
}

/// Matches identifiers and secrets against the directory cache
#[derive(Clone)]
pub struct CredentialVerifier {
    cache: AgentDirectoryCache,
    directory: Arc<dyn RemoteDirectory>,
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("agents", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl CredentialVerifier {
    /// Create a verifier over `cache`
    #[must_use]
    pub fn new(cache: AgentDirectoryCache, directory: Arc<dyn RemoteDirectory>) -> Self {
        Self { cache, directory }
    }

    /// Exact match, then digits-only fallback
    pub fn resolve(&self, identifier: &str) -> Result<Agent, RosterError> {
        let input = identifier.trim();
        if input.is_empty() {
            return Err(RosterError::IdentityNotFound(String::new()));
        }
        if let Some(agent) = self.cache.get(input) {
            return Ok(agent);
        }
        let wanted = digits(input);
        if wanted.len() >= DIGIT_FALLBACK_MIN {
            if let Some(agent) = self.cache.find(|a| digits(&a.id) == wanted) {
                return Ok(agent);
            }
        }
        Err(RosterError::IdentityNotFound(input.to_string()))
    }

    /// Digits-only match, used by biometric login where ids are typed on a
    /// numeric keypad; falls back to an exact match when no digits are given
    pub fn resolve_by_digits(&self, identifier: &str) -> Result<Agent, RosterError> {
        let input = identifier.trim();
        let wanted = digits(input);
        if wanted.is_empty() {
            return self
                .cache
                .find(|a| !input.is_empty() && same_id(&a.id, input))
                .ok_or_else(|| RosterError::IdentityNotFound(input.to_string()));
        }
        self.cache
            .find(|a| digits(&a.id) == wanted)
            .ok_or_else(|| RosterError::IdentityNotFound(input.to_string()))
    }

    /// Resolve and compare the secret (trimmed string equality)
    pub fn verify(&self, identifier: &str, secret: &str) -> Result<Agent, RosterError> {
        let agent = self.resolve(identifier)?;
        if agent.secret.is_empty() || !agent.secret.matches(secret) {
            return Err(RosterError::SecretMismatch(agent.id));
        }
        Ok(agent)
    }

    /// Security question of the resolved agent
    pub fn security_question(&self, identifier: &str) -> Result<String, RosterError> {
        let agent = self.resolve(identifier)?;
        let question = agent.security_question.trim();
        if question.is_empty() {
            return Err(RosterError::ResetRejected(format!(
                "no security question on file for {}",
                agent.id
            )));
        }
        Ok(question.to_string())
    }

    /// Check `answer` with the directory and reveal the PIN on success
    pub async fn reset_by_security_question(
        &self,
        identifier: &str,
        answer: &str,
    ) -> Result<RevealedSecret, RosterError> {
        let agent_id = self
            .resolve(identifier)
            .map(|agent| agent.id)
            .unwrap_or_else(|_| identifier.trim().to_string());
        let reply = self
            .directory
            .reset_secret_by_answer(&agent_id, answer.trim())
            .await?;

        match reply.revealed_secret {
            Some(secret) if reply.success && !secret.trim().is_empty() => {
                tracing::info!(agent_id = %agent_id, "secret reset accepted");
                Ok(RevealedSecret(Secret::new(secret)))
            }
            _ => {
                tracing::info!(agent_id = %agent_id, "secret reset refused");
                Err(RosterError::ResetRejected(
                    reply.error.unwrap_or_else(|| "incorrect answer".to_string()),
                ))
            }
        }
    }
}
