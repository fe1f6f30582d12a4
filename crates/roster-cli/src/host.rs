//! Terminal stand-ins for the browser platform

use async_trait::async_trait;
use roster_core::{
    Assertion, AssertionOptions, BiometricProvider, CeremonyError, PlatformError, PlatformHost,
    RegistrationOptions, ReloadReason,
};
use std::io::{self, BufRead, Write};

/// Host for a terminal session. There is nothing to reload and no offline
/// cache, so those requests are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleHost {
    assume_yes: bool,
}

impl ConsoleHost {
    /// `assume_yes` answers every confirmation without prompting
    #[inline]
    #[must_use]
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl PlatformHost for ConsoleHost {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let mut stdout = io::stdout().lock();
        if write!(stdout, "{prompt} [y/N] ").and_then(|()| stdout.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes" | "YES")
    }

    fn is_standalone(&self) -> bool {
        false
    }

    fn request_reload(&self, reason: ReloadReason) {
        tracing::info!(?reason, "reload requested");
    }

    async fn clear_offline_caches(&self) -> Result<usize, PlatformError> {
        Ok(0)
    }

    async fn unregister_background_sync(&self) -> Result<usize, PlatformError> {
        Ok(0)
    }
}

/// Terminals have no platform authenticator
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthenticator;

#[async_trait]
impl BiometricProvider for NoAuthenticator {
    async fn is_available(&self) -> bool {
        false
    }

    async fn create_credential(
        &self,
        _options: &RegistrationOptions,
    ) -> Result<Vec<u8>, CeremonyError> {
        Err(CeremonyError::Platform("no platform authenticator".into()))
    }

    async fn get_assertion(&self, _options: &AssertionOptions) -> Result<Assertion, CeremonyError> {
        Err(CeremonyError::Platform("no platform authenticator".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_has_no_authenticator() {
        assert!(!NoAuthenticator.is_available().await);
    }

    #[test]
    fn assume_yes_skips_the_prompt() {
        assert!(ConsoleHost::new(true).confirm("wipe?"));
    }
}
