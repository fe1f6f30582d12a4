//! Platform authenticator contract
//!
//! A public-key challenge/response ceremony run by the device. Private key
//! material never leaves the platform; the client only ever sees the raw
//! credential id, which it stores as an opaque handle.

use async_trait::async_trait;
use std::time::Duration;

/// Origin the credential is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    /// Host name of the app origin
    pub id: String,
    /// Display name
    pub name: String,
}

/// Registration ceremony parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOptions {
    /// Fresh random challenge
    pub challenge: Vec<u8>,
    /// Scope of the credential
    pub relying_party: RelyingParty,
    /// User handle (the agent id bytes)
    pub user_id: Vec<u8>,
    /// Account name shown by the platform
    pub user_name: String,
    /// Display name shown by the platform
    pub display_name: String,
    /// Raw ids the platform must refuse to register again
    pub exclude_credentials: Vec<Vec<u8>>,
    /// Require a built-in (platform) authenticator
    pub platform_attachment: bool,
    /// Require user verification (biometric or device PIN)
    pub user_verification_required: bool,
    /// Ceremony deadline
    pub timeout: Duration,
}

/// Assertion ceremony parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOptions {
    /// Fresh random challenge
    pub challenge: Vec<u8>,
    /// Origin host
    pub relying_party_id: String,
    /// Raw ids allowed to answer
    pub allow_credentials: Vec<Vec<u8>>,
    /// Require user verification
    pub user_verification_required: bool,
    /// Ceremony deadline
    pub timeout: Duration,
}

/// Result of an assertion ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Raw id of the credential that answered
    pub credential_id: Vec<u8>,
    /// Platform confirmed user verification
    pub user_verified: bool,
}

/// Ceremony failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CeremonyError {
    /// An excluded credential already exists on this device
    #[error("credential already registered on this device")]
    AlreadyRegistered,

    /// User cancelled or the platform refused
    #[error("ceremony cancelled or not allowed")]
    NotAllowed,

    /// Ceremony exceeded its deadline
    #[error("ceremony timed out after {0}ms")]
    Timeout(u64),

    /// Stored handle cannot be decoded
    #[error("invalid credential handle: {0}")]
    InvalidHandle(String),

    /// Any other platform failure
    #[error("platform authenticator error: {0}")]
    Platform(String),
}

/// Device authenticator
#[async_trait]
pub trait BiometricProvider: Send + Sync {
    /// Whether a user-verifying platform authenticator is present
    async fn is_available(&self) -> bool;

    /// Run a registration ceremony; returns the raw credential id
    async fn create_credential(&self, options: &RegistrationOptions)
        -> Result<Vec<u8>, CeremonyError>;

    /// Run an assertion ceremony
    async fn get_assertion(&self, options: &AssertionOptions) -> Result<Assertion, CeremonyError>;
}
