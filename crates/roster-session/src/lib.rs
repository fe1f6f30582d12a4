//! Roster Session - login, idle expiry and per-device state
//!
//! Everything that happens between "who is this" and "log them out":
//! - `credentials`: identifier resolution, PIN check, security-question reset
//! - `biometric`: platform credential registration and local verification
//! - `idle`: activity-driven idle state and the offline watchdog
//! - `persistence`: tab and durable store layering with the logout allow-list
//! - `reconciler`: read/deleted notification ids, local-first
//! - `manager`: the session lifecycle tying the above together
//!
//! # Example
//!
//! ```rust,ignore
//! use roster_session::{SessionManager, SessionServices};
//!
//! let manager = SessionManager::new(config, services)?;
//! manager.sync().fetch_all().await;
//! let session = manager.login("V-12345678", "1234")?;
//! ```

#![warn(unreachable_pub)]

pub mod biometric;
pub mod credentials;
pub mod idle;
pub mod manager;
pub mod persistence;
pub mod reconciler;

pub use biometric::{decode_handle, encode_handle, BiometricAuthenticator};
pub use credentials::{CredentialVerifier, RevealedSecret};
pub use idle::{ActivityEvent, IdleMonitor, IdleState, OfflineVerdict, OfflineWatchdog};
pub use manager::{RestoreOutcome, SessionManager, SessionServices};
pub use persistence::{survives_logout, SessionStore};
pub use reconciler::NotificationReconciler;
