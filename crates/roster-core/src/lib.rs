//! Roster Core - member records and session primitives
//!
//! The leaf crate of the roster client. It owns:
//! - The `Agent` record and its derived fields
//! - The shared session cell and remembered identity
//! - Key-value stores (tab-scoped and durable)
//! - The agent directory cache with its single writer
//! - Collaborator contracts (remote directory, authenticator, platform,
//!   telemetry)
//! - Promotion eligibility rules
//!
//! # Example
//!
//! ```rust,ignore
//! use roster_core::prelude::*;
//!
//! let table = RankTable::default();
//! let progress = promotion::progress(&agent, &table);
//! if progress.is_eligible() {
//!     println!("ready for {}", progress.next_rank.unwrap_or_default());
//! }
//! ```

#![warn(unreachable_pub)]

pub mod agent;
pub mod authenticator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod directory;
pub mod error;
pub mod platform;
pub mod promotion;
pub mod session;
pub mod store;
pub mod subscription;
pub mod text;

pub use agent::{Agent, ExperienceComponents, NotificationPreferences, Role, Secret};
pub use authenticator::{
    Assertion, AssertionOptions, BiometricProvider, CeremonyError, RegistrationOptions,
    RelyingParty,
};
pub use cache::{AgentDirectoryCache, CacheWriter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BiometricPolicy, DirectoryEndpoint, NotificationPolicy, RoleRule, RoleRuleTarget,
    RosterConfig, SessionPolicy, SyncPolicy,
};
pub use debounce::Debouncer;
pub use directory::{
    PromotionRequest, RemoteDirectory, ResetResponse, RosterMirror, SecretChange,
};
pub use error::{DirectoryError, PlatformError, RosterError, StoreError};
pub use platform::{
    AlwaysOnline, NetworkReachability, PlatformHost, ReloadReason, TelemetryEvent,
    TelemetrySink, TracingTelemetry,
};
pub use promotion::{PromotionProgress, PromotionRecord, PromotionRule, RankTable};
pub use session::{LoginMethod, RememberedIdentity, Session, SessionCell, SessionId};
pub use store::{FileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};
pub use subscription::{Subscription, Subscriptions};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the roster core
    pub use crate::{
        Agent, AgentDirectoryCache, Clock, KeyValueStore, KeyValueStoreExt, RankTable,
        RemoteDirectory, Role, RosterConfig, RosterError, Session, SessionCell,
    };
    pub use crate::promotion;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
