//! Roster Directory - remote roster mapping and synchronisation
//!
//! Turns whatever the remote directory answers into `Agent` records and
//! keeps the local cache in step with it:
//! - `aliases`: logical field → accepted column names (data, not code)
//! - `rows`: matrix / object-array normalisation into one row accessor
//! - `mapper`: row → agent, with derived experience and role
//! - `engine`: backoff-guarded fetch, self-refresh and mirroring
//! - `http`: the HTTP implementation of the directory contracts
//!
//! # Example
//!
//! ```rust,ignore
//! use roster_directory::SyncEngine;
//!
//! let engine = Arc::new(SyncEngine::new(directory, writer, session, clock, policy));
//! let _refresh = engine.spawn_refresh();
//! let agents = engine.fetch_all().await;
//! ```

#![warn(unreachable_pub)]

pub mod aliases;
pub mod engine;
pub mod http;
pub mod mapper;
pub mod rows;

pub use aliases::Field;
pub use engine::{SyncEngine, SyncState};
pub use http::HttpDirectory;
pub use mapper::AgentMapper;
pub use rows::{normalise, Row};
