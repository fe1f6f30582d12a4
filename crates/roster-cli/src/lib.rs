//! Roster CLI - terminal front end for the roster client
//!
//! Runs the same session and sync machinery as the app against a file
//! backed durable store.

pub mod commands;
pub mod host;

pub use commands::{LoginReport, ProgressReport, SyncReport};
pub use host::{ConsoleHost, NoAuthenticator};
