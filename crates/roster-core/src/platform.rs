//! Host platform contracts: reload, caches, reachability, telemetry

use crate::error::PlatformError;
use async_trait::async_trait;

/// Why the host is asked to reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// Logout keeping the remembered identity
    SoftLogout,
    /// Logout forgetting everything but the allow-list
    FullLogout,
    /// Everything destroyed, including platform caches
    HardReset,
}

/// The embedding application
#[async_trait]
pub trait PlatformHost: Send + Sync {
    /// Ask the user to confirm an irreversible action
    fn confirm(&self, prompt: &str) -> bool;

    /// Running as an installed / standalone app
    fn is_standalone(&self) -> bool;

    /// Reload so no in-memory component keeps acting on stale state
    fn request_reload(&self, reason: ReloadReason);

    /// Drop offline asset caches; returns how many were removed
    async fn clear_offline_caches(&self) -> Result<usize, PlatformError>;

    /// Drop background sync registrations; returns how many were removed
    async fn unregister_background_sync(&self) -> Result<usize, PlatformError>;
}

/// Online/offline signal
pub trait NetworkReachability: Send + Sync {
    /// Whether the network is currently reachable
    fn is_online(&self) -> bool;
}

/// Reachability for hosts without a signal
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkReachability for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Fire-and-forget analytics event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    /// Event name
    pub name: &'static str,
    /// Attributes
    pub attributes: Vec<(&'static str, String)>,
}

impl TelemetryEvent {
    /// New event without attributes
    #[inline]
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute
    #[inline]
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((key, value.into()));
        self
    }

    /// Look up an attribute
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Telemetry consumer supplied by the host
pub trait TelemetrySink: Send + Sync {
    /// Record an event; must not block
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        tracing::info!(target: "roster::telemetry", event = event.name, attributes = ?event.attributes);
    }
}
