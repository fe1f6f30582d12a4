//! Subcommand implementations
//!
//! Each command returns a serialisable report; `main` decides whether to
//! print it as text or JSON.

use crate::host::{ConsoleHost, NoAuthenticator};
use anyhow::Context as _;
use roster_core::promotion::{self, PromotionProgress};
use roster_core::{
    AlwaysOnline, FileStore, KeyValueStore, MemoryStore, RemoteDirectory, Role, RosterConfig,
    SystemClock, TracingTelemetry,
};
use roster_directory::HttpDirectory;
use roster_session::{SessionManager, SessionServices};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// File holding the durable store inside the data directory
pub const DURABLE_FILE: &str = "durable.json";

/// Wire services for a terminal run. The tab store lives for the process.
#[must_use]
pub fn services(
    directory: Arc<dyn RemoteDirectory>,
    durable: Arc<dyn KeyValueStore>,
    assume_yes: bool,
) -> SessionServices {
    SessionServices {
        directory,
        mirror: None,
        biometric: Arc::new(NoAuthenticator),
        host: Arc::new(ConsoleHost::new(assume_yes)),
        network: Arc::new(AlwaysOnline),
        telemetry: Arc::new(TracingTelemetry),
        clock: Arc::new(SystemClock),
        tab: Arc::new(MemoryStore::new()),
        durable,
    }
}

/// Open the manager against the configured HTTP directory
pub fn open(config: &RosterConfig, data_dir: &Path, assume_yes: bool) -> anyhow::Result<Arc<SessionManager>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let durable = FileStore::open(data_dir.join(DURABLE_FILE))
        .with_context(|| format!("opening durable store in {}", data_dir.display()))?;
    let directory = Arc::new(HttpDirectory::new(&config.directory));
    tracing::debug!(endpoint = directory.endpoint(), "directory configured");
    let manager = SessionManager::new(
        config.clone(),
        services(directory, Arc::new(durable), assume_yes),
    )?;
    Ok(manager)
}

/// Result of `sync`
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Agents returned by this fetch; 0 when skipped or failed
    pub agents: usize,
    /// Agents held in the cache afterwards
    pub cached: usize,
    /// Failed fetches since the last success
    pub consecutive_failures: u32,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.agents > 0 {
            write!(f, "synced {} agents", self.agents)
        } else if self.consecutive_failures > 0 {
            write!(
                f,
                "directory unavailable ({} failures), {} agents cached",
                self.consecutive_failures, self.cached
            )
        } else {
            write!(f, "no change, {} agents cached", self.cached)
        }
    }
}

/// Fetch the roster once
pub async fn sync(manager: &SessionManager) -> SyncReport {
    let agents = manager.sync().fetch_all().await.len();
    SyncReport {
        agents,
        cached: manager.cache().len(),
        consecutive_failures: manager.sync().sync_state().consecutive_failures,
    }
}

/// Result of `login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginReport {
    /// Canonical agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Current rank
    pub rank: String,
    /// Derived role
    pub role: Role,
    /// Derived experience total
    pub xp: u64,
    /// Certificates earned
    pub certificates: u32,
    /// How the session was established
    pub method: &'static str,
}

impl fmt::Display for LoginReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "welcome {} ({}) - {} {}, {} xp, {} certificates",
            self.name,
            self.id,
            self.role.as_str(),
            self.rank,
            self.xp,
            self.certificates
        )
    }
}

/// Sync, then log in with identifier and PIN
pub async fn login(manager: &SessionManager, identifier: &str, pin: &str) -> anyhow::Result<LoginReport> {
    sync(manager).await;
    let session = manager.login(identifier, pin)?;
    let agent = &session.agent;
    Ok(LoginReport {
        id: agent.id.clone(),
        name: agent.name.clone(),
        rank: agent.rank.clone(),
        role: agent.role,
        xp: agent.experience_total(),
        certificates: agent.certificates,
        method: session.method.as_str(),
    })
}

/// Result of `progress`
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    /// Canonical agent id
    pub id: String,
    /// Display name
    pub name: String,
    /// Progress towards the next rank
    #[serde(flatten)]
    pub progress: PromotionProgress,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.progress;
        let Some(next) = &p.next_rank else {
            return write!(f, "{} holds {}, the highest rank", self.name, p.current_rank);
        };
        writeln!(f, "{}: {} -> {}", self.name, p.current_rank, next)?;
        writeln!(f, "  xp           {:>5.1}% (missing {})", p.xp_progress_pct, p.missing_xp)?;
        writeln!(
            f,
            "  certificates {:>5.1}% (missing {})",
            p.cert_progress_pct, p.missing_certificates
        )?;
        write!(f, "  eligible     {}", p.is_eligible())
    }
}

/// Sync, then report promotion progress for `identifier`
pub async fn progress(
    manager: &SessionManager,
    config: &RosterConfig,
    identifier: &str,
) -> anyhow::Result<ProgressReport> {
    sync(manager).await;
    let agent = manager.credentials().resolve(identifier)?;
    Ok(ProgressReport {
        progress: promotion::progress(&agent, &config.rank_table),
        id: agent.id,
        name: agent.name,
    })
}

/// Effective configuration as TOML
pub fn render_config(config: &RosterConfig) -> anyhow::Result<String> {
    Ok(config.to_toml_string()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use roster_core::ExperienceComponents;
    use roster_test_utils::{agent, ScriptedDirectory};

    fn manager(durable: Arc<dyn KeyValueStore>) -> Arc<SessionManager> {
        let directory = ScriptedDirectory::new(&[agent("V-12345678", "Ana", "1234")
            .with_experience(ExperienceComponents::new(100, 100, 50))
            .with_certificates(2)]);
        SessionManager::new(RosterConfig::default(), services(directory, durable, true)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn login_remembers_the_agent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DURABLE_FILE);
        let report = {
            let manager = manager(Arc::new(FileStore::open(&path).unwrap()));
            login(&manager, "12345678", "1234").await.unwrap()
        };
        assert_eq!(report.id, "V-12345678");
        assert_eq!(report.xp, 250);
        assert_eq!(report.method, "password");

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(roster_core::store::keys::LAST_LOGIN_ID).unwrap().as_deref(),
            Some("V-12345678")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reports_missing_requirements() {
        let manager = manager(Arc::new(MemoryStore::new()));
        let report = progress(&manager, &RosterConfig::default(), "V-12345678")
            .await
            .unwrap();
        assert_eq!(report.progress.missing_xp, 50);
        assert_eq!(report.progress.missing_certificates, 3);
        assert!(report.to_string().contains("RECLUTA -> ACTIVO"));
    }

    #[tokio::test(start_paused = true)]
    async fn sync_report_counts_agents() {
        let manager = manager(Arc::new(MemoryStore::new()));
        let report = sync(&manager).await;
        assert_eq!(report.agents, 1);
        assert_eq!(report.to_string(), "synced 1 agents");
    }

    #[test]
    fn config_renders_as_toml() {
        let rendered = render_config(&RosterConfig::default()).unwrap();
        assert!(rendered.contains("[session]"));
        assert!(RosterConfig::from_toml_str(&rendered).is_ok());
    }
}
