//! # Mandi Agent Library
//!
//! Hosts the sync engine as a long-running process.
//!
//! ## Module Organization
//! ```text
//! mandi_agent/
//! ├── lib.rs          ◄─── You are here (startup, wiring, shutdown)
//! └── error.rs        ◄─── Startup error type
//! ```

pub mod error;

use std::path::PathBuf;
use std::sync::Arc;

use directories::ProjectDirs;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mandi_db::{Database, DbConfig};
use mandi_sync::{
    AgentSettings, MarketFeedClient, NetworkMonitor, NetworkState, RetryPolicy, SyncAgent,
    SyncClient, SyncConfig, SyncCoordinator,
};

pub use error::{AgentError, AgentResult};

pub const USAGE: &str = "\
Usage: mandi-agent [OPTIONS]

Options:
  -c, --config <PATH>  Config file (default: platform config dir/sync.toml)
      --offline        Start with the network reported as offline
      --feed           Fetch the market price feed once and exit
  -h, --help           Show this help";

/// Command-line options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentArgs {
    pub config_path: Option<PathBuf>,
    pub offline: bool,
    pub feed: bool,
    pub help: bool,
}

impl AgentArgs {
    pub fn parse<I>(args: I) -> AgentResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = AgentArgs::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args
                        .next()
                        .ok_or_else(|| AgentError::InvalidArgs(format!("{arg} needs a path")))?;
                    parsed.config_path = Some(PathBuf::from(path));
                }
                "--offline" => parsed.offline = true,
                "--feed" => parsed.feed = true,
                "--help" | "-h" => parsed.help = true,
                other => {
                    return Err(AgentError::InvalidArgs(format!("unknown argument: {other}")));
                }
            }
        }

        Ok(parsed)
    }
}

/// Runs the agent until Ctrl+C or SIGTERM.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                         Agent Startup                                   │
/// │                                                                         │
/// │  1. Load Config ── sync.toml + MANDI_* overrides, then validate        │
/// │  2. Resolve DB Path ── MANDI_DB_PATH → [database].path → data dir      │
/// │  3. Open Database ── WAL, migrations, legacy table import              │
/// │  4. Wire Sync ── SyncClient → SyncCoordinator → SyncAgent              │
/// │     • network starts online unless --offline                           │
/// │  5. Wait for signal ── then agent.shutdown(), db.close()               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run(args: AgentArgs) -> AgentResult<()> {
    info!("Starting Mandi Prices sync agent");

    let config = SyncConfig::load(args.config_path.clone())?;
    info!(
        upload_url = %config.remote.upload_url,
        enabled = config.remote.enabled,
        "Configuration loaded"
    );

    let db_path = get_database_path(&config)?;
    info!(?db_path, "Database path determined");

    let db = Database::new(
        DbConfig::new(db_path).max_connections(config.database.max_connections),
    )
    .await?;
    let pending = db.price_records().count_unsynced().await?;
    info!(pending, "Database connected and migrations applied");

    if args.feed {
        let result = print_feed(&config).await;
        db.close().await;
        return result;
    }

    let monitor = NetworkMonitor::new(if args.offline {
        NetworkState::OFFLINE
    } else {
        NetworkState::ONLINE
    });

    let coordinator = SyncCoordinator::new(
        db.price_records(),
        Arc::new(SyncClient::new(&config.remote)?),
        monitor.clone(),
        RetryPolicy::from_settings(&config.sync),
    );
    let agent = SyncAgent::spawn(
        coordinator,
        &monitor,
        AgentSettings::from_settings(&config.sync),
    );

    shutdown_signal().await;

    let status = agent.status().await;
    agent.shutdown().await?;
    db.close().await;

    info!(
        pending = status.pending_count,
        last_success = ?status.last_success_at,
        "Agent shutdown complete"
    );
    Ok(())
}

async fn print_feed(config: &SyncConfig) -> AgentResult<()> {
    let feed = MarketFeedClient::new(&config.remote)?.fetch().await?;

    for price in &feed.prices {
        info!(
            crop = %price.crop_name,
            district = %price.district_name,
            price = %price.selling_price,
            "Market price"
        );
    }
    if !feed.discarded.is_empty() {
        warn!(count = feed.discarded.len(), "Some feed entries were discarded");
    }
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=mandi_sync=trace` - Trace the sync engine only
/// - Default: `info,mandi=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mandi=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Determines the database file path.
///
/// `MANDI_DB_PATH` is already folded into `config.database.path` by
/// [`SyncConfig::load`]. Otherwise the platform data directory is used:
/// - **macOS**: `~/Library/Application Support/com.mandi.prices/mandi.db`
/// - **Windows**: `%APPDATA%\mandi\prices\data\mandi.db`
/// - **Linux**: `~/.local/share/prices/mandi.db`
pub fn get_database_path(config: &SyncConfig) -> AgentResult<PathBuf> {
    if let Some(path) = &config.database.path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(path.clone());
    }

    let proj_dirs = ProjectDirs::from("com", "mandi", "prices").ok_or(AgentError::NoDataDir)?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("mandi.db"))
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping sync agent");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> AgentResult<AgentArgs> {
        AgentArgs::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(args(&[]).unwrap(), AgentArgs::default());

        let parsed = args(&["--offline", "-c", "/tmp/sync.toml"]).unwrap();
        assert!(parsed.offline);
        assert!(!parsed.feed);
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/sync.toml")));

        assert!(args(&["--feed"]).unwrap().feed);
        assert!(args(&["-h"]).unwrap().help);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(matches!(args(&["--config"]), Err(AgentError::InvalidArgs(_))));
        assert!(matches!(args(&["--verbose"]), Err(AgentError::InvalidArgs(_))));
    }

    #[test]
    fn test_configured_database_path_creates_parent() {
        let dir = std::env::temp_dir().join(format!("mandi-agent-test-{}", std::process::id()));
        let mut config = SyncConfig::default();
        config.database.path = Some(dir.join("nested").join("mandi.db"));

        let path = get_database_path(&config).unwrap();
        assert_eq!(path, dir.join("nested").join("mandi.db"));
        assert!(dir.join("nested").is_dir());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
