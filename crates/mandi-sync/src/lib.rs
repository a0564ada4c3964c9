//! # mandi-sync: Sync Engine for Mandi Prices
//!
//! Pushes locally stored price records to the remote endpoint whenever the
//! device is online, and reads the published market price feed.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncAgent (trigger sources)                     │  │
//! │  │  startup delay · network regained · foreground · periodic · now  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncCoordinator                                 │  │
//! │  │  single-flight guard, online gate, bounded retries               │  │
//! │  │  post-commit push for freshly submitted records                  │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  ▼                              ▼                       │
//! │  ┌────────────────────────────┐   ┌──────────────────────────────┐     │
//! │  │ PriceRecordRepository      │   │ SyncClient (PriceUploader)   │     │
//! │  │ get_unsynced / mark_synced │   │ POST upload_url, JSON array  │     │
//! │  └────────────────────────────┘   └──────────────────────────────┘     │
//! │                                                                         │
//! │  NetworkMonitor: watch channel fed by the platform                     │
//! │  MarketFeedClient: GET read_url, lenient parse with discard report     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Background task turning events into triggers
//! - [`coordinator`] - Sync cycles, retry policy and status
//! - [`client`] - HTTP upload client and the `PriceUploader` seam
//! - [`market_feed`] - Read endpoint client and feed parsing
//! - [`network`] - Reachability state shared by agent and coordinator
//! - [`config`] - TOML configuration with env overrides
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mandi_sync::{AgentSettings, NetworkMonitor, RetryPolicy, SyncAgent,
//!                  SyncClient, SyncConfig, SyncCoordinator};
//!
//! let config = SyncConfig::load_or_default(None);
//! let monitor = NetworkMonitor::default();
//! let coordinator = SyncCoordinator::new(
//!     db.price_records(),
//!     Arc::new(SyncClient::new(&config.remote)?),
//!     monitor.clone(),
//!     RetryPolicy::from_settings(&config.sync),
//! );
//!
//! let agent = SyncAgent::spawn(coordinator, &monitor, AgentSettings::from_settings(&config.sync));
//! let outcome = agent.sync_now().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod market_feed;
pub mod network;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentSettings, SyncAgent, SyncAgentHandle};
pub use client::{PriceUploader, SyncClient, UploadRecord};
pub use config::{DatabaseSettings, RemoteSettings, SyncConfig, SyncSettings};
pub use coordinator::{
    NoOpEmitter, RetryPolicy, SyncCoordinator, SyncEventEmitter, SyncOutcome, SyncStatus,
    SyncTrigger,
};
pub use error::{SyncError, SyncResult};
pub use market_feed::{DiscardReason, DiscardedEntry, MarketFeedClient, MarketPrice, ParsedFeed};
pub use network::{NetworkMonitor, NetworkState};
