//! # Network Monitor
//!
//! Holds the device's current reachability, as reported by the platform.
//!
//! ```text
//! platform callback ──update(state)──► watch::Sender<NetworkState>
//!                                           │
//!                    ┌──────────────────────┼──────────────────────┐
//!                    ▼                                             ▼
//!     SyncCoordinator::is_online()               SyncAgent (subscribe)
//!     gate before each push                      offline → online fires
//!                                                SyncTrigger::NetworkAvailable
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Reachability as reported by the platform.
///
/// A device can be on a network with no route to the internet (captive
/// portal, dead uplink), so both flags must hold before pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkState {
    pub is_connected: bool,
    pub is_internet_reachable: bool,
}

impl NetworkState {
    pub const ONLINE: NetworkState = NetworkState {
        is_connected: true,
        is_internet_reachable: true,
    };

    pub const OFFLINE: NetworkState = NetworkState {
        is_connected: false,
        is_internet_reachable: false,
    };

    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable
    }
}

/// Shared view of [`NetworkState`].
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<NetworkState>>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        NetworkMonitor { tx: Arc::new(tx) }
    }

    /// Records a new state. Subscribers only wake on actual changes.
    pub fn update(&self, state: NetworkState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            info!(
                connected = state.is_connected,
                reachable = state.is_internet_reachable,
                "Network state changed"
            );
        }
    }

    pub fn current(&self) -> NetworkState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        NetworkMonitor::new(NetworkState::OFFLINE)
    }
}
