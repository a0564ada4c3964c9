//! # Sync Agent
//!
//! Background task that turns app and network events into sync triggers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SyncAgent task                           │
//! │                                                                  │
//! │  startup sleep (once)        ──► Startup                         │
//! │  network watch offline→online ──► NetworkAvailable               │
//! │  periodic tick (foreground)  ──► Periodic                        │
//! │  Foregrounded (from bg)      ──► Foreground                      │
//! │  SyncNow(reply)              ──► Manual, outcome sent back       │
//! │  Shutdown / handle dropped   ──► coordinator.shutdown(), exit    │
//! │                                                                  │
//! │  Each trigger runs on its own task so the loop keeps listening;  │
//! │  overlapping cycles resolve to AlreadyRunning in the coordinator.│
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SyncSettings;
use crate::coordinator::{SyncCoordinator, SyncOutcome, SyncStatus, SyncTrigger};
use crate::error::{SyncError, SyncResult};
use crate::network::{NetworkMonitor, NetworkState};

/// Timer settings for the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub periodic_interval: Duration,
    pub startup_delay: Duration,
}

impl AgentSettings {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        AgentSettings {
            periodic_interval: settings.periodic_interval(),
            startup_delay: settings.startup_delay(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings::from_settings(&SyncSettings::default())
    }
}

enum AgentCommand {
    Foregrounded,
    Backgrounded,
    SyncNow(oneshot::Sender<SyncResult<SyncOutcome>>),
    Shutdown,
}

/// Event loop state. Created and owned by [`SyncAgent::spawn`].
pub struct SyncAgent {
    coordinator: SyncCoordinator,
    network_rx: watch::Receiver<NetworkState>,
    commands: mpsc::Receiver<AgentCommand>,
    settings: AgentSettings,
    foreground: bool,
    was_online: bool,
}

impl SyncAgent {
    /// Starts the agent. The app is assumed to be in the foreground.
    pub fn spawn(
        coordinator: SyncCoordinator,
        monitor: &NetworkMonitor,
        settings: AgentSettings,
    ) -> SyncAgentHandle {
        let (tx, rx) = mpsc::channel(16);
        let mut network_rx = monitor.subscribe();
        let was_online = network_rx.borrow_and_update().is_online();

        let agent = SyncAgent {
            coordinator: coordinator.clone(),
            network_rx,
            commands: rx,
            settings,
            foreground: true,
            was_online,
        };

        SyncAgentHandle {
            commands: tx,
            coordinator,
            task: tokio::spawn(agent.run()),
        }
    }

    async fn run(mut self) {
        info!(
            periodic_secs = self.settings.periodic_interval.as_secs(),
            online = self.was_online,
            "Sync agent started"
        );

        let period = self.settings.periodic_interval;
        let mut periodic = tokio::time::interval_at(Instant::now() + period, period);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let startup = tokio::time::sleep(self.settings.startup_delay);
        tokio::pin!(startup);
        let mut started = false;
        let mut network_open = true;

        loop {
            tokio::select! {
                _ = &mut startup, if !started => {
                    started = true;
                    self.fire(SyncTrigger::Startup);
                }

                changed = self.network_rx.changed(), if network_open => {
                    if changed.is_err() {
                        network_open = false;
                        continue;
                    }
                    let online = self.network_rx.borrow_and_update().is_online();
                    if online && !self.was_online {
                        self.fire(SyncTrigger::NetworkAvailable);
                    }
                    self.was_online = online;
                }

                _ = periodic.tick() => {
                    if self.foreground {
                        self.fire(SyncTrigger::Periodic);
                    } else {
                        debug!("In background, skipping periodic sync");
                    }
                }

                command = self.commands.recv() => match command {
                    Some(AgentCommand::Foregrounded) => {
                        if !self.foreground {
                            self.foreground = true;
                            self.fire(SyncTrigger::Foreground);
                        }
                    }
                    Some(AgentCommand::Backgrounded) => {
                        self.foreground = false;
                    }
                    Some(AgentCommand::SyncNow(reply)) => {
                        let coordinator = self.coordinator.clone();
                        tokio::spawn(async move {
                            let outcome = coordinator.trigger(SyncTrigger::Manual).await;
                            let _ = reply.send(outcome);
                        });
                    }
                    Some(AgentCommand::Shutdown) | None => break,
                },
            }
        }

        self.coordinator.shutdown();
        info!("Sync agent stopped");
    }

    fn fire(&self, trigger: SyncTrigger) {
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            match coordinator.trigger(trigger).await {
                Ok(outcome) => debug!(?trigger, ?outcome, "Triggered sync finished"),
                Err(SyncError::ShuttingDown) => {}
                Err(e) => error!(?trigger, error = %e, "Triggered sync failed"),
            }
        });
    }
}

/// Control surface for a running [`SyncAgent`].
pub struct SyncAgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    coordinator: SyncCoordinator,
    task: JoinHandle<()>,
}

impl SyncAgentHandle {
    pub async fn app_foregrounded(&self) -> SyncResult<()> {
        self.send(AgentCommand::Foregrounded).await
    }

    pub async fn app_backgrounded(&self) -> SyncResult<()> {
        self.send(AgentCommand::Backgrounded).await
    }

    /// Runs a manual sync and waits for its outcome.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentCommand::SyncNow(reply)).await?;
        rx.await
            .map_err(|_| SyncError::ChannelError("sync reply dropped".into()))?
    }

    pub async fn status(&self) -> SyncStatus {
        self.coordinator.status().await
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Stops the agent and waits for its task to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        // The task may already be gone; shutting down the coordinator is
        // what matters.
        let _ = self.commands.send(AgentCommand::Shutdown).await;
        self.coordinator.shutdown();
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("sync agent task: {e}")))
    }

    async fn send(&self, command: AgentCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}
