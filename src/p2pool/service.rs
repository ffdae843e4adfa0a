//! Service facade held by the host wallet
//!
//! Ties together the platform target, provisioning runtime, process
//! supervisor and status reader behind one object.

use super::config::{SupervisorConfig, SupervisorPaths};
use super::downloader::HttpTransport;
use super::events::{EventSink, SupervisorEvent};
use super::manager::ProcessSupervisor;
use super::platform::{Platform, PlatformTarget};
use super::provision::{begin_provisioning, ProvisionRuntime, SharedProvisionRuntime};
use super::state::LaunchConfig;
use super::status::{read_status, StatusSnapshot};
use crate::error::{ProvisionError, StartError, SupervisorError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// p2pool provisioning and supervision service
pub struct P2PoolService {
    runtime: Handle,
    target: Arc<PlatformTarget>,
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn EventSink>,
    supervisor: Arc<ProcessSupervisor>,
    provision: SharedProvisionRuntime,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl P2PoolService {
    /// Create the service for the running platform
    ///
    /// Must be called from within a tokio runtime; background work is
    /// spawned onto it.
    pub fn new(
        config: &SupervisorConfig,
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SupervisorError> {
        let platform = Platform::current()?;
        let target = config
            .release_table()
            .resolve(platform, &config.install_root())?;
        Self::with_target(target, transport, sink)
    }

    /// Create the service for an explicit target
    pub fn with_target(
        target: PlatformTarget,
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SupervisorError> {
        let runtime = Handle::try_current().map_err(|_| SupervisorError::Runtime)?;

        log::info!(
            "p2pool service for {} installing to {}",
            target.platform,
            target.install_root.display()
        );

        Ok(Self {
            runtime,
            supervisor: Arc::new(ProcessSupervisor::new(&target)),
            target: Arc::new(target),
            transport,
            sink,
            provision: Arc::new(ProvisionRuntime::new()),
            poller: Mutex::new(None),
        })
    }

    pub fn target(&self) -> &PlatformTarget {
        &self.target
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Paths used by the service, for display
    pub fn paths(&self) -> SupervisorPaths {
        SupervisorPaths {
            install_root: self.target.install_root.to_string_lossy().to_string(),
            binary: self
                .target
                .installed_binary_path
                .to_string_lossy()
                .to_string(),
            stats_file: self.supervisor.stats_file().to_string_lossy().to_string(),
            config: SupervisorConfig::config_path().to_string_lossy().to_string(),
        }
    }

    /// Download, verify and install p2pool in the background
    ///
    /// Returns immediately. The result arrives as a `DownloadSuccess` or
    /// `DownloadFailure` event.
    pub fn download(&self) -> Result<(), ProvisionError> {
        begin_provisioning(
            self.provision.clone(),
            &self.runtime,
            self.transport.clone(),
            self.target.clone(),
            self.sink.clone(),
        )
    }

    pub fn is_downloading(&self) -> bool {
        self.provision.is_running()
    }

    pub fn is_installed(&self) -> bool {
        self.supervisor.is_installed()
    }

    /// Launch p2pool, emitting `StartFailure` if it cannot be started
    pub fn start(&self, launch: &LaunchConfig) -> Result<u32, StartError> {
        self.supervisor.start(launch).inspect_err(|e| {
            self.sink.emit(SupervisorEvent::StartFailure {
                message: e.to_string(),
            });
        })
    }

    pub fn stop(&self) {
        self.supervisor.stop();
    }

    pub fn exit(&self) {
        self.supervisor.exit();
    }

    /// Adopt a p2pool left running by an earlier session
    pub fn detect_existing(&self) -> Option<u32> {
        self.supervisor.detect_existing()
    }

    /// Current status snapshot
    pub fn get_status(&self) -> StatusSnapshot {
        snapshot(&self.supervisor)
    }

    /// Current status snapshot, also emitted as a `Status` event
    pub fn poll_status(&self) -> StatusSnapshot {
        let status = self.get_status();
        self.sink.emit(status_event(status));
        status
    }

    /// Emit a `Status` event every `interval`, replacing any earlier poller
    pub fn spawn_status_poller(&self, interval: Duration) {
        let supervisor = self.supervisor.clone();
        let sink = self.sink.clone();

        let handle = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let supervisor = supervisor.clone();
                match tokio::task::spawn_blocking(move || snapshot(&supervisor)).await {
                    Ok(status) => sink.emit(status_event(status)),
                    Err(e) => log::error!("Status poll failed: {}", e),
                }
            }
        });

        if let Some(previous) = self.lock_poller().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_status_poller(&self) {
        if let Some(handle) = self.lock_poller().take() {
            handle.abort();
        }
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop polling and wait for an in-flight download to finish
    ///
    /// The helper process is left alone; call [`exit`](Self::exit) to stop it.
    pub async fn shutdown(&self) {
        self.stop_status_poller();
        self.provision.shutdown().await;
        log::info!("p2pool service shut down");
    }
}

fn snapshot(supervisor: &ProcessSupervisor) -> StatusSnapshot {
    let running = supervisor.is_running();
    read_status(running, &supervisor.stats_file())
}

fn status_event(status: StatusSnapshot) -> SupervisorEvent {
    SupervisorEvent::Status {
        running: status.running,
        hashrate: status.hashrate,
    }
}
