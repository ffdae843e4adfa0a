//! Background provisioning of the p2pool binary
//!
//! Fetch, verify and install run on the tokio runtime; hashing and disk work
//! go to the blocking pool. Only one run may be in flight at a time.

use super::downloader::{fetch_archive, HttpTransport};
use super::events::{EventSink, SupervisorEvent};
use super::hasher::check_bytes_hash;
use super::installer::install_archive;
use super::platform::PlatformTarget;
use crate::error::{DownloadFailureReason, ProvisionError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Single-slot executor for provisioning runs
pub struct ProvisionRuntime {
    /// Handle to the in-flight provisioning task
    task_handle: Mutex<Option<JoinHandle<()>>>,
    /// Flag indicating a run holds the slot
    is_running: AtomicBool,
}

impl ProvisionRuntime {
    pub fn new() -> Self {
        Self {
            task_handle: Mutex::new(None),
            is_running: AtomicBool::new(false),
        }
    }

    /// Check if a provisioning run is in flight
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Claim the slot, failing if it is already taken
    pub fn try_begin(&self) -> Result<(), ProvisionError> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| ProvisionError::Busy)
    }

    fn finish(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until no provisioning run is left
    ///
    /// Runs started while waiting, such as a retry issued from the event
    /// sink, are drained as well.
    pub async fn shutdown(&self) {
        loop {
            let Some(handle) = self.lock_task().take() else {
                break;
            };

            log::info!("Waiting for in-flight p2pool download");
            if let Err(e) = handle.await {
                log::error!("Provisioning task failed: {}", e);
                self.finish();
            }
        }
    }
}

impl Default for ProvisionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe provisioning runtime
pub type SharedProvisionRuntime = Arc<ProvisionRuntime>;

/// Start a provisioning run on `runtime`
///
/// Returns `Busy` without side effects when another run holds the slot.
/// Otherwise exactly one `DownloadSuccess` or `DownloadFailure` event is
/// emitted once the run ends.
pub fn begin_provisioning(
    provision: SharedProvisionRuntime,
    runtime: &Handle,
    transport: Arc<dyn HttpTransport>,
    target: Arc<PlatformTarget>,
    sink: Arc<dyn EventSink>,
) -> Result<(), ProvisionError> {
    // Held until the handle is stored, so a run that ends and triggers a
    // retry right away cannot have its successor's handle overwritten
    let mut task = provision.lock_task();

    if let Err(e) = provision.try_begin() {
        log::warn!("p2pool download already in progress, rejecting request");
        return Err(e);
    }

    let job_runtime = provision.clone();
    let handle = runtime.spawn(async move {
        let outcome = provision_binary(transport.as_ref(), target).await;

        // Release the slot first so a host reacting to the event can retry
        job_runtime.finish();

        let event = match outcome {
            Ok(_) => SupervisorEvent::DownloadSuccess,
            Err(reason) => SupervisorEvent::DownloadFailure { reason },
        };
        sink.emit(event);
    });

    *task = Some(handle);
    Ok(())
}

/// Fetch, verify and install the release archive for `target`
pub async fn provision_binary(
    transport: &dyn HttpTransport,
    target: Arc<PlatformTarget>,
) -> Result<PathBuf, DownloadFailureReason> {
    let archive = fetch_archive(transport, &target.download_url).await?;

    tokio::task::spawn_blocking(move || {
        let hash = check_bytes_hash(&archive.body, &target.expected_hash);
        if !hash.matches {
            return Err(DownloadFailureReason::HashVerificationFailed);
        }
        install_archive(&archive.body, &target)
    })
    .await
    .map_err(|e| {
        log::error!("Install task panicked: {}", e);
        DownloadFailureReason::InstallationFailed
    })?
}
