//! Events emitted to the host application
//!
//! The host wallet plugs in an [`EventSink`]; provisioning results, launch
//! failures and status polls are pushed through it instead of being returned
//! from blocking calls.

use crate::error::DownloadFailureReason;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Event payloads sent to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorEvent {
    /// Binary downloaded, verified and installed
    DownloadSuccess,
    /// Provisioning ended without an installed binary
    DownloadFailure { reason: DownloadFailureReason },
    /// The helper process could not be launched
    StartFailure { message: String },
    /// Result of a status poll
    Status { running: bool, hashrate: u64 },
}

impl SupervisorEvent {
    /// Event name for hosts that dispatch by string
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorEvent::DownloadSuccess => "p2pool:download-success",
            SupervisorEvent::DownloadFailure { .. } => "p2pool:download-failure",
            SupervisorEvent::StartFailure { .. } => "p2pool:start-failure",
            SupervisorEvent::Status { .. } => "p2pool:status",
        }
    }
}

/// Receiver side of supervisor events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SupervisorEvent);
}

impl EventSink for UnboundedSender<SupervisorEvent> {
    fn emit(&self, event: SupervisorEvent) {
        if self.send(event).is_err() {
            log::debug!("Event receiver dropped");
        }
    }
}

/// Sink that only writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: SupervisorEvent) {
        match &event {
            SupervisorEvent::DownloadFailure { reason } => {
                log::error!("{}: {}", event.name(), reason)
            }
            SupervisorEvent::StartFailure { message } => {
                log::error!("{}: {}", event.name(), message)
            }
            SupervisorEvent::Status { running, hashrate } => {
                log::info!("{}: running={} hashrate={} H/s", event.name(), running, hashrate)
            }
            SupervisorEvent::DownloadSuccess => log::info!("{}", event.name()),
        }
    }
}
