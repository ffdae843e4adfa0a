//! Error types for the p2pool supervisor
//!
//! Download failures are not errors in the usual sense: they end up as a
//! single terminal [`SupervisorEvent`](crate::p2pool::events::SupervisorEvent)
//! and carry a [`DownloadFailureReason`]. Everything else is surfaced through
//! the enums below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while constructing or configuring the supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No release is known for the running OS/architecture
    #[error("unsupported platform: {os} on {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// A release table entry failed validation
    #[error("invalid release entry for {platform}: {reason}")]
    InvalidRelease { platform: String, reason: String },

    /// The service was created outside of a tokio runtime
    #[error("no tokio runtime available for background work")]
    Runtime,

    /// The configuration file could not be read or written
    #[error("configuration error at {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

/// Terminal reason of a failed download/verify/install run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum DownloadFailureReason {
    /// The release artifact is gone upstream (HTTP 404)
    #[error("release binary is not available")]
    BinaryNotAvailable,
    /// Transport failure or an unexpected HTTP status
    #[error("connection issue while downloading")]
    ConnectionIssue,
    /// SHA-256 of the payload does not match the release table
    #[error("hash verification failed")]
    HashVerificationFailed,
    /// Archive could not be written or extracted, or the binary is missing afterwards
    #[error("installation failed")]
    InstallationFailed,
}

/// Failure to launch the helper process
#[derive(Debug, Error)]
pub enum StartError {
    #[error("p2pool binary not found at {}", path.display())]
    BinaryMissing { path: PathBuf },

    #[error("failed to prepare stats directory {}: {source}", path.display())]
    StatsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start p2pool: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

/// Rejection of a provisioning request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// Another download/install run is still in flight
    #[error("a download is already in progress")]
    Busy,
}

/// Error reported by an [`HttpTransport`](crate::p2pool::downloader::HttpTransport)
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_serialization() {
        let json = serde_json::to_string(&DownloadFailureReason::HashVerificationFailed).unwrap();
        assert_eq!(json, "\"hashVerificationFailed\"");
    }

    #[test]
    fn test_unsupported_platform_message() {
        let err = SupervisorError::UnsupportedPlatform {
            os: "freebsd".to_string(),
            arch: "riscv64".to_string(),
        };
        assert_eq!(err.to_string(), "unsupported platform: freebsd on riscv64");
    }
}
