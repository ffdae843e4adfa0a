//! p2pool management module
//!
//! This module provides the ability to download, verify, install and run
//! the p2pool mining helper on behalf of a desktop wallet.
//!
//! ## Features
//!
//! - **Provisioning**: Fetch the pinned release, verify SHA256, extract it
//! - **Process Management**: Start, stop and adopt a detached p2pool
//! - **Status**: Read the hashrate p2pool publishes through its data API
//! - **Events**: Report results to the host through an [`EventSink`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    p2pool module                         │
//! ├─────────────────────────────────────────────────────────┤
//! │  service.rs    - Facade held by the host                 │
//! │  provision.rs  - Single-slot download/install runtime    │
//! │  manager.rs    - Process lifecycle (start/stop/adopt)    │
//! │  status.rs     - Hashrate from the local data API        │
//! │  platform.rs   - Platform detection and release table    │
//! │  downloader.rs - HTTPS fetch with one redirect hop       │
//! │  hasher.rs     - SHA256 verification                     │
//! │  installer.rs  - Archive install and binary check        │
//! │  extractor.rs  - Archive extraction (zip/tar.gz)         │
//! │  config.rs     - Configuration types and persistence     │
//! │  state.rs      - Launch config and process state         │
//! │  events.rs     - Events sent to the host                 │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod downloader;
pub mod events;
pub mod extractor;
pub mod hasher;
pub mod installer;
pub mod manager;
pub mod platform;
pub mod provision;
pub mod service;
pub mod state;
pub mod status;

// Re-export key types for convenience
pub use config::{SupervisorConfig, SupervisorPaths};
pub use downloader::{HttpTransport, ReqwestTransport};
pub use events::{EventSink, LogSink, SupervisorEvent};
pub use manager::ProcessSupervisor;
pub use platform::{Platform, PlatformTarget, ReleaseEntry, ReleaseTable};
pub use service::P2PoolService;
pub use state::{Chain, LaunchConfig};
pub use status::StatusSnapshot;
