//! Status reader for the p2pool local API
//!
//! p2pool started with `--local-api --data-api <dir>` keeps rewriting
//! `<dir>/local/miner`. The file may be caught mid-write, so every failure
//! here degrades to a hashrate of zero.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Point-in-time status of the helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    /// Current hashrate in H/s
    pub hashrate: u64,
}

/// Location of the miner stats file inside a data-api directory
pub fn miner_stats_path(stats_dir: &Path) -> PathBuf {
    stats_dir.join("local").join("miner")
}

/// Build a snapshot from the supervisor's running flag and the stats file
pub fn read_status(running: bool, stats_file: &Path) -> StatusSnapshot {
    if !running || !stats_file.is_file() {
        return StatusSnapshot {
            running,
            hashrate: 0,
        };
    }

    let hashrate = match fs::read(stats_file) {
        Ok(data) => parse_hashrate(&data),
        Err(e) => {
            log::debug!("Failed to read {}: {}", stats_file.display(), e);
            0
        }
    };

    StatusSnapshot {
        running: true,
        hashrate,
    }
}

/// Extract `current_hashrate` from the miner JSON, 0 when absent or invalid
pub fn parse_hashrate(data: &[u8]) -> u64 {
    let value: serde_json::Value = match serde_json::from_slice(data) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Unparsable miner stats: {}", e);
            return 0;
        }
    };

    let Some(field) = value.get("current_hashrate") else {
        return 0;
    };

    field
        .as_u64()
        .or_else(|| field.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
        .unwrap_or(0)
}
