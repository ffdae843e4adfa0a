//! Runtime state of the supervised helper
//!
//! `ProcessState` is the Stopped → Starting → Running machine owned by the
//! supervisor. `LaunchConfig` is rebuilt for every start call and never
//! persisted.

use serde::{Deserialize, Serialize};
use std::process::Child;
use std::str::FromStr;

/// Which p2pool sidechain to join
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Main sidechain
    #[default]
    Main,
    /// p2pool-mini, for smaller miners
    Mini,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Main => "main",
            Chain::Mini => "mini",
        }
    }
}

impl FromStr for Chain {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mini" => Ok(Chain::Mini),
            _ => Ok(Chain::Main), // Anything else is the main chain
        }
    }
}

/// Caller input for one start call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Extra p2pool flags, whitespace separated
    #[serde(default)]
    pub extra_flags: String,
    pub wallet_address: String,
    #[serde(default)]
    pub chain: Chain,
    /// Value passed to `--start-mining`
    pub thread_count: String,
}

impl LaunchConfig {
    pub fn new(wallet_address: impl Into<String>, chain: Chain) -> Self {
        Self {
            extra_flags: String::new(),
            wallet_address: wallet_address.into(),
            chain,
            thread_count: default_thread_count().to_string(),
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.extra_flags = flags.into();
        self
    }

    pub fn with_threads(mut self, threads: impl ToString) -> Self {
        self.thread_count = threads.to_string();
        self
    }
}

/// Mining threads used when the caller does not choose
pub fn default_thread_count() -> usize {
    num_cpus::get().max(1)
}

/// Lifecycle of the helper process
#[derive(Debug, Default)]
pub enum ProcessState {
    #[default]
    Stopped,
    /// Arguments are being built and the process spawned
    Starting,
    Running {
        pid: u32,
        /// Handle of a process we spawned; `None` when adopted from an earlier run
        child: Option<Child>,
    },
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid, .. } => Some(*pid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_names() {
        assert_eq!(Chain::Main.as_str(), "main");
        assert_eq!(Chain::Mini.as_str(), "mini");
        assert_eq!(Chain::Mini.as_str().parse::<Chain>(), Ok(Chain::Mini));
    }

    #[test]
    fn test_chain_parsing() {
        assert_eq!("mini".parse::<Chain>(), Ok(Chain::Mini));
        assert_eq!("MINI".parse::<Chain>(), Ok(Chain::Mini));
        assert_eq!("main".parse::<Chain>(), Ok(Chain::Main));
        assert_eq!("".parse::<Chain>(), Ok(Chain::Main));
    }

    #[test]
    fn test_launch_config_defaults() {
        let config = LaunchConfig::new("44AFFq5kSiGBoZ", Chain::Mini);
        assert!(config.extra_flags.is_empty());
        assert_eq!(config.thread_count, default_thread_count().to_string());

        let config = config.with_threads(2).with_flags("--no-upnp");
        assert_eq!(config.thread_count, "2");
        assert_eq!(config.extra_flags, "--no-upnp");
    }

    #[test]
    fn test_process_state() {
        let state = ProcessState::default();
        assert!(!state.is_running());
        assert_eq!(state.pid(), None);

        let state = ProcessState::Running {
            pid: 42,
            child: None,
        };
        assert!(state.is_running());
        assert_eq!(state.pid(), Some(42));
    }
}
