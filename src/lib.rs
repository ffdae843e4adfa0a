//! p2pool supervisor
//!
//! Provisions the p2pool mining helper for a desktop wallet and keeps it
//! running as a detached subprocess. See [`p2pool::P2PoolService`].

pub mod error;
pub mod logging;
pub mod p2pool;

pub use error::{DownloadFailureReason, ProvisionError, StartError, SupervisorError};
pub use p2pool::{
    Chain, EventSink, LaunchConfig, LogSink, P2PoolService, StatusSnapshot, SupervisorConfig,
    SupervisorEvent,
};

/// Expand environment variables and ~ in paths
/// Windows: %VAR% style
/// Unix: ~ expands to HOME
pub fn expand_path(path: &str) -> String {
    let mut result = path.to_string();

    #[cfg(windows)]
    {
        // Expand %VAR% style environment variables on Windows
        while let Some(start) = result.find('%') {
            if let Some(end) = result[start + 1..].find('%') {
                let var_name = &result[start + 1..start + 1 + end];
                if let Ok(value) = std::env::var(var_name) {
                    result = format!("{}{}{}", &result[..start], value, &result[start + 2 + end..]);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    #[cfg(not(windows))]
    {
        // Expand ~ to HOME directory on Unix
        if result.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                result = format!("{}{}", home.display(), &result[1..]);
            }
        } else if result == "~" {
            if let Some(home) = dirs::home_dir() {
                result = home.to_string_lossy().to_string();
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_plain_path() {
        assert_eq!(expand_path("/opt/p2pool"), "/opt/p2pool");
        assert_eq!(expand_path("relative/dir"), "relative/dir");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~"), home.to_string_lossy());
            assert_eq!(
                expand_path("~/p2pool"),
                format!("{}/p2pool", home.display())
            );
        }
        // Only a leading ~ is expanded
        assert_eq!(expand_path("/tmp/~/x"), "/tmp/~/x");
    }
}
