//! Logging configuration for the p2pool supervisor
//!
//! Uses log4rs with appenders:
//! 1. ConsoleAppender - stdout output
//! 2. RollingFileAppender - log files with rotation
//!
//! Library code only uses the `log` facade; the binary calls [`init_logger`].

use anyhow::Context;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

/// Size at which the log file is rolled
const LOG_FILE_LIMIT: u64 = 10 * 1024 * 1024;
/// Number of rolled files kept
const LOG_FILE_COUNT: u32 = 5;

/// Default directory for log files
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::p2pool::config::APP_DIR_NAME)
        .join("logs")
}

fn build_config(log_dir: &Path, level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;

    let log_file = log_dir.join("supervisor.1.log");
    let log_pattern = log_dir.join("supervisor.{}.log");
    let log_pattern = log_pattern
        .to_str()
        .context("Log directory is not valid UTF-8")?;

    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(log_pattern, LOG_FILE_COUNT)?;
    let trigger = SizeTrigger::new(LOG_FILE_LIMIT);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_file, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )?;

    Ok(config)
}

/// Initialize log4rs with console and rolling file appenders
///
/// # Log File Configuration
/// - File: `{log_dir}/supervisor.1.log`
/// - Max size: 10 MB per file
/// - Max count: 5 files (rotation)
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> anyhow::Result<log4rs::Handle> {
    let config = build_config(log_dir, level)?;
    log4rs::init_config(config).context("Failed to install logger")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_config_creates_log_dir() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");

        let config = build_config(&log_dir, LevelFilter::Debug).unwrap();

        assert!(log_dir.is_dir());
        assert_eq!(config.appenders().len(), 2);
        assert_eq!(config.root().level(), LevelFilter::Debug);
    }

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with("logs"));
    }
}
