//! # p2pool-supervisor
//!
//! Command-line front end for the p2pool supervisor library. Drives the same
//! service a host wallet embeds, for manual operation and troubleshooting.
//!
//! ## Subcommands
//!
//! - `install` - Download, verify and install p2pool
//! - `start` - Launch p2pool detached from this process
//! - `stop` - Stop a running p2pool
//! - `status` - Show whether p2pool runs and its hashrate
//! - `paths` - Show the paths in use

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use p2pool_supervisor::logging;
use p2pool_supervisor::p2pool::state::default_thread_count;
use p2pool_supervisor::p2pool::{
    Chain, EventSink, LaunchConfig, LogSink, P2PoolService, ReqwestTransport, SupervisorConfig,
    SupervisorEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Provision and supervise the p2pool mining helper.
#[derive(Parser)]
#[command(name = "p2pool-supervisor", author, version, about)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Download, verify and install the pinned p2pool release.
    Install,

    /// Start p2pool in the background.
    Start {
        /// Wallet address mining rewards are paid to
        #[arg(long)]
        wallet: String,

        /// Sidechain to mine on
        #[arg(long, default_value = "main", value_parser = ["main", "mini"])]
        chain: String,

        /// Mining threads (default: all cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Extra p2pool flags, passed through verbatim
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        flags: String,
    },

    /// Stop the running p2pool.
    Stop,

    /// Show p2pool status.
    Status {
        /// Keep printing until interrupted, every SECS seconds
        /// (default: `statusPollSecs` from the config)
        #[arg(long, value_name = "SECS", num_args = 0..=1)]
        watch: Option<Option<u64>>,
    },

    /// Print install, binary, stats and config paths.
    Paths,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(logging::default_log_dir);
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::init_logger(&log_dir, level)?;

    let config = match &cli.config {
        Some(path) => SupervisorConfig::load_from(path)?,
        None => SupervisorConfig::load(),
    };

    let transport = ReqwestTransport::new(config.request_timeout())
        .context("Failed to create HTTP client")?;
    let (tx, rx) = unbounded_channel();
    let service = P2PoolService::new(&config, Arc::new(transport), Arc::new(tx))?;

    match cli.command {
        Commands::Install => install(&service, rx).await?,
        Commands::Start {
            wallet,
            chain,
            threads,
            flags,
        } => {
            let chain: Chain = chain.parse().unwrap_or_default();
            let launch = LaunchConfig::new(wallet, chain)
                .with_threads(threads.unwrap_or_else(default_thread_count))
                .with_flags(flags);

            if !service.is_installed() {
                bail!(
                    "p2pool is not installed at {}, run `install` first",
                    service.target().installed_binary_path.display()
                );
            }
            if let Some(pid) = service.detect_existing() {
                println!("p2pool already running (PID {})", pid);
                return Ok(());
            }

            let pid = service.start(&launch)?;
            println!("p2pool started (PID {})", pid);
        }
        Commands::Stop => {
            if service.detect_existing().is_none() {
                println!("p2pool is not running");
                return Ok(());
            }
            service.stop();
            println!("p2pool stopped");
        }
        Commands::Status { watch } => {
            service.detect_existing();
            match watch {
                Some(secs) => {
                    let interval = secs
                        .map(|secs| Duration::from_secs(secs.max(1)))
                        .unwrap_or_else(|| config.status_poll_interval());
                    watch_status(&service, rx, interval).await
                }
                None => {
                    let status = service.get_status();
                    print_status(status.running, status.hashrate);
                }
            }
        }
        Commands::Paths => {
            let paths = service.paths();
            println!("install root: {}", paths.install_root);
            println!("binary:       {}", paths.binary);
            println!("stats file:   {}", paths.stats_file);
            println!(
                "config:       {}",
                cli.config.map(|p| p.display().to_string()).unwrap_or(paths.config)
            );
            println!("logs:         {}", log_dir.display());
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn install(
    service: &P2PoolService,
    mut events: UnboundedReceiver<SupervisorEvent>,
) -> Result<()> {
    service.download()?;

    while let Some(event) = next_event(&mut events).await {
        match event {
            SupervisorEvent::DownloadSuccess => {
                println!(
                    "p2pool installed to {}",
                    service.target().installed_binary_path.display()
                );
                return Ok(());
            }
            SupervisorEvent::DownloadFailure { reason } => bail!("install failed: {}", reason),
            other => log::debug!("Ignoring event {}", other.name()),
        }
    }

    bail!("install ended without a result")
}

/// Receive the next service event, recording it in the log
async fn next_event(events: &mut UnboundedReceiver<SupervisorEvent>) -> Option<SupervisorEvent> {
    let event = events.recv().await?;
    LogSink.emit(event.clone());
    Some(event)
}

fn print_status(running: bool, hashrate: u64) {
    if running {
        println!("running, hashrate {} H/s", hashrate);
    } else {
        println!("stopped");
    }
}

async fn watch_status(
    service: &P2PoolService,
    mut events: UnboundedReceiver<SupervisorEvent>,
    interval: Duration,
) {
    service.spawn_status_poller(interval);
    loop {
        tokio::select! {
            event = next_event(&mut events) => match event {
                Some(SupervisorEvent::Status { running, hashrate }) => print_status(running, hashrate),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    service.stop_status_poller();
}
