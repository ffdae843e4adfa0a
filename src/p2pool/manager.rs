//! p2pool process management
//!
//! Handles starting, stopping, and monitoring the p2pool helper.

use super::installer::is_regular_file;
use super::platform::PlatformTarget;
use super::state::{Chain, LaunchConfig, ProcessState};
use super::status::miner_stats_path;
use crate::error::StartError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Arguments for one p2pool launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    pub args: Vec<String>,
    /// True when we injected `--data-api` and therefore own the stats dir
    pub manages_stats_dir: bool,
}

/// Merge user flags with the defaults p2pool needs for status reporting
///
/// A default is skipped when its flag is already among the user tokens,
/// whatever value the user gave it.
pub fn build_launch_args(launch: &LaunchConfig, stats_dir: &Path) -> LaunchArgs {
    let mut args: Vec<String> = launch
        .extra_flags
        .split_whitespace()
        .map(str::to_string)
        .collect();

    if !has(&args, "--local-api") {
        args.push("--local-api".to_string());
    }

    let manages_stats_dir = !has(&args, "--data-api");
    if manages_stats_dir {
        args.push("--data-api".to_string());
        args.push(stats_dir.to_string_lossy().to_string());
    }

    if !has(&args, "--start-mining") {
        args.push("--start-mining".to_string());
        args.push(launch.thread_count.clone());
    }

    if launch.chain == Chain::Mini && !has(&args, "--mini") {
        args.push("--mini".to_string());
    }

    if !has(&args, "--wallet") {
        args.push("--wallet".to_string());
        args.push(launch.wallet_address.clone());
    }

    LaunchArgs {
        args,
        manages_stats_dir,
    }
}

fn has(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Wipe and recreate the stats directory
pub fn reset_stats_dir(stats_dir: &Path) -> io::Result<()> {
    if stats_dir.exists() {
        fs::remove_dir_all(stats_dir)?;
    }
    fs::create_dir_all(stats_dir)
}

/// Supervises the p2pool process
pub struct ProcessSupervisor {
    install_root: PathBuf,
    binary_path: PathBuf,
    process_name: String,
    state: Mutex<ProcessState>,
}

impl ProcessSupervisor {
    /// Create a supervisor for the resolved platform target
    pub fn new(target: &PlatformTarget) -> Self {
        Self {
            install_root: target.install_root.clone(),
            binary_path: target.installed_binary_path.clone(),
            process_name: target.process_name(),
            state: Mutex::new(ProcessState::Stopped),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Directory passed to `--data-api`
    pub fn stats_dir(&self) -> PathBuf {
        self.install_root.join("stats")
    }

    /// JSON file p2pool keeps updated with miner stats
    pub fn stats_file(&self) -> PathBuf {
        miner_stats_path(&self.stats_dir())
    }

    /// Check if the p2pool binary is installed
    pub fn is_installed(&self) -> bool {
        is_regular_file(&self.binary_path)
    }

    /// Whether the helper is running, noticing if it exited on its own
    pub fn is_running(&self) -> bool {
        let mut state = self.lock_state();
        self.reap(&mut state);
        state.is_running()
    }

    /// PID of the supervised process
    pub fn pid(&self) -> Option<u32> {
        self.lock_state().pid()
    }

    /// Drop back to Stopped if the process is gone
    fn reap(&self, state: &mut ProcessState) {
        let ProcessState::Running { pid, child } = state else {
            return;
        };

        let exited = match child {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("p2pool (PID {}) exited: {}", pid, status);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    log::warn!("Failed to query p2pool status: {}", e);
                    false
                }
            },
            None => {
                let alive = is_pid_alive(*pid);
                if !alive {
                    log::info!("Adopted p2pool (PID {}) is gone", pid);
                }
                !alive
            }
        };

        if exited {
            *state = ProcessState::Stopped;
            self.remove_stats_dir();
        }
    }

    fn remove_stats_dir(&self) {
        let stats_dir = self.stats_dir();
        if stats_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&stats_dir) {
                log::warn!("Failed to remove {}: {}", stats_dir.display(), e);
            }
        }
    }

    /// Start p2pool with the given launch configuration
    ///
    /// The state lock is held for the whole call, so concurrent starts
    /// cannot both launch. Returns the PID of the running process.
    pub fn start(&self, launch: &LaunchConfig) -> Result<u32, StartError> {
        let mut state = self.lock_state();
        self.reap(&mut state);

        if let Some(pid) = state.pid() {
            log::info!("p2pool already running with PID {}", pid);
            return Ok(pid);
        }

        *state = ProcessState::Starting;

        match self.launch(launch) {
            Ok(child) => {
                let pid = child.id();
                log::info!("p2pool started with PID {}", pid);
                *state = ProcessState::Running {
                    pid,
                    child: Some(child),
                };
                Ok(pid)
            }
            Err(e) => {
                log::error!("p2pool start error: {}", e);
                *state = ProcessState::Stopped;
                Err(e)
            }
        }
    }

    fn launch(&self, launch: &LaunchConfig) -> Result<Child, StartError> {
        if !self.is_installed() {
            return Err(StartError::BinaryMissing {
                path: self.binary_path.clone(),
            });
        }

        let stats_dir = self.stats_dir();
        let launch_args = build_launch_args(launch, &stats_dir);

        if launch_args.manages_stats_dir {
            reset_stats_dir(&stats_dir).map_err(|source| StartError::StatsDir {
                path: stats_dir.clone(),
                source,
            })?;
        }

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&launch_args.args)
            .current_dir(&self.install_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        detach(&mut cmd);

        log::info!(
            "Starting p2pool {} on the {} chain",
            self.binary_path.display(),
            launch.chain.as_str()
        );
        log::debug!("With command line arguments {:?}", launch_args.args);

        cmd.spawn().map_err(|source| StartError::Spawn { source })
    }

    /// Stop p2pool
    ///
    /// No-op when nothing is running. Never fails: termination is best-effort.
    pub fn stop(&self) {
        let mut state = self.lock_state();

        match std::mem::take(&mut *state) {
            ProcessState::Running {
                pid,
                child: Some(mut child),
            } => {
                log::info!("Stopping p2pool (PID {})", pid);
                if let Err(e) = child.kill() {
                    log::debug!("Kill of PID {} failed: {}", pid, e);
                }
                // Reap so no zombie is left behind
                if let Err(e) = child.wait() {
                    log::warn!("Failed to wait for p2pool: {}", e);
                }
            }
            ProcessState::Running { pid, child: None } => {
                log::info!("Stopping adopted p2pool (PID {})", pid);
                if !kill_pid(pid, &self.process_name) {
                    log::info!("Falling back to kill by name for {}", self.process_name);
                    kill_by_name(&self.process_name);
                }
            }
            ProcessState::Stopped | ProcessState::Starting => return,
        }

        self.remove_stats_dir();
    }

    /// Shut the helper down when the host application exits
    pub fn exit(&self) {
        log::info!("p2pool supervisor exit");
        self.stop();
    }

    /// Detect a p2pool left running by an earlier session and adopt it
    pub fn detect_existing(&self) -> Option<u32> {
        let mut state = self.lock_state();
        self.reap(&mut state);

        if let Some(pid) = state.pid() {
            return Some(pid);
        }

        let pid = find_process_pid(&self.process_name)?;
        log::info!("Detected existing p2pool process with PID {}", pid);
        *state = ProcessState::Running { pid, child: None };
        Some(pid)
    }
}

/// Detach the child from our session/console so it outlives us
fn detach(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe and touches no shared state
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }
}

fn matches_process_name(candidate: &str, process_name: &str) -> bool {
    candidate.eq_ignore_ascii_case(process_name)
}

/// Find the PID of a running process by executable name
fn find_process_pid(process_name: &str) -> Option<u32> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());

    sys.processes()
        .iter()
        .find(|(_, process)| {
            matches_process_name(&process.name().to_string_lossy(), process_name)
        })
        .map(|(pid, _)| pid.as_u32())
}

fn is_pid_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new(),
    );
    sys.process(pid).is_some()
}

/// Kill an adopted process by PID
///
/// Returns false when the PID now belongs to another program or the kill
/// failed, so the caller can fall back to [`kill_by_name`].
fn kill_pid(pid: u32, process_name: &str) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::new(),
    );

    match sys.process(sys_pid) {
        None => {
            log::debug!("PID {} already gone", pid);
            true
        }
        Some(process) if matches_process_name(&process.name().to_string_lossy(), process_name) => {
            let killed = process.kill();
            if !killed {
                log::warn!("Failed to kill PID {}", pid);
            }
            killed
        }
        Some(process) => {
            log::warn!(
                "PID {} is now {:?}, not {}",
                pid,
                process.name(),
                process_name
            );
            false
        }
    }
}

/// Forcefully terminate every process with exactly the given name
fn kill_by_name(process_name: &str) {
    #[cfg(windows)]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/IM", process_name]);
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("pkill");
        cmd.args(["-x", process_name]);
        cmd
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.status() {
        Ok(status) => log::info!("Kill of {} finished: {}", process_name, status),
        Err(e) => log::warn!("Failed to run kill for {}: {}", process_name, e),
    }
}
