//! Spawns server jars as detached child processes.
//!
//! Two modes: no-wait (normal `start`, resolves as soon as the child is up)
//! and wait (first run during provisioning, resolves when the child exits
//! and treats a nonzero status as failure). The child's pid is mirrored to a
//! `.pid` sidecar so a restarted manager can still reason about liveness,
//! and both output streams are pumped into the log sink.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{info, warn};
use sysinfo::{Pid, System};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::commands::jvm_flags;
use crate::error::Result;
use crate::utils::java_detector;

pub const PID_FILE: &str = ".pid";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn server process: {0}")]
    Spawn(#[source] io::Error),
    #[error("server process exited with status {0}")]
    Exited(i32),
}

/// A freshly spawned server child. The caller decides whether to wait on it
/// or hand it to an exit monitor.
pub struct SpawnedServer {
    pub pid: u32,
    pub child: Child,
}

/// Spawns the jar in `directory`. With `tuned` set, the computed memory/GC
/// flags are applied; otherwise the jar runs with default JVM settings
/// (used for the generate-defaults first run).
pub async fn spawn_server(directory: &Path, binary_file: &str, tuned: bool) -> Result<SpawnedServer> {
    let runtime = java_detector::resolve_java().await?;

    let mut args: Vec<String> = if tuned {
        let dedicated = jvm_flags::dedicated_memory_gb(jvm_flags::free_system_memory());
        jvm_flags::build_flags(runtime.major, dedicated)?
    } else {
        Vec::new()
    };
    args.push("-jar".to_string());
    args.push(binary_file.to_string());
    args.push("nogui".to_string());

    let mut cmd = Command::new(&runtime.path);
    cmd.args(&args)
        .current_dir(directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(LaunchError::Spawn)?;
    let pid = child
        .id()
        .ok_or_else(|| LaunchError::Spawn(io::Error::other("child exited before pid was read")))?;
    info!("spawned {} in {} (pid {})", binary_file, directory.display(), pid);

    tokio::fs::write(directory.join(PID_FILE), pid.to_string()).await?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("[{pid}] {line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[{pid}] {line}");
            }
        });
    }

    Ok(SpawnedServer { pid, child })
}

/// Wait-mode launch: spawns and blocks the calling task until the child
/// exits, mapping a nonzero status to `LaunchError::Exited`.
pub async fn run_to_completion(directory: &Path, binary_file: &str, tuned: bool) -> Result<()> {
    let mut spawned = spawn_server(directory, binary_file, tuned).await?;
    let status = spawned.child.wait().await?;
    info!("process {} exited with {status}", spawned.pid);
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(LaunchError::Exited(code).into()),
        // Killed by signal; report as generic failure.
        None => Err(LaunchError::Exited(-1).into()),
    }
}

/// Reads the `.pid` sidecar left by a previous spawn, if any.
pub async fn read_pid(directory: &Path) -> Option<u32> {
    let text = tokio::fs::read_to_string(directory.join(PID_FILE)).await.ok()?;
    text.trim().parse().ok()
}

/// Whether `pid` currently appears in the OS process table.
pub fn pid_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid)).is_some()
}

/// Polls until `pid` leaves the process table. Returns false when the
/// deadline passes first.
pub async fn wait_for_pid_exit(pid: u32, deadline: Duration, interval: Duration) -> bool {
    let end = tokio::time::Instant::now() + deadline;
    while pid_alive(pid) {
        if tokio::time::Instant::now() >= end {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
    true
}
