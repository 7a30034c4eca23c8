use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

use crate::description::Output;
use crate::resolve::{IncludeInvocation, ProcessInvocation};

fn log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetlaunch")
        .join("logs")
}

/// Returns the log file path for a given process name and PID.
pub fn log_path_for_name_with_pid(name: &str, pid: u32) -> PathBuf {
    let safe_name = name.replace('/', "_").trim_start_matches('_').to_string();
    log_dir().join(format!("{}_{}.log", safe_name, pid))
}

/// Creates the log directory if it does not already exist.
pub async fn ensure_log_dir() -> Result<()> {
    tokio::fs::create_dir_all(log_dir()).await?;
    Ok(())
}

/// Returns the `ros2 launch` command line for an include.
pub fn include_command_line(include: &IncludeInvocation) -> Vec<String> {
    let mut cmd = vec![
        "ros2".to_string(),
        "launch".to_string(),
        include.file.display().to_string(),
    ];
    cmd.extend(
        include
            .args
            .iter()
            .map(|(name, value)| format!("{}:={}", name, value)),
    );
    cmd
}

/// Label used for an include's log file and console prefix, e.g. `robot1/rviz`.
pub fn include_label(include: &IncludeInvocation) -> String {
    let stem = include
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("launch")
        .trim_end_matches(".py")
        .trim_end_matches("_launch")
        .to_string();
    match &include.namespace {
        Some(ns) => format!("{}/{}", ns.trim_start_matches('/'), stem),
        None => stem,
    }
}

/// Result returned after successfully spawning a process.
#[derive(Debug)]
pub struct LaunchResult {
    /// OS process ID of the spawned process.
    pub pid: u32,
    /// Filesystem path to the log file capturing stdout/stderr.
    pub log_path: PathBuf,
}

/// Manages spawning, tracking, and stopping the processes of a launch.
pub struct Launcher {
    processes: HashMap<u32, ManagedProcess>,
}

struct ManagedProcess {
    name: String,
    child: Child,
}

impl Launcher {
    /// Creates a new launcher with no tracked processes.
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
        }
    }

    /// Runs a command and waits for it, failing on a non-zero exit.
    pub async fn run_to_completion(&mut self, process: &ProcessInvocation) -> Result<()> {
        let (program, args) = split_cmd(&process.cmd)?;
        log::info!("[{}] {}", process.name, process.cmd.join(" "));

        let output = command(program, args, &process.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                process.name,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }

    /// Spawns a long-running command in its own process group.
    pub async fn spawn_process(&mut self, process: &ProcessInvocation) -> Result<LaunchResult> {
        let (program, args) = split_cmd(&process.cmd)?;
        self.spawn(&process.name, program, args, &process.env, process.output)
            .await
    }

    /// Starts a launch file through `ros2 launch`.
    pub async fn spawn_include(&mut self, include: &IncludeInvocation) -> Result<LaunchResult> {
        let cmd = include_command_line(include);
        let (program, args) = split_cmd(&cmd)?;
        let label = include_label(include);
        self.spawn(&label, program, args, &include.env, Output::Screen)
            .await
    }

    async fn spawn(
        &mut self,
        name: &str,
        program: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        output: Output,
    ) -> Result<LaunchResult> {
        let _ = ensure_log_dir().await;

        let mut cmd = command(program, args, env);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let pid = child.id().unwrap_or(0);
        let log_path = log_path_for_name_with_pid(name, pid);
        log::info!("[{}] started with pid {} (log: {})", name, pid, log_path.display());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        pipe_to_log_file(stdout, stderr, &log_path, name, output);

        self.processes.insert(
            pid,
            ManagedProcess {
                name: name.to_string(),
                child,
            },
        );

        Ok(LaunchResult { pid, log_path })
    }

    /// Number of tracked processes that have not been reaped yet.
    pub fn running(&self) -> usize {
        self.processes.len()
    }

    /// Stops a tracked process by PID, sending SIGTERM then SIGKILL to its process group.
    pub async fn stop(&mut self, pid: u32) -> Result<()> {
        if let Some(mut process) = self.processes.remove(&pid) {
            #[cfg(unix)]
            {
                let pgid = format!("-{}", pid);
                let _ = tokio::process::Command::new("kill")
                    .args(["-TERM", &pgid])
                    .output()
                    .await;

                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

                let _ = tokio::process::Command::new("kill")
                    .args(["-KILL", &pgid])
                    .output()
                    .await;
            }
            #[cfg(not(unix))]
            {
                let _ = process.child.start_kill();
            }

            let _ = process.child.wait().await;
            log::debug!("[{}] stopped", process.name);
        }
        Ok(())
    }

    /// Stops every tracked process.
    pub async fn stop_all(&mut self) {
        let pids: Vec<u32> = self.processes.keys().copied().collect();
        for pid in pids {
            let _ = self.stop(pid).await;
        }
    }

    /// Removes processes that have exited and returns their names and exit codes.
    pub fn cleanup_exited(&mut self) -> Vec<(String, Option<i32>)> {
        let mut exited = Vec::new();
        for (&id, process) in &mut self.processes {
            if let Ok(Some(status)) = process.child.try_wait() {
                exited.push((id, status.code()));
            }
        }
        exited
            .into_iter()
            .filter_map(|(id, code)| self.processes.remove(&id).map(|p| (p.name, code)))
            .collect()
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

fn split_cmd(cmd: &[String]) -> Result<(&str, &[String])> {
    match cmd.split_first() {
        Some((program, args)) => Ok((program.as_str(), args)),
        None => anyhow::bail!("Empty command"),
    }
}

fn command(program: &str, args: &[String], env: &BTreeMap<String, String>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.env("PYTHONUNBUFFERED", "1");
    cmd.envs(env);
    cmd.stdin(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

fn pipe_to_log_file(
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    log_path: &Path,
    name: &str,
    output: Output,
) {
    if let Some(stdout) = stdout {
        tokio::spawn(forward_lines(stdout, log_path.to_path_buf(), name.to_string(), output));
    }
    if let Some(stderr) = stderr {
        tokio::spawn(forward_lines(stderr, log_path.to_path_buf(), name.to_string(), output));
    }
}

async fn forward_lines<R>(stream: R, log_path: PathBuf, name: String, output: Output)
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut log_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await
        .ok();

    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(ref mut f) = log_file {
            let _ = f.write_all(line.as_bytes()).await;
            let _ = f.write_all(b"\n").await;
            let _ = f.flush().await;
        }
        if output == Output::Screen {
            log::info!("[{}] {}", name, line);
        }
    }
}
