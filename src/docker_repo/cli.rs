// Docker CLI backend: every operation is one `docker ...` invocation

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::instrument;

use super::{
    DockerBackend, ExecEndpoint, ExecEvent, ExecHandle, ExecSignal, LogOptions, Result, parse,
    validate_operand,
};
use crate::command_line::{self, RunMode};
use crate::config::DockerConfig;
use crate::error::DockerError;
use crate::models::{
    CommandOutput, ContainerConfig, ContainerInfo, DiskUsage, ImageInfo, NetworkInfo, VolumeEntry,
    VolumeInfo,
};

const SUDO_UNKNOWN: u8 = 0;
const SUDO_NO: u8 = 1;
const SUDO_YES: u8 = 2;

/// Pulls and builds may legitimately run much longer than other commands.
const LONG_COMMAND_FACTOR: u32 = 10;

const VOLUME_MOUNT_POINT: &str = "/mnt/volume";

const EXEC_CHANNEL_CAPACITY: usize = 64;

pub struct CliBackend {
    binary: String,
    helper_image: String,
    timeout: Duration,
    sudo: AtomicU8,
}

impl CliBackend {
    pub fn new(config: &DockerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            helper_image: config.helper_image.clone(),
            timeout: config.command_timeout(),
            sudo: AtomicU8::new(SUDO_UNKNOWN),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = if self.sudo.load(Ordering::Relaxed) == SUDO_YES {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(&self.binary);
            c
        } else {
            Command::new(&self.binary)
        };
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Decides once whether docker must run through `sudo -n`. Only a conclusive
    /// probe is cached, so a daemon that is down at startup is probed again later.
    async fn probe_sudo(&self) -> bool {
        match self.sudo.load(Ordering::Relaxed) {
            SUDO_YES => return true,
            SUDO_NO => return false,
            _ => {}
        }
        let direct = Command::new(&self.binary)
            .args(["ps", "-q"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, direct).await {
            Ok(Ok(o)) => o,
            _ => return false,
        };
        if output.status.success() {
            self.sudo.store(SUDO_NO, Ordering::Relaxed);
            return false;
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if !stderr.contains("permission denied") {
            return false;
        }
        let via_sudo = Command::new("sudo")
            .arg("-n")
            .arg(&self.binary)
            .args(["ps", "-q"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(self.timeout, via_sudo).await {
            Ok(Ok(o)) if o.status.success() => {
                tracing::info!(operation = "probe_sudo", "docker requires sudo; using sudo -n");
                self.sudo.store(SUDO_YES, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn run_with_timeout(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        self.probe_sudo().await;
        let output = tokio::time::timeout(timeout, self.command(args).output())
            .await
            .map_err(|_| DockerError::Timeout(timeout))?
            .map_err(|e| DockerError::ProcessSpawn(format!("{}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let lower = stderr.to_lowercase();
            if lower.contains("no such") || lower.contains("not found") {
                return Err(DockerError::NotFound(stderr));
            }
            return Err(DockerError::CommandFailed {
                command: args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_timeout(args, self.timeout).await
    }

    async fn run_stdout(&self, args: &[&str]) -> Result<String> {
        Ok(self.run(args).await?.stdout)
    }

    /// Action output trimmed for display.
    async fn run_action(&self, args: &[&str]) -> Result<CommandOutput> {
        let out = self.run(args).await?;
        Ok(CommandOutput {
            stdout: out.stdout.trim().to_string(),
            stderr: out.stderr,
        })
    }

    /// `docker <kind> inspect <id>` prints a one-element array.
    async fn inspect(&self, kind: &str, id: &str) -> Result<Value> {
        validate_operand("id", id)?;
        let stdout = self.run_stdout(&[kind, "inspect", id]).await?;
        let value: Value = serde_json::from_str(stdout.trim())?;
        match value {
            Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
            Value::Array(_) => Err(DockerError::NotFound(format!("{} {}", kind, id))),
            other => Ok(other),
        }
    }

    async fn create_or_run(&self, config: &ContainerConfig, mode: RunMode) -> Result<CommandOutput> {
        let mut args = vec![mode.verb().to_string()];
        args.extend(command_line::build_args(config, mode)?);
        tracing::debug!(
            container = %config.name,
            command = %command_line::to_shell_line(&self.binary, &args),
            "creating container"
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_action(&args).await
    }

    fn volume_mount(volume: &str) -> String {
        format!(
            "type=volume,source={},target={},readonly",
            volume, VOLUME_MOUNT_POINT
        )
    }

    fn volume_target(path: &str) -> String {
        if path.is_empty() {
            VOLUME_MOUNT_POINT.to_string()
        } else {
            format!("{}/{}", VOLUME_MOUNT_POINT, path)
        }
    }
}

#[async_trait]
impl DockerBackend for CliBackend {
    async fn is_installed(&self) -> Option<String> {
        match self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(out) => Some(out.stdout.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::debug!(error = %e, operation = "is_installed", "docker not reachable");
                None
            }
        }
    }

    async fn needs_sudo(&self) -> bool {
        self.probe_sudo().await
    }

    #[instrument(skip(self), fields(repo = "docker_cli", operation = "disk_usage"))]
    async fn disk_usage(&self) -> Result<DiskUsage> {
        let stdout = self
            .run_stdout(&["system", "df", "--format", "{{json .}}"])
            .await?;
        parse::disk_usage(&stdout)
    }

    #[instrument(skip(self), fields(repo = "docker_cli", operation = "image_list"))]
    async fn image_list(&self) -> Result<Vec<ImageInfo>> {
        let stdout = self
            .run_stdout(&["images", "--no-trunc", "--format", "{{json .}}"])
            .await?;
        parse::images(&stdout)
    }

    async fn image_inspect(&self, id: &str) -> Result<Value> {
        self.inspect("image", id).await
    }

    async fn image_pull(&self, image: &str) -> Result<CommandOutput> {
        validate_operand("image", image)?;
        let out = self
            .run_with_timeout(&["pull", image], self.timeout * LONG_COMMAND_FACTOR)
            .await?;
        Ok(CommandOutput {
            stdout: out.stdout.trim().to_string(),
            stderr: out.stderr,
        })
    }

    async fn image_remove(&self, id: &str, force: bool) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        if force {
            self.run_action(&["rmi", "-f", id]).await
        } else {
            self.run_action(&["rmi", id]).await
        }
    }

    async fn image_tag(&self, source: &str, target: &str) -> Result<CommandOutput> {
        validate_operand("source", source)?;
        validate_operand("target", target)?;
        self.run_action(&["tag", source, target]).await
    }

    async fn image_build(
        &self,
        context: &str,
        tag: Option<&str>,
        dockerfile: Option<&str>,
    ) -> Result<CommandOutput> {
        let mut args = vec!["build"];
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            args.extend(["-t", tag]);
        }
        if let Some(file) = dockerfile.filter(|f| !f.is_empty()) {
            args.extend(["-f", file]);
        }
        validate_operand("context", context)?;
        args.push(context);
        let out = self
            .run_with_timeout(&args, self.timeout * LONG_COMMAND_FACTOR)
            .await?;
        Ok(CommandOutput {
            stdout: out.stdout.trim().to_string(),
            stderr: out.stderr,
        })
    }

    #[instrument(skip(self), fields(repo = "docker_cli", operation = "container_list"))]
    async fn container_list(&self) -> Result<Vec<ContainerInfo>> {
        let stdout = self
            .run_stdout(&["ps", "-a", "--no-trunc", "--format", "{{json .}}"])
            .await?;
        parse::containers(&stdout)
    }

    async fn container_inspect(&self, id: &str) -> Result<Value> {
        self.inspect("container", id).await
    }

    async fn container_create(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        self.create_or_run(config, RunMode::Create).await
    }

    async fn container_run(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        self.create_or_run(config, RunMode::Run).await
    }

    async fn container_start(&self, id: &str) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        self.run_action(&["start", id]).await
    }

    async fn container_stop(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        match timeout {
            Some(t) => self.run_action(&["stop", "-t", &t.to_string(), id]).await,
            None => self.run_action(&["stop", id]).await,
        }
    }

    async fn container_restart(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        match timeout {
            Some(t) => self.run_action(&["restart", "-t", &t.to_string(), id]).await,
            None => self.run_action(&["restart", id]).await,
        }
    }

    async fn container_remove(&self, id: &str, force: bool) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        if force {
            self.run_action(&["rm", "-f", id]).await
        } else {
            self.run_action(&["rm", id]).await
        }
    }

    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<CommandOutput> {
        if options.follow {
            return Err(DockerError::Unsupported(
                "follow mode is not available for one-shot log requests".into(),
            ));
        }
        let tail = options.tail.map(|t| t.to_string());
        let mut args = vec!["logs"];
        if let Some(tail) = tail.as_deref() {
            args.extend(["--tail", tail]);
        }
        if options.timestamps {
            args.push("--timestamps");
        }
        validate_operand("id", id)?;
        args.push(id);
        // Container output on stderr is log content, not an error.
        self.run(&args).await
    }

    async fn container_exec(&self, id: &str, command: &str) -> Result<ExecHandle> {
        validate_operand("id", id)?;
        self.probe_sudo().await;
        let mut child = self
            .command(&["exec", id, "sh", "-c", command])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DockerError::ProcessSpawn(format!("{} exec: {}", self.binary, e)))?;
        tracing::debug!(container = id, pid = ?child.id(), "exec process spawned");

        let (handle, endpoint) = ExecHandle::pair(EXEC_CHANNEL_CAPACITY);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        tokio::spawn(drive_exec(child, stdout, stderr, endpoint));
        Ok(handle)
    }

    async fn network_list(&self) -> Result<Vec<NetworkInfo>> {
        let stdout = self
            .run_stdout(&["network", "ls", "--no-trunc", "--format", "{{json .}}"])
            .await?;
        parse::networks(&stdout)
    }

    async fn network_inspect(&self, id: &str) -> Result<Value> {
        self.inspect("network", id).await
    }

    async fn network_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput> {
        validate_operand("name", name)?;
        match driver.filter(|d| !d.is_empty()) {
            Some(d) => self.run_action(&["network", "create", "--driver", d, name]).await,
            None => self.run_action(&["network", "create", name]).await,
        }
    }

    async fn network_remove(&self, id: &str) -> Result<CommandOutput> {
        validate_operand("id", id)?;
        self.run_action(&["network", "rm", id]).await
    }

    async fn network_prune(&self) -> Result<CommandOutput> {
        self.run_action(&["network", "prune", "-f"]).await
    }

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>> {
        let stdout = self
            .run_stdout(&["volume", "ls", "--format", "{{json .}}"])
            .await?;
        parse::volumes(&stdout)
    }

    async fn volume_inspect(&self, name: &str) -> Result<Value> {
        self.inspect("volume", name).await
    }

    async fn volume_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput> {
        validate_operand("name", name)?;
        match driver.filter(|d| !d.is_empty()) {
            Some(d) => self.run_action(&["volume", "create", "--driver", d, name]).await,
            None => self.run_action(&["volume", "create", name]).await,
        }
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<CommandOutput> {
        validate_operand("name", name)?;
        if force {
            self.run_action(&["volume", "rm", "-f", name]).await
        } else {
            self.run_action(&["volume", "rm", name]).await
        }
    }

    async fn volume_prune(&self) -> Result<CommandOutput> {
        self.run_action(&["volume", "prune", "-f"]).await
    }

    #[instrument(skip(self), fields(repo = "docker_cli", operation = "volume_dir"))]
    async fn volume_dir(&self, volume: &str, path: &str) -> Result<Vec<VolumeEntry>> {
        let mount = Self::volume_mount(volume);
        let target = Self::volume_target(path);
        let stdout = self
            .run_stdout(&[
                "run",
                "--rm",
                "--network",
                "none",
                "--mount",
                &mount,
                &self.helper_image,
                "find",
                &target,
                "-mindepth",
                "1",
                "-maxdepth",
                "1",
                "-exec",
                "stat",
                "-c",
                "%F|%s|%Y|%n",
                "{}",
                "+",
            ])
            .await?;
        Ok(parse::volume_entries(&stdout))
    }

    #[instrument(skip(self), fields(repo = "docker_cli", operation = "volume_file"))]
    async fn volume_file(&self, volume: &str, path: &str, max_bytes: u64) -> Result<String> {
        let mount = Self::volume_mount(volume);
        let target = Self::volume_target(path);
        let limit = max_bytes.saturating_add(1).to_string();
        self.run_stdout(&[
            "run",
            "--rm",
            "--network",
            "none",
            "--mount",
            &mount,
            &self.helper_image,
            "head",
            "-c",
            &limit,
            &target,
        ])
        .await
    }
}

/// Forwards one pipe as UTF-8 chunks, holding back a split multi-byte sequence
/// until its remaining bytes arrive.
async fn forward<R: AsyncRead + Unpin>(
    mut reader: R,
    events: mpsc::Sender<ExecEvent>,
    wrap: fn(String) -> ExecEvent,
) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);
        let valid = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        if valid == 0 {
            continue;
        }
        let chunk = String::from_utf8_lossy(&pending[..valid]).into_owned();
        pending.drain(..valid);
        if events.send(wrap(chunk)).await.is_err() {
            return;
        }
    }
    if !pending.is_empty() {
        let _ = events
            .send(wrap(String::from_utf8_lossy(&pending).into_owned()))
            .await;
    }
}

#[cfg(unix)]
async fn send_terminate(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let result = Command::new("kill")
        .args(["-s", "TERM", &pid.to_string()])
        .stdin(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, pid, operation = "exec_terminate", "failed to send SIGTERM");
    }
}

/// Owns the child until it exits; `Exited` is sent after both pipes drain.
async fn drive_exec(
    mut child: Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    endpoint: ExecEndpoint,
) {
    let ExecEndpoint {
        events,
        mut control,
    } = endpoint;
    let out_task = stdout.map(|s| tokio::spawn(forward(s, events.clone(), ExecEvent::Stdout)));
    let err_task = stderr.map(|s| tokio::spawn(forward(s, events.clone(), ExecEvent::Stderr)));
    let pid = child.id();

    let mut control_open = true;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = control.recv(), if control_open => match signal {
                #[cfg(unix)]
                Some(ExecSignal::Terminate) => send_terminate(pid).await,
                #[cfg(not(unix))]
                Some(ExecSignal::Terminate) => {
                    let _ = child.start_kill();
                }
                Some(ExecSignal::Kill) => {
                    let _ = child.start_kill();
                }
                None => {
                    // Handle dropped: nobody can stop this process any more.
                    control_open = false;
                    let _ = child.start_kill();
                }
            },
        }
    };

    for task in [out_task, err_task].into_iter().flatten() {
        let _ = task.await;
    }
    let code = match status {
        Ok(s) => s.code().unwrap_or(-1),
        Err(e) => {
            tracing::warn!(error = %e, operation = "exec_wait", "waiting for exec process failed");
            -1
        }
    };
    let _ = events.send(ExecEvent::Exited(code)).await;
}
