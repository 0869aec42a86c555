/// Sandboxed Runner - launches untrusted code in a disposable container
///
/// **Core Responsibility:**
/// Run one prepared workspace inside an isolated container and report what
/// happened, raw. Classification into an outcome lives in `classify`.
///
/// **Isolation rules (DockerEngine):**
/// 1. Pulls the language image if it is not cached
/// 2. Bind-mounts only the workspace, read-write, at `/sandbox` (also the working dir)
/// 3. Network disabled, memory ceiling with swap pinned to the same value, CPU and PID caps
/// 4. Wraps the command in `timeout -k`, so the deadline is enforced inside the
///    container and the whole process group is signalled
/// 5. Captures demultiplexed stdout/stderr up to a byte cap
/// 6. Reads the OOM verdict from the container state, not from the exit code
/// 7. Force-removes the container before `run` returns; ContainerGuard covers
///    panics and cancellation
///
/// The in-process deadline is only a backstop for a wedged runtime; when it
/// fires the container is killed.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use scriptorium_common::config::{
    SandboxConfig, DEFAULT_CPU_LIMIT, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_PIDS_LIMIT,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where the workspace appears inside the container
pub const MOUNT_POINT: &str = "/sandbox";

/// Extra time the in-process wait allows beyond `timeout + kill grace`
const WAIT_SLACK: Duration = Duration::from_secs(5);
/// Upper bound for fetching the exit status of a stopped container
const EXIT_STATUS_WAIT: Duration = Duration::from_secs(5);

/// Resource ceilings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
    pub output_limit_bytes: usize,
}

impl ExecutionLimits {
    /// How long the caller waits before giving up on the container itself
    pub fn deadline(&self) -> Duration {
        self.timeout + self.kill_grace + WAIT_SLACK
    }
}

impl From<&SandboxConfig> for ExecutionLimits {
    /// Zero means "unlimited" to Docker, so non-positive ceilings fall back to the defaults
    fn from(config: &SandboxConfig) -> Self {
        let memory_mb = match config.memory_limit_mb {
            0 => DEFAULT_MEMORY_LIMIT_MB,
            mb => mb,
        };
        let cpus = if config.cpu_limit > 0.0 {
            config.cpu_limit
        } else {
            DEFAULT_CPU_LIMIT
        };
        let pids_limit = if config.pids_limit > 0 {
            config.pids_limit
        } else {
            DEFAULT_PIDS_LIMIT
        };

        Self {
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            kill_grace: Duration::from_secs(config.kill_grace_secs.max(1)),
            memory_bytes: i64::try_from(memory_mb)
                .unwrap_or(i64::MAX)
                .saturating_mul(1024 * 1024),
            // Float-to-int casts saturate
            nano_cpus: ((cpus * 1_000_000_000.0) as i64).max(1),
            pids_limit,
            output_limit_bytes: config.output_limit_bytes.max(1),
        }
    }
}

/// Everything the runner needs to launch one program
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run_id: Uuid,
    pub image: String,
    /// Compile/run command with stdin redirection, relative to the mount point
    pub shell_command: String,
    /// Host path of the workspace directory
    pub workspace: PathBuf,
}

/// Unclassified result of one container run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub oom_killed: bool,
    pub output_overflow: bool,
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

/// Execution backend seam. Errors mean the backend itself failed
/// (runtime unreachable, image missing), never that the program misbehaved.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, plan: &RunPlan, limits: &ExecutionLimits) -> Result<RawRun>;
}

/// Container command: the shell command under an in-container `timeout`
pub fn wrap_command(shell_command: &str, limits: &ExecutionLimits) -> Vec<String> {
    vec![
        "timeout".to_string(),
        "-k".to_string(),
        limits.kill_grace.as_secs().max(1).to_string(),
        limits.timeout.as_secs().max(1).to_string(),
        "sh".to_string(),
        "-c".to_string(),
        shell_command.to_string(),
    ]
}

/// Container settings for one run: only the workspace is mounted, no network
pub fn container_config(plan: &RunPlan, limits: &ExecutionLimits) -> Result<Config<String>> {
    let host_path = plan
        .workspace
        .to_str()
        .context("Workspace path is not valid UTF-8")?;

    Ok(Config {
        image: Some(plan.image.clone()),
        cmd: Some(wrap_command(&plan.shell_command, limits)),
        entrypoint: Some(vec![]),
        working_dir: Some(MOUNT_POINT.to_string()),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        network_disabled: Some(true),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{}:{}:rw", host_path, MOUNT_POINT)]),
            memory: Some(limits.memory_bytes),
            memory_swap: Some(limits.memory_bytes),
            nano_cpus: Some(limits.nano_cpus),
            pids_limit: Some(limits.pids_limit),
            network_mode: Some("none".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}

async fn remove_container(docker: &Docker, container_id: &str) {
    let remove_options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };

    match docker.remove_container(container_id, Some(remove_options)).await {
        Ok(()) => debug!(container_id = container_id, "Container removed"),
        Err(e) => warn!(container_id = container_id, error = %e, "Failed to cleanup container"),
    }
}

/// Container cleanup guard for panics and cancelled runs.
/// The normal path removes the container itself and disarms the guard.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: &Docker, container_id: String) -> Self {
        Self {
            docker: docker.clone(),
            container_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // Drop cannot be async; hand removal to the runtime if one is still up
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_container(&docker, &container_id).await });
            }
            Err(_) => warn!(container_id = %container_id, "No runtime to remove container; leaving it behind"),
        }
    }
}

#[derive(Default)]
struct Capture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    overflow: bool,
}

/// Docker-backed Sandbox
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure Docker image is available (pull if needed)
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = image, "Image cache hit");
            return Ok(());
        }

        warn!(image = image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = image, "Image pulled");
        Ok(())
    }

    /// Stream logs until the container stops or the byte cap is hit
    async fn collect_output(&self, container_id: &str, limit: usize, capture: &mut Capture) {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs = self.docker.logs(container_id, options);
        while let Some(frame) = logs.next().await {
            match frame {
                Ok(LogOutput::StdOut { message }) => capture.stdout.extend_from_slice(&message),
                Ok(LogOutput::StdErr { message }) => capture.stderr.extend_from_slice(&message),
                Ok(_) => {}
                Err(e) => {
                    warn!(container_id = container_id, error = %e, "Error reading container logs");
                    break;
                }
            }

            if capture.stdout.len() + capture.stderr.len() > limit {
                capture.overflow = true;
                break;
            }
        }
    }

    async fn kill(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await
        {
            // Already-stopped containers land here too
            debug!(container_id = container_id, error = %e, "Kill request failed");
        }
    }

    async fn exit_code(&self, container_id: &str) -> Option<i64> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let mut wait = self.docker.wait_container(container_id, options);

        match tokio::time::timeout(EXIT_STATUS_WAIT, wait.next()).await {
            Ok(Some(Ok(response))) => Some(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Ok(Some(Err(BollardError::DockerContainerWaitError { code, .. }))) => Some(code),
            Ok(Some(Err(e))) => {
                warn!(container_id = container_id, error = %e, "Failed to wait for container");
                None
            }
            Ok(None) => None,
            Err(_) => {
                warn!(container_id = container_id, "Timed out waiting for container exit status");
                None
            }
        }
    }

    /// (oom_killed, exit_code) as recorded by the runtime
    async fn inspect_state(&self, container_id: &str) -> (bool, Option<i64>) {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let state = info.state.unwrap_or_default();
                (state.oom_killed.unwrap_or(false), state.exit_code)
            }
            Err(e) => {
                warn!(container_id = container_id, error = %e, "Failed to inspect container");
                (false, None)
            }
        }
    }

    /// Start the container and watch it until it stops, overflows or outlives the deadline
    async fn supervise(&self, container_id: &str, limits: &ExecutionLimits) -> Result<RawRun> {
        let start_time = Instant::now();
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        let mut capture = Capture::default();
        let mut raw = RawRun::default();

        let collect = self.collect_output(container_id, limits.output_limit_bytes, &mut capture);
        if tokio::time::timeout(limits.deadline(), collect).await.is_err() {
            raw.deadline_exceeded = true;
            warn!(
                deadline_ms = limits.deadline().as_millis() as u64,
                "Container outlived its deadline, killing"
            );
            self.kill(container_id).await;
        }

        if capture.overflow {
            warn!(limit = limits.output_limit_bytes, "Output cap exceeded, killing");
            self.kill(container_id).await;
        }

        let waited = self.exit_code(container_id).await;
        let (oom_killed, inspected) = self.inspect_state(container_id).await;

        raw.stdout = String::from_utf8_lossy(&capture.stdout).into_owned();
        raw.stderr = String::from_utf8_lossy(&capture.stderr).into_owned();
        raw.output_overflow = capture.overflow;
        raw.exit_code = waited.or(inspected);
        raw.oom_killed = oom_killed;
        raw.elapsed = start_time.elapsed();

        debug!(
            exit_code = ?raw.exit_code,
            oom_killed = raw.oom_killed,
            output_overflow = raw.output_overflow,
            deadline_exceeded = raw.deadline_exceeded,
            elapsed_ms = raw.elapsed.as_millis() as u64,
            "Container finished"
        );

        Ok(raw)
    }
}

#[async_trait]
impl Sandbox for DockerEngine {
    #[tracing::instrument(skip(self, plan, limits), fields(run_id = %plan.run_id, image = %plan.image))]
    async fn run(&self, plan: &RunPlan, limits: &ExecutionLimits) -> Result<RawRun> {
        self.ensure_image(&plan.image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", plan.image))?;

        let config = container_config(plan, limits)?;
        let container_name = format!("scriptorium-{}", plan.run_id);
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id;
        let mut guard = ContainerGuard::new(&self.docker, container_id.clone());

        let result = self.supervise(&container_id, limits).await;

        // Removed here so short-lived callers do not exit before cleanup lands
        guard.disarm();
        remove_container(&self.docker, &container_id).await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExecutionLimits {
        ExecutionLimits::from(&SandboxConfig::default())
    }

    #[test]
    fn test_limits_from_config() {
        let limits = limits();
        assert_eq!(limits.timeout, Duration::from_secs(10));
        assert_eq!(limits.kill_grace, Duration::from_secs(1));
        assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.nano_cpus, 1_000_000_000);
        assert_eq!(limits.deadline(), Duration::from_secs(16));
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let config = SandboxConfig {
            timeout_secs: 0,
            kill_grace_secs: 0,
            ..Default::default()
        };
        let limits = ExecutionLimits::from(&config);
        assert_eq!(limits.timeout, Duration::from_secs(1));
        assert_eq!(limits.kill_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_wrap_command_uses_in_container_timeout() {
        let cmd = wrap_command("python3 -u main.py < input.txt", &limits());
        assert_eq!(
            cmd,
            vec!["timeout", "-k", "1", "10", "sh", "-c", "python3 -u main.py < input.txt"]
        );
    }

    #[test]
    fn test_non_positive_ceilings_fall_back_to_defaults() {
        let config = SandboxConfig {
            memory_limit_mb: 0,
            cpu_limit: 0.0,
            pids_limit: 0,
            output_limit_bytes: 0,
            ..Default::default()
        };
        let limits = ExecutionLimits::from(&config);
        assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.nano_cpus, 1_000_000_000);
        assert_eq!(limits.pids_limit, 128);
        assert!(limits.output_limit_bytes > 0);

        let config = SandboxConfig {
            cpu_limit: f64::NAN,
            pids_limit: -5,
            ..Default::default()
        };
        let limits = ExecutionLimits::from(&config);
        assert_eq!(limits.nano_cpus, 1_000_000_000);
        assert_eq!(limits.pids_limit, 128);
    }

    #[test]
    fn test_huge_memory_limit_saturates() {
        let config = SandboxConfig {
            memory_limit_mb: u64::MAX,
            ..Default::default()
        };
        assert_eq!(ExecutionLimits::from(&config).memory_bytes, i64::MAX);
    }

    #[test]
    fn test_container_config_isolation() {
        let limits = limits();
        let plan = RunPlan {
            run_id: Uuid::new_v4(),
            image: "python:3.12-slim".to_string(),
            shell_command: "python3 -u main.py < input.txt".to_string(),
            workspace: PathBuf::from("/var/scratch/run-1"),
        };

        let config = container_config(&plan, &limits).unwrap();
        assert_eq!(config.image.as_deref(), Some("python:3.12-slim"));
        assert_eq!(config.cmd, Some(wrap_command(&plan.shell_command, &limits)));
        assert_eq!(config.entrypoint, Some(vec![]));
        assert_eq!(config.working_dir.as_deref(), Some(MOUNT_POINT));
        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(config.tty, Some(false));

        let host = config.host_config.unwrap();
        assert_eq!(host.binds, Some(vec!["/var/scratch/run-1:/sandbox:rw".to_string()]));
        assert_eq!(host.memory, Some(limits.memory_bytes));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(limits.nano_cpus));
        assert_eq!(host.pids_limit, Some(limits.pids_limit));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert!(host.mounts.is_none());
        assert!(host.privileged.is_none());
    }

    #[test]
    fn test_disarmed_guard_leaves_removal_to_caller() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let mut guard = ContainerGuard::new(&docker, "scriptorium-test".to_string());
        assert!(guard.armed);

        guard.disarm();
        assert!(!guard.armed);
        drop(guard);
    }
}
