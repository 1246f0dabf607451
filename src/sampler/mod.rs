// External sampler lifecycle: spawn with privilege, periodic restart, exit recovery,
// tail reads of its output file, and guaranteed cleanup of the process and its files.

mod command;
mod reader;

pub use command::{build_argv, output_path, remove_stale_outputs};
pub use reader::{TAIL_BYTES, read_latest, read_tail, read_with_retry};

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::{Duration, timeout};

use crate::config::SamplerConfig;
use crate::error::SamplerError;
use crate::models::RawSample;

const STDERR_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// State of the current sampler run. Replaced wholesale on every restart.
#[derive(Debug, Clone)]
pub struct SamplerLifecycle {
    pub generation: u64,
    pub pid: Option<u32>,
    pub output_path: PathBuf,
    pub started_at: Instant,
    pub ticks_since_restart: u64,
    pub samples_read: u64,
    pub last_read_at: Option<Instant>,
    pub last_sample_ts: Option<u64>,
}

/// One record handed to the parser.
#[derive(Debug, Clone)]
pub struct SampleRead {
    pub sample: RawSample,
    /// First record of a freshly started sampler (no valid energy baseline).
    pub first_since_restart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartReason {
    Scheduled,
    Requested,
    Exited,
}

/// Owns the sampler subprocess. Dropping it terminates the process and removes every
/// output file it created; [`SamplerProcess::shutdown`] does the same and waits for exit.
pub struct SamplerProcess {
    config: SamplerConfig,
    output_dir: PathBuf,
    child: Option<Child>,
    stderr: Option<ChildStderr>,
    lifecycle: SamplerLifecycle,
    created_files: Vec<PathBuf>,
    consecutive_failures: u32,
    samples_total: u64,
    restarts: u64,
    restart_requested: bool,
}

impl SamplerProcess {
    /// Clears leftovers from earlier runs and spawns the sampler. A spawn failure is fatal.
    pub fn start(config: SamplerConfig) -> Result<Self, SamplerError> {
        let output_dir = config.output_dir();
        let removed = remove_stale_outputs(&output_dir, &config.file_prefix);
        if removed > 0 {
            tracing::info!(removed, dir = %output_dir.display(), "removed stale sampler output");
        }

        let output = output_path(&output_dir, &config.file_prefix, 0);
        let mut process = Self {
            lifecycle: SamplerLifecycle::new(0, None, output.clone()),
            config,
            output_dir,
            child: None,
            stderr: None,
            created_files: Vec::new(),
            consecutive_failures: 0,
            samples_total: 0,
            restarts: 0,
            restart_requested: false,
        };
        process.spawn(output, 0)?;
        Ok(process)
    }

    pub fn lifecycle(&self) -> &SamplerLifecycle {
        &self.lifecycle
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Output files created and not yet removed.
    pub fn output_files(&self) -> &[PathBuf] {
        &self.created_files
    }

    /// Ask for a restart at the start of the next tick (e.g. on stale data).
    pub fn request_restart(&mut self) {
        self.restart_requested = true;
    }

    /// One tick's read. Applies the restart policy first, then reads the newest record
    /// with bounded retry. `NoSample`/`Io` errors cost only this tick; `Spawn`,
    /// `PrivilegeDenied` and `RestartStorm` are fatal.
    pub async fn next_sample(&mut self) -> Result<SampleRead, SamplerError> {
        if let Some(status) = self.exit_status()? {
            if self.samples_total == 0 && !status.success() {
                let stderr = self.collect_stderr().await;
                return Err(SamplerError::PrivilegeDenied { status, stderr });
            }
            self.consecutive_failures += 1;
            tracing::warn!(
                %status,
                consecutive_failures = self.consecutive_failures,
                operation = "sampler_exit",
                "sampler exited unexpectedly"
            );
            if self.consecutive_failures > self.config.max_consecutive_failures {
                return Err(SamplerError::RestartStorm {
                    failures: self.consecutive_failures,
                });
            }
            if let Some(drained) = self.restart(RestartReason::Exited).await? {
                return Ok(drained);
            }
        } else if self.restart_requested {
            if let Some(drained) = self.restart(RestartReason::Requested).await? {
                return Ok(drained);
            }
        } else if self.lifecycle.ticks_since_restart >= self.config.restart_after_ticks
            && let Some(drained) = self.restart(RestartReason::Scheduled).await?
        {
            return Ok(drained);
        }

        self.lifecycle.ticks_since_restart += 1;
        let sample = read_with_retry(
            &self.lifecycle.output_path,
            self.config.read_attempts,
            self.config.read_backoff(),
        )
        .await?;

        let first_since_restart = self.lifecycle.samples_read == 0;
        self.lifecycle.samples_read += 1;
        self.lifecycle.last_read_at = Some(Instant::now());
        self.lifecycle.last_sample_ts = Some(sample.timestamp_ms);
        self.samples_total += 1;
        self.consecutive_failures = 0;
        Ok(SampleRead {
            sample,
            first_since_restart,
        })
    }

    /// Terminates the sampler, waits for it, and removes all of its output files.
    pub async fn shutdown(mut self) {
        self.terminate().await;
        self.remove_outputs();
        tracing::info!(restarts = self.restarts, "sampler stopped");
    }

    fn spawn(&mut self, output: PathBuf, generation: u64) -> Result<(), SamplerError> {
        let argv = build_argv(&self.config, &output);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SamplerError::Io(std::io::Error::other("empty sampler command")))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SamplerError::Spawn {
                program: program.clone(),
                source,
            })?;

        self.stderr = child.stderr.take();
        let pid = child.id();
        self.child = Some(child);
        self.created_files.push(output.clone());
        self.lifecycle = SamplerLifecycle::new(generation, pid, output);
        tracing::info!(
            pid,
            generation,
            output = %self.lifecycle.output_path.display(),
            command = %argv.join(" "),
            "sampler started"
        );
        Ok(())
    }

    /// Drains the old output, replaces the process, and returns the drained record so
    /// the restart tick is not lost.
    async fn restart(&mut self, reason: RestartReason) -> Result<Option<SampleRead>, SamplerError> {
        self.restart_requested = false;
        let old_path = self.lifecycle.output_path.clone();
        let drained = match read_latest(&old_path).await {
            Ok(sample) if self.lifecycle.last_sample_ts != Some(sample.timestamp_ms) => {
                Some(SampleRead {
                    sample,
                    first_since_restart: self.lifecycle.samples_read == 0,
                })
            }
            _ => None,
        };
        if let Some(read) = &drained {
            self.samples_total += 1;
            if reason != RestartReason::Exited {
                self.consecutive_failures = 0;
            }
            tracing::debug!(timestamp_ms = read.sample.timestamp_ms, "drained pending sample");
        }

        self.terminate().await;
        self.remove_file(&old_path);

        self.restarts += 1;
        let generation = self.lifecycle.generation + 1;
        let output = output_path(&self.output_dir, &self.config.file_prefix, generation);
        tracing::info!(reason = ?reason, generation, "restarting sampler");
        self.spawn(output, generation)?;
        Ok(drained)
    }

    fn exit_status(&mut self) -> Result<Option<ExitStatus>, SamplerError> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    async fn collect_stderr(&mut self) -> String {
        let Some(mut stderr) = self.stderr.take() else {
            return String::new();
        };
        let mut out = String::new();
        let _ = timeout(STDERR_READ_TIMEOUT, stderr.read_to_string(&mut out)).await;
        out.trim().to_string()
    }

    /// SIGTERM (relayed by sudo to the sampler), then SIGKILL after the grace period.
    async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.stderr = None;
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        send_terminate(&mut child);
        match timeout(self.config.terminate_timeout(), child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "sampler exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, operation = "wait_sampler", "wait failed"),
            Err(_) => {
                tracing::warn!("sampler ignored SIGTERM; killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, operation = "kill_sampler", "kill failed");
                }
            }
        }
    }

    fn remove_file(&mut self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    operation = "remove_output",
                    "could not remove sampler output; retrying at shutdown"
                );
                return;
            }
        }
        self.created_files.retain(|p| p != path);
    }

    fn remove_outputs(&mut self) {
        for path in std::mem::take(&mut self.created_files) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed sampler output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    operation = "remove_output",
                    "could not remove sampler output"
                ),
            }
        }
    }
}

impl Drop for SamplerProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && matches!(child.try_wait(), Ok(None))
        {
            send_terminate(&mut child);
        }
        self.remove_outputs();
    }
}

impl SamplerLifecycle {
    fn new(generation: u64, pid: Option<u32>, output_path: PathBuf) -> Self {
        Self {
            generation,
            pid,
            output_path,
            started_at: Instant::now(),
            ticks_since_restart: 0,
            samples_read: 0,
            last_read_at: None,
            last_sample_ts: None,
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) with a pid we spawned and still own; no memory is touched.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}
