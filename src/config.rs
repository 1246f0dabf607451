use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest sampling interval powermetrics is asked for.
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Serve the read-only snapshot feed (HTTP + WebSocket).
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8086
}

fn default_host() -> String {
    "127.0.0.1".into()
}

/// External sampler process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_samplers")]
    pub samplers: String,
    /// Argument template; `{samplers}`, `{interval}` and `{output}` are substituted.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Prefix the command with `sudo -n`.
    #[serde(default = "default_true")]
    pub elevate: bool,
    /// `nice -n` value; 0 runs without `nice`.
    #[serde(default = "default_nice")]
    pub nice: i32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Restart the sampler after this many ticks (its output file grows without bound).
    #[serde(default = "default_restart_after_ticks")]
    pub restart_after_ticks: u64,
    /// Directory for output files; system temp dir when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Read attempts per tick before the tick is skipped.
    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
    /// Unexpected exits in a row (without a successful read) tolerated before giving up.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Grace period after SIGTERM before the sampler is killed.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            samplers: default_samplers(),
            args: default_args(),
            elevate: true,
            nice: default_nice(),
            interval_ms: default_interval_ms(),
            restart_after_ticks: default_restart_after_ticks(),
            output_dir: None,
            file_prefix: default_file_prefix(),
            read_attempts: default_read_attempts(),
            read_backoff_ms: default_read_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_program() -> String {
    "powermetrics".into()
}

fn default_samplers() -> String {
    "cpu_power,gpu_power,thermal".into()
}

fn default_args() -> Vec<String> {
    [
        "--samplers",
        "{samplers}",
        "-f",
        "plist",
        "-i",
        "{interval}",
        "-o",
        "{output}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_nice() -> i32 {
    10
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_restart_after_ticks() -> u64 {
    300
}

fn default_file_prefix() -> String {
    "socmon_powermetrics".into()
}

fn default_read_attempts() -> u32 {
    3
}

fn default_read_backoff_ms() -> u64 {
    100
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_terminate_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Span of the rolling averages; converted to a tick count at the sampling interval.
    #[serde(default = "default_average_window_secs")]
    pub average_window_secs: u64,
    /// Consecutive repeated sample timestamps before the data is declared stale.
    #[serde(default = "default_stale_after_ticks")]
    pub stale_after_ticks: u32,
    /// Chart points kept for the power history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Attach RAM/swap usage to each snapshot.
    #[serde(default = "default_true")]
    pub collect_ram: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            average_window_secs: default_average_window_secs(),
            stale_after_ticks: default_stale_after_ticks(),
            history_capacity: default_history_capacity(),
            collect_ram: true,
        }
    }
}

fn default_average_window_secs() -> u64 {
    30
}

fn default_stale_after_ticks() -> u32 {
    5
}

fn default_history_capacity() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishingConfig {
    /// Max snapshots buffered for /ws/metrics (slow clients may lag).
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// How often the worker logs app stats (seconds).
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

fn default_broadcast_capacity() -> usize {
    16
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl AppConfig {
    /// Loads `$CONFIG_FILE` (default `config.toml`); built-in defaults when the file is absent.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "config file not found; using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("reading {}: {}", path, e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Rolling-window length in ticks: `average_window_secs` at `interval_ms`, at least 1.
    pub fn window_ticks(&self) -> usize {
        let ticks = self.metrics.average_window_secs * 1000 / self.sampler.interval_ms.max(1);
        (ticks as usize).max(1)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.server.enabled || self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.sampler.program.trim().is_empty(),
            "sampler.program must be non-empty"
        );
        anyhow::ensure!(
            self.sampler.args.iter().any(|a| a.contains("{output}")),
            "sampler.args must contain an {{output}} placeholder"
        );
        anyhow::ensure!(
            self.sampler.interval_ms >= MIN_SAMPLE_INTERVAL_MS,
            "sampler.interval_ms must be >= {}, got {}",
            MIN_SAMPLE_INTERVAL_MS,
            self.sampler.interval_ms
        );
        anyhow::ensure!(
            (-20..=20).contains(&self.sampler.nice),
            "sampler.nice must be between -20 and 20, got {}",
            self.sampler.nice
        );
        anyhow::ensure!(
            self.sampler.restart_after_ticks > 0,
            "sampler.restart_after_ticks must be > 0, got {}",
            self.sampler.restart_after_ticks
        );
        anyhow::ensure!(
            !self.sampler.file_prefix.is_empty()
                && !self.sampler.file_prefix.contains(std::path::MAIN_SEPARATOR),
            "sampler.file_prefix must be a non-empty file name, got {:?}",
            self.sampler.file_prefix
        );
        anyhow::ensure!(
            self.sampler.read_attempts > 0,
            "sampler.read_attempts must be > 0, got {}",
            self.sampler.read_attempts
        );
        anyhow::ensure!(
            self.sampler.max_consecutive_failures > 0,
            "sampler.max_consecutive_failures must be > 0, got {}",
            self.sampler.max_consecutive_failures
        );
        anyhow::ensure!(
            self.metrics.average_window_secs > 0,
            "metrics.average_window_secs must be > 0, got {}",
            self.metrics.average_window_secs
        );
        anyhow::ensure!(
            self.metrics.stale_after_ticks > 0,
            "metrics.stale_after_ticks must be > 0, got {}",
            self.metrics.stale_after_ticks
        );
        anyhow::ensure!(
            self.metrics.history_capacity > 0,
            "metrics.history_capacity must be > 0, got {}",
            self.metrics.history_capacity
        );
        anyhow::ensure!(
            self.publishing.broadcast_capacity > 0,
            "publishing.broadcast_capacity must be > 0, got {}",
            self.publishing.broadcast_capacity
        );
        anyhow::ensure!(
            self.publishing.stats_log_interval_secs > 0,
            "publishing.stats_log_interval_secs must be > 0, got {}",
            self.publishing.stats_log_interval_secs
        );
        Ok(())
    }
}
