// Polling loop: sampler read -> parse -> aggregate -> publish, once per tick.
// Transient errors skip a tick and keep the previous snapshot until enough ticks pass
// without fresh data to mark it stale; fatal sampler errors end the loop.

use crate::aggregator::{IngestOutcome, MetricsAggregator};
use crate::error::SamplerError;
use crate::models::MetricsSnapshot;
use crate::parser::{self, ParseContext};
use crate::sampler::SamplerProcess;
use crate::sysinfo_repo::SysinfoRepo;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// Rate limit for "no receivers" and skipped-tick warnings.
const WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Latest published snapshot; None until the first record is ingested.
pub type LatestSnapshot = watch::Receiver<Option<Arc<MetricsSnapshot>>>;

/// Pipeline stages, channels, and shutdown for the worker.
pub struct WorkerDeps {
    pub sampler: SamplerProcess,
    pub aggregator: MetricsAggregator,
    pub sysinfo_repo: Arc<SysinfoRepo>,
    pub tx: broadcast::Sender<Arc<MetricsSnapshot>>,
    pub latest_tx: watch::Sender<Option<Arc<MetricsSnapshot>>>,
    pub ws_connections: Arc<AtomicUsize>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct WorkerConfig {
    pub sample_interval: Duration,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
    /// Attach RAM/swap usage to each snapshot.
    pub collect_ram: bool,
}

/// Resolves to `Err` only for fatal sampler errors. The sampler is stopped and its
/// output files removed on every exit path.
pub fn spawn(
    deps: WorkerDeps,
    config: WorkerConfig,
) -> tokio::task::JoinHandle<Result<(), SamplerError>> {
    let span = tracing::span!(
        tracing::Level::DEBUG,
        "worker",
        sample_interval_ms = config.sample_interval.as_millis() as u64
    );
    tokio::spawn(run(deps, config).instrument(span))
}

async fn run(deps: WorkerDeps, config: WorkerConfig) -> Result<(), SamplerError> {
    let WorkerDeps {
        mut sampler,
        mut aggregator,
        sysinfo_repo,
        tx,
        latest_tx,
        ws_connections,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        sample_interval,
        stats_log_interval_secs,
        collect_ram,
    } = config;

    let mut tick = interval(sample_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
    stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_no_receivers_warn: Option<Instant> = None;
    let mut last_skip_warn: Option<Instant> = None;
    let mut skipped_ticks: u64 = 0;
    let mut published: u64 = 0;

    let outcome = loop {
        tokio::select! {
            _ = tick.tick() => {
                let outcome = match sampler.next_sample().await {
                    Ok(read) => {
                        let ctx = ParseContext {
                            interval: sample_interval,
                            first_since_restart: read.first_since_restart,
                        };
                        aggregator.ingest(parser::parse(&read.sample, &ctx))
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(
                            error = %e,
                            kind = e.kind(),
                            operation = "next_sample",
                            "sampler failed; stopping"
                        );
                        break Err(e);
                    }
                    Err(e) => {
                        skipped_ticks += 1;
                        if last_skip_warn.is_none_or(|t| t.elapsed() >= WARN_INTERVAL) {
                            tracing::warn!(
                                error = %e,
                                kind = e.kind(),
                                skipped_ticks,
                                operation = "next_sample",
                                "no sample this tick; keeping previous snapshot"
                            );
                            last_skip_warn = Some(Instant::now());
                        } else {
                            tracing::debug!(error = %e, "tick skipped");
                        }
                        // Republish only when the missed tick flips the snapshot to stale.
                        match aggregator.note_missed_tick() {
                            stale @ IngestOutcome::BecameStale { .. } => stale,
                            _ => continue,
                        }
                    }
                };

                if let IngestOutcome::BecameStale { repeats } = outcome {
                    tracing::warn!(repeats, operation = "ingest", "requesting sampler restart");
                    sampler.request_restart();
                }

                if collect_ram {
                    match sysinfo_repo.get_ram_stats().await {
                        Ok(ram) => aggregator.set_ram(Some(ram)),
                        Err(e) => tracing::warn!(
                            error = %e,
                            operation = "get_ram_stats",
                            "RAM stats failed"
                        ),
                    }
                }

                let Some(snapshot) = aggregator.snapshot() else {
                    continue;
                };
                let snapshot = Arc::new(snapshot);
                latest_tx.send_replace(Some(snapshot.clone()));
                published += 1;
                if tx.send(snapshot).is_err() {
                    let should_warn = last_no_receivers_warn
                        .is_none_or(|t| t.elapsed() >= WARN_INTERVAL);
                    if should_warn {
                        tracing::debug!(
                            operation = "broadcast_snapshot",
                            "No active WebSocket clients; broadcast channel has no receivers"
                        );
                        last_no_receivers_warn = Some(Instant::now());
                    }
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Worker shutting down");
                break Ok(());
            }
            _ = stats_log_tick.tick() => {
                tracing::info!(
                    ws_clients = ws_connections.load(std::sync::atomic::Ordering::Relaxed),
                    state = ?aggregator.state(),
                    snapshots_published = published,
                    skipped_ticks,
                    sampler_restarts = sampler.restarts(),
                    sampler_failures = sampler.consecutive_failures(),
                    sampler_generation = sampler.lifecycle().generation,
                    sampler_uptime_secs = sampler.lifecycle().started_at.elapsed().as_secs(),
                    last_read_secs_ago = ?sampler
                        .lifecycle()
                        .last_read_at
                        .map(|t| t.elapsed().as_secs()),
                    "app stats"
                );
            }
        }
    };

    aggregator.shutdown();
    sampler.shutdown().await;
    outcome
}
