// Rolling windows and derived values over the stream of normalized records.
// One instance per session, owned by the polling loop; no shared state.

use std::collections::BTreeMap;

use crate::chip_spec::ChipSpec;
use crate::config::AppConfig;
use crate::history::{BoundedHistory, RollingWindow};
use crate::models::*;

/// GPU watts above which a zero residency reading is considered under-reported.
const GPU_POWER_FALLBACK_MIN_W: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Rolling-window length in ticks.
    pub window_len: usize,
    /// Ticks in a row without a fresh sample (repeated timestamp or nothing readable)
    /// before the stale signal fires.
    pub stale_after_ticks: u32,
    /// Chart points kept in the power history.
    pub history_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_len: 30,
            stale_after_ticks: 5,
            history_capacity: 200,
        }
    }
}

impl From<&AppConfig> for AggregatorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            window_len: config.window_ticks(),
            stale_after_ticks: config.metrics.stale_after_ticks,
            history_capacity: config.metrics.history_capacity,
        }
    }
}

/// Metrics with their own rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Metric {
    PackagePower,
    CpuPower,
    GpuPower,
    AnePower,
    ECluster,
    PCluster,
    GpuActive,
    Bandwidth,
    Cluster(ClusterId),
}

/// Result of feeding one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New timestamp; windows and derived values updated.
    Updated,
    /// Same timestamp as the previous record; nothing updated.
    Repeated { repeats: u32 },
    /// Repeats reached the threshold on this tick; the caller may restart the sampler.
    BecameStale { repeats: u32 },
}

pub struct MetricsAggregator {
    spec: ChipSpec,
    config: AggregatorConfig,
    state: AggregatorState,
    windows: BTreeMap<Metric, RollingWindow>,
    history: BoundedHistory<HistoryPoint>,
    latest: Option<NormalizedMetrics>,
    derived: DerivedMetrics,
    peaks: PowerPeaks,
    last_timestamp: Option<u64>,
    repeats: u32,
    fresh_ticks: u64,
    ram: Option<RamStats>,
}

impl MetricsAggregator {
    /// `soc` sizes the per-cluster tracking up front; clusters that show up later get
    /// windows on first sight.
    pub fn new(spec: ChipSpec, soc: Option<&SocInfo>, config: AggregatorConfig) -> Self {
        let mut windows = BTreeMap::new();
        for metric in [
            Metric::PackagePower,
            Metric::CpuPower,
            Metric::GpuPower,
            Metric::AnePower,
            Metric::ECluster,
            Metric::PCluster,
            Metric::GpuActive,
            Metric::Bandwidth,
        ] {
            windows.insert(metric, RollingWindow::new(config.window_len));
        }
        let (e_clusters, p_clusters) = expected_clusters(&spec, soc);
        for index in 0..e_clusters {
            let id = ClusterId::new(ClusterRole::Efficiency, index);
            windows.insert(Metric::Cluster(id), RollingWindow::new(config.window_len));
        }
        for index in 0..p_clusters {
            let id = ClusterId::new(ClusterRole::Performance, index);
            windows.insert(Metric::Cluster(id), RollingWindow::new(config.window_len));
        }

        Self {
            history: BoundedHistory::new(config.history_capacity),
            spec,
            config,
            state: AggregatorState::Idle,
            windows,
            latest: None,
            derived: DerivedMetrics::default(),
            peaks: PowerPeaks::default(),
            last_timestamp: None,
            repeats: 0,
            fresh_ticks: 0,
            ram: None,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn spec(&self) -> &ChipSpec {
        &self.spec
    }

    pub fn latest(&self) -> Option<&NormalizedMetrics> {
        self.latest.as_ref()
    }

    pub fn window(&self, metric: Metric) -> Option<&RollingWindow> {
        self.windows.get(&metric)
    }

    pub fn is_stale(&self) -> bool {
        self.state == AggregatorState::Stale
    }

    /// Memory usage attached to subsequent snapshots.
    pub fn set_ram(&mut self, ram: Option<RamStats>) {
        self.ram = ram;
    }

    pub fn ingest(&mut self, metrics: NormalizedMetrics) -> IngestOutcome {
        if self.state == AggregatorState::Stopped {
            return IngestOutcome::Repeated {
                repeats: self.repeats,
            };
        }

        if self.last_timestamp == Some(metrics.timestamp_ms) {
            return self.count_repeat();
        }

        if let Some(prev) = self.last_timestamp
            && metrics.timestamp_ms < prev
        {
            tracing::debug!(
                previous_ms = prev,
                timestamp_ms = metrics.timestamp_ms,
                "sample timestamp went backwards"
            );
        }
        self.last_timestamp = Some(metrics.timestamp_ms);
        self.repeats = 0;
        self.fresh_ticks += 1;

        self.push_windows(&metrics);
        self.derived = derive(&metrics, &self.spec);
        self.update_peaks(&metrics);
        if !metrics.power.provisional {
            self.history.push(HistoryPoint {
                timestamp_ms: metrics.timestamp_ms,
                package_w: metrics.power.package_w,
                cpu_power_percent: self.derived.cpu_power_percent,
                gpu_power_percent: self.derived.gpu_power_percent,
            });
        }
        self.latest = Some(metrics);

        self.state = if self.fresh_ticks >= self.config.window_len as u64 {
            AggregatorState::Steady
        } else {
            AggregatorState::Warming
        };
        IngestOutcome::Updated
    }

    /// A tick that produced no readable record. Counts toward staleness like a repeated
    /// timestamp; ignored before the first record.
    pub fn note_missed_tick(&mut self) -> IngestOutcome {
        if self.state == AggregatorState::Stopped || self.latest.is_none() {
            return IngestOutcome::Repeated {
                repeats: self.repeats,
            };
        }
        self.count_repeat()
    }

    /// Current view, or None before the first record. Each call returns an owned copy.
    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        let metrics = self.latest.clone()?;
        let avg = |m: Metric| self.windows.get(&m).map_or(0.0, RollingWindow::average);
        let cluster_averages = metrics
            .clusters
            .iter()
            .map(|c| ClusterAverage {
                id: c.id,
                active_percent: avg(Metric::Cluster(c.id)),
            })
            .collect();

        Some(MetricsSnapshot {
            seq: self.fresh_ticks,
            state: self.state,
            stale: self.is_stale(),
            derived: self.derived,
            averages: WindowAverages {
                package_w: avg(Metric::PackagePower),
                cpu_w: avg(Metric::CpuPower),
                gpu_w: avg(Metric::GpuPower),
                ane_w: avg(Metric::AnePower),
                e_cluster_active: avg(Metric::ECluster),
                p_cluster_active: avg(Metric::PCluster),
                gpu_active: avg(Metric::GpuActive),
                bandwidth_gbs: avg(Metric::Bandwidth),
                partial: self.state == AggregatorState::Warming,
            },
            cluster_averages,
            peaks: self.peaks,
            history: self.history.to_vec(),
            ram: self.ram.clone(),
            metrics,
        })
    }

    /// Terminal state; later records are ignored.
    pub fn shutdown(&mut self) {
        self.state = AggregatorState::Stopped;
    }

    fn count_repeat(&mut self) -> IngestOutcome {
        self.repeats += 1;
        if self.repeats >= self.config.stale_after_ticks && self.state != AggregatorState::Stale {
            self.state = AggregatorState::Stale;
            tracing::warn!(
                repeats = self.repeats,
                last_timestamp_ms = ?self.last_timestamp,
                "no fresh sample; data is stale"
            );
            return IngestOutcome::BecameStale {
                repeats: self.repeats,
            };
        }
        IngestOutcome::Repeated {
            repeats: self.repeats,
        }
    }

    fn push_windows(&mut self, m: &NormalizedMetrics) {
        let window_len = self.config.window_len;
        let mut push = |metric: Metric, value: f64| {
            self.windows
                .entry(metric)
                .or_insert_with(|| RollingWindow::new(window_len))
                .push(value);
        };

        if !m.power.provisional {
            push(Metric::PackagePower, m.power.package_w);
            push(Metric::CpuPower, m.power.cpu_w);
            push(Metric::GpuPower, m.power.gpu_w);
            push(Metric::AnePower, m.power.ane_w);
        }
        if let Some(e) = m.e_cluster {
            push(Metric::ECluster, e.active_percent);
        }
        if let Some(p) = m.p_cluster {
            push(Metric::PCluster, p.active_percent);
        }
        push(Metric::GpuActive, m.gpu.active_percent);
        if m.bandwidth.supported {
            push(Metric::Bandwidth, m.bandwidth.total_gbs());
        }
        for c in &m.clusters {
            push(Metric::Cluster(c.id), c.active_percent);
        }
    }

    fn update_peaks(&mut self, m: &NormalizedMetrics) {
        if m.power.provisional {
            return;
        }
        self.peaks.package_w = self.peaks.package_w.max(m.power.package_w);
        self.peaks.cpu_w = self.peaks.cpu_w.max(m.power.cpu_w);
        self.peaks.gpu_w = self.peaks.gpu_w.max(self.derived.gpu_display_power_w);
    }
}

fn expected_clusters(spec: &ChipSpec, soc: Option<&SocInfo>) -> (u32, u32) {
    let e = match soc.and_then(|s| s.e_core_count) {
        Some(0) => 0,
        _ => spec.e_clusters,
    };
    let p = match soc.and_then(|s| s.p_core_count) {
        Some(0) => 0,
        _ => spec.p_clusters,
    };
    (e, p)
}

/// `part / max * 100` clamped to [0, 100]; 0 when `max` is not positive.
pub fn percent_of(part: f64, max: f64) -> f64 {
    if max <= 0.0 || !part.is_finite() {
        return 0.0;
    }
    (part / max * 100.0).clamp(0.0, 100.0)
}

/// `min(ane_w / max_ane_w, 1) * 100`; 0 for an unknown spec.
pub fn ane_utilization(ane_w: f64, spec: &ChipSpec) -> f64 {
    if spec.max_ane_power_w <= 0.0 || !ane_w.is_finite() {
        return 0.0;
    }
    (ane_w / spec.max_ane_power_w).clamp(0.0, 1.0) * 100.0
}

/// Residency-based GPU active percent, or the power ratio when residency reads exactly
/// zero while the GPU rail draws power. Returns (percent, from_power).
pub fn gpu_usage(gpu_active: f64, gpu_w: f64, spec: &ChipSpec) -> (f64, bool) {
    if gpu_active == 0.0 && gpu_w > GPU_POWER_FALLBACK_MIN_W && spec.max_gpu_power_w > 0.0 {
        return (percent_of(gpu_w, spec.max_gpu_power_w), true);
    }
    (gpu_active.clamp(0.0, 100.0), false)
}

pub fn derive(m: &NormalizedMetrics, spec: &ChipSpec) -> DerivedMetrics {
    let (gpu_usage_percent, gpu_usage_from_power) = gpu_usage(m.gpu.active_percent, m.power.gpu_w, spec);

    // Some builds omit GPU rail energy; estimate from usage so the chart still moves.
    let (gpu_display_power_w, gpu_power_estimated) =
        if m.power.gpu_w <= 0.0 && gpu_usage_percent > 0.0 && spec.max_gpu_power_w > 0.0 {
            (gpu_usage_percent / 100.0 * spec.max_gpu_power_w, true)
        } else {
            (m.power.gpu_w, false)
        };

    DerivedMetrics {
        ane_util_percent: ane_utilization(m.power.ane_w, spec),
        gpu_usage_percent,
        gpu_usage_from_power,
        gpu_display_power_w,
        gpu_power_estimated,
        cpu_power_percent: percent_of(m.power.cpu_w, spec.max_cpu_power_w),
        gpu_power_percent: percent_of(gpu_display_power_w, spec.max_gpu_power_w),
        bandwidth_percent: if m.bandwidth.supported {
            percent_of(m.bandwidth.total_gbs(), spec.max_bandwidth_gbs)
        } else {
            0.0
        },
        thermal_throttle: !m.thermal_pressure.is_nominal(),
    }
}
