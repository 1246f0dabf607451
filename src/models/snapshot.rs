// Per-tick read-only view handed to consumers

use serde::{Deserialize, Serialize};

use super::{ClusterId, NormalizedMetrics, RamStats};

/// Aggregator lifecycle: Idle -> Warming -> Steady <-> Stale, Stopped on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    /// No record ingested yet.
    Idle,
    /// Windows not yet full; averages are partial.
    Warming,
    Steady,
    /// Sample timestamp has not advanced for the configured number of ticks.
    Stale,
    Stopped,
}

/// Values computed per tick from the latest record and the chip limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub ane_util_percent: f64,
    pub gpu_usage_percent: f64,
    /// GPU usage came from the power-ratio fallback.
    pub gpu_usage_from_power: bool,
    /// GPU watts for display; estimated from usage when the rail reads zero.
    pub gpu_display_power_w: f64,
    pub gpu_power_estimated: bool,
    pub cpu_power_percent: f64,
    pub gpu_power_percent: f64,
    pub bandwidth_percent: f64,
    pub thermal_throttle: bool,
}

/// Rolling averages over the configured window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowAverages {
    pub package_w: f64,
    pub cpu_w: f64,
    pub gpu_w: f64,
    pub ane_w: f64,
    pub e_cluster_active: f64,
    pub p_cluster_active: f64,
    pub gpu_active: f64,
    pub bandwidth_gbs: f64,
    /// Window not yet full.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPeaks {
    pub package_w: f64,
    pub cpu_w: f64,
    pub gpu_w: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAverage {
    pub id: ClusterId,
    pub active_percent: f64,
}

/// One chart point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp_ms: u64,
    pub package_w: f64,
    pub cpu_power_percent: f64,
    pub gpu_power_percent: f64,
}

/// Immutable per-tick view. Published once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Number of fresh records ingested so far.
    pub seq: u64,
    pub state: AggregatorState,
    pub stale: bool,
    pub metrics: NormalizedMetrics,
    pub derived: DerivedMetrics,
    pub averages: WindowAverages,
    pub cluster_averages: Vec<ClusterAverage>,
    pub peaks: PowerPeaks,
    pub history: Vec<HistoryPoint>,
    #[serde(default)]
    pub ram: Option<RamStats>,
}
