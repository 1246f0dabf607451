// Domain models: raw sampler records, normalized metrics, published snapshots

mod metrics;
mod raw;
mod snapshot;
mod system;

pub use metrics::{
    BandwidthMetrics, ClusterId, ClusterMetrics, ClusterRole, CoreMetrics, GpuMetrics,
    NormalizedMetrics, PowerMetrics, RoleSummary, ThermalPressure,
};
pub use raw::{
    RawBandwidthCounter, RawCluster, RawCpu, RawGpu, RawProcessor, RawResidencyState, RawSample,
};
pub use snapshot::{
    AggregatorState, ClusterAverage, DerivedMetrics, HistoryPoint, MetricsSnapshot, PowerPeaks,
    WindowAverages,
};
pub use system::{ChipInfo, RamStats, SocInfo};
