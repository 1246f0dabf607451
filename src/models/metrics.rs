// Normalized per-tick metrics record produced by the parser.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OS thermal pressure level; labels outside the known set map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalPressure {
    Nominal,
    Moderate,
    Heavy,
    Trapping,
    Sleeping,
    #[serde(other)]
    Unknown,
}

impl ThermalPressure {
    /// Parse from the powermetrics label (e.g. "Nominal", "Heavy").
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "nominal" => ThermalPressure::Nominal,
            "moderate" => ThermalPressure::Moderate,
            "heavy" => ThermalPressure::Heavy,
            "trapping" => ThermalPressure::Trapping,
            "sleeping" => ThermalPressure::Sleeping,
            _ => ThermalPressure::Unknown,
        }
    }

    pub fn is_nominal(self) -> bool {
        self == ThermalPressure::Nominal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    Efficiency,
    Performance,
}

impl ClusterRole {
    /// Role from a raw cluster label: "E-Cluster", "E0-Cluster" are efficiency; anything
    /// else ("P-Cluster", "P1-Cluster", ...) is performance.
    pub fn from_label(label: &str) -> Self {
        if label.trim_start().starts_with(['E', 'e']) {
            ClusterRole::Efficiency
        } else {
            ClusterRole::Performance
        }
    }

    fn prefix(self) -> char {
        match self {
            ClusterRole::Efficiency => 'E',
            ClusterRole::Performance => 'P',
        }
    }
}

/// Stable cluster key: role plus ordinal within that role ("E0", "P1"), independent of
/// how the sampler labels the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ClusterId {
    pub role: ClusterRole,
    pub index: u32,
}

impl ClusterId {
    pub fn new(role: ClusterRole, index: u32) -> Self {
        Self { role, index }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.index)
    }
}

impl FromStr for ClusterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let role = match chars.next() {
            Some('E') => ClusterRole::Efficiency,
            Some('P') => ClusterRole::Performance,
            _ => return Err(format!("invalid cluster id: {s:?}")),
        };
        let index = chars
            .as_str()
            .parse()
            .map_err(|_| format!("invalid cluster id: {s:?}"))?;
        Ok(Self { role, index })
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ClusterId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMetrics {
    pub cpu: u32,
    pub active_percent: f64,
    pub freq_mhz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    pub id: ClusterId,
    /// Label as reported by the sampler, kept for display only.
    pub label: String,
    pub core_count: u32,
    pub active_percent: f64,
    pub freq_mhz: f64,
    pub cores: Vec<CoreMetrics>,
}

/// Core-count-weighted summary of all clusters sharing a role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    pub active_percent: f64,
    pub freq_mhz: f64,
    pub core_count: u32,
    pub cluster_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuMetrics {
    pub active_percent: f64,
    pub freq_mhz: f64,
    /// Active percent came from the residency breakdown rather than the idle ratio.
    pub from_residency: bool,
}

/// Watts per power domain for one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerMetrics {
    pub cpu_w: f64,
    pub gpu_w: f64,
    pub ane_w: f64,
    pub package_w: f64,
    /// First record after a (re)start: no valid baseline, excluded from averages.
    pub provisional: bool,
}

/// Memory bandwidth in GB/s. `supported` is false when the record carried no counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthMetrics {
    pub supported: bool,
    pub read_gbs: f64,
    pub write_gbs: f64,
    pub ecpu_gbs: f64,
    pub pcpu_gbs: f64,
    pub gpu_gbs: f64,
    pub media_gbs: f64,
}

impl BandwidthMetrics {
    pub fn total_gbs(&self) -> f64 {
        self.read_gbs + self.write_gbs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMetrics {
    pub timestamp_ms: u64,
    pub thermal_pressure: ThermalPressure,
    /// Every present cluster, efficiency first, then by index.
    pub clusters: Vec<ClusterMetrics>,
    pub e_cluster: Option<RoleSummary>,
    pub p_cluster: Option<RoleSummary>,
    pub gpu: GpuMetrics,
    pub power: PowerMetrics,
    pub bandwidth: BandwidthMetrics,
}

impl NormalizedMetrics {
    pub fn clusters_with_role(&self, role: ClusterRole) -> impl Iterator<Item = &ClusterMetrics> {
        self.clusters.iter().filter(move |c| c.id.role == role)
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterMetrics> {
        self.clusters.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermal_labels_map_to_closed_set() {
        assert_eq!(ThermalPressure::from_label("Nominal"), ThermalPressure::Nominal);
        assert_eq!(ThermalPressure::from_label("HEAVY"), ThermalPressure::Heavy);
        assert_eq!(ThermalPressure::from_label("Trapping"), ThermalPressure::Trapping);
        assert_eq!(ThermalPressure::from_label("Sleeping"), ThermalPressure::Sleeping);
        assert_eq!(ThermalPressure::from_label("Critical"), ThermalPressure::Unknown);
        assert_eq!(ThermalPressure::from_label(""), ThermalPressure::Unknown);
    }

    #[test]
    fn cluster_id_round_trips_through_string() {
        let id = ClusterId::new(ClusterRole::Performance, 3);
        assert_eq!(id.to_string(), "P3");
        assert_eq!("P3".parse::<ClusterId>().unwrap(), id);
        assert!("X1".parse::<ClusterId>().is_err());
        assert!("E".parse::<ClusterId>().is_err());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"P3\"");
    }

    #[test]
    fn role_from_label_prefix() {
        assert_eq!(ClusterRole::from_label("E-Cluster"), ClusterRole::Efficiency);
        assert_eq!(ClusterRole::from_label("E1-Cluster"), ClusterRole::Efficiency);
        assert_eq!(ClusterRole::from_label("P0-Cluster"), ClusterRole::Performance);
        assert_eq!(ClusterRole::from_label("P-Cluster"), ClusterRole::Performance);
    }
}
