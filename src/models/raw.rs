// As-received powermetrics record (one plist per sampling tick).
// Field names follow the plist keys; everything optional defaults so sparse records still decode.

use serde::{Deserialize, Deserializer};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSample {
    /// Sample time as unix milliseconds (plist `<date>`).
    #[serde(rename = "timestamp", deserialize_with = "de_plist_date_ms")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub thermal_pressure: Option<String>,
    /// Actual length of the sampled interval.
    #[serde(default)]
    pub elapsed_ns: Option<u64>,
    #[serde(default)]
    pub processor: RawProcessor,
    #[serde(default)]
    pub gpu: Option<RawGpu>,
    /// Absent on OS releases that stopped exposing memory bandwidth.
    #[serde(default)]
    pub bandwidth_counters: Option<Vec<RawBandwidthCounter>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProcessor {
    #[serde(default)]
    pub clusters: Vec<RawCluster>,
    /// Energy counters in mJ accumulated over the interval.
    #[serde(default)]
    pub ane_energy: Option<f64>,
    #[serde(default)]
    pub cpu_energy: Option<f64>,
    #[serde(default)]
    pub gpu_energy: Option<f64>,
    #[serde(default)]
    pub combined_power: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCluster {
    pub name: String,
    #[serde(default)]
    pub freq_hz: Option<f64>,
    #[serde(default)]
    pub idle_ratio: Option<f64>,
    #[serde(default)]
    pub cpus: Vec<RawCpu>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCpu {
    pub cpu: u32,
    #[serde(default)]
    pub freq_hz: Option<f64>,
    #[serde(default)]
    pub idle_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawGpu {
    #[serde(default)]
    pub freq_hz: Option<f64>,
    #[serde(default)]
    pub idle_ratio: Option<f64>,
    #[serde(default)]
    pub dvfm_states: Vec<RawResidencyState>,
    #[serde(default)]
    pub gpu_energy: Option<f64>,
}

/// Fraction of the interval spent in one GPU power/frequency state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawResidencyState {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub freq: f64,
    #[serde(default)]
    pub used_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBandwidthCounter {
    pub name: String,
    #[serde(default)]
    pub value: f64,
}

fn de_plist_date_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let date = plist::Date::deserialize(deserializer)?;
    let time: SystemTime = date.into();
    Ok(time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0))
}
