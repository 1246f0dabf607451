// SoC identity and memory usage (system-identification collaborator output)

use serde::{Deserialize, Serialize};

use crate::chip_spec::ChipSpec;

/// Static hardware identity, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocInfo {
    /// CPU brand string, e.g. "Apple M1 Max".
    pub name: String,
    pub core_count: u32,
    pub e_core_count: Option<u32>,
    pub p_core_count: Option<u32>,
    pub gpu_core_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RamStats {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    /// None when swap is not configured.
    pub swap_usage_percent: Option<f64>,
}

/// Response of `GET /api/chip`: detected SoC and the capability limits resolved for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChipInfo {
    pub soc: SocInfo,
    pub spec: ChipSpec,
}
