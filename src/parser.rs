// Pure transformation of one powermetrics record into NormalizedMetrics.
// No I/O and no state: the same input always yields the same output.

use std::time::Duration;

use crate::error::ParseError;
use crate::models::*;

/// Frequencies above this are taken to be Hz and scaled to MHz; anything at or below is
/// already MHz. powermetrics reports CPU clusters in Hz but some builds report GPU in MHz,
/// and the record carries no unit tag, so this is an approximation: a genuine MHz value
/// above 100 GHz or a Hz value below 100 kHz would be misread. Neither occurs on real parts.
pub const HZ_THRESHOLD: f64 = 100_000.0;

const BYTES_PER_GB: f64 = 1e9;

const MEDIA_PREFIXES: &[&str] = &["ISP", "STRM CODEC", "PRORES", "VDEC", "VENC", "JPG"];

/// Per-record inputs that do not come from the record itself.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    /// Configured sampling interval; used when the record lacks `elapsed_ns`.
    pub interval: Duration,
    /// First record read from a freshly (re)started sampler.
    pub first_since_restart: bool,
}

impl ParseContext {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            first_since_restart: false,
        }
    }
}

/// Decodes one plist record.
pub fn decode_record(bytes: &[u8]) -> Result<RawSample, ParseError> {
    let trimmed = trim_record(bytes);
    if trimmed.is_empty() {
        return Err(ParseError::EmptyRecord);
    }
    Ok(plist::from_bytes(trimmed)?)
}

/// Decodes the newest complete record from a buffer of NUL-separated plists. A trailing
/// record still being written fails to decode and the one before it is used instead.
pub fn decode_latest(buf: &[u8]) -> Result<RawSample, ParseError> {
    let mut last_err = None;
    for part in buf.split(|b| *b == 0).rev() {
        match decode_record(part) {
            Ok(sample) => return Ok(sample),
            Err(ParseError::EmptyRecord) => continue,
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(ParseError::EmptyRecord))
}

fn trim_record(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Normalizes a raw frequency field to MHz (see [`HZ_THRESHOLD`]). Missing, negative and
/// non-finite values read as 0.
pub fn normalize_freq_mhz(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        0.0
    } else if raw > HZ_THRESHOLD {
        raw / 1e6
    } else {
        raw
    }
}

/// `100 * (1 - idle_ratio)`, with the ratio clamped to [0, 1]. A missing ratio reads as idle.
pub fn active_percent(idle_ratio: Option<f64>) -> f64 {
    match idle_ratio {
        Some(r) if r.is_finite() => 100.0 * (1.0 - r.clamp(0.0, 1.0)),
        _ => 0.0,
    }
}

/// Converts an energy counter accumulated over `interval_s` seconds to watts.
pub fn energy_to_watts(energy_mj: f64, interval_s: f64) -> f64 {
    if !energy_mj.is_finite() || interval_s <= 0.0 {
        return 0.0;
    }
    energy_mj / interval_s / 1000.0
}

pub fn parse(raw: &RawSample, ctx: &ParseContext) -> NormalizedMetrics {
    let clusters = parse_clusters(&raw.processor.clusters);
    let e_cluster = summarize_role(&clusters, ClusterRole::Efficiency);
    let p_cluster = summarize_role(&clusters, ClusterRole::Performance);

    NormalizedMetrics {
        timestamp_ms: raw.timestamp_ms,
        thermal_pressure: raw
            .thermal_pressure
            .as_deref()
            .map_or(ThermalPressure::Unknown, ThermalPressure::from_label),
        clusters,
        e_cluster,
        p_cluster,
        gpu: parse_gpu(raw.gpu.as_ref()),
        power: parse_power(raw, ctx),
        bandwidth: parse_bandwidth(raw.bandwidth_counters.as_deref()),
    }
}

fn parse_clusters(raw: &[RawCluster]) -> Vec<ClusterMetrics> {
    let mut e_index = 0;
    let mut p_index = 0;
    let mut clusters: Vec<ClusterMetrics> = raw
        .iter()
        .map(|c| {
            let role = ClusterRole::from_label(&c.name);
            let next = match role {
                ClusterRole::Efficiency => &mut e_index,
                ClusterRole::Performance => &mut p_index,
            };
            let id = ClusterId::new(role, *next);
            *next += 1;

            let cores: Vec<CoreMetrics> = c
                .cpus
                .iter()
                .map(|cpu| CoreMetrics {
                    cpu: cpu.cpu,
                    active_percent: active_percent(cpu.idle_ratio),
                    freq_mhz: normalize_freq_mhz(cpu.freq_hz.unwrap_or(0.0)),
                })
                .collect();

            ClusterMetrics {
                id,
                label: c.name.clone(),
                core_count: cores.len() as u32,
                active_percent: active_percent(c.idle_ratio),
                freq_mhz: normalize_freq_mhz(c.freq_hz.unwrap_or(0.0)),
                cores,
            }
        })
        .collect();
    clusters.sort_by_key(|c| c.id);
    clusters
}

/// Core-count-weighted mean of active percent and frequency over all clusters with `role`.
/// A cluster without per-core entries weighs 1. Equal weights reduce to the plain mean.
fn summarize_role(clusters: &[ClusterMetrics], role: ClusterRole) -> Option<RoleSummary> {
    let members: Vec<&ClusterMetrics> = clusters.iter().filter(|c| c.id.role == role).collect();
    let first = members.first()?;
    let weight = |c: &ClusterMetrics| f64::from(c.core_count.max(1));
    let n = members.len() as f64;

    let (active_percent, freq_mhz) = if members.iter().all(|c| weight(c) == weight(first)) {
        (
            members.iter().map(|c| c.active_percent).sum::<f64>() / n,
            members.iter().map(|c| c.freq_mhz).sum::<f64>() / n,
        )
    } else {
        let total: f64 = members.iter().map(|c| weight(c)).sum();
        (
            members
                .iter()
                .map(|c| weight(c) * c.active_percent)
                .sum::<f64>()
                / total,
            members.iter().map(|c| weight(c) * c.freq_mhz).sum::<f64>() / total,
        )
    };

    Some(RoleSummary {
        active_percent,
        freq_mhz,
        core_count: members.iter().map(|c| c.core_count).sum(),
        cluster_count: members.len() as u32,
    })
}

fn is_idle_state(state: &RawResidencyState) -> bool {
    match state.name.as_deref() {
        Some(name) => name.eq_ignore_ascii_case("idle") || name.eq_ignore_ascii_case("off"),
        None => state.freq <= 0.0,
    }
}

fn parse_gpu(raw: Option<&RawGpu>) -> GpuMetrics {
    let Some(gpu) = raw else {
        return GpuMetrics::default();
    };
    let freq_mhz = normalize_freq_mhz(gpu.freq_hz.unwrap_or(0.0));
    if freq_mhz > 0.0 || gpu.dvfm_states.is_empty() {
        return GpuMetrics {
            active_percent: active_percent(gpu.idle_ratio),
            freq_mhz,
            from_residency: false,
        };
    }

    // Zero frequency with a residency table: some variants leave freq_hz empty and only
    // report time-in-state.
    let busy: Vec<&RawResidencyState> = gpu
        .dvfm_states
        .iter()
        .filter(|s| !is_idle_state(s) && s.used_ratio.is_finite() && s.used_ratio > 0.0)
        .collect();
    let busy_ratio: f64 = busy.iter().map(|s| s.used_ratio).sum();
    let freq_mhz = if busy_ratio > 0.0 {
        busy.iter()
            .map(|s| normalize_freq_mhz(s.freq) * s.used_ratio)
            .sum::<f64>()
            / busy_ratio
    } else {
        0.0
    };

    GpuMetrics {
        active_percent: (100.0 * busy_ratio).clamp(0.0, 100.0),
        freq_mhz,
        from_residency: true,
    }
}

fn parse_power(raw: &RawSample, ctx: &ParseContext) -> PowerMetrics {
    let interval_s = match raw.elapsed_ns {
        Some(ns) if ns > 0 => ns as f64 / 1e9,
        _ => ctx.interval.as_secs_f64(),
    };
    let p = &raw.processor;

    // Newer builds report GPU rail energy in the gpu section; older ones only in processor.
    let gpu_energy = raw
        .gpu
        .as_ref()
        .and_then(|g| g.gpu_energy)
        .filter(|e| *e != 0.0)
        .or(p.gpu_energy)
        .unwrap_or(0.0);
    let cpu_energy = p.cpu_energy.unwrap_or(0.0);
    let ane_energy = p.ane_energy.unwrap_or(0.0);
    let combined = p
        .combined_power
        .unwrap_or(cpu_energy + gpu_energy + ane_energy);

    PowerMetrics {
        cpu_w: energy_to_watts(cpu_energy, interval_s),
        gpu_w: energy_to_watts(gpu_energy, interval_s),
        ane_w: energy_to_watts(ane_energy, interval_s),
        package_w: energy_to_watts(combined, interval_s),
        provisional: ctx.first_since_restart,
    }
}

fn parse_bandwidth(raw: Option<&[RawBandwidthCounter]>) -> BandwidthMetrics {
    let Some(counters) = raw else {
        return BandwidthMetrics::default();
    };

    let mut bw = BandwidthMetrics {
        supported: true,
        ..Default::default()
    };
    let mut total_rd = None;
    let mut total_wr = None;
    let mut sum_rd = 0.0;
    let mut sum_wr = 0.0;

    for c in counters {
        let gbs = if c.value.is_finite() {
            c.value / BYTES_PER_GB
        } else {
            0.0
        };
        let name = c.name.trim();
        match name {
            "DCS RD" => total_rd = Some(gbs),
            "DCS WR" => total_wr = Some(gbs),
            _ => {
                if name.ends_with(" RD") {
                    sum_rd += gbs;
                } else if name.ends_with(" WR") {
                    sum_wr += gbs;
                }
                if name.starts_with("ECPU") {
                    bw.ecpu_gbs += gbs;
                } else if name.starts_with("PCPU") {
                    bw.pcpu_gbs += gbs;
                } else if name.starts_with("GFX") {
                    bw.gpu_gbs += gbs;
                } else if MEDIA_PREFIXES.iter().any(|p| name.starts_with(p)) {
                    bw.media_gbs += gbs;
                }
            }
        }
    }

    bw.read_gbs = total_rd.unwrap_or(sum_rd);
    bw.write_gbs = total_wr.unwrap_or(sum_wr);
    bw
}
