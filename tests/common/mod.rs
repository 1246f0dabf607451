// Shared test helpers: plist sample fixtures, sampler configs, metric builders

#![allow(dead_code)]

use socmon::config::SamplerConfig;
use socmon::models::*;
use std::fmt::Write as _;
use std::path::Path;

pub const TEST_PREFIX: &str = "socmon_test_";

/// One powermetrics-style record, rendered as an XML plist.
#[derive(Debug, Clone)]
pub struct SampleFixture {
    pub timestamp_secs: i64,
    pub thermal_pressure: &'static str,
    pub elapsed_ns: Option<u64>,
    /// (name, freq_hz, idle_ratio, cpu ids)
    pub clusters: Vec<(&'static str, f64, f64, Vec<u32>)>,
    pub ane_energy: f64,
    pub cpu_energy: f64,
    pub gpu_energy: f64,
    pub gpu_freq_hz: f64,
    pub gpu_idle_ratio: f64,
    /// (name, freq, used_ratio)
    pub gpu_residency: Vec<(&'static str, f64, f64)>,
    /// (name, bytes over the interval)
    pub bandwidth: Option<Vec<(&'static str, f64)>>,
}

impl Default for SampleFixture {
    fn default() -> Self {
        Self {
            timestamp_secs: 1_700_000_000,
            thermal_pressure: "Nominal",
            elapsed_ns: Some(1_000_000_000),
            clusters: vec![
                ("E-Cluster", 600.0, 0.8, vec![0, 1, 2, 3]),
                ("P-Cluster", 3_204_000_000.0, 0.5, vec![4, 5, 6, 7]),
            ],
            ane_energy: 800.0,
            cpu_energy: 4_000.0,
            gpu_energy: 2_000.0,
            gpu_freq_hz: 1_296_000_000.0,
            gpu_idle_ratio: 0.6,
            gpu_residency: vec![],
            bandwidth: None,
        }
    }
}

impl SampleFixture {
    pub fn at(timestamp_secs: i64) -> Self {
        Self {
            timestamp_secs,
            ..Default::default()
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_secs as u64 * 1000
    }

    pub fn to_plist(&self) -> String {
        let date = chrono::DateTime::from_timestamp(self.timestamp_secs, 0)
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%SZ");
        let mut s = String::new();
        s.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        s.push_str("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n");
        s.push_str("<plist version=\"1.0\">\n<dict>\n");
        writeln!(s, "<key>timestamp</key><date>{date}</date>").unwrap();
        writeln!(
            s,
            "<key>thermal_pressure</key><string>{}</string>",
            self.thermal_pressure
        )
        .unwrap();
        if let Some(ns) = self.elapsed_ns {
            writeln!(s, "<key>elapsed_ns</key><integer>{ns}</integer>").unwrap();
        }

        s.push_str("<key>processor</key>\n<dict>\n<key>clusters</key>\n<array>\n");
        for (name, freq, idle, cpus) in &self.clusters {
            writeln!(
                s,
                "<dict><key>name</key><string>{name}</string><key>freq_hz</key><real>{freq}</real><key>idle_ratio</key><real>{idle}</real>"
            )
            .unwrap();
            s.push_str("<key>cpus</key><array>\n");
            for cpu in cpus {
                writeln!(
                    s,
                    "<dict><key>cpu</key><integer>{cpu}</integer><key>freq_hz</key><real>{freq}</real><key>idle_ratio</key><real>{idle}</real></dict>"
                )
                .unwrap();
            }
            s.push_str("</array></dict>\n");
        }
        s.push_str("</array>\n");
        writeln!(s, "<key>ane_energy</key><real>{}</real>", self.ane_energy).unwrap();
        writeln!(s, "<key>cpu_energy</key><real>{}</real>", self.cpu_energy).unwrap();
        writeln!(s, "<key>gpu_energy</key><real>{}</real>", self.gpu_energy).unwrap();
        writeln!(
            s,
            "<key>combined_power</key><real>{}</real>",
            self.ane_energy + self.cpu_energy + self.gpu_energy
        )
        .unwrap();
        s.push_str("</dict>\n");

        s.push_str("<key>gpu</key>\n<dict>\n");
        writeln!(s, "<key>freq_hz</key><real>{}</real>", self.gpu_freq_hz).unwrap();
        writeln!(s, "<key>idle_ratio</key><real>{}</real>", self.gpu_idle_ratio).unwrap();
        s.push_str("<key>dvfm_states</key><array>\n");
        for (name, freq, ratio) in &self.gpu_residency {
            writeln!(
                s,
                "<dict><key>name</key><string>{name}</string><key>freq</key><real>{freq}</real><key>used_ratio</key><real>{ratio}</real></dict>"
            )
            .unwrap();
        }
        s.push_str("</array>\n</dict>\n");

        if let Some(counters) = &self.bandwidth {
            s.push_str("<key>bandwidth_counters</key>\n<array>\n");
            for (name, value) in counters {
                writeln!(
                    s,
                    "<dict><key>name</key><string>{name}</string><key>value</key><real>{value}</real></dict>"
                )
                .unwrap();
            }
            s.push_str("</array>\n");
        }
        s.push_str("</dict>\n</plist>\n");
        s
    }
}

/// NUL-separated records, the way the sampler appends them.
pub fn plist_stream(fixtures: &[SampleFixture]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, f) in fixtures.iter().enumerate() {
        if i > 0 {
            out.push(0);
        }
        out.extend_from_slice(f.to_plist().as_bytes());
    }
    out
}

/// Sampler config that runs `sh -c <script> sh <output>` in `dir`: `$1` is the output path.
pub fn sh_sampler_config(dir: &Path, script: &str) -> SamplerConfig {
    SamplerConfig {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), "sh".into(), "{output}".into()],
        elevate: false,
        nice: 0,
        interval_ms: 100,
        output_dir: Some(dir.to_path_buf()),
        file_prefix: TEST_PREFIX.into(),
        read_attempts: 20,
        read_backoff_ms: 50,
        max_consecutive_failures: 2,
        terminate_timeout_ms: 1000,
        ..Default::default()
    }
}

/// Writes `fixtures` to `<dir>/<name>` and returns a script that copies it to the output
/// file and then idles like a live sampler.
pub fn copy_fixture_script(dir: &Path, name: &str, fixtures: &[SampleFixture]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, plist_stream(fixtures)).unwrap();
    format!("cat '{}' > \"$1\"; exec sleep 30", path.display())
}

/// Sampler output files currently present in `dir`.
pub fn output_files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(TEST_PREFIX))
        .collect()
}

pub fn metrics_at(timestamp_ms: u64, package_w: f64) -> NormalizedMetrics {
    NormalizedMetrics {
        timestamp_ms,
        thermal_pressure: ThermalPressure::Nominal,
        clusters: vec![],
        e_cluster: None,
        p_cluster: None,
        gpu: GpuMetrics::default(),
        power: PowerMetrics {
            package_w,
            ..Default::default()
        },
        bandwidth: BandwidthMetrics::default(),
    }
}
