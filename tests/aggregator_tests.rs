// Parse + aggregate: derived values, staleness, bounded history

mod common;

use common::{SampleFixture, metrics_at};
use socmon::aggregator::{AggregatorConfig, IngestOutcome, Metric, MetricsAggregator};
use socmon::chip_spec::{ChipSpec, ChipSpecRegistry};
use socmon::models::*;
use socmon::parser::{ParseContext, decode_record, parse};
use std::time::Duration;

fn parsed(fixture: &SampleFixture) -> NormalizedMetrics {
    let raw = decode_record(fixture.to_plist().as_bytes()).unwrap();
    parse(&raw, &ParseContext::new(Duration::from_secs(1)))
}

fn aggregator(spec: ChipSpec) -> MetricsAggregator {
    MetricsAggregator::new(spec, None, AggregatorConfig::default())
}

#[test]
fn ane_utilization_from_energy_counter() {
    let registry = ChipSpecRegistry::new();
    let spec = registry.lookup("Apple M1 Max");
    assert_eq!(spec.max_ane_power_w, 8.0);

    let mut agg = aggregator(spec);
    agg.ingest(parsed(&SampleFixture::default()));
    let snap = agg.snapshot().unwrap();
    assert!((snap.metrics.power.ane_w - 0.8).abs() < 1e-9);
    assert!((snap.derived.ane_util_percent - 10.0).abs() < 1e-9);
}

#[test]
fn unknown_chip_yields_zero_percentages() {
    let spec = ChipSpecRegistry::new().lookup("FutureChip9000");
    assert!(!spec.known);
    assert_eq!(spec, ChipSpec::UNKNOWN);

    let mut agg = aggregator(spec);
    agg.ingest(parsed(&SampleFixture::default()));
    let derived = agg.snapshot().unwrap().derived;
    assert_eq!(derived.ane_util_percent, 0.0);
    assert_eq!(derived.cpu_power_percent, 0.0);
    assert_eq!(derived.gpu_power_percent, 0.0);
    assert_eq!(derived.bandwidth_percent, 0.0);
    assert!(derived.ane_util_percent.is_finite());
}

#[test]
fn stale_signal_on_threshold_tick_not_before() {
    let threshold = 4;
    let mut agg = MetricsAggregator::new(
        ChipSpec::UNKNOWN,
        None,
        AggregatorConfig {
            stale_after_ticks: threshold,
            ..Default::default()
        },
    );
    let metrics = parsed(&SampleFixture::default());
    assert_eq!(agg.ingest(metrics.clone()), IngestOutcome::Updated);
    for repeat in 1..threshold {
        assert_eq!(
            agg.ingest(metrics.clone()),
            IngestOutcome::Repeated { repeats: repeat }
        );
        assert!(!agg.snapshot().unwrap().stale);
    }
    assert_eq!(
        agg.ingest(metrics.clone()),
        IngestOutcome::BecameStale { repeats: threshold }
    );
    assert!(agg.snapshot().unwrap().stale);

    agg.ingest(parsed(&SampleFixture::at(1_700_000_001)));
    assert!(!agg.snapshot().unwrap().stale);
}

#[test]
fn throttle_follows_thermal_pressure() {
    let mut agg = aggregator(ChipSpecRegistry::new().lookup("Apple M2"));
    agg.ingest(parsed(&SampleFixture::default()));
    assert!(!agg.snapshot().unwrap().derived.thermal_throttle);

    agg.ingest(parsed(&SampleFixture {
        timestamp_secs: 1_700_000_001,
        thermal_pressure: "Heavy",
        ..Default::default()
    }));
    let snap = agg.snapshot().unwrap();
    assert!(snap.derived.thermal_throttle);
    assert_eq!(snap.metrics.thermal_pressure, ThermalPressure::Heavy);
}

#[test]
fn zero_gpu_rail_power_is_estimated_from_usage() {
    let spec = ChipSpecRegistry::new().lookup("Apple M1");
    let mut agg = aggregator(spec.clone());
    agg.ingest(parsed(&SampleFixture {
        gpu_energy: 0.0,
        gpu_idle_ratio: 0.5,
        ..Default::default()
    }));
    let derived = agg.snapshot().unwrap().derived;
    assert!(derived.gpu_power_estimated);
    assert!((derived.gpu_display_power_w - 0.5 * spec.max_gpu_power_w).abs() < 1e-9);
    assert!((derived.gpu_power_percent - 50.0).abs() < 1e-9);
}

#[test]
fn per_cluster_windows_for_asymmetric_layout() {
    let spec = ChipSpecRegistry::new().lookup("Apple M1 Ultra");
    let mut agg = aggregator(spec);
    let fixture = SampleFixture {
        clusters: vec![
            ("E0-Cluster", 600.0, 0.5, vec![0, 1]),
            ("E1-Cluster", 600.0, 0.9, vec![2, 3]),
            ("P0-Cluster", 3_000_000_000.0, 0.0, vec![4, 5, 6, 7]),
            ("P1-Cluster", 3_000_000_000.0, 0.5, vec![8, 9, 10, 11]),
            ("P2-Cluster", 3_000_000_000.0, 1.0, vec![12, 13, 14, 15]),
            ("P3-Cluster", 3_000_000_000.0, 1.0, vec![16, 17, 18, 19]),
        ],
        ..Default::default()
    };
    agg.ingest(parsed(&fixture));

    let snap = agg.snapshot().unwrap();
    let ids: Vec<String> = snap
        .cluster_averages
        .iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(ids, ["E0", "E1", "P0", "P1", "P2", "P3"]);
    let p0 = ClusterId::new(ClusterRole::Performance, 0);
    assert_eq!(agg.window(Metric::Cluster(p0)).unwrap().average(), 100.0);
    let p = snap.metrics.p_cluster.unwrap();
    assert_eq!(p.cluster_count, 4);
    assert_eq!(p.core_count, 16);
    assert!((p.active_percent - 37.5).abs() < 1e-9);
}

#[test]
fn averages_are_partial_until_window_fills() {
    let mut agg = MetricsAggregator::new(
        ChipSpec::UNKNOWN,
        None,
        AggregatorConfig {
            window_len: 4,
            ..Default::default()
        },
    );
    for i in 0..3 {
        agg.ingest(metrics_at(i * 1000, 10.0));
        assert!(agg.snapshot().unwrap().averages.partial);
    }
    agg.ingest(metrics_at(3000, 10.0));
    let snap = agg.snapshot().unwrap();
    assert_eq!(snap.state, AggregatorState::Steady);
    assert!(!snap.averages.partial);
    assert_eq!(snap.averages.package_w, 10.0);
}

#[test]
fn long_run_stays_bounded() {
    let mut agg = MetricsAggregator::new(
        ChipSpec::UNKNOWN,
        None,
        AggregatorConfig {
            window_len: 30,
            stale_after_ticks: 5,
            history_capacity: 200,
        },
    );
    for i in 0..10_000u64 {
        agg.ingest(metrics_at(i, (i % 7) as f64));
    }
    let snap = agg.snapshot().unwrap();
    assert_eq!(snap.history.len(), 200);
    assert_eq!(agg.window(Metric::PackagePower).unwrap().len(), 30);
    assert_eq!(snap.peaks.package_w, 6.0);
}

#[test]
fn snapshot_serializes_for_consumers() {
    let mut agg = aggregator(ChipSpecRegistry::new().lookup("Apple M3 Pro"));
    agg.ingest(parsed(&SampleFixture::default()));
    let json = serde_json::to_value(agg.snapshot().unwrap()).unwrap();
    assert_eq!(json["state"], "warming");
    assert_eq!(json["metrics"]["clusters"][0]["id"], "E0");
    assert!(json["derived"]["aneUtilPercent"].is_number());
    assert!(json["averages"]["partial"].as_bool().unwrap());
}
