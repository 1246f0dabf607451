// Config loading and validation tests

use socmon::aggregator::AggregatorConfig;
use socmon::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 8087
host = "0.0.0.0"

[sampler]
program = "powermetrics"
samplers = "cpu_power,gpu_power,thermal,bandwidth"
elevate = true
nice = 10
interval_ms = 500
restart_after_ticks = 600
output_dir = "/var/tmp"
file_prefix = "socmon_pm"
read_attempts = 3
max_consecutive_failures = 3

[metrics]
average_window_secs = 30
stale_after_ticks = 5
history_capacity = 200

[publishing]
broadcast_capacity = 60
stats_log_interval_secs = 60
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8087);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.server.enabled);
    assert_eq!(config.sampler.samplers, "cpu_power,gpu_power,thermal,bandwidth");
    assert_eq!(config.sampler.interval_ms, 500);
    assert_eq!(config.sampler.restart_after_ticks, 600);
    assert_eq!(
        config.sampler.output_dir(),
        std::path::PathBuf::from("/var/tmp")
    );
    assert_eq!(config.publishing.broadcast_capacity, 60);
}

#[test]
fn test_config_defaults_when_sections_omitted() {
    let config = AppConfig::load_from_str("").expect("empty config is valid");
    assert_eq!(config.server.port, 8086);
    assert_eq!(config.sampler.program, "powermetrics");
    assert_eq!(config.sampler.interval_ms, 1000);
    assert_eq!(config.sampler.restart_after_ticks, 300);
    assert_eq!(config.sampler.nice, 10);
    assert!(config.sampler.elevate);
    assert_eq!(config.sampler.read_attempts, 3);
    assert_eq!(config.metrics.history_capacity, 200);
    assert!(config.metrics.collect_ram);
    assert_eq!(config.sampler.output_dir(), std::env::temp_dir());
}

#[test]
fn test_window_ticks_follow_interval() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert_eq!(config.window_ticks(), 60);
    let agg = AggregatorConfig::from(&config);
    assert_eq!(agg.window_len, 60);
    assert_eq!(agg.stale_after_ticks, 5);
    assert_eq!(agg.history_capacity, 200);

    let slow = AppConfig::load_from_str("[sampler]\ninterval_ms = 60000\n").unwrap();
    assert_eq!(slow.window_ticks(), 1);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8087", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_program() {
    let bad = VALID_CONFIG.replace("program = \"powermetrics\"", "program = \" \"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampler.program"));
}

#[test]
fn test_config_validation_rejects_args_without_output() {
    let bad = VALID_CONFIG.replace(
        "[metrics]",
        "args = [\"--samplers\", \"{samplers}\"]\n\n[metrics]",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("{output}"));
}

#[test]
fn test_config_validation_rejects_interval_below_minimum() {
    let bad = VALID_CONFIG.replace("interval_ms = 500", "interval_ms = 50");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampler.interval_ms"));
}

#[test]
fn test_config_validation_rejects_nice_out_of_range() {
    let bad = VALID_CONFIG.replace("nice = 10", "nice = 40");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("sampler.nice"));
}

#[test]
fn test_config_validation_rejects_restart_after_ticks_zero() {
    let bad = VALID_CONFIG.replace("restart_after_ticks = 600", "restart_after_ticks = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("restart_after_ticks"));
}

#[test]
fn test_config_validation_rejects_file_prefix_with_separator() {
    let bad = VALID_CONFIG.replace("file_prefix = \"socmon_pm\"", "file_prefix = \"a/b\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("file_prefix"));
}

#[test]
fn test_config_validation_rejects_read_attempts_zero() {
    let bad = VALID_CONFIG.replace("read_attempts = 3", "read_attempts = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("read_attempts"));
}

#[test]
fn test_config_validation_rejects_max_consecutive_failures_zero() {
    let bad = VALID_CONFIG.replace(
        "max_consecutive_failures = 3",
        "max_consecutive_failures = 0",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_consecutive_failures"));
}

#[test]
fn test_config_validation_rejects_stale_after_ticks_zero() {
    let bad = VALID_CONFIG.replace("stale_after_ticks = 5", "stale_after_ticks = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("metrics.stale_after_ticks"));
}

#[test]
fn test_config_validation_rejects_history_capacity_zero() {
    let bad = VALID_CONFIG.replace("history_capacity = 200", "history_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("history_capacity"));
}

#[test]
fn test_config_validation_rejects_broadcast_capacity_zero() {
    let bad = VALID_CONFIG.replace("broadcast_capacity = 60", "broadcast_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("broadcast_capacity"));
}

#[test]
fn test_config_validation_rejects_stats_log_interval_zero() {
    let bad = VALID_CONFIG.replace(
        "stats_log_interval_secs = 60",
        "stats_log_interval_secs = 0",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("stats_log_interval_secs"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_file_via_env() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.server.port, 8087);
    assert_eq!(config.sampler.file_prefix, "socmon_pm");
}
