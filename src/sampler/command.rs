// Sampler command line and output file naming.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::SamplerConfig;

/// Full argv for one sampler run writing to `output`:
/// `[sudo -n] [nice -n N] <program> <args with placeholders substituted>`.
pub fn build_argv(config: &SamplerConfig, output: &Path) -> Vec<String> {
    let mut argv: Vec<String> = Vec::new();
    if config.elevate {
        argv.extend(["sudo".into(), "-n".into()]);
    }
    if config.nice != 0 {
        argv.extend(["nice".into(), "-n".into(), config.nice.to_string()]);
    }
    argv.push(config.program.clone());
    let output = output.to_string_lossy();
    let interval = config.interval_ms.to_string();
    argv.extend(config.args.iter().map(|a| {
        a.replace("{samplers}", &config.samplers)
            .replace("{interval}", &interval)
            .replace("{output}", &output)
    }));
    argv
}

/// Fresh output path for restart cycle `generation`: `<dir>/<prefix><unix_secs>_<generation>`.
pub fn output_path(dir: &Path, prefix: &str, generation: u64) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{prefix}{secs}_{generation}"))
}

/// Removes leftover output files from earlier runs. Returns how many were removed.
pub fn remove_stale_outputs(dir: &Path, prefix: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                error = %e,
                path = %entry.path().display(),
                operation = "remove_stale_output",
                "could not remove stale sampler output"
            ),
        }
    }
    removed
}
