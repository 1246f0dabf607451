// macOS-specific helpers: sysctl keys and system_profiler output.

use std::process::Command;

/// `sysctl -n <key>`, trimmed; None when the key is missing or sysctl is unavailable.
pub(super) fn sysctl(key: &str) -> Option<String> {
    let output = Command::new("sysctl").args(["-n", key]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}

pub(super) fn sysctl_u32(key: &str) -> Option<u32> {
    sysctl(key)?.parse().ok()
}

/// CPU brand string, e.g. "Apple M1 Max".
pub(super) fn read_brand_string() -> Option<String> {
    sysctl("machdep.cpu.brand_string")
}

/// E-core and P-core counts. perflevel0 is the performance level on Apple Silicon.
pub(super) fn read_core_split() -> (Option<u32>, Option<u32>) {
    (
        sysctl_u32("hw.perflevel1.logicalcpu"),
        sysctl_u32("hw.perflevel0.logicalcpu"),
    )
}

pub(super) fn read_gpu_core_count() -> Option<u32> {
    let output = Command::new("system_profiler")
        .args(["-detailLevel", "basic", "SPDisplaysDataType"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_gpu_core_count(&String::from_utf8_lossy(&output.stdout))
}

/// First "Total Number of Cores: N" line of `system_profiler SPDisplaysDataType`.
pub(super) fn parse_gpu_core_count(text: &str) -> Option<u32> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Total Number of Cores:")
            .and_then(|v| v.trim().parse().ok())
    })
}
