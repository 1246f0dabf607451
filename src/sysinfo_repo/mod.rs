// SoC identity and memory stats via sysinfo (plus sysctl on macOS)

mod macos;

use crate::models::{RamStats, SocInfo};
use std::sync::Arc;
use sysinfo::System;
use tracing::instrument;

pub struct SysinfoRepo {
    sys: Arc<std::sync::Mutex<System>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self {
            sys: Arc::new(std::sync::Mutex::new(sys)),
        }
    }

    /// Brand string and core layout. Fields that cannot be read are left empty rather
    /// than failing; an unreadable brand string maps to the fallback chip spec.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_soc_info"))]
    pub async fn get_soc_info(&self) -> anyhow::Result<SocInfo> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;

            let name = macos::read_brand_string()
                .or_else(|| {
                    sys.cpus()
                        .first()
                        .map(|c| c.brand().trim().to_string())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_else(|| "Unknown".into());
            let logical = sys.cpus().len() as u32;
            let core_count = System::physical_core_count()
                .map(|n| n as u32)
                .unwrap_or(logical);
            let (e_core_count, p_core_count) = macos::read_core_split();

            Ok(SocInfo {
                name,
                core_count,
                e_core_count,
                p_core_count,
                gpu_core_count: macos::read_gpu_core_count(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_ram_stats"))]
    pub async fn get_ram_stats(&self) -> anyhow::Result<RamStats> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();
            Ok(ram_stats(
                sys.total_memory(),
                sys.available_memory(),
                sys.total_swap(),
                sys.used_swap(),
            ))
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

fn ram_stats(total: u64, available: u64, swap_total: u64, swap_used: u64) -> RamStats {
    let used = total.saturating_sub(available);
    let usage_percent = if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    let swap_usage_percent =
        (swap_total > 0).then(|| (swap_used as f64 / swap_total as f64) * 100.0);
    RamStats {
        total,
        used,
        available,
        usage_percent,
        swap_total,
        swap_used,
        swap_usage_percent,
    }
}
