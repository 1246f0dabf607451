use anyhow::Result;
use socmon::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Exit codes for fatal sampler errors, one per subsystem.
fn exit_code(e: &error::SamplerError) -> i32 {
    match e.kind() {
        "privilege" => 77,
        "restart-storm" => 75,
        _ => 1,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let soc = sysinfo_repo
        .get_soc_info()
        .await
        .map_err(|e| anyhow::anyhow!("soc info: {}", e))?;
    let spec = chip_spec::ChipSpecRegistry::new().lookup(&soc.name);
    if spec.known {
        tracing::info!(soc = %soc.name, chip = spec.name, "chip identified");
    } else {
        tracing::warn!(
            soc = %soc.name,
            "unrecognised chip; utilization percentages against chip limits will read 0"
        );
    }

    let aggregator = aggregator::MetricsAggregator::new(
        spec.clone(),
        Some(&soc),
        aggregator::AggregatorConfig::from(&app_config),
    );
    let sampler = match sampler::SamplerProcess::start(app_config.sampler.clone()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "sampler could not be started");
            eprintln!("{}: {} error: {}", version::NAME, e.kind(), e);
            std::process::exit(exit_code(&e));
        }
    };

    let (tx, _) = broadcast::channel(app_config.publishing.broadcast_capacity);
    let (latest_tx, latest_rx) = watch::channel(None);
    let ws_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let mut worker_handle = worker::spawn(
        worker::WorkerDeps {
            sampler,
            aggregator,
            sysinfo_repo: sysinfo_repo.clone(),
            tx: tx.clone(),
            latest_tx,
            ws_connections: ws_connections.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig {
            sample_interval: app_config.sampler.interval(),
            stats_log_interval_secs: app_config.publishing.stats_log_interval_secs,
            collect_ram: app_config.metrics.collect_ram,
        },
    );

    let server = async {
        if !app_config.server.enabled {
            return std::future::pending::<Result<()>>().await;
        }
        let app = routes::app(
            tx,
            latest_rx,
            Arc::new(models::ChipInfo { soc, spec }),
            ws_connections,
        );
        let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    };

    let finished = tokio::select! {
        result = &mut worker_handle => Some(result),
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, operation = "serve", "server failed");
            }
            None
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            None
        }
    };

    let result = match finished {
        Some(result) => result,
        None => {
            let _ = shutdown_tx.send(());
            worker_handle.await
        }
    };

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            eprintln!("{}: {} error: {}", version::NAME, e.kind(), e);
            std::process::exit(exit_code(&e));
        }
        Err(e) => Err(anyhow::anyhow!("worker task: {}", e)),
    }
}
