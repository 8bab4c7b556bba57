//! Spark scheduler extender
//!
//! Runs next to kube-scheduler and answers its filter calls for Spark
//! pods: drivers are admitted together with their minimum executor count,
//! executors land on the slots reserved for them.

use anyhow::Result;
use clap::Parser;
use extender_lib::{
    api::{self, AppState},
    binpack::binpacker_by_name,
    cluster::KubeClusterCache,
    health::{components, HealthRegistry},
    migration::ReservationMigrator,
    observability::{EventLogger, ExtenderMetrics},
    retry::RetryPolicy,
    store::InMemoryStore,
    SchedulerExtender,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const EXTENDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Interval between checks of the initial cluster cache sync
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "spark-scheduler-extender")]
#[command(version, about = "Kubernetes scheduler extender for Spark applications", long_about = None)]
struct Cli {
    /// Configuration file; `EXTENDER_*` environment variables override it
    #[arg(long, env = "EXTENDER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = config::ExtenderConfig::load(cli.config.as_deref())?;
    let binpacker = binpacker_by_name(&config.binpack_algo)?;
    info!(
        port = config.port,
        binpack_algo = %config.binpack_algo,
        fifo = config.fifo,
        instance_group_label = %config.instance_group_label,
        "Extender configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RESERVATION_STORE).await;
    health_registry.register(components::DEMAND_STORE).await;
    health_registry
        .set_degraded(components::CLUSTER_CACHE, "Waiting for initial sync")
        .await;

    let metrics = ExtenderMetrics::new();
    let events = EventLogger::new(&config.instance_name);
    events.log_startup(EXTENDER_VERSION, &config.binpack_algo, config.fifo);

    let client = kube::Client::try_default().await?;
    let (cluster, watchers) = KubeClusterCache::start(client);
    let cluster = Arc::new(cluster);
    // Reservations and demands live only in this process, so the store
    // starts empty and the migration has nothing to rewrite until a
    // persistent store is wired in here.
    let store = Arc::new(InMemoryStore::new());

    if config.run_migration {
        Arc::new(ReservationMigrator::new(
            store.clone(),
            RetryPolicy::default(),
            events.clone(),
        ))
        .run_migration();
    }

    let extender = SchedulerExtender::builder(
        cluster.clone(),
        cluster.clone(),
        store.clone(),
        store,
    )
    .binpacker(binpacker)
    .fifo(config.fifo)
    .node_priority(config.node_priority())
    .instance_group_label(config.instance_group_label.clone())
    .resync_interval(config.resync_interval())
    .health(health_registry.clone())
    .metrics(metrics)
    .events(events.clone())
    .build();

    // Ready only once decisions see the whole cluster
    {
        let cluster = cluster.clone();
        let health_registry = health_registry.clone();
        tokio::spawn(async move {
            cluster.wait_for_sync(SYNC_POLL_INTERVAL).await;
            health_registry.set_healthy(components::CLUSTER_CACHE).await;
            health_registry.set_ready(true).await;
        });
    }

    let app_state = Arc::new(AppState::new(Arc::new(extender), health_registry.clone()));
    let mut server = tokio::spawn(api::serve(config.port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            events.log_shutdown("SIGINT received");
        }
        served = &mut server => {
            let reason = match served {
                Ok(Ok(())) => "server stopped".to_string(),
                Ok(Err(e)) => format!("server failed: {e}"),
                Err(e) => format!("server task failed: {e}"),
            };
            error!(reason = %reason, "Extender server exited");
            events.log_shutdown(&reason);
        }
    }

    health_registry.set_ready(false).await;
    for watcher in watchers {
        watcher.abort();
    }
    server.abort();
    info!("Shutting down");

    Ok(())
}
