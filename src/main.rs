//! etcd Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! registers CRD controllers, and runs the reconciliation loops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use etcd_operator::{
    controllers::{cluster_controller, dump_controller, restore_controller, Context},
    exec::KubectlCommands,
    metrics,
    scheduler::DumpScheduler,
    storage::ObjectStoreUploader,
};

/// Default metrics port
const METRICS_PORT: u16 = 8080;

/// Default directory dump archives are staged in before upload
const DEFAULT_STAGING_DIR: &str = "/var/lib/etcd-operator/staging";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting etcd operator");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let staging_dir = std::env::var("ETCD_OPERATOR_STAGING_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_DIR));

    let context = Arc::new(Context {
        client: client.clone(),
        scheduler: Arc::new(DumpScheduler::new()),
        exec: Arc::new(KubectlCommands::new(Duration::from_secs(120))),
        storage: Arc::new(ObjectStoreUploader::new()),
        staging_dir,
    });

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(METRICS_PORT));
    info!("Metrics server starting on port {}", METRICS_PORT);

    // Run all controllers concurrently
    let cluster = cluster_controller::run(client.clone(), context.clone());
    let dump = dump_controller::run(client.clone(), context.clone());
    let restore = restore_controller::run(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = cluster => {
            error!("Cluster controller exited unexpectedly");
        }
        _ = dump => {
            error!("Dump controller exited unexpectedly");
        }
        _ = restore => {
            error!("Restore controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("etcd operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
