//! EtcdCluster controller
//!
//! Watches EtcdCluster resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::EtcdCluster;
use crate::error::{is_not_found, Error, Result};
use crate::infra::{KubeClusterSink, KubeInfra};
use crate::metrics;
use crate::reconcilers::cluster as cluster_reconciler;

/// Run the EtcdCluster controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<EtcdCluster> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("EtcdCluster CRD not installed: {}", e);
        return;
    }

    info!("Starting EtcdCluster controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled EtcdCluster"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["EtcdCluster"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<EtcdCluster>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["EtcdCluster"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["EtcdCluster"])
        .inc();

    if let Err(e) = cluster_reconciler::validate(&obj) {
        warn!(error = %e, "Validation failed");
        return Err(e);
    }

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let infra = KubeInfra::new(ctx.client.clone());
    let sink = KubeClusterSink::new(ctx.client.clone(), &namespace, &obj.name_any());

    match cluster_reconciler::reconcile(&obj, &infra, &sink).await {
        Ok(()) => Ok(Action::await_change()),
        // the resource vanished mid-pass, nothing left to converge
        Err(e) if is_not_found(&e) => Ok(Action::await_change()),
        Err(e) => Err(e),
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<EtcdCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Validation(_) => Duration::from_secs(300),
        Error::Conflict { .. } => Duration::from_secs(10),
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}
