//! EtcdRestore controller
//!
//! Watches EtcdRestore resources and triggers reconciliation.

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
use crate::crd::EtcdRestore;
use crate::error::{is_not_found, Error, Result};
use crate::infra::{KubeInfra, KubeRestoreSink};
use crate::metrics;
use crate::reconcilers::restore as restore_reconciler;

/// Run the EtcdRestore controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<EtcdRestore> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("EtcdRestore CRD not installed: {}", e);
        return;
    }

    info!("Starting EtcdRestore controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled EtcdRestore"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["EtcdRestore"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<EtcdRestore>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["EtcdRestore"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["EtcdRestore"])
        .inc();

    if let Err(e) = restore_reconciler::validate(&obj) {
        warn!(error = %e, "Validation failed");
        return Err(e);
    }

    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let infra = KubeInfra::new(ctx.client.clone());
    let sink = KubeRestoreSink::new(ctx.client.clone(), &namespace, &name);

    match restore_reconciler::reconcile(&obj, &infra, &sink).await {
        Ok(()) => Ok(Action::await_change()),
        Err(e) if is_not_found(&e) => Ok(Action::await_change()),
        Err(e) => Err(e),
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<EtcdRestore>, error: &Error, _ctx: Arc<Context>) -> Action {
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
