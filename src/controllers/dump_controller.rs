//! EtcdDump controller
//!
//! Watches EtcdDump resources and triggers reconciliation. A finalizer keeps
//! deleted resources visible long enough to deregister their recurring job.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::EtcdDump;
use crate::error::{is_not_found, Error, Result};
use crate::infra::KubeDumpSink;
use crate::metrics;
use crate::reconcilers::dump::{self as dump_reconciler, DumpWorkflow};

/// Finalizer name for EtcdDump resources
const FINALIZER_NAME: &str = "app.example.com/dump-finalizer";

/// Run the EtcdDump controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<EtcdDump> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("EtcdDump CRD not installed: {}", e);
        return;
    }

    info!("Starting EtcdDump controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled EtcdDump"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["EtcdDump"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<EtcdDump>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["EtcdDump"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["EtcdDump"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<EtcdDump> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(dump) => apply(dump, ctx.clone()).await,
            FinalizerEvent::Cleanup(dump) => cleanup(dump, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Apply reconciliation (create/update)
async fn apply(dump: Arc<EtcdDump>, ctx: Arc<Context>) -> Result<Action> {
    if let Err(e) = dump_reconciler::validate(&dump) {
        warn!(error = %e, "Validation failed");
        return Err(e);
    }

    let namespace = dump.namespace().unwrap_or_else(|| "default".to_string());
    let sink = Arc::new(KubeDumpSink::new(
        ctx.client.clone(),
        &namespace,
        &dump.name_any(),
    ));
    let workflow = Arc::new(DumpWorkflow::new(
        ctx.exec.clone(),
        ctx.storage.clone(),
        ctx.staging_dir.clone(),
    ));

    let result = dump_reconciler::reconcile(dump, ctx.scheduler.as_ref(), workflow, sink).await;
    metrics::SCHEDULED_JOBS.set(ctx.scheduler.len() as f64);

    match result {
        Ok(()) => Ok(Action::await_change()),
        Err(e) if is_not_found(&e) => Ok(Action::await_change()),
        Err(e) => Err(e),
    }
}

/// Cleanup when resource is being deleted
async fn cleanup(dump: Arc<EtcdDump>, ctx: Arc<Context>) -> Result<Action> {
    let key = dump_reconciler::job_key(&dump);
    if ctx.scheduler.deregister(&key) {
        info!(dump = %key, "stopped recurring dump for deleted resource");
    }
    metrics::SCHEDULED_JOBS.set(ctx.scheduler.len() as f64);
    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<EtcdDump>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    let requeue_duration = match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Validation(_) => Duration::from_secs(300),
        Error::CommandFailed { .. } | Error::Storage(_) => Duration::from_secs(60),
        Error::Conflict { .. } => Duration::from_secs(10),
        _ => Duration::from_secs(30),
    };

    Action::requeue(requeue_duration)
}
