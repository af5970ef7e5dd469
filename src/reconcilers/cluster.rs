//! EtcdCluster reconciler
//!
//! Creates the headless service and StatefulSet for a new cluster, or
//! overwrites the StatefulSet spec when the cluster spec changed since the
//! last applied one. Scaling and rolling member restarts are delegated to
//! the StatefulSet controller.

use kube::ResourceExt;
use tracing::{info, warn};

use crate::change::{spec_changed, ApplyState};
use crate::crd::EtcdCluster;
use crate::error::{Error, Result};
use crate::infra::{ClusterInfra, ClusterSink};
use crate::resources::{service, statefulset};

pub fn validate(cluster: &EtcdCluster) -> Result<()> {
    if cluster.spec.replicas < 1 {
        return Err(Error::validation("spec.replicas must be at least 1"));
    }
    if cluster.spec.image.is_empty() {
        return Err(Error::validation("spec.image must not be empty"));
    }
    if cluster.spec.storage < 1 {
        return Err(Error::validation("spec.storage must be at least 1Gi"));
    }
    Ok(())
}

pub async fn reconcile(
    cluster: &EtcdCluster,
    infra: &dyn ClusterInfra,
    sink: &dyn ClusterSink,
) -> Result<()> {
    if cluster.metadata.deletion_timestamp.is_some() {
        // owner references cascade the generated objects
        return Ok(());
    }

    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::validation("cluster resource without a namespace"))?;

    let existing = infra.get_stateful_set(&namespace, &name).await?;

    match existing {
        None => {
            // record intent before touching the namespace so a crash between
            // the writes re-runs this branch instead of skipping it
            sink.record_applied(ApplyState::Recorded, &cluster.spec)
                .await?;

            infra
                .create_service(&namespace, &service::build(cluster))
                .await?;
            if let Err(e) = infra
                .create_stateful_set(&namespace, &statefulset::build(cluster))
                .await
            {
                if let Err(cleanup) = infra.delete_service(&namespace, &name).await {
                    warn!(cluster = %name, error = %cleanup, "failed to clean up service after workload create failure");
                }
                return Err(e);
            }
            info!(cluster = %name, namespace = %namespace, "created cluster service and workload");
        }
        Some(_) => {
            let last = cluster.status.as_ref().and_then(|s| s.last_applied.as_ref());
            if !spec_changed(&cluster.spec, last) {
                return Ok(());
            }

            sink.record_applied(ApplyState::Recorded, &cluster.spec)
                .await?;
            infra
                .update_stateful_set(&namespace, &statefulset::build(cluster))
                .await?;
            info!(cluster = %name, namespace = %namespace, replicas = cluster.spec.replicas, "updated cluster workload");
        }
    }

    if let Err(e) = sink.record_applied(ApplyState::Applied, &cluster.spec).await {
        warn!(cluster = %name, error = %e, "failed to mark spec applied, next pass will redo the work");
    }
    Ok(())
}
