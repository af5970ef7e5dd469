//! EtcdRestore reconciler
//!
//! Rebuilds the referenced cluster's data from a published snapshot URL by
//! deleting each member's data claims and injecting an init container that
//! re-seeds the volume before etcd starts. The workflow aborts on the first
//! failed step and marks the restore Failed.

use kube::ResourceExt;
use tracing::{info, warn};

use crate::change::{spec_changed, ApplyState};
use crate::crd::EtcdRestore;
use crate::error::{Error, Result};
use crate::infra::{ClusterInfra, RestoreSink};
use crate::metrics;
use crate::resources::statefulset;
use crate::resources::SELECTOR_LABEL;
use crate::status::{OperationCondition, OperationPhase, StatusTracker};

pub fn validate(restore: &EtcdRestore) -> Result<()> {
    if restore.spec.cluster_reference.is_empty() {
        return Err(Error::validation("spec.clusterReference must not be empty"));
    }
    if restore.spec.data_url.is_empty() {
        return Err(Error::validation("spec.dataURL must not be empty"));
    }
    if !restore.spec.data_url.starts_with("http://") && !restore.spec.data_url.starts_with("https://")
    {
        return Err(Error::validation(
            "spec.dataURL must be an http(s) URL reachable from the cluster",
        ));
    }
    Ok(())
}

pub async fn reconcile(
    restore: &EtcdRestore,
    infra: &dyn ClusterInfra,
    sink: &dyn RestoreSink,
) -> Result<()> {
    if restore.metadata.deletion_timestamp.is_some() {
        return Ok(());
    }

    let name = restore.name_any();
    let namespace = restore
        .namespace()
        .ok_or_else(|| Error::validation("restore resource without a namespace"))?;
    let cluster = restore.spec.cluster_reference.clone();

    let last = restore.status.as_ref().and_then(|s| s.last_applied.as_ref());
    if !spec_changed(&restore.spec, last) {
        return Ok(());
    }

    sink.record_applied(ApplyState::Recorded, &restore.spec)
        .await?;

    let mut tracker = StatusTracker::resume(None);

    let persist = |phase: OperationPhase, condition: OperationCondition| {
        let name = name.clone();
        async move {
            if let Err(e) = sink.persist_transition(phase, &condition).await {
                warn!(restore = %name, error = %e, "failed to persist restore status");
            }
        }
    };

    let condition = OperationCondition::pending("begin etcd cluster restore");
    tracker.transition(OperationPhase::Running, condition.clone())?;
    persist(OperationPhase::Running, condition).await;

    let fail = |tracker: &mut StatusTracker, reason: &str, err: &Error| {
        metrics::RESTORES_TOTAL
            .with_label_values(&["failure", &namespace, &name])
            .inc();
        let condition = OperationCondition::failed(reason, err.to_string());
        tracker
            .transition(OperationPhase::Failed, condition.clone())
            .map(|_| condition)
    };

    let mut sts = match infra.get_stateful_set(&namespace, &cluster).await {
        Ok(Some(sts)) => sts,
        Ok(None) => {
            let err = Error::validation(format!(
                "referenced cluster {namespace}/{cluster} has no workload"
            ));
            let condition = fail(&mut tracker, "get reference statefulset failed", &err)?;
            persist(OperationPhase::Failed, condition).await;
            return Err(err);
        }
        Err(e) => {
            let condition = fail(&mut tracker, "get reference statefulset failed", &e)?;
            persist(OperationPhase::Failed, condition).await;
            return Err(e);
        }
    };

    // discover members through the workload's own selector
    let selector = sts
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_else(|| {
            std::collections::BTreeMap::from([(SELECTOR_LABEL.to_string(), cluster.clone())])
        });
    let pods = match infra.list_pods(&namespace, &selector).await {
        Ok(pods) => pods,
        Err(e) => {
            let condition = fail(&mut tracker, "get reference pod failed", &e)?;
            persist(OperationPhase::Failed, condition).await;
            return Err(e);
        }
    };

    // drop the claim behind every claim-backed volume the pods mount
    for pod in &pods {
        let volumes = pod
            .spec
            .as_ref()
            .and_then(|s| s.volumes.as_deref())
            .unwrap_or_default();
        for volume in volumes {
            let Some(claim) = volume.persistent_volume_claim.as_ref() else {
                continue;
            };
            if let Err(e) = infra.delete_pvc(&namespace, &claim.claim_name).await {
                let condition = fail(&mut tracker, "delete reference pvc failed", &e)?;
                persist(OperationPhase::Failed, condition).await;
                return Err(e);
            }
        }
    }

    let init = statefulset::restore_init_containers(&sts, restore);
    if let Some(spec) = sts.spec.as_mut() {
        if let Some(pod_spec) = spec.template.spec.as_mut() {
            pod_spec.init_containers = Some(init);
        }
    }
    if let Err(e) = infra.update_stateful_set(&namespace, &sts).await {
        let condition = fail(&mut tracker, "update reference statefulset failed", &e)?;
        persist(OperationPhase::Failed, condition).await;
        return Err(e);
    }

    let condition = OperationCondition::ok("restore success");
    tracker.transition(OperationPhase::Completed, condition.clone())?;
    persist(OperationPhase::Completed, condition).await;
    metrics::RESTORES_TOTAL
        .with_label_values(&["success", &namespace, &name])
        .inc();
    info!(restore = %name, cluster = %cluster, "restore applied to cluster workload");

    if let Err(e) = sink.record_applied(ApplyState::Applied, &restore.spec).await {
        warn!(restore = %name, error = %e, "failed to mark spec applied, next pass will redo the work");
    }
    Ok(())
}
