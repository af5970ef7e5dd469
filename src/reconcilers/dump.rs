//! EtcdDump reconciler and dump workflow
//!
//! A dump either runs once, synchronously within the reconcile pass, or is
//! registered with the scheduler to run on every cron firing. The workflow
//! itself snapshots the cluster's first member, stages the archive locally
//! and publishes it to the configured object store, recording one condition
//! per step.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use kube::ResourceExt;
use tracing::{error, info, warn};

use crate::change::{spec_changed, ApplyState};
use crate::crd::EtcdDump;
use crate::error::{Error, Result};
use crate::exec::{ClusterCommands, ExecTarget};
use crate::infra::DumpSink;
use crate::metrics;
use crate::scheduler::DumpScheduler;
use crate::status::{OperationCondition, OperationPhase, StatusTracker};
use crate::storage::StorageProvider;

pub fn validate(dump: &EtcdDump) -> Result<()> {
    if dump.spec.cluster_reference.is_empty() {
        return Err(Error::validation("spec.clusterReference must not be empty"));
    }
    let backends =
        usize::from(dump.spec.storage.s3.is_some()) + usize::from(dump.spec.storage.qiniu.is_some());
    if backends != 1 {
        return Err(Error::validation(
            "spec.storage must name exactly one backend",
        ));
    }
    if let Some(schedule) = dump.spec.schedule.as_deref() {
        if !schedule.is_empty() && Schedule::from_str(schedule).is_err() {
            return Err(Error::validation(format!(
                "spec.schedule is not a valid cron expression: {schedule}"
            )));
        }
    }
    Ok(())
}

/// Scheduler key for a dump resource
pub fn job_key(dump: &EtcdDump) -> String {
    format!(
        "{}/{}",
        dump.namespace().unwrap_or_default(),
        dump.name_any()
    )
}

pub async fn reconcile(
    dump: Arc<EtcdDump>,
    scheduler: &DumpScheduler,
    workflow: Arc<DumpWorkflow>,
    sink: Arc<dyn DumpSink>,
) -> Result<()> {
    let key = job_key(&dump);

    if dump.metadata.deletion_timestamp.is_some() {
        if scheduler.deregister(&key) {
            info!(dump = %key, "stopped recurring dump for deleted resource");
        }
        return Ok(());
    }

    let last = dump.status.as_ref().and_then(|s| s.last_applied.as_ref());
    if !spec_changed(&dump.spec, last) {
        return Ok(());
    }

    sink.record_applied(ApplyState::Recorded, &dump.spec).await?;

    match dump.spec.schedule.as_deref().filter(|s| !s.is_empty()) {
        Some(expression) => {
            let schedule = Schedule::from_str(expression).map_err(|e| {
                Error::validation(format!("spec.schedule is not a valid cron expression: {e}"))
            })?;
            let job_dump = dump.clone();
            let job_workflow = workflow.clone();
            let job_sink = sink.clone();
            scheduler.register(&key, expression, schedule, move || {
                let dump = job_dump.clone();
                let workflow = job_workflow.clone();
                let sink = job_sink.clone();
                async move {
                    if let Err(e) = workflow.run(&dump, sink.as_ref()).await {
                        error!(dump = %job_key(&dump), error = %e, "scheduled dump failed");
                    }
                }
            });
        }
        None => {
            workflow.run(&dump, sink.as_ref()).await?;
        }
    }

    if let Err(e) = sink.record_applied(ApplyState::Applied, &dump.spec).await {
        warn!(dump = %key, error = %e, "failed to mark spec applied, next pass will redo the work");
    }
    Ok(())
}

/// Snapshot, stage and publish one dump of the referenced cluster
pub struct DumpWorkflow {
    exec: Arc<dyn ClusterCommands>,
    storage: Arc<dyn StorageProvider>,
    staging_dir: PathBuf,
}

impl DumpWorkflow {
    pub fn new(
        exec: Arc<dyn ClusterCommands>,
        storage: Arc<dyn StorageProvider>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            exec,
            storage,
            staging_dir,
        }
    }

    /// Run one dump attempt, returning the published object location.
    ///
    /// Each step appends exactly one condition through the sink, which
    /// extends the persisted history in place; a run resumed from a stale
    /// resource snapshot therefore never erases what earlier runs recorded.
    /// Persistence is best-effort, the step outcome itself is authoritative.
    pub async fn run(&self, dump: &EtcdDump, sink: &dyn DumpSink) -> Result<String> {
        let namespace = dump
            .namespace()
            .ok_or_else(|| Error::validation("dump resource without a namespace"))?;
        let cluster = &dump.spec.cluster_reference;
        let name = dump.name_any();
        let key = job_key(dump);

        let mut tracker = StatusTracker::resume(None);

        let persist = |phase: OperationPhase, condition: OperationCondition| {
            let key = key.clone();
            async move {
                if let Err(e) = sink.persist_transition(phase, &condition).await {
                    warn!(dump = %key, error = %e, "failed to persist dump status");
                }
            }
        };
        let count = |outcome: &str| {
            metrics::DUMPS_TOTAL
                .with_label_values(&[outcome, &namespace, &name])
                .inc();
        };

        let condition = OperationCondition::pending("begin dump");
        tracker.transition(OperationPhase::Running, condition.clone())?;
        persist(OperationPhase::Running, condition).await;

        // unique per attempt so concurrent manual and scheduled runs never
        // collide on the staging file
        let archive = format!(
            "{}_{}_{}.db",
            namespace,
            cluster,
            Utc::now().format("%Y%m%d%H%M%S")
        );
        let remote_path = format!("/tmp/{archive}");
        let target = ExecTarget::first_member(&namespace, cluster);

        if let Err(e) = self.exec.snapshot(&target, &remote_path).await {
            let condition = OperationCondition::failed("dump cmd exec failed", e.to_string());
            tracker.transition(OperationPhase::Running, condition.clone())?;
            persist(OperationPhase::Running, condition).await;
            count("failure");
            return Err(e);
        }
        let condition = OperationCondition::ok("dump cmd exec success");
        tracker.transition(OperationPhase::Running, condition.clone())?;
        persist(OperationPhase::Running, condition).await;

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let local_path = self.staging_dir.join(&archive);
        if let Err(e) = self.exec.fetch(&target, &remote_path, &local_path).await {
            let condition = OperationCondition::failed("cp cmd exec failed", e.to_string());
            tracker.transition(OperationPhase::Running, condition.clone())?;
            persist(OperationPhase::Running, condition).await;
            count("failure");
            return Err(e);
        }
        let condition = OperationCondition::ok("cp cmd exec success");
        tracker.transition(OperationPhase::Running, condition.clone())?;
        persist(OperationPhase::Running, condition).await;

        // the snapshot is staged, remote cleanup is advisory
        if let Err(e) = self.exec.remove(&target, &remote_path).await {
            error!(dump = %key, error = %e, "failed to remove staged snapshot from member pod");
        }

        match self.storage.store(&dump.spec.storage, &local_path).await {
            Ok(location) => {
                let condition = OperationCondition::ok("upload success").with_location(&location);
                tracker.transition(OperationPhase::Completed, condition.clone())?;
                persist(OperationPhase::Completed, condition).await;
                count("success");
                if let Err(e) = tokio::fs::remove_file(&local_path).await {
                    warn!(dump = %key, error = %e, "failed to remove staged archive");
                }
                info!(dump = %key, location = %location, "dump published");
                Ok(location)
            }
            Err(e) => {
                let condition = OperationCondition::failed("upload failed", e.to_string());
                tracker.transition(OperationPhase::Failed, condition.clone())?;
                persist(OperationPhase::Failed, condition).await;
                count("failure");
                Err(e)
            }
        }
    }
}
