//! End-to-end reconcile scenarios against in-memory collaborators
//!
//! Each test drives a reconciler with fake infrastructure and asserts on the
//! exact calls made and statuses written, covering cluster create/scale,
//! one-shot and scheduled dumps, failure handling and restore.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, Service, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use etcd_operator::change::{AppliedSpec, ApplyState};
use etcd_operator::crd::{
    EtcdCluster, EtcdClusterSpec, EtcdClusterStatus, EtcdDump, EtcdDumpSpec, EtcdDumpStatus,
    EtcdRestore, EtcdRestoreSpec, EtcdRestoreStatus, InitClusterType, S3StorageSpec, StorageSpec,
};
use etcd_operator::error::{Error, Result};
use etcd_operator::exec::{ClusterCommands, ExecTarget};
use etcd_operator::infra::{ClusterInfra, ClusterSink, DumpSink, RestoreSink};
use etcd_operator::reconcilers::dump::DumpWorkflow;
use etcd_operator::reconcilers::{cluster, dump, restore};
use etcd_operator::resources::statefulset;
use etcd_operator::scheduler::DumpScheduler;
use etcd_operator::status::{OperationCondition, OperationPhase, OperationStatus};
use etcd_operator::storage::StorageProvider;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeInfra {
    calls: Mutex<Vec<String>>,
    sts: Mutex<Option<StatefulSet>>,
    pods: Vec<Pod>,
}

impl FakeInfra {
    fn with_stateful_set(sts: StatefulSet) -> Self {
        Self {
            sts: Mutex::new(Some(sts)),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl ClusterInfra for FakeInfra {
    async fn get_stateful_set(&self, _ns: &str, _name: &str) -> Result<Option<StatefulSet>> {
        Ok(self.sts.lock().unwrap().clone())
    }

    async fn create_stateful_set(&self, _ns: &str, sts: &StatefulSet) -> Result<()> {
        let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        self.record(format!("create_stateful_set replicas={replicas}"));
        *self.sts.lock().unwrap() = Some(sts.clone());
        Ok(())
    }

    async fn update_stateful_set(&self, _ns: &str, sts: &StatefulSet) -> Result<()> {
        let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        self.record(format!("update_stateful_set replicas={replicas}"));
        *self.sts.lock().unwrap() = Some(sts.clone());
        Ok(())
    }

    async fn create_service(&self, _ns: &str, service: &Service) -> Result<()> {
        self.record(format!(
            "create_service {}",
            service.metadata.name.clone().unwrap_or_default()
        ));
        Ok(())
    }

    async fn delete_service(&self, _ns: &str, name: &str) -> Result<()> {
        self.record(format!("delete_service {name}"));
        Ok(())
    }

    async fn list_pods(
        &self,
        _ns: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let labels = selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        self.record(format!("list_pods {labels}"));
        Ok(self.pods.clone())
    }

    async fn delete_pvc(&self, _ns: &str, name: &str) -> Result<()> {
        self.record(format!("delete_pvc {name}"));
        Ok(())
    }
}

#[derive(Default)]
struct FakeClusterSink {
    markers: Mutex<Vec<ApplyState>>,
}

#[async_trait]
impl ClusterSink for FakeClusterSink {
    async fn record_applied(&self, state: ApplyState, _spec: &EtcdClusterSpec) -> Result<()> {
        self.markers.lock().unwrap().push(state);
        Ok(())
    }
}

// The fake sinks mirror the append-only contract of the real status writes:
// each transition extends one accumulated status, and every snapshot of it is
// kept so tests can assert on the full write sequence.
#[derive(Default)]
struct FakeDumpSink {
    persisted: Mutex<OperationStatus>,
    statuses: Mutex<Vec<OperationStatus>>,
    markers: Mutex<Vec<ApplyState>>,
}

#[async_trait]
impl DumpSink for FakeDumpSink {
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()> {
        let snapshot = {
            let mut persisted = self.persisted.lock().unwrap();
            persisted.phase = Some(phase);
            persisted.conditions.push(condition.clone());
            persisted.clone()
        };
        self.statuses.lock().unwrap().push(snapshot);
        Ok(())
    }

    async fn record_applied(&self, state: ApplyState, _spec: &EtcdDumpSpec) -> Result<()> {
        self.markers.lock().unwrap().push(state);
        Ok(())
    }
}

#[derive(Default)]
struct FakeRestoreSink {
    persisted: Mutex<OperationStatus>,
    statuses: Mutex<Vec<OperationStatus>>,
    markers: Mutex<Vec<ApplyState>>,
}

#[async_trait]
impl RestoreSink for FakeRestoreSink {
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()> {
        let snapshot = {
            let mut persisted = self.persisted.lock().unwrap();
            persisted.phase = Some(phase);
            persisted.conditions.push(condition.clone());
            persisted.clone()
        };
        self.statuses.lock().unwrap().push(snapshot);
        Ok(())
    }

    async fn record_applied(&self, state: ApplyState, _spec: &EtcdRestoreSpec) -> Result<()> {
        self.markers.lock().unwrap().push(state);
        Ok(())
    }
}

#[derive(Default)]
struct FakeExec {
    fail_snapshot: bool,
    fail_remove: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeExec {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterCommands for FakeExec {
    async fn snapshot(&self, target: &ExecTarget, remote_path: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("snapshot {} {remote_path}", target.pod));
        if self.fail_snapshot {
            return Err(Error::CommandFailed {
                command: format!("etcdctl snapshot save {remote_path}"),
                output: "context deadline exceeded".to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(
        &self,
        target: &ExecTarget,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("fetch {} {remote_path}", target.pod));
        std::fs::write(local_path, b"snapshot-bytes")?;
        Ok(())
    }

    async fn remove(&self, target: &ExecTarget, remote_path: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("remove {} {remote_path}", target.pod));
        if self.fail_remove {
            return Err(Error::CommandFailed {
                command: format!("rm -f {remote_path}"),
                output: "permission denied".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeStorage {
    fail: bool,
}

#[async_trait]
impl StorageProvider for FakeStorage {
    async fn store(&self, _spec: &StorageSpec, file: &Path) -> Result<String> {
        if self.fail {
            return Err(Error::storage("bucket unreachable"));
        }
        Ok(format!(
            "http://minio.storage:9000/dumps/{}",
            file.file_name().unwrap().to_string_lossy()
        ))
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("team-a".to_string()),
        ..Default::default()
    }
}

fn cluster_spec(replicas: i32) -> EtcdClusterSpec {
    EtcdClusterSpec {
        replicas,
        image: "quay.io/coreos/etcd:v3.4.22".to_string(),
        storage: 1,
        init_cluster_type: InitClusterType::Static,
        resources: None,
    }
}

fn etcd_cluster(replicas: i32, status: Option<EtcdClusterStatus>) -> EtcdCluster {
    EtcdCluster {
        metadata: metadata("my-etcd"),
        spec: cluster_spec(replicas),
        status,
    }
}

fn s3_storage() -> StorageSpec {
    StorageSpec {
        s3: Some(S3StorageSpec {
            region: None,
            endpoint: "http://minio.storage:9000".to_string(),
            bucket: "dumps".to_string(),
            force_path_style: true,
            credentials_secret: None,
        }),
        qiniu: None,
    }
}

fn etcd_dump(schedule: Option<&str>) -> EtcdDump {
    EtcdDump {
        metadata: metadata("nightly"),
        spec: EtcdDumpSpec {
            schedule: schedule.map(str::to_string),
            cluster_reference: "my-etcd".to_string(),
            storage: s3_storage(),
        },
        status: None,
    }
}

fn member_pod(name: &str, claim: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("team-a".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "datadir".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn etcd_restore(cluster: &str) -> EtcdRestore {
    EtcdRestore {
        metadata: metadata("recover"),
        spec: EtcdRestoreSpec {
            cluster_reference: cluster.to_string(),
            data_url: "http://minio.storage:9000/dumps/my-etcd.db".to_string(),
        },
        status: None,
    }
}

fn dump_workflow(exec: Arc<FakeExec>, storage: Arc<FakeStorage>, staging: PathBuf) -> DumpWorkflow {
    DumpWorkflow::new(exec, storage, staging)
}

// ============================================================================
// Cluster Scenarios
// ============================================================================

#[tokio::test]
async fn new_cluster_creates_service_and_workload() {
    let infra = FakeInfra::default();
    let sink = FakeClusterSink::default();
    let resource = etcd_cluster(3, None);

    cluster::reconcile(&resource, &infra, &sink).await.unwrap();

    assert_eq!(
        infra.calls(),
        vec![
            "create_service my-etcd".to_string(),
            "create_stateful_set replicas=3".to_string(),
        ]
    );
    assert_eq!(
        *sink.markers.lock().unwrap(),
        vec![ApplyState::Recorded, ApplyState::Applied]
    );
}

#[tokio::test]
async fn unchanged_cluster_reconciles_to_a_no_op() {
    let resource = etcd_cluster(
        3,
        Some(EtcdClusterStatus {
            last_applied: Some(AppliedSpec::applied(cluster_spec(3))),
        }),
    );
    let infra = FakeInfra::with_stateful_set(statefulset::build(&resource));
    let sink = FakeClusterSink::default();

    cluster::reconcile(&resource, &infra, &sink).await.unwrap();

    assert!(infra.calls().is_empty());
    assert!(sink.markers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scaled_cluster_updates_workload_only() {
    let resource = etcd_cluster(
        5,
        Some(EtcdClusterStatus {
            last_applied: Some(AppliedSpec::applied(cluster_spec(3))),
        }),
    );
    let infra = FakeInfra::with_stateful_set(statefulset::build(&etcd_cluster(3, None)));
    let sink = FakeClusterSink::default();

    cluster::reconcile(&resource, &infra, &sink).await.unwrap();

    assert_eq!(
        infra.calls(),
        vec!["update_stateful_set replicas=5".to_string()]
    );
    assert_eq!(
        *sink.markers.lock().unwrap(),
        vec![ApplyState::Recorded, ApplyState::Applied]
    );
}

#[tokio::test]
async fn recorded_but_unapplied_spec_is_still_treated_as_changed() {
    let resource = etcd_cluster(
        3,
        Some(EtcdClusterStatus {
            last_applied: Some(AppliedSpec::recorded(cluster_spec(3))),
        }),
    );
    let infra = FakeInfra::with_stateful_set(statefulset::build(&resource));
    let sink = FakeClusterSink::default();

    cluster::reconcile(&resource, &infra, &sink).await.unwrap();

    assert_eq!(
        infra.calls(),
        vec!["update_stateful_set replicas=3".to_string()]
    );
}

// ============================================================================
// Dump Scenarios
// ============================================================================

#[tokio::test]
async fn one_shot_dump_publishes_and_records_each_step() {
    let staging = tempfile::tempdir().unwrap();
    let exec = Arc::new(FakeExec::default());
    let storage = Arc::new(FakeStorage::default());
    let workflow = dump_workflow(exec.clone(), storage, staging.path().to_path_buf());
    let sink = FakeDumpSink::default();
    let resource = etcd_dump(None);

    let location = workflow.run(&resource, &sink).await.unwrap();
    assert!(location.starts_with("http://minio.storage:9000/dumps/team-a_my-etcd_"));

    let statuses = sink.statuses.lock().unwrap();
    let reasons: Vec<String> = statuses
        .last()
        .unwrap()
        .conditions
        .iter()
        .map(|c| c.reason.clone())
        .collect();
    assert_eq!(
        reasons,
        vec![
            "begin dump",
            "dump cmd exec success",
            "cp cmd exec success",
            "upload success",
        ]
    );
    assert_eq!(statuses.last().unwrap().phase, Some(OperationPhase::Completed));
    let last = statuses.last().unwrap().conditions.last().unwrap().clone();
    assert!(last.ready);
    assert_eq!(last.location, Some(location));

    // snapshot is taken on the first member and cleaned up afterwards
    let calls = exec.calls();
    assert!(calls[0].starts_with("snapshot my-etcd-0"));
    assert!(calls[2].starts_with("remove my-etcd-0"));
}

#[tokio::test]
async fn failed_snapshot_leaves_the_dump_running_for_retry() {
    let staging = tempfile::tempdir().unwrap();
    let exec = Arc::new(FakeExec {
        fail_snapshot: true,
        ..Default::default()
    });
    let workflow = Arc::new(dump_workflow(
        exec,
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    ));
    let sink = Arc::new(FakeDumpSink::default());
    let scheduler = DumpScheduler::new();
    let resource = Arc::new(etcd_dump(None));

    let err = dump::reconcile(resource, &scheduler, workflow, sink.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }));

    let statuses = sink.statuses.lock().unwrap();
    let last = statuses.last().unwrap();
    assert_eq!(last.phase, Some(OperationPhase::Running));
    let condition = last.conditions.last().unwrap();
    assert!(!condition.ready);
    assert_eq!(condition.reason, "dump cmd exec failed");

    // intent was recorded but the spec is never marked applied
    assert_eq!(*sink.markers.lock().unwrap(), vec![ApplyState::Recorded]);
}

#[tokio::test]
async fn failed_upload_marks_the_dump_failed() {
    let staging = tempfile::tempdir().unwrap();
    let workflow = dump_workflow(
        Arc::new(FakeExec::default()),
        Arc::new(FakeStorage { fail: true }),
        staging.path().to_path_buf(),
    );
    let sink = FakeDumpSink::default();

    let err = workflow.run(&etcd_dump(None), &sink).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    let statuses = sink.statuses.lock().unwrap();
    let last = statuses.last().unwrap();
    assert_eq!(last.phase, Some(OperationPhase::Failed));
    assert_eq!(last.conditions.last().unwrap().reason, "upload failed");
}

#[tokio::test]
async fn remote_cleanup_failure_does_not_fail_the_dump() {
    let staging = tempfile::tempdir().unwrap();
    let workflow = dump_workflow(
        Arc::new(FakeExec {
            fail_remove: true,
            ..Default::default()
        }),
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    );
    let sink = FakeDumpSink::default();

    workflow.run(&etcd_dump(None), &sink).await.unwrap();

    let statuses = sink.statuses.lock().unwrap();
    assert_eq!(
        statuses.last().unwrap().phase,
        Some(OperationPhase::Completed)
    );
}

#[tokio::test]
async fn scheduled_dump_registers_without_running_synchronously() {
    let staging = tempfile::tempdir().unwrap();
    let exec = Arc::new(FakeExec::default());
    let workflow = Arc::new(dump_workflow(
        exec.clone(),
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    ));
    let sink = Arc::new(FakeDumpSink::default());
    let scheduler = DumpScheduler::new();
    let resource = Arc::new(etcd_dump(Some("0 0 * * * * *")));

    dump::reconcile(resource.clone(), &scheduler, workflow.clone(), sink.clone())
        .await
        .unwrap();

    assert!(scheduler.is_registered("team-a/nightly"));
    assert_eq!(scheduler.len(), 1);
    assert!(exec.calls().is_empty());

    // once the spec is marked applied, further passes are no-ops and the
    // registered job is left alone
    let mut settled = etcd_dump(Some("0 0 * * * * *"));
    settled.status = Some(EtcdDumpStatus {
        phase: None,
        conditions: vec![],
        last_applied: Some(AppliedSpec::applied(settled.spec.clone())),
    });
    dump::reconcile(Arc::new(settled), &scheduler, workflow, sink.clone())
        .await
        .unwrap();
    assert_eq!(scheduler.len(), 1);
    assert!(exec.calls().is_empty());
    // no new intent marker was written on the settled pass
    assert_eq!(
        *sink.markers.lock().unwrap(),
        vec![ApplyState::Recorded, ApplyState::Applied]
    );
}

#[tokio::test]
async fn deleted_dump_deregisters_its_job() {
    let staging = tempfile::tempdir().unwrap();
    let workflow = Arc::new(dump_workflow(
        Arc::new(FakeExec::default()),
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    ));
    let sink = Arc::new(FakeDumpSink::default());
    let scheduler = DumpScheduler::new();

    let resource = Arc::new(etcd_dump(Some("0 0 * * * * *")));
    dump::reconcile(resource, &scheduler, workflow.clone(), sink.clone())
        .await
        .unwrap();
    assert_eq!(scheduler.len(), 1);

    let mut deleted = etcd_dump(Some("0 0 * * * * *"));
    deleted.metadata.deletion_timestamp =
        Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
            chrono::Utc::now(),
        ));
    dump::reconcile(Arc::new(deleted), &scheduler, workflow, sink)
        .await
        .unwrap();
    assert!(scheduler.is_empty());
}

// ============================================================================
// Restore Scenarios
// ============================================================================

#[tokio::test]
async fn restore_drops_claims_and_injects_init_containers() {
    let source = etcd_cluster(2, None);
    let infra = FakeInfra {
        sts: Mutex::new(Some(statefulset::build(&source))),
        pods: vec![
            member_pod("my-etcd-0", "datadir-my-etcd-0"),
            member_pod("my-etcd-1", "datadir-my-etcd-1"),
        ],
        ..Default::default()
    };
    let sink = FakeRestoreSink::default();
    let resource = etcd_restore("my-etcd");

    restore::reconcile(&resource, &infra, &sink).await.unwrap();

    assert_eq!(
        infra.calls(),
        vec![
            "list_pods app.example.com/v1alpha1=my-etcd".to_string(),
            "delete_pvc datadir-my-etcd-0".to_string(),
            "delete_pvc datadir-my-etcd-1".to_string(),
            "update_stateful_set replicas=2".to_string(),
        ]
    );

    let updated = infra.sts.lock().unwrap().clone().unwrap();
    let init = updated
        .spec
        .unwrap()
        .template
        .spec
        .unwrap()
        .init_containers
        .unwrap();
    assert_eq!(init.len(), 1);
    assert_eq!(init[0].name, "restore-data");

    let statuses = sink.statuses.lock().unwrap();
    assert_eq!(statuses[0].conditions[0].reason, "begin etcd cluster restore");
    let last = statuses.last().unwrap();
    assert_eq!(last.phase, Some(OperationPhase::Completed));
    assert_eq!(last.conditions.last().unwrap().reason, "restore success");
    assert_eq!(
        *sink.markers.lock().unwrap(),
        vec![ApplyState::Recorded, ApplyState::Applied]
    );
}

#[tokio::test]
async fn restore_deletes_the_claims_the_pods_mount() {
    // claims are taken from the pod volumes, not derived from pod names
    let mut detached = member_pod("my-etcd-1", "unused");
    detached.spec.as_mut().unwrap().volumes = None;
    let infra = FakeInfra {
        sts: Mutex::new(Some(statefulset::build(&etcd_cluster(2, None)))),
        pods: vec![
            member_pod("my-etcd-0", "custom-claim-my-etcd-0"),
            detached,
        ],
        ..Default::default()
    };
    let sink = FakeRestoreSink::default();

    restore::reconcile(&etcd_restore("my-etcd"), &infra, &sink)
        .await
        .unwrap();

    let deletes: Vec<String> = infra
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("delete_pvc"))
        .collect();
    assert_eq!(deletes, vec!["delete_pvc custom-claim-my-etcd-0".to_string()]);
}

#[tokio::test]
async fn restore_lists_pods_by_the_workload_selector() {
    let mut sts = statefulset::build(&etcd_cluster(2, None));
    sts.spec.as_mut().unwrap().selector.match_labels =
        Some(BTreeMap::from([("app".to_string(), "legacy-etcd".to_string())]));
    let infra = FakeInfra::with_stateful_set(sts);
    let sink = FakeRestoreSink::default();

    restore::reconcile(&etcd_restore("my-etcd"), &infra, &sink)
        .await
        .unwrap();

    assert!(infra
        .calls()
        .contains(&"list_pods app=legacy-etcd".to_string()));
}

#[tokio::test]
async fn restore_against_missing_workload_fails_terminally() {
    let infra = FakeInfra::default();
    let sink = FakeRestoreSink::default();
    let resource = etcd_restore("no-such-cluster");

    let err = restore::reconcile(&resource, &infra, &sink).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let statuses = sink.statuses.lock().unwrap();
    let last = statuses.last().unwrap();
    assert_eq!(last.phase, Some(OperationPhase::Failed));
    assert_eq!(
        last.conditions.last().unwrap().reason,
        "get reference statefulset failed"
    );
}

#[tokio::test]
async fn completed_restore_does_not_rerun() {
    let spec = EtcdRestoreSpec {
        cluster_reference: "my-etcd".to_string(),
        data_url: "http://minio.storage:9000/dumps/my-etcd.db".to_string(),
    };
    let resource = EtcdRestore {
        metadata: metadata("recover"),
        spec: spec.clone(),
        status: Some(EtcdRestoreStatus {
            phase: Some(OperationPhase::Completed),
            conditions: vec![],
            last_applied: Some(AppliedSpec::applied(spec)),
        }),
    };
    let infra = FakeInfra::default();
    let sink = FakeRestoreSink::default();

    restore::reconcile(&resource, &infra, &sink).await.unwrap();

    assert!(infra.calls().is_empty());
    assert!(sink.statuses.lock().unwrap().is_empty());
}

// ============================================================================
// Condition History
// ============================================================================

#[tokio::test]
async fn second_dump_attempt_extends_the_condition_history() {
    let staging = tempfile::tempdir().unwrap();
    let workflow = dump_workflow(
        Arc::new(FakeExec::default()),
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    );
    let sink = FakeDumpSink::default();

    // both runs start from the same resource snapshot, the way a recurring
    // job fires from the object it captured at registration time
    let resource = etcd_dump(None);
    workflow.run(&resource, &sink).await.unwrap();
    let first_len = sink.statuses.lock().unwrap().last().unwrap().conditions.len();
    workflow.run(&resource, &sink).await.unwrap();

    let persisted = sink.statuses.lock().unwrap().last().unwrap().clone();
    assert_eq!(persisted.conditions.len(), first_len * 2);
    let uploads = persisted
        .conditions
        .iter()
        .filter(|c| c.reason == "upload success")
        .count();
    assert_eq!(uploads, 2);
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn dump_outcome_counter_tracks_runs_not_reconciles() {
    let staging = tempfile::tempdir().unwrap();
    let exec = Arc::new(FakeExec::default());
    let workflow = Arc::new(dump_workflow(
        exec.clone(),
        Arc::new(FakeStorage::default()),
        staging.path().to_path_buf(),
    ));
    let sink = Arc::new(FakeDumpSink::default());
    let scheduler = DumpScheduler::new();

    let mut resource = etcd_dump(None);
    resource.metadata.name = Some("metered".to_string());
    let counter = etcd_operator::metrics::DUMPS_TOTAL
        .with_label_values(&["success", "team-a", "metered"]);
    let before = counter.get();

    // a one-shot pass runs the workflow and counts one success
    dump::reconcile(
        Arc::new(resource.clone()),
        &scheduler,
        workflow.clone(),
        sink.clone(),
    )
    .await
    .unwrap();
    assert_eq!(counter.get(), before + 1.0);

    // a registration-only pass runs nothing and counts nothing
    resource.spec.schedule = Some("0 0 0 1 1 * 2099".to_string());
    dump::reconcile(Arc::new(resource), &scheduler, workflow, sink)
        .await
        .unwrap();
    assert_eq!(counter.get(), before + 1.0);
}
