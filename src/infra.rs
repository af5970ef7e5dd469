//! Kubernetes-facing collaborators
//!
//! Reconcilers never touch the API client directly; they go through the
//! [`ClusterInfra`] trait for workload CRUD and through per-resource status
//! sinks for writing phase, conditions and the last-applied marker. Every
//! write that can hit a stale resourceVersion re-reads and retries a bounded
//! number of times.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::change::{AppliedSpec, ApplyState};
use crate::crd::{
    EtcdCluster, EtcdClusterSpec, EtcdClusterStatus, EtcdDump, EtcdDumpSpec, EtcdDumpStatus,
    EtcdRestore, EtcdRestoreSpec, EtcdRestoreStatus,
};
use crate::error::{kube_conflict, kube_not_found, Error, Result};
use crate::status::{OperationCondition, OperationPhase};

/// Attempts per write before giving up on resourceVersion conflicts
pub const CONFLICT_RETRIES: usize = 5;

/// Workload and namespace-object CRUD needed by the reconcilers
#[async_trait]
pub trait ClusterInfra: Send + Sync {
    async fn get_stateful_set(&self, namespace: &str, name: &str)
        -> Result<Option<StatefulSet>>;
    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()>;
    /// Replace the named StatefulSet, retrying on stale resourceVersion
    async fn update_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()>;
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Status writer for an EtcdDump
#[async_trait]
pub trait DumpSink: Send + Sync {
    /// Append one condition and set the phase. The condition list is
    /// append-only, so the write must extend whatever is already persisted,
    /// never replace it; the last-applied marker is left alone.
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()>;
    async fn record_applied(&self, state: ApplyState, spec: &EtcdDumpSpec) -> Result<()>;
}

/// Status writer for an EtcdRestore
#[async_trait]
pub trait RestoreSink: Send + Sync {
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()>;
    async fn record_applied(&self, state: ApplyState, spec: &EtcdRestoreSpec) -> Result<()>;
}

/// Status writer for an EtcdCluster
#[async_trait]
pub trait ClusterSink: Send + Sync {
    async fn record_applied(&self, state: ApplyState, spec: &EtcdClusterSpec) -> Result<()>;
}

/// Live implementation over a kube client
#[derive(Clone)]
pub struct KubeInfra {
    client: Client,
}

impl KubeInfra {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterInfra for KubeInfra {
    async fn get_stateful_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(sts) => Ok(Some(sts)),
            Err(e) if kube_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), sts).await?;
        Ok(())
    }

    async fn update_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let name = sts
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("statefulset update without a name"))?;

        let mut desired = sts.clone();
        for attempt in 0..CONFLICT_RETRIES {
            let current = api.get(&name).await?;
            desired.metadata.resource_version = current.metadata.resource_version;
            match api.replace(&name, &PostParams::default(), &desired).await {
                Ok(_) => return Ok(()),
                Err(e) if kube_conflict(&e) => {
                    debug!(name = %name, attempt, "statefulset replace hit a stale version, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Conflict {
            resource: format!("statefulset {namespace}/{name}"),
        })
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let labels = selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let pods = api.list(&ListParams::default().labels(&labels)).await?;
        Ok(pods.items)
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

macro_rules! status_write_with_retry {
    ($api:expr, $name:expr, $mutate:expr) => {{
        for attempt in 0..CONFLICT_RETRIES {
            let mut current = $api.get($name).await?;
            $mutate(&mut current);
            let patch = Patch::Merge(serde_json::json!({ "status": current.status }));
            match $api
                .patch_status($name, &PatchParams::default(), &patch)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if kube_conflict(&e) => {
                    debug!(name = %$name, attempt, "status write hit a stale version, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Conflict {
            resource: $name.to_string(),
        })
    }};
}

/// Status sink bound to one EtcdDump
pub struct KubeDumpSink {
    api: Api<EtcdDump>,
    name: String,
}

impl KubeDumpSink {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl DumpSink for KubeDumpSink {
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()> {
        status_write_with_retry!(self.api, &self.name, |dump: &mut EtcdDump| {
            let existing = dump.status.get_or_insert_with(EtcdDumpStatus::default);
            existing.phase = Some(phase);
            existing.conditions.push(condition.clone());
        })
    }

    async fn record_applied(&self, state: ApplyState, spec: &EtcdDumpSpec) -> Result<()> {
        let marker = AppliedSpec {
            state,
            spec: spec.clone(),
        };
        status_write_with_retry!(self.api, &self.name, |dump: &mut EtcdDump| {
            dump.status
                .get_or_insert_with(EtcdDumpStatus::default)
                .last_applied = Some(marker.clone());
        })
    }
}

/// Status sink bound to one EtcdRestore
pub struct KubeRestoreSink {
    api: Api<EtcdRestore>,
    name: String,
}

impl KubeRestoreSink {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl RestoreSink for KubeRestoreSink {
    async fn persist_transition(
        &self,
        phase: OperationPhase,
        condition: &OperationCondition,
    ) -> Result<()> {
        status_write_with_retry!(self.api, &self.name, |restore: &mut EtcdRestore| {
            let existing = restore
                .status
                .get_or_insert_with(EtcdRestoreStatus::default);
            existing.phase = Some(phase);
            existing.conditions.push(condition.clone());
        })
    }

    async fn record_applied(&self, state: ApplyState, spec: &EtcdRestoreSpec) -> Result<()> {
        let marker = AppliedSpec {
            state,
            spec: spec.clone(),
        };
        status_write_with_retry!(self.api, &self.name, |restore: &mut EtcdRestore| {
            restore
                .status
                .get_or_insert_with(EtcdRestoreStatus::default)
                .last_applied = Some(marker.clone());
        })
    }
}

/// Status sink bound to one EtcdCluster
pub struct KubeClusterSink {
    api: Api<EtcdCluster>,
    name: String,
}

impl KubeClusterSink {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ClusterSink for KubeClusterSink {
    async fn record_applied(&self, state: ApplyState, spec: &EtcdClusterSpec) -> Result<()> {
        let marker = AppliedSpec {
            state,
            spec: spec.clone(),
        };
        status_write_with_retry!(self.api, &self.name, |cluster: &mut EtcdCluster| {
            cluster
                .status
                .get_or_insert_with(EtcdClusterStatus::default)
                .last_applied = Some(marker.clone());
        })
    }
}
