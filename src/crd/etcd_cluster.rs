//! EtcdCluster Custom Resource Definition

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::change::AppliedSpec;

/// EtcdCluster resource specification
#[derive(CustomResource, Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "app.example.com",
    version = "v1alpha1",
    kind = "EtcdCluster",
    plural = "etcdclusters",
    singular = "etcdcluster",
    shortname = "etcd",
    namespaced,
    status = "EtcdClusterStatus",
    printcolumn = r#"{"name": "Replicas", "type": "integer", "jsonPath": ".spec.replicas"}"#,
    printcolumn = r#"{"name": "Image", "type": "string", "jsonPath": ".spec.image"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterSpec {
    /// etcd cluster size
    pub replicas: i32,

    /// etcd container image
    pub image: String,

    /// Data volume size in Gi, one claim per member
    pub storage: i32,

    /// How members discover each other at bootstrap
    #[serde(default)]
    pub init_cluster_type: InitClusterType,

    /// Compute resources for the etcd container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Initial-cluster discovery mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum InitClusterType {
    /// Peer URLs computed from the replica count and headless service
    #[default]
    Static,
    /// SRV-record discovery through the headless service
    DnsDiscovery,
    /// Bootstrap through an external etcd discovery service
    EtcdDiscovery,
}

/// EtcdCluster status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterStatus {
    /// Snapshot of the spec this controller last acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<AppliedSpec<EtcdClusterSpec>>,
}
