//! EtcdRestore Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::change::AppliedSpec;
use crate::status::{OperationCondition, OperationPhase};

/// EtcdRestore resource specification
#[derive(CustomResource, Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "app.example.com",
    version = "v1alpha1",
    kind = "EtcdRestore",
    plural = "etcdrestores",
    singular = "etcdrestore",
    shortname = "er",
    namespaced,
    status = "EtcdRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterReference"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdRestoreSpec {
    /// Name of the EtcdCluster to restore into
    pub cluster_reference: String,

    /// URL of the snapshot file used to re-seed each member's data volume
    #[serde(rename = "dataURL")]
    pub data_url: String,
}

/// EtcdRestore status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdRestoreStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<OperationPhase>,

    /// Append-only history of workflow steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperationCondition>,

    /// Snapshot of the spec this controller last acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<AppliedSpec<EtcdRestoreSpec>>,
}
