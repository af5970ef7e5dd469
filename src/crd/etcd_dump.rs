//! EtcdDump Custom Resource Definition

use k8s_openapi::api::core::v1::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::change::AppliedSpec;
use crate::status::{OperationCondition, OperationPhase};

/// EtcdDump resource specification
#[derive(CustomResource, Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "app.example.com",
    version = "v1alpha1",
    kind = "EtcdDump",
    plural = "etcddumps",
    singular = "etcddump",
    shortname = "ed",
    namespaced,
    status = "EtcdDumpStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterReference"}"#,
    printcolumn = r#"{"name": "Schedule", "type": "string", "jsonPath": ".spec.schedule"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdDumpSpec {
    /// Cron schedule for recurring dumps; absent or empty means run once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Name of the EtcdCluster to snapshot
    pub cluster_reference: String,

    /// Where the dump file is published
    pub storage: StorageSpec,
}

/// Storage backend descriptor. Exactly one variant must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// S3-compatible bucket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageSpec>,

    /// Qiniu-style object store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qiniu: Option<QiniuStorageSpec>,
}

/// S3-compatible bucket for storing dumps
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageSpec {
    /// Region in which the bucket is located
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Endpoint (hostname or fully qualified URI) of the storage service
    pub endpoint: String,

    /// Bucket in which to store the dump
    pub bucket: String,

    /// Force path-style addressing (`http://endpoint/BUCKET/KEY`) instead of
    /// virtual-hosted bucket addressing
    #[serde(default)]
    pub force_path_style: bool,

    /// Secret holding the credentials for the storage service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<LocalObjectReference>,
}

/// Qiniu-style object store for storing dumps
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QiniuStorageSpec {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,

    /// Upload endpoints, tried in order
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// EtcdDump status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdDumpStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<OperationPhase>,

    /// Append-only history of workflow steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperationCondition>,

    /// Snapshot of the spec this controller last acted on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<AppliedSpec<EtcdDumpSpec>>,
}
