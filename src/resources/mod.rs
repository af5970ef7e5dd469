//! Stateless builders for the objects generated per EtcdCluster

pub mod service;
pub mod statefulset;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{EtcdCluster, GROUP, VERSION};

/// Label applied to the generated service, workload and its pods; used for
/// service routing and restore's pod discovery
pub const SELECTOR_LABEL: &str = "app.example.com/v1alpha1";

/// Selector/labels map for a cluster's generated objects
pub fn selector_labels(cluster: &EtcdCluster) -> BTreeMap<String, String> {
    BTreeMap::from([(SELECTOR_LABEL.to_string(), cluster.name_any())])
}

/// Controller owner reference back to the cluster resource, enabling
/// cascading deletion of the generated service and workload
pub fn owner_reference(cluster: &EtcdCluster) -> OwnerReference {
    OwnerReference {
        api_version: format!("{}/{}", GROUP, VERSION),
        kind: "EtcdCluster".to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
