//! Headless service builder for an EtcdCluster

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{owner_reference, selector_labels};
use crate::crd::EtcdCluster;

/// Client port exposed by every member
pub const CLIENT_PORT: i32 = 2379;

/// Peer port exposed by every member
pub const PEER_PORT: i32 = 2380;

/// Build the headless service backing member DNS and client routing
pub fn build(cluster: &EtcdCluster) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(cluster.name_any()),
            namespace: cluster.namespace(),
            labels: Some(selector_labels(cluster)),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(selector_labels(cluster)),
            ports: Some(vec![
                ServicePort {
                    name: Some("etcd-client".to_string()),
                    port: CLIENT_PORT,
                    ..Default::default()
                },
                ServicePort {
                    name: Some("etcd-server".to_string()),
                    port: PEER_PORT,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        status: None,
    }
}
