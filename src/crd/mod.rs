//! Custom Resource Definitions for the etcd operator

mod etcd_cluster;
mod etcd_dump;
mod etcd_restore;

pub use etcd_cluster::*;
pub use etcd_dump::*;
pub use etcd_restore::*;

use kube::CustomResourceExt;

/// API group shared by all three resources
pub const GROUP: &str = "app.example.com";

/// API version shared by all three resources
pub const VERSION: &str = "v1alpha1";

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Vec<String> {
    vec![
        serde_yaml::to_string(&EtcdCluster::crd()).unwrap(),
        serde_yaml::to_string(&EtcdDump::crd()).unwrap(),
        serde_yaml::to_string(&EtcdRestore::crd()).unwrap(),
    ]
}
