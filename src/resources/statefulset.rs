//! StatefulSet builder for an EtcdCluster
//!
//! The generated workload runs one etcd member per replica with a `datadir`
//! volume claim per member. Rollouts on spec changes are left entirely to
//! the platform; the reconciler only overwrites the desired spec.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use super::{owner_reference, selector_labels, service};
use crate::crd::{EtcdCluster, EtcdRestore, InitClusterType};

/// Mount path of the member data volume
pub const DATA_DIR: &str = "/var/run/etcd";

/// Name of the per-member volume claim template
pub const DATA_VOLUME: &str = "datadir";

/// Build the desired StatefulSet for a cluster spec
pub fn build(cluster: &EtcdCluster) -> StatefulSet {
    let name = cluster.name_any();
    let labels = selector_labels(cluster);

    let container = Container {
        name: "etcd".to_string(),
        image: Some(cluster.spec.image.clone()),
        resources: cluster.spec.resources.clone(),
        ports: Some(vec![
            ContainerPort {
                name: Some("client".to_string()),
                container_port: service::CLIENT_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("peer".to_string()),
                container_port: service::PEER_PORT,
                ..Default::default()
            },
        ]),
        env: Some(vec![
            EnvVar {
                name: "INITIAL_CLUSTER_SIZE".to_string(),
                value: Some(cluster.spec.replicas.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SET_NAME".to_string(),
                value: Some(name.clone()),
                ..Default::default()
            },
            EnvVar {
                name: "NAMESPACE".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.namespace".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        command: Some(bootstrap_command(cluster)),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: cluster.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(cluster)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: name.clone(),
            replicas: Some(cluster.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(name),
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![data_volume_claim(cluster)]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Init containers that re-seed each member's data volume from a snapshot
/// URL before the main process starts. Replaces any existing init steps.
pub fn restore_init_containers(sts: &StatefulSet, restore: &EtcdRestore) -> Vec<Container> {
    let image = sts
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_else(|| "quay.io/coreos/etcd:latest".to_string());

    let script = format!(
        "rm -rf {data}/default.etcd\n\
         wget -O {data}/snapshot.db {url}\n\
         ETCDCTL_API=3 etcdctl snapshot restore {data}/snapshot.db \
         --data-dir {data}/default.etcd\n\
         rm -f {data}/snapshot.db\n",
        data = DATA_DIR,
        url = restore.spec.data_url,
    );

    vec![Container {
        name: "restore-data".to_string(),
        image: Some(image),
        command: Some(vec!["/bin/sh".to_string(), "-ec".to_string(), script]),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }]
}

fn data_volume_claim(cluster: &EtcdCluster) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(
                    [(
                        "storage".to_string(),
                        Quantity(format!("{}Gi", cluster.spec.storage)),
                    )]
                    .into(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Shell bootstrap for the etcd container, varying by discovery mode
fn bootstrap_command(cluster: &EtcdCluster) -> Vec<String> {
    let name = cluster.name_any();
    let common = "HOSTNAME=$(hostname)\nPOD_IP=$(hostname -i)\n";
    let listen = format!(
        "--listen-peer-urls http://${{POD_IP}}:{peer} \
         --listen-client-urls http://${{POD_IP}}:{client},http://127.0.0.1:{client} \
         --advertise-client-urls http://${{HOSTNAME}}.${{SET_NAME}}:{client} \
         --data-dir {data}/default.etcd",
        peer = service::PEER_PORT,
        client = service::CLIENT_PORT,
        data = DATA_DIR,
    );

    let script = match cluster.spec.init_cluster_type {
        InitClusterType::Static => {
            let peers = (0..cluster.spec.replicas)
                .map(|i| format!("{name}-{i}=http://{name}-{i}.{name}:{}", service::PEER_PORT))
                .collect::<Vec<_>>()
                .join(",");
            format!(
                "{common}exec etcd --name ${{HOSTNAME}} \
                 --initial-advertise-peer-urls http://${{HOSTNAME}}.${{SET_NAME}}:{peer} \
                 --initial-cluster {peers} \
                 --initial-cluster-state new \
                 --initial-cluster-token {name} \
                 {listen}",
                peer = service::PEER_PORT,
            )
        }
        InitClusterType::DnsDiscovery => format!(
            "{common}exec etcd --name ${{HOSTNAME}} \
             --discovery-srv ${{SET_NAME}}.${{NAMESPACE}}.svc.cluster.local \
             {listen}"
        ),
        InitClusterType::EtcdDiscovery => format!(
            "{common}exec etcd --name ${{HOSTNAME}} \
             --discovery ${{ETCD_DISCOVERY_URL}} \
             {listen}"
        ),
    };

    vec!["/bin/sh".to_string(), "-ec".to_string(), script]
}
