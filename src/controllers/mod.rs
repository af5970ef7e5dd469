//! Controller setup and shared context

pub mod cluster_controller;
pub mod dump_controller;
pub mod restore_controller;

use std::path::PathBuf;
use std::sync::Arc;

use kube::Client;

use crate::exec::ClusterCommands;
use crate::scheduler::DumpScheduler;
use crate::storage::StorageProvider;

/// Shared context passed to all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,

    /// Registrar for recurring dump jobs, shared across reconcile passes
    pub scheduler: Arc<DumpScheduler>,

    /// Command surface against running clusters
    pub exec: Arc<dyn ClusterCommands>,

    /// Snapshot archive destination
    pub storage: Arc<dyn StorageProvider>,

    /// Local directory snapshots are staged in before upload
    pub staging_dir: PathBuf,
}
