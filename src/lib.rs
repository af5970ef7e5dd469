//! etcd Kubernetes Operator
//!
//! This operator manages the lifecycle of etcd clusters declared as Custom
//! Resource Definitions (CRDs): provisioning and scaling of the backing
//! StatefulSet, scheduled/ad hoc snapshot dumps, and in-place restores.

pub mod change;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod exec;
pub mod infra;
pub mod metrics;
pub mod reconcilers;
pub mod resources;
pub mod scheduler;
pub mod status;
pub mod storage;

pub use error::{Error, Result};
