//! Out-of-process commands against a target cluster member
//!
//! The dump workflow needs three operations on the control plane's command
//! surface: save a snapshot inside a member pod, copy a file out of the pod
//! filesystem, and remove a remote file. They sit behind a capability trait
//! so reconcilers can run with a test double and the shipped adapter can
//! enforce a timeout on every invocation.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Pod a command is executed against
#[derive(Clone, Debug)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
}

impl ExecTarget {
    /// The designated dump replica of a cluster is its first member
    pub fn first_member(namespace: &str, cluster: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            pod: format!("{cluster}-0"),
        }
    }
}

/// Snapshot/transfer/cleanup capability against a running cluster
#[async_trait]
pub trait ClusterCommands: Send + Sync {
    /// Write a point-in-time snapshot to `remote_path` inside the target pod
    async fn snapshot(&self, target: &ExecTarget, remote_path: &str) -> Result<()>;

    /// Copy `remote_path` out of the target pod into `local_path`
    async fn fetch(&self, target: &ExecTarget, remote_path: &str, local_path: &Path)
        -> Result<()>;

    /// Remove `remote_path` inside the target pod
    async fn remove(&self, target: &ExecTarget, remote_path: &str) -> Result<()>;
}

/// Adapter over the `kubectl` command-line surface
pub struct KubectlCommands {
    timeout: Duration,
}

impl KubectlCommands {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let command = format!("kubectl {}", args.join(" "));
        debug!(command = %command, "running control-plane command");

        let result = tokio::time::timeout(
            self.timeout,
            Command::new("kubectl").args(&args).output(),
        )
        .await;

        let output: Output = match result {
            Ok(io) => io?,
            Err(_) => {
                return Err(Error::CommandFailed {
                    command,
                    output: format!("timed out after {:?}", self.timeout),
                })
            }
        };

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::CommandFailed {
                command,
                output: combined,
            });
        }
        Ok(())
    }
}

impl Default for KubectlCommands {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl ClusterCommands for KubectlCommands {
    async fn snapshot(&self, target: &ExecTarget, remote_path: &str) -> Result<()> {
        self.run(vec![
            "-n".into(),
            target.namespace.clone(),
            "exec".into(),
            target.pod.clone(),
            "--".into(),
            "sh".into(),
            "-c".into(),
            format!("ETCDCTL_API=3 etcdctl snapshot save {remote_path}"),
        ])
        .await
    }

    async fn fetch(
        &self,
        target: &ExecTarget,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        self.run(vec![
            "cp".into(),
            format!("{}/{}:{}", target.namespace, target.pod, remote_path),
            local_path.display().to_string(),
        ])
        .await
    }

    async fn remove(&self, target: &ExecTarget, remote_path: &str) -> Result<()> {
        self.run(vec![
            "-n".into(),
            target.namespace.clone(),
            "exec".into(),
            target.pod.clone(),
            "--".into(),
            "rm".into(),
            "-f".into(),
            remote_path.to_string(),
        ])
        .await
    }
}
