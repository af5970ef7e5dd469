//! Recurring dump scheduler
//!
//! An explicitly constructed registrar for cron-driven dump jobs, owned by
//! the shared controller context and created once at process start. Each
//! registered job runs in its own tokio task that sleeps until the next
//! cron firing and then invokes the workflow; registering under an existing
//! key replaces (and aborts) the previous job.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::info;

struct ScheduledJob {
    expression: String,
    handle: JoinHandle<()>,
}

impl Drop for ScheduledJob {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Registrar for recurring dump jobs, keyed by resource identity
#[derive(Default)]
pub struct DumpScheduler {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
}

impl DumpScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` to fire on every upcoming occurrence of `schedule`.
    ///
    /// Nothing runs at registration time; the first execution happens at the
    /// next cron firing. An existing job under the same key is replaced.
    pub fn register<F, Fut>(&self, key: &str, expression: &str, schedule: Schedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let wait = match (next - Utc::now()).to_std() {
                    Ok(wait) => wait,
                    // already past due, fire immediately
                    Err(_) => std::time::Duration::ZERO,
                };
                tokio::time::sleep(wait).await;
                job().await;
            }
        });

        let mut jobs = self.jobs.lock().unwrap();
        if jobs
            .insert(
                key.to_string(),
                ScheduledJob {
                    expression: expression.to_string(),
                    handle,
                },
            )
            .is_some()
        {
            info!(key = %key, schedule = %expression, "replaced recurring dump job");
        } else {
            info!(key = %key, schedule = %expression, "registered recurring dump job");
        }
    }

    /// Remove and stop the job registered under `key`, if any
    pub fn deregister(&self, key: &str) -> bool {
        self.jobs.lock().unwrap().remove(key).is_some()
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(key)
    }

    /// Cron expression of the registered job, if any
    pub fn expression(&self, key: &str) -> Option<String> {
        self.jobs
            .lock()
            .unwrap()
            .get(key)
            .map(|j| j.expression.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
