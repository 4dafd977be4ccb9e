//! Background build jobs.
//!
//! A job is created per build request and updated as the pipeline runs. While
//! a project has a queued or running job, further build requests for it
//! return that job instead of starting a second pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stackvo_core::UnitName;

use crate::build::{BuildFailure, BuildResult, BuildStage};
use crate::error::OrchestratorError;

/// Finished jobs kept for polling; older ones are evicted on each finish.
pub const MAX_FINISHED_JOBS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Pollable snapshot of one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: String,
    pub project: UnitName,
    pub status: JobStatus,
    pub stage: Option<BuildStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BuildResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    job: BuildJob,
    cancel: CancellationToken,
    finish_seq: Option<u64>,
}

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, JobEntry>>,
    finished: AtomicU64,
    changed: Notify,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a build for `project`.
    ///
    /// Returns the new job with its cancellation token, or the in-flight job
    /// for the same project with `None`.
    pub fn enqueue(&self, project: &UnitName) -> (BuildJob, Option<CancellationToken>) {
        let mut jobs = self.lock();
        if let Some(existing) = jobs
            .values()
            .find(|e| &e.job.project == project && !e.job.status.is_finished())
        {
            return (existing.job.clone(), None);
        }

        let job = BuildJob {
            id: Uuid::new_v4().to_string(),
            project: project.clone(),
            status: JobStatus::Queued,
            stage: None,
            result: None,
            error: None,
            error_kind: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let cancel = CancellationToken::new();
        jobs.insert(
            job.id.clone(),
            JobEntry {
                job: job.clone(),
                cancel: cancel.clone(),
                finish_seq: None,
            },
        );
        (job, Some(cancel))
    }

    pub fn get(&self, id: &str) -> Option<BuildJob> {
        self.lock().get(id).map(|e| e.job.clone())
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<BuildJob> {
        let mut jobs: Vec<_> = self.lock().values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn mark_running(&self, id: &str) {
        self.update(id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
        });
    }

    pub fn set_stage(&self, id: &str, stage: BuildStage) {
        self.update(id, |job| job.stage = Some(stage));
    }

    /// Record the pipeline outcome, evict old finished jobs and wake waiters.
    ///
    /// Failed and cancelled jobs keep the stages that ran, so the failing
    /// stage's full output stays pollable.
    pub fn finish(&self, id: &str, outcome: Result<BuildResult, BuildFailure>) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.finish_seq = Some(self.finished.fetch_add(1, Ordering::Relaxed));
        }
        self.update(id, |job| {
            job.finished_at = Some(Utc::now());
            match outcome {
                Ok(result) => {
                    job.status = JobStatus::Succeeded;
                    job.result = Some(result);
                }
                Err(BuildFailure { error, partial }) => {
                    job.status = match error {
                        OrchestratorError::Cancelled => JobStatus::Cancelled,
                        _ => JobStatus::Failed,
                    };
                    job.error_kind = Some(error.kind().to_string());
                    job.error = Some(error.to_string());
                    job.result = partial;
                }
            }
        });
        self.evict_finished();
    }

    /// Request cancellation of an unfinished job.
    pub fn cancel(&self, id: &str) -> Result<BuildJob, OrchestratorError> {
        let jobs = self.lock();
        let entry = jobs
            .get(id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {id}")))?;
        if entry.job.status.is_finished() {
            return Err(OrchestratorError::InvalidRequest(format!(
                "job {id} already finished"
            )));
        }
        entry.cancel.cancel();
        Ok(entry.job.clone())
    }

    /// Resolve once job `id` has finished; `None` if it does not exist.
    pub async fn wait(&self, id: &str) -> Option<BuildJob> {
        loop {
            let notified = self.changed.notified();
            match self.get(id) {
                None => return None,
                Some(job) if job.status.is_finished() => return Some(job),
                Some(_) => notified.await,
            }
        }
    }

    /// Drop the oldest finished jobs beyond [`MAX_FINISHED_JOBS`].
    fn evict_finished(&self) {
        let mut jobs = self.lock();
        let mut finished: Vec<(u64, String)> = jobs
            .values()
            .filter_map(|e| e.finish_seq.map(|seq| (seq, e.job.id.clone())))
            .collect();
        if finished.len() <= MAX_FINISHED_JOBS {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() - MAX_FINISHED_JOBS;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut BuildJob)) {
        if let Some(entry) = self.lock().get_mut(id) {
            f(&mut entry.job);
        }
        self.changed.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
