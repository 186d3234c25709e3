//! In-process grading queue.
//!
//! Jobs are handed to a single worker task that materializes the problem's
//! tests, runs the external [`Grader`] against them and cleans up the
//! per-solution scratch directory. Failed jobs are retried with backoff.
//!
//! The queue is API for the judging service that embeds this crate and owns
//! the [`Grader`]. The HTTP server binary does not start one.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use common::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::problems::ProblemService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingJob {
    pub solution_id: Uuid,
    pub problem_id: Uuid,
}

/// Runs a solution against an unpacked tests directory.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, job: &GradingJob, tests_dir: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
#[error("grading worker is not running, job for solution {} dropped", .0.solution_id)]
pub struct QueueClosed(pub GradingJob);

#[derive(Clone)]
pub struct GradingQueue {
    tx: mpsc::Sender<GradingJob>,
}

impl GradingQueue {
    /// Start the worker. It exits once every queue handle is dropped and the
    /// backlog is drained.
    pub fn spawn(
        problems: Arc<ProblemService>,
        grader: Arc<dyn Grader>,
        retry: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, problems, grader, retry));
        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, job: GradingJob) -> Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|e| QueueClosed(e.0))
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<GradingJob>,
    problems: Arc<ProblemService>,
    grader: Arc<dyn Grader>,
    retry: RetryPolicy,
) {
    while let Some(job) = rx.recv().await {
        process_job(&job, &problems, grader.as_ref(), &retry).await;
    }
    info!("Grading worker stopped");
}

async fn process_job(
    job: &GradingJob,
    problems: &ProblemService,
    grader: &dyn Grader,
    retry: &RetryPolicy,
) {
    let mut attempt: u8 = 1;
    loop {
        match grade_once(job, problems, grader).await {
            Ok(()) => {
                info!(
                    solution_id = %job.solution_id,
                    problem_id = %job.problem_id,
                    attempt,
                    "Solution graded"
                );
                return;
            }
            Err(e) if retry.should_retry(attempt) => {
                let delay = retry.delay_after(attempt);
                warn!(
                    solution_id = %job.solution_id,
                    problem_id = %job.problem_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying grading job"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                error!(
                    solution_id = %job.solution_id,
                    problem_id = %job.problem_id,
                    attempts = attempt,
                    error = %e,
                    "Grading failed, giving up"
                );
                return;
            }
        }
    }
}

async fn grade_once(
    job: &GradingJob,
    problems: &ProblemService,
    grader: &dyn Grader,
) -> anyhow::Result<()> {
    let tests_dir = problems
        .prepare_tests(job.problem_id, &job.solution_id.to_string())
        .await?;

    let result = grader.grade(job, &tests_dir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&tests_dir).await {
        warn!(path = %tests_dir.display(), error = %e, "Failed to remove tests directory");
    }
    result
}
