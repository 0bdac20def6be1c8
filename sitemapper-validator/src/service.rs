use crate::error::Result;
use crate::job::{Job, JobState, JobStatus, JobStore};
use crate::validator::Validator;
use chrono::Utc;
use tracing::{error, info, warn};

/// Ties the crawler to on-disk jobs: create, run in the background, track status.
#[derive(Clone)]
pub struct ValidationService {
    validator: Validator,
    jobs: JobStore,
}

impl ValidationService {
    pub fn new(validator: Validator, jobs: JobStore) -> Self {
        Self { validator, jobs }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Create a job and crawl in the background. Returns as soon as the log exists.
    pub async fn start(&self, root_url: &str) -> Result<JobState> {
        let job = self.jobs.create(root_url).await?;
        let state = job.state.clone();

        let service = self.clone();
        tokio::spawn(async move {
            let job_id = job.state.job_id.clone();
            if let Err(e) = service.run(job).await {
                error!(job_id = %job_id, "Validation job failed: {}", e);
            }
        });

        Ok(state)
    }

    /// Create a job and crawl it to completion.
    pub async fn validate(&self, root_url: &str) -> Result<JobState> {
        let job = self.jobs.create(root_url).await?;
        self.run(job).await
    }

    /// Drive a job through running to succeeded or failed, persisting each transition.
    pub async fn run(&self, job: Job) -> Result<JobState> {
        let Job { mut state, log } = job;

        state.status = JobStatus::Running;
        state.updated_at = Utc::now();
        self.jobs.write_status(&state).await?;

        let outcome = self.validator.validate(&state.root_url, &log).await;

        state.summary = log.summary();
        state.updated_at = Utc::now();
        match &outcome {
            Ok(()) => {
                state.status = JobStatus::Succeeded;
                info!(
                    job_id = %state.job_id,
                    rows = state.summary.rows,
                    ok = state.summary.ok,
                    errors = state.summary.errors,
                    "Validation finished"
                );
            }
            Err(e) => {
                state.status = JobStatus::Failed;
                state.error = Some(e.to_string());
            }
        }

        if let Err(e) = self.jobs.write_status(&state).await {
            warn!(job_id = %state.job_id, "Failed to persist job status: {}", e);
        }

        outcome.map(|()| state)
    }
}
