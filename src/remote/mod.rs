//! Remote execution adapter
//!
//! Runs a task's unit of work as a batch-scheduler job while keeping the
//! engine's view of a single blocking run call: submit, poll until terminal,
//! map the outcome. Cancellation and timeout both propagate to the backend
//! so no job is left running without at least a cancel attempt.
//!
//! Exactly one remote job belongs to one invocation; a retried invocation
//! submits a fresh job.

pub mod backend;
pub mod http;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::GantryError;

use self::backend::{BatchBackend, JobRequest, JobState, JobStatus};

/// Hard floor for the poll interval; never busy-poll below this
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Valid scheduler job names
static JOB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("job name regex is valid"));

/// Characters rejected by schedulers, replaced when deriving a job name
static JOB_NAME_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._\-]+").expect("job name regex is valid"));

/// Derive a scheduler-safe job name from an arbitrary task id
pub fn sanitize_job_name(raw: &str) -> String {
    let cleaned = JOB_NAME_INVALID.replace_all(raw, "-");
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "job".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Poll-loop tuning
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval between status checks (clamped to [`MIN_POLL_INTERVAL`])
    pub interval: Duration,
    /// Backoff cap for transient-failure delays
    pub max_interval: Duration,
    /// Multiplier applied per consecutive poll failure
    pub backoff_multiplier: f64,
    /// Transient poll failures tolerated before escalating
    pub max_poll_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_poll_failures: 5,
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_interval(mut self, max: Duration) -> Self {
        self.max_interval = max;
        self
    }

    pub fn with_max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = failures;
        self
    }

    /// Delay before the next status check after `failures` consecutive
    /// transient poll failures (exponential, capped)
    fn failure_delay(&self, failures: u32) -> Duration {
        let base = self.interval.max(MIN_POLL_INTERVAL).as_millis() as f64;
        let scaled = base * self.backoff_multiplier.powi(failures.saturating_sub(1) as i32);
        let capped = scaled.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Bookkeeping for the one job owned by an invocation
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub job_id: Option<String>,
    pub command: String,
    pub state: JobState,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RemoteJob {
    fn new(command: String) -> Self {
        Self {
            job_id: None,
            command,
            state: JobState::Pending,
            submitted_at: None,
            finished_at: None,
        }
    }
}

/// Submits work to a batch backend and blocks until a terminal state
#[derive(Clone)]
pub struct RemoteExecutor {
    backend: Arc<dyn BatchBackend>,
    poll: PollConfig,
}

impl RemoteExecutor {
    pub fn new(backend: Arc<dyn BatchBackend>) -> Self {
        Self {
            backend,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run one job to completion
    ///
    /// Blocks (from the caller's viewpoint) until the job reaches a terminal
    /// state, the token is cancelled, or `timeout` elapses. Both of the
    /// latter issue a cancel request for the outstanding job.
    #[instrument(skip(self, request, cancel, timeout), fields(backend = %self.backend.name(), job = %request.job_name))]
    pub async fn execute(
        &self,
        request: JobRequest,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<RemoteJob, GantryError> {
        self.validate(&request)?;

        if cancel.is_cancelled() {
            return Err(GantryError::Cancelled {
                job_id: request.job_name.clone(),
            });
        }

        let mut job = RemoteJob::new(request.command.clone());

        let job_id = self
            .backend
            .submit(&request)
            .await
            .map_err(|e| GantryError::Submission {
                backend: self.backend.name().to_string(),
                reason: e.to_string(),
            })?;
        info!(%job_id, "job submitted");
        job.job_id = Some(job_id.clone());
        job.state = JobState::Submitted;
        job.submitted_at = Some(Utc::now());

        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let interval = self.poll.interval.max(MIN_POLL_INTERVAL);
        let mut failures: u32 = 0;

        loop {
            match self.backend.status(&job_id).await {
                Ok(status) => {
                    failures = 0;
                    if status.state != job.state {
                        debug!(%job_id, state = %status.state, "job state changed");
                        job.state = status.state;
                    }
                    if status.state.is_terminal() {
                        job.finished_at = Some(Utc::now());
                        return self.map_terminal(&job_id, status, job);
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(%job_id, attempt = failures, error = %e, "status poll failed");
                    if failures > self.poll.max_poll_failures {
                        return Err(GantryError::Poll {
                            job_id,
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                }
            }

            // Failure retries back off; healthy polls keep the base cadence
            let mut wait = if failures > 0 {
                self.poll.failure_delay(failures)
            } else {
                interval
            };

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    self.cancel_job(&job_id).await;
                    return Err(GantryError::Timeout {
                        job_id,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                wait = wait.min(deadline - now);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancel_job(&job_id).await;
                    return Err(GantryError::Cancelled { job_id });
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn validate(&self, request: &JobRequest) -> Result<(), GantryError> {
        if request.command.trim().is_empty() {
            return Err(GantryError::Submission {
                backend: self.backend.name().to_string(),
                reason: "empty command".to_string(),
            });
        }
        if !JOB_NAME_RE.is_match(&request.job_name) {
            return Err(GantryError::Submission {
                backend: self.backend.name().to_string(),
                reason: format!("invalid job name '{}'", request.job_name),
            });
        }
        Ok(())
    }

    fn map_terminal(
        &self,
        job_id: &str,
        status: JobStatus,
        job: RemoteJob,
    ) -> Result<RemoteJob, GantryError> {
        match status.state {
            JobState::Succeeded => {
                info!(%job_id, "job succeeded");
                Ok(job)
            }
            state => Err(GantryError::RemoteJobFailed {
                job_id: job_id.to_string(),
                state,
                reason: status
                    .reason
                    .unwrap_or_else(|| "no reason reported".to_string()),
            }),
        }
    }

    /// Best-effort cancel; exactly one request per invocation
    async fn cancel_job(&self, job_id: &str) {
        if let Err(e) = self.backend.cancel(job_id).await {
            warn!(%job_id, error = %e, "cancel request failed");
        }
    }
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("backend", &self.backend.name())
            .field("poll", &self.poll)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_job_name("stamp.b"), "stamp.b");
        assert_eq!(sanitize_job_name("align reads/run 1"), "align-reads-run-1");
        assert_eq!(sanitize_job_name("***"), "job");
    }

    #[test]
    fn failure_delay_backs_off_and_caps() {
        let poll = PollConfig::default()
            .with_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(4));

        assert_eq!(poll.failure_delay(1), Duration::from_secs(1));
        assert_eq!(poll.failure_delay(2), Duration::from_secs(2));
        assert_eq!(poll.failure_delay(3), Duration::from_secs(4));
        assert_eq!(poll.failure_delay(4), Duration::from_secs(4));
    }

    #[test]
    fn job_name_validation() {
        let re = &*JOB_NAME_RE;
        assert!(re.is_match("stamp.b-1"));
        assert!(!re.is_match("has space"));
        assert!(!re.is_match(""));
        assert!(!re.is_match("-leading"));
    }
}
