//! Mock batch backend for testing
//!
//! Scripted status responses without a real scheduler. Records every
//! submit/cancel call for assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::backend::{BatchBackend, JobRequest, JobState, JobStatus};

/// Mock backend driven by a FIFO of scripted status observations
pub struct MockBackend {
    /// Queue of status responses; `Err` entries simulate transient poll failures
    script: Mutex<VecDeque<Result<JobStatus, String>>>,
    /// Default status once the script is exhausted
    default_status: JobStatus,
    /// All submissions made (for assertions)
    submissions: Mutex<Vec<JobRequest>>,
    /// All cancel calls made (for assertions)
    cancels: Mutex<Vec<String>>,
    /// Whether the next submit is rejected
    reject_submit: Mutex<Option<String>>,
    next_job_id: AtomicU64,
}

impl MockBackend {
    /// Backend whose jobs succeed on the first status check
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_status: JobStatus::new(JobState::Succeeded),
            submissions: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            reject_submit: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
        }
    }

    /// Backend that plays back the given states in order, then the default
    pub fn with_states(states: impl IntoIterator<Item = JobStatus>) -> Self {
        let backend = Self::new();
        {
            let mut script = backend.script.lock().unwrap();
            script.extend(states.into_iter().map(Ok));
        }
        backend
    }

    /// Set the status returned once the script is exhausted
    pub fn with_default_status(mut self, status: JobStatus) -> Self {
        self.default_status = status;
        self
    }

    /// Queue one scripted status observation
    pub fn queue_status(&self, status: JobStatus) {
        self.script.lock().unwrap().push_back(Ok(status));
    }

    /// Queue one transient poll failure
    pub fn queue_poll_failure(&self, message: impl Into<String>) {
        self.script.lock().unwrap().push_back(Err(message.into()));
    }

    /// Make the next submit fail
    pub fn reject_next_submit(&self, reason: impl Into<String>) {
        *self.reject_submit.lock().unwrap() = Some(reason.into());
    }

    pub fn submissions(&self) -> Vec<JobRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn status_calls_remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &JobRequest) -> Result<String> {
        if let Some(reason) = self.reject_submit.lock().unwrap().take() {
            bail!("{reason}");
        }
        self.submissions.lock().unwrap().push(request.clone());
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-{id}"))
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => bail!("{message}"),
            None => Ok(self.default_status.clone()),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        self.cancels.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}
