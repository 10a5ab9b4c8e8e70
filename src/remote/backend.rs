//! Batch-scheduler backend contract
//!
//! Three operations: submit, status, cancel. The wire format is backend
//! specific; implementations return `anyhow::Result` and the executor maps
//! failures into `GantryError` at the boundary.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// Lifecycle of one remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states stop the poll loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One status observation: state plus whatever the backend reports about it
/// (exit status, log excerpt)
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub reason: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(state: JobState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
        }
    }
}

/// Submission request: command + scheduler directives + job name
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub command: String,
    pub job_name: String,
    pub resources: HashMap<String, String>,
}

impl JobRequest {
    pub fn new(command: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            job_name: job_name.into(),
            resources: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }
}

/// Abstract scheduler backend so alternates can be substituted
#[async_trait]
pub trait BatchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a job; returns the backend-assigned job identifier
    async fn submit(&self, request: &JobRequest) -> Result<String>;

    /// Query current status of a job
    async fn status(&self, job_id: &str) -> Result<JobStatus>;

    /// Ask the backend to cancel an outstanding job
    async fn cancel(&self, job_id: &str) -> Result<()>;
}
