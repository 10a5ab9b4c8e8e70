//! Task invocation
//!
//! `TaskRunner` is the entry point the external engine drives when it has
//! decided a task must run. Every in-port and out-port is resolved before
//! the unit of work starts, the command is rendered against that I/O, and
//! exactly one audit record is emitted per completed invocation.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::audit::{AuditLog, AuditRecord, AuditStatus};
use crate::error::GantryError;
use crate::graph::Graph;
use crate::remote::backend::JobRequest;
use crate::remote::{sanitize_job_name, RemoteExecutor};
use crate::task::{Task, TaskIo, TaskRef, WorkUnit};
use crate::template;

/// Default timeout for local shell commands
const LOCAL_EXEC_TIMEOUT: Duration = Duration::from_secs(3600);

/// Executes units of work: local commands, remote jobs, closures
#[derive(Clone)]
pub struct TaskRunner {
    remote: Option<RemoteExecutor>,
    audit: AuditLog,
    local_timeout: Duration,
    job_timeout: Option<Duration>,
}

impl TaskRunner {
    pub fn new(audit: AuditLog) -> Self {
        Self {
            remote: None,
            audit,
            local_timeout: LOCAL_EXEC_TIMEOUT,
            job_timeout: None,
        }
    }

    /// Enable remote work units through the given executor
    pub fn with_remote(mut self, remote: RemoteExecutor) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Upper bound on one remote job; on expiry the job is cancelled
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Run one task to completion
    ///
    /// Success is a normal return; failure carries a descriptive error the
    /// engine surfaces in its own run report.
    #[instrument(skip(self, graph, cancel), fields(task = %id))]
    pub async fn run(
        &self,
        graph: &Graph,
        id: &TaskRef,
        cancel: &CancellationToken,
    ) -> Result<(), GantryError> {
        let task = graph.concrete(id)?;
        // all in-ports resolve before the work starts
        let io = graph.task_io(task.id())?;

        let command = match task.work() {
            Some(WorkUnit::Command(cmd)) => template::render(cmd, &io)?,
            Some(WorkUnit::Remote(rw)) => template::render(&rw.command, &io)?,
            Some(WorkUnit::Func(_)) => "<fn>".to_string(),
            None => String::new(),
        };

        let started = Utc::now();
        let result = self.dispatch(&task, &io, &command, cancel).await;
        let finished = Utc::now();

        self.audit.record(AuditRecord {
            task_id: task.id().to_string(),
            command,
            started_at: started,
            finished_at: finished,
            status: if result.is_ok() {
                AuditStatus::Succeeded
            } else {
                AuditStatus::Failed
            },
        });

        result
    }

    async fn dispatch(
        &self,
        task: &Task,
        io: &TaskIo,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GantryError> {
        match task.work() {
            None => Ok(()),
            Some(WorkUnit::Func(f)) => (**f)(io),
            Some(WorkUnit::Command(_)) => self.run_local(task.id(), command, cancel).await,
            Some(WorkUnit::Remote(rw)) => {
                let remote = self.remote.as_ref().ok_or_else(|| {
                    GantryError::Execution(format!(
                        "task '{}' declares remote work but no remote executor is configured",
                        task.id()
                    ))
                })?;
                let mut request =
                    JobRequest::new(command, sanitize_job_name(&task.id().to_string()));
                request.resources = rw.resources.clone();
                remote
                    .execute(request, cancel, self.job_timeout)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn run_local(
        &self,
        id: &TaskRef,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GantryError> {
        debug!(%command, "running local command");
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GantryError::Cancelled {
                    job_id: format!("local/{id}"),
                });
            }
            result = tokio::time::timeout(
                self.local_timeout,
                tokio::process::Command::new("sh").arg("-c").arg(command).output(),
            ) => {
                result
                    .map_err(|_| {
                        GantryError::Execution(format!(
                            "command timed out after {}s",
                            self.local_timeout.as_secs()
                        ))
                    })?
                    .map_err(|e| {
                        GantryError::Execution(format!("failed to execute command: {e}"))
                    })?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GantryError::Execution(format!(
                "command failed with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("remote", &self.remote)
            .field("local_timeout", &self.local_timeout)
            .field("job_timeout", &self.job_timeout)
            .finish()
    }
}
