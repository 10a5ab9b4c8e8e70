//! Error types with fix suggestions

use thiserror::Error;

use crate::remote::backend::JobState;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum GantryError {
    // ─────────────────────────────────────────────────────────────
    // Wiring errors (GTY-010 to GTY-015)
    // ─────────────────────────────────────────────────────────────

    #[error("GTY-010: port '{port}' on task '{task}' is not an {expected} port")]
    PortType {
        task: String,
        port: String,
        expected: &'static str,
    },

    #[error("GTY-011: task '{task}' has no port named '{port}'")]
    UnknownPort { task: String, port: String },

    #[error("GTY-012: in-port '{port}' is already fed by '{existing}'")]
    DuplicateConnection { port: String, existing: String },

    #[error("GTY-013: unknown task '{task}'")]
    UnknownTask { task: String },

    #[error("GTY-014: task '{task}' is already registered")]
    DuplicateTask { task: String },

    #[error("GTY-015: task '{task}' has no param '{key}'")]
    MissingParam { task: String, key: String },

    // ─────────────────────────────────────────────────────────────
    // Resolution errors (GTY-020 to GTY-021)
    // ─────────────────────────────────────────────────────────────

    #[error("GTY-020: in-port '{port}' has no upstream connection")]
    UnconnectedPort { port: String },

    #[error("GTY-021: dependency cycle: {path}")]
    GraphCycle { path: String },

    // ─────────────────────────────────────────────────────────────
    // Expansion errors (GTY-030 to GTY-031)
    // ─────────────────────────────────────────────────────────────

    #[error("GTY-030: re-entrant expansion of workflow '{workflow}'")]
    ReentrantExpansion { workflow: String },

    #[error("GTY-031: workflow '{workflow}' expanded to unknown task '{task}'")]
    ExpansionTarget { workflow: String, task: String },

    // ─────────────────────────────────────────────────────────────
    // Remote execution errors (GTY-040 to GTY-044)
    // ─────────────────────────────────────────────────────────────

    #[error("GTY-040: submission to backend '{backend}' failed: {reason}")]
    Submission { backend: String, reason: String },

    #[error("GTY-041: polling job '{job_id}' failed after {attempts} attempts: {last_error}")]
    Poll {
        job_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("GTY-042: job '{job_id}' was cancelled")]
    Cancelled { job_id: String },

    #[error("GTY-043: remote job '{job_id}' finished {state}: {reason}")]
    RemoteJobFailed {
        job_id: String,
        state: JobState,
        reason: String,
    },

    #[error("GTY-044: job '{job_id}' timed out after {elapsed_ms}ms")]
    Timeout { job_id: String, elapsed_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Local execution errors (GTY-050 to GTY-051)
    // ─────────────────────────────────────────────────────────────

    #[error("GTY-050: template error: {0}")]
    Template(String),

    #[error("GTY-051: execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for GantryError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            GantryError::PortType { .. } => {
                Some("connect() wires an out-port into an in-port - check the port roles")
            }
            GantryError::UnknownPort { .. } => {
                Some("Declare the port with with_in_port()/with_out_port() before wiring it")
            }
            GantryError::DuplicateConnection { .. } => {
                Some("An in-port accepts exactly one upstream - remove the earlier connect()")
            }
            GantryError::UnknownTask { .. } => {
                Some("Register the task on the graph with add_task() before referencing it")
            }
            GantryError::DuplicateTask { .. } => {
                Some("Use unique (name, kind) pairs per task instance")
            }
            GantryError::MissingParam { .. } => {
                Some("Set the param with with_param() when building the task")
            }
            GantryError::UnconnectedPort { .. } => {
                Some("Wire an upstream out-port into this in-port with connect()")
            }
            GantryError::GraphCycle { .. } => {
                Some("Break the cycle - a task's inputs cannot depend on its own outputs")
            }
            GantryError::ReentrantExpansion { .. } => {
                Some("The workflow's assembly function references the workflow itself")
            }
            GantryError::ExpansionTarget { .. } => {
                Some("The assembly function must return a task it registered on the graph")
            }
            GantryError::Submission { .. } => {
                Some("Check the backend endpoint, resource directives, and job name")
            }
            GantryError::Poll { .. } => {
                Some("Check connectivity to the scheduler backend")
            }
            GantryError::Cancelled { .. } => None,
            GantryError::RemoteJobFailed { .. } => {
                Some("Inspect the scheduler's job log for the reported exit status")
            }
            GantryError::Timeout { .. } => {
                Some("Raise the job timeout or check why the job is stuck in queue")
            }
            GantryError::Template { .. } => {
                Some("Use {in.port}, {out.port} or {param.key} placeholders that exist on the task")
            }
            GantryError::Execution(_) => Some("Check the command is valid on this host"),
            GantryError::Io(_) => Some("Check file path and permissions"),
        }
    }
}
