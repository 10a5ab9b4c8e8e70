//! Gantry: port-and-connection wiring for dependency-driven pipelines
//!
//! Tasks declare named in-ports and out-ports; a [`Graph`] records explicit
//! out-to-in connections and resolves them lazily into [`TargetInfo`]
//! locations. The external scheduling engine drives the [`TaskHandle`]
//! contract (`dependencies()`, `output(name)`), and a [`TaskRunner`] executes
//! units of work locally or through a remote batch backend.
//!
//! ```no_run
//! use gantry::{resolvers, Graph, Task};
//!
//! # fn main() -> Result<(), gantry::GantryError> {
//! let graph = Graph::new();
//! let raw = graph.add_task(
//!     Task::new("t1a", "emit").with_out_port("out_data", resolvers::fixed("/data/raw.txt")),
//! )?;
//! let stamp = graph.add_task(
//!     Task::new("b", "stamp")
//!         .with_in_port("in_data")
//!         .with_out_port(
//!             "out_data",
//!             resolvers::from_input("in_data", |loc| format!("{loc}.done")),
//!         ),
//! )?;
//! graph.connect(&raw.out_port("out_data")?, &stamp.in_port("in_data")?)?;
//!
//! let deps = graph.dependencies(stamp.id())?;
//! assert_eq!(deps.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod error;
pub mod graph;
pub mod port;
pub mod remote;
pub mod runner;
pub mod target;
pub mod task;
pub mod template;
pub mod trace;
pub mod workflow;

pub use audit::{AuditLog, AuditRecord, AuditStatus};
pub use error::{FixSuggestion, GantryError};
pub use graph::{Graph, ResolveScope, TaskHandle};
pub use port::{InPort, OutPort, PortKey};
pub use remote::backend::{BatchBackend, JobRequest, JobState, JobStatus};
pub use remote::http::HttpBackend;
pub use remote::mock::MockBackend;
pub use remote::{sanitize_job_name, PollConfig, RemoteExecutor, RemoteJob};
pub use runner::TaskRunner;
pub use target::TargetInfo;
pub use task::{resolvers, OutResolver, RemoteWork, Task, TaskIo, TaskRef, WorkFn, WorkUnit};
pub use workflow::WorkflowTask;
