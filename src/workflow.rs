//! Workflow tasks
//!
//! A `WorkflowTask` is a task whose body is a graph-assembly function. On
//! first access it builds an internal sub-graph of ordinary tasks and picks
//! exactly one of them as its externally visible proxy; every later
//! dependency/output query against the workflow is forwarded verbatim to
//! that node.
//!
//! Expansion is `Unexpanded -> Expanding -> Expanded`, idempotent, and pure
//! graph construction - no blocking I/O. An assembly function that reaches
//! back into its own workflow trips the `Expanding` guard.

use parking_lot::Mutex;
use tracing::debug;

use crate::error::GantryError;
use crate::graph::Graph;
use crate::task::TaskRef;

type AssembleFn = Box<dyn Fn(&Graph) -> Result<TaskRef, GantryError> + Send + Sync>;

enum ExpansionState {
    Unexpanded,
    Expanding,
    Expanded(TaskRef),
}

/// A task that stands in for a lazily assembled sub-pipeline
pub struct WorkflowTask {
    id: TaskRef,
    assemble: AssembleFn,
    state: Mutex<ExpansionState>,
}

impl WorkflowTask {
    pub fn new(
        name: impl Into<std::sync::Arc<str>>,
        kind: impl Into<std::sync::Arc<str>>,
        assemble: impl Fn(&Graph) -> Result<TaskRef, GantryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: TaskRef::new(name, kind),
            assemble: Box::new(assemble),
            state: Mutex::new(ExpansionState::Unexpanded),
        }
    }

    pub fn id(&self) -> &TaskRef {
        &self.id
    }

    pub fn is_expanded(&self) -> bool {
        matches!(&*self.state.lock(), ExpansionState::Expanded(_))
    }

    /// Run the assembly function once and cache the chosen proxy node
    ///
    /// Wiring is single-threaded by contract; a second expansion attempt
    /// observed mid-flight is reported as re-entrancy.
    pub(crate) fn expand(&self, graph: &Graph) -> Result<TaskRef, GantryError> {
        {
            let mut state = self.state.lock();
            match &*state {
                ExpansionState::Expanded(proxy) => return Ok(proxy.clone()),
                ExpansionState::Expanding => {
                    return Err(GantryError::ReentrantExpansion {
                        workflow: self.id.to_string(),
                    })
                }
                ExpansionState::Unexpanded => *state = ExpansionState::Expanding,
            }
        }

        let result = (self.assemble)(graph);

        let mut state = self.state.lock();
        match result {
            Ok(proxy) => {
                if !graph.contains(&proxy) {
                    *state = ExpansionState::Unexpanded;
                    return Err(GantryError::ExpansionTarget {
                        workflow: self.id.to_string(),
                        task: proxy.to_string(),
                    });
                }
                debug!(workflow = %self.id, proxy = %proxy, "expanded");
                *state = ExpansionState::Expanded(proxy.clone());
                Ok(proxy)
            }
            Err(e) => {
                *state = ExpansionState::Unexpanded;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for WorkflowTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTask")
            .field("id", &self.id)
            .field("expanded", &self.is_expanded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{resolvers, Task};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn pair_workflow(expansions: Arc<AtomicU32>) -> WorkflowTask {
        WorkflowTask::new("prep", "workflow", move |graph: &Graph| {
            expansions.fetch_add(1, Ordering::SeqCst);
            let a = graph.add_task(
                Task::new("prep_fetch", "fetch")
                    .with_out_port("out_data", resolvers::fixed("/x/raw.txt")),
            )?;
            let b = graph.add_task(
                Task::new("prep_clean", "clean")
                    .with_in_port("in_data")
                    .with_out_port(
                        "out_data",
                        resolvers::from_input("in_data", |loc| format!("{loc}.clean")),
                    ),
            )?;
            graph.connect(&a.out_port("out_data")?, &b.in_port("in_data")?)?;
            Ok(b.id().clone())
        })
    }

    #[test]
    fn expansion_is_lazy_and_idempotent() {
        let graph = Graph::new();
        let count = Arc::new(AtomicU32::new(0));
        let wf = graph.add_workflow(pair_workflow(Arc::clone(&count))).unwrap();

        assert!(!wf.is_expanded());
        assert_eq!(count.load(Ordering::SeqCst), 0, "nothing runs at add time");

        let first = graph.dependencies(wf.id()).unwrap();
        let second = graph.dependencies(wf.id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(count.load(Ordering::SeqCst), 1, "expanded at most once");
        assert!(wf.is_expanded());
    }

    #[test]
    fn queries_forward_to_proxy_node() {
        let graph = Graph::new();
        let count = Arc::new(AtomicU32::new(0));
        let wf = graph.add_workflow(pair_workflow(count)).unwrap();

        let out = graph.output(wf.id(), "out_data").unwrap();
        assert_eq!(&*out.location, "/x/raw.txt.clean");
        assert_eq!(out.owner, TaskRef::new("prep_clean", "clean"));

        let deps = graph.dependencies(wf.id()).unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps
            .iter()
            .all(|t| t.owner == TaskRef::new("prep_fetch", "fetch")));
    }

    #[test]
    fn downstream_tasks_can_wire_against_the_workflow() {
        let graph = Graph::new();
        let count = Arc::new(AtomicU32::new(0));
        let wf = graph.add_workflow(pair_workflow(count)).unwrap();
        let sink = graph
            .add_task(Task::new("sink", "archive").with_in_port("in_data"))
            .unwrap();

        graph
            .connect_by_name(wf.id(), "out_data", sink.id(), "in_data")
            .unwrap();

        let deps = graph.dependencies(sink.id()).unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps
            .iter()
            .all(|t| &*t.location == "/x/raw.txt.clean"));
    }

    #[test]
    fn self_referencing_assembly_is_reentrant() {
        let graph = Graph::new();
        let id = TaskRef::new("oops", "workflow");
        let wf = graph
            .add_workflow(WorkflowTask::new("oops", "workflow", move |graph: &Graph| {
                // touches its own workflow node mid-assembly
                graph.dependencies(&id).map(|_| TaskRef::new("never", "never"))
            }))
            .unwrap();

        let err = graph.dependencies(wf.id()).unwrap_err();
        assert!(matches!(err, GantryError::ReentrantExpansion { .. }));
    }

    #[test]
    fn proxy_must_be_registered() {
        let graph = Graph::new();
        let wf = graph
            .add_workflow(WorkflowTask::new("ghostly", "workflow", |_: &Graph| {
                Ok(TaskRef::new("ghost", "emit"))
            }))
            .unwrap();

        let err = graph.dependencies(wf.id()).unwrap_err();
        assert!(matches!(err, GantryError::ExpansionTarget { .. }));
    }

    #[test]
    fn workflow_returning_itself_is_a_cycle() {
        let graph = Graph::new();
        let id = TaskRef::new("snake", "workflow");
        let returned = id.clone();
        graph
            .add_workflow(WorkflowTask::new("snake", "workflow", move |_: &Graph| {
                Ok(returned.clone())
            }))
            .unwrap();

        let err = graph.dependencies(&id).unwrap_err();
        assert!(matches!(err, GantryError::GraphCycle { .. }));
    }
}
