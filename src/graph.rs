//! Connection registry and lazy dependency resolution
//!
//! The graph records explicit out-port -> in-port edges and resolves them on
//! demand, pull-based: nothing is computed at connect time because an
//! upstream location may depend on params or prior-stage computation that is
//! not available when the graph is wired.
//!
//! Resolution state (memo + cycle stack) is request-scoped: each top-level
//! `resolve`/`dependencies`/`output` call gets its own [`ResolveCtx`], so
//! concurrent resolution of different tasks shares no mutable state.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::GantryError;
use crate::port::{InPort, OutPort, PortKey};
use crate::target::TargetInfo;
use crate::task::{Task, TaskIo, TaskRef};
use crate::workflow::WorkflowTask;

/// A registered node: a concrete task or a workflow stand-in
#[derive(Clone)]
pub(crate) enum Node {
    Task(Arc<Task>),
    Workflow(Arc<WorkflowTask>),
}

impl Node {
    fn id(&self) -> &TaskRef {
        match self {
            Node::Task(t) => t.id(),
            Node::Workflow(w) => w.id(),
        }
    }
}

/// Port/connection registry plus the dependency resolver
#[derive(Default)]
pub struct Graph {
    nodes: DashMap<TaskRef, Node>,
    /// in-port -> out-port feeding it (at most one upstream per in-port)
    connections: DashMap<PortKey, PortKey>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete task, returning a shared handle for wiring
    pub fn add_task(&self, task: Task) -> Result<Arc<Task>, GantryError> {
        let arc = Arc::new(task);
        self.insert_node(Node::Task(Arc::clone(&arc)))?;
        Ok(arc)
    }

    /// Register a workflow task (sub-graph assembled lazily on first access)
    pub fn add_workflow(&self, workflow: WorkflowTask) -> Result<Arc<WorkflowTask>, GantryError> {
        let arc = Arc::new(workflow);
        self.insert_node(Node::Workflow(Arc::clone(&arc)))?;
        Ok(arc)
    }

    fn insert_node(&self, node: Node) -> Result<(), GantryError> {
        use dashmap::mapref::entry::Entry;

        match self.nodes.entry(node.id().clone()) {
            Entry::Occupied(e) => Err(GantryError::DuplicateTask {
                task: e.key().to_string(),
            }),
            Entry::Vacant(v) => {
                v.insert(node);
                Ok(())
            }
        }
    }

    pub fn contains(&self, id: &TaskRef) -> bool {
        self.nodes.contains_key(id)
    }

    fn node(&self, id: &TaskRef) -> Result<Node, GantryError> {
        self.nodes
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| GantryError::UnknownTask {
                task: id.to_string(),
            })
    }

    /// Follow workflow proxies down to the concrete task
    ///
    /// First touch of a workflow node triggers its (idempotent) expansion.
    pub(crate) fn concrete(&self, id: &TaskRef) -> Result<Arc<Task>, GantryError> {
        let mut current = id.clone();
        let mut seen: Vec<TaskRef> = Vec::new();
        loop {
            match self.node(&current)? {
                Node::Task(task) => return Ok(task),
                Node::Workflow(wf) => {
                    if seen.contains(&current) {
                        let mut path: Vec<String> =
                            seen.iter().map(ToString::to_string).collect();
                        path.push(current.to_string());
                        return Err(GantryError::GraphCycle {
                            path: path.join(" -> "),
                        });
                    }
                    seen.push(current.clone());
                    current = wf.expand(self)?;
                }
            }
        }
    }

    /// Record the edge out-port -> in-port
    ///
    /// Fan-out is allowed (one out-port feeding many in-ports); a second
    /// upstream on an already-connected in-port is rejected.
    pub fn connect(&self, source: &OutPort, target: &InPort) -> Result<(), GantryError> {
        use dashmap::mapref::entry::Entry;

        let src = self.canonical_out(source.key())?;
        let dst = self.canonical_in(target.key())?;

        match self.connections.entry(dst) {
            Entry::Occupied(e) => Err(GantryError::DuplicateConnection {
                port: e.key().to_string(),
                existing: e.get().to_string(),
            }),
            Entry::Vacant(v) => {
                debug!(source = %src, target = %v.key(), "connected");
                v.insert(src);
                Ok(())
            }
        }
    }

    /// Name-based wiring; validates port roles, so swapped arguments fail
    /// with a port-type error instead of silently mis-wiring.
    pub fn connect_by_name(
        &self,
        source_task: &TaskRef,
        source_port: &str,
        target_task: &TaskRef,
        target_port: &str,
    ) -> Result<(), GantryError> {
        let source = self.concrete(source_task)?.out_port(source_port)?;
        let target = self.concrete(target_task)?.in_port(target_port)?;
        self.connect(&source, &target)
    }

    /// Rewrite a port key through any workflow proxy and check the port role
    fn canonical_in(&self, key: &PortKey) -> Result<PortKey, GantryError> {
        let task = self.concrete(&key.task)?;
        Ok(task.in_port(&key.port)?.key().clone())
    }

    fn canonical_out(&self, key: &PortKey) -> Result<PortKey, GantryError> {
        let task = self.concrete(&key.task)?;
        Ok(task.out_port(&key.port)?.key().clone())
    }

    /// Resolve an in-port to the TargetInfo its upstream out-port produces
    pub fn resolve(&self, port: &InPort) -> Result<TargetInfo, GantryError> {
        let key = self.canonical_in(port.key())?;
        let mut ctx = ResolveCtx::default();
        self.resolve_in(&key, &mut ctx)
    }

    /// Resolve a named out-port of a task (the engine's `output(name)`)
    pub fn output(&self, id: &TaskRef, port: &str) -> Result<TargetInfo, GantryError> {
        let key = PortKey::new(id.clone(), port);
        let mut ctx = ResolveCtx::default();
        self.resolve_out(&key, &mut ctx)
    }

    /// Aggregate upstream targets of a task, deduplicated by (owner, location)
    ///
    /// A task with zero in-ports yields the empty set: a graph root.
    pub fn dependencies(&self, id: &TaskRef) -> Result<BTreeSet<TargetInfo>, GantryError> {
        let task = self.concrete(id)?;
        let mut ctx = ResolveCtx::default();
        let mut deps = BTreeSet::new();
        for port in task.in_port_names() {
            let key = PortKey {
                task: task.id().clone(),
                port: Arc::clone(port),
            };
            deps.insert(self.resolve_in(&key, &mut ctx)?);
        }
        Ok(deps)
    }

    /// Resolve every declared port of a task in one pass
    ///
    /// This is what the runner hands to a unit of work; it also enforces the
    /// ordering guarantee that all in-ports resolve before the task runs.
    pub fn task_io(&self, id: &TaskRef) -> Result<TaskIo, GantryError> {
        let task = self.concrete(id)?;
        let mut ctx = ResolveCtx::default();

        let mut inputs = HashMap::new();
        for port in task.in_port_names() {
            let key = PortKey {
                task: task.id().clone(),
                port: Arc::clone(port),
            };
            inputs.insert(Arc::clone(port), self.resolve_in(&key, &mut ctx)?);
        }

        let mut outputs = HashMap::new();
        for port in task.out_port_names() {
            let key = PortKey {
                task: task.id().clone(),
                port: Arc::clone(port),
            };
            outputs.insert(Arc::clone(port), self.resolve_out(&key, &mut ctx)?);
        }

        Ok(TaskIo {
            task: task.id().clone(),
            inputs,
            outputs,
            params: task.params().clone(),
        })
    }

    /// Engine-facing handle for a registered task
    pub fn handle(self: &Arc<Self>, id: &TaskRef) -> Result<TaskHandle, GantryError> {
        if !self.contains(id) {
            return Err(GantryError::UnknownTask {
                task: id.to_string(),
            });
        }
        Ok(TaskHandle {
            graph: Arc::clone(self),
            task: id.clone(),
        })
    }

    pub(crate) fn resolve_in(
        &self,
        key: &PortKey,
        ctx: &mut ResolveCtx,
    ) -> Result<TargetInfo, GantryError> {
        if !ctx.enter(key) {
            return Err(ctx.cycle_error(key));
        }
        let upstream = self.connections.get(key).map(|r| r.value().clone());
        let result = match upstream {
            Some(up) => self.resolve_out(&up, ctx),
            None => Err(GantryError::UnconnectedPort {
                port: key.to_string(),
            }),
        };
        ctx.leave(key);
        result
    }

    fn resolve_out(&self, key: &PortKey, ctx: &mut ResolveCtx) -> Result<TargetInfo, GantryError> {
        // Workflow proxies forward verbatim to their chosen internal node
        let key = self.canonical_out(key)?;

        if let Some(hit) = ctx.memo.get(&key) {
            return Ok(hit.clone());
        }
        if !ctx.enter(&key) {
            return Err(ctx.cycle_error(&key));
        }

        let result = match self.concrete(&key.task) {
            Ok(task) => match task.out_resolver(&key.port) {
                Some(resolver) => {
                    let mut scope = ResolveScope {
                        graph: self,
                        task: Arc::clone(&task),
                        ctx: &mut *ctx,
                    };
                    (*resolver)(&mut scope)
                }
                None => Err(GantryError::UnknownPort {
                    task: key.task.to_string(),
                    port: key.port.to_string(),
                }),
            },
            Err(e) => Err(e),
        };

        ctx.leave(&key);
        let info = result?;
        debug!(port = %key, target = %info, "resolved");
        ctx.memo.insert(key, info.clone());
        Ok(info)
    }
}

/// Request-scoped resolution state: memo cache + cycle-detection stack
#[derive(Default)]
pub(crate) struct ResolveCtx {
    stack: Vec<PortKey>,
    visiting: HashSet<PortKey>,
    memo: HashMap<PortKey, TargetInfo>,
}

impl ResolveCtx {
    /// Returns false if the port is already on the current walk (a cycle)
    fn enter(&mut self, key: &PortKey) -> bool {
        if self.visiting.insert(key.clone()) {
            self.stack.push(key.clone());
            true
        } else {
            false
        }
    }

    fn leave(&mut self, key: &PortKey) {
        self.visiting.remove(key);
        self.stack.pop();
    }

    fn cycle_error(&self, key: &PortKey) -> GantryError {
        let mut path: Vec<String> = self.stack.iter().map(ToString::to_string).collect();
        path.push(key.to_string());
        GantryError::GraphCycle {
            path: path.join(" -> "),
        }
    }
}

/// View handed to an out-port resolution function
///
/// Lets the resolver read the owning task's params and pull its own in-ports
/// through the same request-scoped resolution pass.
pub struct ResolveScope<'a> {
    graph: &'a Graph,
    task: Arc<Task>,
    ctx: &'a mut ResolveCtx,
}

impl ResolveScope<'_> {
    /// Identity of the task whose out-port is being resolved
    pub fn task(&self) -> &TaskRef {
        self.task.id()
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.task.param(key)
    }

    /// Resolve one of the owning task's in-ports
    pub fn input(&mut self, port: &str) -> Result<TargetInfo, GantryError> {
        let handle = self.task.in_port(port)?;
        self.graph.resolve_in(handle.key(), self.ctx)
    }
}

/// The contract the external engine drives: no-argument `dependencies()`,
/// `output(name)` per declared out-port, plus resolved I/O for the run call.
#[derive(Clone)]
pub struct TaskHandle {
    graph: Arc<Graph>,
    task: TaskRef,
}

impl TaskHandle {
    pub fn id(&self) -> &TaskRef {
        &self.task
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn dependencies(&self) -> Result<BTreeSet<TargetInfo>, GantryError> {
        self.graph.dependencies(&self.task)
    }

    pub fn output(&self, port: &str) -> Result<TargetInfo, GantryError> {
        self.graph.output(&self.task, port)
    }

    pub fn task_io(&self) -> Result<TaskIo, GantryError> {
        self.graph.task_io(&self.task)
    }
}
