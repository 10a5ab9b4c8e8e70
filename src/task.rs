//! Task nodes
//!
//! A task owns its ports, params, and an optional unit of work. Structure is
//! fixed once the task is registered on a graph; only run-state (owned by the
//! external engine) changes afterwards.
//!
//! Out-ports carry a resolution function supplied by the task author. The
//! function runs lazily, on demand, and may resolve the task's own in-ports
//! through the [`ResolveScope`] it receives - that is how an output location
//! can be derived from an input location without explicit dependency code.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GantryError;
use crate::graph::ResolveScope;
use crate::port::{InPort, OutPort, PortKey};
use crate::target::TargetInfo;

/// Task identity: workflow-assigned instance name + class kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskRef {
    pub name: Arc<str>,
    pub kind: Arc<str>,
}

impl TaskRef {
    pub fn new(name: impl Into<Arc<str>>, kind: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

/// Out-port resolution function
pub type OutResolver =
    Arc<dyn Fn(&mut ResolveScope<'_>) -> Result<TargetInfo, GantryError> + Send + Sync>;

/// In-process unit of work, called with the task's resolved I/O
pub type WorkFn = Arc<dyn Fn(&TaskIo) -> Result<(), GantryError> + Send + Sync>;

/// Remote job descriptor: command plus scheduler resource directives
#[derive(Debug, Clone, Default)]
pub struct RemoteWork {
    /// Command line, may use `{in.port}` / `{out.port}` / `{param.key}` placeholders
    pub command: String,
    /// Scheduler directives (queue/partition, cpus, memory, ...)
    pub resources: HashMap<String, String>,
}

impl RemoteWork {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            resources: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }
}

/// What a task does when the engine decides it must run
#[derive(Clone)]
pub enum WorkUnit {
    /// Shell command executed in-process, with placeholder substitution
    Command(String),
    /// Job submitted to the batch-scheduler backend
    Remote(RemoteWork),
    /// Rust closure over the resolved I/O
    Func(WorkFn),
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkUnit::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            WorkUnit::Remote(rw) => f.debug_tuple("Remote").field(&rw.command).finish(),
            WorkUnit::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Resolved inputs/outputs handed to a unit of work
#[derive(Debug, Clone)]
pub struct TaskIo {
    pub task: TaskRef,
    pub inputs: HashMap<Arc<str>, TargetInfo>,
    pub outputs: HashMap<Arc<str>, TargetInfo>,
    pub params: HashMap<String, Value>,
}

impl TaskIo {
    pub fn input(&self, port: &str) -> Result<&TargetInfo, GantryError> {
        self.inputs.get(port).ok_or_else(|| GantryError::UnknownPort {
            task: self.task.to_string(),
            port: port.to_string(),
        })
    }

    pub fn output(&self, port: &str) -> Result<&TargetInfo, GantryError> {
        self.outputs.get(port).ok_or_else(|| GantryError::UnknownPort {
            task: self.task.to_string(),
            port: port.to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// A unit of the pipeline: ports + params + unit of work
#[derive(Clone)]
pub struct Task {
    id: TaskRef,
    params: HashMap<String, Value>,
    in_ports: Vec<Arc<str>>,
    out_ports: Vec<(Arc<str>, OutResolver)>,
    work: Option<WorkUnit>,
}

impl Task {
    pub fn new(name: impl Into<Arc<str>>, kind: impl Into<Arc<str>>) -> Self {
        Self {
            id: TaskRef::new(name, kind),
            params: HashMap::new(),
            in_ports: Vec::new(),
            out_ports: Vec::new(),
            work: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_in_port(mut self, name: impl Into<Arc<str>>) -> Self {
        self.in_ports.push(name.into());
        self
    }

    pub fn with_out_port(mut self, name: impl Into<Arc<str>>, resolver: OutResolver) -> Self {
        self.out_ports.push((name.into(), resolver));
        self
    }

    pub fn with_work(mut self, work: WorkUnit) -> Self {
        self.work = Some(work);
        self
    }

    pub fn id(&self) -> &TaskRef {
        &self.id
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn params(&self) -> &HashMap<String, Value> {
        &self.params
    }

    pub fn work(&self) -> Option<&WorkUnit> {
        self.work.as_ref()
    }

    pub fn in_port_names(&self) -> &[Arc<str>] {
        &self.in_ports
    }

    pub fn out_port_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.out_ports.iter().map(|(name, _)| name)
    }

    pub fn has_in_port(&self, name: &str) -> bool {
        self.in_ports.iter().any(|p| &**p == name)
    }

    pub fn has_out_port(&self, name: &str) -> bool {
        self.out_ports.iter().any(|(p, _)| &**p == name)
    }

    /// Handle to a declared in-port
    ///
    /// Fails with a port-type error if `name` is actually an out-port, so a
    /// swapped `connect()` call is caught at wiring time.
    pub fn in_port(&self, name: &str) -> Result<InPort, GantryError> {
        if let Some(port) = self.in_ports.iter().find(|p| &***p == name) {
            return Ok(InPort(PortKey {
                task: self.id.clone(),
                port: Arc::clone(port),
            }));
        }
        if self.has_out_port(name) {
            return Err(GantryError::PortType {
                task: self.id.to_string(),
                port: name.to_string(),
                expected: "in",
            });
        }
        Err(GantryError::UnknownPort {
            task: self.id.to_string(),
            port: name.to_string(),
        })
    }

    /// Handle to a declared out-port
    pub fn out_port(&self, name: &str) -> Result<OutPort, GantryError> {
        if let Some((port, _)) = self.out_ports.iter().find(|(p, _)| &**p == name) {
            return Ok(OutPort(PortKey {
                task: self.id.clone(),
                port: Arc::clone(port),
            }));
        }
        if self.has_in_port(name) {
            return Err(GantryError::PortType {
                task: self.id.to_string(),
                port: name.to_string(),
                expected: "out",
            });
        }
        Err(GantryError::UnknownPort {
            task: self.id.to_string(),
            port: name.to_string(),
        })
    }

    pub(crate) fn out_resolver(&self, name: &str) -> Option<OutResolver> {
        self.out_ports
            .iter()
            .find(|(p, _)| &**p == name)
            .map(|(_, r)| Arc::clone(r))
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("in_ports", &self.in_ports)
            .field(
                "out_ports",
                &self.out_ports.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .field("work", &self.work)
            .finish()
    }
}

/// Constructors for the common out-port resolution shapes
pub mod resolvers {
    use super::*;

    /// Output lives at a fixed location
    pub fn fixed(location: impl Into<String>) -> OutResolver {
        let location: Arc<str> = Arc::from(location.into());
        Arc::new(move |scope| {
            Ok(TargetInfo::new(
                scope.task().clone(),
                Arc::clone(&location),
            ))
        })
    }

    /// Output location comes from a string param on the task
    pub fn from_param(key: impl Into<String>) -> OutResolver {
        let key = key.into();
        Arc::new(move |scope| {
            let task = scope.task().clone();
            let value = scope
                .param(&key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| GantryError::MissingParam {
                    task: task.to_string(),
                    key: key.clone(),
                })?;
            Ok(TargetInfo::new(task, value))
        })
    }

    /// Output location derived from one of the task's own inputs
    ///
    /// Resolving the input walks the connection graph, so the upstream task's
    /// resolution runs first - no explicit dependency code needed.
    pub fn from_input(
        port: impl Into<String>,
        map: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> OutResolver {
        let port = port.into();
        Arc::new(move |scope| {
            let upstream = scope.input(&port)?;
            let location = map(&upstream.location);
            Ok(TargetInfo::new(scope.task().clone(), location))
        })
    }
}
