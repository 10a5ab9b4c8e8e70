//! Port identities
//!
//! A port is a named socket on a task standing in for one artifact slot.
//! Handles are cheap (Arc<str> keys); the wiring itself lives in the graph's
//! connection registry, never on the port.

use std::sync::Arc;

use crate::task::TaskRef;

/// Identity of a port: owning task + port name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortKey {
    pub task: TaskRef,
    pub port: Arc<str>,
}

impl PortKey {
    pub fn new(task: TaskRef, port: impl Into<Arc<str>>) -> Self {
        Self {
            task,
            port: port.into(),
        }
    }
}

impl std::fmt::Display for PortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.task, self.port)
    }
}

/// Handle to an input slot on a task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InPort(pub(crate) PortKey);

/// Handle to an output slot on a task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPort(pub(crate) PortKey);

impl InPort {
    pub fn key(&self) -> &PortKey {
        &self.0
    }

    pub fn task(&self) -> &TaskRef {
        &self.0.task
    }

    pub fn name(&self) -> &str {
        &self.0.port
    }
}

impl OutPort {
    pub fn key(&self) -> &PortKey {
        &self.0
    }

    pub fn task(&self) -> &TaskRef {
        &self.0.task
    }

    pub fn name(&self) -> &str {
        &self.0.port
    }
}

impl std::fmt::Display for InPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for OutPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
