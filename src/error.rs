//! Definition and execution error types.

use std::fmt;
use thiserror::Error;

/// Errors raised while defining or compiling a graph.
///
/// Definition errors are caller-fixable and always abort [`compile`]:
/// a failed compile never produces a usable [`CompiledGraph`].
///
/// [`compile`]: crate::graph::GraphBuilder::compile
/// [`CompiledGraph`]: crate::graph::CompiledGraph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// A node with this name is already registered.
    #[error("node already registered: {0}")]
    DuplicateNode(String),

    /// The node already has an outgoing edge of either kind.
    #[error("node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    /// An edge or the entry marker references an unregistered node.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// No entry node was designated before compiling.
    #[error("no entry node designated")]
    MissingEntry,

    /// The node has no outgoing edge, so no run through it can complete.
    #[error("node '{0}' has no outgoing edge and no path to END")]
    DeadEnd(String),
}

impl DefinitionError {
    /// Create a duplicate node error.
    pub fn duplicate_node(name: impl Into<String>) -> Self {
        Self::DuplicateNode(name.into())
    }

    /// Create a duplicate edge error.
    pub fn duplicate_edge(name: impl Into<String>) -> Self {
        Self::DuplicateEdge(name.into())
    }

    /// Create an unknown node error.
    pub fn unknown_node(name: impl Into<String>) -> Self {
        Self::UnknownNode(name.into())
    }

    /// Create a dead end error.
    pub fn dead_end(name: impl Into<String>) -> Self {
        Self::DeadEnd(name.into())
    }
}

/// Errors that can end a single run.
///
/// Execution errors abort only the run that raised them; the compiled
/// graph stays valid and can be run again.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A node handler reported a failure.
    #[error("node '{node}' handler failed: {source}")]
    HandlerFailure {
        /// Node whose handler failed.
        node: String,
        /// The failure the handler reported.
        #[source]
        source: anyhow::Error,
    },

    /// A router produced a label absent from its declared branch map.
    #[error("node '{node}' routed to undeclared label '{label}'")]
    RoutingError {
        /// Node whose router misbehaved.
        node: String,
        /// The undeclared label.
        label: String,
    },

    /// The optional step guard fired.
    #[error("step limit ({limit}) exceeded at node '{node}'")]
    StepLimitExceeded {
        /// Node that was about to run when the guard fired.
        node: String,
        /// The configured limit.
        limit: u32,
    },

    /// The run was cancelled between steps.
    #[error("run cancelled at node '{0}'")]
    Cancelled(String),
}

impl ExecutionError {
    /// Create a handler failure error.
    pub fn handler_failure(node: impl Into<String>, source: anyhow::Error) -> Self {
        Self::HandlerFailure {
            node: node.into(),
            source,
        }
    }

    /// Create a routing error.
    pub fn routing(node: impl Into<String>, label: impl Into<String>) -> Self {
        Self::RoutingError {
            node: node.into(),
            label: label.into(),
        }
    }
}

/// A failed run, carrying everything accumulated up to the failure.
///
/// The state and trace let callers diagnose a failure without replaying
/// the run.
#[derive(Error, Debug)]
#[error("{kind}")]
pub struct RunFailure<S: fmt::Debug> {
    /// What went wrong.
    pub kind: ExecutionError,
    /// Working state at the point of failure.
    pub state: S,
    /// Node names that completed before the failure.
    pub trace: Vec<String>,
    /// Identifier of the failed run.
    pub run_id: String,
}

impl<S: fmt::Debug> RunFailure<S> {
    /// Name of the node active when the run failed.
    pub fn node(&self) -> &str {
        match &self.kind {
            ExecutionError::HandlerFailure { node, .. } => node,
            ExecutionError::RoutingError { node, .. } => node,
            ExecutionError::Cancelled(node) => node,
            ExecutionError::StepLimitExceeded { node, .. } => node,
        }
    }
}

/// Result type for graph definition operations.
pub type BuildResult<T> = Result<T, DefinitionError>;
