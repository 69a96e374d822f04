//! Edge targets and transition rules.

use crate::node::Router;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Sentinel destination meaning the run is complete.
///
/// `END` is not a node: it is usable as the target of any edge or
/// conditional branch, and reaching it terminates the run.
pub const END: Target = Target::End;

/// Destination of an edge: a named node or the terminal marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A registered node, resolved at compile time.
    Node(String),
    /// The terminal marker.
    End,
}

impl Target {
    /// Create a node target.
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    /// Whether this target is the terminal marker.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// The node name, if this target is a node.
    pub fn as_node(&self) -> Option<&str> {
        match self {
            Self::Node(name) => Some(name),
            Self::End => None,
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Node(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Node(name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(name) => f.write_str(name),
            Self::End => f.write_str("END"),
        }
    }
}

/// The single transition rule out of a node.
///
/// A node has exactly one rule: either a fixed target, or a router plus a
/// closed map from label to target. Registering both is rejected at
/// definition time.
pub enum Transition<S> {
    /// Always go to the same target.
    Unconditional(Target),
    /// Ask the router for a label and follow the matching branch.
    Conditional {
        /// Routing function evaluated on the post-merge state.
        router: Arc<dyn Router<S>>,
        /// Closed label-to-target map, in declaration order.
        branches: IndexMap<String, Target>,
    },
}

impl<S> Transition<S> {
    /// All targets this transition can reach.
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Self::Unconditional(target) => vec![target],
            Self::Conditional { branches, .. } => branches.values().collect(),
        }
    }

    /// Number of distinct outgoing edges (one per branch).
    pub fn edge_count(&self) -> usize {
        match self {
            Self::Unconditional(_) => 1,
            Self::Conditional { branches, .. } => branches.len(),
        }
    }
}

impl<S> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconditional(target) => f.debug_tuple("Unconditional").field(target).finish(),
            Self::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("branches", branches)
                .finish(),
        }
    }
}

impl<S> Clone for Transition<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Unconditional(target) => Self::Unconditional(target.clone()),
            Self::Conditional { router, branches } => Self::Conditional {
                router: Arc::clone(router),
                branches: branches.clone(),
            },
        }
    }
}
