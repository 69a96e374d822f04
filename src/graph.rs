//! Graph definition and compilation.
//!
//! Construction is two-phase: a [`GraphBuilder`] accepts registrations in
//! any order (edges may reference nodes declared later), then
//! [`GraphBuilder::compile`] validates the whole definition and produces
//! an immutable [`CompiledGraph`]. Validation failures never yield a
//! compiled graph.

use crate::edge::{Target, Transition};
use crate::error::{BuildResult, DefinitionError};
use crate::node::{NodeDef, NodeHandler, Router};
use crate::state::GraphState;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// The registration phase of graph construction.
///
/// Registrations may arrive in any order; edge targets are resolved
/// lazily at compile time, so forward references are legal by design.
pub struct GraphBuilder<S: GraphState> {
    name: Option<String>,
    nodes: IndexMap<String, NodeDef<S>>,
    transitions: IndexMap<String, Transition<S>>,
    entry: Option<String>,
}

impl<S: GraphState> GraphBuilder<S> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            name: None,
            nodes: IndexMap::new(),
            transitions: IndexMap::new(),
            entry: None,
        }
    }

    /// Set the graph name, used in run spans and diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register a node under a unique name.
    pub fn add_node<H>(&mut self, name: impl Into<String>, handler: H) -> BuildResult<&mut Self>
    where
        H: NodeHandler<S> + 'static,
    {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(DefinitionError::duplicate_node(name));
        }
        self.nodes.insert(name.clone(), NodeDef::new(name, handler));
        Ok(self)
    }

    /// Register an unconditional transition.
    ///
    /// `to` may be a node name or [`END`]. The source must already be
    /// registered and must not already have a transition of either kind;
    /// the target is checked at compile time.
    ///
    /// [`END`]: crate::edge::END
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<Target>,
    ) -> BuildResult<&mut Self> {
        let from = from.into();
        self.check_edge_source(&from)?;
        self.transitions
            .insert(from, Transition::Unconditional(to.into()));
        Ok(self)
    }

    /// Register a conditional transition.
    ///
    /// `branches` declares the closed set of labels the router may
    /// produce, each mapped to a node name or [`END`].
    ///
    /// [`END`]: crate::edge::END
    pub fn add_conditional_edge<R, I, L, T>(
        &mut self,
        from: impl Into<String>,
        router: R,
        branches: I,
    ) -> BuildResult<&mut Self>
    where
        R: Router<S> + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<Target>,
    {
        let from = from.into();
        self.check_edge_source(&from)?;
        let branches: IndexMap<String, Target> = branches
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.transitions.insert(
            from,
            Transition::Conditional {
                router: Arc::new(router),
                branches,
            },
        );
        Ok(self)
    }

    /// Designate the start node. A later call replaces an earlier one.
    pub fn set_entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn check_edge_source(&self, from: &str) -> BuildResult<()> {
        if !self.nodes.contains_key(from) {
            return Err(DefinitionError::unknown_node(from));
        }
        if self.transitions.contains_key(from) {
            return Err(DefinitionError::duplicate_edge(from));
        }
        Ok(())
    }

    /// Validate the definition and produce an executable graph.
    ///
    /// Checks, in order, first failure wins:
    /// 1. an entry node is set and registered,
    /// 2. every non-END edge target references a registered node,
    /// 3. every node has an outgoing transition (an edge to END counts),
    /// 4. reachability from the entry — unreachable nodes are surfaced
    ///    with a warning and recorded on the compiled graph, not fatal.
    pub fn compile(self) -> BuildResult<CompiledGraph<S>> {
        let entry = self.entry.clone().ok_or(DefinitionError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(DefinitionError::unknown_node(entry));
        }

        for transition in self.transitions.values() {
            for target in transition.targets() {
                if let Target::Node(name) = target {
                    if !self.nodes.contains_key(name) {
                        return Err(DefinitionError::unknown_node(name));
                    }
                }
            }
        }

        for name in self.nodes.keys() {
            if !self.transitions.contains_key(name) {
                return Err(DefinitionError::dead_end(name));
            }
        }

        let unreachable = self.unreachable_from(&entry);
        for name in &unreachable {
            warn!(node = %name, "node is unreachable from the entry");
        }

        Ok(CompiledGraph {
            name: self.name,
            nodes: self.nodes,
            transitions: self.transitions,
            entry,
            unreachable,
        })
    }

    fn unreachable_from(&self, entry: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending = vec![entry];
        while let Some(name) = pending.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(transition) = self.transitions.get(name) {
                for target in transition.targets() {
                    if let Some(next) = target.as_node() {
                        if !seen.contains(next) {
                            pending.push(next);
                        }
                    }
                }
            }
        }
        self.nodes
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: GraphState> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState> fmt::Debug for GraphBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("transitions", &self.transitions)
            .field("entry", &self.entry)
            .finish()
    }
}

/// A validated, immutable, executable graph.
///
/// Holds no per-run state: any number of independent runs may execute
/// concurrently over the same compiled graph, each with its own working
/// state.
pub struct CompiledGraph<S: GraphState> {
    pub(crate) name: Option<String>,
    pub(crate) nodes: IndexMap<String, NodeDef<S>>,
    pub(crate) transitions: IndexMap<String, Transition<S>>,
    pub(crate) entry: String,
    unreachable: Vec<String>,
}

impl<S: GraphState> CompiledGraph<S> {
    /// The graph name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The entry node name.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Node names in registration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of outgoing edges, counting one per conditional branch.
    pub fn edge_count(&self) -> usize {
        self.transitions.values().map(Transition::edge_count).sum()
    }

    /// Transition rules in registration order.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &Transition<S>)> {
        self.transitions
            .iter()
            .map(|(name, transition)| (name.as_str(), transition))
    }

    /// Nodes that compile found unreachable from the entry.
    pub fn unreachable(&self) -> &[String] {
        &self.unreachable
    }
}

impl<S: GraphState> fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("transitions", &self.transitions)
            .field("entry", &self.entry)
            .field("unreachable", &self.unreachable)
            .finish()
    }
}
