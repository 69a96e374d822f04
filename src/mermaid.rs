//! Mermaid diagram rendering for compiled graphs.
//!
//! Rendering is a pure function of the compiled graph: it never executes
//! handlers or routers, and happily draws unreachable nodes. Output is
//! deterministic — nodes and edges appear in registration order.

use crate::edge::{Target, Transition};
use crate::graph::CompiledGraph;
use crate::state::GraphState;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Options for Mermaid rendering.
#[derive(Debug, Clone, Default)]
pub struct MermaidOptions {
    /// Diagram direction.
    pub direction: MermaidDirection,
    /// Theme name injected as an init directive.
    pub theme: Option<String>,
}

impl MermaidOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set direction.
    pub fn direction(mut self, dir: MermaidDirection) -> Self {
        self.direction = dir;
        self
    }

    /// Set theme.
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }
}

/// Direction for the rendered flowchart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MermaidDirection {
    /// Top to bottom.
    #[default]
    TopDown,
    /// Left to right.
    LeftRight,
    /// Bottom to top.
    BottomUp,
    /// Right to left.
    RightLeft,
}

impl MermaidDirection {
    fn as_str(&self) -> &'static str {
        match self {
            Self::TopDown => "TD",
            Self::LeftRight => "LR",
            Self::BottomUp => "BT",
            Self::RightLeft => "RL",
        }
    }
}

/// Render a compiled graph as a Mermaid flowchart with default options.
pub fn render<S: GraphState>(graph: &CompiledGraph<S>) -> String {
    render_with_options(graph, &MermaidOptions::new())
}

/// Render a compiled graph as a Mermaid flowchart.
///
/// Every node, every unconditional edge, and every conditional branch
/// label appears in the output; an entry marker points at the entry node
/// and edges to the terminal marker point at a shared END node. Node ids
/// are sanitized for Mermaid and suffixed when two distinct names
/// sanitize to the same id, so no two nodes ever merge in the diagram.
pub fn render_with_options<S: GraphState>(
    graph: &CompiledGraph<S>,
    options: &MermaidOptions,
) -> String {
    let ids = assign_ids(graph);
    let mut output = String::new();

    output.push_str("flowchart ");
    output.push_str(options.direction.as_str());
    output.push('\n');

    if let Some(ref theme) = options.theme {
        output.push_str(&format!("    %%{{init: {{'theme': '{}'}}}}%%\n", theme));
    }

    output.push_str("    __start__([start])\n");
    for name in graph.node_names() {
        output.push_str(&format!("    {}[{}]\n", id_of(&ids, name), name));
    }
    let reaches_end = graph
        .transitions()
        .any(|(_, transition)| transition.targets().iter().any(|target| target.is_end()));
    if reaches_end {
        output.push_str("    __end__([END])\n");
    }

    output.push('\n');

    output.push_str(&format!(
        "    __start__ --> {}\n",
        id_of(&ids, graph.entry())
    ));
    for (from, transition) in graph.transitions() {
        let from_id = id_of(&ids, from);
        match transition {
            Transition::Unconditional(target) => {
                output.push_str(&format!("    {} --> {}\n", from_id, target_id(&ids, target)));
            }
            Transition::Conditional { branches, .. } => {
                for (label, target) in branches {
                    output.push_str(&format!(
                        "    {} -->|{}| {}\n",
                        from_id,
                        label,
                        target_id(&ids, target)
                    ));
                }
            }
        }
    }

    output
}

/// Assign a unique Mermaid id to every node, in registration order.
///
/// Ids the engine reserves for the start and end markers are never handed
/// to a node; a name whose sanitized form is taken gets a numeric suffix.
fn assign_ids<S: GraphState>(graph: &CompiledGraph<S>) -> IndexMap<&str, String> {
    let mut used: HashSet<String> = HashSet::new();
    used.insert("__start__".to_string());
    used.insert("__end__".to_string());

    let mut ids = IndexMap::new();
    for name in graph.node_names() {
        let base = sanitize_id(name);
        let mut id = base.clone();
        let mut suffix = 2;
        while !used.insert(id.clone()) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        ids.insert(name, id);
    }
    ids
}

fn id_of<'a>(ids: &'a IndexMap<&str, String>, name: &'a str) -> &'a str {
    ids.get(name).map(String::as_str).unwrap_or(name)
}

fn target_id<'a>(ids: &'a IndexMap<&str, String>, target: &'a Target) -> &'a str {
    match target {
        Target::Node(name) => id_of(ids, name),
        Target::End => "__end__",
    }
}

/// Sanitize a string for use as a Mermaid ID.
fn sanitize_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
