//! # stategraph
//!
//! Typed state workflow graphs: named nodes run over a shared state,
//! transitions are unconditional or decided at runtime by a router, and a
//! compile step validates the whole graph before anything executes.
//!
//! ## Core Concepts
//!
//! - **[`GraphState`]**: state threaded through a run, merged via partial updates
//! - **[`NodeHandler`]**: a unit of work, from state snapshot to partial update
//! - **[`GraphBuilder`]**: unordered registration of nodes and edges
//! - **[`CompiledGraph`]**: validated, immutable, runnable any number of times
//! - **[`END`]**: the terminal marker usable as any edge's destination
//!
//! ## Lifecycle
//!
//! Definition → compile (validate once) → run (many times, each with
//! independent state) → optional [`mermaid`] rendering for inspection.
//!
//! ## Example
//!
//! ```
//! use stategraph::{handler_fn, GraphBuilder, GraphState, END};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Ticket {
//!     body: String,
//!     urgent: Option<bool>,
//! }
//!
//! #[derive(Debug, Default)]
//! struct TicketUpdate {
//!     urgent: Option<bool>,
//! }
//!
//! impl GraphState for Ticket {
//!     type Update = TicketUpdate;
//!
//!     fn apply(&mut self, update: TicketUpdate) {
//!         if let Some(urgent) = update.urgent {
//!             self.urgent = Some(urgent);
//!         }
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = GraphBuilder::new().with_name("triage");
//! builder.add_node(
//!     "classify",
//!     handler_fn(|t: Ticket| async move {
//!         anyhow::Ok(TicketUpdate {
//!             urgent: Some(t.body.contains("outage")),
//!         })
//!     }),
//! )?;
//! builder.add_edge("classify", END)?;
//! builder.set_entry("classify");
//! let graph = builder.compile()?;
//!
//! let report = graph
//!     .run(Ticket {
//!         body: "production outage".to_string(),
//!         urgent: None,
//!     })
//!     .await?;
//! assert_eq!(report.state.urgent, Some(true));
//! assert_eq!(report.trace, vec!["classify"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod mermaid;
pub mod node;
pub mod state;
pub mod walker;

// Re-exports
pub use edge::{Target, Transition, END};
pub use error::{BuildResult, DefinitionError, ExecutionError, RunFailure};
pub use executor::ExecutionOptions;
pub use graph::{CompiledGraph, GraphBuilder};
pub use mermaid::{render, render_with_options, MermaidDirection, MermaidOptions};
pub use node::{handler_fn, FnHandler, NodeDef, NodeHandler, Router};
pub use state::{generate_run_id, GraphState, RunReport};
pub use walker::{GraphWalker, StepOutcome};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        handler_fn, CompiledGraph, DefinitionError, ExecutionError, ExecutionOptions,
        GraphBuilder, GraphState, NodeHandler, Router, RunFailure, RunReport, Target, END,
    };
}
