//! The run loop.
//!
//! A run is strictly sequential: one handler or router is active at a
//! time, and the working state is owned by the run. Handlers get owned
//! snapshots; only the loop below merges updates back. Cancellation is
//! cooperative and checked between steps, never inside a handler.

use crate::edge::{Target, Transition};
use crate::error::{ExecutionError, RunFailure};
use crate::graph::CompiledGraph;
use crate::state::{generate_run_id, GraphState, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, span, Instrument, Level, Span};

/// Per-run knobs for [`CompiledGraph::run_with_options`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum handler invocations before the run fails with
    /// [`StepLimitExceeded`]. `None` imposes no limit; cycles are a
    /// legitimate pattern and only the caller knows a sensible bound.
    ///
    /// [`StepLimitExceeded`]: ExecutionError::StepLimitExceeded
    pub max_steps: Option<u32>,
    /// Cooperative cancellation signal, polled between steps.
    pub cancellation: Option<CancellationToken>,
    /// Custom run ID; generated when absent.
    pub run_id: Option<String>,
    /// Whether to open a tracing span for the run.
    pub tracing: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_steps: None,
            cancellation: None,
            run_id: None,
            tracing: true,
        }
    }
}

impl ExecutionOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of handler invocations.
    pub fn max_steps(mut self, max: u32) -> Self {
        self.max_steps = Some(max);
        self
    }

    /// Attach a cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Use a caller-chosen run ID.
    pub fn run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Enable or disable the run span.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }
}

impl<S: GraphState> CompiledGraph<S> {
    /// Run the graph from the entry node with default options.
    ///
    /// Returns the final state and the ordered trace of visited nodes, or
    /// a [`RunFailure`] carrying the state and trace accumulated at the
    /// point of failure.
    pub async fn run(&self, initial: S) -> Result<RunReport<S>, RunFailure<S>> {
        self.run_with_options(initial, ExecutionOptions::new())
            .await
    }

    /// Run the graph with explicit options.
    pub async fn run_with_options(
        &self,
        initial: S,
        mut options: ExecutionOptions,
    ) -> Result<RunReport<S>, RunFailure<S>> {
        let run_id = options.run_id.take().unwrap_or_else(generate_run_id);
        // An entered span guard must not be held across an await point,
        // so the whole loop is instrumented instead.
        let run_span = if options.tracing {
            span!(
                Level::INFO,
                "graph_run",
                graph = self.name().unwrap_or("unnamed"),
                run_id = %run_id,
            )
        } else {
            Span::none()
        };
        self.run_loop(initial, options, run_id)
            .instrument(run_span)
            .await
    }

    async fn run_loop(
        &self,
        initial: S,
        options: ExecutionOptions,
        run_id: String,
    ) -> Result<RunReport<S>, RunFailure<S>> {
        let mut state = initial;
        let mut trace: Vec<String> = Vec::new();
        let mut current = self.entry.clone();
        let mut steps: u32 = 0;

        loop {
            if let Some(token) = &options.cancellation {
                if token.is_cancelled() {
                    debug!(node = %current, "run cancelled");
                    return Err(RunFailure {
                        kind: ExecutionError::Cancelled(current),
                        state,
                        trace,
                        run_id,
                    });
                }
            }

            if let Some(limit) = options.max_steps {
                if steps >= limit {
                    return Err(RunFailure {
                        kind: ExecutionError::StepLimitExceeded {
                            node: current,
                            limit,
                        },
                        state,
                        trace,
                        run_id,
                    });
                }
            }

            // Closed node table: every name reachable here passed compile.
            let node = self
                .nodes
                .get(&current)
                .expect("compiled graph has all nodes");

            let update = match node.handler.call(state.clone()).await {
                Ok(update) => update,
                Err(source) => {
                    return Err(RunFailure {
                        kind: ExecutionError::handler_failure(current, source),
                        state,
                        trace,
                        run_id,
                    });
                }
            };
            state.apply(update);
            steps += 1;

            let transition = self
                .transitions
                .get(&current)
                .expect("compiled graph has a transition for every node");
            let next = match transition {
                Transition::Unconditional(target) => target.clone(),
                Transition::Conditional { router, branches } => {
                    // Routers see the node's own effects: post-merge state.
                    let label = router.route(&state);
                    match branches.get(&label) {
                        Some(target) => target.clone(),
                        None => {
                            return Err(RunFailure {
                                kind: ExecutionError::routing(current, label),
                                state,
                                trace,
                                run_id,
                            });
                        }
                    }
                }
            };

            debug!(node = %current, step = steps, next = %next, "node completed");
            trace.push(current);

            match next {
                Target::End => {
                    return Ok(RunReport {
                        state,
                        trace,
                        steps,
                        run_id,
                    });
                }
                Target::Node(name) => current = name,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::END;
    use crate::error::DefinitionError;
    use crate::graph::GraphBuilder;
    use crate::node::handler_fn;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TriageState {
        flag: bool,
        visited: Vec<String>,
        score: i32,
    }

    #[derive(Debug, Default)]
    struct TriageUpdate {
        flag: Option<bool>,
        visited: Option<Vec<String>>,
        score: Option<i32>,
    }

    impl GraphState for TriageState {
        type Update = TriageUpdate;

        fn apply(&mut self, update: TriageUpdate) {
            if let Some(flag) = update.flag {
                self.flag = flag;
            }
            if let Some(visited) = update.visited {
                self.visited = visited;
            }
            if let Some(score) = update.score {
                self.score = score;
            }
        }
    }

    fn mark(name: &'static str) -> impl crate::node::NodeHandler<TriageState> {
        handler_fn(move |s: TriageState| async move {
            let mut visited = s.visited.clone();
            visited.push(name.to_string());
            anyhow::Ok(TriageUpdate {
                visited: Some(visited),
                ..TriageUpdate::default()
            })
        })
    }

    fn linear_graph() -> crate::graph::CompiledGraph<TriageState> {
        let mut builder = GraphBuilder::new();
        builder.add_node("a", mark("a")).unwrap();
        builder.add_node("b", mark("b")).unwrap();
        builder.add_edge("a", "b").unwrap();
        builder.add_edge("b", END).unwrap();
        builder.set_entry("a");
        builder.compile().unwrap()
    }

    fn branching_graph() -> crate::graph::CompiledGraph<TriageState> {
        let mut builder = GraphBuilder::new();
        builder.add_node("c", mark("c")).unwrap();
        builder.add_node("d", mark("d")).unwrap();
        builder.add_node("e", mark("e")).unwrap();
        builder
            .add_conditional_edge(
                "c",
                |s: &TriageState| {
                    if s.flag {
                        "x".to_string()
                    } else {
                        "y".to_string()
                    }
                },
                [("x", Target::node("d")), ("y", Target::node("e"))],
            )
            .unwrap();
        builder.add_edge("d", END).unwrap();
        builder.add_edge("e", END).unwrap();
        builder.set_entry("c");
        builder.compile().unwrap()
    }

    #[tokio::test]
    async fn unconditional_path_visits_in_order() {
        let graph = linear_graph();
        let report = graph.run(TriageState::default()).await.unwrap();

        assert_eq!(report.trace, vec!["a", "b"]);
        assert_eq!(report.steps, 2);
        assert_eq!(report.state.visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unconditional_path_is_deterministic() {
        let graph = linear_graph();
        let first = graph.run(TriageState::default()).await.unwrap();
        let second = graph.run(TriageState::default()).await.unwrap();

        assert_eq!(first.state, second.state);
        assert_eq!(first.trace, second.trace);
    }

    #[rstest]
    #[case(true, vec!["c", "d"])]
    #[case(false, vec!["c", "e"])]
    #[tokio::test]
    async fn router_follows_declared_branch(#[case] flag: bool, #[case] expected: Vec<&str>) {
        let graph = branching_graph();
        let report = graph
            .run(TriageState {
                flag,
                ..TriageState::default()
            })
            .await
            .unwrap();

        assert_eq!(report.trace, expected);
    }

    #[tokio::test]
    async fn undeclared_label_fails_with_routing_error() {
        let mut builder = GraphBuilder::new();
        builder.add_node("c", mark("c")).unwrap();
        builder.add_node("d", mark("d")).unwrap();
        builder
            .add_conditional_edge(
                "c",
                |_: &TriageState| "z".to_string(),
                [("x", Target::node("d"))],
            )
            .unwrap();
        builder.add_edge("d", END).unwrap();
        builder.set_entry("c");
        let graph = builder.compile().unwrap();

        let failure = graph.run(TriageState::default()).await.unwrap_err();
        match &failure.kind {
            ExecutionError::RoutingError { node, label } => {
                assert_eq!(node, "c");
                assert_eq!(label, "z");
            }
            other => panic!("expected routing error, got {other}"),
        }
        // The handler ran and merged before routing failed.
        assert_eq!(failure.state.visited, vec!["c"]);
    }

    #[tokio::test]
    async fn handler_failure_names_node_and_keeps_trace() {
        let mut builder = GraphBuilder::new();
        builder.add_node("a", mark("a")).unwrap();
        builder
            .add_node(
                "b",
                handler_fn(|_: TriageState| async move {
                    Err::<TriageUpdate, _>(anyhow::anyhow!("upstream unavailable"))
                }),
            )
            .unwrap();
        builder.add_edge("a", "b").unwrap();
        builder.add_edge("b", END).unwrap();
        builder.set_entry("a");
        let graph = builder.compile().unwrap();

        let failure = graph.run(TriageState::default()).await.unwrap_err();
        assert_eq!(failure.node(), "b");
        assert_eq!(failure.trace, vec!["a"]);
        assert_eq!(failure.state.visited, vec!["a"]);
        assert!(failure.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn step_limit_fires_after_exact_count() {
        let mut builder = GraphBuilder::new();
        builder.add_node("f", mark("f")).unwrap();
        builder
            .add_conditional_edge(
                "f",
                |_: &TriageState| "again".to_string(),
                [("again", Target::node("f")), ("done", END)],
            )
            .unwrap();
        builder.set_entry("f");
        let graph = builder.compile().unwrap();

        let failure = graph
            .run_with_options(TriageState::default(), ExecutionOptions::new().max_steps(3))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.kind,
            ExecutionError::StepLimitExceeded { limit: 3, .. }
        ));
        assert_eq!(failure.node(), "f");
        assert_eq!(failure.trace, vec!["f", "f", "f"]);
        assert_eq!(failure.state.visited, vec!["f", "f", "f"]);
    }

    #[tokio::test]
    async fn cycle_terminates_when_router_reaches_end() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(
                "f",
                handler_fn(|s: TriageState| async move {
                    anyhow::Ok(TriageUpdate {
                        score: Some(s.score + 1),
                        ..TriageUpdate::default()
                    })
                }),
            )
            .unwrap();
        builder
            .add_conditional_edge(
                "f",
                |s: &TriageState| {
                    if s.score >= 3 {
                        "done".to_string()
                    } else {
                        "again".to_string()
                    }
                },
                [("again", Target::node("f")), ("done", END)],
            )
            .unwrap();
        builder.set_entry("f");
        let graph = builder.compile().unwrap();

        let report = graph.run(TriageState::default()).await.unwrap();
        assert_eq!(report.state.score, 3);
        assert_eq!(report.trace, vec!["f", "f", "f"]);
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_steps() {
        let graph = linear_graph();
        let token = CancellationToken::new();
        token.cancel();

        let failure = graph
            .run_with_options(
                TriageState::default(),
                ExecutionOptions::new().cancellation(token),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.kind, ExecutionError::Cancelled(_)));
        assert_eq!(failure.node(), "a");
        assert!(failure.trace.is_empty());
    }

    #[tokio::test]
    async fn merge_is_last_writer_wins_per_field() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(
                "first",
                handler_fn(|_: TriageState| async move {
                    anyhow::Ok(TriageUpdate {
                        score: Some(1),
                        flag: Some(true),
                        ..TriageUpdate::default()
                    })
                }),
            )
            .unwrap();
        builder
            .add_node(
                "second",
                handler_fn(|_: TriageState| async move {
                    anyhow::Ok(TriageUpdate {
                        score: Some(2),
                        ..TriageUpdate::default()
                    })
                }),
            )
            .unwrap();
        builder.add_edge("first", "second").unwrap();
        builder.add_edge("second", END).unwrap();
        builder.set_entry("first");
        let graph = builder.compile().unwrap();

        let report = graph.run(TriageState::default()).await.unwrap();
        assert_eq!(report.state.score, 2);
        // Untouched by the second update.
        assert!(report.state.flag);
    }

    #[tokio::test]
    async fn failed_run_leaves_graph_reusable() {
        let graph = branching_graph();
        let token = CancellationToken::new();
        token.cancel();

        let _ = graph
            .run_with_options(
                TriageState::default(),
                ExecutionOptions::new().cancellation(token),
            )
            .await
            .unwrap_err();

        let report = graph
            .run(TriageState {
                flag: true,
                ..TriageState::default()
            })
            .await
            .unwrap();
        assert_eq!(report.trace, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn independent_runs_share_a_compiled_graph() {
        let graph = std::sync::Arc::new(branching_graph());

        let spam = graph.run(TriageState {
            flag: true,
            ..TriageState::default()
        });
        let ham = graph.run(TriageState {
            flag: false,
            ..TriageState::default()
        });

        let (spam, ham) = tokio::join!(spam, ham);
        assert_eq!(spam.unwrap().trace, vec!["c", "d"]);
        assert_eq!(ham.unwrap().trace, vec!["c", "e"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_can_be_spawned_across_threads() {
        let graph = std::sync::Arc::new(branching_graph());

        let mut handles = Vec::new();
        for flag in [true, false] {
            let graph = std::sync::Arc::clone(&graph);
            handles.push(tokio::spawn(async move {
                graph
                    .run(TriageState {
                        flag,
                        ..TriageState::default()
                    })
                    .await
                    .unwrap()
            }));
        }

        let spam = handles.remove(0).await.unwrap();
        let ham = handles.remove(0).await.unwrap();
        assert_eq!(spam.trace, vec!["c", "d"]);
        assert_eq!(ham.trace, vec!["c", "e"]);
    }

    #[tokio::test]
    async fn custom_run_id_is_threaded_through() {
        let graph = linear_graph();
        let report = graph
            .run_with_options(
                TriageState::default(),
                ExecutionOptions::new().run_id("audit-17").tracing(false),
            )
            .await
            .unwrap();
        assert_eq!(report.run_id, "audit-17");
    }

    #[test]
    fn rejected_definition_never_runs() {
        let mut builder = GraphBuilder::<TriageState>::new();
        builder.add_node("a", mark("a")).unwrap();
        builder.add_edge("a", "ghost").unwrap();
        builder.set_entry("a");

        // compile consumes the builder; an Err leaves nothing to run.
        let err = builder.compile().unwrap_err();
        assert_eq!(err, DefinitionError::unknown_node("ghost"));
    }
}
