//! Single-step execution over a compiled graph.
//!
//! A [`GraphWalker`] drives one run a node at a time, leaving the state
//! inspectable (and adjustable) between steps. Useful for debugging and
//! for callers that interleave graph steps with outside work.

use crate::edge::{Target, Transition};
use crate::error::ExecutionError;
use crate::graph::CompiledGraph;
use crate::state::{generate_run_id, GraphState, RunReport};

/// Drives a run one node at a time.
///
/// Trace, merge, and step-limit semantics match
/// [`CompiledGraph::run`]; only the pacing differs.
pub struct GraphWalker<'g, S: GraphState> {
    graph: &'g CompiledGraph<S>,
    state: S,
    current: Option<String>,
    trace: Vec<String>,
    steps: u32,
    max_steps: Option<u32>,
    run_id: String,
    failed: bool,
}

impl<'g, S: GraphState> GraphWalker<'g, S> {
    /// Start a walk at the graph's entry node.
    pub fn new(graph: &'g CompiledGraph<S>, initial: S) -> Self {
        Self {
            graph,
            state: initial,
            current: Some(graph.entry().to_string()),
            trace: Vec::new(),
            steps: 0,
            max_steps: None,
            run_id: generate_run_id(),
            failed: false,
        }
    }

    /// Bound the number of handler invocations.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = Some(max);
        self
    }

    /// Execute the next node. Returns `None` once the walk is over.
    pub async fn step(&mut self) -> Option<StepOutcome> {
        if self.failed {
            return None;
        }
        let current = self.current.take()?;

        if let Some(limit) = self.max_steps {
            if self.steps >= limit {
                self.failed = true;
                return Some(StepOutcome::Failed(ExecutionError::StepLimitExceeded {
                    node: current,
                    limit,
                }));
            }
        }

        let node = self
            .graph
            .nodes
            .get(&current)
            .expect("compiled graph has all nodes");
        match node.handler.call(self.state.clone()).await {
            Ok(update) => self.state.apply(update),
            Err(source) => {
                self.failed = true;
                return Some(StepOutcome::Failed(ExecutionError::handler_failure(
                    current, source,
                )));
            }
        }
        self.steps += 1;

        let transition = self
            .graph
            .transitions
            .get(&current)
            .expect("compiled graph has a transition for every node");
        let next = match transition {
            Transition::Unconditional(target) => target.clone(),
            Transition::Conditional { router, branches } => {
                let label = router.route(&self.state);
                match branches.get(&label) {
                    Some(target) => target.clone(),
                    None => {
                        self.failed = true;
                        return Some(StepOutcome::Failed(ExecutionError::routing(
                            current, label,
                        )));
                    }
                }
            }
        };

        self.trace.push(current.clone());
        match next {
            Target::End => Some(StepOutcome::Finished { node: current }),
            Target::Node(name) => {
                self.current = Some(name.clone());
                Some(StepOutcome::Continue {
                    node: current,
                    next: name,
                })
            }
        }
    }

    /// The state as of the last completed step.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable access to the state between steps.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Node names completed so far.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Handler invocations so far.
    pub fn step_count(&self) -> u32 {
        self.steps
    }

    /// Whether the walk has ended, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.failed || self.current.is_none()
    }

    /// Consume the walker into a report, if the walk reached END.
    pub fn into_report(self) -> Option<RunReport<S>> {
        if self.failed || self.current.is_some() {
            return None;
        }
        Some(RunReport::new(self.state, self.steps, self.run_id).with_trace(self.trace))
    }
}

/// Result of a single [`GraphWalker::step`].
#[derive(Debug)]
pub enum StepOutcome {
    /// The node completed; the walk continues.
    Continue {
        /// Node that just ran.
        node: String,
        /// Node that runs next.
        next: String,
    },
    /// The node completed and its transition reached END.
    Finished {
        /// Final node.
        node: String,
    },
    /// The step failed; the walk is over.
    Failed(ExecutionError),
}

impl StepOutcome {
    /// Whether this step completed the walk.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// Whether this step failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The node that ran, when the step got that far.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Continue { node, .. } => Some(node),
            Self::Finished { node } => Some(node),
            Self::Failed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::END;
    use crate::graph::GraphBuilder;
    use crate::node::handler_fn;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct CounterState {
        value: i32,
    }

    #[derive(Debug, Default)]
    struct CounterUpdate {
        value: Option<i32>,
    }

    impl GraphState for CounterState {
        type Update = CounterUpdate;

        fn apply(&mut self, update: CounterUpdate) {
            if let Some(value) = update.value {
                self.value = value;
            }
        }
    }

    fn increment() -> impl crate::node::NodeHandler<CounterState> {
        handler_fn(|s: CounterState| async move {
            anyhow::Ok(CounterUpdate {
                value: Some(s.value + 1),
            })
        })
    }

    fn two_step_graph() -> CompiledGraph<CounterState> {
        let mut builder = GraphBuilder::new();
        builder.add_node("first", increment()).unwrap();
        builder.add_node("second", increment()).unwrap();
        builder.add_edge("first", "second").unwrap();
        builder.add_edge("second", END).unwrap();
        builder.set_entry("first");
        builder.compile().unwrap()
    }

    #[tokio::test]
    async fn walker_exposes_state_between_steps() {
        let graph = two_step_graph();
        let mut walker = GraphWalker::new(&graph, CounterState::default());

        let outcome = walker.step().await.unwrap();
        assert_eq!(outcome.node(), Some("first"));
        assert_eq!(walker.state().value, 1);
        assert!(!walker.is_finished());

        let outcome = walker.step().await.unwrap();
        assert!(outcome.is_finished());
        assert_eq!(walker.state().value, 2);
        assert!(walker.is_finished());
        assert!(walker.step().await.is_none());

        let report = walker.into_report().unwrap();
        assert_eq!(report.trace, vec!["first", "second"]);
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn state_can_be_adjusted_mid_walk() {
        let graph = two_step_graph();
        let mut walker = GraphWalker::new(&graph, CounterState::default());

        walker.step().await.unwrap();
        walker.state_mut().value = 100;
        walker.step().await.unwrap();

        assert_eq!(walker.state().value, 101);
    }

    #[tokio::test]
    async fn walker_honors_step_limit() {
        let mut builder = GraphBuilder::new();
        builder.add_node("f", increment()).unwrap();
        builder
            .add_conditional_edge(
                "f",
                |_: &CounterState| "again".to_string(),
                [("again", Target::node("f")), ("done", END)],
            )
            .unwrap();
        builder.set_entry("f");
        let graph = builder.compile().unwrap();

        let mut walker = GraphWalker::new(&graph, CounterState::default()).with_max_steps(2);
        assert!(!walker.step().await.unwrap().is_failed());
        assert!(!walker.step().await.unwrap().is_failed());

        match walker.step().await.unwrap() {
            StepOutcome::Failed(ExecutionError::StepLimitExceeded { node, limit }) => {
                assert_eq!(node, "f");
                assert_eq!(limit, 2);
            }
            other => panic!("expected step limit failure, got {other:?}"),
        }
        assert!(walker.is_finished());
        assert!(walker.into_report().is_none());
    }

    #[tokio::test]
    async fn failed_step_ends_the_walk() {
        let mut builder = GraphBuilder::new();
        builder
            .add_node(
                "bad",
                handler_fn(|_: CounterState| async move {
                    Err::<CounterUpdate, _>(anyhow::anyhow!("boom"))
                }),
            )
            .unwrap();
        builder.add_edge("bad", END).unwrap();
        builder.set_entry("bad");
        let graph = builder.compile().unwrap();

        let mut walker = GraphWalker::new(&graph, CounterState::default());
        let outcome = walker.step().await.unwrap();
        assert!(outcome.is_failed());
        assert!(walker.step().await.is_none());
        assert!(walker.trace().is_empty());
    }
}
