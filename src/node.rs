//! Node handlers and routers.

use crate::state::GraphState;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A unit of work bound to a node.
///
/// This is the engine's sole extension point: all domain logic lives in
/// handlers registered by the caller. A handler receives an owned
/// snapshot of the run's state and returns a partial update, or a
/// failure. It never touches the canonical working copy; only the
/// executor merges updates.
///
/// External collaborators (a model client, a notification channel) should
/// be captured by the handler at construction time rather than reached
/// through globals, so handlers stay testable with substitutes.
#[async_trait]
pub trait NodeHandler<S: GraphState>: Send + Sync {
    /// Execute against a state snapshot and return the fields that changed.
    async fn call(&self, snapshot: S) -> anyhow::Result<S::Update>;
}

/// A handler backed by an async function or closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F> {
    /// Wrap a function as a handler.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

/// Shorthand for [`FnHandler::new`].
pub fn handler_fn<F>(func: F) -> FnHandler<F> {
    FnHandler::new(func)
}

#[async_trait]
impl<S, F, Fut> NodeHandler<S> for FnHandler<F>
where
    S: GraphState,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<S::Update>> + Send,
{
    async fn call(&self, snapshot: S) -> anyhow::Result<S::Update> {
        (self.func)(snapshot).await
    }
}

/// Decides which labeled branch a conditional edge takes.
///
/// Routers are evaluated on the post-merge state, so a routing decision
/// always sees the effects of the node it routes out of. The labels a
/// router can produce form a closed set declared on the edge; producing
/// anything else is a runtime [`RoutingError`].
///
/// Implemented for any `Fn(&S) -> String`.
///
/// [`RoutingError`]: crate::error::ExecutionError::RoutingError
pub trait Router<S>: Send + Sync {
    /// Produce a branch label from the current state.
    fn route(&self, state: &S) -> String;
}

impl<S, F> Router<S> for F
where
    F: Fn(&S) -> String + Send + Sync,
{
    fn route(&self, state: &S) -> String {
        self(state)
    }
}

/// A registered node: a unique name bound to a handler.
pub struct NodeDef<S: GraphState> {
    /// Node name, unique within its graph.
    pub name: String,
    /// The handler invoked when the node runs.
    pub handler: Arc<dyn NodeHandler<S>>,
}

impl<S: GraphState> NodeDef<S> {
    /// Create a new node definition.
    pub fn new<H>(name: impl Into<String>, handler: H) -> Self
    where
        H: NodeHandler<S> + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }
}

impl<S: GraphState> fmt::Debug for NodeDef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDef").field("name", &self.name).finish()
    }
}

impl<S: GraphState> Clone for NodeDef<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}
