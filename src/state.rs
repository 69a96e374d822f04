//! Graph state types.

use std::fmt::Debug;

/// Trait for state threaded through a graph run.
///
/// The engine owns exactly one working copy of the state per run.
/// Handlers never see that copy: each step hands the handler an owned
/// snapshot (a clone) and takes back a [`GraphState::Update`] describing
/// only the fields that changed.
///
/// An update is applied with last-writer-wins semantics per field: the
/// idiomatic shape is a struct of `Option` fields mirroring the state,
/// where `None` means "no change" and `Some(v)` replaces the field
/// wholesale.
///
/// ```
/// use stategraph::GraphState;
///
/// #[derive(Debug, Clone, Default)]
/// struct Triage {
///     subject: String,
///     verdict: Option<bool>,
/// }
///
/// #[derive(Debug, Default)]
/// struct TriageUpdate {
///     verdict: Option<bool>,
/// }
///
/// impl GraphState for Triage {
///     type Update = TriageUpdate;
///
///     fn apply(&mut self, update: TriageUpdate) {
///         if let Some(verdict) = update.verdict {
///             self.verdict = Some(verdict);
///         }
///     }
/// }
/// ```
pub trait GraphState: Clone + Debug + Send + Sync + 'static {
    /// Partial update returned by node handlers.
    type Update: Send + 'static;

    /// Merge a partial update into the state.
    ///
    /// Fields present in the update replace the old value; fields absent
    /// from it are left untouched.
    fn apply(&mut self, update: Self::Update);
}

/// Result of a completed graph run.
#[derive(Debug, Clone)]
pub struct RunReport<S> {
    /// Final state after the last merge.
    pub state: S,
    /// Node names visited, in completion order.
    pub trace: Vec<String>,
    /// Number of handler invocations.
    pub steps: u32,
    /// Identifier of this run.
    pub run_id: String,
}

impl<S> RunReport<S> {
    /// Create a new report.
    pub fn new(state: S, steps: u32, run_id: impl Into<String>) -> Self {
        Self {
            state,
            trace: Vec::new(),
            steps,
            run_id: run_id.into(),
        }
    }

    /// Attach the visitation trace.
    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }
}

/// Generate a unique run ID.
pub fn generate_run_id() -> String {
    use std::time::SystemTime;
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("run-{:x}", timestamp)
}
