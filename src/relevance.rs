//! Generation-guarded coordination of the background relevance computation.
//!
//! The scorer itself is a black box; this module owns the bookkeeping that
//! guarantees at most one computation in flight and at most one externally
//! visible result per quiescent period. Stale results are discarded and the
//! computation restarted against current inputs; there is no preemptive
//! cancellation.

use crate::column::{Column, ColumnBuffer};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable snapshot of everything the scorer reads.
#[derive(Debug, Clone)]
pub struct RelevanceInputs {
    pub columns: Vec<Column>,
    pub column_data: HashMap<String, Arc<ColumnBuffer>>,
    pub selected_indices: Vec<usize>,
    pub filtered_indices: Vec<usize>,
}

/// Black-box relevance algorithm: per-column scores describing how
/// informative each column is with respect to the selected vs. filtered
/// row subsets. May be slow; runs on a blocking worker.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, inputs: &RelevanceInputs) -> HashMap<String, f64>;
}

impl<F> RelevanceScorer for F
where
    F: Fn(&RelevanceInputs) -> HashMap<String, f64> + Send + Sync,
{
    fn score(&self, inputs: &RelevanceInputs) -> HashMap<String, f64> {
        self(inputs)
    }
}

/// Published relevance map, tagged with the request generation it was
/// computed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRelevance {
    pub generation: u64,
    pub scores: HashMap<String, f64>,
}

/// Outcome of a completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result matches the latest request; publish it.
    Publish,
    /// A newer request arrived while computing; discard the result and
    /// restart against current inputs.
    Restart,
}

/// The generation-guard state machine.
///
/// `request_generation` is bumped on every triggering change. While a
/// computation is in flight further triggers only bump the counter; the
/// in-flight completion notices the mismatch and restarts.
#[derive(Debug, Default)]
pub struct RelevanceCoordinator {
    request_generation: u64,
    computing: bool,
}

impl RelevanceCoordinator {
    pub fn new() -> Self {
        RelevanceCoordinator::default()
    }

    /// Register a triggering change. Returns true when the caller must
    /// start a computation (none was in flight).
    pub fn trigger(&mut self) -> bool {
        self.request_generation += 1;
        if self.computing {
            false
        } else {
            self.computing = true;
            true
        }
    }

    /// Check a finished computation against the current counter.
    pub fn on_complete(&mut self, started_generation: u64) -> Completion {
        if started_generation == self.request_generation {
            self.computing = false;
            Completion::Publish
        } else {
            Completion::Restart
        }
    }

    /// Forget the in-flight computation, e.g. after a dataset reload made
    /// it meaningless. The counter keeps increasing monotonically.
    pub fn reset(&mut self) {
        self.computing = false;
    }

    pub fn request_generation(&self) -> u64 {
        self.request_generation
    }

    pub fn is_computing(&self) -> bool {
        self.computing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_trigger_publishes() {
        let mut coord = RelevanceCoordinator::new();
        assert!(coord.trigger());
        let generation = coord.request_generation();
        assert!(coord.is_computing());

        assert_eq!(coord.on_complete(generation), Completion::Publish);
        assert!(!coord.is_computing());
    }

    #[test]
    fn test_triggers_while_computing_coalesce() {
        let mut coord = RelevanceCoordinator::new();
        assert!(coord.trigger());
        let first = coord.request_generation();

        // Two rapid triggers while in flight: no new computation starts,
        // the counter advances.
        assert!(!coord.trigger());
        assert!(!coord.trigger());
        assert_eq!(coord.request_generation(), first + 2);

        // The first completion is stale and must restart, not publish.
        assert_eq!(coord.on_complete(first), Completion::Restart);
        assert!(coord.is_computing());

        // The restarted computation completes under the current counter.
        let current = coord.request_generation();
        assert_eq!(coord.on_complete(current), Completion::Publish);
        assert!(!coord.is_computing());
    }

    #[test]
    fn test_reset_allows_fresh_start() {
        let mut coord = RelevanceCoordinator::new();
        assert!(coord.trigger());
        coord.reset();
        assert!(!coord.is_computing());
        assert!(coord.trigger());
    }
}
