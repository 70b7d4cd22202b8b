//! Compensating actions for partially completed placements.

use common::ProductId;

/// An action that undoes one completed saga step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationAction {
    /// Releases a stock reservation taken earlier in the run.
    ReleaseReservation { product_id: ProductId, quantity: i64 },
}

/// Ordered log of compensating actions for a single saga run.
///
/// Actions are recorded in step order as forward steps succeed and drained
/// in reverse, so later steps unwind before their predecessors.
#[derive(Debug, Default)]
pub struct CompensationLog {
    actions: Vec<CompensationAction>,
}

impl CompensationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the compensating action for a step that just succeeded.
    pub fn record(&mut self, action: CompensationAction) {
        self.actions.push(action);
    }

    /// Returns the number of recorded actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Removes and yields all actions, newest first.
    pub fn drain_reverse(&mut self) -> impl Iterator<Item = CompensationAction> + '_ {
        self.actions.drain(..).rev()
    }
}
