//! Three-tier attainment rollup: student CO percentages, course CO levels and
//! program PO blends, plus per-assessment mark summaries.

use std::sync::Arc;

use crate::store::AttainmentStore;

mod assessment;
mod course;
mod program;
mod student;

#[cfg(test)]
mod tests;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Stateless calculator over a shared read-only store.
pub struct AttainmentCalculator<S> {
    store: Arc<S>,
    max_concurrency: usize,
}

impl<S> Clone for AttainmentCalculator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<S: AttainmentStore + 'static> AttainmentCalculator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Caps how many program outcomes are computed at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
