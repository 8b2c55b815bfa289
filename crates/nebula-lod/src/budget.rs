//! Wall-clock governor bounding the bookkeeping done in one tick.

use std::time::{Duration, Instant};

/// Default per-tick budget: a 32 Hz frame.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_nanos(1_000_000_000 / 32);

/// Tracks elapsed time within one tick.
///
/// Work is done in batches. Before each batch the caller asks
/// [`allow_batch`](FrameBudget::allow_batch); the first batch is always
/// allowed, later ones only while the budget has not run out. A tick
/// therefore overruns its budget by at most one batch.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    started: Instant,
    budget: Duration,
    batches: u32,
    denied: bool,
}

impl FrameBudget {
    /// Start timing a tick now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            batches: 0,
            denied: false,
        }
    }

    /// Whether another batch may run. Counts the batch if so.
    pub fn allow_batch(&mut self) -> bool {
        if self.batches == 0 || self.started.elapsed() < self.budget {
            self.batches += 1;
            true
        } else {
            self.denied = true;
            false
        }
    }

    /// Batches granted so far.
    pub fn batches(&self) -> u32 {
        self.batches
    }

    /// Whether any batch was refused, meaning work was deferred.
    pub fn was_exhausted(&self) -> bool {
        self.denied
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_batch_always_allowed() {
        let mut budget = FrameBudget::start(Duration::ZERO);
        assert!(budget.allow_batch());
        assert!(!budget.allow_batch());
        assert_eq!(budget.batches(), 1);
        assert!(budget.was_exhausted());
    }

    #[test]
    fn test_overrun_bounded_by_one_batch() {
        let limit = Duration::from_millis(10);
        let batch = Duration::from_millis(3);
        let mut budget = FrameBudget::start(limit);
        let mut batch_starts = Vec::new();

        while budget.allow_batch() {
            batch_starts.push(budget.elapsed());
            std::thread::sleep(batch);
        }

        assert!(!batch_starts.is_empty());
        assert!(budget.batches() >= 1);
        // Every batch after the first began while time remained, so the tick
        // ends no later than the budget plus the final batch.
        for start in &batch_starts[1..] {
            assert!(*start < limit, "batch started at {start:?}");
        }
        assert!(budget.was_exhausted());
    }

    #[test]
    fn test_generous_budget_is_not_exhausted() {
        let mut budget = FrameBudget::start(Duration::from_secs(60));
        for _ in 0..100 {
            assert!(budget.allow_batch());
        }
        assert!(!budget.was_exhausted());
        assert!(budget.remaining() > Duration::from_secs(59));
    }
}
