//! Fixed-rate tick pacing for the headless loop.
//!
//! Ticks are scheduled on a fixed grid. A tick that finishes early sleeps
//! until its slot ends; a loop that falls too far behind drops the backlog
//! and restarts the grid from now rather than running a burst of catch-up
//! ticks.

use std::time::{Duration, Instant};

use tracing::warn;

/// Lag beyond which the schedule is reset instead of caught up.
pub const MAX_LAG: Duration = Duration::from_millis(250);

/// Fixed-rate scheduler.
#[derive(Debug)]
pub struct TickPacer {
    period: Option<Duration>,
    next_deadline: Instant,
    late_ticks: u64,
    resets: u64,
}

impl TickPacer {
    /// Pace at `rate_hz` ticks per second, or not at all for 0.
    pub fn new(rate_hz: u32) -> Self {
        Self::starting_at(rate_hz, Instant::now())
    }

    fn starting_at(rate_hz: u32, now: Instant) -> Self {
        let period = (rate_hz > 0).then(|| Duration::from_secs(1) / rate_hz);
        Self {
            period,
            next_deadline: now + period.unwrap_or_default(),
            late_ticks: 0,
            resets: 0,
        }
    }

    /// Length of one tick slot, if paced.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Block until the current tick slot ends.
    pub fn wait(&mut self) {
        let pause = self.advance(Instant::now());
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }

    /// Move to the next slot given the current time, returning how long to
    /// sleep before starting it.
    fn advance(&mut self, now: Instant) -> Duration {
        let Some(period) = self.period else {
            return Duration::ZERO;
        };
        let deadline = self.next_deadline;
        if now <= deadline {
            self.next_deadline = deadline + period;
            return deadline - now;
        }

        self.late_ticks += 1;
        let lag = now - deadline;
        if lag > MAX_LAG {
            warn!(
                lag_ms = lag.as_secs_f64() * 1000.0,
                "tick loop fell behind, resetting schedule"
            );
            self.resets += 1;
            self.next_deadline = now + period;
        } else {
            self.next_deadline = deadline + period;
        }
        Duration::ZERO
    }

    /// Ticks that started after their slot had already ended.
    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }

    /// Times the schedule was abandoned after falling too far behind.
    pub fn resets(&self) -> u64 {
        self.resets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(10);

    #[test]
    fn test_unpaced_never_sleeps() {
        let start = Instant::now();
        let mut pacer = TickPacer::starting_at(0, start);
        assert!(pacer.period().is_none());
        assert_eq!(pacer.advance(start), Duration::ZERO);
        assert_eq!(pacer.advance(start + Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(pacer.late_ticks(), 0);
    }

    #[test]
    fn test_early_tick_sleeps_until_slot_end() {
        let start = Instant::now();
        let mut pacer = TickPacer::starting_at(100, start);
        assert_eq!(pacer.period(), Some(PERIOD));
        let pause = pacer.advance(start + Duration::from_millis(4));
        assert_eq!(pause, Duration::from_millis(6));
        // The next slot ends one period after the previous deadline.
        let pause = pacer.advance(start + PERIOD);
        assert_eq!(pause, PERIOD);
    }

    #[test]
    fn test_small_lag_keeps_schedule() {
        let start = Instant::now();
        let mut pacer = TickPacer::starting_at(100, start);
        assert_eq!(pacer.advance(start + Duration::from_millis(15)), Duration::ZERO);
        assert_eq!(pacer.late_ticks(), 1);
        assert_eq!(pacer.resets(), 0);
        // Back on the original grid: slot two ends at 20ms.
        assert_eq!(
            pacer.advance(start + Duration::from_millis(16)),
            Duration::from_millis(4)
        );
    }

    #[test]
    fn test_large_lag_resets_schedule() {
        let start = Instant::now();
        let mut pacer = TickPacer::starting_at(100, start);
        let now = start + Duration::from_secs(1);
        assert_eq!(pacer.advance(now), Duration::ZERO);
        assert_eq!(pacer.resets(), 1);
        assert_eq!(pacer.advance(now + Duration::from_millis(3)), Duration::from_millis(7));
    }
}
