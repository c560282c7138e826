// THEORY:
// The `ScanClock` decouples the rangefinder's fixed pixel rate from whatever step
// size the host simulation happens to use. Callers feed it elapsed time; it
// hands back one tick per whole pixel period it has accumulated and keeps the
// remainder for next time. Time is held as a `Duration`, so the accumulation is
// exact integer nanosecond arithmetic: feeding 1.0s at once or ten 0.1s slices
// yields the same number of ticks.

use std::time::Duration;

/// Accumulates elapsed simulated time and releases fixed-period ticks.
#[derive(Debug, Clone)]
pub struct ScanClock {
    period: Duration,
    accumulated: Duration,
}

impl ScanClock {
    /// `period` must be non-zero; `ScanGeometry` guarantees this for the engine.
    pub fn new(period: Duration) -> Self {
        debug_assert!(!period.is_zero(), "a zero scan period never drains");
        Self {
            period,
            accumulated: Duration::ZERO,
        }
    }

    pub fn accumulate(&mut self, delta: Duration) {
        self.accumulated = self.accumulated.saturating_add(delta);
    }

    /// Consumes one period from the accumulator if enough time has built up.
    pub fn try_tick(&mut self) -> bool {
        if self.accumulated >= self.period {
            self.accumulated -= self.period;
            true
        } else {
            false
        }
    }

    /// Time carried over that has not yet amounted to a full tick.
    pub fn pending(&self) -> Duration {
        self.accumulated
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
