//! # Wall-Clock Pacing
//!
//! Paces [`Session::tick`](crate::Session::tick) against real time for the
//! blocking `arena_server` binary. The async driver uses a tokio interval
//! instead.
//!
//! Time owed is accumulated between polls and paid out one tick at a time.
//! After a stall at most [`MAX_CATCH_UP_TICKS`] run back-to-back; the rest
//! of the debt is written off and counted.

use std::time::{Duration, Instant};

/// Most ticks run back-to-back before the backlog is dropped.
pub const MAX_CATCH_UP_TICKS: u32 = 5;

/// Fixed-rate pacer for a blocking server loop.
pub struct TickLoop {
    period: Duration,
    last_poll: Instant,
    owed: Duration,
    tick_count: u64,
    stats: TickStats,
}

/// Simulation-time measurements for the status log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Rolling average of `Session::tick` duration
    pub avg_tick_us: u64,
    /// Ticks that took longer than one period
    pub late_ticks: u64,
    /// Ticks written off after a stall
    pub dropped_ticks: u64,
}

impl TickLoop {
    /// Pacer for `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let period = Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)));
        Self {
            period,
            last_poll: Instant::now(),
            owed: Duration::ZERO,
            tick_count: 0,
            stats: TickStats {
                avg_tick_us: period.as_micros() as u64,
                late_ticks: 0,
                dropped_ticks: 0,
            },
        }
    }

    /// True while at least one tick is owed. Poll until false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.owed += now.duration_since(self.last_poll);
        self.last_poll = now;

        let cap = self.period * MAX_CATCH_UP_TICKS;
        if self.owed > cap {
            let excess = self.owed - cap;
            self.stats.dropped_ticks += (excess.as_micros() / self.period.as_micros().max(1)) as u64;
            tracing::warn!(dropped = self.stats.dropped_ticks, "tick backlog dropped");
            self.owed = cap;
        }

        self.owed >= self.period
    }

    /// Pays one tick and returns the instant simulation started.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.owed = self.owed.saturating_sub(self.period);
        self.tick_count += 1;
        Instant::now()
    }

    /// Records how long the tick started at `start` took.
    pub fn end_tick(&mut self, start: Instant) {
        let elapsed = start.elapsed();
        let elapsed_us = elapsed.as_micros() as u64;
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + elapsed_us) / 16;
        if elapsed > self.period {
            self.stats.late_ticks += 1;
        }
    }

    /// Blocks until the next tick is owed.
    ///
    /// Sleeps most of the way, then spins the last half millisecond.
    pub fn wait_for_next_tick(&self) {
        let due = self.period.saturating_sub(self.owed);
        let elapsed = self.last_poll.elapsed();
        if elapsed >= due {
            return;
        }

        let remaining = due - elapsed;
        if remaining > Duration::from_millis(1) {
            std::thread::sleep(remaining - Duration::from_micros(500));
        }
        while self.last_poll.elapsed() < due {
            std::hint::spin_loop();
        }
    }

    /// Ticks paid out so far
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing counters
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(tick_loop: &mut TickLoop) -> u32 {
        let mut ran = 0;
        while tick_loop.should_tick() {
            let start = tick_loop.begin_tick();
            tick_loop.end_tick(start);
            ran += 1;
        }
        ran
    }

    #[test]
    fn test_nothing_owed_at_start() {
        let mut tick_loop = TickLoop::new(10); // 100ms period
        assert!(!tick_loop.should_tick());
        assert_eq!(tick_loop.tick_count(), 0);
    }

    #[test]
    fn test_owed_tick_runs_once_paid() {
        let mut tick_loop = TickLoop::new(100); // 10ms
        std::thread::sleep(Duration::from_millis(12));

        let ran = drain(&mut tick_loop);
        assert!(ran >= 1);
        assert_eq!(tick_loop.tick_count(), u64::from(ran));
    }

    #[test]
    fn test_backlog_is_bounded() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(30));

        let ran = drain(&mut tick_loop);
        assert!(ran <= MAX_CATCH_UP_TICKS + 2);
        assert!(tick_loop.stats().dropped_ticks > 0);
    }

    #[test]
    fn test_wait_for_next_tick_paces() {
        let mut tick_loop = TickLoop::new(200); // 5ms
        let begin = Instant::now();
        for _ in 0..3 {
            tick_loop.wait_for_next_tick();
            drain(&mut tick_loop);
        }
        assert!(tick_loop.tick_count() >= 2);
        assert!(begin.elapsed() >= Duration::from_millis(10));
    }
}
