//! # Command Sequencer
//!
//! Per-owner ordering of inbound commands.
//!
//! ## Rules
//!
//! - Streams start at [`FIRST_SEQUENCE`]
//! - Commands are released strictly in `sequence` order
//! - Out-of-order arrivals wait in a reorder buffer
//! - Duplicates and anything below the next expected sequence are dropped
//! - A missing sequence blocks later ones until it arrives OR the gap timeout
//!   elapses, then the stream skips to the lowest buffered sequence
//! - The buffer never holds more than `max_pending` commands: pushing past
//!   the bound evicts the oldest one and the stream moves past it
//!
//! ```text
//! arrive:   3 | 1 2      arrive:   1 3 . . . . (2 lost)
//! release:  - | 1 2 3    release:  1 - - - - 3  (after gap timeout)
//! ```

use std::collections::BTreeMap;

use ricochet_shared::{InputCommand, Tick};

/// Sequence number every client stream begins with.
pub const FIRST_SEQUENCE: u32 = 1;

/// What happened to a pushed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Waiting for release
    Buffered,
    /// Buffered, but the buffer was full and its oldest command was dropped
    Overflowed {
        /// Sequence given up on
        evicted: u32,
    },
    /// Same sequence already buffered
    Duplicate,
    /// Below the next expected sequence
    Stale,
}

/// A command leaving the sequencer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Released {
    /// The command
    pub command: InputCommand,
    /// Sequences given up on to release it (0 when contiguous)
    pub skipped: u32,
}

/// Sequencer statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequencerStats {
    /// Commands released
    pub released: u64,
    /// Duplicates dropped
    pub duplicates: u64,
    /// Stale commands dropped
    pub stale: u64,
    /// Commands evicted from a full buffer
    pub overflowed: u64,
    /// Gaps force-advanced
    pub gaps: u64,
    /// Sequences skipped across all gaps
    pub skipped: u64,
}

/// Reorder buffer for one owner.
#[derive(Clone, Debug)]
pub struct CommandSequencer {
    pending: BTreeMap<u32, InputCommand>,
    next_expected: u32,
    last_released: Option<u32>,
    blocked_since: Option<Tick>,
    gap_timeout_ticks: u64,
    max_pending: usize,
    stats: SequencerStats,
}

impl CommandSequencer {
    /// Creates an empty sequencer expecting [`FIRST_SEQUENCE`] next.
    #[must_use]
    pub fn new(gap_timeout_ticks: u64, max_pending: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: FIRST_SEQUENCE,
            last_released: None,
            blocked_since: None,
            gap_timeout_ticks,
            max_pending: max_pending.max(1),
            stats: SequencerStats::default(),
        }
    }

    /// Accepts an inbound command.
    pub fn push(&mut self, command: InputCommand) -> PushOutcome {
        if command.sequence < self.next_expected {
            self.stats.stale += 1;
            return PushOutcome::Stale;
        }
        if self.pending.contains_key(&command.sequence) {
            self.stats.duplicates += 1;
            return PushOutcome::Duplicate;
        }
        self.pending.insert(command.sequence, command);

        if self.pending.len() <= self.max_pending {
            return PushOutcome::Buffered;
        }
        let Some((evicted, _)) = self.pending.pop_first() else {
            return PushOutcome::Buffered;
        };
        self.next_expected = self.next_expected.max(evicted.saturating_add(1));
        self.blocked_since = None;
        self.stats.overflowed += 1;
        tracing::debug!(evicted, max_pending = self.max_pending, "reorder buffer overflow");
        PushOutcome::Overflowed { evicted }
    }

    /// Releases the next command if ordering allows it at tick `now`.
    pub fn next_ready(&mut self, now: Tick) -> Option<Released> {
        let (&lowest, _) = self.pending.first_key_value()?;
        let expected = self.next_expected;

        let skipped = if lowest == expected {
            0
        } else {
            let since = *self.blocked_since.get_or_insert(now);
            if now.saturating_sub(since) < self.gap_timeout_ticks {
                return None;
            }
            let skipped = lowest.saturating_sub(expected);
            self.stats.gaps += 1;
            self.stats.skipped += u64::from(skipped);
            tracing::debug!(expected, resumed_at = lowest, skipped, "ordering gap force-advanced");
            skipped
        };

        let command = self.pending.remove(&lowest)?;
        self.last_released = Some(lowest);
        self.next_expected = lowest.saturating_add(1);
        self.blocked_since = None;
        self.stats.released += 1;
        Some(Released { command, skipped })
    }

    /// Last released sequence
    #[must_use]
    pub const fn last_released(&self) -> Option<u32> {
        self.last_released
    }

    /// Sequence that releases without waiting
    #[must_use]
    pub const fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// Commands waiting in the reorder buffer
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True while a gap is holding back buffered commands
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        self.blocked_since.is_some()
    }

    /// Sequencer statistics
    #[must_use]
    pub const fn stats(&self) -> &SequencerStats {
        &self.stats
    }

    /// Drops every buffered command.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.blocked_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ricochet_shared::Vec2;

    fn cmd(sequence: u32) -> InputCommand {
        InputCommand::new(sequence, Vec2::ZERO, 0.0, 0.0).unwrap()
    }

    fn drain(seq: &mut CommandSequencer, now: Tick) -> Vec<u32> {
        std::iter::from_fn(|| seq.next_ready(now))
            .map(|r| r.command.sequence)
            .collect()
    }

    #[test]
    fn test_reorders() {
        let mut seq = CommandSequencer::new(15, 128);
        for s in [3, 1, 2] {
            assert_eq!(seq.push(cmd(s)), PushOutcome::Buffered);
        }
        assert_eq!(drain(&mut seq, 0), vec![1, 2, 3]);
    }

    #[test]
    fn test_first_command_waits_for_lower_sequences() {
        let mut seq = CommandSequencer::new(15, 128);
        seq.push(cmd(3));
        assert!(seq.next_ready(0).is_none());

        seq.push(cmd(1));
        seq.push(cmd(2));
        assert_eq!(drain(&mut seq, 1), vec![1, 2, 3]);
        assert_eq!(seq.stats().gaps, 0);
    }

    #[test]
    fn test_late_starting_stream_released_after_timeout() {
        let mut seq = CommandSequencer::new(15, 128);
        seq.push(cmd(1000));
        seq.push(cmd(1001));
        assert!(seq.next_ready(0).is_none());
        assert!(seq.next_ready(14).is_none());

        let released = seq.next_ready(15).unwrap();
        assert_eq!(released.command.sequence, 1000);
        assert_eq!(released.skipped, 999);
        assert_eq!(drain(&mut seq, 15), vec![1001]);
    }

    #[test]
    fn test_duplicates_and_stale_dropped() {
        let mut seq = CommandSequencer::new(15, 128);
        seq.push(cmd(1));
        assert_eq!(seq.push(cmd(1)), PushOutcome::Duplicate);
        assert_eq!(drain(&mut seq, 0), vec![1]);
        assert_eq!(seq.push(cmd(1)), PushOutcome::Stale);
        assert_eq!(seq.stats().duplicates, 1);
        assert_eq!(seq.stats().stale, 1);
    }

    #[test]
    fn test_gap_blocks_until_timeout() {
        let mut seq = CommandSequencer::new(15, 128);
        seq.push(cmd(1));
        assert_eq!(drain(&mut seq, 0), vec![1]);

        seq.push(cmd(3));
        seq.push(cmd(4));
        assert!(seq.next_ready(1).is_none());
        assert!(seq.is_blocked());
        assert!(seq.next_ready(15).is_none());

        let released = seq.next_ready(16).unwrap();
        assert_eq!(released.command.sequence, 3);
        assert_eq!(released.skipped, 1);
        assert_eq!(drain(&mut seq, 16), vec![4]);
        assert_eq!(seq.stats().gaps, 1);
    }

    #[test]
    fn test_gap_filled_before_timeout() {
        let mut seq = CommandSequencer::new(15, 128);
        seq.push(cmd(1));
        drain(&mut seq, 0);

        seq.push(cmd(3));
        assert!(seq.next_ready(1).is_none());
        seq.push(cmd(2));
        assert_eq!(drain(&mut seq, 2), vec![2, 3]);
        assert_eq!(seq.stats().gaps, 0);
        assert!(!seq.is_blocked());
    }

    #[test]
    fn test_late_arrival_after_skip_is_stale() {
        let mut seq = CommandSequencer::new(1, 128);
        seq.push(cmd(1));
        drain(&mut seq, 0);
        seq.push(cmd(3));
        assert!(seq.next_ready(1).is_none());
        assert_eq!(drain(&mut seq, 2), vec![3]);

        assert_eq!(seq.push(cmd(2)), PushOutcome::Stale);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut seq = CommandSequencer::new(1_000, 4);
        seq.push(cmd(1));
        drain(&mut seq, 0);
        for s in 3..=6 {
            assert_eq!(seq.push(cmd(s)), PushOutcome::Buffered);
        }
        assert_eq!(seq.push(cmd(7)), PushOutcome::Overflowed { evicted: 3 });
        assert_eq!(seq.pending_len(), 4);
        assert_eq!(seq.next_expected(), 4);

        // The gap at 2 went with the eviction: no waiting.
        assert_eq!(drain(&mut seq, 1), vec![4, 5, 6, 7]);
        assert_eq!(seq.push(cmd(3)), PushOutcome::Stale);
        assert_eq!(seq.stats().overflowed, 1);
    }

    #[test]
    fn test_fast_contiguous_sender_stays_bounded() {
        let mut seq = CommandSequencer::new(15, 8);
        let mut sent = 0;
        for tick in 0..100 {
            for _ in 0..2 {
                sent += 1;
                seq.push(cmd(sent));
            }
            seq.next_ready(tick);
            assert!(seq.pending_len() <= 8);
        }
        assert!(seq.last_released().unwrap() >= sent - 8);
    }

    #[test]
    fn test_gap_filled_by_push_into_full_buffer() {
        let mut seq = CommandSequencer::new(1_000, 2);
        seq.push(cmd(3));
        seq.push(cmd(4));
        // 2 becomes the oldest and is the one given up on.
        assert_eq!(seq.push(cmd(2)), PushOutcome::Overflowed { evicted: 2 });
        assert_eq!(drain(&mut seq, 0), vec![3, 4]);
    }
}
