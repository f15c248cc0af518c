//! # History Store
//!
//! Per-entity record of recent authoritative poses, the substrate for lag
//! compensation.
//!
//! ## Retention
//!
//! Retention is a fixed DURATION, not a frame count. Frames are evicted while
//! `newest.time - oldest.time > window`, so a stalled entity keeps its last
//! second of history no matter how few frames that is.
//!
//! ## Rewind Contract
//!
//! ```text
//! frames:     [t0] [t1] [t2] [t3]          (t0 oldest, t3 newest)
//! at < t0              -> t0               (before the window: oldest)
//! t1 <= at < t2        -> t1               (closest frame at or before)
//! at >= t3             -> t3               (after newest: newest)
//! ```
//!
//! Never extrapolates.

use std::collections::{BTreeMap, VecDeque};

use ricochet_shared::{EntityId, HistoryFrame};

/// Slack applied when comparing frame times, absorbing f32 rounding between
/// tick-derived timestamps and client-derived ones.
const TIME_EPSILON: f32 = 1e-4;

/// Bounded-duration pose history for every live entity.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    window: f32,
    frames: BTreeMap<EntityId, VecDeque<HistoryFrame>>,
}

impl HistoryStore {
    /// Creates an empty store retaining `window_secs` of history.
    #[must_use]
    pub fn new(window_secs: f32) -> Self {
        Self {
            window: window_secs.max(0.0),
            frames: BTreeMap::new(),
        }
    }

    /// Retention window in seconds
    #[must_use]
    pub const fn window(&self) -> f32 {
        self.window
    }

    /// Appends a frame for `entity` and trims that entity to the window.
    ///
    /// A frame for the same tick as the newest replaces it; a frame older
    /// than the newest is ignored.
    pub fn record(&mut self, entity: EntityId, frame: HistoryFrame) {
        let frames = self.frames.entry(entity).or_default();
        match frames.back() {
            Some(last) if frame.tick < last.tick => return,
            Some(last) if frame.tick == last.tick => {
                frames.pop_back();
            }
            _ => {}
        }
        frames.push_back(frame);
        trim(frames, self.window);
    }

    /// Evicts frames older than `now - window` for every entity.
    ///
    /// Entities left with no frames are forgotten.
    pub fn evict_older_than(&mut self, now: f32) {
        let cutoff = now - self.window;
        self.frames.retain(|_, frames| {
            while frames.front().is_some_and(|f| f.time < cutoff - TIME_EPSILON) {
                frames.pop_front();
            }
            !frames.is_empty()
        });
    }

    /// The recorded pose of `entity` closest to, and not after, `at_time`.
    ///
    /// Returns the oldest frame when `at_time` predates the window and the
    /// newest when it is after the newest. `None` only when the entity has
    /// no history at all.
    #[must_use]
    pub fn rewind(&self, entity: EntityId, at_time: f32) -> Option<HistoryFrame> {
        let frames = self.frames.get(&entity)?;
        let after = frames.partition_point(|f| f.time <= at_time + TIME_EPSILON);
        if after == 0 {
            frames.front().copied()
        } else {
            frames.get(after - 1).copied()
        }
    }

    /// Clamps a shooter's claimed timestamp into the rewindable range.
    ///
    /// Non-finite claims resolve to `now`.
    #[must_use]
    pub fn compensated_time(&self, now: f32, claimed: f32) -> f32 {
        if !claimed.is_finite() {
            return now;
        }
        // now - (now - claimed), i.e. the claim itself, bounded by the window
        claimed.clamp(now - self.window, now)
    }

    /// Drops all history for `entity` (disconnect).
    pub fn remove(&mut self, entity: EntityId) {
        self.frames.remove(&entity);
    }

    /// Newest frame for `entity`
    #[must_use]
    pub fn newest(&self, entity: EntityId) -> Option<HistoryFrame> {
        self.frames.get(&entity).and_then(|f| f.back().copied())
    }

    /// Oldest frame for `entity`
    #[must_use]
    pub fn oldest(&self, entity: EntityId) -> Option<HistoryFrame> {
        self.frames.get(&entity).and_then(|f| f.front().copied())
    }

    /// Frames held for `entity`
    #[must_use]
    pub fn len(&self, entity: EntityId) -> usize {
        self.frames.get(&entity).map_or(0, VecDeque::len)
    }

    /// True when no entity has history
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Entities with at least one frame
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.frames.keys().copied()
    }
}

fn trim(frames: &mut VecDeque<HistoryFrame>, window: f32) {
    let Some(newest) = frames.back().map(|f| f.time) else {
        return;
    };
    while frames
        .front()
        .is_some_and(|oldest| newest - oldest.time > window + TIME_EPSILON)
    {
        frames.pop_front();
    }
}
