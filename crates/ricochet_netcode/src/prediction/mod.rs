//! # Client-Side Prediction
//!
//! Predict local player movement for responsive gameplay.
//!
//! ## How It Works
//!
//! 1. Client enqueues a command and applies it locally at once
//! 2. The command goes to the server and stays buffered here
//! 3. Server applies it and broadcasts authoritative state + ack
//! 4. Client drops acked commands and replays the rest from the
//!    authoritative state
//!
//! ```text
//! Input:      [1] [2] [3] [4] [5]
//!              │   │   │   │   │
//! Prediction: [P1][P2][P3][P4][P5]
//!                  │
//! Server Ack: ────[S2]────────────
//!                  │
//! Reconcile:  drift = |P5 - S2|
//!             drift > threshold: snap to S2, replay [3,4,5]
//!             otherwise:         keep position, replay [3,4,5] from S2
//! ```
//!
//! Corrections never blend. A partial lerp toward the server leaves the
//! client permanently between two truths and oscillates under latency.

use std::collections::VecDeque;

use ricochet_shared::{AuthoritativeState, InputCommand, StateUpdate, Vec3};

use crate::config::NetcodeConfig;
use crate::error::{PredictionError, PredictionResult};
use crate::movement::{Body, FlatGround, MovementModel, MovementPhase, PhysicsModel};

/// State owned by the predicting client. Never transmitted.
pub type PredictedState = Body;

/// Outcome of one authoritative update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciliation {
    /// Drift within threshold; position kept, replay refreshed the rest.
    Confirmed {
        /// Distance between prediction and server
        drift: f32,
        /// Commands replayed
        replayed: usize,
    },
    /// Drift above threshold; snapped to the server and replayed.
    Corrected {
        /// Distance between prediction and server
        drift: f32,
        /// Commands replayed
        replayed: usize,
    },
    /// Ack older than one already processed; ignored.
    Stale,
}

/// Prediction statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PredictionStats {
    /// Commands applied locally
    pub predicted: u64,
    /// Updates that snapped
    pub corrections: u64,
    /// Updates within threshold
    pub confirmations: u64,
    /// Commands replayed across all updates
    pub replayed: u64,
    /// Largest drift seen
    pub max_drift: f32,
    /// Commands dropped because the buffer was full
    pub overflowed: u64,
}

/// Buffer of unacknowledged commands plus the predicted body they produced.
pub struct PredictionBuffer<P = FlatGround> {
    model: MovementModel,
    physics: P,
    state: PredictedState,
    phase: MovementPhase,
    pending: VecDeque<InputCommand>,
    capacity: usize,
    threshold: f32,
    newest_sequence: Option<u32>,
    last_ack: Option<u32>,
    stats: PredictionStats,
}

impl PredictionBuffer<FlatGround> {
    /// Creates a buffer using the flat-ground physics from `config`.
    #[must_use]
    pub fn new(config: &NetcodeConfig, spawn: Vec3) -> Self {
        Self::with_physics(config, spawn, FlatGround::from_config(&config.movement))
    }
}

impl<P: PhysicsModel> PredictionBuffer<P> {
    /// Creates a buffer with a custom physics collaborator.
    #[must_use]
    pub fn with_physics(config: &NetcodeConfig, spawn: Vec3, physics: P) -> Self {
        let capacity = config.prediction.capacity.max(1);
        Self {
            model: MovementModel::new(config.movement, config.simulation.tick_rate),
            physics,
            state: Body::at(spawn),
            phase: MovementPhase::Idle,
            pending: VecDeque::with_capacity(capacity),
            capacity,
            threshold: config.prediction.reconciliation_threshold,
            newest_sequence: None,
            last_ack: None,
            stats: PredictionStats::default(),
        }
    }

    /// Applies `cmd` to the predicted body and buffers it for replay.
    ///
    /// When the buffer is full the oldest command is dropped.
    ///
    /// # Errors
    ///
    /// [`PredictionError::StaleSequence`] if `cmd.sequence` is not newer
    /// than every command seen so far. State is untouched in that case.
    pub fn enqueue(&mut self, cmd: InputCommand) -> PredictionResult<MovementPhase> {
        let newest = self.newest_sequence.max(self.last_ack);
        if let Some(newest) = newest {
            if cmd.sequence <= newest {
                return Err(PredictionError::StaleSequence {
                    sequence: cmd.sequence,
                    newest,
                });
            }
        }

        self.phase = self.model.step(&mut self.state, &cmd, &self.physics);
        self.newest_sequence = Some(cmd.sequence);
        self.stats.predicted += 1;

        if self.pending.len() == self.capacity {
            self.pending.pop_front();
            self.stats.overflowed += 1;
        }
        self.pending.push_back(cmd);

        Ok(self.phase)
    }

    /// Reconciles against a server snapshot.
    ///
    /// Calling twice with the same arguments leaves the predicted state as
    /// the first call left it.
    pub fn on_authoritative_update(
        &mut self,
        state: &AuthoritativeState,
        ack_sequence: Option<u32>,
    ) -> Reconciliation {
        if let (Some(ack), Some(last)) = (ack_sequence, self.last_ack) {
            if ack < last {
                return Reconciliation::Stale;
            }
        }
        if ack_sequence.is_some() {
            self.last_ack = ack_sequence;
        }

        if let Some(ack) = ack_sequence {
            while self.pending.front().is_some_and(|cmd| cmd.sequence <= ack) {
                self.pending.pop_front();
            }
        }

        let drift = self.state.position.distance(state.position);

        let mut replayed_body = Body::from_state(state);
        let mut phase = MovementPhase::of(&replayed_body);
        for cmd in &self.pending {
            phase = self.model.step(&mut replayed_body, cmd, &self.physics);
        }
        let replayed = self.pending.len();
        self.stats.replayed += replayed as u64;
        self.stats.max_drift = self.stats.max_drift.max(drift);

        if drift > self.threshold {
            self.state = replayed_body;
            self.phase = phase;
            self.stats.corrections += 1;
            tracing::debug!(drift, replayed, "prediction corrected by server");
            Reconciliation::Corrected { drift, replayed }
        } else {
            let position = self.state.position;
            self.state = replayed_body;
            self.state.position = position;
            self.phase = phase;
            self.stats.confirmations += 1;
            Reconciliation::Confirmed { drift, replayed }
        }
    }

    /// Convenience for a replicated [`StateUpdate`].
    pub fn apply_update(&mut self, update: &StateUpdate) -> Reconciliation {
        self.on_authoritative_update(&update.state, update.ack_sequence)
    }

    /// Position and yaw to render for the owning client.
    #[must_use]
    pub const fn render_transform(&self) -> (Vec3, f32) {
        (self.state.position, self.state.yaw)
    }

    /// Current predicted body
    #[must_use]
    pub const fn predicted(&self) -> &PredictedState {
        &self.state
    }

    /// Phase after the last step or replay
    #[must_use]
    pub const fn phase(&self) -> MovementPhase {
        self.phase
    }

    /// Commands still waiting for an ack
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sequences still waiting for an ack, oldest first
    pub fn pending_sequences(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().map(|cmd| cmd.sequence)
    }

    /// Last ack processed
    #[must_use]
    pub const fn last_ack(&self) -> Option<u32> {
        self.last_ack
    }

    /// Prediction statistics
    #[must_use]
    pub const fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    /// Drops every buffered command and restarts from `state`.
    pub fn reset(&mut self, state: &AuthoritativeState) {
        self.state = Body::from_state(state);
        self.phase = MovementPhase::of(&self.state);
        self.pending.clear();
        self.newest_sequence = None;
        self.last_ack = None;
    }
}
