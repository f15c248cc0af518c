//! # Authoritative Movement Simulator
//!
//! The single writer of movement truth.
//!
//! ## Per-Entity State Machine
//!
//! ```text
//!        move          jump
//!  Idle ──────► Moving ─────► Airborne
//!   ▲  ◄──────    │              │
//!   │   stop      └── jump ──────┤
//!   └──────────── land ──────────┘
//! ```
//!
//! Each tick an entity consumes at most its oldest released command. Invalid
//! commands are dropped (never clamped) but still consumed, so the ack moves
//! on and the owner's stream never stalls.

use std::collections::BTreeMap;

use ricochet_shared::{EntityId, InputCommand, Vec3};

use crate::error::CommandRejected;
use crate::geometry::TargetPose;
use crate::movement::{Body, MovementModel, MovementPhase, PhysicsModel};

/// Simulated entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimEntity {
    /// Kinematic body
    pub body: Body,
    /// Phase after the last step
    pub phase: MovementPhase,
    /// Last consumed sequence (applied or rejected)
    pub last_processed: Option<u32>,
}

/// Simulator statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Commands applied
    pub applied: u64,
    /// Commands dropped by validation
    pub rejected: u64,
    /// Ticks stepped without a command
    pub idle_steps: u64,
}

/// Server-side movement authority for every entity in a session.
#[derive(Debug)]
pub struct AuthoritativeSimulator<P> {
    model: MovementModel,
    physics: P,
    entities: BTreeMap<EntityId, SimEntity>,
    stats: SimulatorStats,
}

impl<P: PhysicsModel> AuthoritativeSimulator<P> {
    /// Creates an empty simulator.
    #[must_use]
    pub fn new(model: MovementModel, physics: P) -> Self {
        Self {
            model,
            physics,
            entities: BTreeMap::new(),
            stats: SimulatorStats::default(),
        }
    }

    /// Adds a grounded, idle entity at `position`.
    pub fn spawn(&mut self, entity: EntityId, position: Vec3) {
        self.entities.insert(
            entity,
            SimEntity {
                body: Body::at(position),
                phase: MovementPhase::Idle,
                last_processed: None,
            },
        );
    }

    /// Removes an entity.
    pub fn despawn(&mut self, entity: EntityId) -> Option<SimEntity> {
        self.entities.remove(&entity)
    }

    /// Validates and applies one command.
    ///
    /// # Errors
    ///
    /// [`CommandRejected`] when the command fails validation (it is still
    /// consumed) or the entity does not exist.
    pub fn apply_command(
        &mut self,
        entity: EntityId,
        command: &InputCommand,
    ) -> Result<Body, CommandRejected> {
        let model = &self.model;
        let sim = self
            .entities
            .get_mut(&entity)
            .ok_or(CommandRejected::UnknownEntity(entity))?;

        sim.last_processed = Some(command.sequence);

        if let Err(reason) = model.validate(command) {
            self.stats.rejected += 1;
            tracing::warn!(
                %entity,
                sequence = command.sequence,
                %reason,
                "command rejected"
            );
            return Err(reason);
        }

        let phase = model.step(&mut sim.body, command, &self.physics);
        transition(entity, sim, phase);
        self.stats.applied += 1;
        Ok(sim.body)
    }

    /// Steps an entity that had no command this tick.
    pub fn idle_step(&mut self, entity: EntityId) -> Option<Body> {
        let sim = self.entities.get_mut(&entity)?;
        let phase = self.model.idle_step(&mut sim.body, &self.physics);
        transition(entity, sim, phase);
        self.stats.idle_steps += 1;
        Some(sim.body)
    }

    /// Simulated entity
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> Option<&SimEntity> {
        self.entities.get(&entity)
    }

    /// Body of an entity
    #[must_use]
    pub fn body(&self, entity: EntityId) -> Option<&Body> {
        self.entities.get(&entity).map(|sim| &sim.body)
    }

    /// Last sequence consumed for an entity
    #[must_use]
    pub fn last_processed(&self, entity: EntityId) -> Option<u32> {
        self.entities.get(&entity).and_then(|sim| sim.last_processed)
    }

    /// All entities in id order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &SimEntity)> + '_ {
        self.entities.iter().map(|(id, sim)| (*id, sim))
    }

    /// Live poses of every entity, written into `out` (cleared first).
    pub fn poses_into(&self, out: &mut Vec<TargetPose>) {
        out.clear();
        out.extend(
            self.entities
                .iter()
                .map(|(id, sim)| TargetPose::player(*id, sim.body.position, sim.body.yaw)),
        );
    }

    /// Number of entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no entity is simulated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Movement model in use
    #[must_use]
    pub const fn model(&self) -> &MovementModel {
        &self.model
    }

    /// Simulator statistics
    #[must_use]
    pub const fn stats(&self) -> &SimulatorStats {
        &self.stats
    }
}

fn transition(entity: EntityId, sim: &mut SimEntity, phase: MovementPhase) {
    if sim.phase != phase {
        tracing::trace!(%entity, from = ?sim.phase, to = ?phase, "movement phase");
        sim.phase = phase;
    }
}
