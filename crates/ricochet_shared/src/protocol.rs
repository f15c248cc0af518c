//! Network protocol types shared between client and server.
//!
//! These types cross the replication channel. Both client and server must
//! agree on these definitions; `InputCommand` is additionally a fixed-size
//! `Pod` so it can be copied straight into a datagram.

use crate::constants::MOVE_MAGNITUDE_EPSILON;
use crate::math::{Vec2, Vec3};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical simulation clock. Advanced only by the server's fixed-rate loop.
pub type Tick = u64;

/// Server time in seconds at the start of `tick`.
#[must_use]
pub fn tick_time(tick: Tick, tick_rate: u32) -> f32 {
    (tick as f64 / f64::from(tick_rate.max(1))) as f32
}

/// Identifies one simulated entity (one per player).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Raw id
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Shape violations caught when building an [`InputCommand`] locally.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum InputError {
    /// A component was NaN or infinite
    #[error("input contains a non-finite value")]
    NonFinite,

    /// `move_direction` is longer than unit length plus tolerance
    #[error("move direction magnitude {magnitude} exceeds unit length")]
    MoveMagnitude {
        /// Offending magnitude
        magnitude: f32,
    },
}

/// One tick's worth of player intent.
///
/// `sequence` is strictly increasing per owner. `client_timestamp` is the
/// client's estimate of server time in seconds and is only ever a hint.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct InputCommand {
    /// Per-owner sequence number
    pub sequence: u32,
    /// Planar move intent, x = strafe, y = forward
    pub move_direction: Vec2,
    /// Requested yaw change this tick
    pub look_delta_yaw: f32,
    /// Client's estimate of server time (seconds)
    pub client_timestamp: f32,
    /// `FLAG_JUMP | FLAG_FIRE | FLAG_RELOAD`
    pub flags: u8,
    /// Padding
    pub _pad: [u8; 3],
}

impl InputCommand {
    /// Jump requested
    pub const FLAG_JUMP: u8 = 1 << 0;
    /// Fire held
    pub const FLAG_FIRE: u8 = 1 << 1;
    /// Reload requested
    pub const FLAG_RELOAD: u8 = 1 << 2;

    /// Builds a command, rejecting a non-finite or over-long move direction.
    ///
    /// # Errors
    ///
    /// [`InputError`] when the shape guarantee does not hold.
    pub fn new(
        sequence: u32,
        move_direction: Vec2,
        look_delta_yaw: f32,
        client_timestamp: f32,
    ) -> Result<Self, InputError> {
        if !move_direction.is_finite() || !look_delta_yaw.is_finite() || !client_timestamp.is_finite()
        {
            return Err(InputError::NonFinite);
        }
        let magnitude = move_direction.length();
        if magnitude > 1.0 + MOVE_MAGNITUDE_EPSILON {
            return Err(InputError::MoveMagnitude { magnitude });
        }
        Ok(Self {
            sequence,
            move_direction,
            look_delta_yaw,
            client_timestamp,
            flags: 0,
            _pad: [0; 3],
        })
    }

    /// Sets the jump flag
    #[must_use]
    pub const fn with_jump(mut self) -> Self {
        self.flags |= Self::FLAG_JUMP;
        self
    }

    /// Sets the fire flag
    #[must_use]
    pub const fn with_fire(mut self) -> Self {
        self.flags |= Self::FLAG_FIRE;
        self
    }

    /// Sets the reload flag
    #[must_use]
    pub const fn with_reload(mut self) -> Self {
        self.flags |= Self::FLAG_RELOAD;
        self
    }

    /// Jump requested?
    #[must_use]
    pub const fn jump(&self) -> bool {
        self.flags & Self::FLAG_JUMP != 0
    }

    /// Fire held?
    #[must_use]
    pub const fn fire(&self) -> bool {
        self.flags & Self::FLAG_FIRE != 0
    }

    /// Reload requested?
    #[must_use]
    pub const fn reload(&self) -> bool {
        self.flags & Self::FLAG_RELOAD != 0
    }
}

/// Server-owned state of one entity, replicated read-only to every client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeState {
    /// World position
    pub position: Vec3,
    /// Facing in degrees, `[0, 360)`
    pub yaw: f32,
    /// Vertical speed, needed so a client replay starts from the exact body
    pub vertical_velocity: f32,
    /// Standing on the ground
    pub grounded: bool,
    /// Rounds left in the magazine
    pub ammo: u32,
    /// A shot was accepted this tick
    pub firing: bool,
}

/// One replicated snapshot: an entity's state plus the owner's ack.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Tick this snapshot was taken at
    pub tick: Tick,
    /// Entity the snapshot describes
    pub entity: EntityId,
    /// The state itself
    pub state: AuthoritativeState,
    /// Last command sequence the server consumed for this entity
    pub ack_sequence: Option<u32>,
}

/// A shot as claimed by its owner. Consumed exactly once by the server.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FireRequest {
    /// Muzzle position
    pub origin: Vec3,
    /// Unit aim direction
    pub direction: Vec3,
    /// Server time (seconds) the client believes it was seeing when it fired
    pub claimed_timestamp: f32,
}

impl FireRequest {
    /// Creates a new fire request
    #[must_use]
    pub const fn new(origin: Vec3, direction: Vec3, claimed_timestamp: f32) -> Self {
        Self {
            origin,
            direction,
            claimed_timestamp,
        }
    }
}

/// Damage dealt by one validated hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Entity that was hit
    pub target: EntityId,
    /// Damage amount
    pub amount: u32,
    /// Entity that fired
    pub instigator: EntityId,
}

/// One recorded pose of an entity, used for lag-compensated rewinds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryFrame {
    /// Tick the pose was recorded at
    pub tick: Tick,
    /// Server time (seconds) of `tick`
    pub time: f32,
    /// Position at that tick
    pub position: Vec3,
    /// Yaw at that tick
    pub yaw: f32,
}
