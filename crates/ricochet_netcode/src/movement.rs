//! # Movement Model
//!
//! The one integration step shared by client prediction and the
//! authoritative simulator. Both sides MUST run exactly this code with the
//! same [`MovementConfig`]; any divergence shows up as reconciliation drift.
//!
//! ## Step Order
//!
//! ```text
//! 1. horizontal velocity = move_direction rotated by CURRENT yaw * speed
//! 2. jump                 (only if grounded)
//! 3. yaw += look_delta * rotation_speed * dt
//! 4. physics.integrate    (gravity, position, ground)
//! ```
//!
//! No clocks, no randomness, no hash iteration: same body plus same
//! commands gives bit-identical output.

use ricochet_shared::math::{wrap_degrees, yaw_to_world};
use ricochet_shared::{AuthoritativeState, InputCommand, Vec3};

use crate::config::MovementConfig;
use crate::error::CommandRejected;

/// Kinematic state of one simulated body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Body {
    /// World position
    pub position: Vec3,
    /// Facing in degrees, `[0, 360)`
    pub yaw: f32,
    /// Current velocity
    pub velocity: Vec3,
    /// Standing on the ground
    pub grounded: bool,
}

impl Body {
    /// A grounded body at rest.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            velocity: Vec3::ZERO,
            grounded: true,
        }
    }

    /// Rebuilds the body described by an authoritative snapshot.
    ///
    /// Horizontal velocity is recomputed by the next step from the command,
    /// so only the vertical part is carried.
    #[must_use]
    pub const fn from_state(state: &AuthoritativeState) -> Self {
        Self {
            position: state.position,
            yaw: state.yaw,
            velocity: Vec3::new(0.0, state.vertical_velocity, 0.0),
            grounded: state.grounded,
        }
    }
}

/// Coarse locomotion state, derived after every step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MovementPhase {
    /// Grounded, not moving
    #[default]
    Idle,
    /// Grounded, moving horizontally
    Moving,
    /// In the air
    Airborne,
}

impl MovementPhase {
    /// Phase of a body as it stands now.
    #[must_use]
    pub fn of(body: &Body) -> Self {
        if !body.grounded {
            Self::Airborne
        } else if body.velocity.horizontal().length_squared() > f32::EPSILON {
            Self::Moving
        } else {
            Self::Idle
        }
    }
}

// =============================================================================
// PHYSICS COLLABORATOR
// =============================================================================

/// Vertical motion and ground resolution.
///
/// The engine's character controller implements this in production; the
/// core only needs the contract: integrate one tick, deterministically.
pub trait PhysicsModel {
    /// Advances `body` by `dt` seconds using its current velocity.
    fn integrate(&self, body: &mut Body, dt: f32);
}

/// Infinite flat floor with constant gravity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatGround {
    /// Downward acceleration
    pub gravity: f32,
    /// Floor height
    pub height: f32,
}

impl FlatGround {
    /// Floor and gravity taken from the movement config.
    #[must_use]
    pub const fn from_config(config: &MovementConfig) -> Self {
        Self {
            gravity: config.gravity,
            height: config.ground_height,
        }
    }
}

impl Default for FlatGround {
    fn default() -> Self {
        Self::from_config(&MovementConfig::default())
    }
}

impl PhysicsModel for FlatGround {
    fn integrate(&self, body: &mut Body, dt: f32) {
        // Resting bodies keep an exact zero vertical velocity.
        if !body.grounded || body.velocity.y > 0.0 {
            body.velocity.y -= self.gravity * dt;
        }

        body.position += body.velocity * dt;

        if body.position.y <= self.height {
            body.position.y = self.height;
            body.velocity.y = body.velocity.y.max(0.0);
            body.grounded = true;
        } else {
            body.grounded = false;
        }
    }
}

// =============================================================================
// MOVEMENT MODEL
// =============================================================================

/// Deterministic per-tick movement integrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementModel {
    config: MovementConfig,
    dt: f32,
}

impl MovementModel {
    /// Creates a model stepping at `tick_rate` Hz.
    #[must_use]
    pub fn new(config: MovementConfig, tick_rate: u32) -> Self {
        Self {
            config,
            dt: 1.0 / tick_rate.max(1) as f32,
        }
    }

    /// Seconds per step
    #[must_use]
    pub const fn dt(&self) -> f32 {
        self.dt
    }

    /// Movement settings
    #[must_use]
    pub const fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Checks an untrusted command against the physical caps.
    ///
    /// Fails closed: out-of-range commands are rejected, never clamped.
    ///
    /// # Errors
    ///
    /// [`CommandRejected`] describing the first violated cap.
    pub fn validate(&self, cmd: &InputCommand) -> Result<(), CommandRejected> {
        if !cmd.move_direction.is_finite()
            || !cmd.look_delta_yaw.is_finite()
            || !cmd.client_timestamp.is_finite()
        {
            return Err(CommandRejected::NonFinite);
        }
        let magnitude = cmd.move_direction.length();
        if magnitude > self.config.max_move_magnitude {
            return Err(CommandRejected::MoveMagnitude {
                magnitude,
                cap: self.config.max_move_magnitude,
            });
        }
        if cmd.look_delta_yaw.abs() > self.config.max_look_delta {
            return Err(CommandRejected::LookRate {
                delta: cmd.look_delta_yaw,
                cap: self.config.max_look_delta,
            });
        }
        Ok(())
    }

    /// Applies one command to `body` and returns the resulting phase.
    pub fn step<P>(&self, body: &mut Body, cmd: &InputCommand, physics: &P) -> MovementPhase
    where
        P: PhysicsModel + ?Sized,
    {
        let planar = yaw_to_world(cmd.move_direction, body.yaw) * self.config.move_speed;
        body.velocity.x = planar.x;
        body.velocity.z = planar.z;

        if cmd.jump() && body.grounded {
            body.velocity.y = self.config.jump_impulse;
        }

        body.yaw = wrap_degrees(body.yaw + cmd.look_delta_yaw * self.config.rotation_speed * self.dt);

        physics.integrate(body, self.dt);
        MovementPhase::of(body)
    }

    /// A tick with no command: horizontal motion stops, gravity still acts.
    pub fn idle_step<P>(&self, body: &mut Body, physics: &P) -> MovementPhase
    where
        P: PhysicsModel + ?Sized,
    {
        body.velocity.x = 0.0;
        body.velocity.z = 0.0;
        physics.integrate(body, self.dt);
        MovementPhase::of(body)
    }
}

impl Default for MovementModel {
    fn default() -> Self {
        Self::new(MovementConfig::default(), ricochet_shared::TICK_RATE)
    }
}
