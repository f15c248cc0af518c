//! # Configuration
//!
//! Tunables for one match, loaded once at startup from TOML. Every section
//! and field is optional; anything missing falls back to the defaults below.
//!
//! ```toml
//! [simulation]
//! tick_rate = 60
//! max_players = 8
//!
//! [sequencing]
//! gap_timeout_ms = 250
//! ```

use std::path::Path;
use std::time::Duration;

use ricochet_shared::constants::{MAX_LOOK_DELTA_YAW, MOVE_MAGNITUDE_EPSILON};
use ricochet_shared::{Vec3, HISTORY_WINDOW_SECS, MAX_PLAYERS, TICK_RATE};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::{
    DEFAULT_MOVE_SPEED, DEFAULT_ROTATION_SPEED, PREDICTION_BUFFER_SIZE, RECONCILIATION_THRESHOLD,
};

/// Full configuration for a session.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetcodeConfig {
    /// Clock and capacity
    pub simulation: SimulationConfig,
    /// Movement model
    pub movement: MovementConfig,
    /// Client prediction
    pub prediction: PredictionConfig,
    /// Per-owner command ordering
    pub sequencing: SequencingConfig,
    /// Lag-compensation history
    pub history: HistoryConfig,
    /// Weapon and damage
    pub weapon: WeaponConfig,
}

/// Clock and capacity settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Authoritative ticks per second
    pub tick_rate: u32,
    /// Connection approval limit
    pub max_players: usize,
    /// Commands released per entity per tick
    pub max_commands_per_tick: usize,
    /// Spawn positions, handed out round-robin
    pub spawn_points: Vec<[f32; 3]>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            max_players: MAX_PLAYERS,
            max_commands_per_tick: 1,
            spawn_points: vec![[0.0, 0.0, 0.0]],
        }
    }
}

impl SimulationConfig {
    /// Seconds per tick
    #[must_use]
    pub fn tick_duration_secs(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Spawn point for the `n`th connection.
    #[must_use]
    pub fn spawn_point(&self, n: usize) -> Vec3 {
        if self.spawn_points.is_empty() {
            return Vec3::ZERO;
        }
        Vec3::from_array(self.spawn_points[n % self.spawn_points.len()])
    }
}

/// Movement model settings. Client and server must use identical values.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Horizontal speed (units/s)
    pub move_speed: f32,
    /// Yaw degrees per unit of look input per second
    pub rotation_speed: f32,
    /// Vertical speed set by a jump
    pub jump_impulse: f32,
    /// Downward acceleration
    pub gravity: f32,
    /// Height of the flat ground plane
    pub ground_height: f32,
    /// Largest accepted `|move_direction|`
    pub max_move_magnitude: f32,
    /// Largest accepted `|look_delta_yaw|`
    pub max_look_delta: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: DEFAULT_MOVE_SPEED,
            rotation_speed: DEFAULT_ROTATION_SPEED,
            jump_impulse: 7.0,
            gravity: 9.81,
            ground_height: 0.0,
            max_move_magnitude: 1.0 + MOVE_MAGNITUDE_EPSILON,
            max_look_delta: MAX_LOOK_DELTA_YAW,
        }
    }
}

/// Client prediction settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Unacknowledged commands kept for replay
    pub capacity: usize,
    /// Drift above which the client snaps to the server
    pub reconciliation_threshold: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            capacity: PREDICTION_BUFFER_SIZE,
            reconciliation_threshold: RECONCILIATION_THRESHOLD,
        }
    }
}

/// Per-owner command ordering settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SequencingConfig {
    /// How long a missing sequence may block later ones
    pub gap_timeout_ms: u64,
    /// Out-of-order commands held per owner before force-advancing
    pub max_pending: usize,
    /// Bounded inbound queue per connection
    pub queue_capacity: usize,
}

impl Default for SequencingConfig {
    fn default() -> Self {
        Self {
            gap_timeout_ms: 250,
            max_pending: 128,
            queue_capacity: 256,
        }
    }
}

impl SequencingConfig {
    /// Gap timeout expressed in whole ticks (at least one).
    #[must_use]
    pub fn gap_timeout_ticks(&self, tick_rate: u32) -> u64 {
        let ticks = (self.gap_timeout_ms * u64::from(tick_rate)).div_ceil(1000);
        ticks.max(1)
    }

    /// Gap timeout as a duration
    #[must_use]
    pub const fn gap_timeout(&self) -> Duration {
        Duration::from_millis(self.gap_timeout_ms)
    }
}

/// Lag-compensation history settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Retention window
    pub window_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_ms: (HISTORY_WINDOW_SECS * 1000.0) as u64,
        }
    }
}

impl HistoryConfig {
    /// Retention window in seconds
    #[must_use]
    pub fn window_secs(&self) -> f32 {
        self.window_ms as f32 / 1000.0
    }
}

/// Weapon and damage settings.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeaponConfig {
    /// Shots per second
    pub fire_rate: f32,
    /// Damage per hit
    pub damage: u32,
    /// Maximum hit distance
    pub range: f32,
    /// Magazine size
    pub capacity: u32,
    /// Geometry layers a shot can hit
    pub layer_mask: u32,
    /// Player hitbox half extents
    pub hitbox_half_extents: [f32; 3],
    /// Starting health per player
    pub max_health: u32,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            fire_rate: 10.0,
            damage: 25,
            range: 100.0,
            capacity: 30,
            layer_mask: u32::MAX,
            hitbox_half_extents: [0.4, 1.0, 0.4],
            max_health: 100,
        }
    }
}

impl WeaponConfig {
    /// Minimum whole ticks between accepted shots (at least one).
    ///
    /// Rounded up, so a weapon never fires faster than `fire_rate`.
    #[must_use]
    pub fn fire_interval_ticks(&self, tick_rate: u32) -> u64 {
        let ticks = (f64::from(tick_rate) / f64::from(self.fire_rate) - 1e-9).ceil();
        if ticks.is_finite() && ticks >= 1.0 {
            ticks as u64
        } else {
            1
        }
    }
}

impl NetcodeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`]
    /// when a value is out of range.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks that every rate and capacity is usable.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")))
            }
        }

        if self.simulation.tick_rate == 0 {
            return Err(ConfigError::Invalid("simulation.tick_rate must be non-zero".into()));
        }
        if self.simulation.max_players == 0 {
            return Err(ConfigError::Invalid("simulation.max_players must be non-zero".into()));
        }
        if self.simulation.max_commands_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "simulation.max_commands_per_tick must be non-zero".into(),
            ));
        }
        if self.prediction.capacity == 0 {
            return Err(ConfigError::Invalid("prediction.capacity must be non-zero".into()));
        }
        if self.sequencing.queue_capacity == 0 || self.sequencing.max_pending == 0 {
            return Err(ConfigError::Invalid(
                "sequencing queue sizes must be non-zero".into(),
            ));
        }
        if self.history.window_ms == 0 {
            return Err(ConfigError::Invalid("history.window_ms must be non-zero".into()));
        }
        positive("movement.move_speed", self.movement.move_speed)?;
        positive("movement.max_move_magnitude", self.movement.max_move_magnitude)?;
        positive("movement.max_look_delta", self.movement.max_look_delta)?;
        positive("weapon.fire_rate", self.weapon.fire_rate)?;
        positive("weapon.range", self.weapon.range)?;
        if self.prediction.reconciliation_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "prediction.reconciliation_threshold must not be negative".into(),
            ));
        }
        Ok(())
    }
}
