//! # RICOCHET Netcode
//!
//! Movement and combat synchronization for a small-match shooter.
//!
//! ## Architecture
//!
//! - **Prediction**: the client applies its own inputs immediately and
//!   reconciles against authoritative snapshots (snap + replay)
//! - **Authority**: a fixed-tick server simulator is the only writer of
//!   movement truth; commands are applied in per-owner sequence order
//! - **History**: a bounded per-entity pose log lets the server rewind
//!   targets to what a shooter saw
//! - **Weapons**: rate/ammo validated fire resolved against rewound poses
//!
//! ## Trust Model
//!
//! ```text
//! CLIENT                                   SERVER
//!   |                                         |
//!   |--- InputCommand(seq, move, look) ------>| validate, order, simulate
//!   |<-- StateUpdate(state, ack = seq) -------|
//!   |  reconcile: drop <= ack, replay rest    |
//!   |                                         |
//!   |--- FireRequest(origin, dir, T) -------->| rate, ammo, rewind to T
//!   |<-- DamageEvent / EffectEvent -----------|
//! ```
//!
//! The client NEVER determines outcomes. The server ALWAYS validates.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ricochet_netcode::{LocalReplication, NetcodeConfig, Session};
//!
//! let mut session = Session::new(NetcodeConfig::default(), LocalReplication::default());
//! let handle = session.connect()?;
//! handle.send_input(command)?;
//! session.tick();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod history;
pub mod movement;
pub mod prediction;
pub mod replication;
pub mod server;
pub mod weapon;

// Re-exports for convenience
pub use config::NetcodeConfig;
pub use driver::DriverReport;
pub use error::{
    CommandRejected, ConfigError, FireRejection, PredictionError, SessionError, SessionResult,
};
pub use geometry::{GeometryQuery, Hitbox, HitboxGeometry, Ray, RayHit, TargetPose};
pub use history::HistoryStore;
pub use movement::{Body, FlatGround, MovementModel, MovementPhase, PhysicsModel};
pub use prediction::{PredictedState, PredictionBuffer, Reconciliation};
pub use replication::{LocalReplication, NullReplication, Replicated, ReplicationChannel};
pub use server::{ConnectionHandle, Session, SessionStats, TickLoop, TickSummary};
pub use weapon::{FireOutcome, Weapon};

/// Default movement speed (units per second).
pub const DEFAULT_MOVE_SPEED: f32 = 5.0;

/// Default yaw rate multiplier (degrees per second per unit of look input).
pub const DEFAULT_ROTATION_SPEED: f32 = 10.0;

/// Default prediction buffer size (one second at 60Hz).
pub const PREDICTION_BUFFER_SIZE: usize = 60;

/// Default drift above which the client snaps (units).
pub const RECONCILIATION_THRESHOLD: f32 = 0.1;
