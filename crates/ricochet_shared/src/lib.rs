//! # RICOCHET Shared
//!
//! Value types used by both the predicting client and the authoritative
//! server.
//!
//! ## CRITICAL RULE
//!
//! This crate holds data only. Anything that advances a simulation
//! (movement, reconciliation, hit resolution) lives in `ricochet_netcode`,
//! so that a client build and a server build can never disagree about the
//! shape of a command or a snapshot.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod math;
pub mod protocol;

pub use constants::{HISTORY_WINDOW_SECS, MAX_PLAYERS, TICK_RATE};
pub use events::EffectEvent;
pub use math::{Vec2, Vec3};
pub use protocol::{
    AuthoritativeState, DamageEvent, EntityId, FireRequest, HistoryFrame, InputCommand,
    InputError, StateUpdate, Tick,
};
