//! # Protocol Constants
//!
//! Defaults baked into both client and server. Every runtime-tunable value
//! also exists in `ricochet_netcode::config`, which starts from these.

// =============================================================================
// SIMULATION CLOCK
// =============================================================================

/// Tick rate (authoritative updates per second)
pub const TICK_RATE: u32 = 60;

/// Maximum players per session
pub const MAX_PLAYERS: usize = 8;

// =============================================================================
// INPUT SHAPE
// =============================================================================

/// Tolerance above unit length accepted for `move_direction`
pub const MOVE_MAGNITUDE_EPSILON: f32 = 0.1;

/// Largest per-command yaw delta the server accepts
pub const MAX_LOOK_DELTA_YAW: f32 = 100.0;

// =============================================================================
// LAG COMPENSATION
// =============================================================================

/// How far back the server keeps movement history
pub const HISTORY_WINDOW_SECS: f32 = 1.0;
