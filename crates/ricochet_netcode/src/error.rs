//! # Error Types
//!
//! Nothing in the core is fatal. Every variant here degrades to "drop the
//! request, log it, keep ticking"; callers get the reason back as a value.

use ricochet_shared::EntityId;
use thiserror::Error;

/// Why the simulator refused to apply a movement command.
///
/// The command is still consumed: its sequence is acked so the owner's
/// stream never stalls on it.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CommandRejected {
    /// `|move_direction|` above the accepted cap
    #[error("move magnitude {magnitude} exceeds cap {cap}")]
    MoveMagnitude {
        /// Submitted magnitude
        magnitude: f32,
        /// Configured cap
        cap: f32,
    },

    /// `|look_delta_yaw|` above the accepted cap
    #[error("look delta {delta} exceeds cap {cap}")]
    LookRate {
        /// Submitted delta
        delta: f32,
        /// Configured cap
        cap: f32,
    },

    /// NaN or infinity somewhere in the command
    #[error("command contains a non-finite value")]
    NonFinite,

    /// No body exists for the entity
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

/// Why a weapon action was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRejection {
    /// Fired again before `1 / fire_rate` elapsed
    #[error("fire rate exceeded")]
    RateLimited,

    /// Magazine empty
    #[error("out of ammo")]
    OutOfAmmo,

    /// Non-finite origin or non-unit direction
    #[error("malformed fire request")]
    Malformed,

    /// Reload requested with a full magazine
    #[error("magazine already full")]
    MagazineFull,

    /// Shooter has no weapon state (not spawned or already gone)
    #[error("unknown shooter")]
    UnknownShooter,
}

/// Client-side prediction errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionError {
    /// Command sequence not newer than the newest buffered one
    #[error("stale sequence {sequence}, newest is {newest}")]
    StaleSequence {
        /// Submitted sequence
        sequence: u32,
        /// Newest buffered sequence
        newest: u32,
    },
}

/// Connection-level errors surfaced to the transport.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// `max_players` already connected
    #[error("session full ({max} players)")]
    SessionFull {
        /// Configured limit
        max: usize,
    },

    /// The connection's inbound queue is full
    #[error("inbound queue full for {0}")]
    QueueFull(EntityId),

    /// The session side of the connection is gone
    #[error("connection {0} closed")]
    Disconnected(EntityId),
}

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for prediction operations.
pub type PredictionResult<T> = Result<T, PredictionError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CommandRejected::MoveMagnitude {
            magnitude: 1.5,
            cap: 1.1,
        };
        assert_eq!(err.to_string(), "move magnitude 1.5 exceeds cap 1.1");

        let err = SessionError::SessionFull { max: 8 };
        assert_eq!(err.to_string(), "session full (8 players)");

        assert_eq!(
            SessionError::QueueFull(EntityId(4)).to_string(),
            "inbound queue full for entity#4"
        );
    }

    #[test]
    fn test_config_error_from_toml() {
        let parse = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err: ConfigError = parse.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
