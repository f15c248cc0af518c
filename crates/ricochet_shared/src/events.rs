//! Effect notifications broadcast by the server.
//!
//! Fire-and-forget: the effects collaborator on each client turns these into
//! muzzle flashes, tracers and reload sounds. Losing one never affects the
//! simulation.

use crate::math::Vec3;
use crate::protocol::EntityId;
use serde::{Deserialize, Serialize};

/// Visual/audio cue produced by an accepted weapon action
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EffectEvent {
    /// A shot was accepted
    FireWeapon {
        /// Who fired
        shooter: EntityId,
        /// Muzzle position
        origin: Vec3,
        /// Aim direction
        direction: Vec3,
        /// Impact point, if the shot hit something
        hit_point: Option<Vec3>,
        /// Surface normal at the impact point
        hit_normal: Option<Vec3>,
    },

    /// A reload was accepted
    Reload {
        /// Who reloaded
        entity: EntityId,
    },
}

impl EffectEvent {
    /// Entity that caused the effect
    #[must_use]
    pub const fn source(&self) -> EntityId {
        match self {
            Self::FireWeapon { shooter, .. } => *shooter,
            Self::Reload { entity } => *entity,
        }
    }

    /// Where the tracer should end: the impact point, or `range` along the
    /// aim direction for a miss. `None` for non-fire effects.
    #[must_use]
    pub fn tracer_end(&self, range: f32) -> Option<Vec3> {
        match self {
            Self::FireWeapon {
                origin,
                direction,
                hit_point,
                ..
            } => Some(hit_point.unwrap_or(*origin + *direction * range)),
            Self::Reload { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source() {
        let event = EffectEvent::Reload {
            entity: EntityId(3),
        };
        assert_eq!(event.source(), EntityId(3));
        assert_eq!(event.tracer_end(100.0), None);
    }

    #[test]
    fn test_tracer_end_for_miss_uses_range() {
        let event = EffectEvent::FireWeapon {
            shooter: EntityId(1),
            origin: Vec3::ZERO,
            direction: Vec3::Z,
            hit_point: None,
            hit_normal: None,
        };
        assert_eq!(event.tracer_end(100.0), Some(Vec3::new(0.0, 0.0, 100.0)));
    }

    #[test]
    fn test_tracer_end_for_hit_uses_impact() {
        let event = EffectEvent::FireWeapon {
            shooter: EntityId(1),
            origin: Vec3::ZERO,
            direction: Vec3::Z,
            hit_point: Some(Vec3::new(0.0, 1.0, 4.6)),
            hit_normal: Some(-Vec3::Z),
        };
        assert_eq!(event.tracer_end(100.0), Some(Vec3::new(0.0, 1.0, 4.6)));
    }
}
