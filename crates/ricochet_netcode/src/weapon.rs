//! # Weapon Validation & Hit Resolution
//!
//! Server-side validation of shots and hits.
//!
//! ## Philosophy
//!
//! NEVER trust the client. The client says "I fired from here, in this
//! direction, while seeing the world at time T". We verify:
//! 1. Is the request well formed?
//! 2. Have enough whole ticks passed since the last accepted shot?
//! 3. Is there ammo?
//! 4. Where were the targets at T (clamped to the history window)?
//! 5. What does the ray hit against THOSE poses?
//!
//! ```text
//! request ──► malformed? ──► rate limit ──► ammo ──► rewind ──► raycast
//!               │ reject        │ reject     │ reject            │
//!               │ (no slot)     │ (no slot)  │ (slot used)       ▼
//!                                                          Hit | Miss
//! ```

use ricochet_shared::protocol::tick_time;
use ricochet_shared::{DamageEvent, EntityId, FireRequest, Tick, Vec3};

use crate::config::WeaponConfig;
use crate::error::FireRejection;
use crate::geometry::{GeometryQuery, Ray, TargetPose};
use crate::history::HistoryStore;

/// Allowed deviation of `|direction|` from 1.
const DIRECTION_TOLERANCE: f32 = 1e-3;

/// Result of one fire request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FireOutcome {
    /// Accepted and hit an entity
    Hit {
        /// Entity hit
        target: EntityId,
        /// Impact point
        point: Vec3,
        /// Surface normal at the impact
        normal: Vec3,
        /// Server time the world was rewound to
        rewind_time: f32,
        /// Damage to apply
        damage: DamageEvent,
    },
    /// Accepted, hit nothing
    Miss {
        /// Server time the world was rewound to
        rewind_time: f32,
    },
    /// Refused
    Rejected(FireRejection),
}

impl FireOutcome {
    /// True for `Hit` and `Miss`
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Per-player weapon state plus its rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weapon {
    config: WeaponConfig,
    tick_rate: u32,
    interval_ticks: u64,
    ammo: u32,
    last_fire_tick: Option<Tick>,
}

impl Weapon {
    /// Full magazine, never fired.
    #[must_use]
    pub fn new(config: WeaponConfig, tick_rate: u32) -> Self {
        Self {
            ammo: config.capacity,
            interval_ticks: config.fire_interval_ticks(tick_rate),
            tick_rate,
            config,
            last_fire_tick: None,
        }
    }

    /// Rounds left
    #[must_use]
    pub const fn ammo(&self) -> u32 {
        self.ammo
    }

    /// Tick of the last slot-consuming request
    #[must_use]
    pub const fn last_fire_tick(&self) -> Option<Tick> {
        self.last_fire_tick
    }

    /// Whole ticks required between slot-consuming requests
    #[must_use]
    pub const fn interval_ticks(&self) -> u64 {
        self.interval_ticks
    }

    /// Weapon rules
    #[must_use]
    pub const fn config(&self) -> &WeaponConfig {
        &self.config
    }

    /// Validates and resolves one shot during server tick `tick`.
    ///
    /// `live` holds every entity's current pose. Each one except the
    /// shooter is rewound through `history` to the compensated time; an
    /// entity with no history is tested at its live pose.
    pub fn request_fire<G>(
        &mut self,
        shooter: EntityId,
        request: &FireRequest,
        tick: Tick,
        history: &HistoryStore,
        geometry: &G,
        live: &[TargetPose],
    ) -> FireOutcome
    where
        G: GeometryQuery + ?Sized,
    {
        if !is_well_formed(request) {
            return FireOutcome::Rejected(FireRejection::Malformed);
        }

        if let Some(last) = self.last_fire_tick {
            if tick < last + self.interval_ticks {
                return FireOutcome::Rejected(FireRejection::RateLimited);
            }
        }

        // An empty click still burns the slot.
        self.last_fire_tick = Some(tick);
        if self.ammo == 0 {
            return FireOutcome::Rejected(FireRejection::OutOfAmmo);
        }
        self.ammo -= 1;

        let now = tick_time(tick, self.tick_rate);
        let rewind_time = history.compensated_time(now, request.claimed_timestamp);
        let scene: Vec<TargetPose> = live
            .iter()
            .filter(|pose| pose.entity != shooter)
            .map(|pose| match history.rewind(pose.entity, rewind_time) {
                Some(frame) => TargetPose {
                    position: frame.position,
                    yaw: frame.yaw,
                    ..*pose
                },
                None => *pose,
            })
            .collect();

        let ray = Ray {
            origin: request.origin,
            direction: request.direction,
            max_range: self.config.range,
            layer_mask: self.config.layer_mask,
            ignore: Some(shooter),
        };

        match geometry.raycast(&ray, &scene) {
            Some(hit) => FireOutcome::Hit {
                target: hit.entity,
                point: hit.point,
                normal: hit.normal,
                rewind_time,
                damage: DamageEvent {
                    target: hit.entity,
                    amount: self.config.damage,
                    instigator: shooter,
                },
            },
            None => FireOutcome::Miss { rewind_time },
        }
    }

    /// Refills the magazine immediately.
    ///
    /// # Errors
    ///
    /// [`FireRejection::MagazineFull`] when there is nothing to reload.
    pub fn request_reload(&mut self) -> Result<(), FireRejection> {
        if self.ammo >= self.config.capacity {
            return Err(FireRejection::MagazineFull);
        }
        self.ammo = self.config.capacity;
        Ok(())
    }
}

fn is_well_formed(request: &FireRequest) -> bool {
    request.origin.is_finite()
        && request.direction.is_finite()
        && (request.direction.length() - 1.0).abs() <= DIRECTION_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::HitboxGeometry;
    use ricochet_shared::HistoryFrame;

    const SHOOTER: EntityId = EntityId(1);
    const TARGET: EntityId = EntityId(2);
    const RATE: u32 = 60;

    fn rifle() -> Weapon {
        Weapon::new(WeaponConfig::default(), RATE)
    }

    fn shot_at_z(claimed: f32) -> FireRequest {
        FireRequest::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, claimed)
    }

    fn scene_with_target_at(position: Vec3) -> Vec<TargetPose> {
        vec![
            TargetPose::player(SHOOTER, Vec3::ZERO, 0.0),
            TargetPose::player(TARGET, position, 0.0),
        ]
    }

    #[test]
    fn test_hit_applies_damage() {
        let mut weapon = rifle();
        let outcome = weapon.request_fire(
            SHOOTER,
            &shot_at_z(1.0),
            60,
            &HistoryStore::new(1.0),
            &HitboxGeometry::default(),
            &scene_with_target_at(Vec3::new(0.0, 0.0, 10.0)),
        );

        match outcome {
            FireOutcome::Hit { target, damage, .. } => {
                assert_eq!(target, TARGET);
                assert_eq!(damage.amount, 25);
                assert_eq!(damage.instigator, SHOOTER);
            }
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(weapon.ammo(), 29);
    }

    #[test]
    fn test_rate_limit_within_interval() {
        let mut weapon = rifle();
        let history = HistoryStore::new(1.0);
        let geometry = HitboxGeometry::default();
        let scene = scene_with_target_at(Vec3::new(5.0, 0.0, 10.0));
        assert_eq!(weapon.interval_ticks(), 6);

        let first = weapon.request_fire(SHOOTER, &shot_at_z(1.0), 60, &history, &geometry, &scene);
        let second = weapon.request_fire(SHOOTER, &shot_at_z(1.05), 63, &history, &geometry, &scene);
        let early = weapon.request_fire(SHOOTER, &shot_at_z(1.08), 65, &history, &geometry, &scene);

        assert!(first.is_accepted());
        assert_eq!(second, FireOutcome::Rejected(FireRejection::RateLimited));
        assert_eq!(early, FireOutcome::Rejected(FireRejection::RateLimited));
        assert_eq!(weapon.ammo(), 29);

        // Exactly one interval later is fine again
        let third = weapon.request_fire(SHOOTER, &shot_at_z(1.1), 66, &history, &geometry, &scene);
        assert!(third.is_accepted());
        assert_eq!(weapon.last_fire_tick(), Some(66));
    }

    #[test]
    fn test_interval_exact_late_in_match() {
        let config = WeaponConfig {
            capacity: u32::MAX,
            ..WeaponConfig::default()
        };
        let mut weapon = Weapon::new(config, RATE);
        let history = HistoryStore::new(1.0);
        let geometry = HitboxGeometry::default();

        // Thirty minutes at 60 Hz, one shot every six ticks
        let mut rejected = Vec::new();
        for tick in (0..108_000u64).step_by(6) {
            let outcome =
                weapon.request_fire(SHOOTER, &shot_at_z(0.0), tick, &history, &geometry, &[]);
            if !outcome.is_accepted() {
                rejected.push(tick);
            }
        }
        assert!(rejected.is_empty(), "rejected at ticks {:?}", &rejected[..rejected.len().min(8)]);

        // One tick short is still refused that far in
        let last = weapon.last_fire_tick().unwrap();
        assert_eq!(
            weapon.request_fire(SHOOTER, &shot_at_z(0.0), last + 5, &history, &geometry, &[]),
            FireOutcome::Rejected(FireRejection::RateLimited)
        );
    }

    #[test]
    fn test_out_of_ammo_consumes_slot() {
        let config = WeaponConfig {
            capacity: 1,
            ..WeaponConfig::default()
        };
        let mut weapon = Weapon::new(config, RATE);
        let history = HistoryStore::new(1.0);
        let geometry = HitboxGeometry::default();

        assert!(weapon
            .request_fire(SHOOTER, &shot_at_z(0.0), 0, &history, &geometry, &[])
            .is_accepted());
        assert_eq!(
            weapon.request_fire(SHOOTER, &shot_at_z(0.5), 30, &history, &geometry, &[]),
            FireOutcome::Rejected(FireRejection::OutOfAmmo)
        );
        assert_eq!(weapon.last_fire_tick(), Some(30));
        assert_eq!(
            weapon.request_fire(SHOOTER, &shot_at_z(0.52), 31, &history, &geometry, &[]),
            FireOutcome::Rejected(FireRejection::RateLimited)
        );
    }

    #[test]
    fn test_malformed_does_not_mutate() {
        let mut weapon = rifle();
        let history = HistoryStore::new(1.0);
        let geometry = HitboxGeometry::default();

        let bad_dir = FireRequest::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), 0.0);
        let nan_origin = FireRequest::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::Z, 0.0);

        for request in [bad_dir, nan_origin] {
            assert_eq!(
                weapon.request_fire(SHOOTER, &request, 60, &history, &geometry, &[]),
                FireOutcome::Rejected(FireRejection::Malformed)
            );
        }
        assert_eq!(weapon.ammo(), 30);
        assert_eq!(weapon.last_fire_tick(), None);
    }

    #[test]
    fn test_miss() {
        let mut weapon = rifle();
        let outcome = weapon.request_fire(
            SHOOTER,
            &shot_at_z(1.0),
            60,
            &HistoryStore::new(1.0),
            &HitboxGeometry::default(),
            &scene_with_target_at(Vec3::new(5.0, 0.0, 10.0)),
        );
        assert!(matches!(outcome, FireOutcome::Miss { .. }));
        assert_eq!(weapon.ammo(), 29);
    }

    #[test]
    fn test_lag_compensated_hit_uses_rewound_pose() {
        // Target walked from x = 0 to x = 5 over the last second.
        let mut history = HistoryStore::new(1.0);
        for tick in 0..=60u64 {
            history.record(
                TARGET,
                HistoryFrame {
                    tick,
                    time: tick_time(tick, RATE),
                    position: Vec3::new(tick as f32 / 12.0, 0.0, 10.0),
                    yaw: 0.0,
                },
            );
        }
        let tick = 60;
        let now = tick_time(tick, RATE);
        let live = scene_with_target_at(Vec3::new(5.0, 0.0, 10.0));

        // Aim where the target was 200 ms ago: x = 48 / 12 = 4.0
        let aim = (Vec3::new(4.0, 1.0, 10.0) - Vec3::new(0.0, 1.0, 0.0))
            .normalized()
            .unwrap();
        let request = FireRequest::new(Vec3::new(0.0, 1.0, 0.0), aim, now - 0.2);

        let mut weapon = rifle();
        let outcome =
            weapon.request_fire(SHOOTER, &request, tick, &history, &HitboxGeometry::default(), &live);
        match outcome {
            FireOutcome::Hit { target, rewind_time, .. } => {
                assert_eq!(target, TARGET);
                assert!((rewind_time - 0.8).abs() < 1e-4);
            }
            other => panic!("expected hit, got {other:?}"),
        }

        // The same aim with no latency misses the live target at x = 5
        let mut fresh = rifle();
        let request = FireRequest::new(Vec3::new(0.0, 1.0, 0.0), aim, now);
        let outcome =
            fresh.request_fire(SHOOTER, &request, tick, &history, &HitboxGeometry::default(), &live);
        assert!(matches!(outcome, FireOutcome::Miss { .. }));
    }

    #[test]
    fn test_reload() {
        let mut weapon = rifle();
        assert_eq!(weapon.request_reload(), Err(FireRejection::MagazineFull));

        weapon.request_fire(
            SHOOTER,
            &shot_at_z(0.0),
            0,
            &HistoryStore::new(1.0),
            &HitboxGeometry::default(),
            &[],
        );
        assert_eq!(weapon.ammo(), 29);
        assert_eq!(weapon.request_reload(), Ok(()));
        assert_eq!(weapon.ammo(), 30);
    }
}
