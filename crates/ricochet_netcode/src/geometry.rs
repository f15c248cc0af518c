//! # Hit Geometry
//!
//! The ray query behind hit resolution.
//!
//! The engine's collision world implements [`GeometryQuery`] in production.
//! [`HitboxGeometry`] is the in-crate implementation: one axis-aligned box
//! per player, tested with the slab method. Either way the query must be
//! synchronous and deterministic, because the server's verdict IS the hit.

use ricochet_shared::{EntityId, Vec3};

/// Layer bit carried by player poses.
pub const PLAYER_LAYER: u32 = 1;

/// A shot's ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
    /// Hits farther than this are ignored
    pub max_range: f32,
    /// Only poses on these layers can be hit
    pub layer_mask: u32,
    /// Entity the ray can never hit (the shooter)
    pub ignore: Option<EntityId>,
}

/// One hittable entity at the pose to test against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetPose {
    /// Entity
    pub entity: EntityId,
    /// Feet position
    pub position: Vec3,
    /// Facing in degrees
    pub yaw: f32,
    /// Layer bits
    pub layers: u32,
}

impl TargetPose {
    /// A player pose on [`PLAYER_LAYER`].
    #[must_use]
    pub const fn player(entity: EntityId, position: Vec3, yaw: f32) -> Self {
        Self {
            entity,
            position,
            yaw,
            layers: PLAYER_LAYER,
        }
    }
}

/// Nearest intersection along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Entity hit
    pub entity: EntityId,
    /// Impact point
    pub point: Vec3,
    /// Surface normal at the impact
    pub normal: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
}

/// Geometry collaborator: nearest hit of a ray against a set of poses.
pub trait GeometryQuery {
    /// Returns the nearest hit within `ray.max_range`, if any.
    ///
    /// Ties at equal distance go to the lower entity id.
    fn raycast(&self, ray: &Ray, scene: &[TargetPose]) -> Option<RayHit>;
}

/// Axis-aligned hitbox.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hitbox {
    /// Center position.
    pub center: Vec3,
    /// Half-extents (width/2, height/2, depth/2).
    pub half_extents: Vec3,
}

impl Hitbox {
    /// Creates a new hitbox.
    #[must_use]
    pub const fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// Player hitbox standing on `feet`.
    #[must_use]
    pub fn player(feet: Vec3, half_extents: Vec3) -> Self {
        Self {
            center: Vec3::new(feet.x, feet.y + half_extents.y, feet.z),
            half_extents,
        }
    }

    /// Minimum corner
    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    /// Maximum corner
    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// Returns true if a point is inside the hitbox.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        let d = point - self.center;
        d.x.abs() <= self.half_extents.x
            && d.y.abs() <= self.half_extents.y
            && d.z.abs() <= self.half_extents.z
    }

    /// Ray entry distance and entry-face normal, slab method.
    ///
    /// A ray starting inside the box hits at distance 0 with the normal
    /// facing back along the ray.
    #[must_use]
    pub fn ray_intersects(&self, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        let o = origin.to_array();
        let d = direction.to_array();
        let lo = self.min().to_array();
        let hi = self.max().to_array();

        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut entry_normal = -direction;

        for axis in 0..3 {
            if d[axis].abs() < f32::EPSILON {
                // Parallel to this slab: must already be between its planes
                if o[axis] < lo[axis] || o[axis] > hi[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d[axis];
            let mut near = (lo[axis] - o[axis]) * inv;
            let mut far = (hi[axis] - o[axis]) * inv;
            let mut sign = -1.0;
            if near > far {
                std::mem::swap(&mut near, &mut far);
                sign = 1.0;
            }

            if near > t_enter {
                t_enter = near;
                let mut n = [0.0; 3];
                n[axis] = sign;
                entry_normal = Vec3::from_array(n);
            }
            t_exit = t_exit.min(far);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_exit < 0.0 {
            return None;
        }
        if t_enter < 0.0 {
            return Some((0.0, -direction));
        }
        Some((t_enter, entry_normal))
    }
}

/// Player hitboxes as the whole world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitboxGeometry {
    half_extents: Vec3,
}

impl HitboxGeometry {
    /// Uses boxes of the given half extents for every pose.
    #[must_use]
    pub const fn new(half_extents: Vec3) -> Self {
        Self { half_extents }
    }

    /// Box half extents
    #[must_use]
    pub const fn half_extents(&self) -> Vec3 {
        self.half_extents
    }
}

impl Default for HitboxGeometry {
    fn default() -> Self {
        // ~0.8m wide, 2m tall
        Self::new(Vec3::new(0.4, 1.0, 0.4))
    }
}

impl GeometryQuery for HitboxGeometry {
    fn raycast(&self, ray: &Ray, scene: &[TargetPose]) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;

        for pose in scene {
            if pose.layers & ray.layer_mask == 0 || ray.ignore == Some(pose.entity) {
                continue;
            }
            let hitbox = Hitbox::player(pose.position, self.half_extents);
            let Some((distance, normal)) = hitbox.ray_intersects(ray.origin, ray.direction) else {
                continue;
            };
            if distance > ray.max_range {
                continue;
            }

            let closer = best.map_or(true, |b| {
                distance < b.distance || (distance == b.distance && pose.entity < b.entity)
            });
            if closer {
                best = Some(RayHit {
                    entity: pose.entity,
                    point: ray.origin + ray.direction * distance,
                    normal,
                    distance,
                });
            }
        }

        best
    }
}
