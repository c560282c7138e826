// THEORY:
// The `Arena` is a deliberately small stand-in for a physics engine: a flat
// floor, four infinitely tall walls and a set of spherical balls, all solved
// analytically. It exists so the scan core and the robots have a world to talk
// to in the simulator and in tests. It implements the three capabilities the
// core consumes (`RangeSampler`, `TargetDestroyer`, `ContactProbe`) and nothing
// else; the core never looks inside it.

use crate::config::ArenaConfig;
use crate::core_modules::sampler::{Contact, ContactProbe, ObjectId, RangeSampler, RayHit, TargetDestroyer};
use nalgebra::{Point3, Vector3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub const FLOOR_TAG: &str = "Floor";
pub const WALL_TAG: &str = "Wall";

/// A ball resting on the floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub id: ObjectId,
    pub tag: String,
    pub center: Point3<f32>,
    pub radius: f32,
}

/// Walled, floored world holding the balls.
#[derive(Debug, Clone)]
pub struct Arena {
    half_width: f32,
    half_depth: f32,
    balls: Vec<Ball>,
    next_id: ObjectId,
}

impl Arena {
    pub fn new(half_width: f32, half_depth: f32) -> Self {
        Self {
            half_width,
            half_depth,
            balls: Vec::new(),
            next_id: 1,
        }
    }

    /// Builds the arena from config, adding `random_balls_per_robot` balls for
    /// every identity suffix in `identities` (e.g. "Red" spawns "BallRed").
    pub fn from_config(config: &ArenaConfig, target_prefix: &str, identities: &[&str]) -> Self {
        let mut arena = Self::new(config.half_width, config.half_depth);
        for ball in &config.balls {
            arena.add_ball(&ball.tag, ball.x, ball.z, config.ball_radius);
        }

        let mut rng = if config.seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(config.seed)
        };
        let margin = config.ball_radius * 2.0;
        let x_span = (config.half_width - margin).max(0.0);
        let z_span = (config.half_depth - margin).max(0.0);
        for identity in identities {
            let tag = format!("{target_prefix}{identity}");
            for _ in 0..config.random_balls_per_robot {
                let x = if x_span > 0.0 { rng.gen_range(-x_span..x_span) } else { 0.0 };
                let z = if z_span > 0.0 { rng.gen_range(-z_span..z_span) } else { 0.0 };
                arena.add_ball(&tag, x, z, config.ball_radius);
            }
        }
        debug!(balls = arena.balls.len(), "arena populated");
        arena
    }

    /// Places a ball of `radius` on the floor at `(x, z)`.
    pub fn add_ball(&mut self, tag: &str, x: f32, z: f32, radius: f32) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        self.balls.push(Ball {
            id,
            tag: tag.to_string(),
            center: Point3::new(x, radius, z),
            radius,
        });
        id
    }

    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    pub fn half_extents(&self) -> (f32, f32) {
        (self.half_width, self.half_depth)
    }

    fn cast_balls(&self, origin: &Point3<f32>, direction: &Vector3<f32>) -> Option<(f32, &str)> {
        self.balls
            .iter()
            .filter_map(|ball| ray_sphere(origin, direction, &ball.center, ball.radius).map(|t| (t, ball.tag.as_str())))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    fn cast_walls(&self, origin: &Point3<f32>, direction: &Vector3<f32>) -> Option<f32> {
        let exit = |o: f32, d: f32, half: f32| -> Option<f32> {
            let t = if d > 0.0 {
                (half - o) / d
            } else if d < 0.0 {
                (-half - o) / d
            } else {
                return None;
            };
            (t >= 0.0).then_some(t)
        };
        match (
            exit(origin.x, direction.x, self.half_width),
            exit(origin.z, direction.z, self.half_depth),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn ray_sphere(origin: &Point3<f32>, direction: &Vector3<f32>, center: &Point3<f32>, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(direction);
    let c = oc.norm_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let near = -b - root;
    if near >= 0.0 {
        return Some(near);
    }
    // Origin inside the sphere.
    let far = -b + root;
    (far >= 0.0).then_some(far)
}

impl RangeSampler for Arena {
    fn cast(&self, origin: Point3<f32>, direction: Vector3<f32>, max_distance: f32) -> Option<RayHit> {
        let mut best: Option<(f32, &str)> = self.cast_balls(&origin, &direction);

        let mut consider = |t: f32, tag: &'static str| {
            if best.is_none_or(|(d, _)| t < d) {
                best = Some((t, tag));
            }
        };
        if let Some(t) = self.cast_walls(&origin, &direction) {
            consider(t, WALL_TAG);
        }
        if direction.y < 0.0 && origin.y >= 0.0 {
            consider(-origin.y / direction.y, FLOOR_TAG);
        }

        best.filter(|(t, _)| *t <= max_distance).map(|(distance, tag)| RayHit {
            distance,
            tag: tag.to_string(),
        })
    }
}

impl TargetDestroyer for Arena {
    fn destroy(&mut self, object: ObjectId) -> bool {
        let before = self.balls.len();
        self.balls.retain(|ball| ball.id != object);
        self.balls.len() != before
    }
}

impl ContactProbe for Arena {
    fn contacts(&self, position: Point3<f32>, radius: f32) -> Vec<Contact> {
        self.balls
            .iter()
            .filter(|ball| (ball.center - position).norm() <= ball.radius + radius)
            .map(|ball| Contact {
                object: ball.id,
                tag: ball.tag.clone(),
                position: ball.center,
            })
            .collect()
    }

    fn confine(&self, position: Point3<f32>, radius: f32) -> Point3<f32> {
        let x_limit = (self.half_width - radius).max(0.0);
        let z_limit = (self.half_depth - radius).max(0.0);
        Point3::new(
            position.x.clamp(-x_limit, x_limit),
            position.y,
            position.z.clamp(-z_limit, z_limit),
        )
    }
}
