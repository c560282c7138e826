// THEORY:
// These traits are the seam between the scan core and whatever physics layer
// hosts the robots. Hit testing, object destruction and contact detection live
// on the far side; the core only sees these capabilities.
//
// Key architectural principles:
// 1.  **Borrowed World**: Samplers are passed by reference into each call and
//     never stored, so one arena can serve every engine in a step.
// 2.  **Object Ids, Not Handles**: Destruction goes through an opaque
//     `ObjectId`; destroying an id twice is reported, not fatal.

use nalgebra::{Point3, Vector3};

/// Identifier of an object living in the host world.
pub type ObjectId = u64;

/// Result of a successful ray cast.
#[derive(Debug, Clone, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    /// Tag of the object that was hit.
    pub tag: String,
}

/// Answers "what does this ray hit first?".
pub trait RangeSampler {
    /// `direction` is normalized. Returns `None` when nothing lies within `max_distance`.
    fn cast(&self, origin: Point3<f32>, direction: Vector3<f32>, max_distance: f32) -> Option<RayHit>;
}

impl<T: RangeSampler + ?Sized> RangeSampler for &T {
    fn cast(&self, origin: Point3<f32>, direction: Vector3<f32>, max_distance: f32) -> Option<RayHit> {
        (**self).cast(origin, direction, max_distance)
    }
}

/// Removes an object from the world once a robot has consumed it.
pub trait TargetDestroyer {
    /// Returns `false` if the object no longer exists.
    fn destroy(&mut self, object: ObjectId) -> bool;
}

/// A physical contact between a robot body and a world object.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub object: ObjectId,
    pub tag: String,
    /// Center of the touched object.
    pub position: Point3<f32>,
}

/// Reports which objects a robot body is touching.
pub trait ContactProbe {
    fn contacts(&self, position: Point3<f32>, radius: f32) -> Vec<Contact>;

    /// Keeps a body of `radius` inside the world's walkable area.
    fn confine(&self, position: Point3<f32>, radius: f32) -> Point3<f32>;
}
