// THEORY:
// The `AgentController` is the robot's small brain. It owns the robot's pose,
// its discovery list and a three-state machine:
//
//   Stopped   -- terminal; ignores timers and does not move until `reset`.
//   Wandering -- every re-aim interval, pick a random heading within ±180° of
//                the current one. As soon as a target is known, go Traveling.
//   Traveling -- every re-aim interval, aim at the nearest known target.
//                Touching one of its targets destroys it and drops back to
//                Wandering.
//
// Key architectural principles:
// 1.  **One Interval**: The re-aim timer accumulates fixed-step time and is
//     compared against and decremented by the same interval. Between two
//     decisions the rotation is a slerp from the heading at decision time to
//     the chosen heading, keyed by the elapsed fraction of the interval.
// 2.  **Level Headings**: Every chosen orientation is a pure yaw about +Y, so
//     the robot never pitches or rolls toward a target above or below it.
// 3.  **Resolved Target Index**: The index of the selected discovery is stored
//     when it is chosen. A collision removes only the entries near the ball
//     that was touched and shifts the stored index past them, so bumping into
//     another target on the way never erases the one still being pursued.
// 4.  **Two Phases**: `fixed_step` runs timers and decisions, `variable_step`
//     moves the robot along its forward axis at constant speed.

use crate::config::AgentConfig;
use crate::core_modules::discovery::{AgentId, DiscoveryList, SightingRoute, TargetPredicate, TargetSighting};
use crate::core_modules::sampler::{Contact, TargetDestroyer};
use crate::error::Result;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info, warn};

const SLERP_EPSILON: f32 = 1.0e-6;

/// Behavior mode of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AgentState {
    Stopped,
    Wandering,
    Traveling,
}

/// State machine, pose and discovery list of one robot.
pub struct AgentController {
    id: AgentId,
    tag: String,
    state: AgentState,

    // --- Pose ---
    position: Point3<f32>,
    rotation: UnitQuaternion<f32>,
    /// Heading at the last decision.
    start_rotation: UnitQuaternion<f32>,
    /// Heading being turned toward.
    end_rotation: UnitQuaternion<f32>,

    // --- Behavior ---
    speed: f32,
    body_radius: f32,
    reaim_interval: Duration,
    /// Time since the last decision.
    since_reaim: Duration,
    rng: SmallRng,

    // --- Targets ---
    predicate: TargetPredicate,
    discoveries: DiscoveryList,
    /// Index into `discoveries` chosen at the last Traveling decision.
    travel_target: Option<usize>,
    peers: Vec<AgentId>,
}

impl AgentController {
    /// Creates a wandering robot tagged `tag` at the origin, facing +Z.
    pub fn new(tag: &str, config: &AgentConfig, target_prefix: &str) -> Result<Self> {
        config.validate()?;
        let rng = if config.seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(tag_seed(config.seed, tag))
        };

        Ok(Self {
            id: 0,
            tag: tag.to_string(),
            state: AgentState::Wandering,
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            start_rotation: UnitQuaternion::identity(),
            end_rotation: UnitQuaternion::identity(),
            speed: config.speed,
            body_radius: config.body_radius,
            reaim_interval: config.reaim_interval()?,
            since_reaim: Duration::ZERO,
            rng,
            predicate: TargetPredicate::for_agent(tag, &config.identity_prefix, target_prefix),
            discoveries: DiscoveryList::new(config.min_ball_distance_threshold),
            travel_target: None,
            peers: Vec::new(),
        })
    }

    /// Places the robot at `position` facing `heading` radians around +Y.
    pub fn with_pose(mut self, position: Point3<f32>, heading: f32) -> Self {
        self.position = position;
        self.rotation = yaw(heading);
        self.start_rotation = self.rotation;
        self.end_rotation = self.rotation;
        self
    }

    // --- Timers and movement ---

    /// Runs the re-aim timer and the state machine for one fixed step.
    pub fn fixed_step(&mut self, delta: Duration) {
        if self.state == AgentState::Stopped {
            return;
        }
        self.since_reaim += delta;

        match self.state {
            AgentState::Stopped => {}
            AgentState::Wandering => {
                while self.since_reaim >= self.reaim_interval {
                    self.since_reaim -= self.reaim_interval;
                    let offset = self.rng.gen_range(-PI..PI);
                    self.start_rotation = self.rotation;
                    self.end_rotation = yaw(offset) * self.rotation;
                }
                if !self.discoveries.is_empty() {
                    info!(agent = %self.tag, known = self.discoveries.len(), "wandering -> traveling");
                    self.state = AgentState::Traveling;
                }
            }
            AgentState::Traveling => {
                while self.since_reaim >= self.reaim_interval {
                    self.since_reaim -= self.reaim_interval;
                    self.aim_at_nearest();
                }
            }
        }

        let fraction = (self.since_reaim.as_secs_f32() / self.reaim_interval.as_secs_f32()).clamp(0.0, 1.0);
        self.rotation = self
            .start_rotation
            .try_slerp(&self.end_rotation, fraction, SLERP_EPSILON)
            .unwrap_or(self.end_rotation);
    }

    /// Moves the robot along its forward axis.
    pub fn variable_step(&mut self, delta: Duration) {
        if self.state == AgentState::Stopped {
            return;
        }
        self.position += self.forward() * self.speed * delta.as_secs_f32();
    }

    fn aim_at_nearest(&mut self) {
        let Some(index) = self.nearest_discovery() else {
            // Only reachable if the list was emptied without leaving Traveling.
            warn!(agent = %self.tag, "traveling without discoveries, back to wandering");
            self.travel_target = None;
            self.state = AgentState::Wandering;
            return;
        };
        self.travel_target = Some(index);

        let Some(target) = self.discoveries.get(index) else {
            return;
        };
        let delta = target.position - self.position;
        self.start_rotation = self.rotation;
        if delta.x != 0.0 || delta.z != 0.0 {
            self.end_rotation = yaw(delta.x.atan2(delta.z));
        }
        debug!(agent = %self.tag, index, goal = ?target.position, "aiming at nearest discovery");
    }

    // --- Discoveries ---

    /// Index of the stored discovery closest to the robot, first one on ties.
    pub fn nearest_discovery(&self) -> Option<usize> {
        self.discoveries.nearest_to(&self.position)
    }

    /// Handles a ball seen by this robot's own rangefinder.
    pub fn on_ball_hit(&mut self, sighting: TargetSighting) -> SightingRoute {
        if self.predicate.matches(&sighting.tag) {
            SightingRoute::StoredLocally {
                inserted: self.store(sighting),
            }
        } else {
            SightingRoute::Forward(self.peers.clone())
        }
    }

    /// Handles a sighting forwarded by a peer. Returns `true` if it was stored.
    pub fn receive_sighting(&mut self, sighting: TargetSighting) -> bool {
        self.predicate.matches(&sighting.tag) && self.store(sighting)
    }

    fn store(&mut self, sighting: TargetSighting) -> bool {
        let position = sighting.position;
        let inserted = self.discoveries.insert(sighting);
        if inserted {
            info!(agent = %self.tag, position = ?position, known = self.discoveries.len(), "new target discovered");
        }
        inserted
    }

    /// Handles a physical contact. A contact with one of this robot's targets
    /// destroys the object, drops every discovery that points at it and
    /// resumes wandering. The selected discovery survives when the contact was
    /// with a different ball, and the robot keeps turning toward it.
    /// Returns `true` when the contact consumed a target.
    pub fn on_collision(&mut self, contact: &Contact, destroyer: &mut dyn TargetDestroyer) -> bool {
        if self.state == AgentState::Stopped || !self.predicate.matches(&contact.tag) {
            return false;
        }

        info!(agent = %self.tag, ball = %contact.tag, "target reached");
        if !destroyer.destroy(contact.object) {
            debug!(agent = %self.tag, object = contact.object, "target already gone");
        }

        // Removals shift later entries down, so the selection is re-indexed as we go.
        let mut selected = self.travel_target.take();
        while let Some(index) = self.discoveries.find(&contact.position) {
            self.discoveries.remove(index);
            selected = match selected {
                Some(current) if current == index => None,
                Some(current) if current > index => Some(current - 1),
                other => other,
            };
        }

        self.state = AgentState::Wandering;
        match selected {
            Some(index) => {
                debug!(agent = %self.tag, index, "selected target still pending");
                self.travel_target = Some(index);
            }
            None => {
                self.start_rotation = self.rotation;
                self.end_rotation = self.rotation;
            }
        }
        true
    }

    // --- External control ---

    pub fn stop(&mut self) {
        info!(agent = %self.tag, "stopped");
        self.state = AgentState::Stopped;
    }

    /// Leaves any state, including Stopped, and starts wandering afresh.
    pub fn reset(&mut self) {
        self.state = AgentState::Wandering;
        self.since_reaim = Duration::ZERO;
        self.travel_target = None;
        self.start_rotation = self.rotation;
        self.end_rotation = self.rotation;
    }

    // --- Accessors ---

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: AgentId) {
        self.id = id;
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
    }

    pub fn rotation(&self) -> UnitQuaternion<f32> {
        self.rotation
    }

    /// Heading in radians around +Y, 0 along +Z.
    pub fn heading(&self) -> f32 {
        let forward = self.forward();
        forward.x.atan2(forward.z)
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    /// World transform of the robot, used as the rangefinder pose.
    pub fn pose(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.rotation)
    }

    pub fn body_radius(&self) -> f32 {
        self.body_radius
    }

    pub fn discoveries(&self) -> &DiscoveryList {
        &self.discoveries
    }

    pub fn travel_target(&self) -> Option<usize> {
        self.travel_target
    }

    pub fn predicate(&self) -> &TargetPredicate {
        &self.predicate
    }

    pub fn peers(&self) -> &[AgentId] {
        &self.peers
    }

    pub fn set_peers(&mut self, peers: Vec<AgentId>) {
        self.peers = peers;
    }
}

fn yaw(angle: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle)
}

/// Mixes the robot tag into the configured seed so robots sharing a seed
/// still wander apart.
fn tag_seed(seed: u64, tag: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    seed ^ hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::sampler::ObjectId;

    #[derive(Default)]
    struct Graveyard(Vec<ObjectId>);

    impl TargetDestroyer for Graveyard {
        fn destroy(&mut self, object: ObjectId) -> bool {
            self.0.push(object);
            true
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            speed: 2.0,
            reaim_interval_secs: 1.0,
            min_ball_distance_threshold: 1.5,
            seed: 42,
            ..AgentConfig::default()
        }
    }

    fn robot(tag: &str) -> AgentController {
        AgentController::new(tag, &config(), "Ball").unwrap()
    }

    fn ball(x: f32, z: f32, tag: &str) -> TargetSighting {
        TargetSighting::new(Point3::new(x, 0.0, z), tag)
    }

    #[test]
    fn starts_wandering_and_travels_once_a_target_is_known() {
        let mut agent = robot("RobotRed");
        agent.fixed_step(Duration::from_millis(20));
        assert_eq!(agent.state(), AgentState::Wandering);

        assert_eq!(
            agent.on_ball_hit(ball(0.0, 10.0, "BallRed")),
            SightingRoute::StoredLocally { inserted: true }
        );
        agent.fixed_step(Duration::from_millis(20));
        assert_eq!(agent.state(), AgentState::Traveling);
    }

    #[test]
    fn foreign_targets_are_forwarded_to_peers_not_stored() {
        let mut agent = robot("RobotBlue");
        agent.set_peers(vec![3, 7]);
        assert_eq!(agent.on_ball_hit(ball(1.0, 1.0, "BallRed")), SightingRoute::Forward(vec![3, 7]));
        assert!(agent.discoveries().is_empty());
        assert!(!agent.receive_sighting(ball(1.0, 1.0, "BallRed")));
        assert!(agent.receive_sighting(ball(1.0, 1.0, "BallBlue")));
    }

    #[test]
    fn traveling_aims_level_at_nearest_target() {
        let mut agent = robot("RobotRed").with_pose(Point3::new(0.0, 0.5, 0.0), 0.0);
        agent.on_ball_hit(ball(10.0, 0.0, "BallRed"));
        agent.on_ball_hit(ball(0.0, -20.0, "BallRed"));
        agent.fixed_step(Duration::from_millis(10));
        assert_eq!(agent.state(), AgentState::Traveling);

        agent.fixed_step(Duration::from_millis(1000));
        assert_eq!(agent.travel_target(), Some(0));

        // Half-way through the interval the turn is half done.
        agent.fixed_step(Duration::from_millis(490));
        let forward = agent.forward();
        assert!((forward.x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3, "forward = {forward:?}");

        agent.fixed_step(Duration::from_millis(490));
        let forward = agent.forward();
        assert!(forward.y.abs() < 1e-5);
        assert!((forward.x - 1.0).abs() < 1e-3, "forward = {forward:?}");
    }

    #[test]
    fn wander_turns_stay_level() {
        let mut agent = robot("RobotRed");
        for _ in 0..500 {
            agent.fixed_step(Duration::from_millis(20));
            let forward = agent.forward();
            assert!(forward.y.abs() < 1e-4);
            assert!((forward.norm() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn moves_forward_at_constant_speed() {
        let mut agent = robot("RobotRed").with_pose(Point3::new(1.0, 0.5, 1.0), PI / 2.0);
        agent.variable_step(Duration::from_millis(500));
        assert!((agent.position() - Point3::new(2.0, 0.5, 1.0)).norm() < 1e-4);
    }

    #[test]
    fn collision_removes_selected_target_and_resumes_wandering() {
        let mut agent = robot("RobotRed");
        agent.on_ball_hit(ball(0.0, 30.0, "BallRed"));
        agent.on_ball_hit(ball(0.0, 5.0, "BallRed"));
        agent.fixed_step(Duration::from_millis(10));
        agent.fixed_step(Duration::from_millis(1000));
        assert_eq!(agent.travel_target(), Some(1));

        let mut graveyard = Graveyard::default();
        let contact = Contact {
            object: 9,
            tag: "BallRed".to_string(),
            position: Point3::new(0.0, 0.5, 5.0),
        };
        assert!(agent.on_collision(&contact, &mut graveyard));
        assert_eq!(graveyard.0, vec![9]);
        assert_eq!(agent.state(), AgentState::Wandering);
        assert_eq!(agent.discoveries().len(), 1);
        assert_eq!(agent.discoveries().get(0).unwrap().position.z, 30.0);
        assert_eq!(agent.travel_target(), None);
    }

    #[test]
    fn bumping_another_target_keeps_the_selected_one() {
        let mut agent = robot("RobotRed");
        agent.on_ball_hit(ball(0.0, 5.0, "BallRed"));
        agent.on_ball_hit(ball(0.0, 30.0, "BallRed"));
        agent.fixed_step(Duration::from_millis(10));
        agent.fixed_step(Duration::from_millis(1000));
        assert_eq!(agent.travel_target(), Some(0));

        let mut graveyard = Graveyard::default();
        let contact = Contact {
            object: 4,
            tag: "BallRed".to_string(),
            position: Point3::new(0.0, 0.5, 30.0),
        };
        assert!(agent.on_collision(&contact, &mut graveyard));
        assert_eq!(graveyard.0, vec![4]);
        let remaining: Vec<f32> = agent.discoveries().iter().map(|s| s.position.z).collect();
        assert_eq!(remaining, vec![5.0]);
        assert_eq!(agent.travel_target(), Some(0));
    }

    #[test]
    fn selection_index_shifts_past_removed_entries() {
        let mut agent = robot("RobotRed");
        agent.on_ball_hit(ball(0.0, 30.0, "BallRed"));
        agent.on_ball_hit(ball(0.0, 5.0, "BallRed"));
        agent.fixed_step(Duration::from_millis(10));
        agent.fixed_step(Duration::from_millis(1000));
        assert_eq!(agent.travel_target(), Some(1));

        let contact = Contact {
            object: 2,
            tag: "BallRed".to_string(),
            position: Point3::new(0.0, 0.5, 30.0),
        };
        assert!(agent.on_collision(&contact, &mut Graveyard::default()));
        assert_eq!(agent.travel_target(), Some(0));
        assert_eq!(agent.discoveries().get(0).unwrap().position.z, 5.0);
    }

    #[test]
    fn collisions_with_other_objects_are_ignored() {
        let mut agent = robot("RobotRed");
        agent.on_ball_hit(ball(0.0, 5.0, "BallRed"));
        let mut graveyard = Graveyard::default();
        let contact = Contact {
            object: 1,
            tag: "BallBlue".to_string(),
            position: Point3::new(0.0, 0.5, 5.0),
        };
        assert!(!agent.on_collision(&contact, &mut graveyard));
        assert!(graveyard.0.is_empty());
        assert_eq!(agent.discoveries().len(), 1);
    }

    #[test]
    fn stopped_ignores_timers_and_movement_until_reset() {
        let mut agent = robot("RobotRed");
        agent.on_ball_hit(ball(0.0, 5.0, "BallRed"));
        agent.stop();
        let before = agent.pose();
        agent.fixed_step(Duration::from_secs(5));
        agent.variable_step(Duration::from_secs(5));
        assert_eq!(agent.state(), AgentState::Stopped);
        assert_eq!(agent.pose(), before);

        agent.reset();
        agent.fixed_step(Duration::from_millis(20));
        assert_eq!(agent.state(), AgentState::Traveling);
    }

    #[test]
    fn same_seed_gives_same_wander_path() {
        let mut a = robot("RobotRed");
        let mut b = robot("RobotRed");
        for _ in 0..200 {
            a.fixed_step(Duration::from_millis(20));
            b.fixed_step(Duration::from_millis(20));
        }
        assert_eq!(a.rotation(), b.rotation());

        assert_eq!(tag_seed(42, "RobotRed"), tag_seed(42, "RobotRed"));
        assert_ne!(tag_seed(42, "RobotRed"), tag_seed(42, "RobotBlue"));
    }

    #[test]
    fn rejects_invalid_config() {
        let bad = AgentConfig {
            reaim_interval_secs: 0.0,
            ..config()
        };
        assert!(AgentController::new("RobotRed", &bad, "Ball").is_err());
    }
}
