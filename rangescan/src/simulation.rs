// THEORY:
// The `simulation` module is the top-level harness: an `Arena`, the robots in
// an `AgentRoster`, and one `ScanEngine` per robot, stepped together.
//
// Key architectural principles:
// 1.  **Two Phases Per Frame**: `fixed_step` runs the rangefinders, routes
//     what they saw and ticks every controller; `variable_step` moves bodies
//     and keeps them inside the walls. A host calls both with its own deltas.
// 2.  **Events As Queues**: Each engine's ball hits are pushed into an
//     unbounded channel by a subscribed handler and drained, in emission order,
//     right after that engine's `advance`. The engine never holds a reference
//     to the roster, so routing a sighting cannot re-enter a scan.
// 3.  **Dense Ids**: A robot's `AgentId` is also the index of its rig, so the
//     roster and the engines stay in lockstep without a lookup table.

use crate::config::{ScanConfig, SimConfig};
use crate::core_modules::agent_controller::{AgentController, AgentState};
use crate::core_modules::arena::Arena;
use crate::core_modules::depth_buffer::DepthSnapshot;
use crate::core_modules::discovery::{AgentId, AgentRoster, SightingRoute, TargetSighting};
use crate::core_modules::sampler::ContactProbe;
use crate::core_modules::scan_engine::{BallHit, PixelScan, ScanEngine};
use crate::error::{RangeScanError, Result};
use nalgebra::Point3;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A robot's rangefinder and the queue its ball hits land in.
struct ScanRig {
    engine: ScanEngine,
    hits: mpsc::UnboundedReceiver<BallHit>,
}

/// Counters for one `fixed_step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub pixels_scanned: usize,
    pub frames_completed: usize,
    /// Ball hits stored by the robot that saw them.
    pub stored_locally: usize,
    /// Ball hits handed on to peers.
    pub forwarded: usize,
    pub targets_consumed: usize,
}

/// Serializable end-of-run view of one robot.
#[derive(Debug, Clone, Serialize)]
pub struct RobotSummary {
    pub id: AgentId,
    pub tag: String,
    pub state: AgentState,
    pub position: Point3<f32>,
    pub heading_deg: f32,
    pub frames_completed: u64,
    pub pixels_scanned: u64,
    pub discoveries: Vec<TargetSighting>,
}

pub struct Simulation {
    arena: Arena,
    roster: AgentRoster,
    rigs: Vec<ScanRig>,
    elapsed: Duration,
    targets_consumed: u64,
}

impl Simulation {
    pub fn new(arena: Arena) -> Self {
        Self {
            arena,
            roster: AgentRoster::new(),
            rigs: Vec::new(),
            elapsed: Duration::ZERO,
            targets_consumed: 0,
        }
    }

    /// Builds the arena and every configured robot, all peers of one another.
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        config.agent.validate()?;
        let identities: Vec<&str> = config
            .robots
            .iter()
            .map(|r| r.tag.strip_prefix(config.agent.identity_prefix.as_str()).unwrap_or(r.tag.as_str()))
            .collect();
        let arena = Arena::from_config(&config.arena, &config.scan.target_prefix, &identities);

        let mut simulation = Self::new(arena);
        for spec in &config.robots {
            let agent = AgentController::new(&spec.tag, &config.agent, &config.scan.target_prefix)?
                .with_pose(
                    Point3::new(spec.x, config.agent.sensor_height, spec.z),
                    spec.heading_deg.to_radians(),
                );
            simulation.add_robot(agent, &config.scan)?;
        }
        simulation.connect_all();
        info!(
            robots = simulation.roster.len(),
            balls = simulation.arena.balls().len(),
            "simulation ready"
        );
        Ok(simulation)
    }

    /// Registers `agent` with its own rangefinder. Peers are not touched; call
    /// `connect_all` once every robot is in.
    pub fn add_robot(&mut self, agent: AgentController, scan: &ScanConfig) -> Result<AgentId> {
        let mut engine = ScanEngine::from_config(scan)?;
        let (tx, hits) = mpsc::unbounded_channel();
        engine.on_ball_hit(move |hit: &BallHit| {
            // The receiver lives in the same rig, so a send only fails during teardown.
            let _ = tx.send(hit.clone());
        });

        let id = self.roster.register(agent);
        self.rigs.push(ScanRig { engine, hits });
        debug!(id, "robot registered");
        Ok(id)
    }

    pub fn connect_all(&mut self) {
        self.roster.connect_all();
    }

    /// Subscribes `handler` to the completed depth frames of robot `id`.
    pub fn subscribe_depth(&mut self, id: AgentId, handler: impl FnMut(&DepthSnapshot) + 'static) -> Result<()> {
        self.rig_mut(id)?.engine.on_buffer_ready(handler);
        Ok(())
    }

    /// Subscribes `handler` to every pixel robot `id` scans.
    pub fn subscribe_pixel_scan(&mut self, id: AgentId, handler: impl FnMut(&PixelScan) + 'static) -> Result<()> {
        self.rig_mut(id)?.engine.on_pixel_scan(handler);
        Ok(())
    }

    /// Scans, routes sightings, runs every controller and resolves contacts.
    pub fn fixed_step(&mut self, delta: Duration) -> Result<StepReport> {
        let mut report = StepReport::default();

        for (id, rig) in self.rigs.iter_mut().enumerate() {
            let pose = self.roster.get(id)?.pose();
            let frames_before = rig.engine.frames_completed();
            report.pixels_scanned += rig.engine.advance(delta, &pose, &self.arena);
            report.frames_completed += (rig.engine.frames_completed() - frames_before) as usize;

            while let Ok(hit) = rig.hits.try_recv() {
                match self.roster.dispatch_ball_hit(id, TargetSighting::new(hit.position, hit.tag))? {
                    SightingRoute::StoredLocally { .. } => report.stored_locally += 1,
                    SightingRoute::Forward(_) => report.forwarded += 1,
                }
            }
        }

        for agent in self.roster.iter_mut() {
            agent.fixed_step(delta);
        }

        for agent in self.roster.iter_mut() {
            for contact in self.arena.contacts(agent.position(), agent.body_radius()) {
                if agent.on_collision(&contact, &mut self.arena) {
                    report.targets_consumed += 1;
                }
            }
        }

        self.targets_consumed += report.targets_consumed as u64;
        self.elapsed += delta;
        Ok(report)
    }

    /// Moves every robot and keeps it inside the arena.
    pub fn variable_step(&mut self, delta: Duration) {
        for agent in self.roster.iter_mut() {
            agent.variable_step(delta);
            let confined = self.arena.confine(agent.position(), agent.body_radius());
            agent.set_position(confined);
        }
    }

    /// Runs `fixed_step` then `variable_step` with the same delta.
    pub fn step(&mut self, delta: Duration) -> Result<StepReport> {
        let report = self.fixed_step(delta)?;
        self.variable_step(delta);
        Ok(report)
    }

    pub fn summary(&self) -> Vec<RobotSummary> {
        self.roster
            .iter()
            .zip(&self.rigs)
            .map(|(agent, rig)| RobotSummary {
                id: agent.id(),
                tag: agent.tag().to_string(),
                state: agent.state(),
                position: agent.position(),
                heading_deg: agent.heading().to_degrees(),
                frames_completed: rig.engine.frames_completed(),
                pixels_scanned: rig.engine.pixels_scanned(),
                discoveries: agent.discoveries().iter().cloned().collect(),
            })
            .collect()
    }

    // --- Accessors ---

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn agent(&self, id: AgentId) -> Result<&AgentController> {
        self.roster.get(id)
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Result<&mut AgentController> {
        self.roster.get_mut(id)
    }

    pub fn engine(&self, id: AgentId) -> Result<&ScanEngine> {
        self.rigs
            .get(id)
            .map(|rig| &rig.engine)
            .ok_or(RangeScanError::UnknownAgent(id))
    }

    fn rig_mut(&mut self, id: AgentId) -> Result<&mut ScanRig> {
        self.rigs.get_mut(id).ok_or(RangeScanError::UnknownAgent(id))
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn targets_consumed(&self) -> u64 {
        self.targets_consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, ArenaConfig, RobotSpec};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn quiet_config() -> SimConfig {
        SimConfig {
            scan: ScanConfig {
                scan_line_width: 8,
                scan_line_count: 4,
                horizontal_fov_deg: 90.0,
                pixel_scan_period_secs: 0.01,
                ..ScanConfig::default()
            },
            agent: AgentConfig {
                seed: 5,
                ..AgentConfig::default()
            },
            arena: ArenaConfig {
                half_width: 10.0,
                half_depth: 10.0,
                random_balls_per_robot: 0,
                seed: 5,
                ..ArenaConfig::default()
            },
            robots: vec![
                RobotSpec {
                    tag: "RobotRed".to_string(),
                    x: 0.0,
                    z: 0.0,
                    heading_deg: 0.0,
                },
                RobotSpec {
                    tag: "RobotBlue".to_string(),
                    x: 5.0,
                    z: -5.0,
                    heading_deg: 0.0,
                },
            ],
            ..SimConfig::default()
        }
    }

    #[test]
    fn builds_connected_robots_at_sensor_height() {
        let sim = Simulation::from_config(&quiet_config()).unwrap();
        assert_eq!(sim.roster().len(), 2);
        assert_eq!(sim.agent(0).unwrap().peers(), &[1]);
        assert_eq!(sim.agent(1).unwrap().peers(), &[0]);
        assert_eq!(sim.agent(0).unwrap().position().y, 0.5);
        assert!(sim.arena().balls().is_empty());
        assert!(sim.engine(2).is_err());
    }

    #[test]
    fn depth_frames_reach_subscribers() {
        let mut sim = Simulation::from_config(&quiet_config()).unwrap();
        let frames = Rc::new(RefCell::new(0));
        let sink = frames.clone();
        sim.subscribe_depth(0, move |snapshot| {
            assert_eq!(snapshot.width(), 8);
            *sink.borrow_mut() += 1;
        })
        .unwrap();

        // 32 pixels at 10 ms each is one frame per 320 ms.
        let mut total = 0;
        for _ in 0..16 {
            total += sim.fixed_step(Duration::from_millis(20)).unwrap().frames_completed;
        }
        assert_eq!(*frames.borrow(), 1);
        assert_eq!(total, 2);
        assert_eq!(sim.engine(0).unwrap().pixels_scanned(), 32);
    }

    #[test]
    fn seen_ball_is_routed_to_its_owner() {
        let mut sim = Simulation::from_config(&quiet_config()).unwrap();
        sim.arena_mut().add_ball("BallBlue", 0.0, 4.0, 0.5);
        sim.agent_mut(1).unwrap().stop();

        let mut forwarded = 0;
        for _ in 0..16 {
            forwarded += sim.fixed_step(Duration::from_millis(20)).unwrap().forwarded;
        }
        assert!(forwarded > 0);
        assert!(sim.agent(0).unwrap().discoveries().is_empty());
        assert_eq!(sim.agent(1).unwrap().discoveries().len(), 1);
    }

    #[test]
    fn touching_own_ball_consumes_it() {
        let mut sim = Simulation::from_config(&quiet_config()).unwrap();
        sim.arena_mut().add_ball("BallRed", 0.0, 0.8, 0.5);

        let report = sim.fixed_step(Duration::from_millis(20)).unwrap();
        assert_eq!(report.targets_consumed, 1);
        assert!(sim.arena().balls().is_empty());
        assert_eq!(sim.targets_consumed(), 1);
        assert_eq!(sim.agent(0).unwrap().state(), AgentState::Wandering);
    }

    #[test]
    fn variable_step_keeps_robots_inside_walls() {
        let mut sim = Simulation::from_config(&quiet_config()).unwrap();
        for _ in 0..100 {
            sim.variable_step(Duration::from_millis(100));
        }
        let p = sim.agent(0).unwrap().position();
        assert!(p.z <= 9.5 + 1e-4);
        assert!(p.x.abs() <= 9.5 + 1e-4);
    }

    #[test]
    fn summary_lists_every_robot() {
        let mut sim = Simulation::from_config(&quiet_config()).unwrap();
        sim.step(Duration::from_millis(50)).unwrap();
        let summary = sim.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].tag, "RobotRed");
        assert_eq!(summary[1].pixels_scanned, 5);
        assert_eq!(sim.elapsed(), Duration::from_millis(50));
    }
}
