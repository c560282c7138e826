// THEORY:
// This file is the entry point for the `rangescan` library crate. It exposes the
// raycast line-scan rangefinder, the robot behavior that reacts to what the
// rangefinder sees, and a small simulation harness that wires the two together
// over an analytic arena.
//
// Consumers normally reach for the `simulation` module (a ready-to-step world)
// or for `ScanEngine` plus their own `RangeSampler` when they host the physics
// themselves. The building blocks under `core_modules` stay public so tools
// such as the visualizer can work on `DepthSnapshot`s and `PixelScan` events
// directly.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod simulation;

pub use config::{AgentConfig, ArenaConfig, ScanConfig, SimConfig, SimulationConfig};
pub use core_modules::agent_controller::{AgentController, AgentState};
pub use core_modules::arena::Arena;
pub use core_modules::depth_buffer::{DepthSample, DepthSnapshot, NO_HIT_SENTINEL};
pub use core_modules::discovery::{AgentId, AgentRoster, SightingRoute, TargetSighting};
pub use core_modules::geometry::{ScanCoordinate, ScanGeometry};
pub use core_modules::sampler::{Contact, ContactProbe, RangeSampler, RayHit, TargetDestroyer};
pub use core_modules::scan_engine::{BallHit, PixelScan, ScanEngine};
pub use error::{RangeScanError, Result};
pub use simulation::{RobotSummary, Simulation, StepReport};
