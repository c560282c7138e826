pub mod agent_controller;
pub mod arena;
pub mod depth_buffer;
pub mod discovery;
pub mod geometry;
pub mod sampler;
pub mod scan_clock;
pub mod scan_engine;
pub mod scan_pattern;
