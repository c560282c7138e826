// THEORY:
// One error enum for the whole core. Construction and wiring fail loudly with a
// `RangeScanError`; the per-pixel hot path never does.
//
// Key architectural principles:
// 1.  **Typed At The Core, Opaque At The Edge**: Library code returns these
//     variants so callers can match on them. The `rover_sim` binary wraps them
//     in `anyhow` with context.
// 2.  **Foreign Errors Flattened**: TOML parse errors are stored as text, so the
//     enum does not leak the parser's types into the public API.

use crate::core_modules::discovery::AgentId;
use thiserror::Error;

/// Everything that can go wrong while building or wiring the scan core.
///
/// Runtime sampling anomalies are not errors: they degrade to a no-hit sample.
#[derive(Error, Debug)]
pub enum RangeScanError {
    #[error("scan geometry needs a non-zero {axis}")]
    ZeroResolution { axis: &'static str },

    #[error("{axis} field of view must be within (0, 180) degrees, got {degrees}")]
    FieldOfView { axis: &'static str, degrees: f32 },

    #[error("scan resolution {width}x{height} is too large for one frame")]
    Resolution { width: u32, height: u32 },

    #[error("pixel scan period must be positive")]
    ScanPeriod,

    #[error("max ray cast distance must be positive and finite, got {0}")]
    MaxRange(f32),

    #[error("agent configuration error: {0}")]
    Agent(String),

    #[error("unknown agent id {0}")]
    UnknownAgent(AgentId),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for RangeScanError {
    fn from(e: toml::de::Error) -> Self {
        RangeScanError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RangeScanError>;
