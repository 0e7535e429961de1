//! Error types for configuration, dispatch and patch loading

use std::path::PathBuf;
use thiserror::Error;

/// A configuration call was given arguments the engine cannot run with.
///
/// Returned synchronously by the configuring call; the previous state is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("step duration must be finite and positive, got {0}")]
    InvalidStepDuration(f64),

    #[error("{name} must be finite and positive, got {value}")]
    InvalidTiming { name: &'static str, value: f64 },

    #[error("euclidean pattern needs at least one step")]
    ZeroSteps,

    #[error("note list is empty")]
    EmptyNotes,

    #[error("gate pattern is empty")]
    EmptyGatePattern,

    #[error("fast multiplier {0} leaves no steps")]
    InvalidMultiplier(f64),

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("range step must not be zero")]
    ZeroRangeStep,
}

/// The tone generator refused a single note.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("tone generator rejected note at {time:.4}s: {reason}")]
    Rejected { time: f64, reason: String },

    #[error("tone generator unavailable")]
    Unavailable,
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum DromeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("voice '{name}': {source}")]
    Voice {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid patch file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T, E = DromeError> = std::result::Result<T, E>;
