use std::fmt;

use thiserror::Error;

/// Sub-step of a time step at which a field was checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// After spectral diffusion, before the first clamp.
    Diffusion,
    /// Accumulated forcing, before the force clamp.
    Forcing,
    /// Field plus forcing increment, before the final clamp.
    Update,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Diffusion => "diffusion",
            Stage::Forcing => "forcing",
            Stage::Update => "update",
        };
        f.write_str(name)
    }
}

/// Root error type for a simulation run.
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid run configuration.
    #[error("config error: {0}")]
    Config(String),

    /// NaN or infinity produced upstream of a clamp.
    #[error("non-finite value in scale {scale} after {stage} (index {index}, component {component})")]
    NonFinite {
        scale: i32,
        stage: Stage,
        index: usize,
        component: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
