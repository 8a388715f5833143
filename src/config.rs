use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::solver::SolverParams;
use crate::state::{Grid, InitialCondition, InitialKind, PHI};

/// Config file looked up in the working directory when none is named.
pub const DEFAULT_PATH: &str = "phicascade.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub scales: ScaleConfig,
    pub time: TimeConfig,
    pub physics: PhysicsConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub n: usize,
    pub length: f64,
}

/// Inclusive range of scale indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub dt: f64,
    pub duration: f64,
    pub snapshot_every: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub viscosity: f64,
    pub forcing: bool,
    pub nesting: bool,
    pub spiral_weight: f64,
    pub field_bound: f64,
    pub force_bound: f64,
    pub total_force_bound: f64,
    pub increment_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub kind: InitialKind,
    pub amplitude: f64,
    pub perturbation: f64,
    pub seed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub divergence_threshold: f64,
    pub divergence_patience: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            scales: ScaleConfig::default(),
            time: TimeConfig::default(),
            physics: PhysicsConfig::default(),
            init: InitConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { n: 16, length: std::f64::consts::TAU }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { min: -1, max: 1 }
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { dt: 0.01, duration: 1.0, snapshot_every: 10 }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        let p = SolverParams::default();
        Self {
            viscosity: p.viscosity,
            forcing: p.forcing,
            nesting: p.nesting,
            spiral_weight: p.spiral_weight,
            field_bound: p.field_bound,
            force_bound: p.force_bound,
            total_force_bound: p.total_force_bound,
            increment_bound: p.increment_bound,
        }
    }
}

impl Default for InitConfig {
    fn default() -> Self {
        let init = InitialCondition::default();
        Self {
            kind: init.kind,
            amplitude: init.amplitude,
            perturbation: init.perturbation,
            seed: init.seed,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("phicascade_results"),
            divergence_threshold: 0.5,
            divergence_patience: 3,
        }
    }
}

/// φ^scale and its reciprocal must both be finite and non-zero.
fn representable_scale(name: &str, scale: i32) -> SimResult<()> {
    let w = PHI.powi(scale);
    if w.is_finite() && w > 0.0 && (1.0 / w).is_finite() {
        Ok(())
    } else {
        Err(SimError::Config(format!("{name} = {scale} puts phi^scale out of f64 range")))
    }
}

fn positive(name: &str, value: f64) -> SimResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SimError::Config(format!("{name} must be finite and > 0, got {value}")))
    }
}

impl Config {
    pub fn validate(&self) -> SimResult<()> {
        if self.grid.n < 2 {
            return Err(SimError::Config(format!("grid.n must be >= 2, got {}", self.grid.n)));
        }
        positive("grid.length", self.grid.length)?;
        if self.scales.min > self.scales.max {
            return Err(SimError::Config(format!(
                "scales.min ({}) must not exceed scales.max ({})",
                self.scales.min, self.scales.max
            )));
        }
        representable_scale("scales.min", self.scales.min)?;
        representable_scale("scales.max", self.scales.max)?;
        positive("time.dt", self.time.dt)?;
        positive("time.duration", self.time.duration)?;
        if self.time.snapshot_every == 0 {
            return Err(SimError::Config("time.snapshot_every must be >= 1".to_string()));
        }
        if !(self.physics.viscosity >= 0.0 && self.physics.viscosity.is_finite()) {
            return Err(SimError::Config(format!(
                "physics.viscosity must be finite and >= 0, got {}",
                self.physics.viscosity
            )));
        }
        if !self.physics.spiral_weight.is_finite() {
            return Err(SimError::Config("physics.spiral_weight must be finite".to_string()));
        }
        positive("physics.field_bound", self.physics.field_bound)?;
        positive("physics.force_bound", self.physics.force_bound)?;
        positive("physics.total_force_bound", self.physics.total_force_bound)?;
        positive("physics.increment_bound", self.physics.increment_bound)?;
        if !(self.init.perturbation >= 0.0 && self.init.perturbation.is_finite()) {
            return Err(SimError::Config(format!(
                "init.perturbation must be finite and >= 0, got {}",
                self.init.perturbation
            )));
        }
        if !self.init.amplitude.is_finite() {
            return Err(SimError::Config("init.amplitude must be finite".to_string()));
        }
        let threshold = self.output.divergence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SimError::Config(format!(
                "output.divergence_threshold must be in [0, 1], got {threshold}"
            )));
        }
        if self.output.divergence_patience == 0 {
            return Err(SimError::Config("output.divergence_patience must be >= 1".to_string()));
        }
        Ok(())
    }

    pub fn grid(&self) -> Grid {
        Grid::new(self.grid.n, self.grid.length)
    }

    /// Number of steps covering `duration`.
    pub fn steps(&self) -> u64 {
        (self.time.duration / self.time.dt).round() as u64
    }

    pub fn solver_params(&self) -> SolverParams {
        let p = &self.physics;
        SolverParams {
            viscosity: p.viscosity,
            forcing: p.forcing,
            nesting: p.nesting,
            spiral_weight: p.spiral_weight,
            field_bound: p.field_bound,
            force_bound: p.force_bound,
            total_force_bound: p.total_force_bound,
            increment_bound: p.increment_bound,
        }
    }

    pub fn initial_condition(&self) -> InitialCondition {
        InitialCondition {
            kind: self.init.kind,
            amplitude: self.init.amplitude,
            perturbation: self.init.perturbation,
            seed: self.init.seed,
        }
    }

    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Load the run configuration.
///
/// An explicitly named file must exist and parse. Without one, `phicascade.yaml`
/// in the working directory is used if present, otherwise defaults.
pub fn load(path: Option<&Path>) -> SimResult<Config> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Config::from_yaml(&contents)
        }
        None => {
            let path = Path::new(DEFAULT_PATH);
            if !path.exists() {
                return Ok(Config::default());
            }
            match std::fs::read_to_string(path) {
                Ok(contents) => match Config::from_yaml(&contents) {
                    Ok(cfg) => Ok(cfg),
                    Err(e) => {
                        tracing::warn!("failed to parse {DEFAULT_PATH}: {e}; using defaults");
                        Ok(Config::default())
                    }
                },
                Err(e) => {
                    tracing::warn!("failed to read {DEFAULT_PATH}: {e}; using defaults");
                    Ok(Config::default())
                }
            }
        }
    }
}
