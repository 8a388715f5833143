use crate::state::{ScaleLevel, VectorField};

use super::spectral::Spectral;

/// Relative tolerance for counting a value as sitting on the clamp bound.
const SATURATION_TOL: f64 = 1e-12;

/// Scale energy: E = 0.5 * <|u|²>.
pub fn scale_energy(u: &VectorField) -> f64 {
    let count = u.len();
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = u
        .components()
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>())
        .sum();
    0.5 * sum / count as f64
}

/// Σ φ^s · E_s over all levels.
pub fn total_energy(levels: &[ScaleLevel]) -> f64 {
    levels.iter().map(|l| l.weight() * l.energy()).sum()
}

/// Largest |ω| over every level and grid point.
pub fn max_vorticity(spectral: &mut Spectral, levels: &[ScaleLevel]) -> f64 {
    levels
        .iter()
        .map(|l| {
            let omega = spectral.compute_vorticity(&l.u);
            (0..omega.len()).map(|ii| omega.magnitude(ii)).fold(0.0_f64, f64::max)
        })
        .fold(0.0_f64, f64::max)
}

/// Fraction of component values pinned at (or beyond) `±bound`.
pub fn saturation(u: &VectorField, bound: f64) -> f64 {
    let total = 3 * u.len();
    if total == 0 {
        return 0.0;
    }
    let edge = bound * (1.0 - SATURATION_TOL);
    let pinned = u
        .components()
        .iter()
        .flat_map(|c| c.iter())
        .filter(|v| v.abs() >= edge)
        .count();
    pinned as f64 / total as f64
}

/// One measurement of the whole cascade.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub total_energy: f64,
    /// (scale, E_s) in ascending scale order.
    pub scale_energy: Vec<(i32, f64)>,
    pub max_vorticity: f64,
    /// Saturated fraction across all levels.
    pub saturation: f64,
}

pub fn measure(spectral: &mut Spectral, levels: &[ScaleLevel], field_bound: f64) -> Diagnostics {
    let scale_energy = levels.iter().map(|l| (l.scale, l.energy())).collect();
    let saturation = if levels.is_empty() {
        0.0
    } else {
        levels.iter().map(|l| saturation(&l.u, field_bound)).sum::<f64>() / levels.len() as f64
    };
    Diagnostics {
        total_energy: total_energy(levels),
        scale_energy,
        max_vorticity: max_vorticity(spectral, levels),
        saturation,
    }
}

/// Flags a run whose fields stay pinned at the clamp bound.
///
/// Clamping keeps values finite but hides divergence; a run is reported as
/// diverged once `patience` consecutive snapshots exceed `threshold`.
pub struct DivergenceMonitor {
    threshold: f64,
    patience: usize,
    streak: usize,
    reported: bool,
}

impl DivergenceMonitor {
    pub fn new(threshold: f64, patience: usize) -> Self {
        Self { threshold, patience: patience.max(1), streak: 0, reported: false }
    }

    /// Feed one snapshot's saturation. Returns `true` exactly once, on the
    /// snapshot where the streak first reaches `patience`.
    pub fn observe(&mut self, saturation: f64) -> bool {
        if saturation > self.threshold {
            self.streak += 1;
        } else {
            self.streak = 0;
        }
        if self.streak >= self.patience && !self.reported {
            self.reported = true;
            return true;
        }
        false
    }

    pub fn diverged(&self) -> bool {
        self.reported
    }
}
