//! Empirical forcing terms of the scale cascade.
//!
//! None of these terms come from the Navier-Stokes equations. They are
//! unstable on their own, which is why every caller clamps their output.

use std::f64::consts::{PI, TAU};

use crate::state::{PhaseCycle, VectorField, PHASE_COUNT, PHI};

/// Smallest denominator allowed in any forcing ratio.
pub const DENOM_FLOOR: f64 = 1e-12;

/// Bounds applied to |ω| before it enters the spiral resonance ratio.
const OMEGA_MIN: f64 = 1.0 / 1000.0;
const OMEGA_MAX: f64 = 1000.0;

/// Band of the 13-phase energy cycle a phase belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseBand {
    /// Phases 1-3.
    Inject,
    /// Phases 4-6.
    Transfer,
    /// Phases 7-9.
    Couple,
    /// Phase 10.
    Rest,
    /// Phases 11-13; energy may nest into the next scale.
    Complete,
}

impl PhaseBand {
    pub fn of(phase: PhaseCycle) -> Self {
        match phase.get() {
            1..=3 => PhaseBand::Inject,
            4..=6 => PhaseBand::Transfer,
            7..=9 => PhaseBand::Couple,
            10 => PhaseBand::Rest,
            _ => PhaseBand::Complete,
        }
    }

    /// Multiplier applied to the velocity field during this band.
    pub fn delta(self) -> f64 {
        match self {
            PhaseBand::Inject => 1.0 / 2.0,
            PhaseBand::Transfer => -1.0 / 5.0,
            PhaseBand::Couple => 0.0,
            PhaseBand::Rest => -1.0,
            PhaseBand::Complete => 1.0 / 3.0,
        }
    }
}

/// δ(phase)·φ^scale·u.
pub fn phase_force(u: &VectorField, phase: PhaseCycle, scale: i32) -> VectorField {
    u.scaled(PhaseBand::of(phase).delta() * PHI.powi(scale))
}

/// φ^-|b-a|·cos(2π(b-a)/13); zero when `a == b`.
pub fn coupling_factor(scale_a: i32, scale_b: i32) -> f64 {
    if scale_a == scale_b {
        return 0.0;
    }
    let diff = scale_b - scale_a;
    PHI.powi(-diff.abs()) * (TAU * diff as f64 / PHASE_COUNT as f64).cos()
}

/// Interference that scale `b` exerts on scale `a`: the real part of
/// `u_b` rotated by e^{2πi(b-a)/13}, decayed by φ^-|b-a|.
/// `field_a` only fixes the shape of the result.
pub fn cross_scale_coupling(scale_a: i32, scale_b: i32, field_a: &VectorField, field_b: &VectorField) -> VectorField {
    if scale_a == scale_b {
        return VectorField::zeros(field_a.len());
    }
    field_b.scaled(coupling_factor(scale_a, scale_b))
}

/// Share of a completing scale's field handed to the scale above it: φ·δ·u.
pub fn nesting_transfer(u: &VectorField, phase: PhaseCycle) -> VectorField {
    u.scaled(PHI * PhaseBand::of(phase).delta())
}

/// Mean of the five spiral directions evaluated at `phase` for `scale`.
pub fn spiral_direction(phase: PhaseCycle, scale: i32) -> [f64; 3] {
    let t = phase.get() as f64 * TAU / PHASE_COUNT as f64;
    let amp = PHI.powf(scale as f64 + t / TAU);
    let rates = [PHI, -1.0 / PHI, PI, PHI / 3.0, PHASE_COUNT as f64 / PHI];

    let mut sum = [0.0; 3];
    for rate in rates {
        let a = t * rate;
        sum[0] += a.cos();
        sum[1] += a.sin();
        sum[2] += (a / 2.0).sin();
    }
    sum.map(|c| amp * c / rates.len() as f64)
}

/// λ(|ω|)·(ω × v), where v is the mean spiral direction and
/// λ = |ω| / (10·φ^s + |ω|) saturates where vorticity is strong.
pub fn spiral_resonance(omega: &VectorField, phase: PhaseCycle, scale: i32, force_bound: f64) -> VectorField {
    let v = spiral_direction(phase, scale);
    let floor = (10.0 * PHI.powi(scale)).max(DENOM_FLOOR);

    let mut force = VectorField::zeros(omega.len());
    for ii in 0..omega.len() {
        let w = omega.at(ii);
        let mag = omega.magnitude(ii).clamp(OMEGA_MIN, OMEGA_MAX);
        let lambda = (mag / (floor + mag)).clamp(0.0, 1.0);
        force.x[ii] = (lambda * (w[1] * v[2] - w[2] * v[1])).clamp(-force_bound, force_bound);
        force.y[ii] = (lambda * (w[2] * v[0] - w[0] * v[2])).clamp(-force_bound, force_bound);
        force.z[ii] = (lambda * (w[0] * v[1] - w[1] * v[0])).clamp(-force_bound, force_bound);
    }
    force
}
