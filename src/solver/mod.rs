pub mod diagnostics;
pub mod forcing;
mod params;
mod spectral;

// Re-export public API
pub use diagnostics::Diagnostics;
pub use forcing::{cross_scale_coupling, phase_force, PhaseBand};
pub use params::SolverParams;
pub use spectral::Spectral;

use crate::error::{SimError, SimResult, Stage};
use crate::state::{Grid, ScaleLevel, SimState, VectorField};

/// Advances every scale level of a [`SimState`] by one time increment.
pub struct Stepper {
    spectral: Spectral,
    params: SolverParams,
}

fn ensure_finite(u: &VectorField, scale: i32, stage: Stage) -> SimResult<()> {
    match u.first_non_finite() {
        Some((index, component)) => Err(SimError::NonFinite { scale, stage, index, component }),
        None => Ok(()),
    }
}

impl Stepper {
    pub fn new(grid: &Grid, params: SolverParams) -> Self {
        Self { spectral: Spectral::new(grid), params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn diffuse(&mut self, field: &mut VectorField, dt: f64, viscosity: f64) {
        self.spectral.diffuse(field, dt, viscosity);
    }

    pub fn compute_vorticity(&mut self, field: &VectorField) -> VectorField {
        self.spectral.compute_vorticity(field)
    }

    pub fn measure(&mut self, state: &SimState) -> Diagnostics {
        diagnostics::measure(&mut self.spectral, &state.levels, self.params.field_bound)
    }

    /// Full cascade step.
    ///
    /// Every level is diffused and clamped first. Forcing for all levels is
    /// then computed from those post-diffusion fields before any of them is
    /// touched again, so the result does not depend on level order.
    ///
    /// On `NonFinite` the step is abandoned part-way and the state should be
    /// treated as diverged.
    pub fn step(&mut self, state: &mut SimState, dt: f64) -> SimResult<()> {
        let bound = self.params.field_bound;
        let viscosity = self.params.viscosity;

        // 1-2. Diffuse + clamp
        for level in state.levels.iter_mut() {
            self.diffuse(&mut level.u, dt, viscosity);
            ensure_finite(&level.u, level.scale, Stage::Diffusion)?;
            level.u.clamp(bound);
        }

        if self.params.forcing {
            // 3-4. Forcing from the read-only post-diffusion levels
            let increments = self.forcing_increments(&state.levels, dt)?;

            // 5. Apply + clamp
            for (level, inc) in state.levels.iter_mut().zip(&increments) {
                level.u.add_scaled(inc, 1.0);
                ensure_finite(&level.u, level.scale, Stage::Update)?;
                level.u.clamp(bound);
            }
        }

        // 6. Advance phase cycles
        for level in state.levels.iter_mut() {
            level.phase.advance();
        }
        state.steps += 1;
        state.time += dt;
        Ok(())
    }

    /// Bounded per-level increments.
    ///
    /// Every scale contributes φ^s·(phase term + Σ coupling + spiral), clamped
    /// to ±force_bound. The contributions are summed into one total, clamped to
    /// ±total_force_bound, and every level receives dt·total. A completing
    /// scale negates its phase term and hands φ·δ·u to the level holding
    /// scale s+1, which adds it to its own increment.
    fn forcing_increments(&mut self, levels: &[ScaleLevel], dt: f64) -> SimResult<Vec<VectorField>> {
        let p = self.params.clone();
        let size = levels.first().map_or(0, |l| l.u.len());
        let mut total = VectorField::zeros(size);
        let mut increments: Vec<VectorField> = levels.iter().map(|_| VectorField::zeros(size)).collect();

        for level in levels {
            let weight = level.weight();
            let mut contribution = phase_force(&level.u, level.phase, level.scale);

            let completing = p.nesting && PhaseBand::of(level.phase) == PhaseBand::Complete;
            let target = levels.iter().position(|l| l.scale == level.scale + 1).filter(|_| completing);
            if let Some(t) = target {
                contribution = contribution.scaled(-1.0);
                let mut nest = forcing::nesting_transfer(&level.u, level.phase);
                ensure_finite(&nest, level.scale, Stage::Forcing)?;
                nest.clamp(p.force_bound);
                increments[t].add_scaled(&nest, 1.0);
            }

            for other in levels.iter().filter(|o| o.scale != level.scale) {
                let coupling = cross_scale_coupling(level.scale, other.scale, &level.u, &other.u);
                contribution.add_scaled(&coupling, weight);
            }

            if p.spiral_weight != 0.0 {
                let omega = self.compute_vorticity(&level.u);
                let spiral = forcing::spiral_resonance(&omega, level.phase, level.scale, p.force_bound);
                contribution.add_scaled(&spiral, weight * p.spiral_weight);
            }

            ensure_finite(&contribution, level.scale, Stage::Forcing)?;
            contribution.clamp(p.force_bound);
            total.add_scaled(&contribution, 1.0);
        }
        total.clamp(p.total_force_bound);

        for inc in increments.iter_mut() {
            inc.add_scaled(&total, 1.0);
            for comp in inc.components_mut() {
                for v in comp.iter_mut() {
                    *v = (*v * dt).clamp(-p.increment_bound, p.increment_bound);
                }
            }
        }
        Ok(increments)
    }
}
