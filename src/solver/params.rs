/// Solver parameters for the scale cascade.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverParams {
    pub viscosity: f64,
    /// Apply the phase/coupling forcing after diffusion.
    pub forcing: bool,
    /// Let completing scales (phases 11-13) hand energy to the scale above.
    pub nesting: bool,
    /// Weight of the vorticity-driven spiral resonance term (0 disables it).
    pub spiral_weight: f64,
    /// Symmetric bound on every velocity component.
    pub field_bound: f64,
    /// Symmetric bound on each scale's weighted force contribution.
    pub force_bound: f64,
    /// Symmetric bound on the force summed over all scales.
    pub total_force_bound: f64,
    /// Symmetric bound on dt·force before it is added to the field.
    pub increment_bound: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            viscosity: 0.01,
            forcing: true,
            nesting: true,
            spiral_weight: 0.0,
            field_bound: 10.0,
            force_bound: 100.0,
            total_force_bound: 1000.0,
            increment_bound: 0.1,
        }
    }
}

impl SolverParams {
    /// Diffusion only: every forcing term switched off.
    #[cfg(test)]
    pub fn pure_diffusion(viscosity: f64) -> Self {
        Self {
            viscosity,
            forcing: false,
            nesting: false,
            spiral_weight: 0.0,
            ..Self::default()
        }
    }

    /// Full cascade including the spiral resonance term.
    #[cfg(test)]
    pub fn resonant() -> Self {
        Self {
            spiral_weight: 1.0,
            ..Self::default()
        }
    }
}
