use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Golden ratio, the base of every scale weight.
pub const PHI: f64 = 1.618_033_988_749_895;

/// Number of states in a scale's phase cycle.
pub const PHASE_COUNT: u8 = 13;

/// Periodic cubic lattice of side `n` covering `[0, length)^3`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    pub n: usize,
    pub length: f64,
    pub dx: f64,
}

impl Grid {
    pub fn new(n: usize, length: f64) -> Self {
        Self { n, length, dx: length / n as f64 }
    }

    /// Number of lattice points.
    pub fn size(&self) -> usize {
        self.n * self.n * self.n
    }

    /// Physical coordinate of lattice index `i` along any axis.
    pub fn coord(&self, i: usize) -> f64 {
        i as f64 * self.dx
    }

    /// Convert 3D coordinates to a 1D index with periodic wrapping on every axis.
    #[cfg(test)]
    pub fn idx(&self, i: i32, j: i32, k: i32) -> usize {
        let n = self.n as i32;
        let w = |v: i32| (((v % n) + n) % n) as usize;
        idx_inner(w(i), w(j), w(k), self.n)
    }
}

/// Fast index for in-bounds cells (`0 <= i, j, k < n`). Skips wrapping.
/// `i` runs along x (slowest), `k` along z (fastest).
#[inline(always)]
pub const fn idx_inner(i: usize, j: usize, k: usize, n: usize) -> usize {
    (i * n + j) * n + k
}

pub struct Xor128 {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
}

impl Xor128 {
    pub fn new(seed: u32) -> Self {
        Self {
            x: seed,
            y: seed.wrapping_mul(1812433253).wrapping_add(1),
            z: seed.wrapping_mul(1812433253).wrapping_mul(2).wrapping_add(2),
            w: seed.wrapping_mul(1812433253).wrapping_mul(3).wrapping_add(3),
        }
    }

    pub fn next(&mut self) -> u32 {
        let t = self.x ^ (self.x << 11);
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w = self.w ^ (self.w >> 19) ^ (t ^ (t >> 8));
        self.w
    }

    /// Returns a float in [-1.0, 1.0]
    pub fn next_f64(&mut self) -> f64 {
        (self.next() as f64 / u32::MAX as f64) * 2.0 - 1.0
    }
}

/// Three-component vector field sampled on a [`Grid`], one buffer per component.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorField {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl VectorField {
    pub fn zeros(size: usize) -> Self {
        Self { x: vec![0.0; size], y: vec![0.0; size], z: vec![0.0; size] }
    }

    /// Field with the same value at every point.
    pub fn uniform(size: usize, value: [f64; 3]) -> Self {
        Self { x: vec![value[0]; size], y: vec![value[1]; size], z: vec![value[2]; size] }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn components(&self) -> [&[f64]; 3] {
        [self.x.as_slice(), self.y.as_slice(), self.z.as_slice()]
    }

    pub fn components_mut(&mut self) -> [&mut Vec<f64>; 3] {
        [&mut self.x, &mut self.y, &mut self.z]
    }

    /// Vector at linear index `ii`.
    pub fn at(&self, ii: usize) -> [f64; 3] {
        [self.x[ii], self.y[ii], self.z[ii]]
    }

    /// Euclidean norm at linear index `ii`.
    pub fn magnitude(&self, ii: usize) -> f64 {
        let [a, b, c] = self.at(ii);
        (a * a + b * b + c * c).sqrt()
    }

    /// `self += factor * other`, component-wise.
    pub fn add_scaled(&mut self, other: &VectorField, factor: f64) {
        for (dst, src) in self.components_mut().into_iter().zip(other.components()) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += factor * s;
            }
        }
    }

    /// Returns `factor * self`.
    pub fn scaled(&self, factor: f64) -> VectorField {
        let mut out = self.clone();
        for comp in out.components_mut() {
            comp.iter_mut().for_each(|v| *v *= factor);
        }
        out
    }

    /// Clamp every component value to `[-bound, bound]`.
    pub fn clamp(&mut self, bound: f64) {
        for comp in self.components_mut() {
            for v in comp.iter_mut() {
                *v = v.clamp(-bound, bound);
            }
        }
    }

    /// Largest absolute component value.
    #[cfg(test)]
    pub fn max_abs(&self) -> f64 {
        self.components()
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Linear index and component (0=x, 1=y, 2=z) of the first non-finite value.
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.components().iter().enumerate().find_map(|(c, comp)| {
            comp.iter().position(|v| !v.is_finite()).map(|ii| (ii, c))
        })
    }
}

/// Position in a scale's 13-state energy cycle, always in `1..=13`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseCycle(u8);

impl Default for PhaseCycle {
    fn default() -> Self {
        Self(1)
    }
}

impl PhaseCycle {
    /// `None` unless `phase` is in `1..=13`.
    #[cfg(test)]
    pub fn new(phase: u8) -> Option<Self> {
        (1..=PHASE_COUNT).contains(&phase).then_some(Self(phase))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 = self.0 % PHASE_COUNT + 1;
    }

    /// Phase reached after `steps` advances: `((p - 1 + steps) mod 13) + 1`.
    #[cfg(test)]
    pub fn advanced_by(self, steps: u64) -> Self {
        let offset = (steps % PHASE_COUNT as u64) as u8;
        Self((self.0 - 1 + offset) % PHASE_COUNT + 1)
    }
}

/// One golden-ratio scale: its velocity field and its phase cycle.
#[derive(Clone, Debug)]
pub struct ScaleLevel {
    pub scale: i32,
    pub u: VectorField,
    pub phase: PhaseCycle,
}

impl ScaleLevel {
    /// φ^scale.
    pub fn weight(&self) -> f64 {
        PHI.powi(self.scale)
    }

    /// ½·mean(|u|²).
    pub fn energy(&self) -> f64 {
        crate::solver::diagnostics::scale_energy(&self.u)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialKind {
    /// Golden-scaled Taylor-Green vortex.
    #[default]
    TaylorGreen,
    /// Fluid at rest (only the seeded perturbation, if any).
    Quiescent,
}

/// How each scale's velocity field is seeded.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialCondition {
    pub kind: InitialKind,
    pub amplitude: f64,
    pub perturbation: f64,
    pub seed: u32,
}

impl Default for InitialCondition {
    fn default() -> Self {
        Self { kind: InitialKind::TaylorGreen, amplitude: 1.0, perturbation: 0.0, seed: 42 }
    }
}

/// All scale levels of a run, stored contiguously by offset from the lowest scale.
pub struct SimState {
    pub grid: Grid,
    pub levels: Vec<ScaleLevel>,
    pub time: f64,
    pub steps: u64,
}

impl SimState {
    pub fn new(grid: Grid, scales: RangeInclusive<i32>, init: &InitialCondition, field_bound: f64) -> Self {
        let mut rng = Xor128::new(init.seed);
        let levels = scales
            .map(|s| {
                let mut u = initial_field(&grid, s, init);
                if init.perturbation > 0.0 {
                    for comp in u.components_mut() {
                        comp.iter_mut().for_each(|v| *v += init.perturbation * rng.next_f64());
                    }
                }
                u.clamp(field_bound);
                ScaleLevel { scale: s, u, phase: PhaseCycle::default() }
            })
            .collect();

        Self { grid, levels, time: 0.0, steps: 0 }
    }

    pub fn scale_min(&self) -> i32 {
        self.levels.first().map_or(0, |l| l.scale)
    }

    pub fn scale_max(&self) -> i32 {
        self.levels.last().map_or(0, |l| l.scale)
    }

    /// Arena lookup by scale index.
    #[cfg(test)]
    pub fn level(&self, scale: i32) -> Option<&ScaleLevel> {
        let offset = scale.checked_sub(self.scale_min())?;
        usize::try_from(offset).ok().and_then(|o| self.levels.get(o))
    }
}

fn initial_field(grid: &Grid, scale: i32, init: &InitialCondition) -> VectorField {
    let mut u = VectorField::zeros(grid.size());
    if init.kind == InitialKind::Quiescent {
        return u;
    }

    // Wavelength stretches with φ^s so coarser scales carry longer vortices.
    let scale_factor = PHI.powi(scale);
    let amp = init.amplitude * scale_factor;
    let kappa = std::f64::consts::TAU / (grid.length * scale_factor);
    let n = grid.n;
    for i in 0..n {
        let (sx, cx) = (kappa * grid.coord(i)).sin_cos();
        for j in 0..n {
            let (sy, cy) = (kappa * grid.coord(j)).sin_cos();
            for k in 0..n {
                let cz = (kappa * grid.coord(k)).cos();
                let ii = idx_inner(i, j, k, n);
                u.x[ii] = amp * sx * cy * cz;
                u.y[ii] = -amp * cx * sy * cz;
            }
        }
    }
    u
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idx_wraps_every_axis() {
        let grid = Grid::new(8, 1.0);
        assert_eq!(grid.idx(-1, 0, 0), grid.idx(7, 0, 0));
        assert_eq!(grid.idx(0, 8, 0), grid.idx(0, 0, 0));
        assert_eq!(grid.idx(0, 0, -9), grid.idx(0, 0, 7));
        assert_eq!(grid.idx(1, 2, 3), idx_inner(1, 2, 3, 8));
    }

    #[test]
    fn test_grid_spacing() {
        let grid = Grid::new(16, std::f64::consts::TAU);
        assert!((grid.dx - std::f64::consts::TAU / 16.0).abs() < 1e-15);
        assert_eq!(grid.size(), 4096);
    }

    #[test]
    fn test_phase_cycle_wraps() {
        let mut p = PhaseCycle::new(13).unwrap();
        p.advance();
        assert_eq!(p.get(), 1);
        p.advance();
        assert_eq!(p.get(), 2);
    }

    #[test]
    fn test_phase_cycle_rejects_out_of_range() {
        assert!(PhaseCycle::new(0).is_none());
        assert!(PhaseCycle::new(14).is_none());
        assert!(PhaseCycle::new(7).is_some());
    }

    #[test]
    fn test_phase_cycle_advanced_by_matches_stepping() {
        for start in 1..=13u8 {
            for n in [0u64, 1, 5, 12, 13, 14, 27, 130, 1001] {
                let p = PhaseCycle::new(start).unwrap();
                let mut stepped = p;
                for _ in 0..n {
                    stepped.advance();
                }
                let expected = ((start as u64 - 1 + n) % 13) as u8 + 1;
                assert_eq!(stepped.get(), expected, "start={} n={}", start, n);
                assert_eq!(p.advanced_by(n), stepped, "start={} n={}", start, n);
            }
        }
    }

    #[test]
    fn test_xor128_range_and_determinism() {
        let mut a = Xor128::new(7);
        let mut b = Xor128::new(7);
        for _ in 0..1000 {
            let v = a.next_f64();
            assert!((-1.0..=1.0).contains(&v));
            assert_eq!(v, b.next_f64());
        }
    }

    #[test]
    fn test_taylor_green_scale_zero() {
        let grid = Grid::new(8, std::f64::consts::TAU);
        let state = SimState::new(grid, 0..=0, &InitialCondition::default(), 10.0);
        let u = &state.levels[0].u;
        // Point (π/2, 0, 0): sin x = 1, cos y = 1, cos z = 1
        let ii = idx_inner(2, 0, 0, 8);
        assert!((u.x[ii] - 1.0).abs() < 1e-12, "u_x={}", u.x[ii]);
        assert!(u.y[ii].abs() < 1e-12, "u_y={}", u.y[ii]);
        assert!(u.z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_levels_indexed_by_scale_offset() {
        let grid = Grid::new(4, 1.0);
        let state = SimState::new(grid, -2..=1, &InitialCondition::default(), 10.0);
        assert_eq!(state.levels.len(), 4);
        assert_eq!(state.scale_min(), -2);
        assert_eq!(state.scale_max(), 1);
        assert_eq!(state.level(-1).map(|l| l.scale), Some(-1));
        assert!(state.level(2).is_none());
        assert!(state.level(-3).is_none());
        assert!(state.levels.iter().all(|l| l.phase.get() == 1));
    }

    #[test]
    fn test_init_respects_field_bound() {
        let grid = Grid::new(8, std::f64::consts::TAU);
        let init = InitialCondition { amplitude: 50.0, perturbation: 0.5, ..Default::default() };
        let state = SimState::new(grid, 0..=2, &init, 10.0);
        for level in &state.levels {
            assert!(level.u.max_abs() <= 10.0, "scale {} exceeds bound", level.scale);
        }
    }

    #[test]
    fn test_quiescent_with_seeded_noise_is_reproducible() {
        let grid = Grid::new(4, 1.0);
        let init = InitialCondition { kind: InitialKind::Quiescent, perturbation: 0.1, seed: 9, ..Default::default() };
        let a = SimState::new(grid, 0..=1, &init, 10.0);
        let b = SimState::new(grid, 0..=1, &init, 10.0);
        assert_eq!(a.levels[1].u, b.levels[1].u);
        assert!(a.levels[0].u.max_abs() > 0.0);
        assert!(a.levels[0].u.max_abs() <= 0.1);
    }

    #[test]
    fn test_first_non_finite() {
        let mut u = VectorField::zeros(5);
        assert_eq!(u.first_non_finite(), None);
        u.y[3] = f64::NAN;
        assert_eq!(u.first_non_finite(), Some((3, 1)));
    }
}
