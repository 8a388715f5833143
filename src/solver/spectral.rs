use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::state::{idx_inner, Grid, VectorField};

/// FFT plans and wavenumber tables for one periodic [`Grid`].
pub struct Spectral {
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    /// Angular wavenumbers in FFT order: 2π·fftfreq(n, dx).
    k: Vec<f64>,
    /// Same as `k` with the Nyquist mode zeroed, used for derivatives.
    k_deriv: Vec<f64>,
    line: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

/// Angular wavenumbers for `n` samples spaced `dx` apart, in FFT output order.
pub fn wavenumbers(n: usize, dx: f64) -> Vec<f64> {
    let scale = std::f64::consts::TAU / (n as f64 * dx);
    (0..n)
        .map(|i| {
            let m = if i < n.div_ceil(2) { i as f64 } else { i as f64 - n as f64 };
            m * scale
        })
        .collect()
}

impl Spectral {
    pub fn new(grid: &Grid) -> Self {
        let n = grid.n;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let scratch_len = forward.get_inplace_scratch_len().max(inverse.get_inplace_scratch_len());

        let k = wavenumbers(n, grid.dx);
        let mut k_deriv = k.clone();
        if n % 2 == 0 {
            k_deriv[n / 2] = 0.0;
        }

        Self {
            n,
            forward,
            inverse,
            k,
            k_deriv,
            line: vec![Complex::new(0.0, 0.0); n],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// In-place 3D transform, one axis at a time. The inverse is normalised by 1/n³.
    fn fft3(&mut self, data: &mut [Complex<f64>], inverse: bool) {
        let fft = if inverse { Arc::clone(&self.inverse) } else { Arc::clone(&self.forward) };
        let n = self.n;

        // z lines are contiguous
        for chunk in data.chunks_exact_mut(n) {
            fft.process_with_scratch(chunk, &mut self.scratch);
        }

        // y (stride n) then x (stride n²)
        for stride in [n, n * n] {
            let block = stride * n;
            for base in (0..data.len()).step_by(block) {
                for offset in 0..stride {
                    for m in 0..n {
                        self.line[m] = data[base + offset + m * stride];
                    }
                    fft.process_with_scratch(&mut self.line, &mut self.scratch);
                    for m in 0..n {
                        data[base + offset + m * stride] = self.line[m];
                    }
                }
            }
        }

        if inverse {
            let norm = 1.0 / data.len() as f64;
            data.iter_mut().for_each(|c| *c *= norm);
        }
    }

    fn forward_real(&mut self, values: &[f64]) -> Vec<Complex<f64>> {
        let mut hat: Vec<Complex<f64>> = values.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.fft3(&mut hat, false);
        hat
    }

    fn inverse_into(&mut self, hat: &mut [Complex<f64>], out: &mut [f64]) {
        self.fft3(hat, true);
        for (o, c) in out.iter_mut().zip(hat.iter()) {
            *o = c.re;
        }
    }

    /// Damp every Fourier mode by exp(-ν·|k|²·dt).
    /// Never increases energy: every multiplier lies in (0, 1].
    pub fn diffuse(&mut self, field: &mut VectorField, dt: f64, viscosity: f64) {
        if viscosity == 0.0 || dt == 0.0 {
            return;
        }
        let n = self.n;
        let decay: Vec<f64> = self.k.iter().map(|k| k * k).collect();
        for comp in field.components_mut() {
            let mut hat = self.forward_real(comp);
            for i in 0..n {
                for j in 0..n {
                    for k in 0..n {
                        let k2 = decay[i] + decay[j] + decay[k];
                        hat[idx_inner(i, j, k, n)] *= (-viscosity * k2 * dt).exp();
                    }
                }
            }
            self.inverse_into(&mut hat, comp);
        }
    }

    /// Spectral curl ω = ∇×u, with ∂_j taken as multiplication by i·k_j.
    pub fn compute_vorticity(&mut self, field: &VectorField) -> VectorField {
        let n = self.n;
        let ux = self.forward_real(&field.x);
        let uy = self.forward_real(&field.y);
        let uz = self.forward_real(&field.z);

        let size = ux.len();
        let mut wx = vec![Complex::new(0.0, 0.0); size];
        let mut wy = vec![Complex::new(0.0, 0.0); size];
        let mut wz = vec![Complex::new(0.0, 0.0); size];

        let i_unit = Complex::new(0.0, 1.0);
        for i in 0..n {
            let kx = self.k_deriv[i];
            for j in 0..n {
                let ky = self.k_deriv[j];
                for k in 0..n {
                    let kz = self.k_deriv[k];
                    let ii = idx_inner(i, j, k, n);
                    wx[ii] = i_unit * (ky * uz[ii] - kz * uy[ii]);
                    wy[ii] = i_unit * (kz * ux[ii] - kx * uz[ii]);
                    wz[ii] = i_unit * (kx * uy[ii] - ky * ux[ii]);
                }
            }
        }

        let mut omega = VectorField::zeros(size);
        self.inverse_into(&mut wx, &mut omega.x);
        self.inverse_into(&mut wy, &mut omega.y);
        self.inverse_into(&mut wz, &mut omega.z);
        omega
    }
}
