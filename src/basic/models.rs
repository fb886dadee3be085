//! Analytic component factories.
//!
//! Minimal dispersionless models of the usual silicon-photonics building
//! blocks. Real device libraries supply measured data through `io`; these
//! factories cover the same interface with closed-form responses, which also
//! makes them exact references for circuit-level tests.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use num_complex::Complex64;

use super::element::Element;
use super::freq::{FrequencyGrid, C_VACUUM};
use super::sparams::ScatterMatrix;

/// Effective index of the standard 500x220 nm strip waveguide near 1550 nm.
pub const DEFAULT_NEFF: f64 = 2.44;

/// Lossless straight waveguide of physical length `length` (m).
pub fn waveguide(grid: &FrequencyGrid, length: f64) -> Element {
    waveguide_with(grid, length, DEFAULT_NEFF, 0.0)
}

/// Straight waveguide with explicit effective index and propagation loss
/// (dB/cm). Transmission is `a * exp(i * beta * L)` with
/// `beta = 2 pi n_eff f / c`; reflections are zero.
pub fn waveguide_with(
    grid: &FrequencyGrid,
    length: f64,
    neff: f64,
    loss_db_per_cm: f64,
) -> Element {
    let amplitude = 10f64.powf(-loss_db_per_cm * (length * 100.0) / 20.0);
    let s = ScatterMatrix::from_fn(grid.len(), 2, |t, i, j| {
        if i == j {
            Complex64::default()
        } else {
            let beta = 2.0 * PI * neff * grid.values()[t] / C_VACUUM;
            Complex64::from_polar(amplitude, beta * length)
        }
    });
    Element::new("waveguide", grid.clone(), s).expect("shape is consistent by construction")
}

/// Ideal 3 dB Y-branch: port 0 is the trunk, ports 1 and 2 the arms.
pub fn y_branch(grid: &FrequencyGrid) -> Element {
    let r = Complex64::new(1.0 / 2f64.sqrt(), 0.0);
    let zero = Complex64::default();
    let block = DMatrix::from_row_slice(3, 3, &[zero, r, r, r, zero, zero, r, zero, zero]);
    let s = ScatterMatrix::broadcast(grid.len(), &block).expect("square block");
    Element::new("y_branch", grid.clone(), s).expect("shape is consistent by construction")
}

/// Broadband 50/50 directional coupler. Ports 0/1 on the left, 2/3 on the
/// right; bar transmission `1/sqrt(2)`, cross `i/sqrt(2)`.
pub fn broadband_dc(grid: &FrequencyGrid) -> Element {
    coupler(grid, "bdc", 1.0 / 2f64.sqrt())
}

/// Half-ring evanescent coupler with cross-coupling amplitude `kappa`.
/// Ports 0/2 are the bus, 1/3 the ring arms.
pub fn halfring(grid: &FrequencyGrid, kappa: f64) -> Element {
    coupler(grid, "dc_halfring", kappa)
}

fn coupler(grid: &FrequencyGrid, label: &str, kappa: f64) -> Element {
    let t = Complex64::new((1.0 - kappa * kappa).sqrt(), 0.0);
    let k = Complex64::new(0.0, kappa);
    let zero = Complex64::default();
    #[rustfmt::skip]
    let block = DMatrix::from_row_slice(4, 4, &[
        zero, zero, t,    k,
        zero, zero, k,    t,
        t,    k,    zero, zero,
        k,    t,    zero, zero,
    ]);
    let s = ScatterMatrix::broadcast(grid.len(), &block).expect("square block");
    Element::new(label, grid.clone(), s).expect("shape is consistent by construction")
}

/// Fibre grating coupler stub: flat symmetric 2-port with the given
/// insertion loss (dB).
pub fn grating_coupler(grid: &FrequencyGrid, insertion_loss_db: f64) -> Element {
    let a = Complex64::new(10f64.powf(-insertion_loss_db / 20.0), 0.0);
    let zero = Complex64::default();
    let block = DMatrix::from_row_slice(2, 2, &[zero, a, a, zero]);
    let s = ScatterMatrix::broadcast(grid.len(), &block).expect("square block");
    Element::new("gc", grid.clone(), s).expect("shape is consistent by construction")
}
