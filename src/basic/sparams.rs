//! Frequency-indexed scattering matrices and the two reduction primitives.
//!
//! `innerconnect` contracts two ports of one network, `connect` joins ports
//! of two distinct networks through a block-diagonal composite. Both are the
//! Filipsson/Compton sub-network growth identity, evaluated one port pair at
//! a time with whole-frequency-axis column arithmetic.

use nalgebra::{DMatrix, DVector, DVectorView};
use num_complex::Complex64;
use num_traits::One;

use super::error::SimError;

/// Determinant floor below which a contraction bin is treated as singular.
pub const DET_FLOOR: f64 = 1e-30;

/// Scattering data of an `nports`-port network over `n_f` frequency bins.
///
/// Stored as an `n_f x nports^2` complex matrix; column `i * nports + j`
/// holds the response from port `j` into port `i` across the whole frequency
/// axis, so per-pair kernel arithmetic runs as bulk column operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterMatrix {
    nports: usize,
    data: DMatrix<Complex64>,
}

impl ScatterMatrix {
    pub fn zeros(nf: usize, nports: usize) -> Self {
        Self {
            nports,
            data: DMatrix::zeros(nf, nports * nports),
        }
    }

    pub fn from_fn(
        nf: usize,
        nports: usize,
        mut entry: impl FnMut(usize, usize, usize) -> Complex64,
    ) -> Self {
        Self {
            nports,
            data: DMatrix::from_fn(nf, nports * nports, |t, c| {
                entry(t, c / nports, c % nports)
            }),
        }
    }

    /// Broadcast one port matrix across every frequency bin.
    pub fn broadcast(nf: usize, block: &DMatrix<Complex64>) -> Result<Self, SimError> {
        if block.nrows() != block.ncols() {
            return Err(SimError::DataError(format!(
                "port matrix must be square, got {}x{}",
                block.nrows(),
                block.ncols()
            )));
        }
        let n = block.nrows();
        Ok(Self::from_fn(nf, n, |_, i, j| block[(i, j)]))
    }

    pub fn nports(&self) -> usize {
        self.nports
    }

    pub fn nf(&self) -> usize {
        self.data.nrows()
    }

    pub fn at(&self, bin: usize, i: usize, j: usize) -> Complex64 {
        self.data[(bin, i * self.nports + j)]
    }

    /// The full frequency response from port `j` into port `i`.
    pub fn response(&self, i: usize, j: usize) -> DVectorView<'_, Complex64> {
        self.data.column(i * self.nports + j)
    }

    pub fn set_response(&mut self, i: usize, j: usize, values: &DVector<Complex64>) {
        let col = i * self.nports + j;
        self.data.set_column(col, values);
    }

    /// The port matrix at one frequency bin.
    pub fn bin(&self, t: usize) -> DMatrix<Complex64> {
        DMatrix::from_fn(self.nports, self.nports, |i, j| self.at(t, i, j))
    }

    /// Block-diagonal composite of two networks sharing a frequency axis.
    pub fn block_diag(a: &ScatterMatrix, b: &ScatterMatrix) -> Result<Self, SimError> {
        if a.nf() != b.nf() {
            return Err(SimError::DataError(format!(
                "bin counts differ: {} vs {}",
                a.nf(),
                b.nf()
            )));
        }
        let (na, nb) = (a.nports, b.nports);
        let mut out = Self::zeros(a.nf(), na + nb);
        for i in 0..na {
            for j in 0..na {
                out.set_response(i, j, &a.response(i, j).into_owned());
            }
        }
        for i in 0..nb {
            for j in 0..nb {
                out.set_response(na + i, na + j, &b.response(i, j).into_owned());
            }
        }
        Ok(out)
    }

    /// Largest singular value across all bins; 1.0-bounded for passive data.
    pub fn max_singular_value(&self) -> f64 {
        (0..self.nf())
            .map(|t| {
                self.bin(t)
                    .singular_values()
                    .iter()
                    .fold(0.0f64, |acc, s| acc.max(*s))
            })
            .fold(0.0f64, f64::max)
    }
}

/// Outcome of one contraction: the reduced matrix plus the frequency bins
/// whose growth-formula determinant sat below [`DET_FLOOR`].
#[derive(Debug, Clone)]
pub struct Contraction {
    pub smat: ScatterMatrix,
    pub near_singular_bins: Vec<usize>,
}

/// Contract ports `k` and `l` of one network into an `(n-2)`-port network.
///
/// For each surviving pair `(i, j)`, per frequency bin:
///
/// ```text
/// C[i,j] = A[i,j] + (A[i,l] A[k,j] g - A[i,l] A[l,j] b
///                  - A[i,k] A[k,j] a + A[i,k] A[l,j] d) / D
/// ```
///
/// with `a = A[l,l]`, `b = A[k,k]`, `g = A[l,k]-1`, `d = A[k,l]-1` and
/// `D = a b - g d`. Bins where `|D| < DET_FLOOR` are nudged off the
/// singularity by `DET_FLOOR * sign(D)` and reported in the result rather
/// than failing the reduction.
pub fn innerconnect(a: &ScatterMatrix, k: usize, l: usize) -> Result<Contraction, SimError> {
    let n = a.nports();
    if k >= n || l >= n || k == l {
        return Err(SimError::InvalidPort { k, l, nports: n });
    }

    let alpha = a.response(l, l).into_owned();
    let beta = a.response(k, k).into_owned();
    let gamma = a.response(l, k).map(|z| z - 1.0);
    let delta = a.response(k, l).map(|z| z - 1.0);

    let mut det = alpha.component_mul(&beta) - gamma.component_mul(&delta);
    let mut near_singular_bins = Vec::new();
    for (bin, d) in det.iter_mut().enumerate() {
        if d.norm() < DET_FLOOR {
            let sign = if d.norm() == 0.0 {
                Complex64::one()
            } else {
                *d / d.norm()
            };
            *d += sign.scale(DET_FLOOR);
            near_singular_bins.push(bin);
        }
    }

    let survivors: Vec<usize> = (0..n).filter(|&p| p != k && p != l).collect();
    let mut out = ScatterMatrix::zeros(a.nf(), n - 2);
    for (ci, &i) in survivors.iter().enumerate() {
        let a_il = a.response(i, l).into_owned();
        let a_ik = a.response(i, k).into_owned();
        for (cj, &j) in survivors.iter().enumerate() {
            let a_kj = a.response(k, j);
            let a_lj = a.response(l, j);
            let mut num = a_il.component_mul(&a_kj).component_mul(&gamma);
            num -= a_il.component_mul(&a_lj).component_mul(&beta);
            num -= a_ik.component_mul(&a_kj).component_mul(&alpha);
            num += a_ik.component_mul(&a_lj).component_mul(&delta);
            let col = a.response(i, j) + num.component_div(&det);
            out.set_response(ci, cj, &col);
        }
    }

    Ok(Contraction {
        smat: out,
        near_singular_bins,
    })
}

/// Connect port `k` of `A` to port `l` of `B` through the block-diagonal
/// composite, yielding an `(n_A + n_B - 2)`-port network.
///
/// Surviving ports keep ascending composite order: `A`'s survivors first,
/// then `B`'s. Joining two ports of the *same* network is `innerconnect`'s
/// job; two `&ScatterMatrix` arguments here never alias.
pub fn connect(
    a: &ScatterMatrix,
    k: usize,
    b: &ScatterMatrix,
    l: usize,
) -> Result<Contraction, SimError> {
    if k >= a.nports() {
        return Err(SimError::InvalidPort {
            k,
            l,
            nports: a.nports(),
        });
    }
    if l >= b.nports() {
        return Err(SimError::InvalidPort {
            k,
            l,
            nports: b.nports(),
        });
    }
    let composite = ScatterMatrix::block_diag(a, b)?;
    innerconnect(&composite, k, a.nports() + l)
}
