use nalgebra::DVector;
use num_complex::Complex64;

use super::error::SimError;
use super::sparams::ScatterMatrix;

/// Speed of light in vacuum, m/s.
pub const C_VACUUM: f64 = 299_792_458.0;

/// Number of points in the default simulation grid.
pub const DEFAULT_GRID_POINTS: usize = 2000;

/// An ordered sequence of strictly monotonic frequencies, in Hz.
///
/// A single grid is chosen per top-level network; every component attached to
/// it exposes its scattering data on this axis. Both ascending and descending
/// orderings are accepted (a sweep specified in wavelength comes out
/// descending in frequency).
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    data: DVector<f64>,
}

impl FrequencyGrid {
    pub fn new(data: DVector<f64>) -> Result<Self, SimError> {
        if data.is_empty() {
            return Err(SimError::DataError("empty frequency grid".into()));
        }
        let ascending = data.len() < 2 || data[1] > data[0];
        for w in data.as_slice().windows(2) {
            let ok = if ascending { w[1] > w[0] } else { w[1] < w[0] };
            if !ok {
                return Err(SimError::DataError(
                    "frequency grid must be strictly monotonic".into(),
                ));
            }
        }
        Ok(Self { data })
    }

    /// Uniform grid of `n` points from `start` to `end` Hz, inclusive.
    pub fn linspace(start: f64, end: f64, n: usize) -> Result<Self, SimError> {
        if n < 2 {
            return Err(SimError::DataError(
                "linspace needs at least two points".into(),
            ));
        }
        let step = (end - start) / (n - 1) as f64;
        Self::new(DVector::from_fn(n, |i, _| start + step * i as f64))
    }

    /// Single-frequency grid, used by analytic single-bin fixtures.
    pub fn single(f: f64) -> Self {
        Self {
            data: DVector::from_element(1, f),
        }
    }

    /// The default sweep: 1.5 um to 1.6 um, expressed in Hz.
    ///
    /// Matches the conventional C-band characterisation window of silicon
    /// photonic component data. Descending in frequency since the sweep is
    /// uniform in wavelength bounds.
    pub fn c_band() -> Self {
        Self::linspace(
            C_VACUUM / 1.5e-6,
            C_VACUUM / 1.6e-6,
            DEFAULT_GRID_POINTS,
        )
        .unwrap()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn min(&self) -> f64 {
        let first = self.data[0];
        let last = self.data[self.data.len() - 1];
        first.min(last)
    }

    pub fn max(&self) -> f64 {
        let first = self.data[0];
        let last = self.data[self.data.len() - 1];
        first.max(last)
    }

    pub fn is_descending(&self) -> bool {
        self.data.len() >= 2 && self.data[1] < self.data[0]
    }

    /// True when `other`'s span lies within this grid's span.
    pub fn covers(&self, other: &FrequencyGrid) -> bool {
        self.min() <= other.min() && other.max() <= self.max()
    }

    /// Corresponding vacuum wavelengths, in meters.
    pub fn wavelengths(&self) -> DVector<f64> {
        self.data.map(|f| C_VACUUM / f)
    }
}

/// Resample `source_s` (defined on `source`) onto `target`.
///
/// Independent natural cubic splines per port pair; real and imaginary parts
/// ride through the same spline as one complex-valued function. Targets
/// outside the source span fail with `DomainError`.
pub fn resample(
    target: &FrequencyGrid,
    source: &FrequencyGrid,
    source_s: &ScatterMatrix,
) -> Result<ScatterMatrix, SimError> {
    if source_s.nf() != source.len() {
        return Err(SimError::DataError(format!(
            "scattering data has {} bins but the source grid has {} points",
            source_s.nf(),
            source.len()
        )));
    }
    for &f in target.values().iter() {
        if f < source.min() || f > source.max() {
            return Err(SimError::DomainError {
                value: f,
                lo: source.min(),
                hi: source.max(),
            });
        }
    }
    if source.len() == 1 {
        // A single-bin source carries no shape to interpolate; the range
        // check above already pinned every target to that one frequency.
        let n = source_s.nports();
        return Ok(ScatterMatrix::from_fn(target.len(), n, |_, i, j| {
            source_s.at(0, i, j)
        }));
    }

    // Knots in ascending order regardless of sweep direction.
    let nf = source.len();
    let xs: Vec<f64> = if source.is_descending() {
        (0..nf).map(|t| source.values()[nf - 1 - t]).collect()
    } else {
        source.values().iter().copied().collect()
    };

    let n = source_s.nports();
    let mut out = ScatterMatrix::zeros(target.len(), n);
    let mut ys = vec![Complex64::default(); nf];
    for i in 0..n {
        for j in 0..n {
            let col = source_s.response(i, j);
            if source.is_descending() {
                for t in 0..nf {
                    ys[t] = col[nf - 1 - t];
                }
            } else {
                ys.copy_from_slice(col.as_slice());
            }
            let spline = CubicSpline::natural(&xs, &ys);
            let fitted =
                DVector::from_fn(target.len(), |t, _| spline.eval(target.values()[t]));
            out.set_response(i, j, &fitted);
        }
    }
    Ok(out)
}

/// Natural cubic spline over ascending knots with complex values.
///
/// Second-derivative formulation; the tridiagonal moment system is solved by
/// the Thomas algorithm with natural end conditions. Two knots degenerate to
/// the linear interpolant.
struct CubicSpline<'a> {
    xs: &'a [f64],
    ys: &'a [Complex64],
    m: Vec<Complex64>,
}

impl<'a> CubicSpline<'a> {
    fn natural(xs: &'a [f64], ys: &'a [Complex64]) -> Self {
        let n = xs.len();
        debug_assert_eq!(n, ys.len());
        debug_assert!(n >= 2);
        let mut m = vec![Complex64::default(); n];
        if n > 2 {
            let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
            // Interior rows of the tridiagonal moment system.
            let mut diag = vec![0.0; n - 2];
            let mut rhs = vec![Complex64::default(); n - 2];
            for i in 1..n - 1 {
                diag[i - 1] = 2.0 * (h[i - 1] + h[i]);
                let d1 = (ys[i + 1] - ys[i]) / h[i];
                let d0 = (ys[i] - ys[i - 1]) / h[i - 1];
                rhs[i - 1] = (d1 - d0).scale(6.0);
            }
            // Thomas forward sweep; sub/super diagonals are h[1..n-2].
            for i in 1..n - 2 {
                let w = h[i] / diag[i - 1];
                diag[i] -= w * h[i];
                let correction = rhs[i - 1].scale(w);
                rhs[i] -= correction;
            }
            m[n - 2] = rhs[n - 3] / diag[n - 3];
            for i in (1..n - 2).rev() {
                m[i] = (rhs[i - 1] - m[i + 1].scale(h[i])) / diag[i - 1];
            }
        }
        Self { xs, ys, m }
    }

    fn eval(&self, x: f64) -> Complex64 {
        let n = self.xs.len();
        let seg = self
            .xs
            .partition_point(|&knot| knot < x)
            .clamp(1, n - 1)
            - 1;
        let h = self.xs[seg + 1] - self.xs[seg];
        let a = self.xs[seg + 1] - x;
        let b = x - self.xs[seg];
        let (m0, m1) = (self.m[seg], self.m[seg + 1]);
        let cubic = (m0.scale(a * a * a) + m1.scale(b * b * b)).scale(1.0 / (6.0 * h));
        let linear = (self.ys[seg] - m0.scale(h * h / 6.0)).scale(a / h)
            + (self.ys[seg + 1] - m1.scale(h * h / 6.0)).scale(b / h);
        cubic + linear
    }
}
