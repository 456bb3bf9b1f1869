//! Natural cubic spline interpolation.
//!
//! Used by the baseline-shift operator to turn a handful of random knot
//! values into a smooth low-frequency continuum over the wavelength grid.
//! Natural boundary conditions (zero second derivative at both ends) keep
//! the extrapolated ends flat rather than oscillating.

/// Natural cubic spline through a set of knots.
///
/// Stores the knot second derivatives and evaluates each segment with the
/// standard two-point Hermite form. Knot abscissae must be strictly
/// increasing; callers in this crate construct them that way.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl CubicSpline {
    /// Fit a natural cubic spline through `(x, y)` knots.
    ///
    /// Requires at least two knots with strictly increasing `x`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "knot vectors must have equal length");
        assert!(x.len() >= 2, "spline needs at least two knots");
        debug_assert!(x.windows(2).all(|w| w[0] < w[1]));

        let n = x.len();
        let mut m = vec![0.0; n];
        if n > 2 {
            // Solve the tridiagonal system for interior second derivatives
            // with the Thomas algorithm; natural ends stay zero.
            let mut diag = vec![0.0; n];
            let mut rhs = vec![0.0; n];
            let mut upper = vec![0.0; n];

            for i in 1..n - 1 {
                let h_prev = x[i] - x[i - 1];
                let h_next = x[i + 1] - x[i];
                diag[i] = 2.0 * (h_prev + h_next);
                upper[i] = h_next;
                rhs[i] = 6.0 * ((y[i + 1] - y[i]) / h_next - (y[i] - y[i - 1]) / h_prev);
            }

            // Forward elimination
            for i in 2..n - 1 {
                let h_prev = x[i] - x[i - 1];
                let factor = h_prev / diag[i - 1];
                diag[i] -= factor * upper[i - 1];
                rhs[i] -= factor * rhs[i - 1];
            }

            // Back substitution
            m[n - 2] = rhs[n - 2] / diag[n - 2];
            for i in (1..n - 2).rev() {
                m[i] = (rhs[i] - upper[i] * m[i + 1]) / diag[i];
            }
        }

        Self {
            x,
            y,
            second_derivatives: m,
        }
    }

    /// Evaluate the spline at `x`, holding end values outside the knot range.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.x.len();
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }

        // Binary search for the segment containing x
        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.x[mid] <= x {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let h = self.x[hi] - self.x[lo];
        let a = (self.x[hi] - x) / h;
        let b = (x - self.x[lo]) / h;
        a * self.y[lo]
            + b * self.y[hi]
            + ((a.powi(3) - a) * self.second_derivatives[lo]
                + (b.powi(3) - b) * self.second_derivatives[hi])
                * h
                * h
                / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_passes_through_knots() {
        let x = vec![0.0, 1.0, 2.5, 4.0];
        let y = vec![1.0, -0.5, 2.0, 0.0];
        let spline = CubicSpline::new(x.clone(), y.clone());
        for (xi, yi) in x.iter().zip(&y) {
            assert_relative_eq!(spline.evaluate(*xi), *yi, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_linear_data_stays_linear() {
        // A natural spline through collinear knots is the line itself
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 2.0, 4.0, 6.0];
        let spline = CubicSpline::new(x, y);
        assert_relative_eq!(spline.evaluate(0.5), 1.0, epsilon = 1e-10);
        assert_relative_eq!(spline.evaluate(2.75), 5.5, epsilon = 1e-10);
    }

    #[test]
    fn test_holds_ends_outside_range() {
        let spline = CubicSpline::new(vec![1.0, 2.0], vec![3.0, 5.0]);
        assert_relative_eq!(spline.evaluate(0.0), 3.0);
        assert_relative_eq!(spline.evaluate(9.0), 5.0);
    }

    #[test]
    fn test_two_knots_is_linear() {
        let spline = CubicSpline::new(vec![0.0, 2.0], vec![0.0, 1.0]);
        assert_relative_eq!(spline.evaluate(1.0), 0.5, epsilon = 1e-12);
    }
}
