//! Shared wavelength grid for spectra and the sensor forward model.
//!
//! Every spectrum, filter response curve and calibration artifact in a
//! dataset instance is sampled on one common grid: a strictly increasing
//! sequence of wavelengths in nanometers. The grid is constructed once at
//! startup, validated, and then treated as read-only; all numeric code
//! receives it by reference rather than through any global state.
//!
//! The grid also owns the trapezoid quadrature weights derived from its
//! spacing, so that spectral integrals (energy, channel projections) are
//! consistent everywhere they are computed.

use ndarray::Array1;
use thiserror::Error;

/// Errors raised while validating a wavelength grid
#[derive(Debug, Error)]
pub enum GridError {
    #[error("wavelength grid needs at least 2 samples, got {0}")]
    TooShort(usize),

    #[error("wavelengths must be strictly increasing (violation at index {0})")]
    NotAscending(usize),

    #[error("wavelengths must be finite and non-negative (violation at index {0})")]
    NonFinite(usize),
}

/// Ordered wavelength samples in nanometers with trapezoid weights.
///
/// Invariants enforced at construction:
/// - at least two samples
/// - every value finite and non-negative
/// - strictly increasing order
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthGrid {
    wavelengths: Array1<f64>,
    trapezoid_weights: Array1<f64>,
}

impl WavelengthGrid {
    /// Create a grid from explicit wavelength samples in nanometers.
    ///
    /// # Errors
    ///
    /// Returns a `GridError` if the samples are too few, non-finite,
    /// negative, or not strictly increasing.
    pub fn new(wavelengths: Vec<f64>) -> Result<Self, GridError> {
        if wavelengths.len() < 2 {
            return Err(GridError::TooShort(wavelengths.len()));
        }
        for (i, &w) in wavelengths.iter().enumerate() {
            if !w.is_finite() || w < 0.0 {
                return Err(GridError::NonFinite(i));
            }
        }
        for i in 1..wavelengths.len() {
            if wavelengths[i] <= wavelengths[i - 1] {
                return Err(GridError::NotAscending(i));
            }
        }

        let trapezoid_weights = trapezoid_weights(&wavelengths);
        Ok(Self {
            wavelengths: Array1::from(wavelengths),
            trapezoid_weights,
        })
    }

    /// Create a uniform grid of `n` samples spanning `[start_nm, end_nm]`.
    ///
    /// Chip-size spectrometer datasets conventionally use a uniform 1 nm
    /// grid over the sensor's sensitive range, e.g. 450-690 nm.
    pub fn from_range(start_nm: f64, end_nm: f64, n: usize) -> Result<Self, GridError> {
        if n < 2 {
            return Err(GridError::TooShort(n));
        }
        let step = (end_nm - start_nm) / (n - 1) as f64;
        Self::new((0..n).map(|i| start_nm + step * i as f64).collect())
    }

    /// Number of wavelength samples
    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    /// A validated grid always holds at least two samples
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Wavelength samples in nanometers
    pub fn wavelengths(&self) -> &Array1<f64> {
        &self.wavelengths
    }

    /// Wavelength at a given sample index
    pub fn at(&self, index: usize) -> f64 {
        self.wavelengths[index]
    }

    /// Lower and upper wavelength bounds in nanometers
    pub fn span(&self) -> (f64, f64) {
        (
            self.wavelengths[0],
            self.wavelengths[self.wavelengths.len() - 1],
        )
    }

    /// Quadrature weights for trapezoid integration over the grid.
    ///
    /// For samples λ₀ < λ₁ < … < λₙ₋₁ the weights are
    /// `w₀ = (λ₁-λ₀)/2`, `wᵢ = (λᵢ₊₁-λᵢ₋₁)/2`, `wₙ₋₁ = (λₙ₋₁-λₙ₋₂)/2`,
    /// so that `Σ wᵢ f(λᵢ)` is the trapezoid-rule integral of `f`.
    pub fn trapezoid_weights(&self) -> &Array1<f64> {
        &self.trapezoid_weights
    }
}

fn trapezoid_weights(wavelengths: &[f64]) -> Array1<f64> {
    let n = wavelengths.len();
    let mut weights = vec![0.0; n];
    weights[0] = (wavelengths[1] - wavelengths[0]) / 2.0;
    weights[n - 1] = (wavelengths[n - 1] - wavelengths[n - 2]) / 2.0;
    for i in 1..n - 1 {
        weights[i] = (wavelengths[i + 1] - wavelengths[i - 1]) / 2.0;
    }
    Array1::from(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_grid() {
        let grid = WavelengthGrid::from_range(400.0, 700.0, 50).unwrap();
        assert_eq!(grid.len(), 50);
        let (lo, hi) = grid.span();
        assert_relative_eq!(lo, 400.0);
        assert_relative_eq!(hi, 700.0);

        // Uniform spacing
        let step = (700.0 - 400.0) / 49.0;
        assert_relative_eq!(grid.at(1) - grid.at(0), step, epsilon = 1e-12);
    }

    #[test]
    fn test_trapezoid_weights_sum_to_span() {
        // Trapezoid weights of any grid sum to the total span
        let grid = WavelengthGrid::new(vec![400.0, 410.0, 435.0, 500.0, 700.0]).unwrap();
        let total: f64 = grid.trapezoid_weights().sum();
        assert_relative_eq!(total, 300.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_unordered() {
        let result = WavelengthGrid::new(vec![400.0, 500.0, 450.0]);
        assert!(matches!(result, Err(GridError::NotAscending(2))));

        let result = WavelengthGrid::new(vec![400.0, 400.0, 450.0]);
        assert!(matches!(result, Err(GridError::NotAscending(1))));
    }

    #[test]
    fn test_rejects_non_finite() {
        let result = WavelengthGrid::new(vec![400.0, f64::NAN, 450.0]);
        assert!(matches!(result, Err(GridError::NonFinite(1))));
    }

    #[test]
    fn test_rejects_too_short() {
        assert!(matches!(
            WavelengthGrid::new(vec![500.0]),
            Err(GridError::TooShort(1))
        ));
    }
}
