//! Optical forward model of a filter-array spectrometer.
//!
//! The forward model is the physical mapping from a full-resolution
//! spectrum to the sensor's few channel readings. Each reading is the
//! integral of the spectrum against that channel's responsivity curve,
//! approximated here as a trapezoid-weighted inner product over the shared
//! wavelength grid:
//!
//! m_c = Σᵢ R_{c,i} · wᵢ · sᵢ
//!
//! where `wᵢ` are the grid's trapezoid quadrature weights. The projection
//! is a pure function of immutable calibration state and exactly linear in
//! the spectrum, which is what makes physics-informed augmentation sound:
//! any perturbed spectrum can be re-projected to a measurement that stays
//! consistent with the device optics.
//!
//! A best-effort least-squares inversion is provided as a validation
//! baseline only; recovering spectra from C ≪ N readings is the downstream
//! reconstruction problem and explicitly not solved here.

pub mod response;

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use thiserror::Error;

use crate::grid::WavelengthGrid;
use crate::spectra::Spectrum;

pub use response::{FilterResponseMatrix, ResponseError};

/// Errors raised by forward model operations
#[derive(Debug, Error)]
pub enum ForwardModelError {
    #[error("spectrum length {got} does not match forward model grid length {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("measurement length {got} does not match channel count {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("least-squares solve failed: {0}")]
    LeastSquares(String),
}

/// Simulated or real channel readings of the sensor.
///
/// Always derived, never mutated: a measurement is either read from the
/// device or produced by projecting a spectrum through the forward model.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    readings: Array1<f64>,
}

impl Measurement {
    /// Wrap channel readings
    pub fn new(readings: Array1<f64>) -> Self {
        Self { readings }
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when the measurement holds no channels
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Channel readings
    pub fn readings(&self) -> &Array1<f64> {
        &self.readings
    }
}

/// Projects spectra to channel readings through measured filter responses
#[derive(Debug, Clone)]
pub struct ForwardModel {
    grid: WavelengthGrid,
    responses: FilterResponseMatrix,
    /// Responses pre-multiplied by trapezoid weights, so projection is a
    /// single matrix-vector product
    weighted: ndarray::Array2<f64>,
}

impl ForwardModel {
    /// Build a forward model from the calibration grid and response matrix.
    ///
    /// # Errors
    ///
    /// Returns `ResponseError` if the matrix does not match the grid.
    pub fn new(
        grid: WavelengthGrid,
        responses: FilterResponseMatrix,
    ) -> Result<Self, ResponseError> {
        if responses.samples() != grid.len() {
            return Err(ResponseError::LengthMismatch {
                expected: grid.len(),
                got: responses.samples(),
            });
        }
        let weights = grid.trapezoid_weights();
        let mut weighted = responses.matrix().clone();
        for mut row in weighted.rows_mut() {
            row *= weights;
        }
        Ok(Self {
            grid,
            responses,
            weighted,
        })
    }

    /// Wavelength grid the model is calibrated on
    pub fn grid(&self) -> &WavelengthGrid {
        &self.grid
    }

    /// Number of sensor channels
    pub fn channels(&self) -> usize {
        self.responses.channels()
    }

    /// The calibrated response matrix
    pub fn responses(&self) -> &FilterResponseMatrix {
        &self.responses
    }

    /// Project a spectrum to noiseless channel readings.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` when the spectrum was not sampled on the
    /// model's wavelength grid.
    pub fn project(&self, spectrum: &Spectrum) -> Result<Measurement, ForwardModelError> {
        if spectrum.len() != self.grid.len() {
            return Err(ForwardModelError::DimensionMismatch {
                expected: self.grid.len(),
                got: spectrum.len(),
            });
        }
        Ok(Measurement::new(self.weighted.dot(spectrum.intensities())))
    }

    /// Best-effort linear least-squares spectrum estimate from a measurement.
    ///
    /// Solves `min ‖A·s - m‖` over the weighted response matrix via SVD and
    /// clamps the result non-negative. With C channels and N ≫ C grid
    /// samples this is heavily underdetermined; it exists as a calibration
    /// sanity baseline, not as a reconstruction method.
    pub fn inverse_hint(&self, measurement: &Measurement) -> Result<Spectrum, ForwardModelError> {
        if measurement.len() != self.channels() {
            return Err(ForwardModelError::ChannelMismatch {
                expected: self.channels(),
                got: measurement.len(),
            });
        }

        let (channels, samples) = self.weighted.dim();
        let a = DMatrix::from_fn(channels, samples, |r, c| self.weighted[[r, c]]);
        let b = DVector::from_fn(channels, |r, _| measurement.readings()[r]);

        let svd = a.svd(true, true);
        let solution = svd
            .solve(&b, 1e-12)
            .map_err(|e| ForwardModelError::LeastSquares(e.to_string()))?;

        let intensities = Array1::from_iter(solution.iter().copied());
        Spectrum::from_clamped(intensities)
            .map_err(|e| ForwardModelError::LeastSquares(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn model() -> ForwardModel {
        let grid = WavelengthGrid::from_range(400.0, 700.0, 4).unwrap();
        let responses = FilterResponseMatrix::new(
            Array2::from_shape_vec(
                (2, 4),
                vec![
                    1.0, 0.5, 0.0, 0.0, //
                    0.0, 0.0, 0.5, 1.0,
                ],
            )
            .unwrap(),
            &grid,
        )
        .unwrap();
        ForwardModel::new(grid, responses).unwrap()
    }

    #[test]
    fn test_project_trapezoid_weighted() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 1.0, 1.0, 1.0]).unwrap();
        let measurement = model.project(&spectrum).unwrap();

        // Grid step is 100nm, trapezoid weights [50, 100, 100, 50]
        assert_eq!(measurement.len(), 2);
        assert_relative_eq!(measurement.readings()[0], 100.0, epsilon = 1e-9);
        assert_relative_eq!(measurement.readings()[1], 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_dimension_mismatch() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            model.project(&spectrum),
            Err(ForwardModelError::DimensionMismatch {
                expected: 4,
                got: 3
            })
        ));
    }

    #[test]
    fn test_linearity() {
        let model = model();
        let s1 = Spectrum::new(array![1.0, 0.2, 0.8, 0.1]).unwrap();
        let s2 = Spectrum::new(array![0.3, 0.9, 0.0, 0.5]).unwrap();
        let alpha = 2.5;

        let combined =
            Spectrum::new(s1.intensities() * alpha + s2.intensities()).unwrap();

        let m_combined = model.project(&combined).unwrap();
        let m1 = model.project(&s1).unwrap();
        let m2 = model.project(&s2).unwrap();

        for c in 0..model.channels() {
            assert_relative_eq!(
                m_combined.readings()[c],
                alpha * m1.readings()[c] + m2.readings()[c],
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_inverse_hint_round_trip() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 0.5, 0.5, 1.0]).unwrap();
        let measurement = model.project(&spectrum).unwrap();

        // The least-squares estimate must at least re-project to the same
        // measurement (it picks the minimum-norm solution in the row space).
        let estimate = model.inverse_hint(&measurement).unwrap();
        let reprojected = model.project(&estimate).unwrap();
        for c in 0..model.channels() {
            assert_relative_eq!(
                reprojected.readings()[c],
                measurement.readings()[c],
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_inverse_hint_channel_mismatch() {
        let model = model();
        let measurement = Measurement::new(array![1.0, 2.0, 3.0]);
        assert!(matches!(
            model.inverse_hint(&measurement),
            Err(ForwardModelError::ChannelMismatch {
                expected: 2,
                got: 3
            })
        ));
    }
}
