//! Measured per-channel filter response curves.
//!
//! A filter-array spectrometer exposes a handful of broadband channels,
//! each defined by a transmission/responsivity curve sampled on the shared
//! wavelength grid. The C×N response matrix is loaded once from device
//! calibration and immutable afterwards; the forward model owns it for the
//! process lifetime.

use ndarray::{Array2, ArrayView1};
use thiserror::Error;

use crate::grid::WavelengthGrid;

/// Errors raised while validating a filter response matrix
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("filter response matrix must contain at least one channel")]
    NoChannels,

    #[error("response row length {got} does not match grid length {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("response value at channel {channel}, sample {sample} is not finite")]
    NonFinite { channel: usize, sample: usize },

    #[error("negative response {value} at channel {channel}, sample {sample}")]
    Negative {
        channel: usize,
        sample: usize,
        value: f64,
    },
}

/// C×N per-channel spectral responsivity sampled on a wavelength grid.
///
/// Each row is one channel's response curve; values are dimensionless
/// transmission fractions (or responsivity in arbitrary calibrated units)
/// and must be finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResponseMatrix {
    responses: Array2<f64>,
}

impl FilterResponseMatrix {
    /// Validate a response matrix against the wavelength grid.
    pub fn new(responses: Array2<f64>, grid: &WavelengthGrid) -> Result<Self, ResponseError> {
        let (channels, samples) = responses.dim();
        if channels == 0 {
            return Err(ResponseError::NoChannels);
        }
        if samples != grid.len() {
            return Err(ResponseError::LengthMismatch {
                expected: grid.len(),
                got: samples,
            });
        }
        for ((channel, sample), &value) in responses.indexed_iter() {
            if !value.is_finite() {
                return Err(ResponseError::NonFinite { channel, sample });
            }
            if value < 0.0 {
                return Err(ResponseError::Negative {
                    channel,
                    sample,
                    value,
                });
            }
        }
        Ok(Self { responses })
    }

    /// Build a matrix from per-channel rows.
    pub fn from_rows(rows: Vec<Vec<f64>>, grid: &WavelengthGrid) -> Result<Self, ResponseError> {
        if rows.is_empty() {
            return Err(ResponseError::NoChannels);
        }
        let n = grid.len();
        for row in &rows {
            if row.len() != n {
                return Err(ResponseError::LengthMismatch {
                    expected: n,
                    got: row.len(),
                });
            }
        }
        let channels = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let responses = Array2::from_shape_vec((channels, n), flat)
            .expect("row-major layout matches (channels, n) shape");
        Self::new(responses, grid)
    }

    /// Number of sensor channels
    pub fn channels(&self) -> usize {
        self.responses.nrows()
    }

    /// Number of wavelength samples per channel
    pub fn samples(&self) -> usize {
        self.responses.ncols()
    }

    /// Response curve of one channel
    pub fn response(&self, channel: usize) -> ArrayView1<'_, f64> {
        self.responses.row(channel)
    }

    /// The full C×N matrix
    pub fn matrix(&self) -> &Array2<f64> {
        &self.responses
    }
}
