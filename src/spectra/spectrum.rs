//! Non-negative intensity spectra sampled on a wavelength grid.
//!
//! A `Spectrum` holds one intensity value per grid sample and maintains the
//! non-negativity invariant of physical light spectra: a sensor cannot see
//! negative intensity, so every constructor either rejects or clamps
//! negative entries. Spectra are immutable once created; every operation
//! that changes intensities returns a new `Spectrum`.
//!
//! # Normalization Conventions
//!
//! Datasets fix one of three conventions, applied after every perturbation:
//! - `None`: intensities are kept as produced
//! - `UnitEnergy`: the trapezoid integral over the grid equals 1
//! - `UnitPeak`: the maximum intensity equals 1
//!
//! # Reference Normalization
//!
//! Raw spectrometer readings are conventionally normalized against dark and
//! white reference measurements, `(x - dark) / (white - dark)`, clamped to
//! `[EPSILON, 1]`. `with_reference` implements that convention.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::WavelengthGrid;

/// Lower clamp applied instead of exact zero when normalizing against
/// dark/white references, so later ratios stay well defined.
pub const EPSILON: f64 = 1e-8;

/// Errors raised by spectrum construction and normalization
#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("spectrum length {got} does not match wavelength grid length {expected}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("intensity at index {index} is not finite")]
    NonFinite { index: usize },

    #[error("negative intensity {value} at index {index}")]
    Negative { index: usize, value: f64 },

    #[error("cannot normalize a spectrum with no signal")]
    Degenerate,
}

/// Normalization convention applied to spectra across a dataset instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Keep intensities as produced
    #[default]
    None,
    /// Scale so the trapezoid integral over the grid equals one
    UnitEnergy,
    /// Scale so the maximum intensity equals one
    UnitPeak,
}

/// Intensity values aligned to a `WavelengthGrid`, guaranteed non-negative
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    intensities: Array1<f64>,
}

impl Spectrum {
    /// Create a spectrum from intensity samples, rejecting invalid values.
    ///
    /// # Errors
    ///
    /// Returns `SpectrumError` if any intensity is non-finite or negative.
    pub fn new(intensities: Array1<f64>) -> Result<Self, SpectrumError> {
        for (index, &value) in intensities.iter().enumerate() {
            if !value.is_finite() {
                return Err(SpectrumError::NonFinite { index });
            }
            if value < 0.0 {
                return Err(SpectrumError::Negative { index, value });
            }
        }
        Ok(Self { intensities })
    }

    /// Create a spectrum from samples, clamping negative values to zero.
    ///
    /// Perturbation operators use this after applying a transform: the
    /// physical correction step is to clamp, and only a spectrum that is
    /// degenerate after clamping is rejected (by the caller).
    ///
    /// # Errors
    ///
    /// Returns `SpectrumError::NonFinite` if any intensity is NaN or
    /// infinite; those cannot be repaired by clamping.
    pub fn from_clamped(intensities: Array1<f64>) -> Result<Self, SpectrumError> {
        for (index, &value) in intensities.iter().enumerate() {
            if !value.is_finite() {
                return Err(SpectrumError::NonFinite { index });
            }
        }
        Ok(Self {
            intensities: intensities.mapv(|v| v.max(0.0)),
        })
    }

    /// Number of intensity samples
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// True when the spectrum holds no samples
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    /// Intensity samples
    pub fn intensities(&self) -> &Array1<f64> {
        &self.intensities
    }

    /// Total energy as the trapezoid integral over the grid.
    ///
    /// # Errors
    ///
    /// Returns `SpectrumError::LengthMismatch` when the spectrum was not
    /// sampled on `grid`.
    pub fn energy(&self, grid: &WavelengthGrid) -> Result<f64, SpectrumError> {
        self.check_grid(grid)?;
        Ok(self.intensities.dot(grid.trapezoid_weights()))
    }

    /// Mean intensity over all samples
    pub fn mean_intensity(&self) -> f64 {
        self.intensities.mean().unwrap_or(0.0)
    }

    /// Maximum intensity over all samples
    pub fn peak(&self) -> f64 {
        self.intensities.iter().copied().fold(0.0, f64::max)
    }

    /// Cosine similarity against another spectrum.
    ///
    /// Returns 0.0 when either spectrum carries no signal or the lengths
    /// differ, so degenerate inputs never look like duplicates.
    pub fn cosine_similarity(&self, other: &Spectrum) -> f64 {
        if self.len() != other.len() {
            return 0.0;
        }
        let dot = self.intensities.dot(&other.intensities);
        let norm_a = self.intensities.dot(&self.intensities).sqrt();
        let norm_b = other.intensities.dot(&other.intensities).sqrt();
        if norm_a <= 0.0 || norm_b <= 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Return a copy scaled to the requested normalization convention.
    ///
    /// # Errors
    ///
    /// Returns `SpectrumError::Degenerate` when the convention requires a
    /// positive energy or peak and the spectrum has none.
    pub fn normalized(
        &self,
        convention: Normalization,
        grid: &WavelengthGrid,
    ) -> Result<Spectrum, SpectrumError> {
        match convention {
            Normalization::None => Ok(self.clone()),
            Normalization::UnitEnergy => {
                let energy = self.energy(grid)?;
                if energy <= 0.0 {
                    return Err(SpectrumError::Degenerate);
                }
                Ok(Self {
                    intensities: &self.intensities / energy,
                })
            }
            Normalization::UnitPeak => {
                let peak = self.peak();
                if peak <= 0.0 {
                    return Err(SpectrumError::Degenerate);
                }
                Ok(Self {
                    intensities: &self.intensities / peak,
                })
            }
        }
    }

    /// Normalize against dark and white reference measurements.
    ///
    /// Computes `(x - dark) / (white - dark)` per sample and clamps the
    /// result to `[EPSILON, 1]`, the convention raw spectrometer datasets
    /// use to map readings into relative reflectance units.
    ///
    /// # Errors
    ///
    /// Returns `SpectrumError::LengthMismatch` when the references were not
    /// sampled on the same grid as this spectrum.
    pub fn with_reference(
        &self,
        dark: &Spectrum,
        white: &Spectrum,
    ) -> Result<Spectrum, SpectrumError> {
        if dark.len() != self.len() {
            return Err(SpectrumError::LengthMismatch {
                expected: self.len(),
                got: dark.len(),
            });
        }
        if white.len() != self.len() {
            return Err(SpectrumError::LengthMismatch {
                expected: self.len(),
                got: white.len(),
            });
        }

        let mut out = Array1::zeros(self.len());
        for i in 0..self.len() {
            let denom = white.intensities[i] - dark.intensities[i];
            let value = if denom.abs() <= EPSILON {
                EPSILON
            } else {
                (self.intensities[i] - dark.intensities[i]) / denom
            };
            out[i] = value.clamp(EPSILON, 1.0);
        }
        Ok(Self { intensities: out })
    }

    fn check_grid(&self, grid: &WavelengthGrid) -> Result<(), SpectrumError> {
        if self.len() != grid.len() {
            return Err(SpectrumError::LengthMismatch {
                expected: grid.len(),
                got: self.len(),
            });
        }
        Ok(())
    }
}
