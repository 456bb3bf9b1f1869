//! Candidate spectrum generation.
//!
//! The sampler draws a perturbation operator according to the configured
//! probabilities, applies it to the reference library, and enforces the
//! plausibility gates: clamp-to-zero correction happens inside the
//! operators, and a candidate that is still degenerate afterwards (all
//! zeros, or mean intensity under the clean threshold) is rejected with
//! `AugmentError::DegenerateSpectrum` for the caller to retry.

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;

use crate::config::SynthesisConfig;
use crate::spectra::{Spectrum, SpectrumError, SpectrumLibrary};

use super::{PerturbationOperator, Provenance};

/// Errors raised during candidate generation
#[derive(Debug, Error)]
pub enum AugmentError {
    /// The perturbed spectrum carries too little signal after clamping.
    /// Recovered locally by resampling with a derived seed.
    #[error(
        "perturbation produced a degenerate spectrum (mean intensity {mean:.3e} \
         below threshold {threshold:.3e})"
    )]
    DegenerateSpectrum { mean: f64, threshold: f64 },

    #[error("invalid perturbation result: {0}")]
    InvalidPerturbation(#[from] SpectrumError),
}

/// Draws perturbation operators and produces candidate spectra
#[derive(Debug, Clone)]
pub struct AugmentationSampler<'a> {
    library: &'a SpectrumLibrary,
    config: &'a SynthesisConfig,
}

impl<'a> AugmentationSampler<'a> {
    /// Bind a sampler to a reference library and validated configuration.
    pub fn new(library: &'a SpectrumLibrary, config: &'a SynthesisConfig) -> Self {
        Self { library, config }
    }

    /// The library this sampler draws from
    pub fn library(&self) -> &SpectrumLibrary {
        self.library
    }

    /// Generate one candidate spectrum with the supplied generator.
    ///
    /// Draws operator and strength, applies the transform, checks the
    /// degeneracy gate and re-applies the dataset normalization convention.
    pub fn sample(&self, rng: &mut StdRng) -> Result<(Spectrum, Provenance), AugmentError> {
        let operator = self.draw_operator(rng);
        let (min_strength, max_strength) = self.config.perturbation_strength_range;
        let strength = if max_strength > min_strength {
            rng.gen_range(min_strength..=max_strength)
        } else {
            min_strength
        };

        let (candidate, provenance) = operator.apply(self.library, strength, rng)?;

        let mean = candidate.mean_intensity();
        if mean <= 0.0 || mean < self.config.clean_threshold {
            return Err(AugmentError::DegenerateSpectrum {
                mean,
                threshold: self.config.clean_threshold,
            });
        }

        let normalized = candidate
            .normalized(self.config.normalization, self.library.grid())
            .map_err(|_| AugmentError::DegenerateSpectrum {
                mean,
                threshold: self.config.clean_threshold,
            })?;

        Ok((normalized, provenance))
    }

    fn draw_operator(&self, rng: &mut StdRng) -> PerturbationOperator {
        let weights = &self.config.operator_probabilities;
        // Config validation guarantees a positive total
        let mut remaining = rng.gen::<f64>() * weights.total();
        for &operator in crate::config::OperatorWeights::OPERATORS.iter() {
            remaining -= weights.weight(operator);
            if remaining < 0.0 {
                return operator;
            }
        }
        // Floating-point slack on the last cumulative step
        *crate::config::OperatorWeights::OPERATORS
            .last()
            .expect("operator list is non-empty")
    }
}
