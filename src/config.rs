//! Configuration surface for augmented dataset generation.
//!
//! All knobs of a synthesis run live in one serde-deserializable struct so
//! a run can be reproduced from its JSON snapshot alone. Configuration is
//! validated once up front; malformed values are fatal before any sample
//! is generated.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::augment::PerturbationOperator;
use crate::noise::NoiseParameters;
use crate::spectra::Normalization;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("operator weight for {operator:?} must be finite and non-negative, got {weight}")]
    InvalidWeight {
        operator: PerturbationOperator,
        weight: f64,
    },

    #[error("at least one operator weight must be positive")]
    NoOperatorEnabled,

    #[error("perturbation strength range ({0}, {1}) is invalid")]
    InvalidStrengthRange(f64, f64),

    #[error("dedup tolerance must lie in (0, 1], got {0}")]
    InvalidDedupTolerance(f64),

    #[error("clean threshold must be finite and non-negative, got {0}")]
    InvalidCleanThreshold(f64),
}

/// Relative draw weights for the perturbation operators.
///
/// Weights need not sum to one; they are normalized at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorWeights {
    pub convex_combination: f64,
    pub product_combination: f64,
    pub peak_perturbation: f64,
    pub baseline_shift: f64,
}

impl Default for OperatorWeights {
    fn default() -> Self {
        Self {
            convex_combination: 0.4,
            product_combination: 0.2,
            peak_perturbation: 0.2,
            baseline_shift: 0.2,
        }
    }
}

impl OperatorWeights {
    /// All operators in a fixed draw order
    pub const OPERATORS: [PerturbationOperator; 4] = [
        PerturbationOperator::ConvexCombination,
        PerturbationOperator::ProductCombination,
        PerturbationOperator::PeakPerturbation,
        PerturbationOperator::BaselineShift,
    ];

    /// Weight configured for one operator
    pub fn weight(&self, operator: PerturbationOperator) -> f64 {
        match operator {
            PerturbationOperator::ConvexCombination => self.convex_combination,
            PerturbationOperator::ProductCombination => self.product_combination,
            PerturbationOperator::PeakPerturbation => self.peak_perturbation,
            PerturbationOperator::BaselineShift => self.baseline_shift,
        }
    }

    /// Sum of all weights
    pub fn total(&self) -> f64 {
        Self::OPERATORS.iter().map(|&op| self.weight(op)).sum()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for &operator in &Self::OPERATORS {
            let weight = self.weight(operator);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight { operator, weight });
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::NoOperatorEnabled);
        }
        Ok(())
    }
}

/// Full configuration of one synthesis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Number of augmented samples to emit
    pub n_samples: usize,
    /// Relative operator draw probabilities
    pub operator_probabilities: OperatorWeights,
    /// Uniform draw range for the perturbation strength parameter
    pub perturbation_strength_range: (f64, f64),
    /// Sensor noise configuration
    pub noise: NoiseParameters,
    /// Maximum allowed cosine similarity between any two emitted spectra
    pub dedup_tolerance: f64,
    /// Base seed; the whole output sequence is a pure function of it
    pub random_seed: u64,
    /// Normalization convention re-applied after every perturbation
    pub normalization: Normalization,
    /// Minimum mean intensity for a candidate to count as non-degenerate
    pub clean_threshold: f64,
    /// Degenerate-candidate retries (with derived seeds) before skipping
    pub max_retries_per_sample: u32,
    /// Emit the reference library itself ahead of synthesized samples
    pub include_references: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            n_samples: 100,
            operator_probabilities: OperatorWeights::default(),
            perturbation_strength_range: (0.05, 0.3),
            noise: NoiseParameters::default(),
            dedup_tolerance: 0.995,
            random_seed: 0,
            normalization: Normalization::None,
            clean_threshold: 0.15,
            max_retries_per_sample: 8,
            include_references: false,
        }
    }
}

impl SynthesisConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges; called once before any sample is generated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.operator_probabilities.validate()?;

        let (min, max) = self.perturbation_strength_range;
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(ConfigError::InvalidStrengthRange(min, max));
        }
        if !self.dedup_tolerance.is_finite()
            || self.dedup_tolerance <= 0.0
            || self.dedup_tolerance > 1.0
        {
            return Err(ConfigError::InvalidDedupTolerance(self.dedup_tolerance));
        }
        if !self.clean_threshold.is_finite() || self.clean_threshold < 0.0 {
            return Err(ConfigError::InvalidCleanThreshold(self.clean_threshold));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        SynthesisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_negative_weight() {
        let config = SynthesisConfig {
            operator_probabilities: OperatorWeights {
                peak_perturbation: -0.1,
                ..OperatorWeights::default()
            },
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_rejects_all_zero_weights() {
        let config = SynthesisConfig {
            operator_probabilities: OperatorWeights {
                convex_combination: 0.0,
                product_combination: 0.0,
                peak_perturbation: 0.0,
                baseline_shift: 0.0,
            },
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoOperatorEnabled)
        ));
    }

    #[test]
    fn test_rejects_bad_strength_range() {
        let config = SynthesisConfig {
            perturbation_strength_range: (0.5, 0.1),
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStrengthRange(_, _))
        ));
    }

    #[test]
    fn test_rejects_bad_dedup_tolerance() {
        let config = SynthesisConfig {
            dedup_tolerance: 1.5,
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDedupTolerance(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = SynthesisConfig {
            n_samples: 7,
            random_seed: 99,
            ..SynthesisConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let parsed: SynthesisConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: SynthesisConfig =
            serde_json::from_str(r#"{"n_samples": 12, "random_seed": 42}"#).unwrap();
        assert_eq!(parsed.n_samples, 12);
        assert_eq!(parsed.random_seed, 42);
        assert_eq!(parsed.dedup_tolerance, SynthesisConfig::default().dedup_tolerance);
    }
}
