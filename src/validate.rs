//! Forward-model fidelity checks and augmentation quality gates.
//!
//! Everything here is diagnostic: a tolerance breach or a failed quality
//! gate is reported to the caller as a flag, never raised as an error that
//! would halt the producing pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::forward::{ForwardModel, ForwardModelError, Measurement};
use crate::grid::WavelengthGrid;
use crate::spectra::{Spectrum, EPSILON};
use crate::synth::AugmentedSample;

/// Forward-model error against held-out calibration pairs.
///
/// `within_tolerance` is the quality flag callers gate on; exceeding the
/// tolerance is advisory, not fatal.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    /// Pairs evaluated
    pub n_pairs: usize,
    /// Mean absolute error per channel, averaged over pairs
    pub per_channel_mae: Vec<f64>,
    /// Mean relative error over all channels and pairs
    pub mean_relative_error: f64,
    /// The tolerance the report was evaluated against
    pub tolerance: f64,
    /// True when mean relative error stays within tolerance
    pub within_tolerance: bool,
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Calibration check over {} pairs", self.n_pairs)?;
        for (channel, mae) in self.per_channel_mae.iter().enumerate() {
            writeln!(f, "  channel {channel}: MAE {mae:.6}")?;
        }
        writeln!(
            f,
            "  mean relative error: {:.4}% (tolerance {:.4}%)",
            self.mean_relative_error * 100.0,
            self.tolerance * 100.0
        )?;
        write!(
            f,
            "  status: {}",
            if self.within_tolerance {
                "within tolerance"
            } else {
                "TOLERANCE EXCEEDED"
            }
        )
    }
}

/// Compare forward-model projections against real measured readings.
///
/// # Errors
///
/// Returns `ForwardModelError` only for dimension mismatches in the input
/// pairs; tolerance breaches are reported through the returned flags.
pub fn calibration_report(
    model: &ForwardModel,
    pairs: &[(Spectrum, Measurement)],
    tolerance: f64,
) -> Result<CalibrationReport, ForwardModelError> {
    let channels = model.channels();
    let mut per_channel_abs = vec![0.0; channels];
    let mut relative_sum = 0.0;
    let mut relative_count = 0usize;

    for (spectrum, measured) in pairs {
        if measured.len() != channels {
            return Err(ForwardModelError::ChannelMismatch {
                expected: channels,
                got: measured.len(),
            });
        }
        let projected = model.project(spectrum)?;
        for c in 0..channels {
            let predicted = projected.readings()[c];
            let real = measured.readings()[c];
            let abs_error = (predicted - real).abs();
            per_channel_abs[c] += abs_error;
            relative_sum += abs_error / real.abs().max(EPSILON);
            relative_count += 1;
        }
    }

    let n_pairs = pairs.len();
    let per_channel_mae = per_channel_abs
        .into_iter()
        .map(|total| if n_pairs > 0 { total / n_pairs as f64 } else { 0.0 })
        .collect();
    let mean_relative_error = if relative_count > 0 {
        relative_sum / relative_count as f64
    } else {
        0.0
    };

    Ok(CalibrationReport {
        n_pairs,
        per_channel_mae,
        mean_relative_error,
        tolerance,
        within_tolerance: mean_relative_error <= tolerance,
    })
}

/// Summary statistics over a batch of augmented samples.
///
/// Used as a data-quality gate before a batch is accepted into the
/// augmented dataset.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Samples inspected
    pub n_samples: usize,
    /// Minimum spectrum energy in the batch
    pub energy_min: f64,
    /// Mean spectrum energy in the batch
    pub energy_mean: f64,
    /// Maximum spectrum energy in the batch
    pub energy_max: f64,
    /// Count of negative spectrum entries (must be zero)
    pub negative_entries: usize,
    /// Pairs whose cosine similarity exceeds the dedup tolerance
    pub duplicate_pairs: usize,
    /// Duplicate pairs as a fraction of all pairs
    pub duplicate_rate: f64,
    /// Samples per provenance label
    pub operator_counts: BTreeMap<String, usize>,
}

impl BatchReport {
    /// True when the batch satisfies the non-negativity and de-duplication
    /// invariants.
    pub fn passes(&self) -> bool {
        self.negative_entries == 0 && self.duplicate_pairs == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch report over {} samples", self.n_samples)?;
        writeln!(
            f,
            "  energy: min {:.6}, mean {:.6}, max {:.6}",
            self.energy_min, self.energy_mean, self.energy_max
        )?;
        writeln!(f, "  negative entries: {}", self.negative_entries)?;
        writeln!(
            f,
            "  duplicate pairs: {} (rate {:.4})",
            self.duplicate_pairs, self.duplicate_rate
        )?;
        for (label, count) in &self.operator_counts {
            writeln!(f, "  {label}: {count}")?;
        }
        write!(
            f,
            "  status: {}",
            if self.passes() { "pass" } else { "FAIL" }
        )
    }
}

/// Compute quality statistics over a batch of augmented samples.
pub fn batch_report(
    samples: &[AugmentedSample],
    grid: &WavelengthGrid,
    dedup_tolerance: f64,
) -> BatchReport {
    let mut energy_min = f64::INFINITY;
    let mut energy_max = f64::NEG_INFINITY;
    let mut energy_sum = 0.0;
    let mut negative_entries = 0usize;
    let mut operator_counts: BTreeMap<String, usize> = BTreeMap::new();

    for sample in samples {
        let energy = sample.spectrum.energy(grid).unwrap_or(f64::NAN);
        energy_min = energy_min.min(energy);
        energy_max = energy_max.max(energy);
        energy_sum += energy;
        negative_entries += sample
            .spectrum
            .intensities()
            .iter()
            .filter(|&&v| v < 0.0)
            .count();
        *operator_counts
            .entry(sample.provenance.label().to_string())
            .or_insert(0) += 1;
    }

    let mut duplicate_pairs = 0usize;
    for i in 0..samples.len() {
        for j in i + 1..samples.len() {
            if samples[i]
                .spectrum
                .cosine_similarity(&samples[j].spectrum)
                > dedup_tolerance
            {
                duplicate_pairs += 1;
            }
        }
    }
    let total_pairs = samples.len() * samples.len().saturating_sub(1) / 2;

    BatchReport {
        n_samples: samples.len(),
        energy_min: if samples.is_empty() { 0.0 } else { energy_min },
        energy_mean: if samples.is_empty() {
            0.0
        } else {
            energy_sum / samples.len() as f64
        },
        energy_max: if samples.is_empty() { 0.0 } else { energy_max },
        negative_entries,
        duplicate_pairs,
        duplicate_rate: if total_pairs > 0 {
            duplicate_pairs as f64 / total_pairs as f64
        } else {
            0.0
        },
        operator_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::{PerturbationOperator, Provenance};
    use crate::forward::FilterResponseMatrix;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn model() -> ForwardModel {
        let grid = WavelengthGrid::from_range(400.0, 700.0, 4).unwrap();
        let responses =
            FilterResponseMatrix::from_rows(vec![vec![1.0, 0.5, 0.0, 0.0], vec![0.0, 0.0, 0.5, 1.0]], &grid)
                .unwrap();
        ForwardModel::new(grid, responses).unwrap()
    }

    #[test]
    fn test_calibration_exact_pairs_pass() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 0.4, 0.7, 0.2]).unwrap();
        let measured = model.project(&spectrum).unwrap();

        let report =
            calibration_report(&model, &[(spectrum, measured)], 0.05).unwrap();
        assert!(report.within_tolerance);
        assert_relative_eq!(report.mean_relative_error, 0.0, epsilon = 1e-12);
        assert_eq!(report.per_channel_mae.len(), 2);
    }

    #[test]
    fn test_calibration_tolerance_exceeded_is_reported_not_fatal() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 0.4, 0.7, 0.2]).unwrap();
        let real = model.project(&spectrum).unwrap();
        // A 20% miscalibrated reading
        let skewed = Measurement::new(real.readings() * 1.2);

        let report = calibration_report(&model, &[(spectrum, skewed)], 0.05).unwrap();
        assert!(!report.within_tolerance);
        assert!(report.mean_relative_error > 0.05);
    }

    #[test]
    fn test_calibration_dimension_mismatch_is_fatal() {
        let model = model();
        let spectrum = Spectrum::new(array![1.0, 0.4, 0.7, 0.2]).unwrap();
        let wrong = Measurement::new(array![1.0, 2.0, 3.0]);
        assert!(matches!(
            calibration_report(&model, &[(spectrum, wrong)], 0.05),
            Err(ForwardModelError::ChannelMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_report() {
        let model = model();
        let grid = model.grid().clone();
        let s1 = Spectrum::new(array![1.0, 0.4, 0.7, 0.2]).unwrap();
        let s2 = Spectrum::new(array![0.1, 0.9, 0.3, 0.8]).unwrap();
        let samples = vec![
            AugmentedSample {
                measurement: model.project(&s1).unwrap(),
                spectrum: s1.clone(),
                provenance: Provenance::Reference { index: 0 },
            },
            AugmentedSample {
                measurement: model.project(&s2).unwrap(),
                spectrum: s2,
                provenance: Provenance::Synthesized {
                    operator: PerturbationOperator::ConvexCombination,
                    sources: vec![0, 1],
                },
            },
            // Exact duplicate of the first sample
            AugmentedSample {
                measurement: model.project(&s1).unwrap(),
                spectrum: s1,
                provenance: Provenance::Synthesized {
                    operator: PerturbationOperator::ProductCombination,
                    sources: vec![0, 0],
                },
            },
        ];

        let report = batch_report(&samples, &grid, 0.995);
        assert_eq!(report.n_samples, 3);
        assert_eq!(report.negative_entries, 0);
        assert_eq!(report.duplicate_pairs, 1);
        assert_relative_eq!(report.duplicate_rate, 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(report.operator_counts["reference"], 1);
        assert_eq!(report.operator_counts["convex_combination"], 1);
        assert!(!report.passes());
    }

    #[test]
    fn test_empty_batch_report() {
        let grid = WavelengthGrid::from_range(400.0, 700.0, 4).unwrap();
        let report = batch_report(&[], &grid, 0.995);
        assert_eq!(report.n_samples, 0);
        assert_eq!(report.duplicate_rate, 0.0);
        assert!(report.passes());
    }
}
