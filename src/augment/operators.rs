//! Physically constrained perturbation operators.
//!
//! Naive signal-space noise on measurements breaks the optics-measurement
//! consistency relation; the operators here instead perturb in *spectrum*
//! space, so re-projection through the forward model always yields a pair
//! that satisfies the device physics. Each operator documents the
//! constraint that keeps its output plausible:
//!
//! - **Convex combination** mixes 2-3 references with non-negative weights
//!   summing to one; non-negativity is preserved by construction.
//! - **Product combination** multiplies two (possibly identical)
//!   normalized references element-wise, the classic augmentation for
//!   transmission spectra where stacked media multiply.
//! - **Peak perturbation** applies a smooth Gaussian-window amplitude bump
//!   around a detected peak, bounded in window width and in ±strength
//!   amplitude, then re-clamps at zero.
//! - **Baseline shift** adds a smooth cubic-spline continuum bounded by
//!   strength × mean intensity, then re-clamps at zero.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::augment::spline::CubicSpline;
use crate::grid::WavelengthGrid;
use crate::spectra::{Spectrum, SpectrumError, SpectrumLibrary, EPSILON};

use super::Provenance;

/// The perturbation operators the sampler can draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationOperator {
    ConvexCombination,
    ProductCombination,
    PeakPerturbation,
    BaselineShift,
}

impl PerturbationOperator {
    /// Stable name used in provenance tags and reports
    pub fn name(&self) -> &'static str {
        match self {
            PerturbationOperator::ConvexCombination => "convex_combination",
            PerturbationOperator::ProductCombination => "product_combination",
            PerturbationOperator::PeakPerturbation => "peak_perturbation",
            PerturbationOperator::BaselineShift => "baseline_shift",
        }
    }

    /// Apply this operator to the library with the supplied generator.
    pub(super) fn apply(
        &self,
        library: &SpectrumLibrary,
        strength: f64,
        rng: &mut StdRng,
    ) -> Result<(Spectrum, Provenance), SpectrumError> {
        match self {
            PerturbationOperator::ConvexCombination => convex_combination(library, strength, rng),
            PerturbationOperator::ProductCombination => product_combination(library, rng),
            PerturbationOperator::PeakPerturbation => peak_perturbation(library, strength, rng),
            PerturbationOperator::BaselineShift => baseline_shift(library, strength, rng),
        }
    }
}

/// Mix 2-3 reference spectra with non-negative weights summing to one.
///
/// Convexity is the plausibility constraint: the mix can never leave the
/// non-negative cone spanned by the references, so no clamping is needed.
/// Strength skews the mix away from the even blend toward one component.
fn convex_combination(
    library: &SpectrumLibrary,
    strength: f64,
    rng: &mut StdRng,
) -> Result<(Spectrum, Provenance), SpectrumError> {
    let k = if library.len() >= 3 && rng.gen_bool(0.3) {
        3
    } else {
        2.min(library.len())
    };

    let mut sources = Vec::with_capacity(k);
    while sources.len() < k {
        let index = rng.gen_range(0..library.len());
        if !sources.contains(&index) {
            sources.push(index);
        }
    }

    // Exponentiating uniform draws skews weights toward one component as
    // strength grows; weights stay positive and are normalized to sum to 1
    let exponent = 1.0 + 4.0 * strength;
    let mut weights: Vec<f64> = (0..k)
        .map(|_| rng.gen::<f64>().max(EPSILON).powf(exponent))
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }

    let n = library.grid().len();
    let mut mixed = Array1::zeros(n);
    for (&index, &weight) in sources.iter().zip(&weights) {
        let spectrum = library.get(index).expect("index drawn from library range");
        mixed = mixed + spectrum.intensities() * weight;
    }

    let provenance = Provenance::Synthesized {
        operator: PerturbationOperator::ConvexCombination,
        sources,
    };
    Ok((Spectrum::new(mixed)?, provenance))
}

/// Element-wise product of two (possibly identical) reference spectra.
///
/// For normalized transmission spectra this models light passing through
/// both media in sequence; the product of non-negative vectors is
/// non-negative by construction.
fn product_combination(
    library: &SpectrumLibrary,
    rng: &mut StdRng,
) -> Result<(Spectrum, Provenance), SpectrumError> {
    // Squaring a spectrum (pairing it with itself) is a valid draw,
    // matching the pairing scheme used when mixing measured samples
    let first = rng.gen_range(0..library.len());
    let second = rng.gen_range(0..library.len());

    let a = library.get(first).expect("index drawn from library range");
    let b = library.get(second).expect("index drawn from library range");
    let product = a.intensities() * b.intensities();

    let provenance = Provenance::Synthesized {
        operator: PerturbationOperator::ProductCombination,
        sources: vec![first, second],
    };
    Ok((Spectrum::new(product)?, provenance))
}

/// Smooth amplitude bump around a detected spectral peak.
///
/// The bump is multiplicative, `1 + a·exp(-((λ-c)/w)²/2)`, with amplitude
/// `a` bounded in ±strength and window width `w` bounded to a fraction of
/// the grid span; the center jitters within one window width of the peak.
/// The result is re-clamped at zero.
fn peak_perturbation(
    library: &SpectrumLibrary,
    strength: f64,
    rng: &mut StdRng,
) -> Result<(Spectrum, Provenance), SpectrumError> {
    let (source, base) = library.choose(rng);
    let grid = library.grid();
    let (lo, hi) = grid.span();
    let span = hi - lo;

    let peaks = local_maxima(base.intensities());
    let peak_index = peaks[rng.gen_range(0..peaks.len())];
    let peak_nm = grid.at(peak_index);

    // Bounded window: never narrower than two grid steps, never wider
    // than an eighth of the span
    let min_width = 2.0 * span / grid.len() as f64;
    let max_width = span / 8.0;
    let width = rng.gen_range(min_width..=max_width.max(min_width + EPSILON));
    let center = peak_nm + rng.gen_range(-width..=width);
    let amplitude = rng.gen_range(-strength..=strength);

    let perturbed = Array1::from_iter(
        base.intensities()
            .iter()
            .zip(grid.wavelengths().iter())
            .map(|(&value, &nm)| {
                let z = (nm - center) / width;
                value * (1.0 + amplitude * (-0.5 * z * z).exp())
            }),
    );

    let provenance = Provenance::Synthesized {
        operator: PerturbationOperator::PeakPerturbation,
        sources: vec![source],
    };
    Ok((Spectrum::from_clamped(perturbed)?, provenance))
}

/// Additive smooth continuum drawn as a natural cubic spline.
///
/// Knot values are bounded by strength × mean intensity, keeping the
/// low-frequency drift small relative to the signal; the shifted spectrum
/// is re-clamped at zero.
fn baseline_shift(
    library: &SpectrumLibrary,
    strength: f64,
    rng: &mut StdRng,
) -> Result<(Spectrum, Provenance), SpectrumError> {
    let (source, base) = library.choose(rng);
    let grid = library.grid();
    let (lo, hi) = grid.span();

    let bound = strength * base.mean_intensity();
    let knot_count = 5;
    let knot_x: Vec<f64> = (0..knot_count)
        .map(|i| lo + (hi - lo) * i as f64 / (knot_count - 1) as f64)
        .collect();
    let knot_y: Vec<f64> = (0..knot_count)
        .map(|_| rng.gen_range(-bound..=bound))
        .collect();
    let continuum = CubicSpline::new(knot_x, knot_y);

    let shifted = Array1::from_iter(
        base.intensities()
            .iter()
            .zip(grid.wavelengths().iter())
            .map(|(&value, &nm)| value + continuum.evaluate(nm)),
    );

    let provenance = Provenance::Synthesized {
        operator: PerturbationOperator::BaselineShift,
        sources: vec![source],
    };
    Ok((Spectrum::from_clamped(shifted)?, provenance))
}

/// Indices of strict local maxima, falling back to the global maximum when
/// the spectrum is monotonic or flat.
fn local_maxima(intensities: &Array1<f64>) -> Vec<usize> {
    let n = intensities.len();
    let mut peaks: Vec<usize> = (1..n.saturating_sub(1))
        .filter(|&i| {
            intensities[i] > intensities[i - 1] && intensities[i] >= intensities[i + 1]
        })
        .collect();

    if peaks.is_empty() {
        let argmax = intensities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        peaks.push(argmax);
    }
    peaks
}
