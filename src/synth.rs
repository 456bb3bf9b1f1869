//! Training-pair synthesis.
//!
//! `PairSynthesizer` drives the full augmentation chain per sample:
//! AugmentationSampler → ForwardModel → NoiseModel, packaging the result as
//! an `AugmentedSample` with a provenance tag.
//!
//! # Determinism
//!
//! The unit of reproducibility is the *attempt*: attempt `i` derives its
//! generator seed from the base seed by `wrapping_add(i)`, so every
//! candidate is a pure function of (config, inputs, attempt index). The
//! output sequence walks attempts in order and accepts candidates that pass
//! the plausibility and de-duplication gates, which makes the sequence
//! lazy, finite and restartable: re-running with the same seed reproduces
//! it element-for-element, and the parallel batch path computes attempts
//! concurrently but accepts them in attempt order, yielding the identical
//! sequence regardless of thread scheduling.
//!
//! # Error isolation
//!
//! A degenerate candidate retries with derived sub-seeds up to the
//! configured bound, then is skipped with a warning; it never aborts the
//! batch. Dimension and configuration errors are fatal and surface
//! immediately.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::augment::{AugmentError, AugmentationSampler, Provenance};
use crate::config::{ConfigError, SynthesisConfig};
use crate::forward::{ForwardModel, ForwardModelError, Measurement};
use crate::noise::{NoiseError, NoiseModel};
use crate::spectra::{Spectrum, SpectrumLibrary};

/// Attempts granted per requested sample before synthesis gives up
const ATTEMPTS_PER_SAMPLE: u64 = 256;

/// Minimum overall attempt budget for small batches
const MIN_ATTEMPT_BUDGET: u64 = 1024;

/// Attempts computed per parallel block in the batch path
const PARALLEL_BLOCK: u64 = 256;

/// Errors raised while synthesizing training pairs
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("spectrum library and forward model use different wavelength grids")]
    GridMismatch,

    #[error(
        "attempt budget exhausted after {attempts} attempts \
         ({accepted}/{requested} samples accepted); loosen dedup_tolerance \
         or clean_threshold"
    )]
    AttemptBudgetExhausted {
        attempts: u64,
        accepted: usize,
        requested: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Noise(#[from] NoiseError),

    #[error(transparent)]
    Forward(#[from] ForwardModelError),

    #[error(transparent)]
    Augment(#[from] AugmentError),
}

/// A synthesized training pair: spectrum, measurement and provenance
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSample {
    pub spectrum: Spectrum,
    pub measurement: Measurement,
    pub provenance: Provenance,
}

/// Orchestrates sampler, forward model and noise model into sample pairs
pub struct PairSynthesizer<'a> {
    sampler: AugmentationSampler<'a>,
    forward: &'a ForwardModel,
    noise: NoiseModel,
    config: &'a SynthesisConfig,
}

impl<'a> PairSynthesizer<'a> {
    /// Bind the pipeline to its read-only calibration state.
    ///
    /// Validates the configuration, checks that library and forward model
    /// share one wavelength grid, and resolves the noise parameters against
    /// the sensor's channel count. All of these are fatal before any
    /// sample is generated.
    pub fn new(
        library: &'a SpectrumLibrary,
        forward: &'a ForwardModel,
        config: &'a SynthesisConfig,
    ) -> Result<Self, SynthesisError> {
        config.validate()?;
        if library.grid() != forward.grid() {
            return Err(SynthesisError::GridMismatch);
        }
        let noise = NoiseModel::new(&config.noise, forward.channels())?;
        Ok(Self {
            sampler: AugmentationSampler::new(library, config),
            forward,
            noise,
            config,
        })
    }

    /// Lazily synthesize `n_samples` training pairs.
    ///
    /// The returned stream is finite and restartable: building it again
    /// from the same synthesizer yields the identical sequence.
    pub fn synthesize(&self, n_samples: usize) -> SampleStream<'_> {
        let refs_to_emit = if self.config.include_references {
            n_samples.min(self.sampler.library().len())
        } else {
            0
        };
        SampleStream {
            synthesizer: self,
            accepted: Vec::with_capacity(n_samples),
            next_reference: 0,
            refs_to_emit,
            attempt: 0,
            attempt_budget: attempt_budget(n_samples),
            emitted: 0,
            target: n_samples,
            failed: false,
        }
    }

    /// Synthesize `n_samples` pairs using parallel workers.
    ///
    /// Candidate attempts are computed concurrently in fixed blocks (each
    /// attempt is independent given its derived seed) and accepted
    /// sequentially in attempt order, so the result equals the sequential
    /// stream element-for-element.
    pub fn synthesize_batch(
        &self,
        n_samples: usize,
    ) -> Result<Vec<AugmentedSample>, SynthesisError> {
        let mut samples = Vec::with_capacity(n_samples);
        let mut accepted_spectra: Vec<Spectrum> = Vec::with_capacity(n_samples);
        let mut attempt: u64 = 0;
        let budget = attempt_budget(n_samples);

        // Reference pass-throughs are cheap; emit them sequentially
        let refs_to_emit = if self.config.include_references {
            n_samples.min(self.sampler.library().len())
        } else {
            0
        };
        for index in 0..refs_to_emit {
            let reference = self.reference_candidate(index, attempt)?;
            attempt += 1;
            if let Some(candidate) = reference {
                if !is_duplicate(&accepted_spectra, &candidate.spectrum, self.config) {
                    accepted_spectra.push(candidate.spectrum.clone());
                    samples.push(candidate);
                }
            }
        }

        while samples.len() < n_samples {
            if attempt >= budget {
                return Err(SynthesisError::AttemptBudgetExhausted {
                    attempts: attempt,
                    accepted: samples.len(),
                    requested: n_samples,
                });
            }
            let block_end = (attempt + PARALLEL_BLOCK).min(budget);
            let block: Vec<Result<Option<AugmentedSample>, SynthesisError>> = (attempt..block_end)
                .into_par_iter()
                .map(|a| self.candidate(a))
                .collect();
            attempt = block_end;

            for result in block {
                let Some(candidate) = result? else { continue };
                if is_duplicate(&accepted_spectra, &candidate.spectrum, self.config) {
                    continue;
                }
                accepted_spectra.push(candidate.spectrum.clone());
                samples.push(candidate);
                if samples.len() == n_samples {
                    break;
                }
            }
        }
        Ok(samples)
    }

    /// Compute the candidate for one attempt index.
    ///
    /// Pure in the attempt index: sampling, projection and noise all draw
    /// from a generator seeded by (base seed, attempt, retry). Returns
    /// `Ok(None)` when every retry produced a degenerate spectrum.
    fn candidate(&self, attempt: u64) -> Result<Option<AugmentedSample>, SynthesisError> {
        for retry in 0..=self.config.max_retries_per_sample {
            let seed = derive_seed(self.config.random_seed, attempt, retry);
            let mut rng = StdRng::seed_from_u64(seed);
            match self.sampler.sample(&mut rng) {
                Ok((spectrum, provenance)) => {
                    let noiseless = self.forward.project(&spectrum)?;
                    let measurement = self.noise.apply(&noiseless, &mut rng)?;
                    return Ok(Some(AugmentedSample {
                        spectrum,
                        measurement,
                        provenance,
                    }));
                }
                Err(AugmentError::DegenerateSpectrum { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        log::warn!(
            "attempt {attempt}: degenerate spectrum after {} retries, skipping",
            self.config.max_retries_per_sample
        );
        Ok(None)
    }

    /// Build the pass-through pair for one library reference.
    fn reference_candidate(
        &self,
        index: usize,
        attempt: u64,
    ) -> Result<Option<AugmentedSample>, SynthesisError> {
        let library = self.sampler.library();
        let reference = library
            .get(index)
            .expect("reference index bounded by library length");

        let Ok(spectrum) = reference.normalized(self.config.normalization, library.grid()) else {
            log::warn!("reference {index} has no signal, skipping pass-through");
            return Ok(None);
        };

        let seed = derive_seed(self.config.random_seed, attempt, 0);
        let mut rng = StdRng::seed_from_u64(seed);
        let noiseless = self.forward.project(&spectrum)?;
        let measurement = self.noise.apply(&noiseless, &mut rng)?;
        Ok(Some(AugmentedSample {
            spectrum,
            measurement,
            provenance: Provenance::Reference { index },
        }))
    }
}

/// Lazy, finite, restartable sequence of augmented samples.
///
/// Iterator state is fully determined by the synthesizer's (seed, config,
/// inputs); no shared cursor is involved.
pub struct SampleStream<'a> {
    synthesizer: &'a PairSynthesizer<'a>,
    accepted: Vec<Spectrum>,
    next_reference: usize,
    refs_to_emit: usize,
    attempt: u64,
    attempt_budget: u64,
    emitted: usize,
    target: usize,
    failed: bool,
}

impl Iterator for SampleStream<'_> {
    type Item = Result<AugmentedSample, SynthesisError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.emitted == self.target {
            return None;
        }

        while self.next_reference < self.refs_to_emit {
            let index = self.next_reference;
            self.next_reference += 1;
            let attempt = self.attempt;
            self.attempt += 1;
            match self.synthesizer.reference_candidate(index, attempt) {
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                Ok(None) => continue,
                Ok(Some(candidate)) => {
                    if is_duplicate(&self.accepted, &candidate.spectrum, self.synthesizer.config) {
                        continue;
                    }
                    self.accepted.push(candidate.spectrum.clone());
                    self.emitted += 1;
                    return Some(Ok(candidate));
                }
            }
        }

        loop {
            if self.attempt >= self.attempt_budget {
                self.failed = true;
                return Some(Err(SynthesisError::AttemptBudgetExhausted {
                    attempts: self.attempt,
                    accepted: self.emitted,
                    requested: self.target,
                }));
            }
            let attempt = self.attempt;
            self.attempt += 1;
            match self.synthesizer.candidate(attempt) {
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                Ok(None) => continue,
                Ok(Some(candidate)) => {
                    if is_duplicate(&self.accepted, &candidate.spectrum, self.synthesizer.config) {
                        continue;
                    }
                    self.accepted.push(candidate.spectrum.clone());
                    self.emitted += 1;
                    return Some(Ok(candidate));
                }
            }
        }
    }
}

fn attempt_budget(n_samples: usize) -> u64 {
    (n_samples as u64)
        .saturating_mul(ATTEMPTS_PER_SAMPLE)
        .max(MIN_ATTEMPT_BUDGET)
}

fn derive_seed(base: u64, attempt: u64, retry: u32) -> u64 {
    // Retries stride by a large odd constant so they never collide with
    // neighboring attempt seeds
    base.wrapping_add(attempt)
        .wrapping_add((retry as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn is_duplicate(accepted: &[Spectrum], candidate: &Spectrum, config: &SynthesisConfig) -> bool {
    accepted
        .iter()
        .any(|existing| existing.cosine_similarity(candidate) > config.dedup_tolerance)
}
