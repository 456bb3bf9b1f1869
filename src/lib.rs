//! Physics-informed training data augmentation for filter-array
//! spectrometers
//!
//! This crate synthesizes paired (spectrum, measurement) training samples
//! for chip-size spectrometers by perturbing a library of reference
//! spectra and projecting every candidate through the device's optical
//! forward model, so that augmented measurements stay consistent with the
//! calibrated filter responses.

pub mod augment;
pub mod config;
pub mod forward;
pub mod grid;
pub mod io;
pub mod noise;
pub mod spectra;
pub mod synth;
pub mod validate;

// Re-exports for easier access
pub use augment::{AugmentationSampler, PerturbationOperator, Provenance};
pub use config::{OperatorWeights, SynthesisConfig};
pub use forward::{FilterResponseMatrix, ForwardModel, Measurement};
pub use grid::WavelengthGrid;
pub use noise::{NoiseModel, NoiseParameters};
pub use spectra::{Normalization, Spectrum, SpectrumLibrary};
pub use synth::{AugmentedSample, PairSynthesizer};
pub use validate::{batch_report, calibration_report, BatchReport, CalibrationReport};
