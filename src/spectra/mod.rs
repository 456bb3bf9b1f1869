//! Spectra and the reference spectrum library

pub mod library;
pub mod spectrum;

pub use library::{LibraryError, SpectrumLibrary};
pub use spectrum::{Normalization, Spectrum, SpectrumError, EPSILON};
