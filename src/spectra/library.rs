//! Reference spectrum library.
//!
//! Holds the ground-truth spectra an augmentation run perturbs and mixes.
//! All spectra share one wavelength grid; row lengths are validated at
//! construction and the library is read-only afterwards.

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;

use crate::grid::WavelengthGrid;
use crate::spectra::spectrum::{Spectrum, SpectrumError};

/// Errors raised while assembling a spectrum library
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("spectrum library must contain at least one spectrum")]
    Empty,

    #[error("spectrum {index} has length {got}, expected grid length {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("spectrum {index} is invalid: {source}")]
    Spectrum {
        index: usize,
        source: SpectrumError,
    },
}

/// Reference spectra on a shared wavelength grid
#[derive(Debug, Clone)]
pub struct SpectrumLibrary {
    grid: WavelengthGrid,
    spectra: Vec<Spectrum>,
}

impl SpectrumLibrary {
    /// Build a library, validating every spectrum against the grid.
    pub fn new(grid: WavelengthGrid, spectra: Vec<Spectrum>) -> Result<Self, LibraryError> {
        if spectra.is_empty() {
            return Err(LibraryError::Empty);
        }
        for (index, spectrum) in spectra.iter().enumerate() {
            if spectrum.len() != grid.len() {
                return Err(LibraryError::LengthMismatch {
                    index,
                    expected: grid.len(),
                    got: spectrum.len(),
                });
            }
        }
        Ok(Self { grid, spectra })
    }

    /// Build a library from raw intensity rows.
    pub fn from_rows(grid: WavelengthGrid, rows: Vec<Vec<f64>>) -> Result<Self, LibraryError> {
        let spectra = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                Spectrum::new(row.into())
                    .map_err(|source| LibraryError::Spectrum { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(grid, spectra)
    }

    /// Number of reference spectra
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// A validated library is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Wavelength grid shared by all spectra
    pub fn grid(&self) -> &WavelengthGrid {
        &self.grid
    }

    /// Reference spectrum at `index`
    pub fn get(&self, index: usize) -> Option<&Spectrum> {
        self.spectra.get(index)
    }

    /// All reference spectra
    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    /// Draw one reference spectrum with the supplied generator
    pub fn choose(&self, rng: &mut StdRng) -> (usize, &Spectrum) {
        let index = rng.gen_range(0..self.spectra.len());
        (index, &self.spectra[index])
    }

    /// Draw two distinct reference spectra, falling back to a repeated
    /// index when the library holds a single entry.
    pub fn choose_pair(&self, rng: &mut StdRng) -> ((usize, &Spectrum), (usize, &Spectrum)) {
        let first = rng.gen_range(0..self.spectra.len());
        let second = if self.spectra.len() == 1 {
            first
        } else {
            // Re-draw until distinct; the library is small so this terminates fast
            loop {
                let candidate = rng.gen_range(0..self.spectra.len());
                if candidate != first {
                    break candidate;
                }
            }
        };
        (
            (first, &self.spectra[first]),
            (second, &self.spectra[second]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn grid() -> WavelengthGrid {
        WavelengthGrid::from_range(450.0, 690.0, 5).unwrap()
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            SpectrumLibrary::new(grid(), vec![]),
            Err(LibraryError::Empty)
        ));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let rows = vec![vec![1.0; 5], vec![1.0; 4]];
        let result = SpectrumLibrary::from_rows(grid(), rows);
        assert!(matches!(
            result,
            Err(LibraryError::LengthMismatch {
                index: 1,
                expected: 5,
                got: 4
            })
        ));
    }

    #[test]
    fn test_rejects_negative_row() {
        let rows = vec![vec![1.0, 1.0, -1.0, 1.0, 1.0]];
        let result = SpectrumLibrary::from_rows(grid(), rows);
        assert!(matches!(result, Err(LibraryError::Spectrum { index: 0, .. })));
    }

    #[test]
    fn test_choose_pair_distinct() {
        let rows = vec![vec![1.0; 5], vec![2.0; 5], vec![3.0; 5]];
        let library = SpectrumLibrary::from_rows(grid(), rows).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let ((a, _), (b, _)) = library.choose_pair(&mut rng);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_choose_pair_single_entry() {
        let library = SpectrumLibrary::from_rows(grid(), vec![vec![1.0; 5]]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let ((a, _), (b, _)) = library.choose_pair(&mut rng);
        assert_eq!(a, b);
    }
}
