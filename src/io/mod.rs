//! Calibration, library and dataset artifacts.
//!
//! Inputs are CSV matrices: calibration files carry the wavelength grid
//! plus one column per sensor channel, library files carry one column per
//! reference spectrum. Malformed or dimension-inconsistent input fails
//! fast with `ConfigurationError` before any generation starts.
//!
//! The output artifact is a directory holding the synthesized spectra and
//! measurements as CSV matrices plus a JSON sidecar with the seed,
//! per-sample provenance and a config snapshot, so a dataset can be
//! reproduced from its own metadata.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

use crate::config::SynthesisConfig;
use crate::forward::{FilterResponseMatrix, Measurement, ResponseError};
use crate::grid::{GridError, WavelengthGrid};
use crate::spectra::{LibraryError, SpectrumLibrary};
use crate::synth::AugmentedSample;

/// Wavelengths in input files must match the calibration grid this closely (nm)
const GRID_MATCH_TOLERANCE_NM: f64 = 1e-6;

/// Errors raised while reading or writing artifacts
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: csv::Error },

    #[error("{}: record {record} has {got} fields, expected {expected}", path.display())]
    RaggedRecord {
        path: PathBuf,
        record: usize,
        expected: usize,
        got: usize,
    },

    #[error("{}: record {record}, field {field}: invalid number {value:?}", path.display())]
    InvalidNumber {
        path: PathBuf,
        record: usize,
        field: usize,
        value: String,
    },

    #[error("{}: needs a wavelength column plus at least one data column", path.display())]
    MissingColumns { path: PathBuf },

    #[error("{}: contains no data records", path.display())]
    EmptyFile { path: PathBuf },

    #[error("{}: wavelength at record {record} does not match the calibration grid", path.display())]
    GridMismatch { path: PathBuf, record: usize },

    #[error("invalid wavelength grid in {}: {source}", path.display())]
    Grid { path: PathBuf, source: GridError },

    #[error("invalid filter response in {}: {source}", path.display())]
    Response {
        path: PathBuf,
        source: ResponseError,
    },

    #[error("invalid spectrum library in {}: {source}", path.display())]
    Library {
        path: PathBuf,
        source: LibraryError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteCsv { path: PathBuf, source: csv::Error },

    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// A CSV matrix with a leading wavelength column
struct WavelengthTable {
    wavelengths: Vec<f64>,
    /// One inner vector per data column
    columns: Vec<Vec<f64>>,
}

fn read_wavelength_table(path: &Path) -> Result<WavelengthTable, ConfigurationError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let header_len = reader
        .headers()
        .map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if header_len < 2 {
        return Err(ConfigurationError::MissingColumns {
            path: path.to_path_buf(),
        });
    }
    let data_columns = header_len - 1;

    let mut wavelengths = Vec::new();
    let mut columns = vec![Vec::new(); data_columns];
    for (record_index, record) in reader.records().enumerate() {
        let record = record.map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if record.len() != header_len {
            return Err(ConfigurationError::RaggedRecord {
                path: path.to_path_buf(),
                record: record_index,
                expected: header_len,
                got: record.len(),
            });
        }
        for (field_index, field) in record.iter().enumerate() {
            let value: f64 =
                field
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidNumber {
                        path: path.to_path_buf(),
                        record: record_index,
                        field: field_index,
                        value: field.to_string(),
                    })?;
            if field_index == 0 {
                wavelengths.push(value);
            } else {
                columns[field_index - 1].push(value);
            }
        }
    }

    if wavelengths.is_empty() {
        return Err(ConfigurationError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    Ok(WavelengthTable {
        wavelengths,
        columns,
    })
}

fn check_grid_match(
    table: &WavelengthTable,
    grid: &WavelengthGrid,
    path: &Path,
) -> Result<(), ConfigurationError> {
    if table.wavelengths.len() != grid.len() {
        return Err(ConfigurationError::GridMismatch {
            path: path.to_path_buf(),
            record: table.wavelengths.len().min(grid.len()),
        });
    }
    for (record, (&file_nm, &grid_nm)) in table
        .wavelengths
        .iter()
        .zip(grid.wavelengths().iter())
        .enumerate()
    {
        if (file_nm - grid_nm).abs() > GRID_MATCH_TOLERANCE_NM {
            return Err(ConfigurationError::GridMismatch {
                path: path.to_path_buf(),
                record,
            });
        }
    }
    Ok(())
}

/// Load the device calibration: wavelength grid plus C filter response
/// columns.
///
/// Expected layout: a header row, a leading wavelength column and one
/// column per sensor channel, N data records.
pub fn load_calibration(
    path: &Path,
) -> Result<(WavelengthGrid, FilterResponseMatrix), ConfigurationError> {
    let table = read_wavelength_table(path)?;
    let grid =
        WavelengthGrid::new(table.wavelengths.clone()).map_err(|source| {
            ConfigurationError::Grid {
                path: path.to_path_buf(),
                source,
            }
        })?;
    let responses = FilterResponseMatrix::from_rows(table.columns, &grid).map_err(|source| {
        ConfigurationError::Response {
            path: path.to_path_buf(),
            source,
        }
    })?;
    log::info!(
        "loaded calibration from {}: {} channels over {} wavelength samples",
        path.display(),
        responses.channels(),
        grid.len()
    );
    Ok((grid, responses))
}

/// Load the reference spectrum library against an already-loaded grid.
///
/// Expected layout mirrors the calibration file: a leading wavelength
/// column (which must match the calibration grid) and one column per
/// reference spectrum.
pub fn load_library(
    path: &Path,
    grid: &WavelengthGrid,
) -> Result<SpectrumLibrary, ConfigurationError> {
    let table = read_wavelength_table(path)?;
    check_grid_match(&table, grid, path)?;
    let library = SpectrumLibrary::from_rows(grid.clone(), table.columns).map_err(|source| {
        ConfigurationError::Library {
            path: path.to_path_buf(),
            source,
        }
    })?;
    log::info!(
        "loaded {} reference spectra from {}",
        library.len(),
        path.display()
    );
    Ok(library)
}

/// Load held-out measured readings, one record per sample with C fields.
pub fn load_measurements(
    path: &Path,
    channels: usize,
) -> Result<Vec<Measurement>, ConfigurationError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut measurements = Vec::new();
    for (record_index, record) in reader.records().enumerate() {
        let record = record.map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if record.len() != channels {
            return Err(ConfigurationError::RaggedRecord {
                path: path.to_path_buf(),
                record: record_index,
                expected: channels,
                got: record.len(),
            });
        }
        let mut readings = Vec::with_capacity(channels);
        for (field_index, field) in record.iter().enumerate() {
            readings.push(field.trim().parse().map_err(|_| {
                ConfigurationError::InvalidNumber {
                    path: path.to_path_buf(),
                    record: record_index,
                    field: field_index,
                    value: field.to_string(),
                }
            })?);
        }
        measurements.push(Measurement::new(Array1::from(readings)));
    }

    if measurements.is_empty() {
        return Err(ConfigurationError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    Ok(measurements)
}

/// Per-sample provenance entry in the dataset sidecar
#[derive(Debug, Serialize)]
struct ManifestSample<'a> {
    index: usize,
    provenance: &'a crate::augment::Provenance,
}

/// Sidecar metadata persisted next to the dataset matrices
#[derive(Debug, Serialize)]
struct DatasetManifest<'a> {
    random_seed: u64,
    n_samples: usize,
    config: &'a SynthesisConfig,
    samples: Vec<ManifestSample<'a>>,
}

/// Persist an augmented dataset to `dir`.
///
/// Writes three artifacts:
/// - `spectra.csv`: one record per sample, one field per grid wavelength
/// - `measurements.csv`: one record per sample, one field per channel
/// - `manifest.json`: seed, config snapshot and per-sample provenance
pub fn write_dataset(
    dir: &Path,
    samples: &[AugmentedSample],
    grid: &WavelengthGrid,
    config: &SynthesisConfig,
) -> Result<(), ConfigurationError> {
    fs::create_dir_all(dir).map_err(|source| ConfigurationError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let spectra_path = dir.join("spectra.csv");
    let mut writer =
        csv::Writer::from_path(&spectra_path).map_err(|source| ConfigurationError::WriteCsv {
            path: spectra_path.clone(),
            source,
        })?;
    let mut header: Vec<String> = vec!["sample".to_string()];
    header.extend(grid.wavelengths().iter().map(|nm| format!("{nm:.3}")));
    writer
        .write_record(&header)
        .and_then(|_| {
            for (index, sample) in samples.iter().enumerate() {
                let mut record: Vec<String> = vec![index.to_string()];
                record.extend(sample.spectrum.intensities().iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }
            writer.flush().map_err(csv::Error::from)
        })
        .map_err(|source| ConfigurationError::WriteCsv {
            path: spectra_path,
            source,
        })?;

    let measurements_path = dir.join("measurements.csv");
    let channels = samples.first().map_or(0, |s| s.measurement.len());
    let mut writer = csv::Writer::from_path(&measurements_path).map_err(|source| {
        ConfigurationError::WriteCsv {
            path: measurements_path.clone(),
            source,
        }
    })?;
    let mut header: Vec<String> = vec!["sample".to_string()];
    header.extend((0..channels).map(|c| format!("ch{c}")));
    writer
        .write_record(&header)
        .and_then(|_| {
            for (index, sample) in samples.iter().enumerate() {
                let mut record: Vec<String> = vec![index.to_string()];
                record.extend(sample.measurement.readings().iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }
            writer.flush().map_err(csv::Error::from)
        })
        .map_err(|source| ConfigurationError::WriteCsv {
            path: measurements_path,
            source,
        })?;

    let manifest = DatasetManifest {
        random_seed: config.random_seed,
        n_samples: samples.len(),
        config,
        samples: samples
            .iter()
            .enumerate()
            .map(|(index, sample)| ManifestSample {
                index,
                provenance: &sample.provenance,
            })
            .collect(),
    };
    let manifest_path = dir.join("manifest.json");
    let text = serde_json::to_string_pretty(&manifest)?;
    fs::write(&manifest_path, text).map_err(|source| ConfigurationError::Write {
        path: manifest_path,
        source,
    })?;

    log::info!(
        "wrote {} samples to {}",
        samples.len(),
        dir.display()
    );
    Ok(())
}
