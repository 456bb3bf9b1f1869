//! End-to-end pipeline checks over a realistic filter-array device:
//! a 50-point visible grid, 8 overlapping Gaussian channels and a small
//! library of peaked reference spectra.

use spectre_augment::validate::{batch_report, calibration_report};
use spectre_augment::{
    FilterResponseMatrix, ForwardModel, NoiseParameters, PairSynthesizer, Provenance, Spectrum,
    SpectrumLibrary, SynthesisConfig, WavelengthGrid,
};

const N_WAVELENGTHS: usize = 50;
const N_CHANNELS: usize = 8;
const N_REFERENCES: usize = 10;

fn grid() -> WavelengthGrid {
    WavelengthGrid::from_range(400.0, 700.0, N_WAVELENGTHS).unwrap()
}

/// Overlapping Gaussian transmission curves spread over the visible band
fn device() -> ForwardModel {
    let grid = grid();
    let (start, end) = grid.span();
    let rows = (0..N_CHANNELS)
        .map(|c| {
            let center = start + (end - start) * (c as f64 + 0.5) / N_CHANNELS as f64;
            let width = (end - start) / N_CHANNELS as f64;
            grid.wavelengths()
                .iter()
                .map(|&nm| {
                    let z = (nm - center) / width;
                    (-0.5 * z * z).exp()
                })
                .collect()
        })
        .collect();
    let responses = FilterResponseMatrix::from_rows(rows, &grid).unwrap();
    ForwardModel::new(grid, responses).unwrap()
}

/// Reference spectra with distinct peak positions and widths
fn library() -> SpectrumLibrary {
    let grid = grid();
    let (start, end) = grid.span();
    let rows = (0..N_REFERENCES)
        .map(|s| {
            let center = start + (end - start) * (s as f64 + 0.5) / N_REFERENCES as f64;
            let width = 20.0 + 3.0 * s as f64;
            grid.wavelengths()
                .iter()
                .map(|&nm| {
                    let z = (nm - center) / width;
                    0.05 + (-0.5 * z * z).exp()
                })
                .collect()
        })
        .collect();
    SpectrumLibrary::from_rows(grid, rows).unwrap()
}

fn config() -> SynthesisConfig {
    SynthesisConfig {
        n_samples: 100,
        random_seed: 42,
        clean_threshold: 0.01,
        ..SynthesisConfig::default()
    }
}

#[test]
fn test_synthesize_full_batch() {
    let library = library();
    let forward = device();
    let config = config();
    let synthesizer = PairSynthesizer::new(&library, &forward, &config).unwrap();

    let samples = synthesizer.synthesize_batch(config.n_samples).unwrap();
    assert_eq!(samples.len(), 100);
    for sample in &samples {
        assert_eq!(sample.spectrum.len(), N_WAVELENGTHS);
        assert_eq!(sample.measurement.len(), N_CHANNELS);
        assert!(sample.spectrum.intensities().iter().all(|&v| v >= 0.0));
        assert!(sample.measurement.readings().iter().all(|&v| v >= 0.0));
        assert!(matches!(sample.provenance, Provenance::Synthesized { .. }));
    }

    let report = batch_report(&samples, forward.grid(), config.dedup_tolerance);
    assert_eq!(report.negative_entries, 0);
    assert_eq!(report.duplicate_pairs, 0);
    assert!(report.passes());
}

#[test]
fn test_rerun_reproduces_dataset() {
    let library = library();
    let forward = device();
    let config = config();

    let first = PairSynthesizer::new(&library, &forward, &config)
        .unwrap()
        .synthesize_batch(config.n_samples)
        .unwrap();
    let second = PairSynthesizer::new(&library, &forward, &config)
        .unwrap()
        .synthesize_batch(config.n_samples)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_parallel_batch_matches_sequential_stream() {
    let library = library();
    let forward = device();
    let config = config();
    let synthesizer = PairSynthesizer::new(&library, &forward, &config).unwrap();

    let stream: Vec<_> = synthesizer
        .synthesize(config.n_samples)
        .collect::<Result<_, _>>()
        .unwrap();
    let batch = synthesizer.synthesize_batch(config.n_samples).unwrap();
    assert_eq!(stream, batch);
}

#[test]
fn test_noiseless_pairs_are_optically_consistent() {
    // With noise variances at zero, every synthesized measurement must be
    // exactly the forward projection of its spectrum.
    let library = library();
    let forward = device();
    let config = SynthesisConfig {
        noise: NoiseParameters {
            gain_variance: spectre_augment::noise::Coefficients::Scalar(0.0),
            offset_variance: spectre_augment::noise::Coefficients::Scalar(0.0),
            clip_negative: true,
        },
        ..config()
    };
    let synthesizer = PairSynthesizer::new(&library, &forward, &config).unwrap();

    let samples = synthesizer.synthesize_batch(40).unwrap();
    let pairs: Vec<(Spectrum, _)> = samples
        .into_iter()
        .map(|s| (s.spectrum, s.measurement))
        .collect();
    let report = calibration_report(&forward, &pairs, 1e-9).unwrap();
    assert!(report.within_tolerance);
}

#[test]
fn test_noisy_pairs_stay_near_projection() {
    // Default noise variances are small; the calibration check over
    // synthesized pairs should stay within a loose tolerance.
    let library = library();
    let forward = device();
    let config = config();
    let synthesizer = PairSynthesizer::new(&library, &forward, &config).unwrap();

    let samples = synthesizer.synthesize_batch(40).unwrap();
    let pairs: Vec<(Spectrum, _)> = samples
        .into_iter()
        .map(|s| (s.spectrum, s.measurement))
        .collect();
    let report = calibration_report(&forward, &pairs, 0.25).unwrap();
    assert!(report.within_tolerance);
}
