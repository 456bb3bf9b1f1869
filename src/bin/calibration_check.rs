//! Forward-model fidelity check against held-out measurements
//!
//! Projects known reference spectra through the calibrated forward model
//! and compares the predictions against real device readings. A tolerance
//! breach marks the calibration as stale; the report is printed either way
//! and the process exit code signals the result for scripting.
//!
//! ```bash
//! cargo run --release --bin calibration_check -- \
//!     --calibration device.csv --spectra holdout_spectra.csv \
//!     --measurements holdout_readings.csv --tolerance 0.05
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use spectre_augment::io::{load_calibration, load_library, load_measurements};
use spectre_augment::validate::calibration_report;
use spectre_augment::ForwardModel;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device calibration CSV: wavelength column plus one column per channel
    #[arg(short, long)]
    calibration: PathBuf,

    /// Held-out reference spectra CSV, same layout as the library file
    #[arg(short, long)]
    spectra: PathBuf,

    /// Held-out device readings CSV, one record per spectrum
    #[arg(short, long)]
    measurements: PathBuf,

    /// Mean relative error allowed before the calibration is flagged stale
    #[arg(short, long, default_value = "0.05")]
    tolerance: f64,

    /// Emit the report as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

fn run(cli: &Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let (grid, responses) = load_calibration(&cli.calibration)?;
    let holdout = load_library(&cli.spectra, &grid)?;
    let model = ForwardModel::new(grid, responses)?;
    let measurements = load_measurements(&cli.measurements, model.channels())?;

    if holdout.len() != measurements.len() {
        return Err(format!(
            "{} spectra but {} measurement records",
            holdout.len(),
            measurements.len()
        )
        .into());
    }

    let pairs: Vec<_> = holdout
        .spectra()
        .iter()
        .cloned()
        .zip(measurements)
        .collect();
    let report = calibration_report(&model, &pairs, cli.tolerance)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    if !report.within_tolerance {
        log::warn!(
            "calibration drift: mean relative error {:.4} exceeds tolerance {:.4}",
            report.mean_relative_error,
            report.tolerance
        );
    }
    Ok(report.within_tolerance)
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
