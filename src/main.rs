// Command-line runner for the `vistrack` library: calibrate from a sample
// patch, then track a colour object over a sequence of still frames.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use vistrack::core_modules::format::load_rgb;
use vistrack::core_modules::histogram::HsiCalibration;
use vistrack::core_modules::object_file::{load_calibration, load_object, save_calibration, save_object};
use vistrack::{ObjectTracker, Report, TrackingConfig};

#[derive(Parser, Debug)]
#[command(name = "vistrack", version, about = "Single colour object tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive an HSI calibration from a sample image of the object
    Calibrate {
        /// RGB sample patch
        #[arg(value_name = "SAMPLE")]
        sample: PathBuf,

        /// Calibration file to write
        #[arg(short, long, value_name = "FILE", default_value = "para.txt")]
        out: PathBuf,
    },
    /// Acquire and track the calibrated object over a list of frames
    Track {
        /// Calibration file written by `calibrate`
        #[arg(short, long, value_name = "FILE")]
        params: PathBuf,

        /// Tracker configuration (TOML)
        #[arg(short, long, value_name = "FILE", default_value = "vistrack.toml")]
        config: PathBuf,

        /// Start from a saved object instead of acquiring one
        #[arg(long, value_name = "FILE")]
        object: Option<PathBuf>,

        /// Write the last tracked object here
        #[arg(long, value_name = "FILE")]
        save_object: Option<PathBuf>,

        /// RGB frames, processed in order
        #[arg(value_name = "FRAMES", required = true)]
        frames: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate { sample, out } => calibrate(sample, out),
        Commands::Track {
            params,
            config,
            object,
            save_object,
            frames,
        } => track(params, config, object, save_object, frames),
    }
}

fn calibrate(sample: PathBuf, out: PathBuf) -> Result<()> {
    let image = load_rgb(&sample).with_context(|| format!("Failed to read sample {}", sample.display()))?;
    let calibration = HsiCalibration::from_sample(&image).context("Calibration failed")?;
    info!(
        "calibrated: h={} s={} i={} tolerances {}deg {}% {}%",
        calibration.h, calibration.s, calibration.i, calibration.h_tol, calibration.s_tol, calibration.i_tol
    );
    save_calibration(&calibration, &out).with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(())
}

fn track(
    params: PathBuf,
    config: PathBuf,
    object: Option<PathBuf>,
    save_to: Option<PathBuf>,
    frames: Vec<PathBuf>,
) -> Result<()> {
    let calibration =
        load_calibration(&params).with_context(|| format!("Failed to read calibration {}", params.display()))?;
    let config = TrackingConfig::load_from(&config).context("Invalid tracker configuration")?;

    let mut tracker = match object {
        Some(path) => {
            let object = load_object(&path, config.position_history)
                .with_context(|| format!("Failed to read object {}", path.display()))?;
            ObjectTracker::with_object(config, calibration, object)
                .with_context(|| format!("Cannot track object {}", path.display()))?
        }
        None => ObjectTracker::new(config, calibration),
    };

    for path in &frames {
        let frame = load_rgb(path).with_context(|| format!("Failed to read frame {}", path.display()))?;
        match tracker.process_frame(&frame) {
            Ok(Report::NotFound) => info!("{}: no object", path.display()),
            Ok(Report::Acquired { bounding_box, blobs }) => info!(
                "{}: acquired {}x{} at ({}, {}) among {} blobs",
                path.display(),
                bounding_box.width,
                bounding_box.height,
                bounding_box.x,
                bounding_box.y,
                blobs
            ),
            Ok(Report::Tracking {
                confidence,
                bounding_box,
                predicted,
            }) => info!(
                "{}: tracking at ({}, {}) confidence {}%, next ({}, {})",
                path.display(),
                bounding_box.x,
                bounding_box.y,
                confidence,
                predicted.x,
                predicted.y
            ),
            Ok(Report::Lost { confidence }) => info!("{}: lost (confidence {}%)", path.display(), confidence),
            Err(e) => warn!("{}: frame skipped: {}", path.display(), e),
        }
    }

    if let Some(path) = save_to {
        let Some(object) = tracker.object() else {
            bail!("No object to save: tracking ended without an object");
        };
        save_object(object, &path).with_context(|| format!("Failed to write object {}", path.display()))?;
    }
    Ok(())
}
