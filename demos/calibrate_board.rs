//! Calibration Board Tool
//!
//! Calibrates a camera from one view of the three-face calibration rig and
//! prints the recovered projection matrix, intrinsics, rotation and camera
//! center together with reprojection statistics.
//!
//! Usage:
//! ```bash
//! cargo run --example calibrate_board -- \
//!   --input samples/reference_board.yaml
//!
//! cargo run --example calibrate_board -- \
//!   --input samples/reference_board.csv --square-size 26.5 --refine \
//!   --output output/reference_board.yaml
//! ```

use clap::Parser;
use dlt_calibration::camera::CameraModel;
use dlt_calibration::io::{load_dataset_from_yaml, load_observations_from_csv};
use dlt_calibration::{calibrate_grid, CalibrationConfig, GridObservations, RigOffsets};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// DLT camera calibration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dataset file: YAML (grid + pixels) or CSV (col,row,layer,u,v)
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Board square size in millimetres (CSV input only)
    #[arg(short = 's', long, default_value = "26.5")]
    square_size: f64,

    /// Solve the DLT on raw coordinates instead of normalized ones
    #[arg(long)]
    no_normalize: bool,

    /// Refine the projection matrix by minimising reprojection error
    #[arg(short = 'r', long)]
    refine: bool,

    /// Write the calibration report (.yaml or .json)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Write the recovered pinhole camera as YAML
    #[arg(short = 'c', long)]
    camera_output: Option<PathBuf>,
}

fn load_observations(
    path: &Path,
    square_size: f64,
) -> Result<GridObservations, Box<dyn std::error::Error>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    let observations = match extension.as_deref() {
        Some("yaml") | Some("yml") => load_dataset_from_yaml(path)?,
        Some("csv") => load_observations_from_csv(path, square_size, RigOffsets::default())?,
        _ => {
            return Err(format!(
                "Unsupported input file: {}. Supported types: yaml, yml, csv",
                path.display()
            )
            .into());
        }
    };
    Ok(observations)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();

    println!("DLT CAMERA CALIBRATION");
    println!("======================");
    println!("Input file: {:?}", cli.input);

    let observations = load_observations(&cli.input, cli.square_size)?;
    println!("Board points: {}\n", observations.grid.len());

    let mut config = CalibrationConfig {
        refine: cli.refine,
        ..Default::default()
    };
    config.dlt.normalize = !cli.no_normalize;

    let start = Instant::now();
    let result = calibrate_grid(&observations, &config)?;
    let elapsed = start.elapsed();
    info!("Calibration took {:.3} ms", elapsed.as_secs_f64() * 1000.0);

    println!("Projection matrix P (unit norm):{}", result.projection.matrix());
    println!("Intrinsic matrix K:{}", result.intrinsic);
    println!("Rotation R:{}", result.rotation);
    println!(
        "Camera center C: [{:.3}, {:.3}, {:.3}]",
        result.center.x, result.center.y, result.center.z
    );
    println!(
        "fx: {:.3}  fy: {:.3}  skew: {:.3}  cx: {:.3}  cy: {:.3}",
        result.intrinsics.fx,
        result.intrinsics.fy,
        result.intrinsics.skew,
        result.intrinsics.cx,
        result.intrinsics.cy
    );
    let system = if config.dlt.normalize {
        "normalized"
    } else {
        "raw"
    };
    println!(
        "Smallest singular value ({} system): {:.6e} (algebraic residual {:.6e})",
        system,
        result.singular_values.last().copied().unwrap_or(f64::NAN),
        result.algebraic_residual
    );
    println!(
        "Design residual ||A p|| on input coordinates: {:.6e}",
        result.design_residual
    );
    println!("Refined: {}", result.refined);
    println!("{:?}", result.reprojection_error);

    if let Some(output) = &cli.output {
        match output.extension().and_then(|e| e.to_str()) {
            Some("json") => result.save_to_json(output)?,
            _ => result.save_to_yaml(output)?,
        }
        println!("Report written to {:?}", output);
    }

    if let Some(camera_output) = &cli.camera_output {
        let path = camera_output
            .to_str()
            .ok_or("camera output path is not valid UTF-8")?;
        result.camera().save_to_yaml(path)?;
        println!("Camera written to {:?}", camera_output);
    }

    Ok(())
}
