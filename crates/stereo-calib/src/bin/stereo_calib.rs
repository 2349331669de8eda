//! stereo-calib CLI: mono calibration per camera, stereo extrinsics for the
//! rig, and text/JSON reports.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use stereo_calib::config::{CalibConfig, CameraId};
use stereo_calib::pipeline::{calibrate_directory, calibrate_stereo_pair, MonoRun};
use stereo_calib::report::{source_name, MonoReport, StereoReport};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "stereo-calib")]
#[command(about = "Calibrate a stereo camera pair from checkerboard images")]
#[command(version)]
struct Cli {
    /// JSON configuration file; built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Emit structured JSON log events through `tracing`.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate one camera from a directory of board images.
    Mono(MonoArgs),

    /// Estimate the rig extrinsics from one synchronized image pair.
    Stereo(StereoArgs),

    /// Mono calibration of both configured cameras, then stereo on the
    /// configured image pair.
    Run(OutputArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CameraArg {
    First,
    Second,
}

impl From<CameraArg> for CameraId {
    fn from(arg: CameraArg) -> Self {
        match arg {
            CameraArg::First => CameraId::First,
            CameraArg::Second => CameraId::Second,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct OutputArgs {
    /// Write `<directory>_calibration.txt` for each mono calibration.
    #[arg(long)]
    save: bool,

    /// Directory for the text reports.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Write the full report as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct MonoArgs {
    /// Directory with the calibration images.
    dir: PathBuf,

    /// Camera whose ROI from the config applies.
    #[arg(long, value_enum, default_value_t = CameraArg::First)]
    camera: CameraArg,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Clone, Args)]
struct StereoArgs {
    /// Camera 1 image of the synchronized pair.
    #[arg(long)]
    image1: PathBuf,

    /// Camera 2 image of the synchronized pair.
    #[arg(long)]
    image2: PathBuf,

    /// Mono report (JSON) of camera 1.
    #[arg(long)]
    intrinsics1: PathBuf,

    /// Mono report (JSON) of camera 2.
    #[arg(long)]
    intrinsics2: PathBuf,

    /// Write the stereo report as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    camera1: &'a MonoReport,
    camera2: &'a MonoReport,
    stereo: &'a StereoReport,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = match &cli.config {
        Some(path) => CalibConfig::load_json(path)?,
        None => CalibConfig::default(),
    };

    match &cli.command {
        Commands::Mono(args) => run_mono(args, &config),
        Commands::Stereo(args) => run_stereo(args, &config),
        Commands::Run(args) => run_all(args, &config),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    if cli.log_json {
        stereo_calib::core::init_tracing(true);
        return Ok(());
    }
    stereo_calib::core::init_with_level(cli.log_level)?;
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    stereo_calib::core::init_with_level(cli.log_level)?;
    Ok(())
}

fn mono_report(run: &MonoRun, config: &CalibConfig) -> MonoReport {
    MonoReport::new(
        source_name(&run.source),
        &run.image_names,
        &run.calibration,
        config.sensor,
        run.excluded.clone(),
    )
}

fn calibrate_camera(dir: &Path, camera: CameraId, config: &CalibConfig) -> CliResult<MonoReport> {
    info!("{}: calibrating from {}", camera.label(), dir.display());
    let run = calibrate_directory(dir, &config.mono_settings(camera))?;
    Ok(mono_report(&run, config))
}

fn save_mono(report: &MonoReport, output: &OutputArgs) -> CliResult<()> {
    if output.save {
        let path = report.save_text(&output.out_dir)?;
        info!("report written to {}", path.display());
    }
    Ok(())
}

fn run_mono(args: &MonoArgs, config: &CalibConfig) -> CliResult<()> {
    let report = calibrate_camera(&args.dir, args.camera.into(), config)?;
    println!("{report}");
    save_mono(&report, &args.output)?;
    if let Some(path) = &args.output.json {
        report.write_json(path)?;
        info!("JSON report written to {}", path.display());
    }
    Ok(())
}

fn run_stereo(args: &StereoArgs, config: &CalibConfig) -> CliResult<()> {
    let mono1 = MonoReport::load_json(&args.intrinsics1)?.camera()?;
    let mono2 = MonoReport::load_json(&args.intrinsics2)?.camera()?;
    let run = calibrate_stereo_pair(&args.image1, &args.image2, &mono1, &mono2, config)?;
    let report = StereoReport::new(&run.rig, run.cross_check.as_ref());
    println!("{report}");
    if let Some(path) = &args.json {
        report.write_json(path)?;
        info!("JSON report written to {}", path.display());
    }
    Ok(())
}

fn required<'a>(value: &'a Option<PathBuf>, what: &str) -> CliResult<&'a Path> {
    value
        .as_deref()
        .ok_or_else(|| format!("config is missing {what}").into())
}

fn run_all(args: &OutputArgs, config: &CalibConfig) -> CliResult<()> {
    let dir1 = required(&config.camera1.images, "camera1.images")?;
    let dir2 = required(&config.camera2.images, "camera2.images")?;
    let image1 = required(&config.camera1.stereo_image, "camera1.stereo_image")?;
    let image2 = required(&config.camera2.stereo_image, "camera2.stereo_image")?;

    let report1 = calibrate_camera(dir1, CameraId::First, config)?;
    println!("{report1}");
    save_mono(&report1, args)?;
    let report2 = calibrate_camera(dir2, CameraId::Second, config)?;
    println!("{report2}");
    save_mono(&report2, args)?;

    let run = calibrate_stereo_pair(
        image1,
        image2,
        &report1.camera()?,
        &report2.camera()?,
        config,
    )?;
    let stereo = StereoReport::new(&run.rig, run.cross_check.as_ref());
    println!("{stereo}");

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&RunReport {
            camera1: &report1,
            camera2: &report2,
            stereo: &stereo,
        })?;
        std::fs::write(path, json)?;
        info!("JSON report written to {}", path.display());
    }
    Ok(())
}
