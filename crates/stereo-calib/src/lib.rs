//! High-level facade for the `stereo-calib-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core model, the checkerboard detector and the solvers
//! - a JSON configuration ([`config::CalibConfig`])
//! - text/JSON calibration reports ([`report`])
//! - (feature `image`) directory and stereo-pair pipelines on image files
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_calib::config::{CalibConfig, CameraId};
//! use stereo_calib::pipeline::calibrate_directory;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibConfig::load_json("calib.json")?;
//! let run = calibrate_directory("images/cam1", &config.mono_settings(CameraId::First))?;
//! println!("rms = {:.3} px", run.calibration.rms);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `stereo_calib::core`: pattern, images/ROI, correspondences, camera model, poses.
//! - `stereo_calib::chessboard`: inner-corner detection in grid order.
//! - `stereo_calib::solve`: mono/stereo calibration, PnP, derived camera values.
//! - `stereo_calib::pipeline` (feature `image`): end-to-end runs on image files.

pub use stereo_calib_chessboard as chessboard;
pub use stereo_calib_core as core;
pub use stereo_calib_solve as solve;

pub use stereo_calib_chessboard::{ChessboardDetection, ChessboardDetector, ChessboardParams};
pub use stereo_calib_core::{
    CalibError, CalibResult, CalibrationImage, CameraIntrinsics, ChessboardPattern, Correspondence,
    ImageSize, Pose, RegionOfInterest, SensorSize, TermCriteria,
};
pub use stereo_calib_solve::{
    MonoCalibration, MonoCalibrator, PoseEstimator, StereoCalibrator, StereoRig,
};

pub mod config;
pub mod report;

#[cfg(feature = "image")]
pub mod pipeline;
