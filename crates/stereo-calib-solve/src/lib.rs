//! Calibration solvers for checkerboard correspondences.
//!
//! - [`MonoCalibrator`]: Zhang initialization from board homographies, then
//!   joint Levenberg–Marquardt refinement of `K`, distortion and view poses.
//! - [`StereoCalibrator`]: relative pose of two calibrated cameras.
//! - [`PoseEstimator`]: planar PnP for a single view, plus [`cross_check`]
//!   (or [`cross_check_camera2`]) against a stereo rig.
//! - [`calibration_matrix_values`]: field of view and focal length in sensor
//!   units.
//!
//! All solvers share the dense LM backend in [`lm`].

mod derived;
pub mod lm;
mod mono;
mod planar_pose;
mod pnp;
mod reprojection;
mod stereo;
pub mod zhang;

pub use derived::{calibration_matrix_values, CalibrationMatrixValues};
pub use lm::{SolveOptions, SolveReport};
pub use mono::{MonoCalibration, MonoCalibrator, MonoOptions, MIN_POINTS_PER_VIEW, MIN_VIEWS};
pub use planar_pose::pose_from_homography;
pub use pnp::{
    cross_check, cross_check_camera2, CrossCheckMode, PoseCrossCheck, PoseEstimate, PoseEstimator,
};
pub use reprojection::{reproject, view_rms};
pub use stereo::{
    epipolar_residuals, essential_matrix, fundamental_matrix, StereoCalibrator, StereoRig,
};
