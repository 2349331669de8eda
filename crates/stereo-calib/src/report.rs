//! Human-readable and JSON calibration reports.

use crate::config::JsonIoError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use stereo_calib_core::{CalibResult, CameraIntrinsics, Distortion, ImageSize, SensorSize};
use stereo_calib_solve::{
    calibration_matrix_values, CalibrationMatrixValues, CrossCheckMode, MonoCalibration,
    PoseCrossCheck, PoseEstimate, StereoRig,
};

/// An image left out of a mono calibration, with the reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExcludedImage {
    pub name: String,
    pub reason: String,
}

/// Poses of the cross-check board and their consistency with the rig.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrossCheckOutcome {
    /// `None` when only camera 2 sees the board.
    pub pose1: Option<PoseEstimate>,
    pub pose2: PoseEstimate,
    pub check: PoseCrossCheck,
}

/// Per-image extrinsics of a mono calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewExtrinsics {
    pub image: String,
    pub rms: f64,
    /// Rodrigues rotation vector.
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

/// Intrinsics of one camera and the image size they were estimated at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibratedCamera {
    pub intrinsics: CameraIntrinsics,
    pub image_size: ImageSize,
}

impl From<&MonoCalibration> for CalibratedCamera {
    fn from(calibration: &MonoCalibration) -> Self {
        Self {
            intrinsics: calibration.intrinsics,
            image_size: calibration.image_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonoReport {
    /// Name of the image source, usually the directory basename.
    pub source: String,
    pub image_size: ImageSize,
    pub rms: f64,
    pub camera_matrix: Matrix3<f64>,
    /// `k1, k2, p1, p2[, k3]`.
    pub distortion: Vec<f64>,
    pub views: Vec<ViewExtrinsics>,
    pub derived: CalibrationMatrixValues,
    pub converged: bool,
    pub termination: String,
    pub excluded: Vec<ExcludedImage>,
}

impl MonoReport {
    /// `image_names` must follow the view order of `calibration`.
    pub fn new(
        source: impl Into<String>,
        image_names: &[String],
        calibration: &MonoCalibration,
        sensor: SensorSize,
        excluded: Vec<ExcludedImage>,
    ) -> Self {
        let views = calibration
            .poses
            .iter()
            .zip(&calibration.per_view_rms)
            .enumerate()
            .map(|(idx, (pose, rms))| ViewExtrinsics {
                image: image_names
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("view {idx}")),
                rms: *rms,
                rvec: pose.rvec(),
                tvec: pose.translation,
            })
            .collect();

        Self {
            source: source.into(),
            image_size: calibration.image_size,
            rms: calibration.rms,
            camera_matrix: calibration.intrinsics.k_matrix(),
            distortion: calibration.intrinsics.distortion.coefficients(),
            views,
            derived: calibration_matrix_values(
                &calibration.intrinsics,
                calibration.image_size,
                sensor,
            ),
            converged: calibration.report.converged,
            termination: calibration.report.termination.clone(),
            excluded,
        }
    }

    /// Camera model stored in the report, e.g. to reuse a saved mono run.
    pub fn intrinsics(&self) -> CalibResult<CameraIntrinsics> {
        Ok(CameraIntrinsics::from_k_matrix(
            &self.camera_matrix,
            Distortion::from_coefficients(&self.distortion)?,
        ))
    }

    /// [`MonoReport::intrinsics`] together with the calibrated image size.
    pub fn camera(&self) -> CalibResult<CalibratedCamera> {
        Ok(CalibratedCamera {
            intrinsics: self.intrinsics()?,
            image_size: self.image_size,
        })
    }

    /// Load a report written by [`MonoReport::write_json`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, JsonIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// `<source>_calibration.txt`.
    pub fn file_name(&self) -> String {
        format!("{}_calibration.txt", self.source)
    }

    /// Write the text report into `out_dir`; returns the file path.
    pub fn save_text(&self, out_dir: impl AsRef<Path>) -> Result<PathBuf, JsonIoError> {
        let path = out_dir.as_ref().join(self.file_name());
        fs::write(&path, self.to_string())?;
        Ok(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), JsonIoError> {
        write_json(self, path)
    }
}

impl fmt::Display for MonoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Calibration of {} ({}, {} images)",
            self.source,
            self.image_size,
            self.views.len()
        )?;
        writeln!(f, "Average reprojection error: {:.6} px", self.rms)?;
        write_convergence(f, self.converged, &self.termination)?;
        writeln!(f, "Camera intrinsic matrix:")?;
        write_matrix(f, &self.camera_matrix)?;
        writeln!(f, "Distortion coefficients:")?;
        writeln!(f, "  {}", format_row(&self.distortion))?;
        writeln!(f, "Per image rotation vectors:")?;
        for view in &self.views {
            writeln!(f, "  {}: {}", view.image, format_row(view.rvec.as_slice()))?;
        }
        writeln!(f, "Per image translation vectors:")?;
        for view in &self.views {
            writeln!(f, "  {}: {}", view.image, format_row(view.tvec.as_slice()))?;
        }
        writeln!(f, "Per image reprojection error (px):")?;
        for view in &self.views {
            writeln!(f, "  {}: {:.6}", view.image, view.rms)?;
        }
        writeln!(
            f,
            "Field of view in degrees along horizontal sensor axis: {:.4}",
            self.derived.fovx
        )?;
        writeln!(
            f,
            "Field of view in degrees along vertical sensor axis: {:.4}",
            self.derived.fovy
        )?;
        writeln!(f, "Focal length of lens in mm: {:.4}", self.derived.focal_length)?;
        writeln!(
            f,
            "Principal point in mm: [{:.4}, {:.4}]",
            self.derived.principal_point.x, self.derived.principal_point.y
        )?;
        writeln!(f, "Pixel aspect ratio: {:.6}", self.derived.aspect_ratio)?;
        writeln!(f, "Excluded images: {}", self.excluded.len())?;
        for ex in &self.excluded {
            writeln!(f, "  {}: {}", ex.name, ex.reason)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckSummary {
    pub rvec1: Option<Vector3<f64>>,
    pub tvec1: Option<Vector3<f64>>,
    pub rms1: Option<f64>,
    pub rvec2: Vector3<f64>,
    pub tvec2: Vector3<f64>,
    pub rms2: f64,
    pub check: PoseCrossCheck,
}

impl From<&CrossCheckOutcome> for CrossCheckSummary {
    fn from(outcome: &CrossCheckOutcome) -> Self {
        Self {
            rvec1: outcome.pose1.as_ref().map(|p| p.pose.rvec()),
            tvec1: outcome.pose1.as_ref().map(|p| p.pose.translation),
            rms1: outcome.pose1.as_ref().map(|p| p.rms),
            rvec2: outcome.pose2.pose.rvec(),
            tvec2: outcome.pose2.pose.translation,
            rms2: outcome.pose2.rms,
            check: outcome.check,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoReport {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rms: f64,
    pub converged: bool,
    pub termination: String,
    pub cross_check: Option<CrossCheckSummary>,
}

impl StereoReport {
    pub fn new(rig: &StereoRig, cross_check: Option<&CrossCheckOutcome>) -> Self {
        Self {
            rotation: rig.rotation(),
            translation: rig.translation(),
            essential: rig.essential,
            fundamental: rig.fundamental,
            rms: rig.rms,
            converged: rig.report.converged,
            termination: rig.report.termination.clone(),
            cross_check: cross_check.map(CrossCheckSummary::from),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), JsonIoError> {
        write_json(self, path)
    }
}

impl fmt::Display for StereoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stereo reprojection error: {:.6} px", self.rms)?;
        write_convergence(f, self.converged, &self.termination)?;
        writeln!(f, "Rotation matrix:")?;
        write_matrix(f, &self.rotation)?;
        writeln!(f, "Translation vector:")?;
        writeln!(f, "  {}", format_row(self.translation.as_slice()))?;
        writeln!(f, "Essential matrix:")?;
        write_matrix(f, &self.essential)?;
        writeln!(f, "Fundamental matrix:")?;
        write_matrix(f, &self.fundamental)?;

        let Some(cc) = &self.cross_check else {
            return writeln!(f, "Pose cross-check: not available");
        };
        let mode = match cc.check.mode {
            CrossCheckMode::BothCameras => "both cameras",
            CrossCheckMode::Camera2Only => "camera 2 only",
        };
        writeln!(f, "Pose cross-check ({mode}):")?;
        if let (Some(rvec1), Some(tvec1), Some(rms1)) = (cc.rvec1, cc.tvec1, cc.rms1) {
            writeln!(
                f,
                "  camera 1 board pose: rvec {} tvec {} (rms {:.4} px)",
                format_row(rvec1.as_slice()),
                format_row(tvec1.as_slice()),
                rms1
            )?;
        }
        writeln!(
            f,
            "  camera 2 board pose: rvec {} tvec {} (rms {:.4} px)",
            format_row(cc.rvec2.as_slice()),
            format_row(cc.tvec2.as_slice()),
            cc.rms2
        )?;
        if let Some(residual) = cc.check.translation_residual {
            writeln!(f, "  t2 - (R t1 + T): {}", format_row(residual.as_slice()))?;
        }
        writeln!(
            f,
            "  t2 - T: {}",
            format_row(cc.check.raw_translation_difference.as_slice())
        )?;
        match cc.check.rotation_error_deg {
            Some(deg) => writeln!(f, "  rotation error: {deg:.4} deg"),
            None => Ok(()),
        }
    }
}

/// Basename of a source directory, ignoring trailing separators.
pub fn source_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            dir.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "camera".to_string())
}

fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), JsonIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn write_convergence(f: &mut fmt::Formatter<'_>, converged: bool, termination: &str) -> fmt::Result {
    if converged {
        writeln!(f, "Optimization: converged ({termination})")
    } else {
        writeln!(f, "Optimization: NOT CONVERGED ({termination})")
    }
}

fn format_row(values: &[f64]) -> String {
    let cells: Vec<String> = values.iter().map(|v| format!("{v:.6}")).collect();
    format!("[{}]", cells.join(", "))
}

fn write_matrix(f: &mut fmt::Formatter<'_>, m: &Matrix3<f64>) -> fmt::Result {
    for r in 0..3 {
        let row: Vec<String> = (0..3).map(|c| format!("{:>16.6}", m[(r, c)])).collect();
        writeln!(f, "  [{} ]", row.join(""))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_calib_core::{CameraIntrinsics, Distortion, Pose};
    use stereo_calib_solve::SolveReport;

    fn calibration(converged: bool) -> MonoCalibration {
        MonoCalibration {
            rms: 0.125,
            per_view_rms: vec![0.1, 0.15],
            intrinsics: CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Distortion::default()),
            poses: vec![
                Pose::from_rvec_tvec(Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, 0.0, 600.0)),
                Pose::from_rvec_tvec(Vector3::new(0.0, 0.1, 0.0), Vector3::new(0.0, 0.0, 650.0)),
            ],
            image_size: ImageSize::new(640, 480),
            report: SolveReport {
                iterations: 12,
                final_cost: 0.5,
                converged,
                termination: "Converged".to_string(),
            },
        }
    }

    #[test]
    fn mono_text_lists_every_section() {
        let names = vec!["a.png".to_string(), "b.png".to_string()];
        let excluded = vec![ExcludedImage {
            name: "c.png".to_string(),
            reason: "chessboard not found".to_string(),
        }];
        let report = MonoReport::new(
            "left",
            &names,
            &calibration(true),
            SensorSize::new(6.4, 4.8),
            excluded,
        );
        let text = report.to_string();

        assert!(text.contains("Average reprojection error: 0.125000 px"));
        assert!(text.contains("Camera intrinsic matrix:"));
        assert!(text.contains("Distortion coefficients:"));
        assert!(text.contains("  a.png: [0.100000, "));
        assert!(text.contains("Focal length of lens in mm: 8.0000"));
        assert!(text.contains("Principal point in mm: [3.2000, 2.4000]"));
        assert!(text.contains("Pixel aspect ratio: 1.000000"));
        assert!(text.contains("Excluded images: 1"));
        assert!(text.contains("  c.png: chessboard not found"));
        assert!(!text.contains("NOT CONVERGED"));
        assert_eq!(report.file_name(), "left_calibration.txt");
    }

    #[test]
    fn non_convergence_is_reported() {
        let report = MonoReport::new("cam", &[], &calibration(false), SensorSize::new(0.0, 0.0), Vec::new());
        assert!(report.to_string().contains("NOT CONVERGED"));
        assert_eq!(report.views[1].image, "view 1");
    }

    #[test]
    fn text_and_json_are_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = MonoReport::new("right", &[], &calibration(true), SensorSize::new(5.2, 3.88), Vec::new());

        let path = report.save_text(dir.path()).expect("save");
        assert_eq!(path, dir.path().join("right_calibration.txt"));
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, report.to_string());

        let json_path = dir.path().join("right.json");
        report.write_json(&json_path).expect("json");
        let back = MonoReport::load_json(&json_path).expect("load");
        assert_eq!(back.views.len(), 2);
        assert_eq!(back.source, "right");
        assert_eq!(back.intrinsics().expect("intrinsics"), calibration(true).intrinsics);
        assert_eq!(
            back.camera().expect("camera"),
            CalibratedCamera::from(&calibration(true))
        );
    }

    #[test]
    fn stereo_text_without_cross_check() {
        let cam = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Distortion::default());
        let rig = StereoRig::from_extrinsics(
            cam,
            cam,
            Pose::from_rvec_tvec(Vector3::new(0.0, 0.05, 0.0), Vector3::new(-60.0, 0.0, 0.0)),
        );
        let text = StereoReport::new(&rig, None).to_string();
        for section in ["Rotation matrix:", "Translation vector:", "Essential matrix:", "Fundamental matrix:"] {
            assert!(text.contains(section), "missing {section}");
        }
        assert!(text.contains("[-60.000000, 0.000000, 0.000000]"));
        assert!(text.contains("Pose cross-check: not available"));
    }

    #[test]
    fn stereo_text_with_camera2_only_cross_check() {
        let cam = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Distortion::default());
        let rig = StereoRig::from_extrinsics(
            cam,
            cam,
            Pose::from_rvec_tvec(Vector3::zeros(), Vector3::new(-60.0, 0.0, 0.0)),
        );
        let board = Pose::from_rvec_tvec(Vector3::zeros(), Vector3::new(340.0, 10.0, 900.0));
        let outcome = CrossCheckOutcome {
            pose1: None,
            pose2: PoseEstimate {
                pose: board,
                rms: 0.05,
                report: calibration(true).report,
            },
            check: stereo_calib_solve::cross_check_camera2(&rig, &board),
        };

        let report = StereoReport::new(&rig, Some(&outcome));
        let cc = report.cross_check.as_ref().expect("summary");
        assert_eq!(cc.check.mode, CrossCheckMode::Camera2Only);
        assert!(cc.rvec1.is_none() && cc.rms1.is_none());

        let text = report.to_string();
        assert!(text.contains("Pose cross-check (camera 2 only):"));
        assert!(text.contains("t2 - T: [400.000000, 10.000000, 900.000000]"));
        assert!(!text.contains("camera 1 board pose"));
        assert!(!text.contains("rotation error"));

        let json = serde_json::to_string(&report).expect("json");
        assert!(json.contains("\"camera2_only\""));
    }

    #[test]
    fn source_name_ignores_trailing_separator() {
        assert_eq!(source_name(Path::new("data/left/")), "left");
        assert_eq!(source_name(Path::new("right")), "right");
    }
}
