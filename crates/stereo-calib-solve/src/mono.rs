//! Single-camera calibration from planar board views.

use crate::lm::{LmBackend, NllsProblem, SolveOptions, SolveReport};
use crate::planar_pose::pose_from_homography;
use crate::reprojection::{
    ensure_finite, ensure_planar, intrinsics_dim, intrinsics_from_slice, intrinsics_to_vec,
    pose_from_slice, pose_to_slice, reproject, rms, squared_error, write_residuals, POSE_DIM,
};
use crate::zhang::initial_camera_matrix;
use log::{debug, info, warn};
use nalgebra::{DVector, Matrix3, Point2};
use serde::{Deserialize, Serialize};
use stereo_calib_core::{
    estimate_homography, CalibError, CalibResult, CameraIntrinsics, Correspondence, Distortion,
    ImageSize, Pose, TermCriteria,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum number of board views for a mono calibration.
pub const MIN_VIEWS: usize = 3;
/// Minimum number of points per view.
pub const MIN_POINTS_PER_VIEW: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonoOptions {
    pub criteria: TermCriteria,
    /// Use the 4-coefficient distortion model (`k3` fixed at zero).
    pub fix_k3: bool,
}

/// Result of [`MonoCalibrator::calibrate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonoCalibration {
    /// RMS reprojection error over all points, in pixels.
    pub rms: f64,
    /// RMS reprojection error per view, in input order.
    pub per_view_rms: Vec<f64>,
    pub intrinsics: CameraIntrinsics,
    /// Board → camera pose per view, in input order.
    pub poses: Vec<Pose>,
    pub image_size: ImageSize,
    pub report: SolveReport,
}

impl MonoCalibration {
    /// Project the board of `view` through the calibrated camera and the pose
    /// of view `view_idx`.
    pub fn reproject(&self, view_idx: usize, view: &Correspondence) -> Option<Vec<Point2<f64>>> {
        self.poses
            .get(view_idx)
            .map(|pose| reproject(&self.intrinsics, pose, view))
    }
}

struct MonoProblem<'a> {
    views: &'a [Correspondence],
    with_k3: bool,
    n_residuals: usize,
}

impl MonoProblem<'_> {
    fn intr_dim(&self) -> usize {
        intrinsics_dim(self.with_k3)
    }
}

impl NllsProblem for MonoProblem<'_> {
    fn num_params(&self) -> usize {
        self.intr_dim() + POSE_DIM * self.views.len()
    }

    fn num_residuals(&self) -> usize {
        self.n_residuals
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let x = x.as_slice();
        let nk = self.intr_dim();
        let intr = intrinsics_from_slice(&x[..nk], self.with_k3);

        let mut r = DVector::zeros(self.n_residuals);
        let out = r.as_mut_slice();
        let mut offset = 0;
        for (i, view) in self.views.iter().enumerate() {
            let pose = pose_from_slice(&x[nk + POSE_DIM * i..nk + POSE_DIM * (i + 1)]);
            let n = 2 * view.len();
            write_residuals(&intr, &pose, view, &mut out[offset..offset + n]);
            offset += n;
        }
        r
    }
}

/// Zhang initialization followed by joint Levenberg–Marquardt refinement of
/// intrinsics, distortion and all view poses.
#[derive(Clone, Debug, Default)]
pub struct MonoCalibrator {
    pub options: MonoOptions,
}

impl MonoCalibrator {
    pub fn new(options: MonoOptions) -> Self {
        Self { options }
    }

    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(views = views.len())))]
    pub fn calibrate(
        &self,
        views: &[Correspondence],
        image_size: ImageSize,
    ) -> CalibResult<MonoCalibration> {
        validate_views(views, image_size)?;
        let with_k3 = !self.options.fix_k3;

        let hmtxs = views
            .iter()
            .map(board_homography)
            .collect::<CalibResult<Vec<_>>>()?;
        let kmtx = initial_camera_matrix(&hmtxs, image_size)?;
        debug!(
            "initial camera matrix: fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
            kmtx[(0, 0)],
            kmtx[(1, 1)],
            kmtx[(0, 2)],
            kmtx[(1, 2)]
        );
        let initial = CameraIntrinsics::from_k_matrix(&kmtx, initial_distortion(with_k3));

        let mut x0 = intrinsics_to_vec(&initial, with_k3);
        let nk = x0.len();
        x0.resize(nk + POSE_DIM * views.len(), 0.0);
        for (i, hmtx) in hmtxs.iter().enumerate() {
            let pose = pose_from_homography(&kmtx, hmtx)?;
            pose_to_slice(&pose, &mut x0[nk + POSE_DIM * i..nk + POSE_DIM * (i + 1)]);
        }

        let problem = MonoProblem {
            views,
            with_k3,
            n_residuals: views.iter().map(|v| 2 * v.len()).sum(),
        };
        let (x, report) = LmBackend.solve(
            &problem,
            DVector::from_vec(x0),
            &SolveOptions::from_criteria(&self.options.criteria),
        );

        let x = x.as_slice();
        let intrinsics = intrinsics_from_slice(&x[..nk], with_k3);
        if !intrinsics.is_finite() || intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
            return Err(CalibError::DegenerateGeometry(
                "optimization produced an invalid camera matrix",
            ));
        }
        let poses: Vec<Pose> = (0..views.len())
            .map(|i| pose_from_slice(&x[nk + POSE_DIM * i..nk + POSE_DIM * (i + 1)]))
            .collect();

        let mut total_sq = 0.0;
        let mut total_n = 0;
        let per_view_rms = views
            .iter()
            .zip(&poses)
            .map(|(view, pose)| {
                let (sq, n) = squared_error(&intrinsics, pose, view);
                total_sq += sq;
                total_n += n;
                rms(sq, n)
            })
            .collect();
        let rms = rms(total_sq, total_n);

        if !report.converged {
            warn!(
                "mono calibration did not converge ({}); rms {rms:.4} px",
                report.termination
            );
        }
        info!(
            "mono calibration: {} views, rms {rms:.4} px, fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
            views.len(),
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy
        );

        Ok(MonoCalibration {
            rms,
            per_view_rms,
            intrinsics,
            poses,
            image_size,
            report,
        })
    }
}

fn initial_distortion(with_k3: bool) -> Distortion {
    Distortion {
        k3: with_k3.then_some(0.0),
        ..Distortion::default()
    }
}

fn validate_views(views: &[Correspondence], image_size: ImageSize) -> CalibResult<()> {
    if views.len() < MIN_VIEWS {
        return Err(CalibError::InsufficientData {
            what: "calibration views",
            got: views.len(),
            need: MIN_VIEWS,
        });
    }
    if image_size.width == 0 || image_size.height == 0 {
        return Err(CalibError::InputMismatch(format!(
            "invalid image size {image_size}"
        )));
    }
    for view in views {
        if view.len() < MIN_POINTS_PER_VIEW {
            return Err(CalibError::InsufficientData {
                what: "points per calibration view",
                got: view.len(),
                need: MIN_POINTS_PER_VIEW,
            });
        }
        ensure_finite(view)?;
        ensure_planar(view)?;
    }
    Ok(())
}

/// Board plane → pixel homography of one view.
pub(crate) fn board_homography(view: &Correspondence) -> CalibResult<Matrix3<f64>> {
    let board: Vec<Point2<f64>> = view
        .object_points()
        .iter()
        .map(|p| Point2::new(p.x, p.y))
        .collect();
    estimate_homography(&board, view.image_points())
        .map(|h| h.h)
        .ok_or(CalibError::DegenerateGeometry(
            "board points do not define a homography",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn square_view(offset: f64) -> Correspondence {
        Correspondence::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![
                Point2::new(offset, offset),
                Point2::new(offset + 10.0, offset),
                Point2::new(offset + 10.0, offset + 10.0),
                Point2::new(offset, offset + 10.0),
            ],
        )
        .expect("view")
    }

    const SIZE: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    #[test]
    fn needs_three_views() {
        let views = vec![square_view(0.0), square_view(5.0)];
        assert!(matches!(
            MonoCalibrator::default().calibrate(&views, SIZE),
            Err(CalibError::InsufficientData { got: 2, need: 3, .. })
        ));
        assert!(matches!(
            MonoCalibrator::default().calibrate(&[], SIZE),
            Err(CalibError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn rejects_short_views() {
        let short = Correspondence::from_parts(
            vec![Point3::origin(); 3],
            vec![Point2::origin(); 3],
        )
        .expect("view");
        let views = vec![square_view(0.0), square_view(5.0), short];
        assert!(matches!(
            MonoCalibrator::default().calibrate(&views, SIZE),
            Err(CalibError::InsufficientData { got: 3, need: 4, .. })
        ));
    }

    #[test]
    fn rejects_non_finite_observations() {
        let mut bad = square_view(0.0).image_points().to_vec();
        bad[2].x = f64::NAN;
        let bad = Correspondence::from_parts(square_view(0.0).object_points().to_vec(), bad)
            .expect("view");
        let views = vec![square_view(0.0), square_view(5.0), bad];
        assert!(matches!(
            MonoCalibrator::default().calibrate(&views, SIZE),
            Err(CalibError::InputMismatch(_))
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: MonoOptions = serde_json::from_str(r#"{"fix_k3": true}"#).expect("json");
        assert!(opts.fix_k3);
        assert_eq!(opts.criteria, TermCriteria::default());
    }
}
