//! Physical quantities derived from a calibrated camera matrix.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use stereo_calib_core::{CameraIntrinsics, ImageSize, SensorSize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMatrixValues {
    /// Horizontal field of view, degrees.
    pub fovx: f64,
    /// Vertical field of view, degrees.
    pub fovy: f64,
    /// Focal length in sensor units (mm).
    pub focal_length: f64,
    /// Principal point in sensor units (mm).
    pub principal_point: Point2<f64>,
    /// `fy / fx`.
    pub aspect_ratio: f64,
}

/// Field of view, focal length and principal point in sensor units.
///
/// A zero sensor dimension falls back to pixel units (`1` pixel per unit
/// horizontally, `fy / fx` vertically).
pub fn calibration_matrix_values(
    intrinsics: &CameraIntrinsics,
    image_size: ImageSize,
    sensor: SensorSize,
) -> CalibrationMatrixValues {
    let width = image_size.width as f64;
    let height = image_size.height as f64;
    let aspect_ratio = intrinsics.fy / intrinsics.fx;

    let (mx, my) = if sensor.width != 0.0 && sensor.height != 0.0 {
        (width / sensor.width, height / sensor.height)
    } else {
        (1.0, aspect_ratio)
    };

    let fovx = (intrinsics.cx.atan2(intrinsics.fx) + (width - intrinsics.cx).atan2(intrinsics.fx))
        .to_degrees();
    let fovy = (intrinsics.cy.atan2(intrinsics.fy) + (height - intrinsics.cy).atan2(intrinsics.fy))
        .to_degrees();

    CalibrationMatrixValues {
        fovx,
        fovy,
        focal_length: intrinsics.fx / mx,
        principal_point: Point2::new(intrinsics.cx / mx, intrinsics.cy / my),
        aspect_ratio,
    }
}
