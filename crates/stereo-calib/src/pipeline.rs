//! End-to-end runs on image files: directory → mono calibration, and a
//! synchronized image pair → stereo rig.

use crate::config::{CalibConfig, CameraId, JsonIoError, MonoSettings};
use crate::report::{CalibratedCamera, CrossCheckOutcome, ExcludedImage};
use log::{debug, info, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use stereo_calib_chessboard::ChessboardDetector;
use stereo_calib_core::{
    object_grid, validate_image_sizes, CalibError, CalibResult, CalibrationImage,
    ChessboardPattern, Correspondence, GrayImage, RegionOfInterest,
};
use stereo_calib_solve::{
    cross_check, cross_check_camera2, MonoCalibration, MonoCalibrator, PoseEstimator,
    StereoCalibrator, StereoRig, MIN_VIEWS,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the file-based pipelines.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Calib(#[from] CalibError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    JsonIo(#[from] JsonIoError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Result of [`calibrate_directory`].
#[derive(Clone, Debug)]
pub struct MonoRun {
    pub source: PathBuf,
    /// File names of the images used, in view order.
    pub image_names: Vec<String>,
    pub views: Vec<Correspondence>,
    pub calibration: MonoCalibration,
    pub excluded: Vec<ExcludedImage>,
}

/// Decode an image file to 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<GrayImage, PipelineError> {
    let img = image::ImageReader::open(path)
        .map_err(io_error(path))?
        .decode()?
        .to_luma8();
    let (width, height) = img.dimensions();
    Ok(GrayImage::from_raw(
        width as usize,
        height as usize,
        img.into_raw(),
    )?)
}

/// Regular files of `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Detect the board in every image of `dir` and calibrate the camera.
///
/// Unreadable images and images without a board are excluded and recorded.
/// Every image must have the configured size, or the size of the first
/// readable image when none is configured.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))
)]
pub fn calibrate_directory(
    dir: impl AsRef<Path>,
    settings: &MonoSettings,
) -> Result<MonoRun, PipelineError> {
    let dir = dir.as_ref();
    let detector = ChessboardDetector::new(settings.detector.clone());
    let grid = object_grid(&settings.pattern);

    let mut expected = settings.image_size;
    let mut image_names = Vec::new();
    let mut views = Vec::new();
    let mut excluded = Vec::new();

    for path in list_images(dir)? {
        let name = file_name(&path);
        let gray = match load_gray(&path) {
            Ok(gray) => gray,
            Err(err) => {
                warn!("{name}: excluded, image could not be read ({err})");
                excluded.push(ExcludedImage {
                    name,
                    reason: format!("unreadable image: {err}"),
                });
                continue;
            }
        };

        let size = gray.size();
        match expected {
            Some(expected) => validate_image_sizes(expected, [(name.as_str(), size)])?,
            None => expected = Some(size),
        }

        let image = CalibrationImage::new(name, gray).with_roi(settings.roi);
        let detection = detector.detect(&image, &settings.pattern);
        match detection.to_correspondence(&grid, &image.name) {
            Ok(view) => {
                debug!("{}: {} corners", image.name, view.len());
                image_names.push(image.name);
                views.push(view);
            }
            Err(CalibError::DetectionFailure { image: name }) => {
                warn!("{name}: excluded, chessboard not found");
                excluded.push(ExcludedImage {
                    name,
                    reason: "chessboard not found".to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        "{}: board found in {} images, {} excluded",
        dir.display(),
        views.len(),
        excluded.len()
    );

    let Some(image_size) = expected else {
        return Err(CalibError::InsufficientData {
            what: "calibration views",
            got: 0,
            need: MIN_VIEWS,
        }
        .into());
    };
    let calibration = MonoCalibrator::new(settings.options).calibrate(&views, image_size)?;

    Ok(MonoRun {
        source: dir.to_path_buf(),
        image_names,
        views,
        calibration,
        excluded,
    })
}

/// Result of [`calibrate_stereo_pair`].
#[derive(Clone, Debug)]
pub struct StereoRun {
    pub rig: StereoRig,
    pub view1: Correspondence,
    pub view2: Correspondence,
    /// `None` when the cross-check board was not found in camera 2 or its
    /// pose could not be estimated.
    pub cross_check: Option<CrossCheckOutcome>,
}

fn detect_view(
    detector: &ChessboardDetector,
    gray: &GrayImage,
    name: &str,
    pattern: &ChessboardPattern,
    roi: Option<RegionOfInterest>,
) -> Result<Correspondence, CalibError> {
    let image = CalibrationImage::new(name, gray.clone()).with_roi(roi);
    detector
        .detect(&image, pattern)
        .to_correspondence(&object_grid(pattern), name)
}

struct StereoFrame<'a> {
    gray: &'a GrayImage,
    name: &'a str,
    camera: &'a CalibratedCamera,
}

fn estimate_cross_check(
    rig: &StereoRig,
    pnp: &PoseEstimator,
    frame1: &StereoFrame<'_>,
    view1: Option<&Correspondence>,
    frame2: &StereoFrame<'_>,
    view2: &Correspondence,
) -> CalibResult<CrossCheckOutcome> {
    let pose2 = pnp.estimate(&frame2.camera.intrinsics, view2)?;
    let Some(view1) = view1 else {
        debug!("{}: cross-check board seen by camera 2 only", frame1.name);
        let check = cross_check_camera2(rig, &pose2.pose);
        return Ok(CrossCheckOutcome {
            pose1: None,
            pose2,
            check,
        });
    };
    let pose1 = pnp.estimate(&frame1.camera.intrinsics, view1)?;
    let check = cross_check(rig, &pose1.pose, &pose2.pose);
    Ok(CrossCheckOutcome {
        pose1: Some(pose1),
        pose2,
        check,
    })
}

fn run_cross_check(
    rig: &StereoRig,
    detector: &ChessboardDetector,
    frame1: &StereoFrame<'_>,
    frame2: &StereoFrame<'_>,
    main_views: (&Correspondence, &Correspondence),
    config: &CalibConfig,
) -> Option<CrossCheckOutcome> {
    let pnp = PoseEstimator::new(config.criteria);
    let outcome = if config.cross_check.is_some() {
        let pattern = config.cross_check_pattern();
        let detect = |frame: &StereoFrame<'_>, id: CameraId| {
            detect_view(detector, frame.gray, frame.name, &pattern, config.cross_check_roi(id))
        };
        let view2 = match detect(frame2, CameraId::Second) {
            Ok(view) => view,
            Err(err) => {
                warn!("pose cross-check skipped: {err}");
                return None;
            }
        };
        let view1 = detect(frame1, CameraId::First).ok();
        estimate_cross_check(rig, &pnp, frame1, view1.as_ref(), frame2, &view2)
    } else {
        estimate_cross_check(rig, &pnp, frame1, Some(main_views.0), frame2, main_views.1)
    };

    match outcome {
        Ok(outcome) => {
            let check = &outcome.check;
            info!(
                "pose cross-check ({:?}): t2 - T {:?}, translation residual {:?}, rotation error {:?} deg",
                check.mode,
                check.raw_translation_difference.as_slice(),
                check.translation_residual.map(|r| r.norm()),
                check.rotation_error_deg
            );
            Some(outcome)
        }
        Err(err) => {
            warn!("pose cross-check skipped: {err}");
            None
        }
    }
}

/// Stereo extrinsics from one synchronized image pair, followed by a pose
/// cross-check.
///
/// `cam1` and `cam2` come from earlier mono runs; both images must have the
/// size their camera was calibrated at. A board missing in either image is a
/// [`CalibError::DetectionFailure`]. The cross-check never fails the run: it
/// is `None` when its board or pose cannot be found in camera 2, and uses
/// camera 2 alone when camera 1 does not see the cross-check board.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn calibrate_stereo_pair(
    cam1_image: impl AsRef<Path>,
    cam2_image: impl AsRef<Path>,
    cam1: &CalibratedCamera,
    cam2: &CalibratedCamera,
    config: &CalibConfig,
) -> Result<StereoRun, PipelineError> {
    let (path1, path2) = (cam1_image.as_ref(), cam2_image.as_ref());
    let (name1, name2) = (file_name(path1), file_name(path2));
    let gray1 = load_gray(path1)?;
    let gray2 = load_gray(path2)?;
    if let Some(expected) = config.image_size {
        validate_image_sizes(
            expected,
            [(name1.as_str(), gray1.size()), (name2.as_str(), gray2.size())],
        )?;
    }
    validate_image_sizes(cam1.image_size, [(name1.as_str(), gray1.size())])?;
    validate_image_sizes(cam2.image_size, [(name2.as_str(), gray2.size())])?;

    let detector = ChessboardDetector::new(config.detector.clone());
    let frame1 = StereoFrame {
        gray: &gray1,
        name: &name1,
        camera: cam1,
    };
    let frame2 = StereoFrame {
        gray: &gray2,
        name: &name2,
        camera: cam2,
    };
    let view1 = detect_view(
        &detector,
        &gray1,
        &name1,
        &config.pattern,
        config.stereo_roi(CameraId::First),
    )?;
    let view2 = detect_view(
        &detector,
        &gray2,
        &name2,
        &config.pattern,
        config.stereo_roi(CameraId::Second),
    )?;

    let rig = StereoCalibrator::new(config.criteria).calibrate(
        &cam1.intrinsics,
        &view1,
        &cam2.intrinsics,
        &view2,
    )?;
    let cross_check = run_cross_check(&rig, &detector, &frame1, &frame2, (&view1, &view2), config);

    Ok(StereoRun {
        rig,
        view1,
        view2,
        cross_check,
    })
}
