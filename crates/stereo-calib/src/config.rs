//! JSON configuration for calibration runs.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use stereo_calib_chessboard::ChessboardParams;
use stereo_calib_core::{ChessboardPattern, ImageSize, RegionOfInterest, SensorSize, TermCriteria};
use stereo_calib_solve::MonoOptions;

/// Failure to read or write a JSON file.
#[derive(thiserror::Error, Debug)]
pub enum JsonIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Which camera of the rig a setting applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraId {
    First,
    Second,
}

impl CameraId {
    pub fn label(self) -> &'static str {
        match self {
            CameraId::First => "camera 1",
            CameraId::Second => "camera 2",
        }
    }
}

/// Per-camera inputs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory with this camera's mono calibration images.
    pub images: Option<PathBuf>,
    /// Frame used for the stereo step.
    pub stereo_image: Option<PathBuf>,
    /// Board search window for the mono images; `None` searches the full
    /// frame.
    pub roi: Option<RegionOfInterest>,
    /// Board search window for `stereo_image` only, e.g. to pick one of two
    /// boards in the frame.
    pub stereo_roi: Option<RegionOfInterest>,
}

/// Optional second board used to cross-check the stereo extrinsics.
///
/// Unset fields fall back to the main pattern and the per-camera stereo ROI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossCheckConfig {
    pub pattern: Option<ChessboardPattern>,
    pub camera1_roi: Option<RegionOfInterest>,
    pub camera2_roi: Option<RegionOfInterest>,
}

fn default_sensor() -> SensorSize {
    SensorSize::new(5.2, 3.88)
}

/// Everything a calibration run needs; nothing is embedded in the solvers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    pub pattern: ChessboardPattern,
    /// Physical sensor size (mm) for the derived camera values.
    pub sensor: SensorSize,
    pub criteria: TermCriteria,
    /// Expected image size; taken from the first readable image when unset.
    pub image_size: Option<ImageSize>,
    /// Use the 4-coefficient distortion model.
    pub fix_k3: bool,
    pub detector: ChessboardParams,
    pub camera1: CameraConfig,
    pub camera2: CameraConfig,
    pub cross_check: Option<CrossCheckConfig>,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            pattern: ChessboardPattern::default(),
            sensor: default_sensor(),
            criteria: TermCriteria::default(),
            image_size: None,
            fix_k3: false,
            detector: ChessboardParams::default(),
            camera1: CameraConfig::default(),
            camera2: CameraConfig::default(),
            cross_check: None,
        }
    }
}

/// Inputs of one directory calibration, resolved from [`CalibConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct MonoSettings {
    pub pattern: ChessboardPattern,
    pub detector: ChessboardParams,
    pub options: MonoOptions,
    pub image_size: Option<ImageSize>,
    pub roi: Option<RegionOfInterest>,
    pub sensor: SensorSize,
}

impl CalibConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, JsonIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), JsonIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn camera(&self, id: CameraId) -> &CameraConfig {
        match id {
            CameraId::First => &self.camera1,
            CameraId::Second => &self.camera2,
        }
    }

    pub fn mono_settings(&self, id: CameraId) -> MonoSettings {
        MonoSettings {
            pattern: self.pattern,
            detector: self.detector.clone(),
            options: MonoOptions {
                criteria: self.criteria,
                fix_k3: self.fix_k3,
            },
            image_size: self.image_size,
            roi: self.camera(id).roi,
            sensor: self.sensor,
        }
    }

    /// Board used for the pose cross-check.
    pub fn cross_check_pattern(&self) -> ChessboardPattern {
        self.cross_check
            .as_ref()
            .and_then(|c| c.pattern)
            .unwrap_or(self.pattern)
    }

    /// Search window for the main board in the stereo frame of camera `id`.
    pub fn stereo_roi(&self, id: CameraId) -> Option<RegionOfInterest> {
        self.camera(id).stereo_roi
    }

    /// Search window for the cross-check board in the stereo frame of
    /// camera `id`.
    pub fn cross_check_roi(&self, id: CameraId) -> Option<RegionOfInterest> {
        let own = self.cross_check.as_ref().and_then(|c| match id {
            CameraId::First => c.camera1_roi,
            CameraId::Second => c.camera2_roi,
        });
        own.or(self.stereo_roi(id))
    }
}
