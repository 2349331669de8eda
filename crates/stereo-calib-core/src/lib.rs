//! Core types for checkerboard camera calibration.
//!
//! This crate is purely geometric: board model, image buffers and search
//! windows, correspondences, camera intrinsics, rigid poses, the homography
//! DLT and the shared error type. It does not depend on any corner detector
//! or optimizer.

mod camera;
mod correspondence;
mod corner;
mod criteria;
mod error;
mod grid_alignment;
mod homography;
mod image;
mod logger;
mod pattern;
mod pose;
pub mod synthetic;

pub use camera::{CameraIntrinsics, Distortion, SensorSize};
pub use corner::Corner;
pub use correspondence::Correspondence;
pub use criteria::TermCriteria;
pub use error::{CalibError, CalibResult};
pub use grid_alignment::{GridTransform, GRID_TRANSFORMS_D4};
pub use homography::{estimate_homography, Homography};
pub use image::{
    sample_bilinear, validate_image_sizes, CalibrationImage, GrayImage, GrayImageView, ImageSize,
    RegionOfInterest,
};
pub use pattern::{object_grid, ChessboardPattern, ObjectPointGrid};
pub use pose::Pose;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
