#![cfg(feature = "image")]

use nalgebra::{Rotation3, Vector3};
use std::path::Path;
use stereo_calib::config::{CalibConfig, CameraId, CrossCheckConfig};
use stereo_calib::core::synthetic::{orbit_poses, render_chessboard, render_chessboards};
use stereo_calib::core::GrayImage;
use stereo_calib::pipeline::{calibrate_directory, calibrate_stereo_pair, PipelineError};
use stereo_calib::report::CalibratedCamera;
use stereo_calib::solve::CrossCheckMode;
use stereo_calib::{
    CalibError, CameraIntrinsics, ChessboardPattern, ImageSize, Pose, RegionOfInterest,
};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn camera() -> CameraIntrinsics {
    CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Default::default())
}

fn calibrated() -> CalibratedCamera {
    CalibratedCamera {
        intrinsics: camera(),
        image_size: SIZE,
    }
}

fn save_gray(path: &Path, frame: GrayImage) {
    image::GrayImage::from_raw(frame.width as u32, frame.height as u32, frame.data)
        .expect("buffer")
        .save(path)
        .expect("save png");
}

fn write_png(path: &Path, pattern: &ChessboardPattern, cam: &CameraIntrinsics, pose: &Pose) {
    save_gray(path, render_chessboard(pattern, cam, pose, SIZE, 2));
}

/// Board pose that puts the board centre at `centre` in camera coordinates.
fn board_at(pattern: &ChessboardPattern, rotation: Rotation3<f64>, centre: Vector3<f64>) -> Pose {
    let s = pattern.square_size();
    let board_centre = Vector3::new(
        (pattern.cols() - 1) as f64 * s * 0.5,
        (pattern.rows() - 1) as f64 * s * 0.5,
        0.0,
    );
    Pose::new(rotation, centre - rotation * board_centre)
}

fn write_blank(path: &Path, width: u32, height: u32) {
    image::GrayImage::from_pixel(width, height, image::Luma([200u8]))
        .save(path)
        .expect("save png");
}

#[test]
fn directory_calibration_excludes_bad_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pattern = ChessboardPattern::default();
    for (idx, pose) in orbit_poses(&pattern, 6, 600.0).iter().enumerate() {
        write_png(&dir.path().join(format!("view_{idx:02}.png")), &pattern, &camera(), pose);
    }
    write_blank(&dir.path().join("view_98_blank.png"), SIZE.width, SIZE.height);
    std::fs::write(dir.path().join("view_99_notes.txt"), "not an image").expect("write");

    let config = CalibConfig::default();
    let run = calibrate_directory(dir.path(), &config.mono_settings(CameraId::First))
        .expect("calibration");

    assert_eq!(run.image_names.len(), 6);
    assert_eq!(run.image_names[0], "view_00.png");
    let excluded: Vec<&str> = run.excluded.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(excluded, ["view_98_blank.png", "view_99_notes.txt"]);

    let intr = run.calibration.intrinsics;
    assert!((intr.fx - 800.0).abs() < 8.0, "fx {}", intr.fx);
    assert!((intr.fy - 800.0).abs() < 8.0, "fy {}", intr.fy);
    assert!((intr.cx - 320.0).abs() < 3.2, "cx {}", intr.cx);
    assert!((intr.cy - 240.0).abs() < 2.4, "cy {}", intr.cy);
    assert!(run.calibration.rms < 1.0, "rms {}", run.calibration.rms);
    assert_eq!(run.calibration.image_size, SIZE);
}

#[test]
fn directory_without_boards_is_insufficient_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    for idx in 0..3 {
        write_blank(&dir.path().join(format!("blank_{idx}.png")), 320, 240);
    }
    let err = calibrate_directory(dir.path(), &CalibConfig::default().mono_settings(CameraId::First))
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Calib(CalibError::InsufficientData { got: 0, .. })),
        "{err:?}"
    );

    let empty = tempfile::tempdir().expect("tempdir");
    let err = calibrate_directory(empty.path(), &CalibConfig::default().mono_settings(CameraId::First))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Calib(CalibError::InsufficientData { got: 0, .. })
    ));
}

#[test]
fn image_size_mismatch_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_blank(&dir.path().join("a.png"), 320, 240);
    write_blank(&dir.path().join("b.png"), 240, 320);

    let err = calibrate_directory(dir.path(), &CalibConfig::default().mono_settings(CameraId::First))
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Calib(CalibError::InputMismatch(_))),
        "{err:?}"
    );

    let mut config = CalibConfig::default();
    config.image_size = Some(SIZE);
    let err = calibrate_directory(dir.path(), &config.mono_settings(CameraId::First)).unwrap_err();
    assert!(matches!(err, PipelineError::Calib(CalibError::InputMismatch(_))));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = calibrate_directory(
        dir.path().join("missing"),
        &CalibConfig::default().mono_settings(CameraId::First),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
}

#[test]
fn stereo_pair_recovers_extrinsics_and_cross_checks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pattern = ChessboardPattern::default();
    let board = orbit_poses(&pattern, 5, 620.0)[1];
    let rel = Pose::new(
        Rotation3::from_euler_angles(0.0, -0.05, 0.0),
        Vector3::new(-60.0, 0.0, 0.0),
    );
    let path1 = dir.path().join("left.png");
    let path2 = dir.path().join("right.png");
    write_png(&path1, &pattern, &camera(), &board);
    write_png(&path2, &pattern, &camera(), &rel.compose(&board));

    let config = CalibConfig::default();
    let run = calibrate_stereo_pair(&path1, &path2, &calibrated(), &calibrated(), &config)
        .expect("stereo");

    assert!(
        (run.rig.extrinsics.translation - rel.translation).norm() < 2.0,
        "T {:?}",
        run.rig.extrinsics.translation
    );
    assert!(run.rig.extrinsics.rotation_angle_to(&rel).to_degrees() < 0.5);
    assert!(run.rig.rms < 0.5, "rms {}", run.rig.rms);

    let cross = run.cross_check.expect("cross-check");
    assert_eq!(cross.check.mode, CrossCheckMode::BothCameras);
    let residual = cross.check.translation_residual.expect("residual");
    assert!(residual.norm() < 2.0, "{:?}", cross.check);
    assert!(cross.check.rotation_error_deg.expect("rotation error") < 0.5);
}

#[test]
fn stereo_pair_without_board_is_detection_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pattern = ChessboardPattern::default();
    let board = orbit_poses(&pattern, 5, 620.0)[0];
    let path1 = dir.path().join("left.png");
    let path2 = dir.path().join("right.png");
    write_png(&path1, &pattern, &camera(), &board);
    write_blank(&path2, SIZE.width, SIZE.height);

    let config = CalibConfig::default();
    let err = calibrate_stereo_pair(&path1, &path2, &calibrated(), &calibrated(), &config)
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Calib(CalibError::DetectionFailure { ref image }) if image == "right.png"),
        "{err:?}"
    );
}

#[test]
fn stereo_roi_leaves_mono_views_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pattern = ChessboardPattern::default();
    for (idx, pose) in orbit_poses(&pattern, 5, 600.0).iter().enumerate() {
        write_png(&dir.path().join(format!("view_{idx:02}.png")), &pattern, &camera(), pose);
    }

    let mut config = CalibConfig::default();
    config.camera1.stereo_roi = Some(RegionOfInterest::new(0, 0, 100, 100));
    let run = calibrate_directory(dir.path(), &config.mono_settings(CameraId::First))
        .expect("calibration");
    assert_eq!(run.image_names.len(), 5);
    assert!(run.excluded.is_empty());
}

#[test]
fn stereo_pair_must_match_calibrated_image_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pattern = ChessboardPattern::default();
    let board = orbit_poses(&pattern, 5, 620.0)[0];
    let path1 = dir.path().join("left.png");
    let path2 = dir.path().join("right.png");
    write_png(&path1, &pattern, &camera(), &board);
    write_png(&path2, &pattern, &camera(), &board);

    let wide = CalibratedCamera {
        intrinsics: camera(),
        image_size: ImageSize::new(1280, 720),
    };
    let err = calibrate_stereo_pair(&path1, &path2, &calibrated(), &wide, &CalibConfig::default())
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Calib(CalibError::InputMismatch(ref msg)) if msg.contains("right.png")),
        "{err:?}"
    );
}

#[test]
fn cross_check_board_seen_by_camera2_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let size = ImageSize::new(1280, 480);
    let cam = CameraIntrinsics::new(800.0, 800.0, 640.0, 240.0, Default::default());
    let pattern = ChessboardPattern::default();
    let second = ChessboardPattern::new(7, 5, 30.0).expect("pattern");

    let board1 = board_at(
        &pattern,
        Rotation3::from_scaled_axis(Vector3::new(0.1, 0.12, 0.0)),
        Vector3::new(-330.0, 0.0, 900.0),
    );
    let rel = Pose::new(
        Rotation3::from_euler_angles(0.0, -0.05, 0.0),
        Vector3::new(-60.0, 0.0, 0.0),
    );
    let second_pose = board_at(
        &second,
        Rotation3::from_scaled_axis(Vector3::new(-0.1, -0.1, 0.05)),
        Vector3::new(330.0, 10.0, 900.0),
    );

    let path1 = dir.path().join("left.png");
    let path2 = dir.path().join("right.png");
    save_gray(&path1, render_chessboard(&pattern, &cam, &board1, size, 2));
    save_gray(
        &path2,
        render_chessboards(
            &[(pattern, rel.compose(&board1)), (second, second_pose)],
            &cam,
            size,
            2,
        ),
    );

    let left_half = RegionOfInterest::new(0, 0, 640, 480);
    let right_half = RegionOfInterest::new(640, 0, 640, 480);
    let mut config = CalibConfig::default();
    config.camera1.stereo_roi = Some(left_half);
    config.camera2.stereo_roi = Some(left_half);
    config.cross_check = Some(CrossCheckConfig {
        pattern: Some(second),
        camera1_roi: Some(right_half),
        camera2_roi: Some(right_half),
    });

    let calibrated = CalibratedCamera {
        intrinsics: cam,
        image_size: size,
    };
    let run = calibrate_stereo_pair(&path1, &path2, &calibrated, &calibrated, &config)
        .expect("stereo");
    assert!(
        (run.rig.extrinsics.translation - rel.translation).norm() < 3.0,
        "T {:?}",
        run.rig.extrinsics.translation
    );

    let cross = run.cross_check.expect("cross-check");
    assert_eq!(cross.check.mode, CrossCheckMode::Camera2Only);
    assert!(cross.pose1.is_none());
    assert!(cross.check.translation_residual.is_none());
    assert!(cross.check.rotation_error_deg.is_none());
    let expected = second_pose.translation - rel.translation;
    let err = (cross.check.raw_translation_difference - expected).norm();
    assert!(err < 5.0, "t2 - T off by {err:.3}: {:?}", cross.check);
}
