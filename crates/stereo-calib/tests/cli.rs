#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use stereo_calib::core::synthetic::{orbit_poses, render_chessboard};
use stereo_calib::report::MonoReport;
use stereo_calib::{CameraIntrinsics, ChessboardPattern, ImageSize};

fn write_views(dir: &Path, n: usize) {
    let pattern = ChessboardPattern::default();
    let cam = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Default::default());
    for (idx, pose) in orbit_poses(&pattern, n, 600.0).iter().enumerate() {
        let frame = render_chessboard(&pattern, &cam, pose, ImageSize::new(640, 480), 2);
        image::GrayImage::from_raw(frame.width as u32, frame.height as u32, frame.data)
            .expect("buffer")
            .save(dir.join(format!("img_{idx}.png")))
            .expect("save png");
    }
}

#[test]
fn mono_writes_text_and_json_reports() {
    let root = tempfile::tempdir().expect("tempdir");
    let images = root.path().join("left");
    std::fs::create_dir(&images).expect("mkdir");
    write_views(&images, 5);
    let json = root.path().join("left.json");

    Command::cargo_bin("stereo-calib")
        .expect("binary")
        .arg("mono")
        .arg(&images)
        .arg("--save")
        .arg("--out-dir")
        .arg(root.path())
        .arg("--json")
        .arg(&json)
        .arg("--log-level")
        .arg("warn")
        .assert()
        .success()
        .stdout(predicate::str::contains("Average reprojection error"))
        .stdout(predicate::str::contains("Camera intrinsic matrix:"));

    let text = std::fs::read_to_string(root.path().join("left_calibration.txt")).expect("txt");
    assert!(text.contains("Pixel aspect ratio"));
    let report = MonoReport::load_json(&json).expect("json report");
    assert_eq!(report.views.len(), 5);
    assert!(report.rms < 1.0);
}

#[test]
fn mono_on_empty_directory_fails() {
    let root = tempfile::tempdir().expect("tempdir");
    Command::cargo_bin("stereo-calib")
        .expect("binary")
        .arg("mono")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("InsufficientData"));
}

#[test]
fn missing_config_file_fails() {
    let root = tempfile::tempdir().expect("tempdir");
    Command::cargo_bin("stereo-calib")
        .expect("binary")
        .arg("--config")
        .arg(root.path().join("nope.json"))
        .arg("mono")
        .arg(root.path())
        .assert()
        .failure();
}

#[test]
fn run_requires_configured_directories() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = root.path().join("calib.json");
    std::fs::write(&config, "{}").expect("write config");
    Command::cargo_bin("stereo-calib")
        .expect("binary")
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("camera1.images"));
}
