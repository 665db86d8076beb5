//! Integration tests for the scope-acquire binary
//!
//! Run with: cargo test -p scope-bin --test cli

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const RUN_FILE: &str = r#"
[application]
log_level = "warn"

[acquisition]
stabilization_x_ms = 0
stabilization_y_ms = 0
stabilization_z_ms = 0
piezo_delay_ms = 0

[simulation]
camera_width = 16
camera_height = 16
serpentine = false

[[simulation.regions]]
name = "C3"
center_x_mm = 5.0
center_y_mm = 5.0
center_z_mm = 1.0
nx = 2
ny = 1
dx_mm = 0.5

[experiment]
name = "cli test"
nz = 2
delta_z_um = 2.0
"#;

fn write_run_file(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("run.toml");
    std::fs::write(&path, RUN_FILE).unwrap();
    path
}

fn scope_acquire() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scope-acquire"))
}

#[test]
fn test_help_lists_subcommands() {
    let output = scope_acquire().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("plan"));
}

#[test]
fn test_plan_prints_image_count() {
    let dir = TempDir::new().unwrap();
    let config = write_run_file(dir.path());

    let output = scope_acquire()
        .args(["plan", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("C3"), "{}", stdout);
    assert!(stdout.contains("FOVs:         2"), "{}", stdout);
    assert!(stdout.contains("Images:       4"), "{}", stdout);
}

#[test]
fn test_run_writes_experiment() {
    let dir = TempDir::new().unwrap();
    let config = write_run_file(dir.path());
    let out = dir.path().join("out");

    let output = scope_acquire()
        .args(["run", "--config"])
        .arg(&config)
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", stdout);
    assert!(stdout.contains("Outcome:      completed"), "{}", stdout);
    assert!(stdout.contains("Images:       4 of 4"), "{}", stdout);

    let experiments: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(experiments.len(), 1);
    let exp = &experiments[0];
    assert!(exp
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("cli_test_"));
    let images = std::fs::read_dir(exp.join("000"))
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "tiff")
        })
        .count();
    assert_eq!(images, 4);
}

#[test]
fn test_missing_values_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let output = scope_acquire()
        .args(["plan", "--config"])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("A1"), "{}", stdout);
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[pipeline]\nworkers = 0\n").unwrap();

    let output = scope_acquire()
        .args(["plan", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("workers"), "{}", stderr);
}
