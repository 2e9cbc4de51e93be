//! Config file loading and command-line precedence
use std::fs;

use clap::Parser;
use gcode_dispatch::config::{Args, Config};
use tempfile::TempDir;

fn write_config(dir: &TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, text).expect("write config");
    path
}

#[test]
fn explicit_config_file_is_loaded() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, "grbl_mode = true\necho = true\nlog_level = \"debug\"\n");

    let args = Args::try_parse_from(["gcode-console", "--config", path.to_str().unwrap()]).unwrap();
    let config = Config::from_args(args).expect("load config");

    assert!(config.grbl_mode);
    assert!(config.echo);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
}

#[test]
fn command_line_overrides_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, "log_level = \"warn\"\n");

    let args = Args {
        config: Some(path),
        grbl: true,
        log_level: Some("trace".to_string()),
        ..Args::default()
    };
    let config = Config::from_args(args).expect("load config");

    assert!(config.grbl_mode);
    assert!(!config.echo);
    assert_eq!(config.log_level, "trace");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let args = Args {
        config: Some(dir.path().join("absent.toml")),
        ..Args::default()
    };
    let err = Config::from_args(args).unwrap_err();
    assert!(format!("{err:#}").contains("reading config file"));
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, "grbl_mode = true\nbaud = 115200\n");

    let err = Config::load_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("parsing config file"));
}

#[test]
fn input_path_is_passed_through() {
    let dir = TempDir::new().expect("tempdir");
    // an empty explicit file keeps the test independent of the user's config
    let path = write_config(&dir, "");

    let args = Args::try_parse_from([
        "gcode-console",
        "--input",
        "part.gcode",
        "--echo",
        "--config",
        path.to_str().unwrap(),
    ])
    .unwrap();
    let config = Config::from_args(args).expect("load config");

    assert_eq!(config.input.as_deref(), Some(std::path::Path::new("part.gcode")));
    assert!(config.echo);
    assert!(!config.grbl_mode);
    assert_eq!(config.log_level, "info");
}
