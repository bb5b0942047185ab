use std::io::Write;

use crate::host::config::ConfigFile;
use crate::host::stock::{FAN_CLASS, TOOLHEAD_CLASS};
use crate::kernel::bootstrap::Application;
use crate::kernel::constants::KAPUCHIN_SECTION;
use crate::kernel::error::Error;

const MINIMAL_CFG: &str = "[printer]\nmax_velocity: 250\nmax_accel: 2500\n";

#[test]
fn test_application_new_registers_stock_host() {
    let app = Application::new();
    assert!(!app.is_started());
    assert!(app.printer().class(TOOLHEAD_CLASS).is_ok());
    assert!(app.printer().class(FAN_CLASS).is_ok());
}

#[test]
fn test_application_start_and_gcode() {
    let mut app = Application::default();
    app.start(ConfigFile::parse(MINIMAL_CFG).unwrap()).expect("Failed to start application");
    assert!(app.is_started());

    let responses = app.run_gcode("SET_VELOCITY_LIMIT VELOCITY=100").expect("Command should run");
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("max_velocity: 100.000000"));

    let status = app.status();
    assert_eq!(status["toolhead"]["max_velocity"], 100.0);
    assert!(!status.contains_key(KAPUCHIN_SECTION));
}

#[test]
fn test_application_starts_once() {
    let mut app = Application::new();
    app.start(ConfigFile::parse(MINIMAL_CFG).unwrap()).unwrap();
    let second = app.start(ConfigFile::parse(MINIMAL_CFG).unwrap());
    assert!(matches!(second, Err(Error::Other(message)) if message.contains("already started")));
}

#[test]
fn test_application_start_failure_is_host_error() {
    let mut app = Application::new();
    let result = app.start(ConfigFile::parse("[unknown_thing]\nvalue: 1\n").unwrap());
    assert!(matches!(result, Err(Error::Host(_))));
    assert!(!app.is_started());
}

#[test]
fn test_application_start_from_path() {
    let dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("printer.cfg");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(MINIMAL_CFG.as_bytes()).unwrap();

    let mut app = Application::new();
    app.start_from_path(&path).expect("Failed to start from path");
    assert!(app.printer().lookup_object("toolhead").is_some());

    let mut missing = Application::new();
    assert!(missing.start_from_path(&dir.path().join("absent.cfg")).is_err());
}

#[test]
fn test_application_activates_kapuchin() {
    let mut app = Application::new();
    let text = format!("{}[{}]\nfreeze_registry: False\n", MINIMAL_CFG, KAPUCHIN_SECTION);
    app.start(ConfigFile::parse(&text).unwrap()).expect("Failed to start with kapuchin");

    let status = app.status();
    assert_eq!(status[KAPUCHIN_SECTION]["installed"], true);
    assert_eq!(status[KAPUCHIN_SECTION]["patches_loaded"], true);
    assert_eq!(status["kapuchin_manager"]["loaded"], serde_json::json!([]));
}
