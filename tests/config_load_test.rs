//! Integration tests for layered configuration loading.
//!
//! `Settings::load` reads `FUSION_DAQ_`-prefixed environment variables, so
//! every test here runs serialized; a parallel sibling would observe the
//! variables another test set.

use fusion_daq::config::Settings;
use fusion_daq::registers::OutputDataRate;
use serial_test::serial;
use std::fs;

#[test]
#[serial]
fn test_file_overrides_merge_over_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fusion-daq.toml");
    fs::write(
        &path,
        r#"
        [device]
        odr_hz = 40.0

        [sampling]
        fusion_hz = 25
    "#,
    )
    .expect("write config");

    let settings = Settings::load(Some(path)).expect("load");
    assert_eq!(settings.sampling.fusion_hz, 25);
    assert_eq!(settings.device.odr_hz, 40.0);
    // Sections the file does not mention keep their defaults.
    assert_eq!(settings.device.bus_address, 0x1E);
    assert_eq!(settings.application.log_level, "info");
    // The requested rate maps onto the discrete device rate grid.
    assert_eq!(settings.rate(), OutputDataRate::Hz50);
}

#[test]
#[serial]
fn test_invalid_file_values_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fusion-daq.toml");
    fs::write(&path, "[sampling]\nfusion_hz = 0\n").expect("write config");

    let err = Settings::load(Some(path)).expect_err("invalid rate");
    assert!(format!("{err:#}").contains("fusion_hz"));
}

#[test]
#[serial]
fn test_environment_overrides_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fusion-daq.toml");
    fs::write(&path, "[buffers]\naccel = 48\n").expect("write config");

    std::env::set_var("FUSION_DAQ_BUFFERS__ACCEL", "64");
    let settings = Settings::load(Some(path));
    std::env::remove_var("FUSION_DAQ_BUFFERS__ACCEL");

    assert_eq!(settings.expect("load").buffers.accel, 64);
}

#[test]
#[serial]
fn test_telemetry_endpoint_can_be_disabled_by_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fusion-daq.toml");
    fs::write(&path, "[telemetry]\nenabled = false\n").expect("write config");

    let settings = Settings::load(Some(path)).expect("load");
    assert!(!settings.telemetry.enabled);
    // The address keeps its default for a later re-enable.
    assert_eq!(settings.telemetry.listen, "127.0.0.1:2323");
}

#[test]
#[serial]
fn test_telemetry_endpoint_can_be_disabled_by_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("does-not-exist.toml");

    std::env::set_var("FUSION_DAQ_TELEMETRY__ENABLED", "false");
    let settings = Settings::load(Some(path));
    std::env::remove_var("FUSION_DAQ_TELEMETRY__ENABLED");

    assert!(!settings.expect("load").telemetry.enabled);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("does-not-exist.toml");

    let settings = Settings::load(Some(path)).expect("load defaults");
    assert_eq!(settings.sampling.fusion_hz, 40);
    assert!(settings.telemetry.enabled);
    assert_eq!(settings.telemetry.listen, "127.0.0.1:2323");
    assert!(settings.telemetry.stream);
}
