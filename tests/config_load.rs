/// Integration tests for daemon config loading: default values, per-field
/// overrides, and malformed-file behavior, exercised through the crate's
/// public `config` module rather than its private `Raw*` types.
use cuebridge::config::{self, ConfigError};

#[test]
fn missing_config_file_yields_defaults() {
    let cfg = config::load_config_from_path(std::path::Path::new("/nonexistent/cuebridge.toml"))
        .expect("a missing file is not itself fatal");
    assert_eq!(cfg.network.qlab_port, config::DEFAULT_QLAB_PORT);
    assert_eq!(cfg.network.reply_port, config::DEFAULT_PI_REPLY_PORT);
    assert_eq!(cfg.naming.expected_ws_main, "show_main");
}

#[test]
fn load_config_from_path_reads_real_file() {
    let toml = r#"
        [network]
        qlab_port = 9100
        broadcast_addr = "10.0.0.255"

        [naming]
        suffix_aux1 = "_fx"

        [led]
        master_dim = 0.5
    "#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, toml.as_bytes()).unwrap();

    let cfg = config::load_config_from_path(file.path()).expect("should load from arbitrary path");
    assert_eq!(cfg.network.qlab_port, 9100);
    assert_eq!(cfg.network.broadcast_addr, "10.0.0.255");
    assert_eq!(cfg.naming.suffix_aux1, "_fx");
    assert!((cfg.led.master_dim - 0.5).abs() < f32::EPSILON);
    // untouched sections still default
    assert_eq!(cfg.naming.suffix_main, "_main");
    assert_eq!(cfg.gpio.led_count, 3);
}

#[test]
fn passcode_defaults_to_none() {
    let cfg = config::load_config_from_str("").unwrap();
    assert!(cfg.network.passcode.is_none());
}

#[test]
fn passcode_is_loaded_when_present() {
    let cfg = config::load_config_from_str(
        r#"
        [network]
        passcode = "letmein"
        "#,
    )
    .unwrap();
    assert_eq!(cfg.network.passcode.as_deref(), Some("letmein"));
}

#[test]
fn timing_seconds_are_parsed_into_durations() {
    let cfg = config::load_config_from_str(
        r#"
        [timing]
        discovery_wait_sec = 2.5
        reconcile_every_sec = 10.0
        "#,
    )
    .unwrap();
    assert_eq!(cfg.timing.discovery_wait, std::time::Duration::from_secs_f64(2.5));
    assert_eq!(cfg.timing.reconcile_every, std::time::Duration::from_secs_f64(10.0));
}

#[test]
fn gpio_pin_overrides_apply_independently() {
    let cfg = config::load_config_from_str(
        r#"
        [gpio]
        btn_go_pin = 23
        led_count = 5
        "#,
    )
    .unwrap();
    assert_eq!(cfg.gpio.btn_go_pin, 23);
    assert_eq!(cfg.gpio.led_count, 5);
    // untouched pins still default
    assert_eq!(cfg.gpio.btn_pause_pin, 6);
}

#[test]
fn malformed_toml_file_surfaces_as_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"this is not [ valid toml").unwrap();

    let err = config::load_config_from_path(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
