//! Static daemon configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides (the
//! `RUST_LOG` variable only controls log verbosity, not behavior).
//! Default config path: `/etc/cuebridge/cuebridge.toml`.
//!
//! Every field has a default, so a minimal or even empty TOML file still
//! produces a usable config — unlike the persisted pairing record, a
//! missing config file is not itself fatal; only a malformed one is.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_QLAB_PORT: u16 = 53000;
pub const DEFAULT_PI_REPLY_PORT: u16 = 53001;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0";
pub const DEFAULT_BROADCAST_ADDR: &str = "255.255.255.255";

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub naming: NamingConfig,
    pub timing: TimingConfig,
    pub gpio: GpioConfig,
    pub led: LedConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub qlab_port: u16,
    pub listen_addr: String,
    pub reply_port: u16,
    pub broadcast_addr: String,
    /// Plaintext passcode sent with `/workspace/<id>/connect`, if configured.
    pub passcode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NamingConfig {
    pub expected_ws_main: String,
    pub expected_ws_backup: String,
    pub suffix_main: String,
    pub suffix_backup: String,
    pub suffix_aux1: String,
    /// Whether an absent backup/auxiliary is merely "not expected" (skips
    /// straight to off) rather than "configured but missing" (keeps the
    /// recently-missing red-steady window alive); see `SPEC_FULL.md` §B.
    /// Backup defaults to required (not optional); auxiliary defaults to
    /// optional, matching the original daemon's behavior.
    pub backup_optional: bool,
    pub aux_optional: bool,
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub startup_force_unpair: bool,
    pub pair_hold_restart: Duration,
    pub discovery_wait: Duration,
    pub reconcile_every: Duration,
}

#[derive(Debug, Clone)]
pub struct GpioConfig {
    pub led_data_pin: u8,
    pub led_count: usize,
    pub led_brightness: u8,
    pub btn_go_pin: u8,
    pub btn_pause_pin: u8,
    pub btn_panic_pin: u8,
    pub enc_clk_pin: u8,
    pub enc_dt_pin: u8,
    pub enc_sw_pin: u8,
}

#[derive(Debug, Clone)]
pub struct LedConfig {
    pub master_dim: f32,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub state_path: String,
    pub log_dir: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (all optional, defaulted after parse)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    network: Option<RawNetwork>,
    naming: Option<RawNaming>,
    timing: Option<RawTiming>,
    gpio: Option<RawGpio>,
    led: Option<RawLed>,
    paths: Option<RawPaths>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    qlab_port: Option<u16>,
    listen_addr: Option<String>,
    reply_port: Option<u16>,
    broadcast_addr: Option<String>,
    passcode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNaming {
    expected_ws_main: Option<String>,
    expected_ws_backup: Option<String>,
    suffix_main: Option<String>,
    suffix_backup: Option<String>,
    suffix_aux1: Option<String>,
    backup_optional: Option<bool>,
    aux_optional: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTiming {
    startup_force_unpair: Option<bool>,
    pair_hold_restart_sec: Option<f64>,
    discovery_wait_sec: Option<f64>,
    reconcile_every_sec: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGpio {
    led_data_pin: Option<u8>,
    led_count: Option<usize>,
    led_brightness: Option<u8>,
    btn_go_pin: Option<u8>,
    btn_pause_pin: Option<u8>,
    btn_panic_pin: Option<u8>,
    enc_clk_pin: Option<u8>,
    enc_dt_pin: Option<u8>,
    enc_sw_pin: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLed {
    master_dim: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    state_path: Option<String>,
    log_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(Path::new("/etc/cuebridge/cuebridge.toml"))
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(toml_str) => load_config_from_str(&toml_str),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::defaults()),
        Err(e) => Err(ConfigError::Io(format!(
            "reading config file '{}': {e}",
            path.display()
        ))),
    }
}

pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(Config::from_raw(raw))
}

impl Config {
    fn defaults() -> Self {
        Config::from_raw(RawConfig::default())
    }

    fn from_raw(raw: RawConfig) -> Self {
        let n = raw.network.unwrap_or_default();
        let m = raw.naming.unwrap_or_default();
        let t = raw.timing.unwrap_or_default();
        let g = raw.gpio.unwrap_or_default();
        let l = raw.led.unwrap_or_default();
        let p = raw.paths.unwrap_or_default();

        Config {
            network: NetworkConfig {
                qlab_port: n.qlab_port.unwrap_or(DEFAULT_QLAB_PORT),
                listen_addr: n.listen_addr.unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned()),
                reply_port: n.reply_port.unwrap_or(DEFAULT_PI_REPLY_PORT),
                broadcast_addr: n
                    .broadcast_addr
                    .unwrap_or_else(|| DEFAULT_BROADCAST_ADDR.to_owned()),
                passcode: n.passcode,
            },
            naming: NamingConfig {
                expected_ws_main: m.expected_ws_main.unwrap_or_else(|| "show_main".to_owned()),
                expected_ws_backup: m
                    .expected_ws_backup
                    .unwrap_or_else(|| "show_backup".to_owned()),
                suffix_main: m.suffix_main.unwrap_or_else(|| "_main".to_owned()),
                suffix_backup: m.suffix_backup.unwrap_or_else(|| "_backup".to_owned()),
                suffix_aux1: m.suffix_aux1.unwrap_or_else(|| "_aux1".to_owned()),
                backup_optional: m.backup_optional.unwrap_or(false),
                aux_optional: m.aux_optional.unwrap_or(true),
            },
            timing: TimingConfig {
                startup_force_unpair: t.startup_force_unpair.unwrap_or(true),
                pair_hold_restart: Duration::from_secs_f64(t.pair_hold_restart_sec.unwrap_or(3.0)),
                discovery_wait: Duration::from_secs_f64(t.discovery_wait_sec.unwrap_or(1.2)),
                reconcile_every: Duration::from_secs_f64(t.reconcile_every_sec.unwrap_or(5.0)),
            },
            gpio: GpioConfig {
                led_data_pin: g.led_data_pin.unwrap_or(18),
                led_count: g.led_count.unwrap_or(3),
                led_brightness: g.led_brightness.unwrap_or(255),
                btn_go_pin: g.btn_go_pin.unwrap_or(5),
                btn_pause_pin: g.btn_pause_pin.unwrap_or(6),
                btn_panic_pin: g.btn_panic_pin.unwrap_or(12),
                enc_clk_pin: g.enc_clk_pin.unwrap_or(17),
                enc_dt_pin: g.enc_dt_pin.unwrap_or(27),
                enc_sw_pin: g.enc_sw_pin.unwrap_or(22),
            },
            led: LedConfig {
                master_dim: l.master_dim.unwrap_or(0.18),
            },
            paths: PathsConfig {
                state_path: p
                    .state_path
                    .unwrap_or_else(|| "/var/lib/cuebridge/state.json".to_owned()),
                log_dir: p.log_dir.unwrap_or_else(|| "/var/log/cuebridge".to_owned()),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_all_defaults() {
        let cfg = load_config_from_str("").unwrap();
        assert_eq!(cfg.network.qlab_port, DEFAULT_QLAB_PORT);
        assert_eq!(cfg.naming.suffix_main, "_main");
        assert!(cfg.timing.startup_force_unpair);
    }

    #[test]
    fn overrides_apply_per_field() {
        let toml_str = r#"
            [network]
            qlab_port = 9000

            [naming]
            suffix_main = "_A"
        "#;
        let cfg = load_config_from_str(toml_str).unwrap();
        assert_eq!(cfg.network.qlab_port, 9000);
        assert_eq!(cfg.naming.suffix_main, "_A");
        // untouched sections still default
        assert_eq!(cfg.naming.suffix_backup, "_backup");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = load_config_from_str("not valid = = toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
