//! Layered application configuration.
//!
//! Settings come from three layers, each overriding the previous one:
//! hardcoded defaults, an optional TOML file, and environment variables
//! prefixed with `FUSION_DAQ_` (nested fields use double underscores:
//! `FUSION_DAQ_SAMPLING__FUSION_HZ=50` sets `sampling.fusion_hz`).
//! Every field therefore always has a value, and a partial config file
//! only has to name what it changes.

use anyhow::{Context, Result};
use figment::{providers::Serialized, Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::registers::OutputDataRate;

/// Default config file consulted when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/fusion-daq.toml";

impl Provider for Settings {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Library Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(Settings::default()).data()
    }
}

/// Top-level configuration for the acquisition service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Process-level settings.
    pub application: ApplicationSettings,
    /// Sensor device settings.
    pub device: DeviceSettings,
    /// Acquisition scheduling settings.
    pub sampling: SamplingSettings,
    /// Circular buffer capacities.
    pub buffers: BufferSettings,
    /// Telemetry endpoint settings.
    pub telemetry: TelemetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationSettings::default(),
            device: DeviceSettings::default(),
            sampling: SamplingSettings::default(),
            buffers: BufferSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

/// Process identity and logging.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Name used in logs and telemetry.
    pub name: String,
    /// Minimum log level when `RUST_LOG` is not set.
    ///
    /// Valid values: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "fusion-daq".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where the sensor sits and how fast it runs.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeviceSettings {
    /// 7-bit bus address of the device.
    pub bus_address: u8,
    /// Requested hybrid output rate in Hz. Mapped onto the discrete rates
    /// the device supports through its threshold chain.
    pub odr_hz: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            bus_address: 0x1E,
            odr_hz: 200.0,
        }
    }
}

/// Acquisition loop timing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SamplingSettings {
    /// Scheduler firings per second.
    pub fusion_hz: u32,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self { fusion_hz: 40 }
    }
}

impl SamplingSettings {
    /// Spacing of the scheduler's deadline grid.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fusion_hz.max(1)))
    }
}

/// Circular buffer capacities, in samples.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BufferSettings {
    /// Accelerometer ring capacity.
    pub accel: usize,
    /// Magnetometer ring capacity.
    pub mag: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self { accel: 32, mag: 16 }
    }
}

/// Telemetry endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Whether the TCP endpoint is served. When false the loop runs
    /// headless and `listen` is ignored.
    pub enabled: bool,
    /// Listen address for the endpoint.
    pub listen: String,
    /// Whether per-period frame streaming starts enabled.
    pub stream: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:2323".to_string(),
            stream: true,
        }
    }
}

impl Settings {
    /// Load configuration from the three layers.
    ///
    /// A missing config file is not an error; defaults and environment
    /// variables still apply.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        use figment::providers::{Env, Format, Toml};

        let mut figment = Figment::from(Settings::default());

        let file_path = config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
        if file_path.exists() {
            figment = figment.merge(Toml::file(&file_path));
        } else {
            eprintln!(
                "Config file not found: {}. Using defaults.",
                file_path.display()
            );
        }

        figment = figment.merge(Env::prefixed("FUSION_DAQ_").split("__"));

        let settings: Settings = figment
            .extract()
            .context("Failed to extract configuration from Figment")?;

        settings
            .validate()
            .context("Configuration validation failed")?;

        Ok(settings)
    }

    /// Check every field against its supported range.
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.application.log_level);
        }

        if self.device.bus_address > 0x7F {
            anyhow::bail!(
                "bus_address {:#04x} does not fit a 7-bit address. Check [device] in config.",
                self.device.bus_address
            );
        }
        if !self.device.odr_hz.is_finite() || self.device.odr_hz <= 0.0 {
            anyhow::bail!(
                "odr_hz = {} must be a positive rate. Check [device] in config.",
                self.device.odr_hz
            );
        }

        if !(1..=1000).contains(&self.sampling.fusion_hz) {
            anyhow::bail!(
                "fusion_hz = {} is out of valid range (1 - 1000). Check [sampling] in config.",
                self.sampling.fusion_hz
            );
        }

        if self.buffers.accel == 0 || self.buffers.mag == 0 {
            anyhow::bail!("Buffer capacities must be at least 1. Check [buffers] in config.");
        }

        if self.telemetry.enabled {
            self.telemetry
                .listen
                .parse::<std::net::SocketAddr>()
                .with_context(|| {
                    format!(
                        "Invalid telemetry listen address: {}. Check [telemetry] in config.",
                        self.telemetry.listen
                    )
                })?;
        }

        Ok(())
    }

    /// Device rate the configured `odr_hz` maps to.
    pub fn rate(&self) -> OutputDataRate {
        OutputDataRate::for_target_hz(self.device.odr_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::{Format, Toml};

    #[test]
    fn defaults_load_and_validate() {
        // A nonexistent path exercises the defaults-only layer.
        let settings = Settings::load(Some("config/nonexistent.toml".into()));
        if let Err(ref e) = settings {
            eprintln!("Error loading settings: {e:#}");
        }
        let settings = settings.unwrap();
        assert_eq!(settings.application.name, "fusion-daq");
        assert_eq!(settings.device.bus_address, 0x1E);
        assert_eq!(settings.sampling.fusion_hz, 40);
        assert_eq!(settings.buffers.accel, 32);
        assert!(settings.telemetry.enabled);
        assert!(settings.telemetry.stream);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let toml_content = r#"
            [sampling]
            fusion_hz = 25

            [telemetry]
            stream = false
        "#;
        let settings: Settings = Figment::from(Settings::default())
            .merge(Toml::string(toml_content))
            .extract()
            .unwrap();

        assert_eq!(settings.sampling.fusion_hz, 25);
        assert!(!settings.telemetry.stream);
        // Untouched sections keep their defaults.
        assert_eq!(settings.device.odr_hz, 200.0);
        assert_eq!(settings.buffers.mag, 16);
    }

    #[test]
    fn out_of_range_fusion_hz_rejected() {
        let mut settings = Settings::default();
        settings.sampling.fusion_hz = 0;
        assert!(settings.validate().is_err());
        settings.sampling.fusion_hz = 1001;
        assert!(settings.validate().is_err());
        settings.sampling.fusion_hz = 1000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn bad_listen_address_rejected() {
        let mut settings = Settings::default();
        settings.telemetry.listen = "not-an-address".to_string();
        assert!(settings.validate().is_err());
        // A disabled endpoint never uses the address, so it is not checked.
        settings.telemetry.enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn endpoint_toggle_reaches_through_a_file_layer() {
        let toml_content = r#"
            [telemetry]
            enabled = false
        "#;
        let settings: Settings = Figment::from(Settings::default())
            .merge(Toml::string(toml_content))
            .extract()
            .unwrap();

        assert!(!settings.telemetry.enabled);
        // The address keeps its default for a later re-enable.
        assert_eq!(settings.telemetry.listen, "127.0.0.1:2323");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn period_follows_fusion_rate() {
        let sampling = SamplingSettings { fusion_hz: 40 };
        assert_eq!(sampling.period(), Duration::from_millis(25));
        let sampling = SamplingSettings { fusion_hz: 1000 };
        assert_eq!(sampling.period(), Duration::from_millis(1));
    }

    #[test]
    fn requested_rate_snaps_to_device_grid() {
        let mut settings = Settings::default();
        assert_eq!(settings.rate(), OutputDataRate::Hz200);
        settings.device.odr_hz = 40.0;
        assert_eq!(settings.rate(), OutputDataRate::Hz50);
    }
}
