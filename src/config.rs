//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the tide-config.toml file.
//! It provides a centralized way to configure the NOAA station, the chart panels,
//! the target display and the refresh schedule.

use crate::clock::TimeReference;
use crate::display::BorderColour;
use crate::renderer::{ChartLayout, PanelSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tide-config.toml";

/// Errors from reading or writing the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialization: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// NOAA station configuration
    pub station: StationConfig,
    /// Prediction API settings
    pub api: ApiConfig,
    /// Which wall clock to query and draw in
    pub time: TimeConfig,
    /// Refresh loop settings
    pub schedule: ScheduleConfig,
    /// Chart rendering and panel layout
    pub chart: ChartConfig,
    /// Target display
    pub display: DisplayConfig,
}

/// NOAA tide station configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// NOAA station ID (e.g., "8465705" for New Haven, CT)
    pub id: String,
    /// Chart title
    pub name: String,
    /// Vertical datum heights are reported against
    pub datum: String,
}

/// NOAA CO-OPS API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as the `application` parameter so NOAA can identify the client
    pub application: String,
    pub timeout_seconds: u64,
    /// Half-width of the prediction window around now
    pub window_hours: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeConfig {
    pub time_reference_mode: TimeReference,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub refresh_interval_seconds: u64,
}

/// Chart rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Label local highs and lows with their clock time
    pub annotate_extrema: bool,
    /// Draw a "last updated" stamp in the top-right corner
    pub show_updated: bool,
    /// Charts to render each cycle and where they go on the display
    pub panels: Vec<PanelConfig>,
}

/// One chart placed on the display frame
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelConfig {
    pub layout: ChartLayout,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub dpi: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Which display driver to publish through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// E-paper panel when present, PNG file otherwise
    #[default]
    Auto,
    Epd,
    Png,
    Terminal,
}

/// Display configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Native panel width in pixels
    pub width: u32,
    /// Native panel height in pixels
    pub height: u32,
    pub border: BorderColour,
    pub driver: DriverKind,
    /// Where the PNG driver writes frames
    pub output_path: PathBuf,
    pub hardware: HardwareConfig,
}

/// SPI/GPIO wiring for the e-paper panel (BCM numbering)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub spi_device: PathBuf,
    pub gpio_chip: PathBuf,
    pub dc_pin: u32,
    pub rst_pin: u32,
    pub busy_pin: u32,
    /// Give up waiting on BUSY after this long
    pub busy_timeout_ms: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            id: "8465705".to_string(),
            name: "Tides".to_string(),
            datum: "MLLW".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter".to_string(),
            application: "tide-panel".to_string(),
            timeout_seconds: 30,
            window_hours: 12,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            refresh_interval_seconds: 5 * 60,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            annotate_extrema: true,
            show_updated: false,
            panels: vec![PanelConfig::default()],
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        // Compact chart across the bottom half of an 800x480 panel
        PanelConfig {
            layout: ChartLayout::Compact,
            canvas_width: 800,
            canvas_height: 240,
            dpi: 100,
            offset_x: 0,
            offset_y: 240,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 800,
            height: 480,
            border: BorderColour::Black,
            driver: DriverKind::Auto,
            output_path: PathBuf::from("tide-frame.png"),
            hardware: HardwareConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
            busy_timeout_ms: 30_000,
        }
    }
}

impl PanelConfig {
    pub fn spec(&self) -> PanelSpec {
        PanelSpec {
            width: self.canvas_width,
            height: self.canvas_height,
            dpi: self.dpi,
            layout: self.layout,
        }
    }

    pub fn offset(&self) -> (u32, u32) {
        (self.offset_x, self.offset_y)
    }
}

impl ScheduleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl Config {
    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_path(&path) {
            Ok(config) => {
                tracing::info!(station = %config.station.id, "Loaded configuration");
                config
            }
            Err(ConfigError::Io(_)) => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    "No config file found, using default configuration"
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid config file, using default configuration");
                Self::default()
            }
        }
    }

    /// Load configuration, reporting missing or malformed files as errors
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str::<Config>(&contents)?)
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        tracing::info!(path = %path.as_ref().display(), "Configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station.id, "8465705");
        assert_eq!(config.station.datum, "MLLW");
        assert_eq!(config.api.window_hours, 12);
        assert_eq!(config.schedule.refresh_interval(), Duration::from_secs(300));
        assert_eq!(
            config.time.time_reference_mode,
            TimeReference::LocalStandardOrDaylight
        );
        assert_eq!((config.display.width, config.display.height), (800, 480));

        let panel = &config.chart.panels[0];
        assert_eq!(panel.layout, ChartLayout::Compact);
        assert_eq!((panel.canvas_width, panel.canvas_height), (800, 240));
        assert_eq!(panel.offset(), (0, 240));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.station.id, parsed.station.id);
        assert_eq!(config.display.border, parsed.display.border);
        assert_eq!(config.chart.panels.len(), parsed.chart.panels.len());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let toml_str = r#"
[station]
id = "8443970"
name = "Boston, MA"

[time]
time_reference_mode = "utc"

[[chart.panels]]
layout = "full"
canvas_width = 800
canvas_height = 480
offset_y = 0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.station.id, "8443970");
        assert_eq!(config.station.datum, "MLLW");
        assert_eq!(config.time.time_reference_mode, TimeReference::Utc);
        assert_eq!(config.chart.panels.len(), 1);
        assert_eq!(config.chart.panels[0].layout, ChartLayout::Full);
        assert_eq!(config.chart.panels[0].dpi, 100);
        assert_eq!(config.schedule.refresh_interval_seconds, 300);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.station.id, "8465705");
    }

    #[test]
    fn test_invalid_file_is_an_error_but_load_falls_back() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "station = 42").unwrap();
        assert!(matches!(
            Config::try_load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(Config::load_from_path(file.path()).station.id, "8465705");
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.station.id = "9414290".to_string();
        config.display.driver = DriverKind::Terminal;
        config.save(file.path()).unwrap();

        let loaded = Config::try_load_from_path(file.path()).unwrap();
        assert_eq!(loaded.station.id, "9414290");
        assert_eq!(loaded.display.driver, DriverKind::Terminal);
    }
}
