use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::analysis::LiveUnits;
use super::constants::*;
use super::error::ConfigError;

/// Structure representing the acquisition configuration. Contains the serial device, the log
/// location and the optional websocket fan-out settings.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub port: String,
    pub baudrate: u32,
    pub log_file: Option<PathBuf>,
    pub log_prefix: String,
    pub websocket: bool,
    pub ws_host: String,
    pub ws_port: u16,
    pub ws_min_period: f64,
    pub value_offset: i64,
    pub y_range: [f64; 2],
    pub history: usize,
    /// Plot rotor phase against kV/m instead of sample index against raw value
    pub calibrated: bool,
    pub field_midpoint: f64,
    /// kV/m per raw unit
    pub field_scale: f64,
    pub field_y_range: [f64; 2],
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            port: String::from(DEFAULT_PORT),
            baudrate: DEFAULT_BAUDRATE,
            log_file: None,
            log_prefix: String::from(DEFAULT_LOG_PREFIX),
            websocket: false,
            ws_host: String::from(DEFAULT_WS_HOST),
            ws_port: DEFAULT_WS_PORT,
            ws_min_period: DEFAULT_WS_MIN_PERIOD_S,
            value_offset: 0,
            y_range: DEFAULT_Y_RANGE,
            history: DEFAULT_HISTORY,
            calibrated: false,
            field_midpoint: DEFAULT_FIELD_MIDPOINT,
            field_scale: DEFAULT_FIELD_SCALE,
            field_y_range: DEFAULT_FIELD_Y_RANGE,
        }
    }
}

impl AcquisitionConfig {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration as YAML, replacing whatever is at the path
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// The websocket bind address. The host must be an IPv4 or IPv6 literal.
    pub fn ws_address(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .ws_host
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidValue(format!("websocket host {}", self.ws_host)))?;
        Ok(SocketAddr::new(ip, self.ws_port))
    }

    /// Minimum time between two websocket messages. Negative periods are treated as zero,
    /// periods too large for a Duration (including infinity) are refused.
    pub fn ws_min_period(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.ws_min_period.max(0.0)).map_err(|_| {
            ConfigError::InvalidValue(format!("websocket min period {}", self.ws_min_period))
        })
    }

    pub fn live_units(&self) -> LiveUnits {
        if self.calibrated {
            LiveUnits::Calibrated {
                midpoint: self.field_midpoint,
                kv_per_m: self.field_scale,
            }
        } else {
            LiveUnits::Raw
        }
    }

    /// Vertical range of the live plot in the units it is drawn in
    pub fn plot_y_range(&self) -> [f64; 2] {
        if self.calibrated {
            self.field_y_range
        } else {
            self.y_range
        }
    }

    pub fn is_baudrate_valid(&self) -> bool {
        self.baudrate > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            _ => Err(ConfigError::InvalidValue(format!("output format {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl std::str::FromStr for Theme {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(ConfigError::InvalidValue(format!("theme {s}"))),
        }
    }
}

/// Configuration of a daily helicorder run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelicorderConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// YYYYMMDD; None picks today (or yesterday shortly after midnight UTC)
    pub date: Option<String>,
    pub observatory: String,
    pub station: String,
    pub format: OutputFormat,
    pub theme: Theme,
    /// ADU per kV/m
    pub calibration: f64,
    pub positive_channel: usize,
    pub negative_channel: usize,
}

impl Default for HelicorderConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("None"),
            output: PathBuf::from("None"),
            date: None,
            observatory: String::from(DEFAULT_OBSERVATORY),
            station: String::from(DEFAULT_STATION),
            format: OutputFormat::Png,
            theme: Theme::Light,
            calibration: DEFAULT_CALIBRATION,
            positive_channel: DEFAULT_POSITIVE_CHANNEL,
            negative_channel: DEFAULT_NEGATIVE_CHANNEL,
        }
    }
}

impl HelicorderConfig {
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(config_path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acq.yml");
        let mut config = AcquisitionConfig::default();
        config.port = String::from("/dev/ttyACM3");
        config.websocket = true;
        config.ws_min_period = 0.5;
        config.write_config_file(&path).unwrap();

        let loaded = AcquisitionConfig::read_config_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AcquisitionConfig = serde_yaml::from_str("baudrate: 115200\n").unwrap();
        assert_eq!(config.baudrate, 115200);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ws_port, DEFAULT_WS_PORT);
        assert!(!config.websocket);
    }

    #[test]
    fn test_missing_file() {
        let err = AcquisitionConfig::read_config_file(Path::new("/definitely/not/here.yml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadFilePath(_)));
    }

    #[test]
    fn test_ws_address_and_period() {
        let mut config = AcquisitionConfig::default();
        assert_eq!(config.ws_address().unwrap().port(), DEFAULT_WS_PORT);
        config.ws_min_period = -1.0;
        assert_eq!(config.ws_min_period().unwrap(), Duration::ZERO);
        config.ws_host = String::from("not an ip");
        assert!(config.ws_address().is_err());
    }

    #[test]
    fn test_ws_address_ipv6() {
        let mut config = AcquisitionConfig::default();
        config.ws_host = String::from("::");
        config.ws_port = 1234;
        let addr = config.ws_address().unwrap();
        assert!(addr.is_ipv6());
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 1234);

        config.ws_host = String::from("::1");
        assert_eq!(config.ws_address().unwrap().to_string(), "[::1]:1234");
        config.ws_host = String::from("localhost");
        assert!(matches!(
            config.ws_address(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unrepresentable_min_period_is_refused() {
        let mut config = AcquisitionConfig::default();
        config.ws_min_period = f64::INFINITY;
        assert!(matches!(
            config.ws_min_period(),
            Err(ConfigError::InvalidValue(_))
        ));
        config.ws_min_period = 1e20;
        assert!(config.ws_min_period().is_err());

        let config: AcquisitionConfig = serde_yaml::from_str("ws_min_period: .inf\n").unwrap();
        assert!(config.ws_min_period().is_err());
    }

    #[test]
    fn test_calibrated_units_switch() {
        let mut config = AcquisitionConfig::default();
        assert_eq!(config.live_units(), LiveUnits::Raw);
        assert_eq!(config.plot_y_range(), DEFAULT_Y_RANGE);

        config.calibrated = true;
        assert_eq!(config.plot_y_range(), [-40.0, 40.0]);
        let units = config.live_units();
        assert_eq!(units.y(256.0), 0.0);
        assert!((units.y(266.0) - 1.3636).abs() < 1e-3);
        assert_eq!(units.x(10, 11), 180.0);
    }

    #[test]
    fn test_helicorder_enums_parse() {
        assert_eq!("SVG".parse::<OutputFormat>().unwrap(), OutputFormat::Svg);
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("jpeg".parse::<OutputFormat>().is_err());
        let config: HelicorderConfig = serde_yaml::from_str("theme: dark\nformat: svg\n").unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.station, DEFAULT_STATION);
    }
}
