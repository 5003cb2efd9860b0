//! Command line and configuration file handling.
//!
//! Values are taken from the command line first, then from the TOML file,
//! then from built-in defaults.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::upstream::Geo;

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "locast-dvr.toml";

/// Placeholder written instead of the password wherever the
/// configuration is shown.
pub const REDACTED: &str = "*********";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Locast username and password are required")]
    MissingCredentials,

    #[error("Invalid location override '{0}', expected LAT,LONG")]
    InvalidLocation(String),
}

/// locast-dvr - HDHomeRun tuner emulator for Locast
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Locast username
    #[arg(short = 'U', long)]
    pub username: Option<String>,

    /// Locast password
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// Unique ID prefix reported to DVR clients
    #[arg(short = 'u', long)]
    pub uid: Option<String>,

    /// Address to bind the tuner HTTP servers to
    #[arg(short = 'b', long)]
    pub bind_address: Option<String>,

    /// First TCP port; additional tuners use the following ports
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Increase verbosity (may be repeated)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file in addition to the console
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(short = 'f', long)]
    pub ffmpeg: Option<String>,

    /// Maximum number of bytes read from ffmpeg per chunk
    #[arg(long)]
    pub bytes_per_read: Option<usize>,

    /// How long a freshly started ffmpeg may run before it counts as launched (ms)
    #[arg(long)]
    pub launch_grace_ms: Option<u64>,

    /// How long to wait for ffmpeg to exit after SIGTERM before killing it (ms)
    #[arg(long)]
    pub stop_timeout_ms: Option<u64>,

    /// Number of concurrent streams per tuner
    #[arg(long)]
    pub tuner_count: Option<u32>,

    /// Model reported to DVR clients
    #[arg(long)]
    pub device_model: Option<String>,

    /// Firmware name reported to DVR clients
    #[arg(long)]
    pub device_firmware: Option<String>,

    /// Firmware version reported to DVR clients
    #[arg(long)]
    pub device_version: Option<String>,

    /// Serve all locations through a single tuner
    #[arg(short = 'm', long)]
    pub multiplex: bool,

    /// Serve the per-location tuners next to the multiplexed one
    #[arg(short = 'M', long)]
    pub multiplex_debug: bool,

    /// Remap channel numbers when multiplexing
    #[arg(short = 'r', long)]
    pub remap: bool,

    /// Override the location as LAT,LONG
    #[arg(long)]
    pub override_location: Option<String>,

    /// Comma separated list of zipcodes, one tuner per zipcode
    #[arg(long)]
    pub override_zipcodes: Option<String>,

    /// Cache station data between requests
    #[arg(long)]
    pub cache_stations: Option<bool>,

    /// Station cache lifetime in seconds
    #[arg(long)]
    pub cache_timeout: Option<u64>,

    /// Number of days of guide data to fetch
    #[arg(short = 'd', long)]
    pub days: Option<u32>,

    /// Timeout for upstream requests in seconds
    #[arg(long = "upstream-timeout")]
    pub upstream_timeout_secs: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub locast: LocastSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub multiplex: MultiplexSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct LocastSection {
    pub username: Option<String>,
    pub password: Option<String>,
    pub override_location: Option<String>,
    pub override_zipcodes: Option<String>,
    pub cache_stations: Option<bool>,
    pub cache_timeout: Option<u64>,
    pub days: Option<u32>,
    pub upstream_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeviceSection {
    pub uid: Option<String>,
    pub tuner_count: Option<u32>,
    pub device_model: Option<String>,
    pub device_firmware: Option<String>,
    pub device_version: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StreamSection {
    pub ffmpeg: Option<String>,
    pub bytes_per_read: Option<usize>,
    pub launch_grace_ms: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MultiplexSection {
    pub enabled: Option<bool>,
    pub debug: Option<bool>,
    pub remap: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub verbose: Option<u8>,
    pub logfile: Option<String>,
}

/// Load a configuration file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Effective configuration after merging all sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub uid: String,
    pub bind_address: String,
    pub port: u16,
    pub verbose: u8,
    pub logfile: Option<PathBuf>,
    pub ffmpeg: String,
    pub bytes_per_read: usize,
    pub launch_grace_ms: u64,
    pub stop_timeout_ms: u64,
    pub tuner_count: u32,
    pub device_model: String,
    pub device_firmware: String,
    pub device_version: String,
    pub multiplex: bool,
    pub multiplex_debug: bool,
    pub remap: bool,
    pub override_location: Option<String>,
    pub override_zipcodes: Option<String>,
    pub cache_stations: bool,
    pub cache_timeout: u64,
    pub days: u32,
    pub upstream_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            uid: "LOCAST2DVR".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 6077,
            verbose: 0,
            logfile: None,
            ffmpeg: "ffmpeg".to_string(),
            bytes_per_read: 1_152_000,
            launch_grace_ms: 250,
            stop_timeout_ms: 2000,
            tuner_count: 3,
            device_model: "HDHR3-US".to_string(),
            device_firmware: "hdhomerun3_atsc".to_string(),
            device_version: "1.2.3456".to_string(),
            multiplex: false,
            multiplex_debug: false,
            remap: false,
            override_location: None,
            override_zipcodes: None,
            cache_stations: true,
            cache_timeout: 3600,
            days: 8,
            upstream_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Merge command line arguments over the file configuration.
    pub fn merge(args: Args, file: ConfigFile) -> Result<Self, ConfigError> {
        let d = Config::default();
        let config = Config {
            username: args.username.or(file.locast.username).unwrap_or(d.username),
            password: args.password.or(file.locast.password).unwrap_or(d.password),
            uid: args.uid.or(file.device.uid).unwrap_or(d.uid),
            bind_address: args
                .bind_address
                .or(file.server.bind_address)
                .unwrap_or(d.bind_address),
            port: args.port.or(file.server.port).unwrap_or(d.port),
            verbose: if args.verbose > 0 {
                args.verbose
            } else {
                file.logging.verbose.unwrap_or(d.verbose)
            },
            logfile: args.logfile.or(file.logging.logfile.map(PathBuf::from)),
            ffmpeg: args.ffmpeg.or(file.stream.ffmpeg).unwrap_or(d.ffmpeg),
            bytes_per_read: args
                .bytes_per_read
                .or(file.stream.bytes_per_read)
                .unwrap_or(d.bytes_per_read)
                .max(1),
            launch_grace_ms: args
                .launch_grace_ms
                .or(file.stream.launch_grace_ms)
                .unwrap_or(d.launch_grace_ms),
            stop_timeout_ms: args
                .stop_timeout_ms
                .or(file.stream.stop_timeout_ms)
                .unwrap_or(d.stop_timeout_ms),
            tuner_count: args
                .tuner_count
                .or(file.device.tuner_count)
                .unwrap_or(d.tuner_count),
            device_model: args
                .device_model
                .or(file.device.device_model)
                .unwrap_or(d.device_model),
            device_firmware: args
                .device_firmware
                .or(file.device.device_firmware)
                .unwrap_or(d.device_firmware),
            device_version: args
                .device_version
                .or(file.device.device_version)
                .unwrap_or(d.device_version),
            multiplex: args.multiplex || file.multiplex.enabled.unwrap_or(d.multiplex),
            multiplex_debug: args.multiplex_debug
                || file.multiplex.debug.unwrap_or(d.multiplex_debug),
            remap: args.remap || file.multiplex.remap.unwrap_or(d.remap),
            override_location: args.override_location.or(file.locast.override_location),
            override_zipcodes: args.override_zipcodes.or(file.locast.override_zipcodes),
            cache_stations: args
                .cache_stations
                .or(file.locast.cache_stations)
                .unwrap_or(d.cache_stations),
            cache_timeout: args
                .cache_timeout
                .or(file.locast.cache_timeout)
                .unwrap_or(d.cache_timeout),
            days: args.days.or(file.locast.days).unwrap_or(d.days),
            upstream_timeout_secs: args
                .upstream_timeout_secs
                .or(file.locast.upstream_timeout_secs)
                .unwrap_or(d.upstream_timeout_secs),
        };

        if config.username.is_empty() || config.password.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(config)
    }

    /// Copy of this configuration that is safe to show to clients.
    pub fn redacted(&self) -> Self {
        Self {
            password: REDACTED.to_string(),
            ..self.clone()
        }
    }

    /// Locations to start a tuner for.
    ///
    /// A coordinate override wins over zipcodes. Without either, a single
    /// tuner is located by the public IP address.
    pub fn geos(&self) -> Result<Vec<Geo>, ConfigError> {
        if let Some(location) = &self.override_location {
            let invalid = || ConfigError::InvalidLocation(location.clone());
            let (lat, lon) = location.split_once(',').ok_or_else(invalid)?;
            let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
            let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;
            return Ok(vec![Geo::LatLon {
                latitude,
                longitude,
            }]);
        }

        if let Some(zipcodes) = &self.override_zipcodes {
            let geos: Vec<Geo> = zipcodes
                .split(',')
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .map(|z| Geo::Zipcode(z.to_string()))
                .collect();
            if !geos.is_empty() {
                return Ok(geos);
            }
        }

        Ok(vec![Geo::Ip])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Args {
        Args {
            username: Some("user".into()),
            password: Some("secret".into()),
            ..Args::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::merge(credentials(), ConfigFile::default()).unwrap();
        assert_eq!(config.port, 6077);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.bytes_per_read, 1_152_000);
        assert_eq!(config.tuner_count, 3);
        assert_eq!(config.uid, "LOCAST2DVR");
        assert!(config.cache_stations);
        assert_eq!(config.days, 8);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 7000
            bind_address = "0.0.0.0"

            [device]
            tuner_count = 5

            [multiplex]
            enabled = true
            "#,
        )
        .unwrap();
        let args = Args {
            port: Some(8000),
            ..credentials()
        };
        let config = Config::merge(args, file).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.tuner_count, 5);
        assert!(config.multiplex);
    }

    #[test]
    fn test_credentials_from_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [locast]
            username = "fileuser"
            password = "filepass"
            "#,
        )
        .unwrap();
        let config = Config::merge(Args::default(), file).unwrap();
        assert_eq!(config.username, "fileuser");
    }

    #[test]
    fn test_missing_credentials() {
        let err = Config::merge(Args::default(), ConfigFile::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials));
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = Config::merge(credentials(), ConfigFile::default()).unwrap();
        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(REDACTED));
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_geos() {
        let mut config = Config::merge(credentials(), ConfigFile::default()).unwrap();
        assert_eq!(config.geos().unwrap(), vec![Geo::Ip]);

        config.override_location = Some("41.88, -87.63".into());
        assert_eq!(
            config.geos().unwrap(),
            vec![Geo::LatLon {
                latitude: 41.88,
                longitude: -87.63
            }]
        );

        config.override_zipcodes = Some("60601, 90210".into());
        assert!(matches!(config.geos().unwrap()[0], Geo::LatLon { .. }));

        config.override_location = None;
        assert_eq!(
            config.geos().unwrap(),
            vec![
                Geo::Zipcode("60601".into()),
                Geo::Zipcode("90210".into())
            ]
        );

        config.override_location = Some("nowhere".into());
        assert!(matches!(
            config.geos(),
            Err(ConfigError::InvalidLocation(_))
        ));
    }
}
