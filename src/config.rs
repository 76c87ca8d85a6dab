//! Configuration file handling for sono-capture.
//!
//! Loads configuration from `~/.config/sono-capture/config.toml` or a
//! custom path. Every field has a default matching the documented capture
//! setup, so a missing file is fine; a file that exists but does not parse
//! is not.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::calibration::ImageOrientation;
use crate::capture::Source;
use crate::transmit::PacketLayout;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: Source,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: Source::File(PathBuf::from("recordings/bk5000.mp4")),
            width: 1024,
            height: 768,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub directory: PathBuf,
    pub fps: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("recordings"), fps: 60 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the UDP socket binds to.
    pub local_addr: SocketAddr,
    /// Peer transmitted targets are sent to.
    pub peer_addr: SocketAddr,
    /// Packet layout descriptor, e.g. `2d` or `>2f`.
    pub layout: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_addr: "127.0.0.1:60511".parse().expect("valid default address"),
            peer_addr: "127.0.0.1:60522".parse().expect("valid default address"),
            layout: "2d".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Initial origin in pixels; defaults to the frame center.
    pub origin: Option<[i32; 2]>,
    pub orientation: ImageOrientation,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Without one, the default
    /// path is used if present, and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::read(p),
            None => {
                let p = default_path();
                if p.exists() {
                    Self::read(&p)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid {
                message: "capture width and height must be greater than 0".to_string(),
            });
        }
        if self.recording.fps == 0 {
            return Err(ConfigError::Invalid {
                message: "recording fps must be greater than 0".to_string(),
            });
        }
        if let Err(e) = PacketLayout::parse(&self.network.layout) {
            return Err(ConfigError::Invalid { message: e.to_string() });
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Invalid { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("sono-capture/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_no_explicit_path() {
        let config = Config::default();
        assert_eq!(config.capture.width, 1024);
        assert_eq!(config.capture.height, 768);
        assert_eq!(config.recording.fps, 60);
        assert_eq!(config.recording.directory, PathBuf::from("recordings"));
        assert_eq!(config.network.layout, "2d");
        assert_eq!(
            config.network.peer_addr,
            "127.0.0.1:60522".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.calibration.origin, None);
        assert_eq!(config.calibration.orientation, ImageOrientation::TopDown);
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [capture]
            source = 1
            width = 640
            height = 480

            [recording]
            directory = "clips"
            fps = 30

            [network]
            local_addr = "0.0.0.0:7000"
            peer_addr = "10.0.0.5:7001"
            layout = ">2d"

            [calibration]
            origin = [320, 240]
            orientation = "bottom-up"
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!(matches!(config.capture.source, Source::Device(1)));
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.recording.directory, PathBuf::from("clips"));
        assert_eq!(config.network.layout, ">2d");
        assert_eq!(config.calibration.origin, Some([320, 240]));
        assert_eq!(config.calibration.orientation, ImageOrientation::BottomUp);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [capture]
            width = 800
            "#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.width, 800);
        assert_eq!(config.capture.height, 768);
        assert_eq!(config.recording.fps, 60);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/sono.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not valid toml [").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[capture]\nwidth = 0\n").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_bad_layout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[network]\nlayout = \"7q\"\n").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
