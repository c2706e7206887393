//! Configuration for the DrishtiIO daemon
//!
//! Loads configuration from a TOML file with the minimal parameters the
//! streaming server needs: bind addresses for the two channels, the mock
//! catalog's cameras, and logging.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub logging: LoggingConfig,
}

/// Bind addresses for the two channels
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for the frame data channel
    ///
    /// Examples:
    /// - `0.0.0.0:30000` - All interfaces on port 30000
    /// - `127.0.0.1:30000` - Localhost only
    pub data_address: String,

    /// TCP bind address for the JSON control channel
    ///
    /// Conventionally the data port plus one.
    pub ctrl_address: String,
}

/// Camera catalog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    /// Camera names the mock catalog advertises, indexed in order
    pub cameras: Vec<String>,

    /// Minimum spacing between captured frames in milliseconds (0 = unpaced)
    pub frame_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default localhost configuration
    ///
    /// Suitable for testing and development. Production deployments should
    /// use a proper TOML configuration file.
    pub fn localhost_defaults() -> Self {
        Self {
            network: NetworkConfig {
                data_address: "127.0.0.1:30000".to_string(),
                ctrl_address: "127.0.0.1:30001".to_string(),
            },
            camera: CameraConfig {
                cameras: vec!["Mock Camera".to_string()],
                frame_interval_ms: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::localhost_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::localhost_defaults();
        assert_eq!(config.network.data_address, "127.0.0.1:30000");
        assert_eq!(config.network.ctrl_address, "127.0.0.1:30001");
        assert_eq!(config.camera.cameras, vec!["Mock Camera".to_string()]);
        assert_eq!(config.camera.frame_interval_ms, 30);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::localhost_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("data_address = \"127.0.0.1:30000\""));
        assert!(toml_string.contains("frame_interval_ms = 30"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[network]
data_address = "0.0.0.0:40000"
ctrl_address = "0.0.0.0:40001"

[camera]
cameras = ["Front", "Rear"]
frame_interval_ms = 0

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.network.data_address, "0.0.0.0:40000");
        assert_eq!(config.camera.cameras.len(), 2);
        assert_eq!(config.camera.frame_interval_ms, 0);
        assert_eq!(config.logging.level, "debug");
    }
}
