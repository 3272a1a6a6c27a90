//! Layered server configuration
//!
//! Defaults, then an optional TOML file, then `ATTENTION_*` environment
//! variables (`__` separates sections, e.g. `ATTENTION_SERVER__PORT=9000`).

use attention::AttentionConfig;
use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "attention.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub attention: AttentionConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// One JSON object per line instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://attention.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Attentive seconds after which `/get_flag` reports 1
    pub flag_threshold_secs: u64,
    /// Tag stored with a summary when the exit request carries none
    pub default_tag: String,
    pub jpeg_quality: u8,
    /// Encoded frames buffered between the frame loop and the HTTP body
    pub channel_capacity: usize,
    pub read_timeout_ms: u64,
    /// Consecutive camera timeouts tolerated before the stream ends
    pub max_consecutive_failures: u32,
    /// Draw landmarks, gaze line and status bar on streamed frames
    pub overlay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flag_threshold_secs: 100,
            default_tag: "flashcard".to_string(),
            jpeg_quality: 80,
            channel_capacity: 4,
            read_timeout_ms: 2000,
            max_consecutive_failures: 5,
            overlay: true,
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn flag_threshold(&self) -> Duration {
        Duration::from_secs(self.flag_threshold_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration; `path` overrides the default file, which is optional
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ATTENTION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
