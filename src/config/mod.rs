//! Configuration for the CTP7 digi decoder
//!
//! Loaded from a TOML file with a single `[decoder]` section. Key names
//! accept both snake_case and the camelCase spellings used by the readout
//! board's job configuration (`ctp7Host`, `mp7Mapping`, ...).
//!
//! # Example
//! ```ignore
//! let config = Config::load("decoder.toml")?;
//! config.validate()?;
//! let reader = Reader::new(ReaderConfig::from_config(&config)?)?;
//! ```

use crate::reader::decoder::MappingScheme;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderFileConfig,
}

/// `[decoder]` section
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderFileConfig {
    /// CTP7 host name or address
    #[serde(default = "default_host", alias = "ctp7Host")]
    pub ctp7_host: String,

    /// CTP7 TCP port (kept as a string, validated on use)
    #[serde(default = "default_port", alias = "ctp7Port")]
    pub ctp7_port: String,

    /// Replay from `test_file` instead of connecting to the board
    #[serde(default)]
    pub test: bool,

    /// Write a per-field decode trace to `link_file`
    #[serde(default, alias = "createLinkFile")]
    pub create_link_file: bool,

    /// Replay test-vector file
    #[serde(default = "default_test_file", alias = "testFile")]
    pub test_file: PathBuf,

    /// Use the MP7 link mapping instead of the CTP7 one
    #[serde(default, alias = "mp7Mapping")]
    pub mp7_mapping: bool,

    /// Decode trace output path
    #[serde(default = "default_link_file", alias = "linkFile")]
    pub link_file: PathBuf,

    /// Append every acquired raw buffer here in replay format
    #[serde(default, alias = "daqFile")]
    pub dump_file: Option<PathBuf>,

    /// Bunch crossings per cycle
    #[serde(default = "default_crossings")]
    pub crossings: u32,

    /// Bounded wait for live socket reads
    #[serde(default = "default_read_timeout_ms", alias = "readTimeoutMs")]
    pub read_timeout_ms: u64,
}

impl Default for DecoderFileConfig {
    fn default() -> Self {
        Self {
            ctp7_host: default_host(),
            ctp7_port: default_port(),
            test: false,
            create_link_file: false,
            test_file: default_test_file(),
            mp7_mapping: false,
            link_file: default_link_file(),
            dump_file: None,
            crossings: default_crossings(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> String {
    "5555".to_string()
}

fn default_test_file() -> PathBuf {
    PathBuf::from("testFile.txt")
}

fn default_link_file() -> PathBuf {
    PathBuf::from("linkFile.txt")
}

fn default_crossings() -> u32 {
    1
}

fn default_read_timeout_ms() -> u64 {
    1000
}

impl DecoderFileConfig {
    /// Selected mapping scheme
    pub fn scheme(&self) -> MappingScheme {
        MappingScheme::from_mp7_flag(self.mp7_mapping)
    }

    /// Parsed CTP7 port
    pub fn port(&self) -> Result<u16, ConfigError> {
        self.ctp7_port
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid("ctp7_port", format!("{:?}: {}", self.ctp7_port, e)))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        let decoder = &self.decoder;

        if !decoder.test {
            decoder.port()?;
            if decoder.ctp7_host.trim().is_empty() {
                return Err(ConfigError::invalid("ctp7_host", "must not be empty"));
            }
            if decoder.read_timeout_ms == 0 {
                return Err(ConfigError::invalid("read_timeout_ms", "must be > 0"));
            }
        }

        if decoder.crossings == 0 {
            return Err(ConfigError::invalid("crossings", "must be >= 1"));
        }

        let scheme = decoder.scheme();
        if decoder.crossings as usize > scheme.max_crossings() {
            return Err(ConfigError::invalid(
                "crossings",
                format!(
                    "{} exceeds capture RAM capacity of {} crossings for {} mapping",
                    decoder.crossings,
                    scheme.max_crossings(),
                    scheme
                ),
            ));
        }

        Ok(())
    }
}
