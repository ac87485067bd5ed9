//! Bridge configuration (`.metabridge.toml`)

use crate::logging::{LogConfig, LogFormat, LogOutput};
use crate::metadata::MetaFile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

/// File name searched for by `BridgeConfig::discover`
pub const CONFIG_FILE: &str = ".metabridge.toml";

/// Full path of the metadata blob, overriding `[metadata]`
pub const ENV_METADATA: &str = "METABRIDGE_METADATA";
/// Log level, overriding `[logging] level`
pub const ENV_LOG_LEVEL: &str = "METABRIDGE_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub inspector: InspectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Defaults to `metadata-<arch>.bin`
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_output")]
    pub output: OutputKind,

    /// Directory for `output = "file"`
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Extra filter directives, e.g. `metabridge=debug,metabridge_runtime=warn`
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_capacity")]
    pub initial_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Wake the consumer once per drain instead of once per push
    #[serde(default = "default_true")]
    pub wake_coalescing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// Retain console entries for the inspector log domain
    #[serde(default)]
    pub enabled: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            file_name: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            output: default_output(),
            directory: None,
            filter: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_capacity(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wake_coalescing: true,
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_level() -> String {
    "info".to_string()
}
fn default_output() -> OutputKind {
    OutputKind::Stderr
}
fn default_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}

impl LoggingConfig {
    /// Subscriber settings for these options
    pub fn to_log_config(&self) -> LogConfig {
        let level = Level::from_str(&self.level).unwrap_or(Level::INFO);
        let output = match self.output {
            OutputKind::Stdout => LogOutput::Stdout,
            OutputKind::Stderr => LogOutput::Stderr,
            OutputKind::File => LogOutput::File {
                directory: self
                    .directory
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("logs"))
                    .to_string_lossy()
                    .to_string(),
                prefix: "metabridge".to_string(),
            },
        };

        let mut config = LogConfig::new()
            .with_level(level)
            .with_format(self.format)
            .with_output(output);
        if let Some(filter) = &self.filter {
            config = config.with_filter(filter.clone());
        }
        config
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Find and load `.metabridge.toml` from the current directory or its parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(err) => tracing::warn!(
                        event = "config_invalid",
                        path = %config_path.display(),
                        error = %err,
                        "ignoring unreadable config"
                    ),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Apply `METABRIDGE_METADATA` and `METABRIDGE_LOG_LEVEL`
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_METADATA).ok(),
            std::env::var(ENV_LOG_LEVEL).ok(),
        )
    }

    pub fn with_overrides(mut self, metadata: Option<String>, level: Option<String>) -> Self {
        if let Some(path) = metadata.filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            if let Some(name) = path.file_name() {
                self.metadata.file_name = Some(name.to_string_lossy().to_string());
            }
            self.metadata.base_dir = path
                .parent()
                .map(Path::to_path_buf)
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(default_base_dir);
        }
        if let Some(level) = level.filter(|l| !l.is_empty()) {
            self.logging.level = level;
        }
        self
    }

    /// Where the metadata blob is expected
    pub fn metadata_path(&self) -> PathBuf {
        let name = self
            .metadata
            .file_name
            .clone()
            .unwrap_or_else(MetaFile::default_file_name);
        self.metadata.base_dir.join(name)
    }

    /// Default configuration as TOML
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
