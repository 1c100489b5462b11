//! Configuration management for the bridge host.
//!
//! The host is configured from a TOML file with four sections. A missing
//! file is created with the defaults on first start.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use wire_bridge::{HandlerConfig, SerializerConfig, ValidationConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not write TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub protocol: ProtocolSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub limits: LimitSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Peer role, validation behaviour and request timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Role announced in the handshake (e.g. "manager")
    pub server_type: String,
    /// Capabilities announced in the handshake
    pub capabilities: Vec<String>,
    pub strict_validation: bool,
    pub validate_outgoing: bool,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
}

/// Wire transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub enable_compression: bool,
    /// Frames smaller than this are never compressed
    pub compression_threshold: usize,
    pub enable_encryption: bool,
    /// Base64 of a 32-byte key, required when encryption is enabled
    pub encryption_key: Option<String>,
}

/// Size and concurrency limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_concurrent_requests: usize,
    pub request_queue_size: usize,
    /// Largest accepted wire frame
    pub max_message_size: usize,
    /// Largest accepted `data` document
    pub max_payload_bytes: usize,
    pub max_string_length: usize,
    pub max_array_length: usize,
    pub max_depth: usize,
    pub max_clock_drift_ms: u64,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    /// Interval of the statistics report, 0 disables it
    pub stats_interval_secs: u64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        let engine = HandlerConfig::default();
        Self {
            server_type: engine.server_type,
            capabilities: engine.capabilities,
            strict_validation: engine.strict_validation,
            validate_outgoing: engine.validate_outgoing,
            default_timeout_ms: engine.default_timeout_ms,
            max_timeout_ms: engine.max_timeout_ms,
            cleanup_interval_ms: engine.cleanup_interval_ms,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enable_compression: false,
            compression_threshold: SerializerConfig::default().compression_threshold,
            enable_encryption: false,
            encryption_key: None,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        let engine = HandlerConfig::default();
        let validation = ValidationConfig::default();
        Self {
            max_concurrent_requests: engine.max_concurrent_requests,
            request_queue_size: engine.request_queue_size,
            max_message_size: engine.serializer.max_message_size,
            max_payload_bytes: validation.max_payload_bytes,
            max_string_length: validation.max_string_length,
            max_array_length: validation.max_array_length,
            max_depth: validation.max_depth,
            max_clock_drift_ms: validation.max_clock_drift_ms,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            stats_interval_secs: 60,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the TOML file; the defaults are written there
    ///   first when it does not exist
    ///
    /// # Returns
    ///
    /// The parsed configuration, or a [`ConfigError`] for I/O and parse
    /// failures. Values are not range-checked here; see [`AppConfig::validate`].
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Decodes `[security].encryption_key`.
    pub fn encryption_key(&self) -> Result<Option<[u8; 32]>, ConfigError> {
        let configured = self.security.encryption_key.as_deref();
        let Some(encoded) = configured.filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::Invalid(format!("encryption_key is not valid base64: {e}")))?;
        let key = <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            ConfigError::Invalid(format!(
                "encryption_key must decode to 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Some(key))
    }

    /// Checks values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                self.logging.level
            )));
        }
        if self.protocol.server_type.trim().is_empty() {
            return Err(ConfigError::Invalid("protocol.server_type cannot be empty".to_string()));
        }
        if self.limits.max_message_size < self.limits.max_payload_bytes {
            return Err(ConfigError::Invalid(format!(
                "limits.max_message_size ({}) is smaller than limits.max_payload_bytes ({})",
                self.limits.max_message_size, self.limits.max_payload_bytes
            )));
        }
        if self.limits.max_depth == 0 {
            return Err(ConfigError::Invalid("limits.max_depth must be greater than 0".to_string()));
        }
        self.to_handler_config()?.validate().map_err(ConfigError::Invalid)
    }

    /// Builds the engine configuration.
    pub fn to_handler_config(&self) -> Result<HandlerConfig, ConfigError> {
        let validation = ValidationConfig {
            max_payload_bytes: self.limits.max_payload_bytes,
            max_string_length: self.limits.max_string_length,
            max_array_length: self.limits.max_array_length,
            max_depth: self.limits.max_depth,
            max_clock_drift_ms: self.limits.max_clock_drift_ms,
            max_timeout_ms: self.protocol.max_timeout_ms,
            ..ValidationConfig::default()
        };
        let serializer = SerializerConfig {
            max_message_size: self.limits.max_message_size,
            compression_threshold: self.security.compression_threshold,
            encryption_key: self.encryption_key()?,
        };

        Ok(HandlerConfig {
            strict_validation: self.protocol.strict_validation,
            validate_outgoing: self.protocol.validate_outgoing,
            enable_compression: self.security.enable_compression,
            enable_encryption: self.security.enable_encryption,
            default_timeout_ms: self.protocol.default_timeout_ms,
            max_timeout_ms: self.protocol.max_timeout_ms,
            max_concurrent_requests: self.limits.max_concurrent_requests,
            request_queue_size: self.limits.request_queue_size,
            server_type: self.protocol.server_type.clone(),
            capabilities: self.protocol.capabilities.clone(),
            cleanup_interval_ms: self.protocol.cleanup_interval_ms,
            validation,
            serializer,
        })
    }
}

/// Encodes a key the way `[security].encryption_key` expects it.
pub fn encode_key(key: &[u8; 32]) -> String {
    STANDARD.encode(key)
}
