//! Engine configuration types and defaults.
//!
//! [`HandlerConfig`] is the top-level structure handed to
//! [`MessageHandler::new`](crate::MessageHandler::new); it nests the validator
//! limits and the serializer settings so a host can load everything from a
//! single file.

use crate::message::PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Limits enforced by the [`Validator`](crate::validation::Validator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum serialized size of a message payload in bytes
    pub max_payload_bytes: usize,

    /// Maximum length of any string nested in a payload, in characters
    pub max_string_length: usize,

    /// Maximum number of elements of any array nested in a payload
    pub max_array_length: usize,

    /// Maximum nesting depth of a payload
    pub max_depth: usize,

    pub max_id_length: usize,

    pub max_operation_length: usize,

    pub max_server_id_length: usize,

    /// Clock difference above which a timestamp drift warning is produced
    pub max_clock_drift_ms: u64,

    /// Request timeouts outside `[min_timeout_ms, max_timeout_ms]` produce a warning
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,

    /// Version this engine speaks; other versions produce a warning
    pub protocol_version: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024, // 1 MiB
            max_string_length: 10_000,
            max_array_length: 1_000,
            max_depth: 32,
            max_id_length: 50,
            max_operation_length: 100,
            max_server_id_length: 64,
            max_clock_drift_ms: 60_000,
            min_timeout_ms: 1_000,
            max_timeout_ms: 300_000,
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Settings for the [`Serializer`](crate::codec::Serializer).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Wire frames larger than this are rejected before any parsing
    pub max_message_size: usize,

    /// Documents smaller than this are never compressed
    pub compression_threshold: usize,

    /// ChaCha20-Poly1305 key; encryption is unavailable without one
    #[serde(skip)]
    pub encryption_key: Option<[u8; 32]>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 2 * 1024 * 1024, // 2 MiB
            compression_threshold: 1024,
            encryption_key: None,
        }
    }
}

impl fmt::Debug for SerializerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerConfig")
            .field("max_message_size", &self.max_message_size)
            .field("compression_threshold", &self.compression_threshold)
            .field("encryption_key", &self.encryption_key.map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration of a [`MessageHandler`](crate::MessageHandler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Promote validation errors on inbound messages to hard failures
    pub strict_validation: bool,

    /// Validate every message before it is sent
    pub validate_outgoing: bool,

    /// Compress outgoing frames above the compression threshold
    pub enable_compression: bool,

    /// Encrypt outgoing frames (requires a serializer key)
    pub enable_encryption: bool,

    /// Request timeout used when neither the caller nor the latency table names one
    pub default_timeout_ms: u64,

    /// Upper bound applied to every effective request timeout
    pub max_timeout_ms: u64,

    /// Maximum number of in-flight outgoing requests
    pub max_concurrent_requests: usize,

    /// Maximum number of callers waiting for a request slot
    pub request_queue_size: usize,

    /// Role announced during the handshake
    pub server_type: String,

    /// Capabilities announced during the handshake
    pub capabilities: Vec<String>,

    /// Interval of the pending-request sweep
    pub cleanup_interval_ms: u64,

    pub validation: ValidationConfig,

    pub serializer: SerializerConfig,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            strict_validation: false,
            validate_outgoing: true,
            enable_compression: false,
            enable_encryption: false,
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            max_concurrent_requests: 100,
            request_queue_size: 1_000,
            server_type: "manager".to_string(),
            capabilities: Vec::new(),
            cleanup_interval_ms: 30_000,
            validation: ValidationConfig::default(),
            serializer: SerializerConfig::default(),
        }
    }
}

impl HandlerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be at least 1".to_string());
        }
        if self.default_timeout_ms == 0 {
            return Err("default_timeout_ms must be greater than 0".to_string());
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(format!(
                "default_timeout_ms ({}) exceeds max_timeout_ms ({})",
                self.default_timeout_ms, self.max_timeout_ms
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err("cleanup_interval_ms must be greater than 0".to_string());
        }
        if self.enable_encryption && self.serializer.encryption_key.is_none() {
            return Err("enable_encryption requires an encryption key".to_string());
        }
        if self.serializer.max_message_size == 0 {
            return Err("serializer.max_message_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HandlerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation.max_payload_bytes, 1024 * 1024);
        assert_eq!(config.validation.protocol_version, "2.0");
    }

    #[test]
    fn test_encryption_requires_key() {
        let mut config = HandlerConfig {
            enable_encryption: true,
            ..HandlerConfig::default()
        };
        assert!(config.validate().is_err());

        config.serializer.encryption_key = Some([7u8; 32]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let config = HandlerConfig {
            default_timeout_ms: 400_000,
            ..HandlerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_is_redacted_in_debug() {
        let config = SerializerConfig {
            encryption_key: Some([1u8; 32]),
            ..SerializerConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("[1, 1"));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: HandlerConfig =
            serde_json::from_str(r#"{ "strict_validation": true }"#).unwrap();
        assert!(config.strict_validation);
        assert_eq!(config.max_concurrent_requests, 100);
    }
}
