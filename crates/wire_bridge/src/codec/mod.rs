//! Wire serializer: canonical JSON plus self-describing transforms.
//!
//! Frames are built in a fixed order: JSON document, then optional
//! compression, then optional encryption. Each transform prefixes its output
//! with a marker starting with a NUL byte, which can never begin a JSON text,
//! so a decoder detects and reverses exactly what the sender applied:
//!
//! ```text
//! \0WBPE | nonce(12) | ChaCha20-Poly1305( \0WBPC | deflate( json ) )
//! ```

pub mod compression;
pub mod encryption;

use crate::config::{SerializerConfig, ValidationConfig};
use crate::error::CodecError;
use crate::message::{guards, Message, MessageKind};
use crate::validation::{ValidationResult, Validator};
use encryption::Cipher;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, trace};

/// Prefix of a compressed frame.
pub const COMPRESSION_MARKER: &[u8] = b"\0WBPC";

/// Prefix of an encrypted frame.
pub const ENCRYPTION_MARKER: &[u8] = b"\0WBPE";

/// Per-call options for [`Serializer::serialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    pub validate: bool,
    /// Fail on validation errors instead of attaching them
    pub strict: bool,
    pub compress: bool,
    pub encrypt: bool,
}

/// Per-call options for [`Serializer::deserialize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeserializeOptions {
    pub validate: bool,
    /// Fail on validation errors instead of downgrading them to warnings
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SerializationMetadata {
    pub original_size: usize,
    pub compressed_size: Option<usize>,
    pub encrypted: bool,
    pub compression_ratio: Option<f64>,
}

#[derive(Debug)]
pub struct SerializationResult {
    pub outcome: Result<Vec<u8>, CodecError>,
    pub metadata: SerializationMetadata,
    pub validation: Option<ValidationResult>,
}

impl SerializationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Boundary wrapper for callers that want a plain `Result`.
    pub fn into_result(self) -> Result<Vec<u8>, CodecError> {
        self.outcome
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeserializationMetadata {
    pub size: usize,
    pub was_compressed: bool,
    pub was_encrypted: bool,
}

/// Identity of a message that parsed but could not be accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOrigin {
    pub kind: MessageKind,
    pub id: Option<String>,
    pub operation: Option<String>,
}

#[derive(Debug)]
pub struct DeserializationResult {
    pub outcome: Result<Message, CodecError>,
    pub metadata: DeserializationMetadata,
    pub validation: Option<ValidationResult>,
    /// Set on failures that happened after the document was parsed
    pub origin: Option<MessageOrigin>,
}

impl DeserializationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<Message, CodecError> {
        self.outcome
    }

    fn failed(error: CodecError, metadata: DeserializationMetadata) -> Self {
        Self {
            outcome: Err(error),
            metadata,
            validation: None,
            origin: None,
        }
    }
}

pub struct Serializer {
    config: SerializerConfig,
    validator: Validator,
    cipher: Option<Cipher>,
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("config", &self.config)
            .field("encryption", &self.cipher.is_some())
            .finish()
    }
}

impl Serializer {
    pub fn new(config: SerializerConfig, validation: ValidationConfig) -> Result<Self, CodecError> {
        let cipher = config.encryption_key.as_ref().map(Cipher::new).transpose()?;
        Ok(Self {
            config,
            validator: Validator::new(validation),
            cipher,
        })
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn can_encrypt(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encodes `message` into a wire frame.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to encode
    /// * `options` - Validation, strictness and which transforms to apply
    ///
    /// # Returns
    ///
    /// A [`SerializationResult`] carrying either the frame or the failure,
    /// plus size metadata. Compression only applies above
    /// `compression_threshold` and when it actually shrinks the document;
    /// encryption always wraps whatever compression produced.
    pub fn serialize(&self, message: &Message, options: SerializeOptions) -> SerializationResult {
        let mut metadata = SerializationMetadata::default();
        let mut validation = None;
        let outcome = self.encode(message, options, &mut metadata, &mut validation);

        trace!(
            "📦 Serialized {} {} ({} bytes, compressed: {:?}, encrypted: {})",
            message.kind(),
            message.operation(),
            metadata.original_size,
            metadata.compressed_size,
            metadata.encrypted
        );

        SerializationResult {
            outcome,
            metadata,
            validation,
        }
    }

    fn encode(
        &self,
        message: &Message,
        options: SerializeOptions,
        metadata: &mut SerializationMetadata,
        validation: &mut Option<ValidationResult>,
    ) -> Result<Vec<u8>, CodecError> {
        let document = message.to_value()?;

        if options.validate {
            let result = self.validator.validate(&document);
            let rejected = options.strict && !result.is_valid();
            let summary = result.error_summary();
            *validation = Some(result);
            if rejected {
                return Err(CodecError::Validation(summary));
            }
        }

        let mut frame = serde_json::to_vec(&document)?;
        metadata.original_size = frame.len();

        if options.compress && frame.len() >= self.config.compression_threshold {
            if let Some(compressed) = compression::compress(&frame)? {
                metadata.compressed_size = Some(compressed.len());
                metadata.compression_ratio = Some(compressed.len() as f64 / frame.len() as f64);
                frame = framed(COMPRESSION_MARKER, &compressed);
            }
        }

        if options.encrypt {
            let cipher = self.cipher.as_ref().ok_or(CodecError::EncryptionUnavailable)?;
            frame = framed(ENCRYPTION_MARKER, &cipher.encrypt(&frame)?);
            metadata.encrypted = true;
        }

        if frame.len() > self.config.max_message_size {
            return Err(CodecError::TooLarge {
                size: frame.len(),
                max: self.config.max_message_size,
            });
        }
        Ok(frame)
    }

    /// Decodes a wire frame, reversing whichever transforms its markers announce.
    ///
    /// # Arguments
    ///
    /// * `data` - The raw frame as received
    /// * `options` - Whether to validate, and whether validation errors are fatal
    ///
    /// # Returns
    ///
    /// A [`DeserializationResult`]. On failure `origin` names the message the
    /// frame claimed to be, when the JSON could be parsed at all.
    pub fn deserialize(&self, data: &[u8], options: DeserializeOptions) -> DeserializationResult {
        let mut metadata = DeserializationMetadata {
            size: data.len(),
            ..Default::default()
        };

        if data.len() > self.config.max_message_size {
            return DeserializationResult::failed(
                CodecError::TooLarge {
                    size: data.len(),
                    max: self.config.max_message_size,
                },
                metadata,
            );
        }

        let mut bytes = data.to_vec();

        if let Some(body) = data.strip_prefix(ENCRYPTION_MARKER) {
            let Some(cipher) = self.cipher.as_ref() else {
                return DeserializationResult::failed(CodecError::EncryptionUnavailable, metadata);
            };
            match cipher.decrypt(body) {
                Ok(plain) => bytes = plain,
                Err(e) => return DeserializationResult::failed(e, metadata),
            }
            metadata.was_encrypted = true;
        }

        if let Some(body) = bytes.strip_prefix(COMPRESSION_MARKER) {
            match compression::decompress(body, self.config.max_message_size) {
                Ok(plain) => bytes = plain,
                Err(e) => return DeserializationResult::failed(e, metadata),
            }
            metadata.was_compressed = true;
        }

        let document: Value = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(e) => return DeserializationResult::failed(CodecError::Json(e), metadata),
        };

        if !guards::is_message(&document) {
            return DeserializationResult::failed(
                CodecError::NotAMessage("document does not match any message kind".to_string()),
                metadata,
            );
        }
        let origin = origin_of(&document);

        let mut validation = None;
        if options.validate {
            let mut result = self.validator.validate(&document);
            if !result.is_valid() {
                if options.strict {
                    let error = CodecError::Validation(result.error_summary());
                    return DeserializationResult {
                        outcome: Err(error),
                        metadata,
                        validation: Some(result),
                        origin,
                    };
                }
                debug!("Accepting message with validation errors: {}", result.error_summary());
                result.downgrade_errors();
            }
            validation = Some(result);
        }

        match Message::from_value(document) {
            Ok(message) => DeserializationResult {
                outcome: Ok(message),
                metadata,
                validation,
                origin: None,
            },
            Err(e) => DeserializationResult {
                outcome: Err(CodecError::Json(e)),
                metadata,
                validation,
                origin,
            },
        }
    }
}

fn framed(marker: &[u8], body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(marker.len() + body.len());
    frame.extend_from_slice(marker);
    frame.extend_from_slice(body);
    frame
}

fn origin_of(document: &Value) -> Option<MessageOrigin> {
    Some(MessageOrigin {
        kind: guards::message_kind(document)?,
        id: document.get("id").and_then(Value::as_str).map(str::to_string),
        operation: document.get("op").and_then(Value::as_str).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        create_event, create_request, create_response, create_system_message, EventOptions,
        RequestOptions, ResponseOptions, SystemOp, SystemOptions,
    };
    use crate::validation::ValidationCode;
    use serde_json::json;

    fn serializer() -> Serializer {
        let config = SerializerConfig {
            encryption_key: Some(encryption::generate_key()),
            compression_threshold: 64,
            ..SerializerConfig::default()
        };
        Serializer::new(config, ValidationConfig::default()).unwrap()
    }

    fn sample_messages() -> Vec<Message> {
        let filler = "lorem ipsum ".repeat(50);
        vec![
            create_request(
                "player.message",
                json!({ "playerId": "abc", "message": filler }),
                RequestOptions {
                    timeout: Some(5000),
                    server_id: Some("survival-1".into()),
                    ..Default::default()
                },
            )
            .into(),
            create_response(
                "1700000000000-abcdefghi",
                "player.kick",
                json!({}),
                ResponseOptions::default(),
            )
            .into(),
            create_event(
                "player.chat",
                json!({ "player": { "id": "1", "name": "Alex" }, "message": "hi" }),
                EventOptions {
                    server_id: Some("lobby".into()),
                    ..Default::default()
                },
            )
            .into(),
            create_system_message(
                SystemOp::Pong,
                json!({ "timestamp": 5 }),
                SystemOptions::default(),
            )
            .into(),
        ]
    }

    #[test]
    fn test_round_trip_across_transforms() {
        let serializer = serializer();
        for message in sample_messages() {
            for compress in [false, true] {
                for encrypt in [false, true] {
                    let options = SerializeOptions {
                        validate: true,
                        strict: true,
                        compress,
                        encrypt,
                    };
                    let frame = serializer.serialize(&message, options).into_result().unwrap();
                    let decoded = serializer
                        .deserialize(&frame, DeserializeOptions { validate: true, strict: true });
                    assert_eq!(decoded.metadata.was_encrypted, encrypt);
                    assert_eq!(decoded.into_result().unwrap(), message);
                }
            }
        }
    }

    #[test]
    fn test_compression_metadata() {
        let serializer = serializer();
        let message = &sample_messages()[0];
        let result = serializer.serialize(
            message,
            SerializeOptions {
                compress: true,
                ..Default::default()
            },
        );
        let ratio = result.metadata.compression_ratio.unwrap();
        assert!(ratio < 1.0);
        let frame = result.into_result().unwrap();
        assert!(frame.starts_with(COMPRESSION_MARKER));

        let decoded = serializer.deserialize(&frame, DeserializeOptions::default());
        assert!(decoded.metadata.was_compressed);
        assert!(!decoded.metadata.was_encrypted);
    }

    #[test]
    fn test_small_frames_are_not_compressed() {
        let serializer = serializer();
        let message = &sample_messages()[3];
        let result = serializer.serialize(
            message,
            SerializeOptions {
                compress: true,
                ..Default::default()
            },
        );
        assert!(result.metadata.compressed_size.is_none());
        assert!(result.into_result().unwrap().starts_with(b"{"));
    }

    #[test]
    fn test_encryption_without_key() {
        let serializer =
            Serializer::new(SerializerConfig::default(), ValidationConfig::default()).unwrap();
        let message = &sample_messages()[1];
        let result = serializer.serialize(
            message,
            SerializeOptions {
                encrypt: true,
                ..Default::default()
            },
        );
        assert!(matches!(result.outcome, Err(CodecError::EncryptionUnavailable)));

        let frame = self::serializer()
            .serialize(message, SerializeOptions { encrypt: true, ..Default::default() })
            .into_result()
            .unwrap();
        let decoded = serializer.deserialize(&frame, DeserializeOptions::default());
        assert!(matches!(decoded.outcome, Err(CodecError::EncryptionUnavailable)));
    }

    #[test]
    fn test_oversize_input_is_rejected_before_parsing() {
        let config = SerializerConfig {
            max_message_size: 16,
            ..SerializerConfig::default()
        };
        let serializer = Serializer::new(config, ValidationConfig::default()).unwrap();
        let decoded = serializer.deserialize(&[b'x'; 17], DeserializeOptions::default());
        assert!(matches!(decoded.outcome, Err(CodecError::TooLarge { size: 17, max: 16 })));
    }

    #[test]
    fn test_garbage_input() {
        let serializer = serializer();
        let decoded = serializer.deserialize(b"not json", DeserializeOptions::default());
        assert!(matches!(decoded.outcome, Err(CodecError::Json(_))));

        let decoded =
            serializer.deserialize(br#"{"type":"gossip"}"#, DeserializeOptions::default());
        assert!(matches!(decoded.outcome, Err(CodecError::NotAMessage(_))));

        let decoded = serializer.deserialize(b"\0WBPC\xff\xff", DeserializeOptions::default());
        assert!(!decoded.metadata.was_compressed);
        assert!(matches!(decoded.outcome, Err(CodecError::Decompression(_))));
    }

    #[test]
    fn test_strict_and_lenient_validation() {
        let serializer = serializer();
        let frame = serde_json::to_vec(&json!({
            "type": "request",
            "id": "1700000000000-abcdefghi",
            "op": "doStuff",
            "data": {},
            "version": "2.0"
        }))
        .unwrap();

        let strict = serializer.deserialize(
            &frame,
            DeserializeOptions {
                validate: true,
                strict: true,
            },
        );
        assert!(matches!(strict.outcome, Err(CodecError::Validation(_))));
        let origin = strict.origin.unwrap();
        assert_eq!(origin.kind, MessageKind::Request);
        assert_eq!(origin.id.as_deref(), Some("1700000000000-abcdefghi"));
        assert_eq!(origin.operation.as_deref(), Some("doStuff"));
        assert!(strict.validation.unwrap().has_code(ValidationCode::InvalidOpFormat));

        let lenient = serializer.deserialize(
            &frame,
            DeserializeOptions {
                validate: true,
                strict: false,
            },
        );
        let validation = lenient.validation.clone().unwrap();
        assert!(validation.is_valid());
        assert!(validation.has_code(ValidationCode::InvalidOpFormat));
        assert_eq!(lenient.into_result().unwrap().operation(), "doStuff");
    }

    #[test]
    fn test_fractional_timeout_fails_validation_not_decoding() {
        let serializer = serializer();
        let frame = serde_json::to_vec(&json!({
            "type": "request",
            "id": "1700000000000-abcdefghi",
            "op": "server.info",
            "data": {},
            "timeout": 1500.5,
            "version": "2.0"
        }))
        .unwrap();

        let strict = serializer.deserialize(
            &frame,
            DeserializeOptions {
                validate: true,
                strict: true,
            },
        );
        assert!(matches!(strict.outcome, Err(CodecError::Validation(_))));
        assert!(strict.validation.unwrap().has_code(ValidationCode::InvalidTimeout));
        assert!(strict.origin.is_some());
    }

    #[test]
    fn test_strict_serialize_refuses_invalid_message() {
        let serializer = serializer();
        let message: Message =
            create_request("doStuff", json!({}), RequestOptions::default()).into();
        let result = serializer.serialize(
            &message,
            SerializeOptions {
                validate: true,
                strict: true,
                ..Default::default()
            },
        );
        assert!(matches!(result.outcome, Err(CodecError::Validation(_))));
        assert!(!result.validation.unwrap().is_valid());
    }
}
