//! Structural and semantic message validation.
//!
//! Validation never fails: it always produces a [`ValidationResult`] listing
//! blocking errors and non-blocking warnings. Callers decide what to do with
//! it; [`ValidationResult::into_result`] is the boundary wrapper for callers
//! that prefer an `Err`.
//!
//! The checks run in two phases over the decoded JSON document:
//!
//! 1. structural: type discriminant, `id`, `op`, `data`, and when present
//!    `timestamp`, `serverId` and `version`
//! 2. kind-specific: request operation whitelist and timeout, response
//!    correlation fields, event type, system vocabulary, and the
//!    per-operation payload rules in [`rules`]

mod fields;
mod rules;

use crate::config::ValidationConfig;
use crate::error::CodecError;
use crate::message::{guards, Message, MessageKind};
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Machine-readable validation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidMessageType,
    MissingField,
    InvalidFieldType,
    EmptyField,
    IdTooLong,
    NonCanonicalId,
    OpTooLong,
    InvalidOpFormat,
    UnknownOperation,
    InvalidPayload,
    DataTooLarge,
    StringTooLong,
    ArrayTooLarge,
    NestingTooDeep,
    InvalidTimestamp,
    DeprecatedTimestamp,
    TimestampDrift,
    InvalidServerId,
    VersionMismatch,
    InvalidTimeout,
    TimeoutOutOfRange,
    MissingErrorMessage,
    UnexpectedErrorMessage,
    MissingServerId,
    InvalidSystemOp,
    MissingRequiredField,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            ValidationCode::MissingField => "MISSING_FIELD",
            ValidationCode::InvalidFieldType => "INVALID_FIELD_TYPE",
            ValidationCode::EmptyField => "EMPTY_FIELD",
            ValidationCode::IdTooLong => "ID_TOO_LONG",
            ValidationCode::NonCanonicalId => "NON_CANONICAL_ID",
            ValidationCode::OpTooLong => "OP_TOO_LONG",
            ValidationCode::InvalidOpFormat => "INVALID_OP_FORMAT",
            ValidationCode::UnknownOperation => "UNKNOWN_OPERATION",
            ValidationCode::InvalidPayload => "INVALID_PAYLOAD",
            ValidationCode::DataTooLarge => "DATA_TOO_LARGE",
            ValidationCode::StringTooLong => "STRING_TOO_LONG",
            ValidationCode::ArrayTooLarge => "ARRAY_TOO_LARGE",
            ValidationCode::NestingTooDeep => "NESTING_TOO_DEEP",
            ValidationCode::InvalidTimestamp => "INVALID_TIMESTAMP",
            ValidationCode::DeprecatedTimestamp => "DEPRECATED_TIMESTAMP",
            ValidationCode::TimestampDrift => "TIMESTAMP_DRIFT",
            ValidationCode::InvalidServerId => "INVALID_SERVER_ID",
            ValidationCode::VersionMismatch => "VERSION_MISMATCH",
            ValidationCode::InvalidTimeout => "INVALID_TIMEOUT",
            ValidationCode::TimeoutOutOfRange => "TIMEOUT_OUT_OF_RANGE",
            ValidationCode::MissingErrorMessage => "MISSING_ERROR_MESSAGE",
            ValidationCode::UnexpectedErrorMessage => "UNEXPECTED_ERROR_MESSAGE",
            ValidationCode::MissingServerId => "MISSING_SERVER_ID",
            ValidationCode::InvalidSystemOp => "INVALID_SYSTEM_OP",
            ValidationCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single finding, pointing at the offending field by path (`data.player.id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: ValidationCode,
    pub severity: Severity,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.field, self.message, self.code)
    }
}

/// Outcome of validating one message. Valid iff there are no errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().chain(&self.warnings).any(|i| i.code == code)
    }

    pub(crate) fn error(
        &mut self,
        field: impl Into<String>,
        code: ValidationCode,
        message: impl Into<String>,
    ) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
            code,
            severity: Severity::Error,
        });
    }

    pub(crate) fn warn(
        &mut self,
        field: impl Into<String>,
        code: ValidationCode,
        message: impl Into<String>,
    ) {
        self.warnings.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
            code,
            severity: Severity::Warning,
        });
    }

    /// Moves every error into the warning list, keeping order.
    pub fn downgrade_errors(&mut self) {
        for mut issue in self.errors.drain(..) {
            issue.severity = Severity::Warning;
            self.warnings.push(issue);
        }
    }

    /// One-line summary of the errors, used in logs and error texts.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Converts a result with errors into [`CodecError::Validation`].
    pub fn into_result(self) -> Result<ValidationResult, CodecError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(CodecError::Validation(self.error_summary()))
        }
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationResult", 3)?;
        state.serialize_field("valid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

/// Validates messages against a [`ValidationConfig`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validates a decoded wire document against the current time.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        self.validate_at(value, Utc::now())
    }

    /// Validates a decoded wire document, measuring clock drift against `now`.
    ///
    /// For a fixed `now` the result depends only on the input.
    pub fn validate_at(&self, value: &Value, now: DateTime<Utc>) -> ValidationResult {
        let mut result = ValidationResult::new();

        let Some(object) = value.as_object() else {
            result.error(
                "message",
                ValidationCode::InvalidMessageType,
                "Message must be a JSON object",
            );
            return result;
        };

        let Some(kind) = guards::message_kind(value) else {
            let message = match object.get("type") {
                Some(Value::String(t)) => format!("Unknown message type: {t}"),
                Some(_) => "Message type must be a string".to_string(),
                None => "Missing message type".to_string(),
            };
            result.error("type", ValidationCode::InvalidMessageType, message);
            return result;
        };

        let checks = fields::FieldChecks::new(&self.config, &mut result);
        checks.structure(object, now);

        match kind {
            MessageKind::Request => rules::request(&self.config, object, &mut result),
            MessageKind::Response => rules::response(&self.config, object, &mut result),
            MessageKind::Event => rules::event(object, &mut result),
            MessageKind::System => rules::system(object, &mut result),
        }

        result
    }

    /// Validates a typed message through its canonical wire document.
    pub fn validate_message(&self, message: &Message) -> ValidationResult {
        match message.to_value() {
            Ok(value) => self.validate(&value),
            Err(e) => {
                let mut result = ValidationResult::new();
                result.error(
                    "message",
                    ValidationCode::InvalidPayload,
                    format!("Message cannot be encoded: {e}"),
                );
                result
            }
        }
    }
}
