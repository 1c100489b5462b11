//! Structural checks shared by every message kind.

use super::{ValidationCode, ValidationResult};
use crate::config::ValidationConfig;
use crate::message::timestamp;
use crate::message::SystemOp;
use crate::utils::is_canonical_message_id;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub(super) struct FieldChecks<'a> {
    config: &'a ValidationConfig,
    result: &'a mut ValidationResult,
}

impl<'a> FieldChecks<'a> {
    pub(super) fn new(config: &'a ValidationConfig, result: &'a mut ValidationResult) -> Self {
        Self { config, result }
    }

    pub(super) fn structure(mut self, object: &Map<String, Value>, now: DateTime<Utc>) {
        match object.get("id") {
            None => self.result.error("id", ValidationCode::MissingField, "Missing message id"),
            Some(Value::String(id)) => self.id("id", id),
            Some(_) => self.result.error(
                "id",
                ValidationCode::InvalidFieldType,
                "Message id must be a string",
            ),
        }

        match object.get("op") {
            None => self.result.error("op", ValidationCode::MissingField, "Missing operation"),
            Some(Value::String(op)) => self.operation(op),
            Some(_) => self.result.error(
                "op",
                ValidationCode::InvalidFieldType,
                "Operation must be a string",
            ),
        }

        match object.get("data") {
            None => self.result.error("data", ValidationCode::MissingField, "Missing payload"),
            Some(data @ (Value::Object(_) | Value::Array(_))) => self.payload(data),
            Some(_) => self.result.error(
                "data",
                ValidationCode::InvalidFieldType,
                "Payload must be an object or an array",
            ),
        }

        if let Some(ts) = object.get("timestamp") {
            self.timestamp(ts, now);
        }

        match object.get("serverId") {
            None | Some(Value::Null) => {}
            Some(Value::String(server_id)) => self.server_id(server_id),
            Some(_) => self.result.error(
                "serverId",
                ValidationCode::InvalidServerId,
                "Server id must be a string",
            ),
        }

        match object.get("version") {
            None => {}
            Some(Value::String(version)) if *version == self.config.protocol_version => {}
            Some(Value::String(version)) => self.result.warn(
                "version",
                ValidationCode::VersionMismatch,
                format!(
                    "Protocol version {version} differs from {}",
                    self.config.protocol_version
                ),
            ),
            Some(_) => self.result.error(
                "version",
                ValidationCode::InvalidFieldType,
                "Protocol version must be a string",
            ),
        }
    }

    fn id(&mut self, field: &str, id: &str) {
        check_id(self.config, self.result, field, id);
    }

    fn operation(&mut self, op: &str) {
        if op.is_empty() {
            self.result.error("op", ValidationCode::EmptyField, "Operation must not be empty");
            return;
        }
        if op.len() > self.config.max_operation_length {
            self.result.error(
                "op",
                ValidationCode::OpTooLong,
                format!(
                    "Operation too long: {} characters (max {})",
                    op.len(),
                    self.config.max_operation_length
                ),
            );
            return;
        }
        if !SystemOp::is_system_operation(op) && !is_category_action(op) {
            self.result.error(
                "op",
                ValidationCode::InvalidOpFormat,
                format!("Operation {op} must have the form category.action"),
            );
        }
    }

    fn payload(&mut self, data: &Value) {
        let size = serde_json::to_vec(data).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if size > self.config.max_payload_bytes {
            self.result.error(
                "data",
                ValidationCode::DataTooLarge,
                format!(
                    "Payload too large: {size} bytes (max {})",
                    self.config.max_payload_bytes
                ),
            );
        }
        self.walk(data, "data".to_string(), 0);
    }

    /// Recursively checks nested strings, arrays and depth over the payload tree.
    fn walk(&mut self, value: &Value, path: String, depth: usize) {
        if depth > self.config.max_depth {
            self.result.error(
                path,
                ValidationCode::NestingTooDeep,
                format!("Payload nesting deeper than {}", self.config.max_depth),
            );
            return;
        }

        match value {
            Value::String(s) => {
                let len = s.chars().count();
                if len > self.config.max_string_length {
                    self.result.error(
                        path,
                        ValidationCode::StringTooLong,
                        format!(
                            "String too long: {len} characters (max {})",
                            self.config.max_string_length
                        ),
                    );
                }
            }
            Value::Array(items) => {
                if items.len() > self.config.max_array_length {
                    self.result.error(
                        path.clone(),
                        ValidationCode::ArrayTooLarge,
                        format!(
                            "Array too large: {} elements (max {})",
                            items.len(),
                            self.config.max_array_length
                        ),
                    );
                }
                for (index, item) in items.iter().enumerate() {
                    self.walk(item, format!("{path}[{index}]"), depth + 1);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let child = format!("{path}.{key}");
                    if key.chars().count() > self.config.max_string_length {
                        self.result.error(
                            child.clone(),
                            ValidationCode::StringTooLong,
                            "Object key too long",
                        );
                    }
                    self.walk(item, child, depth + 1);
                }
            }
            Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
    }

    fn timestamp(&mut self, value: &Value, now: DateTime<Utc>) {
        let parsed = match value {
            Value::String(text) => timestamp::parse_iso(text),
            Value::Number(n) => {
                let parsed = n.as_f64().and_then(timestamp::from_epoch_millis);
                if parsed.is_some() {
                    self.result.warn(
                        "timestamp",
                        ValidationCode::DeprecatedTimestamp,
                        "Epoch-millisecond timestamps are deprecated, use ISO-8601",
                    );
                }
                parsed
            }
            _ => None,
        };

        let Some(ts) = parsed else {
            self.result.error(
                "timestamp",
                ValidationCode::InvalidTimestamp,
                format!("Invalid timestamp: {value}"),
            );
            return;
        };

        let drift = (ts - now).num_milliseconds().unsigned_abs();
        if drift > self.config.max_clock_drift_ms {
            self.result.warn(
                "timestamp",
                ValidationCode::TimestampDrift,
                format!("Timestamp differs from local clock by {drift} ms"),
            );
        }
    }

    fn server_id(&mut self, server_id: &str) {
        let problem = if server_id.is_empty() {
            Some("Server id must not be empty".to_string())
        } else if server_id.len() > self.config.max_server_id_length {
            Some(format!(
                "Server id too long: {} characters (max {})",
                server_id.len(),
                self.config.max_server_id_length
            ))
        } else if !server_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            Some(format!("Server id {server_id} contains invalid characters"))
        } else {
            None
        };

        if let Some(message) = problem {
            self.result.error("serverId", ValidationCode::InvalidServerId, message);
        }
    }
}

/// Checks an identifier field (`id`, `requestId`).
pub(super) fn check_id(
    config: &ValidationConfig,
    result: &mut ValidationResult,
    field: &str,
    id: &str,
) {
    if id.is_empty() {
        result.error(field, ValidationCode::EmptyField, format!("{field} must not be empty"));
    } else if id.len() > config.max_id_length {
        result.error(
            field,
            ValidationCode::IdTooLong,
            format!("{field} too long: {} characters (max {})", id.len(), config.max_id_length),
        );
    } else if !is_canonical_message_id(id) {
        result.warn(
            field,
            ValidationCode::NonCanonicalId,
            format!("{field} {id} does not follow the <millis>-<suffix> form"),
        );
    }
}

/// Matches `^[a-z]+\.[a-zA-Z]+$`.
fn is_category_action(op: &str) -> bool {
    let Some((category, action)) = op.split_once('.') else {
        return false;
    };
    !category.is_empty()
        && category.bytes().all(|b| b.is_ascii_lowercase())
        && !action.is_empty()
        && action.bytes().all(|b| b.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_action_form() {
        assert!(is_category_action("player.kick"));
        assert!(is_category_action("world.saveAll"));
        assert!(!is_category_action("Player.kick"));
        assert!(!is_category_action("player.kick.now"));
        assert!(!is_category_action("player_kick"));
        assert!(!is_category_action(".kick"));
        assert!(!is_category_action("player."));
        assert!(!is_category_action("player.kick2"));
    }
}
