//! Kind-specific checks and the per-operation payload table.
//!
//! The payload table is a closed list: supporting a new operation means
//! adding one match arm below.

use super::fields::check_id;
use super::{ValidationCode, ValidationResult};
use crate::config::ValidationConfig;
use crate::message::{EventOperation, RequestOperation, SystemOp};
use serde_json::{Map, Value};

pub(super) fn request(
    config: &ValidationConfig,
    object: &Map<String, Value>,
    result: &mut ValidationResult,
) {
    if let Some(op) = object.get("op").and_then(Value::as_str) {
        match op.parse::<RequestOperation>() {
            Ok(known) => request_payload(known, object.get("data"), result),
            Err(_) => result.error(
                "op",
                ValidationCode::UnknownOperation,
                format!("Unknown request operation: {op}"),
            ),
        }
    }

    match object.get("timeout") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) => match n.as_u64() {
            Some(ms) if ms > 0 => {
                if ms < config.min_timeout_ms || ms > config.max_timeout_ms {
                    result.warn(
                        "timeout",
                        ValidationCode::TimeoutOutOfRange,
                        format!(
                            "Timeout {ms} ms outside [{}, {}] ms",
                            config.min_timeout_ms, config.max_timeout_ms
                        ),
                    );
                }
            }
            Some(_) => result.error(
                "timeout",
                ValidationCode::InvalidTimeout,
                "Timeout must be positive",
            ),
            None if n.as_f64().is_some_and(|ms| ms > 0.0) => result.error(
                "timeout",
                ValidationCode::InvalidTimeout,
                "Timeout must be a whole number of milliseconds",
            ),
            None => result.error(
                "timeout",
                ValidationCode::InvalidTimeout,
                "Timeout must be positive",
            ),
        },
        Some(_) => result.error(
            "timeout",
            ValidationCode::InvalidTimeout,
            "Timeout must be a number",
        ),
    }
}

pub(super) fn response(
    config: &ValidationConfig,
    object: &Map<String, Value>,
    result: &mut ValidationResult,
) {
    match object.get("requestId") {
        None => result.error("requestId", ValidationCode::MissingField, "Missing requestId"),
        Some(Value::String(id)) => check_id(config, result, "requestId", id),
        Some(_) => result.error(
            "requestId",
            ValidationCode::InvalidFieldType,
            "requestId must be a string",
        ),
    }

    match object.get("success") {
        None => result.error("success", ValidationCode::MissingField, "Missing success flag"),
        Some(Value::Bool(false)) => match object.get("error") {
            None | Some(Value::Null) => result.warn(
                "error",
                ValidationCode::MissingErrorMessage,
                "Failed response carries no error message",
            ),
            Some(Value::String(_)) => {}
            Some(_) => result.error(
                "error",
                ValidationCode::InvalidFieldType,
                "error must be a string",
            ),
        },
        Some(Value::Bool(true)) => {
            if !matches!(object.get("error"), None | Some(Value::Null)) {
                result.warn(
                    "error",
                    ValidationCode::UnexpectedErrorMessage,
                    "Successful response carries an error message",
                );
            }
        }
        Some(_) => result.error(
            "success",
            ValidationCode::InvalidFieldType,
            "success must be a boolean",
        ),
    }
}

pub(super) fn event(object: &Map<String, Value>, result: &mut ValidationResult) {
    match object.get("eventType") {
        None => result.error("eventType", ValidationCode::MissingField, "Missing eventType"),
        Some(Value::String(t)) if t.is_empty() => {
            result.error("eventType", ValidationCode::EmptyField, "eventType must not be empty")
        }
        Some(Value::String(_)) => {}
        Some(_) => result.error(
            "eventType",
            ValidationCode::InvalidFieldType,
            "eventType must be a string",
        ),
    }

    if matches!(object.get("serverId"), None | Some(Value::Null)) {
        result.warn(
            "serverId",
            ValidationCode::MissingServerId,
            "Event does not name its origin server",
        );
    }

    if let Some(Ok(known)) = object
        .get("op")
        .and_then(Value::as_str)
        .map(str::parse::<EventOperation>)
    {
        event_payload(known, object.get("data"), result);
    }
}

pub(super) fn system(object: &Map<String, Value>, result: &mut ValidationResult) {
    let system_op = match object.get("systemOp") {
        None => {
            result.error("systemOp", ValidationCode::MissingField, "Missing systemOp");
            return;
        }
        Some(Value::String(op)) => match op.parse::<SystemOp>() {
            Ok(op) => op,
            Err(_) => {
                result.error(
                    "systemOp",
                    ValidationCode::InvalidSystemOp,
                    format!("Unknown system operation: {op}"),
                );
                return;
            }
        },
        Some(_) => {
            result.error("systemOp", ValidationCode::InvalidFieldType, "systemOp must be a string");
            return;
        }
    };

    system_payload(system_op, object.get("data"), result);
}

fn request_payload(op: RequestOperation, data: Option<&Value>, result: &mut ValidationResult) {
    use RequestOperation::*;

    let data = Payload { data, result };
    match op {
        PlayerKick | PlayerBan | PlayerUnban | PlayerInfo | WhitelistAdd | WhitelistRemove => {
            data.require("playerId");
        }
        PlayerMessage => {
            let data = data.require("playerId");
            data.require_string("message");
        }
        CommandExecute => {
            data.require_string("command");
        }
        _ => {}
    }
}

fn event_payload(op: EventOperation, data: Option<&Value>, result: &mut ValidationResult) {
    use EventOperation::*;

    let data = Payload { data, result };
    match op {
        PlayerJoin | PlayerLeave => {
            data.require_player();
        }
        PlayerChat => {
            let data = data.require_player();
            data.require_string("message");
        }
        _ => {}
    }
}

fn system_payload(op: SystemOp, data: Option<&Value>, result: &mut ValidationResult) {
    let data = Payload { data, result };
    match op {
        SystemOp::Handshake => {
            let data = data.require("protocolVersion");
            data.require("serverType");
        }
        SystemOp::Capabilities => {
            data.require_array("capabilities");
        }
        _ => {}
    }
}

/// Field presence checks over a message payload, reporting under `data.<field>`.
struct Payload<'a, 'v> {
    data: Option<&'v Value>,
    result: &'a mut ValidationResult,
}

impl<'a, 'v> Payload<'a, 'v> {
    fn field(&self, name: &str) -> Option<&'v Value> {
        self.data?.get(name).filter(|v| !v.is_null())
    }

    fn missing(&mut self, name: &str) {
        self.result.error(
            format!("data.{name}"),
            ValidationCode::MissingRequiredField,
            format!("Payload requires {name}"),
        );
    }

    fn require(mut self, name: &str) -> Self {
        if self.field(name).is_none() {
            self.missing(name);
        }
        self
    }

    fn require_string(mut self, name: &str) -> Self {
        match self.field(name) {
            None => self.missing(name),
            Some(Value::String(_)) => {}
            Some(_) => self.result.error(
                format!("data.{name}"),
                ValidationCode::InvalidFieldType,
                format!("{name} must be a string"),
            ),
        }
        self
    }

    fn require_array(mut self, name: &str) -> Self {
        match self.field(name) {
            None => self.missing(name),
            Some(Value::Array(_)) => {}
            Some(_) => self.result.error(
                format!("data.{name}"),
                ValidationCode::InvalidFieldType,
                format!("{name} must be an array"),
            ),
        }
        self
    }

    /// Requires `player: { id, name }`.
    fn require_player(mut self) -> Self {
        match self.field("player") {
            None => self.missing("player"),
            Some(Value::Object(player)) => {
                for key in ["id", "name"] {
                    if player.get(key).map_or(true, Value::is_null) {
                        self.result.error(
                            format!("data.player.{key}"),
                            ValidationCode::MissingRequiredField,
                            format!("Player object requires {key}"),
                        );
                    }
                }
            }
            Some(_) => self.result.error(
                "data.player",
                ValidationCode::InvalidFieldType,
                "player must be an object",
            ),
        }
        self
    }
}
