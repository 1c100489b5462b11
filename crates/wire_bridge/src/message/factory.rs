//! Factory functions that stamp ids, timestamps and protocol version.

use super::operations::SystemOp;
use super::types::{Event, MessageHeader, Request, Response, SystemMessage, PROTOCOL_VERSION};
use crate::error::ErrorCode;
use crate::utils::{generate_message_id, now_millis};
use serde_json::{json, Value};

/// Optional fields for [`create_request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub id: Option<String>,
    pub server_id: Option<String>,
    pub timeout: Option<u64>,
}

/// Optional fields for [`create_response`].
#[derive(Debug, Clone)]
pub struct ResponseOptions {
    pub success: bool,
    pub error: Option<String>,
    pub server_id: Option<String>,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            success: true,
            error: None,
            server_id: None,
        }
    }
}

/// Optional fields for [`create_event`].
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    pub server_id: Option<String>,
    /// Defaults to the operation when unset
    pub event_type: Option<String>,
}

/// Optional fields for [`create_system_message`].
#[derive(Debug, Clone, Default)]
pub struct SystemOptions {
    pub server_id: Option<String>,
}

fn header(
    id: Option<String>,
    operation: String,
    payload: Value,
    server_id: Option<String>,
) -> MessageHeader {
    MessageHeader {
        id: id.unwrap_or_else(generate_message_id),
        operation,
        payload,
        timestamp: now_millis(),
        server_id,
        protocol_version: PROTOCOL_VERSION.to_string(),
    }
}

pub fn create_request(
    operation: impl Into<String>,
    payload: Value,
    options: RequestOptions,
) -> Request {
    Request {
        header: header(options.id, operation.into(), payload, options.server_id),
        timeout: options.timeout,
    }
}

/// Creates a response to `request_id`.
///
/// A failed response always carries an error text; a successful one never does.
pub fn create_response(
    request_id: impl Into<String>,
    operation: impl Into<String>,
    payload: Value,
    options: ResponseOptions,
) -> Response {
    let error = if options.success {
        None
    } else {
        Some(options.error.unwrap_or_else(|| "Unknown error".to_string()))
    };

    Response {
        header: header(None, operation.into(), payload, options.server_id),
        request_id: request_id.into(),
        success: options.success,
        error,
    }
}

pub fn create_event(operation: impl Into<String>, payload: Value, options: EventOptions) -> Event {
    let operation = operation.into();
    let event_type = options.event_type.unwrap_or_else(|| operation.clone());
    Event {
        header: header(None, operation, payload, options.server_id),
        event_type,
    }
}

/// Creates a system message; the operation is the system op itself.
pub fn create_system_message(
    system_op: SystemOp,
    payload: Value,
    options: SystemOptions,
) -> SystemMessage {
    SystemMessage {
        header: header(None, system_op.as_str().to_string(), payload, options.server_id),
        system_op,
    }
}

/// Creates a failed response carrying `{code, details}` as its payload.
pub fn create_error(
    request_id: impl Into<String>,
    operation: impl Into<String>,
    error: impl Into<String>,
    code: Option<ErrorCode>,
    details: Option<Value>,
) -> Response {
    let code = code.map(|c| c.as_str()).unwrap_or("UNKNOWN_ERROR");
    create_response(
        request_id,
        operation,
        json!({ "code": code, "details": details.unwrap_or(Value::Null) }),
        ResponseOptions {
            success: false,
            error: Some(error.into()),
            server_id: None,
        },
    )
}

impl Request {
    /// Builds a successful reply to this request.
    pub fn reply(&self, payload: Value) -> Response {
        create_response(
            self.header.id.clone(),
            self.header.operation.clone(),
            payload,
            ResponseOptions::default(),
        )
    }

    /// Builds a failed reply to this request.
    pub fn reply_error(&self, code: ErrorCode, error: impl Into<String>) -> Response {
        create_error(
            self.header.id.clone(),
            self.header.operation.clone(),
            error,
            Some(code),
            None,
        )
    }
}
