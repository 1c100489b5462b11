//! Type guards that classify an arbitrary decoded document.
//!
//! The guards only look at the discriminant fields. They are the admission
//! gate in front of validation, which does the real structural checking.

use super::types::MessageKind;
use serde_json::Value;

fn discriminant(value: &Value) -> Option<&str> {
    value.as_object()?.get("type")?.as_str()
}

/// Classifies a decoded document, or returns `None` when it is not a message.
pub fn message_kind(value: &Value) -> Option<MessageKind> {
    discriminant(value)?.parse().ok()
}

pub fn is_request(value: &Value) -> bool {
    message_kind(value) == Some(MessageKind::Request)
}

pub fn is_response(value: &Value) -> bool {
    message_kind(value) == Some(MessageKind::Response) && value.get("requestId").is_some()
}

pub fn is_event(value: &Value) -> bool {
    message_kind(value) == Some(MessageKind::Event)
}

pub fn is_system(value: &Value) -> bool {
    message_kind(value) == Some(MessageKind::System) && value.get("systemOp").is_some()
}

/// True when any of the four guards accepts the document.
pub fn is_message(value: &Value) -> bool {
    is_request(value) || is_response(value) || is_event(value) || is_system(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guards_classify_by_discriminant() {
        assert!(is_request(&json!({ "type": "request" })));
        assert!(is_event(&json!({ "type": "event" })));
        assert!(is_response(&json!({ "type": "response", "requestId": "x" })));
        assert!(is_system(&json!({ "type": "system", "systemOp": "ping" })));
    }

    #[test]
    fn test_guards_reject_missing_discriminants() {
        assert!(!is_response(&json!({ "type": "response" })));
        assert!(!is_system(&json!({ "type": "system" })));
        assert!(!is_message(&json!({ "type": "telemetry" })));
        assert!(!is_message(&json!([1, 2, 3])));
        assert!(!is_message(&json!({ "type": 7 })));
        assert_eq!(message_kind(&json!("request")), None);
    }
}
