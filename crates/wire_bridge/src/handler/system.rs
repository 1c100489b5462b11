//! Default handlers for connection-lifecycle system messages.

use crate::message::{create_system_message, SystemMessage, SystemOp, SystemOptions};
use crate::routing::{RouteContext, Router};
use crate::utils::current_timestamp;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Registers the handlers every engine answers with out of the box.
///
/// Applications may override any of them by registering the same system
/// operation again.
pub(crate) fn register_defaults(router: &Router, protocol_version: &str) {
    router.on_system(SystemOp::Ping.as_str(), |ping: SystemMessage, _ctx| async move {
        let pong =
            create_system_message(SystemOp::Pong, ping.header.payload, SystemOptions::default());
        Ok(Some(pong))
    });

    router.on_system(SystemOp::Pong.as_str(), |pong: SystemMessage, ctx: RouteContext| async move {
        match pong.header.payload.get("timestamp").and_then(Value::as_u64) {
            Some(sent_at) => {
                let latency = current_timestamp().saturating_sub(sent_at);
                ctx.connection.set_last_ping(latency);
                debug!("🏓 {} round trip: {}ms", ctx.server_id(), latency);
            }
            None => warn!("⚠️ Pong from {} carries no send time", ctx.server_id()),
        }
        Ok(None)
    });

    router.on_system(
        SystemOp::Capabilities.as_str(),
        |message: SystemMessage, ctx: RouteContext| async move {
            let capabilities = string_list(&message.header.payload, "capabilities");
            info!("🧩 {} declared capabilities: {:?}", ctx.server_id(), capabilities);
            ctx.connection.set_capabilities(capabilities);
            Ok(None)
        },
    );

    let expected_version = protocol_version.to_string();
    router.on_system(
        SystemOp::Handshake.as_str(),
        move |message: SystemMessage, ctx: RouteContext| {
            let expected_version = expected_version.clone();
            async move {
                let payload = &message.header.payload;
                let version = text_field(payload, "protocolVersion").unwrap_or("unknown");
                let server_type = text_field(payload, "serverType").unwrap_or("unknown");
                if version != expected_version {
                    warn!(
                        "⚠️ {} speaks protocol {} (expected {})",
                        ctx.server_id(),
                        version,
                        expected_version
                    );
                }
                let capabilities = string_list(payload, "capabilities");
                info!(
                    "🤝 Handshake from {} ({}), capabilities: {:?}",
                    ctx.server_id(),
                    server_type,
                    capabilities
                );
                ctx.connection.set_capabilities(capabilities);
                Ok(None)
            }
        },
    );

    router.on_system(
        SystemOp::Disconnect.as_str(),
        |message: SystemMessage, ctx: RouteContext| async move {
            let reason = text_field(&message.header.payload, "reason").unwrap_or("no reason given");
            info!("🔌 {} is disconnecting: {}", ctx.server_id(), reason);
            Ok(None)
        },
    );

    router.on_system(SystemOp::Error.as_str(), |message: SystemMessage, ctx: RouteContext| {
        async move {
            warn!("⚠️ {} reported an error: {}", ctx.server_id(), message.header.payload);
            Ok(None)
        }
    });
}

fn text_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn string_list(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelConnection, Connection};
    use crate::message::Message;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Router, Arc<dyn Connection>) {
        let router = Router::new();
        register_defaults(&router, "2.0");
        let (connection, _receiver) = ChannelConnection::new("survival-1");
        (router, Arc::new(connection))
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let (router, conn) = setup();
        let ping = create_system_message(
            SystemOp::Ping,
            json!({ "timestamp": 42 }),
            SystemOptions::default(),
        );
        match router.route(ping.into(), conn).await.unwrap() {
            Some(Message::System(pong)) => {
                assert_eq!(pong.system_op, SystemOp::Pong);
                assert_eq!(pong.header.payload["timestamp"], 42);
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pong_records_latency() {
        let (router, conn) = setup();
        let sent_at = current_timestamp() - 25;
        let pong = create_system_message(
            SystemOp::Pong,
            json!({ "timestamp": sent_at }),
            SystemOptions::default(),
        );
        assert!(router.route(pong.into(), Arc::clone(&conn)).await.unwrap().is_none());
        assert!(conn.last_ping().unwrap() >= 25);
    }

    #[tokio::test]
    async fn test_handshake_stores_capabilities_without_reply() {
        let (router, conn) = setup();
        let handshake = create_system_message(
            SystemOp::Handshake,
            json!({
                "protocolVersion": "2.0",
                "serverType": "connector",
                "capabilities": ["player_management"]
            }),
            SystemOptions::default(),
        );
        assert!(router.route(handshake.into(), Arc::clone(&conn)).await.unwrap().is_none());
        assert_eq!(conn.capabilities(), vec!["player_management".to_string()]);
    }

    #[tokio::test]
    async fn test_capabilities_replace_previous_list() {
        let (router, conn) = setup();
        conn.set_capabilities(vec!["old".into()]);
        let message = create_system_message(
            SystemOp::Capabilities,
            json!({ "capabilities": ["world_management", "console"] }),
            SystemOptions::default(),
        );
        router.route(message.into(), Arc::clone(&conn)).await.unwrap();
        assert_eq!(
            conn.capabilities(),
            vec!["world_management".to_string(), "console".to_string()]
        );
    }
}
