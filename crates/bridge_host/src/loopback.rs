//! In-memory self-test: two engines wired back to back.
//!
//! A manager and a connector exchange handshakes, the manager pings the
//! connector and then asks it for `server.status`. Exercises the whole
//! engine, transforms included, without opening a socket.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use wire_bridge::{
    ChannelConnection, Connection, HandlerConfig, MessageHandler, ProtocolError, Request, Router,
    SendRequestOptions,
};

const CONNECTOR_ID: &str = "loopback-connector";
const MANAGER_ID: &str = "loopback-manager";

/// What the manager learned about the connector.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestReport {
    pub peer_capabilities: Vec<String>,
    pub latency_ms: Option<u64>,
    pub status: Value,
    pub elapsed_ms: u128,
}

/// Runs the self-test.
///
/// # Arguments
///
/// * `config` - Engine configuration for the manager side; the connector
///   reuses it with its own role and capabilities
///
/// # Returns
///
/// A [`SelfTestReport`] when the handshake, ping and status request all
/// succeed, otherwise the first [`ProtocolError`] encountered.
pub async fn run_self_test(config: HandlerConfig) -> Result<SelfTestReport, ProtocolError> {
    let started = Instant::now();

    let connector_config = HandlerConfig {
        server_type: "connector".to_string(),
        capabilities: vec!["player_management".to_string(), "server_status".to_string()],
        ..config.clone()
    };
    let manager = MessageHandler::new(Arc::new(Router::new()), config)?;
    let connector = MessageHandler::new(Arc::new(Router::new()), connector_config)?;

    connector
        .router()
        .on_request("server.status", move |request: Request, _ctx| async move {
            Ok(request.reply(json!({
                "online": true,
                "players": 0,
                "uptimeMs": started.elapsed().as_millis() as u64,
            })))
        });

    let (to_connector, connector_inbox) = ChannelConnection::new(CONNECTOR_ID);
    let (to_manager, manager_inbox) = ChannelConnection::new(MANAGER_ID);
    let to_connector: Arc<dyn Connection> = Arc::new(to_connector);
    let to_manager: Arc<dyn Connection> = Arc::new(to_manager);

    let connector_worker = tokio::spawn({
        let connector = connector.clone();
        let reply_to = Arc::clone(&to_manager);
        async move { connector.serve(reply_to, connector_inbox).await }
    });
    let manager_worker = tokio::spawn({
        let manager = manager.clone();
        let reply_to = Arc::clone(&to_connector);
        async move { manager.serve(reply_to, manager_inbox).await }
    });

    let result = exchange(&manager, &connector, to_connector.as_ref(), to_manager.as_ref()).await;

    manager.shutdown();
    connector.shutdown();
    connector_worker.abort();
    manager_worker.abort();

    let (status, latency_ms) = result?;
    let report = SelfTestReport {
        peer_capabilities: to_connector.capabilities(),
        latency_ms,
        status,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(
        "✅ Self-test passed in {}ms (peer capabilities: {:?}, latency: {:?}ms)",
        report.elapsed_ms, report.peer_capabilities, report.latency_ms
    );
    Ok(report)
}

/// Each side handles its inbox in order, so by the time the status response
/// arrives the connector's handshake and pong have already been processed.
async fn exchange(
    manager: &MessageHandler,
    connector: &MessageHandler,
    to_connector: &dyn Connection,
    to_manager: &dyn Connection,
) -> Result<(Value, Option<u64>), ProtocolError> {
    futures::future::try_join(
        manager.perform_handshake(to_connector),
        connector.perform_handshake(to_manager),
    )
    .await?;

    manager.ping(to_connector).await?;

    let response = manager
        .send_request(
            to_connector,
            "server.status",
            json!({}),
            SendRequestOptions {
                timeout: Some(Duration::from_secs(5)),
                server_id: Some(MANAGER_ID.to_string()),
            },
        )
        .await?;

    Ok((response.header.payload, to_connector.last_ping()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire_bridge::codec::encryption::generate_key;

    #[tokio::test]
    async fn test_self_test_with_defaults() {
        let report = run_self_test(HandlerConfig::default()).await.unwrap();
        assert_eq!(report.peer_capabilities, vec!["player_management", "server_status"]);
        assert!(report.latency_ms.is_some());
        assert_eq!(report.status["online"], true);
    }

    #[tokio::test]
    async fn test_self_test_with_transforms() {
        let mut config = HandlerConfig {
            strict_validation: true,
            enable_compression: true,
            enable_encryption: true,
            ..Default::default()
        };
        config.serializer.compression_threshold = 0;
        config.serializer.encryption_key = Some(generate_key());

        let report = run_self_test(config).await.unwrap();
        assert_eq!(report.status["players"], 0);
    }

    #[tokio::test]
    async fn test_self_test_rejects_invalid_config() {
        let config = HandlerConfig {
            enable_encryption: true,
            ..Default::default()
        };
        assert!(run_self_test(config).await.is_err());
    }
}
