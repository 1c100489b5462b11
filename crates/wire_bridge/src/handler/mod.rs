//! The engine facade: decode, route, reply, and correlate outgoing requests.

mod admission;
mod pending;
mod stats;
mod system;

pub use stats::HandlerStats;

use crate::codec::{DeserializationResult, DeserializeOptions, SerializeOptions, Serializer};
use crate::config::HandlerConfig;
use crate::connection::Connection;
use crate::error::{ErrorCode, ProtocolError};
use crate::message::{
    create_error, create_event, create_request, create_system_message, EventOptions, Message,
    MessageKind, RequestOptions, Response, SystemOp, SystemOptions,
};
use crate::routing::{effective_timeout, Router};
use crate::utils::current_timestamp;
use admission::Admission;
use futures::future::join_all;
use pending::{PendingRequest, PendingTable};
use serde_json::{json, Value};
use stats::Counters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Per-call options for [`MessageHandler::send_request`].
#[derive(Debug, Clone, Default)]
pub struct SendRequestOptions {
    /// Overrides the expected-latency table and the configured default
    pub timeout: Option<Duration>,
    pub server_id: Option<String>,
}

/// Outcome of [`MessageHandler::broadcast_event`].
#[derive(Debug, Clone, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Server id and error of every connection the event could not reach
    pub failed: Vec<(String, ProtocolError)>,
}

/// Engine entry point.
///
/// Cheap to clone; every clone drives the same router, serializer and
/// pending-request table.
#[derive(Clone)]
pub struct MessageHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    config: HandlerConfig,
    router: Arc<Router>,
    serializer: Serializer,
    pending: PendingTable,
    admission: Admission,
    counters: Counters,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("config", &self.inner.config)
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl MessageHandler {
    /// Creates a handler around `router` and registers the default system handlers on it.
    pub fn new(router: Arc<Router>, config: HandlerConfig) -> Result<Self, ProtocolError> {
        config
            .validate()
            .map_err(|e| ProtocolError::new(format!("Invalid handler configuration: {e}")))?;
        let serializer = Serializer::new(config.serializer.clone(), config.validation.clone())?;
        system::register_defaults(&router, &config.validation.protocol_version);

        info!(
            "🌉 Message handler ready ({} slots, strict: {}, compression: {}, encryption: {})",
            config.max_concurrent_requests,
            config.strict_validation,
            config.enable_compression,
            config.enable_encryption
        );

        Ok(Self {
            inner: Arc::new(HandlerInner {
                admission: Admission::new(
                    config.max_concurrent_requests,
                    config.request_queue_size,
                ),
                config,
                router,
                serializer,
                pending: PendingTable::default(),
                counters: Counters::default(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.inner.router
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.inner.config
    }

    pub fn serializer(&self) -> &Serializer {
        &self.inner.serializer
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    // ---- inbound ------------------------------------------------------------

    /// Processes one raw frame received on `connection`.
    ///
    /// A frame that cannot be decoded is reported as an error; when it was
    /// recognizably a request, the peer is also sent an error response so
    /// the request does not go unanswered.
    pub async fn handle_message(
        &self,
        connection: Arc<dyn Connection>,
        data: &[u8],
    ) -> Result<(), ProtocolError> {
        Counters::bump(&self.inner.counters.messages_received);

        let DeserializationResult {
            outcome,
            validation,
            origin,
            ..
        } = self.inner.serializer.deserialize(
            data,
            DeserializeOptions {
                validate: true,
                strict: self.inner.config.strict_validation,
            },
        );

        let message = match outcome {
            Ok(message) => message,
            Err(e) => {
                Counters::bump(&self.inner.counters.rejected_messages);
                let error = ProtocolError::from(e);
                warn!("⚠️ Rejected frame from {}: {}", connection.server_id(), error);

                if let Some(origin) = origin.filter(|o| o.kind == MessageKind::Request) {
                    if let Some(request_id) = origin.id {
                        let details = validation
                            .as_ref()
                            .and_then(|v| serde_json::to_value(v.errors()).ok());
                        let reply = create_error(
                            request_id.clone(),
                            origin.operation.unwrap_or_else(|| "unknown".to_string()),
                            error.message.clone(),
                            Some(ErrorCode::HandlerError),
                            details,
                        );
                        if let Err(send_error) =
                            self.send_unchecked(connection.as_ref(), &reply.into()).await
                        {
                            error!(
                                "❌ Could not notify {} about rejected request {}: {}",
                                connection.server_id(),
                                request_id,
                                send_error
                            );
                        }
                        return Err(error.for_message(request_id));
                    }
                }
                return Err(error);
            }
        };

        if let Some(validation) = &validation {
            for warning in validation.warnings() {
                warn!(
                    message_id = %message.id(),
                    operation = %message.operation(),
                    "⚠️ {}: {} ({})",
                    warning.field,
                    warning.message,
                    warning.code.as_str()
                );
            }
        }

        debug!(
            "📥 {} {} ({}) from {}",
            message.kind(),
            message.operation(),
            message.id(),
            connection.server_id()
        );

        let message = match message {
            Message::Response(response) => {
                self.handle_response(response);
                return Ok(());
            }
            other => other,
        };
        let request_origin = match &message {
            Message::Request(request) => {
                Some((request.header.id.clone(), request.header.operation.clone()))
            }
            _ => None,
        };

        let reply = match self.inner.router.route(message, Arc::clone(&connection)).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("❌ Routing failed for message from {}: {}", connection.server_id(), e);
                return Err(e);
            }
        };

        self.send_reply(connection.as_ref(), reply, request_origin).await
    }

    /// Sends what a route produced. Error responses skip outgoing
    /// validation; a success response that fails it is replaced by an error
    /// response so the request is still answered.
    async fn send_reply(
        &self,
        connection: &dyn Connection,
        reply: Message,
        request_origin: Option<(String, String)>,
    ) -> Result<(), ProtocolError> {
        if matches!(&reply, Message::Response(response) if !response.success) {
            return self.send_unchecked(connection, &reply).await;
        }

        match (self.send_message(connection, &reply).await, request_origin) {
            (Err(e), Some((request_id, operation)))
                if e.code == Some(ErrorCode::ValidationFailed) =>
            {
                error!("❌ Reply to {} ({}) failed validation: {}", operation, request_id, e);
                let fallback = create_error(
                    request_id,
                    operation,
                    e.message,
                    Some(ErrorCode::HandlerError),
                    None,
                );
                self.send_unchecked(connection, &fallback.into()).await
            }
            (outcome, _) => outcome,
        }
    }

    /// Settles the pending request `response` answers.
    ///
    /// Returns false when nothing was waiting for it: late, duplicate or
    /// unsolicited responses are logged and dropped.
    pub fn handle_response(&self, response: Response) -> bool {
        let handled = self.inner.router.dispatch_response(response);
        if !handled {
            Counters::bump(&self.inner.counters.responses_dropped);
        }
        handled
    }

    /// Processes frames received from one connection strictly in order
    /// until the sending side closes.
    pub async fn serve(
        &self,
        connection: Arc<dyn Connection>,
        mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        debug!("🔌 Serving inbound frames from {}", connection.server_id());
        while let Some(frame) = frames.recv().await {
            if let Err(e) = self.handle_message(Arc::clone(&connection), &frame).await {
                trace!("Frame from {} not processed: {}", connection.server_id(), e);
            }
        }
        info!("🔌 Inbound stream from {} closed", connection.server_id());
    }

    // ---- outbound -----------------------------------------------------------

    /// Validates (when configured), encodes and transmits one message.
    pub async fn send_message(
        &self,
        connection: &dyn Connection,
        message: &Message,
    ) -> Result<(), ProtocolError> {
        let config = &self.inner.config;
        let options = SerializeOptions {
            validate: config.validate_outgoing,
            strict: true,
            compress: config.enable_compression,
            encrypt: config.enable_encryption,
        };
        let frame = self.encode(message, options)?;
        self.transmit(connection, message, frame).await
    }

    async fn send_unchecked(
        &self,
        connection: &dyn Connection,
        message: &Message,
    ) -> Result<(), ProtocolError> {
        let options = SerializeOptions {
            validate: false,
            strict: false,
            compress: self.inner.config.enable_compression,
            encrypt: self.inner.config.enable_encryption,
        };
        let frame = self.encode(message, options)?;
        self.transmit(connection, message, frame).await
    }

    fn encode(
        &self,
        message: &Message,
        options: SerializeOptions,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.inner
            .serializer
            .serialize(message, options)
            .into_result()
            .map_err(|e| ProtocolError::from(e).for_message(message.id()))
    }

    async fn transmit(
        &self,
        connection: &dyn Connection,
        message: &Message,
        frame: Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let size = frame.len();
        connection.send(frame).await.map_err(|e| {
            ProtocolError::with_code(
                ErrorCode::SendFailed,
                format!("Send to {} failed: {e}", connection.server_id()),
            )
            .for_message(message.id())
        })?;
        Counters::bump(&self.inner.counters.messages_sent);
        trace!(
            "📤 {} {} ({}) to {} ({} bytes)",
            message.kind(),
            message.operation(),
            message.id(),
            connection.server_id(),
            size
        );
        Ok(())
    }

    /// Sends a request and waits for its response.
    ///
    /// # Arguments
    ///
    /// * `connection` - Where the request goes; the response must come back
    ///   through [`handle_message`](Self::handle_message) on any connection
    /// * `operation` - Request operation, e.g. `player.kick`
    /// * `payload` - The request's `data`
    /// * `options` - Timeout override and origin server id
    ///
    /// # Returns
    ///
    /// Resolves exactly once: with the response, with `REMOTE_ERROR` when
    /// the peer answered `success: false`, with `REQUEST_TIMEOUT`, or with
    /// `SHUTTING_DOWN`. Admission can fail first with `QUEUE_FULL` or
    /// `CONCURRENCY_LIMIT`. The timeout runs from the call, so time spent
    /// waiting for a slot is not granted again once the request is sent.
    pub async fn send_request(
        &self,
        connection: &dyn Connection,
        operation: impl Into<String>,
        payload: Value,
        options: SendRequestOptions,
    ) -> Result<Response, ProtocolError> {
        let operation = operation.into();
        if self.is_shutting_down() {
            return Err(shutting_down());
        }

        let config = &self.inner.config;
        let timeout = effective_timeout(
            &operation,
            options.timeout,
            config.default_timeout(),
            Duration::from_millis(config.max_timeout_ms),
        );
        let deadline = Instant::now() + timeout;
        let permit = self.inner.admission.acquire(timeout).await?;

        // Time spent queued counts against the request's own budget
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(1));

        let request = create_request(
            operation.clone(),
            payload,
            RequestOptions {
                id: None,
                server_id: options.server_id,
                timeout: Some(remaining.as_micros().div_ceil(1000) as u64),
            },
        );
        let request_id = request.header.id.clone();

        let (resolver, outcome) = oneshot::channel();
        self.inner.pending.insert(PendingRequest::new(
            request_id.clone(),
            operation.clone(),
            remaining,
            resolver,
            Some(permit),
        ));

        let weak = Arc::downgrade(&self.inner);
        self.inner.router.expect_response(
            request_id.clone(),
            Box::new(move |response| {
                if let Some(inner) = weak.upgrade() {
                    inner.complete(response);
                }
            }),
        );

        let timer = spawn_timer(Arc::downgrade(&self.inner), request_id.clone(), remaining);
        self.inner.pending.attach_timer(&request_id, timer);

        debug!(
            "📨 Sending {} ({}) to {} with {}ms timeout",
            operation,
            request_id,
            connection.server_id(),
            remaining.as_millis()
        );
        if let Err(e) = self.send_message(connection, &request.into()).await {
            self.inner.router.forget_response(&request_id);
            self.inner.pending.reject(&request_id, e.clone());
            Counters::bump(&self.inner.counters.requests_failed);
            error!("❌ Failed to send {} ({}): {}", operation, request_id, e);
            return Err(e);
        }

        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(shutting_down().for_message(request_id)),
        }
    }

    pub async fn send_event(
        &self,
        connection: &dyn Connection,
        operation: impl Into<String>,
        payload: Value,
        options: EventOptions,
    ) -> Result<(), ProtocolError> {
        let event = create_event(operation, payload, options);
        self.send_message(connection, &event.into()).await
    }

    /// Sends one event to many connections.
    ///
    /// The frame is encoded once. A connection that fails is recorded in the
    /// report and never prevents delivery to the others.
    pub async fn broadcast_event(
        &self,
        connections: &[Arc<dyn Connection>],
        operation: impl Into<String>,
        payload: Value,
        options: EventOptions,
    ) -> Result<BroadcastReport, ProtocolError> {
        let message: Message = create_event(operation, payload, options).into();
        let config = &self.inner.config;
        let frame = self.encode(
            &message,
            SerializeOptions {
                validate: config.validate_outgoing,
                strict: true,
                compress: config.enable_compression,
                encrypt: config.enable_encryption,
            },
        )?;

        let sends = connections
            .iter()
            .map(|connection| self.transmit(connection.as_ref(), &message, frame.clone()));
        let outcomes = join_all(sends).await;

        let mut report = BroadcastReport::default();
        for (connection, outcome) in connections.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "⚠️ Broadcast of {} to {} failed: {}",
                        message.operation(),
                        connection.server_id(),
                        e
                    );
                    report.failed.push((connection.server_id().to_string(), e));
                }
            }
        }
        debug!(
            "📡 Broadcast {} to {}/{} connections",
            message.operation(),
            report.delivered,
            connections.len()
        );
        Ok(report)
    }

    pub async fn send_system_message(
        &self,
        connection: &dyn Connection,
        system_op: SystemOp,
        payload: Value,
    ) -> Result<(), ProtocolError> {
        let message = create_system_message(system_op, payload, SystemOptions::default());
        self.send_message(connection, &message.into()).await
    }

    /// Announces protocol version, role and capabilities to the peer.
    pub async fn perform_handshake(
        &self,
        connection: &dyn Connection,
    ) -> Result<(), ProtocolError> {
        let config = &self.inner.config;
        let payload = json!({
            "protocolVersion": config.validation.protocol_version,
            "serverType": config.server_type,
            "capabilities": config.capabilities,
        });
        info!("🤝 Handshaking with {} as {}", connection.server_id(), config.server_type);
        self.send_system_message(connection, SystemOp::Handshake, payload).await
    }

    /// Sends a ping carrying the send time; the peer's pong updates the latency.
    pub async fn ping(&self, connection: &dyn Connection) -> Result<(), ProtocolError> {
        let payload = json!({ "timestamp": current_timestamp() });
        self.send_system_message(connection, SystemOp::Ping, payload).await
    }

    // ---- maintenance --------------------------------------------------------

    /// Expires every pending request older than its own timeout.
    pub fn cleanup(&self) -> usize {
        self.inner.sweep()
    }

    /// Runs [`cleanup`](Self::cleanup) every `cleanup_interval_ms` until the
    /// handler shuts down or is dropped.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                inner.sweep();
            }
            debug!("🧹 Cleanup task stopped");
        })
    }

    /// Rejects every outstanding request and refuses new ones.
    ///
    /// Returns the number of requests that were rejected.
    pub fn shutdown(&self) -> usize {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        self.inner.admission.close();
        let rejected = self.inner.pending.reject_all(&shutting_down());
        self.inner.router.clear_responses();
        for _ in 0..rejected {
            Counters::bump(&self.inner.counters.requests_failed);
        }
        info!("🛑 Message handler shut down ({} pending requests rejected)", rejected);
        rejected
    }

    pub fn get_stats(&self) -> HandlerStats {
        let inner = &self.inner;
        let routes = inner.router.stats();
        let mut stats = HandlerStats {
            pending_requests: inner.pending.len(),
            active_requests: inner.admission.active(),
            queued_requests: inner.admission.queued(),
            max_concurrent_requests: inner.config.max_concurrent_requests,
            request_handlers: routes.request_handlers,
            event_handlers: routes.event_handlers,
            system_handlers: routes.system_handlers,
            ..Default::default()
        };
        inner.counters.fill(&mut stats);
        stats
    }
}

impl HandlerInner {
    /// Response sink target: settles the matching pending request.
    fn complete(&self, response: Response) {
        let request_id = response.request_id.clone();
        let success = response.success;
        match self.pending.resolve(response) {
            Some(operation) => {
                if success {
                    Counters::bump(&self.counters.requests_completed);
                } else {
                    Counters::bump(&self.counters.requests_failed);
                }
                debug!("✅ {} ({}) settled, success: {}", operation, request_id, success);
            }
            None => {
                Counters::bump(&self.counters.responses_dropped);
                warn!("⚠️ Response for {} arrived after the request settled", request_id);
            }
        }
    }

    /// Times one request out. Returns false when it had already settled.
    fn expire(&self, request_id: &str) -> bool {
        self.router.forget_response(request_id);
        let error = ProtocolError::with_code(
            ErrorCode::RequestTimeout,
            format!("Request {request_id} timed out"),
        )
        .for_message(request_id);
        if self.pending.reject(request_id, error) {
            Counters::bump(&self.counters.requests_timed_out);
            warn!("⏰ Request {} timed out", request_id);
            true
        } else {
            false
        }
    }

    fn sweep(&self) -> usize {
        let mut expired = 0;
        for request_id in self.pending.expired_ids(Instant::now()) {
            if self.expire(&request_id) {
                expired += 1;
            }
        }
        if expired > 0 {
            info!("🧹 Cleanup expired {} pending requests", expired);
        }
        expired
    }
}

fn spawn_timer(inner: Weak<HandlerInner>, request_id: String, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(inner) = inner.upgrade() {
            inner.expire(&request_id);
        }
    })
}

fn shutting_down() -> ProtocolError {
    ProtocolError::with_code(ErrorCode::ShuttingDown, "Handler is shutting down")
}
