use super::middleware::{run_chain, Middleware};
use super::{
    expected_latency, EventHandler, HandlerResult, PermissionChecker, RateLimitHook,
    RequestHandler, ResponseSink, RouteConfig, RouteContext, RouteOptions, SystemHandler,
};
use crate::connection::Connection;
use crate::error::{ErrorCode, ProtocolError};
use crate::message::{create_error, Event, Message, MessageKind, Request, Response, SystemMessage};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Registered handler counts, for introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub request_handlers: usize,
    pub event_handlers: usize,
    pub system_handlers: usize,
    pub response_handlers: usize,
    pub global_middleware: usize,
}

/// A registered route as seen from outside the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub kind: MessageKind,
    pub operation: String,
    pub priority: i32,
    pub timeout: Duration,
    pub permissions: Vec<String>,
}

/// Table-driven dispatcher from operations to handlers.
///
/// Requests, events and system messages each have their own table keyed by
/// operation. Responses are not routed by operation: they go to the one-shot
/// sink registered for their `requestId`, or are dropped as stale.
pub struct Router {
    requests: DashMap<String, Arc<RouteConfig<RequestHandler>>>,
    events: DashMap<String, Arc<RouteConfig<EventHandler>>>,
    systems: DashMap<String, Arc<RouteConfig<SystemHandler>>>,
    responses: DashMap<String, ResponseSink>,
    global_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    permission_checker: RwLock<Option<Arc<dyn PermissionChecker>>>,
    rate_limiter: RwLock<Option<Arc<dyn RateLimitHook>>>,
    default_timeout: Duration,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("stats", &self.stats())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_ROUTE_TIMEOUT)
    }

    /// Creates a router whose routes time out after `default_timeout` unless
    /// the route or the latency table says otherwise.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            events: DashMap::new(),
            systems: DashMap::new(),
            responses: DashMap::new(),
            global_middleware: RwLock::new(Vec::new()),
            permission_checker: RwLock::new(None),
            rate_limiter: RwLock::new(None),
            default_timeout,
        }
    }

    // ---- registration -------------------------------------------------------

    pub fn on_request<F, Fut>(&self, operation: impl Into<String>, handler: F)
    where
        F: Fn(Request, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on_request_with(operation, RouteOptions::default(), handler);
    }

    pub fn on_request_with<F, Fut>(
        &self,
        operation: impl Into<String>,
        options: RouteOptions,
        handler: F,
    ) where
        F: Fn(Request, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |m, ctx| handler(m, ctx).boxed());
        let route = self.build_route(operation.into(), handler, options);
        info!("📝 Registered request handler for {}", route.operation);
        self.requests.insert(route.operation.clone(), Arc::new(route));
    }

    pub fn on_event<F, Fut>(&self, operation: impl Into<String>, handler: F)
    where
        F: Fn(Event, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.on_event_with(operation, RouteOptions::default(), handler);
    }

    pub fn on_event_with<F, Fut>(
        &self,
        operation: impl Into<String>,
        options: RouteOptions,
        handler: F,
    ) where
        F: Fn(Event, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |m, ctx| handler(m, ctx).boxed());
        let route = self.build_route(operation.into(), handler, options);
        info!("📝 Registered event handler for {}", route.operation);
        self.events.insert(route.operation.clone(), Arc::new(route));
    }

    pub fn on_system<F, Fut>(&self, operation: impl Into<String>, handler: F)
    where
        F: Fn(SystemMessage, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Option<SystemMessage>>> + Send + 'static,
    {
        self.on_system_with(operation, RouteOptions::default(), handler);
    }

    pub fn on_system_with<F, Fut>(
        &self,
        operation: impl Into<String>,
        options: RouteOptions,
        handler: F,
    ) where
        F: Fn(SystemMessage, RouteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Option<SystemMessage>>> + Send + 'static,
    {
        let handler: SystemHandler = Arc::new(move |m, ctx| handler(m, ctx).boxed());
        let route = self.build_route(operation.into(), handler, options);
        debug!("📝 Registered system handler for {}", route.operation);
        self.systems.insert(route.operation.clone(), Arc::new(route));
    }

    /// Appends a middleware to the global chain, which runs before every route's own chain.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        write_lock(&self.global_middleware).push(middleware);
    }

    pub fn set_permission_checker(&self, checker: Arc<dyn PermissionChecker>) {
        *write_lock(&self.permission_checker) = Some(checker);
    }

    pub fn set_rate_limiter(&self, limiter: Arc<dyn RateLimitHook>) {
        *write_lock(&self.rate_limiter) = Some(limiter);
    }

    pub fn remove_request_handler(&self, operation: &str) -> bool {
        self.requests.remove(operation).is_some()
    }

    pub fn remove_event_handler(&self, operation: &str) -> bool {
        self.events.remove(operation).is_some()
    }

    pub fn remove_system_handler(&self, operation: &str) -> bool {
        self.systems.remove(operation).is_some()
    }

    /// Registers the consumer of the response to `request_id`.
    pub(crate) fn expect_response(&self, request_id: impl Into<String>, sink: ResponseSink) {
        self.responses.insert(request_id.into(), sink);
    }

    pub(crate) fn forget_response(&self, request_id: &str) {
        self.responses.remove(request_id);
    }

    pub(crate) fn clear_responses(&self) {
        self.responses.clear();
    }

    fn build_route<H>(
        &self,
        operation: String,
        handler: H,
        options: RouteOptions,
    ) -> RouteConfig<H> {
        let timeout = options
            .timeout
            .or_else(|| expected_latency(&operation))
            .unwrap_or(self.default_timeout);
        RouteConfig {
            operation,
            handler,
            middleware: options.middleware,
            permissions: options.permissions,
            rate_limit: options.rate_limit,
            timeout,
            priority: options.priority,
        }
    }

    // ---- introspection ------------------------------------------------------

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            request_handlers: self.requests.len(),
            event_handlers: self.events.len(),
            system_handlers: self.systems.len(),
            response_handlers: self.responses.len(),
            global_middleware: read_lock(&self.global_middleware).len(),
        }
    }

    pub fn has_request_handler(&self, operation: &str) -> bool {
        self.requests.contains_key(operation)
    }

    pub fn has_system_handler(&self, operation: &str) -> bool {
        self.systems.contains_key(operation)
    }

    /// All registered routes, highest priority first.
    pub fn routes(&self) -> Vec<RouteSummary> {
        fn summary<H>(kind: MessageKind, route: &RouteConfig<H>) -> RouteSummary {
            RouteSummary {
                kind,
                operation: route.operation.clone(),
                priority: route.priority,
                timeout: route.timeout,
                permissions: route.permissions.clone(),
            }
        }

        let mut routes: Vec<RouteSummary> = self
            .requests
            .iter()
            .map(|r| summary(MessageKind::Request, r.value()))
            .chain(self.events.iter().map(|r| summary(MessageKind::Event, r.value())))
            .chain(self.systems.iter().map(|r| summary(MessageKind::System, r.value())))
            .collect();
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.operation.cmp(&b.operation))
        });
        routes
    }

    // ---- dispatch -----------------------------------------------------------

    /// Routes one inbound message.
    ///
    /// Returns the message the caller should send back, if any. Failures on
    /// the request path are always turned into an error response; failures
    /// for other kinds are returned.
    pub async fn route(
        &self,
        message: Message,
        connection: Arc<dyn Connection>,
    ) -> Result<Option<Message>, ProtocolError> {
        trace!("🧭 Routing {} {} ({})", message.kind(), message.operation(), message.id());

        match message.kind() {
            MessageKind::Response => {
                if let Message::Response(response) = message {
                    self.dispatch_response(response);
                }
                Ok(None)
            }
            MessageKind::Request => {
                let request_id = message.id().to_string();
                let operation = message.operation().to_string();
                match self.route_request(message, connection).await {
                    Ok(response) => Ok(Some(Message::Response(response))),
                    Err(e) => {
                        error!("❌ Request {} ({}) failed: {}", operation, request_id, e);
                        let reply = create_error(
                            request_id,
                            operation,
                            e.message.clone(),
                            Some(e.code_or_default()),
                            None,
                        );
                        Ok(Some(Message::Response(reply)))
                    }
                }
            }
            MessageKind::Event => self.route_event(message, connection).await.map(|_| None),
            MessageKind::System => self
                .route_system(message, connection)
                .await
                .map(|reply| reply.map(Message::System)),
        }
    }

    /// Hands a response to its registered sink, or drops it as stale.
    pub fn dispatch_response(&self, response: Response) -> bool {
        match self.responses.remove(&response.request_id) {
            Some((_, sink)) => {
                sink(response);
                true
            }
            None => {
                warn!(
                    "⚠️ Dropping response {} for unknown or expired request {}",
                    response.header.id, response.request_id
                );
                false
            }
        }
    }

    async fn route_request(
        &self,
        message: Message,
        connection: Arc<dyn Connection>,
    ) -> Result<Response, ProtocolError> {
        let mut ctx = RouteContext::new(connection, &message);
        let Some(route) = self.prepare(&self.requests, &message, &mut ctx).await? else {
            return Err(ProtocolError::with_code(
                ErrorCode::NoHandler,
                format!("No handler for request {}", message.operation()),
            )
            .for_message(message.id()));
        };
        let request = match message {
            Message::Request(request) => request,
            other => return Err(unexpected_kind(&other)),
        };
        let future = (route.handler)(request, ctx);
        execute(&route, &route.operation, future).await
    }

    async fn route_event(
        &self,
        message: Message,
        connection: Arc<dyn Connection>,
    ) -> Result<(), ProtocolError> {
        let mut ctx = RouteContext::new(connection, &message);
        let Some(route) = self.prepare(&self.events, &message, &mut ctx).await? else {
            trace!("No subscriber for event {}", message.operation());
            return Ok(());
        };
        let event = match message {
            Message::Event(event) => event,
            other => return Err(unexpected_kind(&other)),
        };
        let future = (route.handler)(event, ctx);
        execute(&route, &route.operation, future).await
    }

    async fn route_system(
        &self,
        message: Message,
        connection: Arc<dyn Connection>,
    ) -> Result<Option<SystemMessage>, ProtocolError> {
        let mut ctx = RouteContext::new(connection, &message);
        let Some(route) = self.prepare(&self.systems, &message, &mut ctx).await? else {
            return Err(ProtocolError::with_code(
                ErrorCode::NoHandler,
                format!("No handler for system operation {}", message.operation()),
            )
            .for_message(message.id()));
        };
        let system = match message {
            Message::System(system) => system,
            other => return Err(unexpected_kind(&other)),
        };
        let future = (route.handler)(system, ctx);
        execute(&route, &route.operation, future).await
    }

    /// Runs the global chain, looks the route up, then runs the route chain
    /// and both hooks. `Ok(None)` means no route is registered.
    async fn prepare<H>(
        &self,
        table: &DashMap<String, Arc<RouteConfig<H>>>,
        message: &Message,
        ctx: &mut RouteContext,
    ) -> Result<Option<Arc<RouteConfig<H>>>, ProtocolError> {
        let global = read_lock(&self.global_middleware).clone();
        run_chain(&global, message, ctx).await?;

        let Some(route) = table.get(message.operation()).map(|r| Arc::clone(r.value())) else {
            return Ok(None);
        };

        run_chain(&route.middleware, message, ctx).await?;

        if !route.permissions.is_empty() {
            let checker = read_lock(&self.permission_checker).clone();
            if let Some(checker) = checker {
                if !checker
                    .check(ctx.connection.as_ref(), &route.operation, &route.permissions)
                    .await
                {
                    return Err(ProtocolError::with_code(
                        ErrorCode::PermissionDenied,
                        format!("{} may not invoke {}", ctx.server_id(), route.operation),
                    )
                    .for_message(message.id()));
                }
            }
        }

        if let Some(limit) = route.rate_limit.as_ref() {
            let limiter = read_lock(&self.rate_limiter).clone();
            if let Some(limiter) = limiter {
                if !limiter.check(ctx.connection.as_ref(), &route.operation, limit).await {
                    return Err(ProtocolError::with_code(
                        ErrorCode::RateLimited,
                        format!(
                            "Rate limit exceeded for {} on {}",
                            route.operation,
                            ctx.server_id()
                        ),
                    )
                    .for_message(message.id()));
                }
            }
        }

        Ok(Some(route))
    }
}

/// Runs a handler future as its own task under the route timeout.
///
/// On timeout the task is detached: it may still finish, but its result is
/// discarded. A panicking handler is reported like a returned error.
async fn execute<H, T>(
    route: &RouteConfig<H>,
    operation: &str,
    future: BoxFuture<'static, HandlerResult<T>>,
) -> HandlerResult<T>
where
    T: Send + 'static,
{
    let task = tokio::spawn(future);
    match tokio::time::timeout(route.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) if join_error.is_panic() => Err(ProtocolError::with_code(
            ErrorCode::HandlerError,
            format!("Handler for {operation} panicked"),
        )),
        Ok(Err(join_error)) => Err(ProtocolError::with_code(
            ErrorCode::HandlerError,
            format!("Handler for {operation} was cancelled: {join_error}"),
        )),
        Err(_) => Err(ProtocolError::with_code(
            ErrorCode::HandlerTimeout,
            format!("Handler for {operation} timed out after {}ms", route.timeout.as_millis()),
        )),
    }
}

fn unexpected_kind(message: &Message) -> ProtocolError {
    ProtocolError::with_code(
        ErrorCode::UnknownMessageType,
        format!("Unexpected message type {}", message.kind()),
    )
    .for_message(message.id())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;
    use crate::message::{
        create_event, create_request, create_response, create_system_message, EventOptions,
        RequestOptions, ResponseOptions, SystemOp, SystemOptions,
    };
    use crate::routing::{Next, StaticPermissions, TokenBucketLimiter};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn connection(server_id: &str) -> Arc<dyn Connection> {
        let (connection, _receiver) = ChannelConnection::new(server_id);
        Arc::new(connection)
    }

    fn request(op: &str) -> Message {
        create_request(op, json!({ "playerId": "abc" }), RequestOptions::default()).into()
    }

    fn expect_error_response(reply: Option<Message>, code: ErrorCode) -> Response {
        match reply {
            Some(Message::Response(response)) => {
                assert!(!response.success);
                assert_eq!(response.header.payload["code"], code.as_str());
                response
            }
            other => panic!("expected an error response, got {other:?}"),
        }
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        pass: bool,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(
            &self,
            message: &Message,
            ctx: &mut RouteContext,
            next: Next<'_>,
        ) -> Result<(), ProtocolError> {
            self.log.lock().unwrap().push(self.name.to_string());
            ctx.metadata.insert(self.name.to_string(), json!(true));
            if self.pass {
                next.run(message, ctx).await
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let router = Router::new();
        router.on_request("player.kick", |request: Request, _ctx| async move {
            Ok(request.reply(json!({ "kicked": request.header.payload["playerId"] })))
        });

        let message = request("player.kick");
        let request_id = message.id().to_string();
        let reply = router.route(message, connection("lobby")).await.unwrap();
        match reply {
            Some(Message::Response(response)) => {
                assert!(response.success);
                assert_eq!(response.request_id, request_id);
                assert_eq!(response.header.payload["kicked"], "abc");
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_handlers() {
        let router = Router::new();
        let reply = router.route(request("player.kick"), connection("lobby")).await.unwrap();
        let response = expect_error_response(reply, ErrorCode::NoHandler);
        assert!(response.error.unwrap().contains("player.kick"));

        let event = create_event("player.join", json!({}), EventOptions::default());
        assert!(router.route(event.into(), connection("lobby")).await.unwrap().is_none());

        let system =
            create_system_message(SystemOp::Disconnect, json!({}), SystemOptions::default());
        let err = router.route(system.into(), connection("lobby")).await.unwrap_err();
        assert_eq!(err.code, Some(ErrorCode::NoHandler));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_response() {
        let router = Router::new();
        router.on_request("world.save", |_request: Request, _ctx| async move {
            Err::<Response, _>(ProtocolError::new("disk full"))
        });
        let reply = router.route(request("world.save"), connection("lobby")).await.unwrap();
        let response = expect_error_response(reply, ErrorCode::HandlerError);
        assert_eq!(response.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_caught() {
        let router = Router::new();
        router.on_request("server.info", |_request: Request, _ctx| async move {
            if true {
                panic!("handler bug");
            }
            Err::<Response, _>(ProtocolError::new("unreachable"))
        });
        let reply = router.route(request("server.info"), connection("lobby")).await.unwrap();
        expect_error_response(reply, ErrorCode::HandlerError);
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let router = Router::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&finished);
        router.on_request_with(
            "world.save",
            RouteOptions::new().timeout(Duration::from_millis(50)),
            move |request: Request, _ctx| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    flag.fetch_add(1, Ordering::SeqCst);
                    Ok(request.reply(json!({})))
                }
            },
        );

        let reply = router.route(request("world.save"), connection("lobby")).await.unwrap();
        expect_error_response(reply, ErrorCode::HandlerTimeout);

        // The abandoned handler still runs to completion
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_middleware_order_and_rejection() {
        let router = Router::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.use_middleware(Arc::new(Recorder {
            name: "global",
            log: Arc::clone(&log),
            pass: true,
        }));
        router.on_request_with(
            "player.kick",
            RouteOptions::new().middleware(Arc::new(Recorder {
                name: "route",
                log: Arc::clone(&log),
                pass: true,
            })),
            |request: Request, ctx: RouteContext| async move {
                assert!(ctx.metadata.contains_key("global"));
                assert!(ctx.metadata.contains_key("route"));
                Ok(request.reply(json!({})))
            },
        );
        router.on_request_with(
            "player.ban",
            RouteOptions::new().middleware(Arc::new(Recorder {
                name: "gate",
                log: Arc::clone(&log),
                pass: false,
            })),
            |request: Request, _ctx| async move { Ok(request.reply(json!({}))) },
        );

        let reply = router.route(request("player.kick"), connection("lobby")).await.unwrap();
        assert!(matches!(reply, Some(Message::Response(ref r)) if r.success));
        assert_eq!(*log.lock().unwrap(), vec!["global", "route"]);

        let reply = router.route(request("player.ban"), connection("lobby")).await.unwrap();
        expect_error_response(reply, ErrorCode::MiddlewareRejected);
    }

    #[tokio::test]
    async fn test_permission_hook() {
        let router = Router::new();
        router.set_permission_checker(Arc::new(
            StaticPermissions::new().grant("admin", ["moderate"]),
        ));
        router.on_request_with(
            "player.kick",
            RouteOptions::new().permission("moderate"),
            |request: Request, _ctx| async move { Ok(request.reply(json!({}))) },
        );

        let reply = router.route(request("player.kick"), connection("guest")).await.unwrap();
        expect_error_response(reply, ErrorCode::PermissionDenied);

        let reply = router.route(request("player.kick"), connection("admin")).await.unwrap();
        assert!(matches!(reply, Some(Message::Response(ref r)) if r.success));
    }

    #[tokio::test]
    async fn test_rate_limit_hook() {
        let router = Router::new();
        router.set_rate_limiter(Arc::new(TokenBucketLimiter::new()));
        router.on_request_with(
            "player.kick",
            RouteOptions::new().rate_limit(1, Duration::from_secs(60)),
            |request: Request, _ctx| async move { Ok(request.reply(json!({}))) },
        );

        let conn = connection("lobby");
        let reply = router.route(request("player.kick"), Arc::clone(&conn)).await.unwrap();
        assert!(matches!(reply, Some(Message::Response(ref r)) if r.success));
        let reply = router.route(request("player.kick"), conn).await.unwrap();
        expect_error_response(reply, ErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn test_event_failure_propagates() {
        let router = Router::new();
        router.on_event("player.join", |_event: Event, _ctx| async move {
            Err(ProtocolError::new("subscriber failed"))
        });
        let event = create_event("player.join", json!({}), EventOptions::default());
        let err = router.route(event.into(), connection("lobby")).await.unwrap_err();
        assert_eq!(err.message, "subscriber failed");
    }

    #[tokio::test]
    async fn test_system_reply() {
        let router = Router::new();
        router.on_system("ping", |ping: SystemMessage, _ctx| async move {
            Ok(Some(create_system_message(
                SystemOp::Pong,
                ping.header.payload,
                SystemOptions::default(),
            )))
        });
        let ping = create_system_message(
            SystemOp::Ping,
            json!({ "timestamp": 7 }),
            SystemOptions::default(),
        );
        let reply = router.route(ping.into(), connection("lobby")).await.unwrap();
        match reply {
            Some(Message::System(pong)) => {
                assert_eq!(pong.system_op, SystemOp::Pong);
                assert_eq!(pong.header.payload["timestamp"], 7);
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_sinks_fire_once() {
        let router = Router::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        router.expect_response(
            "1700000000000-abcdefghi",
            Box::new(move |_response| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let response = create_response(
            "1700000000000-abcdefghi",
            "server.info",
            json!({}),
            ResponseOptions::default(),
        );
        let routed = router.route(response.clone().into(), connection("lobby")).await;
        assert!(routed.unwrap().is_none());
        assert!(router.route(response.into(), connection("lobby")).await.unwrap().is_none());
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(router.stats().response_handlers, 0);
    }

    #[test]
    fn test_reregistration_replaces_route() {
        let router = Router::new();
        router.on_request_with(
            "player.kick",
            RouteOptions::new().priority(1),
            |request: Request, _ctx| async move { Ok(request.reply(json!({}))) },
        );
        router.on_request_with(
            "player.kick",
            RouteOptions::new().priority(5),
            |request: Request, _ctx| async move { Ok(request.reply(json!({}))) },
        );
        router.on_request("custom.thing", |request: Request, _ctx| async move {
            Ok(request.reply(json!({})))
        });

        let routes = router.routes();
        assert_eq!(router.stats().request_handlers, 2);
        assert_eq!(routes[0].operation, "player.kick");
        assert_eq!(routes[0].priority, 5);
        assert_eq!(routes[0].timeout, Duration::from_secs(5));
        assert_eq!(routes[1].timeout, DEFAULT_ROUTE_TIMEOUT);
    }
}

