//! Operation routing: handler tables, middleware and hook points.

pub mod hooks;
pub mod latency;
pub mod middleware;
mod router;

pub use hooks::{PermissionChecker, RateLimit, RateLimitHook, StaticPermissions, TokenBucketLimiter};
pub use latency::{effective_timeout, expected_latency};
pub use middleware::{Middleware, Next};
pub use router::{Router, RouterStats, RouteSummary};

use crate::connection::Connection;
use crate::error::ProtocolError;
use crate::message::{Event, Message, Request, Response, SystemMessage};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type HandlerResult<T> = Result<T, ProtocolError>;

pub type RequestHandler =
    Arc<dyn Fn(Request, RouteContext) -> BoxFuture<'static, HandlerResult<Response>> + Send + Sync>;

pub type EventHandler =
    Arc<dyn Fn(Event, RouteContext) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync>;

/// System handlers may answer with a system message (ping answers pong).
pub type SystemHandler = Arc<
    dyn Fn(SystemMessage, RouteContext) -> BoxFuture<'static, HandlerResult<Option<SystemMessage>>>
        + Send
        + Sync,
>;

/// One-shot consumer of the response to an outgoing request.
pub type ResponseSink = Box<dyn FnOnce(Response) + Send + Sync>;

/// Per-message routing context shared by middleware and the handler.
pub struct RouteContext {
    pub connection: Arc<dyn Connection>,
    pub message_id: String,
    pub operation: String,
    pub started_at: Instant,
    /// Free-form values middleware can hand to later steps
    pub metadata: HashMap<String, Value>,
    pub(crate) chain_completed: bool,
}

impl RouteContext {
    pub fn new(connection: Arc<dyn Connection>, message: &Message) -> Self {
        Self {
            connection,
            message_id: message.id().to_string(),
            operation: message.operation().to_string(),
            started_at: Instant::now(),
            metadata: HashMap::new(),
            chain_completed: false,
        }
    }

    pub fn server_id(&self) -> &str {
        self.connection.server_id()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// A registered route. Replaced wholesale when the operation is registered again.
pub struct RouteConfig<H> {
    pub operation: String,
    pub handler: H,
    pub middleware: Vec<Arc<dyn middleware::Middleware>>,
    /// Permission tags the connection must hold
    pub permissions: Vec<String>,
    pub rate_limit: Option<RateLimit>,
    pub timeout: Duration,
    pub priority: i32,
}

/// Optional settings for a route registration.
#[derive(Default, Clone)]
pub struct RouteOptions {
    pub middleware: Vec<Arc<dyn middleware::Middleware>>,
    pub permissions: Vec<String>,
    pub rate_limit: Option<RateLimit>,
    /// Defaults to the expected-latency table, then the router default
    pub timeout: Option<Duration>,
    pub priority: i32,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn middleware(mut self, middleware: Arc<dyn middleware::Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn permission(mut self, tag: impl Into<String>) -> Self {
        self.permissions.push(tag.into());
        self
    }

    pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.rate_limit = Some(RateLimit::new(max_requests, window));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
