//! # Wire Bridge
//!
//! Engine for the Unified Wire Bridge Protocol (U-WBP), which connects a
//! management application to remote game-server connectors.
//!
//! The engine is split into five layers:
//!
//! - [`message`]: the four message kinds, their factories and type guards
//! - [`validation`]: structural and per-operation rules producing errors and warnings
//! - [`codec`]: canonical JSON framing with optional compression and encryption
//! - [`routing`]: operation tables, middleware chains and hook points
//! - [`handler`]: the [`MessageHandler`] facade correlating requests and responses
//!
//! Transports are out of scope: anything implementing [`Connection`] can
//! carry frames.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wire_bridge::{ChannelConnection, HandlerConfig, MessageHandler, Router, SendRequestOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), wire_bridge::ProtocolError> {
//! let router = Arc::new(Router::new());
//! let handler = MessageHandler::new(router, HandlerConfig::default())?;
//!
//! let (connection, _outbound) = ChannelConnection::new("survival-1");
//! handler.perform_handshake(&connection).await?;
//! let response = handler
//!     .send_request(
//!         &connection,
//!         "player.kick",
//!         json!({ "playerId": "abc" }),
//!         SendRequestOptions::default(),
//!     )
//!     .await?;
//! println!("kicked: {}", response.success);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod routing;
pub mod utils;
pub mod validation;

pub use codec::{
    DeserializationResult, DeserializeOptions, SerializationResult, SerializeOptions, Serializer,
};
pub use config::{HandlerConfig, SerializerConfig, ValidationConfig};
pub use connection::{ChannelConnection, Connection, ConnectionState};
pub use error::{CodecError, ErrorCode, ProtocolError};
pub use handler::{BroadcastReport, HandlerStats, MessageHandler, SendRequestOptions};
pub use message::{
    create_error, create_event, create_request, create_response, create_system_message, Event,
    EventOptions, Message, MessageKind, Request, RequestOptions, Response, ResponseOptions,
    SystemMessage, SystemOp, SystemOptions, PROTOCOL_VERSION,
};
pub use routing::{HandlerResult, Middleware, Next, RouteContext, RouteOptions, Router};
pub use validation::{ValidationResult, Validator};
