//! The message model: four message kinds, their factories and type guards.

pub mod factory;
pub mod guards;
pub mod operations;
pub mod timestamp;
pub mod types;

pub use factory::{
    create_error, create_event, create_request, create_response, create_system_message,
    EventOptions, RequestOptions, ResponseOptions, SystemOptions,
};
pub use operations::{EventOperation, RequestOperation, SystemOp, UnknownOperation};
pub use types::{
    Event, Message, MessageHeader, MessageKind, Request, Response, SystemMessage,
    PROTOCOL_VERSION,
};
