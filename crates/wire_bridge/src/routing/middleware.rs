//! Chain-of-responsibility middleware.

use super::RouteContext;
use crate::error::{ErrorCode, ProtocolError};
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// A step in the routing chain.
///
/// Implementations either call [`Next::run`] to continue or return without
/// calling it, which stops routing with `MIDDLEWARE_REJECTED`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        message: &Message,
        ctx: &mut RouteContext,
        next: Next<'_>,
    ) -> Result<(), ProtocolError>;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { chain }
    }

    pub async fn run(self, message: &Message, ctx: &mut RouteContext) -> Result<(), ProtocolError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(message, ctx, Next::new(rest)).await,
            None => {
                ctx.chain_completed = true;
                Ok(())
            }
        }
    }
}

/// Runs `chain` and fails unless every middleware passed control on.
pub(crate) async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    message: &Message,
    ctx: &mut RouteContext,
) -> Result<(), ProtocolError> {
    ctx.chain_completed = false;
    Next::new(chain).run(message, ctx).await?;
    if ctx.chain_completed {
        Ok(())
    } else {
        Err(ProtocolError::with_code(
            ErrorCode::MiddlewareRejected,
            format!("Middleware stopped routing of {}", message.operation()),
        )
        .for_message(message.id()))
    }
}
