// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use crate::{errors::HandlerError, message::ConsumerMessage};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use opentelemetry::Context;

/// Processes deliveries handed over by a listener container.
///
/// `ctx` carries the trace context propagated by the publisher, if any.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<(), HandlerError>;
}
