// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! Processing of a single delivery: open a consumer span from the propagated
//! trace context, run the handler, then settle the delivery according to the
//! container's [`AcknowledgeMode`].

use crate::{
    errors::AmqpError, handler::MessageHandler, listener::AcknowledgeMode,
    message::ConsumerMessage, otel,
};
use async_trait::async_trait;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicRejectOptions},
};
#[cfg(test)]
use mockall::automock;
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::borrow::Cow;
use tracing::{debug, error, warn};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected,
    /// The broker already considered the delivery consumed (`no_ack`).
    BrokerAcked,
}

/// Settles deliveries with the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), AmqpError>;
    async fn reject(&self, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), AmqpError> {
        Acker::ack(self, BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        Acker::reject(self, BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling reject msg");
                AmqpError::NackMessageError
            })
    }
}

/// Runs the handler for one delivery and settles it.
///
/// Under [`AcknowledgeMode::Auto`] a handler failure is logged and the
/// delivery is still acknowledged, so it is not redelivered.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    msg: &ConsumerMessage,
    handler: &dyn MessageHandler,
    mode: AcknowledgeMode,
    acker: &dyn Acknowledger,
) -> Result<Settlement, AmqpError> {
    let (ctx, mut span) = otel::new_span(&msg.headers, tracer, msg.span_name());

    debug!(
        queue = msg.queue,
        exchange = msg.exchange,
        routing_key = msg.routing_key,
        delivery_tag = msg.delivery_tag,
        "received"
    );

    let result = handler.exec(&ctx, msg).await;

    if let Err(err) = &result {
        span.record_error(err);
        span.set_status(Status::Error {
            description: Cow::from(err.to_string()),
        });
    }

    let settlement = match (mode, &result) {
        (AcknowledgeMode::None, Ok(_)) => Ok(Settlement::BrokerAcked),
        (AcknowledgeMode::None, Err(err)) => {
            warn!(error = err.to_string(), "handler failure, message already consumed");
            Ok(Settlement::BrokerAcked)
        }
        (AcknowledgeMode::Auto, Ok(_)) | (AcknowledgeMode::OnSuccess, Ok(_)) => {
            debug!("message successfully processed");
            acker.ack().await.map(|_| Settlement::Acked)
        }
        (AcknowledgeMode::Auto, Err(err)) => {
            warn!(
                error = err.to_string(),
                "handler failure, acknowledging anyway"
            );
            acker.ack().await.map(|_| Settlement::Acked)
        }
        (AcknowledgeMode::OnSuccess, Err(err)) => {
            warn!(error = err.to_string(), "handler failure, rejecting msg");
            acker.reject(false).await.map(|_| Settlement::Rejected)
        }
    };

    match &settlement {
        Ok(_) if result.is_ok() => span.set_status(Status::Ok),
        Ok(_) => {}
        Err(e) => {
            span.record_error(e);
            span.set_status(Status::Error {
                description: Cow::from("error to settle msg"),
            });
        }
    }
    span.end();

    settlement
}
