// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Publishes messages over channels borrowed from the shared
//! [`CachingConnectionFactory`], propagating the caller's trace context in
//! the message headers.

use crate::{
    adapter::JSON_CONTENT_TYPE, errors::AmqpError, factory::CachingConnectionFactory, otel,
};
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties,
};
use opentelemetry::Context;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, error};
use uuid::Uuid;

/// Content type for plain text messages
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// A message to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishMessage {
    /// Exchange name; empty for the default exchange.
    pub exchange: String,
    pub routing_key: String,
    pub msg_type: Option<String>,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
}

impl PublishMessage {
    /// A text message routed straight to `queue` through the default exchange.
    pub fn to_queue(queue: &str, data: &[u8]) -> PublishMessage {
        PublishMessage {
            exchange: String::new(),
            routing_key: queue.to_owned(),
            content_type: TEXT_CONTENT_TYPE.to_owned(),
            data: data.to_vec(),
            ..PublishMessage::default()
        }
    }

    /// `payload` serialized as JSON, routed straight to `queue`.
    pub fn json<T: Serialize>(queue: &str, payload: &T) -> Result<PublishMessage, AmqpError> {
        let data = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "error serializing message");
            AmqpError::ParsePayloadError
        })?;

        Ok(PublishMessage {
            content_type: JSON_CONTENT_TYPE.to_owned(),
            ..PublishMessage::to_queue(queue, &data)
        })
    }

    /// Sets the AMQP `type` property, used by consumers to name their spans.
    pub fn with_type(mut self, msg_type: &str) -> Self {
        self.msg_type = Some(msg_type.to_owned());
        self
    }

    /// Adds a string header.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// Publisher sending messages over channels borrowed from the shared factory,
/// with publisher confirms enabled.
pub struct RabbitMQPublisher {
    factory: Arc<CachingConnectionFactory>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `factory` - Connection factory the publishing channels are borrowed from
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(factory: Arc<CachingConnectionFactory>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { factory })
    }

    /// Publishes a message and waits for the broker to confirm it.
    ///
    /// The borrowed channel is switched to confirm mode on first use. The
    /// caller's trace context is injected into the message headers.
    ///
    /// # Parameters
    /// * `ctx` - OpenTelemetry context for tracing
    /// * `msg` - Exchange, routing key, properties and payload
    ///
    /// # Returns
    /// Ok(()) once the broker acks the message, or `PublishingError` when the
    /// publish fails or the broker nacks it
    pub async fn publish(&self, ctx: &Context, msg: &PublishMessage) -> Result<(), AmqpError> {
        let channel = self.factory.checkout().await?;

        if !channel.status().confirm() {
            if let Err(err) = channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await
            {
                error!(error = err.to_string(), "error to enable publisher confirms");
                return Err(AmqpError::PublishingError);
            }
        }

        let confirm = match channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.data,
                properties(ctx, msg),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            Ok(confirm) => Ok(confirm),
        }?;

        match confirm.await {
            Ok(confirmation) => confirmed(confirmation)?,
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                return Err(AmqpError::PublishingError);
            }
        }

        debug!(
            exchange = msg.exchange,
            routing_key = msg.routing_key,
            "message published"
        );
        Ok(())
    }
}

/// Only a broker ack counts as delivered.
fn confirmed(confirmation: Confirmation) -> Result<(), AmqpError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => {
            error!("message nacked by the broker");
            Err(AmqpError::PublishingError)
        }
        Confirmation::NotRequested => {
            error!("publisher confirms are not enabled on the channel");
            Err(AmqpError::PublishingError)
        }
    }
}

fn properties(ctx: &Context, msg: &PublishMessage) -> BasicProperties {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

    otel::inject(ctx, &mut headers);

    for (key, value) in &msg.headers {
        headers.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }

    let props = BasicProperties::default()
        .with_content_type(ShortString::from(msg.content_type.clone()))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers));

    match &msg.msg_type {
        Some(kind) => props.with_type(ShortString::from(kind.clone())),
        None => props,
    }
}
