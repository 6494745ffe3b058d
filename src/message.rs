// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use lapin::{
    message::Delivery,
    types::{AMQPValue, ShortString},
};
use std::collections::BTreeMap;

/// A delivery as seen by message handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerMessage {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub msg_type: Option<String>,
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    pub data: Vec<u8>,
    pub(crate) headers: BTreeMap<ShortString, AMQPValue>,
}

impl ConsumerMessage {
    pub fn new(queue: &str, data: &[u8]) -> ConsumerMessage {
        ConsumerMessage {
            queue: queue.to_owned(),
            data: data.to_vec(),
            ..ConsumerMessage::default()
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn with_type(mut self, msg_type: &str) -> Self {
        self.msg_type = Some(msg_type.to_owned());
        self
    }

    pub(crate) fn from_delivery(queue: &str, delivery: &Delivery) -> ConsumerMessage {
        let props = &delivery.properties;

        ConsumerMessage {
            queue: queue.to_owned(),
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            msg_type: props.kind().as_ref().map(|v| v.to_string()),
            content_type: props.content_type().as_ref().map(|v| v.to_string()),
            message_id: props.message_id().as_ref().map(|v| v.to_string()),
            data: delivery.data.clone(),
            headers: props
                .headers()
                .as_ref()
                .map(|h| h.inner().clone())
                .unwrap_or_default(),
        }
    }

    /// Header value as text, for string-typed AMQP headers.
    pub fn header(&self, key: &str) -> Option<String> {
        match self.headers.get(key)? {
            AMQPValue::LongString(v) => Some(v.to_string()),
            AMQPValue::ShortString(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Name used for the processing span: the message type, else the queue.
    pub(crate) fn span_name(&self) -> &str {
        match &self.msg_type {
            Some(kind) if !kind.is_empty() => kind.as_str(),
            _ => self.queue.as_str(),
        }
    }
}
