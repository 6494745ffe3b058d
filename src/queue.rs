// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Types for describing the queues this application declares. A definition is
//! built once at startup and never changed afterwards; the builder methods
//! consume `self`.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongInt, ShortString},
};
use std::collections::BTreeMap;

/// Queue the listener consumes from.
pub const DEFAULT_QUEUE: &str = "sample_queue";
/// Whether [`DEFAULT_QUEUE`] survives a broker restart.
pub const QUEUE_DURABLE: bool = true;
/// Whether [`DEFAULT_QUEUE`] is restricted to the declaring connection.
pub const QUEUE_EXCLUSIVE: bool = false;
/// Whether [`DEFAULT_QUEUE`] is removed once its last consumer leaves.
pub const QUEUE_AUTO_DELETE: bool = false;

/// Constant for the argument used to specify message TTL
pub const AMQP_ARGS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the argument used to specify maximum queue length
pub const AMQP_ARGS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the argument used to specify maximum queue size in bytes
pub const AMQP_ARGS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Definition of a RabbitMQ queue with its declaration flags and arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) arguments: Option<BTreeMap<ShortString, AMQPValue>>,
}

impl QueueDefinition {
    /// Creates a non-durable, non-exclusive, non-auto-delete queue without arguments.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
            passive: false,
            no_wait: false,
            arguments: None,
        }
    }

    /// The queue the application listens on: `sample_queue`, durable,
    /// shared and kept when unused.
    pub fn default_queue() -> QueueDefinition {
        let mut def = QueueDefinition::new(DEFAULT_QUEUE);
        def.durable = QUEUE_DURABLE;
        def.exclusive = QUEUE_EXCLUSIVE;
        def.delete = QUEUE_AUTO_DELETE;
        def
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    pub fn arguments(&self) -> Option<&BTreeMap<ShortString, AMQPValue>> {
        self.arguments.as_ref()
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Only checks that the queue exists instead of creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a declaration argument.
    pub fn argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments
            .get_or_insert_with(BTreeMap::new)
            .insert(ShortString::from(key), value);
        self
    }

    /// Sets the message Time-To-Live (TTL) in milliseconds.
    pub fn ttl(self, ttl: i32) -> Self {
        self.argument(AMQP_ARGS_MESSAGE_TTL, AMQPValue::LongInt(LongInt::from(ttl)))
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(self, max: i32) -> Self {
        self.argument(AMQP_ARGS_MAX_LENGTH, AMQPValue::LongInt(LongInt::from(max)))
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(self, max_bytes: i32) -> Self {
        self.argument(
            AMQP_ARGS_MAX_LENGTH_BYTES,
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        )
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: self.passive,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: self.no_wait,
        }
    }

    pub(crate) fn declare_arguments(&self) -> FieldTable {
        self.arguments
            .clone()
            .map(FieldTable::from)
            .unwrap_or_default()
    }
}
