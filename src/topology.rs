// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! Declares the queues the application depends on. Declaring a queue that
//! already exists with identical flags is a no-op on the broker; declaring it
//! with different flags is refused with `PRECONDITION_FAILED`, which surfaces
//! here as [`AmqpError::DeclarationConflictError`].

use crate::{errors::AmqpError, factory::CachingConnectionFactory, queue::QueueDefinition};
use async_trait::async_trait;
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use std::sync::Arc;
use tracing::{debug, error};

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Declares every registered queue on the broker.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
pub struct AmqpTopology<'tp> {
    factory: Arc<CachingConnectionFactory>,
    pub(crate) queues: Vec<&'tp QueueDefinition>,
}

impl<'tp> AmqpTopology<'tp> {
    pub fn new(factory: Arc<CachingConnectionFactory>) -> AmqpTopology<'tp> {
        AmqpTopology {
            factory,
            queues: vec![],
        }
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    async fn install(&self) -> Result<(), AmqpError> {
        for def in &self.queues {
            self.declare(def).await?;
        }

        Ok(())
    }
}

impl AmqpTopology<'_> {
    async fn declare(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!(
            name = def.name,
            durable = def.durable,
            exclusive = def.exclusive,
            auto_delete = def.delete,
            "declaring queue"
        );

        let channel = self.factory.checkout().await?;

        match channel
            .queue_declare(&def.name, def.declare_options(), def.declare_arguments())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name,
                    "error to declare the queue"
                );
                Err(declaration_error(&def.name, &err))
            }
            Ok(queue) => {
                debug!(
                    name = def.name,
                    messages = queue.message_count(),
                    consumers = queue.consumer_count(),
                    "queue was declared"
                );
                Ok(())
            }
        }
    }
}

/// Maps a failed `queue.declare` to the application error.
pub(crate) fn declaration_error(name: &str, err: &lapin::Error) -> AmqpError {
    match err {
        lapin::Error::ProtocolError(amqp)
            if *amqp.kind() == AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED) =>
        {
            AmqpError::DeclarationConflictError(
                name.to_owned(),
                amqp.get_message().to_string(),
            )
        }
        _ => AmqpError::DeclareQueueError(name.to_owned()),
    }
}
