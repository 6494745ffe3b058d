// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Composition Root
//!
//! Builds the application's RabbitMQ components in dependency order from an
//! immutable [`Configs`] value:
//!
//! configuration -> connection descriptor -> connection factory -> queue
//! declaration -> listener container -> handler.
//!
//! [`RabbitApplication::new`] only constructs; [`RabbitApplication::start`]
//! talks to the broker.

use crate::{
    configs::Configs,
    connection::ConnectionBuilder,
    errors::AmqpError,
    factory::CachingConnectionFactory,
    handler::MessageHandler,
    listener::ListenerContainer,
    publisher::RabbitMQPublisher,
    queue::QueueDefinition,
    topology::{AmqpTopology, Topology},
};
use std::sync::Arc;
use tracing::info;

pub struct RabbitApplication {
    factory: Arc<CachingConnectionFactory>,
    queue: QueueDefinition,
    container: ListenerContainer,
}

impl RabbitApplication {
    /// Wires the components for `sample_queue` without any network I/O.
    ///
    /// # Errors
    /// A configuration error when a required connection key is missing or
    /// the TLS material cannot be read.
    pub fn new(
        cfg: &Configs,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RabbitApplication, AmqpError> {
        Self::with_queue(cfg, QueueDefinition::default_queue(), handler)
    }

    pub fn with_queue(
        cfg: &Configs,
        queue: QueueDefinition,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RabbitApplication, AmqpError> {
        let descriptor = ConnectionBuilder::from_configs(&cfg.rabbitmq, &cfg.app.name).build()?;
        info!(
            uri = descriptor.redacted_uri(),
            tls = descriptor.tls_enabled(),
            "connection configured"
        );

        let factory = CachingConnectionFactory::with_channel_cache_size(
            descriptor,
            cfg.rabbitmq.channel_cache_size,
        );

        let container = ListenerContainer::new(factory.clone(), queue.name(), handler)
            .acknowledge_mode(cfg.listener.acknowledge_mode)
            .prefetch(cfg.listener.prefetch)
            .concurrent_consumers(cfg.listener.concurrent_consumers)
            .consumer_tag_prefix(&cfg.app.name);

        Ok(RabbitApplication {
            factory,
            queue,
            container,
        })
    }

    pub fn connection_factory(&self) -> &Arc<CachingConnectionFactory> {
        &self.factory
    }

    pub fn queue(&self) -> &QueueDefinition {
        &self.queue
    }

    pub fn container(&self) -> &ListenerContainer {
        &self.container
    }

    /// A publisher sharing the application's connection factory.
    pub fn publisher(&self) -> Arc<RabbitMQPublisher> {
        RabbitMQPublisher::new(self.factory.clone())
    }

    /// Declares the queue and starts the listener container.
    pub async fn start(&self) -> Result<(), AmqpError> {
        AmqpTopology::new(self.factory.clone())
            .queue(&self.queue)
            .install()
            .await?;

        self.container.start().await
    }

    /// Stops consuming and closes the shared connection.
    pub async fn shutdown(&self) -> Result<(), AmqpError> {
        self.container.stop().await?;
        self.factory.close().await
    }
}
