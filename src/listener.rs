// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Listener Container
//!
//! Binds a queue, a connection factory and a [`MessageHandler`]. Once started,
//! every consumer owns a dedicated channel and a tokio task that pulls
//! deliveries off the stream, hands them to the handler and settles them
//! according to the [`AcknowledgeMode`].

use crate::{
    consumer::consume, errors::AmqpError, factory::CachingConnectionFactory,
    handler::MessageHandler, message::ConsumerMessage,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use opentelemetry::global;
use serde::Deserialize;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Messages the broker sends ahead of acknowledgements, per consumer.
pub const DEFAULT_PREFETCH: u16 = 250;

/// When a delivery counts as consumed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgeMode {
    /// The broker considers messages consumed as soon as it sends them.
    None,
    /// The container acknowledges after the handler returns, whether it
    /// succeeded or not. Failed messages are not redelivered.
    #[default]
    Auto,
    /// The container acknowledges successes and rejects failures without
    /// requeueing them.
    OnSuccess,
}

impl AcknowledgeMode {
    pub(crate) fn no_ack(&self) -> bool {
        matches!(self, AcknowledgeMode::None)
    }
}

struct RunningConsumer {
    channel: Channel,
    tag: String,
    task: JoinHandle<()>,
}

pub struct ListenerContainer {
    factory: Arc<CachingConnectionFactory>,
    queue_name: String,
    handler: Arc<dyn MessageHandler>,
    acknowledge_mode: AcknowledgeMode,
    prefetch: u16,
    concurrent_consumers: usize,
    consumer_tag_prefix: String,
    consumers: Mutex<Vec<RunningConsumer>>,
}

impl ListenerContainer {
    /// Creates a stopped container.
    ///
    /// # Parameters
    /// * `factory` - Connection factory the consumer channels are opened from
    /// * `queue_name` - Queue to consume, expected to be declared already
    /// * `handler` - Handler invoked once per delivery
    ///
    /// # Returns
    /// A container with automatic acknowledgement, a prefetch of
    /// [`DEFAULT_PREFETCH`] and a single consumer
    pub fn new(
        factory: Arc<CachingConnectionFactory>,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> ListenerContainer {
        ListenerContainer {
            factory,
            queue_name: queue_name.to_owned(),
            handler,
            acknowledge_mode: AcknowledgeMode::default(),
            prefetch: DEFAULT_PREFETCH,
            concurrent_consumers: 1,
            consumer_tag_prefix: queue_name.to_owned(),
            consumers: Mutex::new(vec![]),
        }
    }

    /// Sets when deliveries are acknowledged.
    pub fn acknowledge_mode(mut self, mode: AcknowledgeMode) -> Self {
        self.acknowledge_mode = mode;
        self
    }

    /// Sets how many unacknowledged deliveries the broker sends each consumer.
    /// Ignored under [`AcknowledgeMode::None`].
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Number of consumers started on the queue, at least one.
    pub fn concurrent_consumers(mut self, consumers: usize) -> Self {
        self.concurrent_consumers = consumers.max(1);
        self
    }

    /// Sets the prefix of the generated consumer tags, the queue name by default.
    pub fn consumer_tag_prefix(mut self, prefix: &str) -> Self {
        self.consumer_tag_prefix = prefix.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn connection_factory(&self) -> &Arc<CachingConnectionFactory> {
        &self.factory
    }

    /// The configured acknowledgement mode.
    pub fn get_acknowledge_mode(&self) -> AcknowledgeMode {
        self.acknowledge_mode
    }

    /// Whether at least one consumer is still pulling deliveries.
    ///
    /// # Returns
    /// `false` once every consumer task has ended, including after the
    /// connection was lost.
    pub async fn is_running(&self) -> bool {
        let consumers = self.consumers.lock().await;
        any_alive(consumers.iter().map(|c| &c.task))
    }

    /// Starts consuming. Fails if the container is already running or any
    /// consumer cannot be set up; consumers started before the failure are
    /// stopped again.
    pub async fn start(&self) -> Result<(), AmqpError> {
        let mut consumers = self.consumers.lock().await;
        if any_alive(consumers.iter().map(|c| &c.task)) {
            return Err(AmqpError::ContainerError("already running".to_owned()));
        }

        for ended in consumers.drain(..) {
            debug!(tag = ended.tag, "discarding ended consumer");
            cancel(ended).await;
        }

        for _ in 0..self.concurrent_consumers {
            match self.spawn_consumer().await {
                Ok(consumer) => consumers.push(consumer),
                Err(err) => {
                    for consumer in consumers.drain(..) {
                        cancel(consumer).await;
                    }
                    return Err(err);
                }
            }
        }

        info!(
            queue = self.queue_name,
            consumers = consumers.len(),
            mode = ?self.acknowledge_mode,
            "listener container started"
        );

        Ok(())
    }

    /// Cancels every consumer and waits for in-flight deliveries to finish.
    pub async fn stop(&self) -> Result<(), AmqpError> {
        let mut consumers = self.consumers.lock().await;

        for consumer in consumers.drain(..) {
            cancel(consumer).await;
        }

        info!(queue = self.queue_name, "listener container stopped");
        Ok(())
    }

    async fn spawn_consumer(&self) -> Result<RunningConsumer, AmqpError> {
        let channel = self.factory.create_channel().await?;

        if !self.acknowledge_mode.no_ack() {
            if let Err(err) = channel
                .basic_qos(self.prefetch, BasicQosOptions { global: false })
                .await
            {
                error!(error = err.to_string(), "error to configure qos");
                return Err(AmqpError::QoSDeclarationError(self.queue_name.clone()));
            }
        }

        let tag = format!("{}-{}", self.consumer_tag_prefix, Uuid::new_v4());

        let mut consumer = match channel
            .basic_consume(
                &self.queue_name,
                &tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: self.acknowledge_mode.no_ack(),
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(self.queue_name.clone()))
            }
            Ok(c) => Ok(c),
        }?;

        debug!(queue = self.queue_name, tag, "consumer created");

        let queue = self.queue_name.clone();
        let handler = self.handler.clone();
        let mode = self.acknowledge_mode;

        let task = tokio::spawn(async move {
            let tracer = global::tracer("amqp consumer");

            while let Some(result) = consumer.next().await {
                match result {
                    Ok(delivery) => {
                        let msg = ConsumerMessage::from_delivery(&queue, &delivery);
                        if let Err(err) =
                            consume(&tracer, &msg, handler.as_ref(), mode, &delivery.acker).await
                        {
                            error!(error = err.to_string(), "error consume msg");
                        }
                    }
                    Err(err) => error!(error = err.to_string(), "errors consume msg"),
                }
            }

            debug!(queue, "consumer stream ended");
        });

        Ok(RunningConsumer { channel, tag, task })
    }
}

fn any_alive<'a>(tasks: impl IntoIterator<Item = &'a JoinHandle<()>>) -> bool {
    tasks.into_iter().any(|task| !task.is_finished())
}

async fn cancel(consumer: RunningConsumer) {
    let RunningConsumer { channel, tag, task } = consumer;

    if channel.status().connected() {
        if let Err(err) = channel
            .basic_cancel(&tag, BasicCancelOptions { nowait: false })
            .await
        {
            warn!(error = err.to_string(), tag, "error to cancel the consumer");
        }
    }

    if let Err(err) = task.await {
        error!(error = err.to_string(), "tokio process error");
    }

    if channel.status().connected() {
        if let Err(err) = channel.close(200, "consumer stopped").await {
            warn!(error = err.to_string(), tag, "error to close the consumer channel");
        }
    }
}
