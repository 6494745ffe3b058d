// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Tests against a live broker. Run with `cargo test -- --ignored` after
//! starting RabbitMQ on localhost:5672 (guest/guest), or point
//! `APP_RABBITMQ__*` variables at another broker.

use async_trait::async_trait;
use opentelemetry::Context;
use rabbitmq_listener::{
    adapter::{ListenerAdapter, Receiver},
    bootstrap::RabbitApplication,
    configs::Configs,
    connection::ConnectionBuilder,
    errors::{AmqpError, HandlerError},
    factory::CachingConnectionFactory,
    listener::{AcknowledgeMode, ListenerContainer},
    publisher::{PublishMessage, RabbitMQPublisher},
    queue::{QueueDefinition, DEFAULT_QUEUE},
    topology::{AmqpTopology, Topology},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use uuid::Uuid;

fn configs() -> Configs {
    let mut cfg = Configs::load(None).unwrap();
    let rabbit = &mut cfg.rabbitmq;
    rabbit.host.get_or_insert_with(|| "localhost".to_owned());
    rabbit.port.get_or_insert(5672);
    rabbit.username.get_or_insert_with(|| "guest".to_owned());
    rabbit.password.get_or_insert_with(|| "guest".into());
    cfg
}

fn factory() -> Arc<CachingConnectionFactory> {
    let descriptor = ConnectionBuilder::from_configs(&configs().rabbitmq, "broker-tests")
        .build()
        .unwrap();
    CachingConnectionFactory::new(descriptor)
}

/// Forwards payloads to the test, failing every delivery when asked to.
struct Forward(Option<mpsc::UnboundedSender<String>>);

#[async_trait]
impl Receiver<String> for Forward {
    async fn receive_message(&self, payload: String) -> Result<(), HandlerError> {
        if let Some(tx) = &self.0 {
            tx.send(payload.clone()).ok();
        }
        if payload.starts_with("fail") {
            return Err(HandlerError::failed("refusing payload"));
        }
        Ok(())
    }
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn declaring_the_sample_queue_twice_is_idempotent() {
    let factory = factory();
    let queue = QueueDefinition::default_queue();

    AmqpTopology::new(factory.clone()).queue(&queue).install().await.unwrap();
    AmqpTopology::new(factory.clone()).queue(&queue).install().await.unwrap();

    factory.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn redeclaring_with_other_flags_is_a_conflict() {
    let factory = factory();
    let durable = QueueDefinition::default_queue();
    let transient = QueueDefinition::new(DEFAULT_QUEUE);

    AmqpTopology::new(factory.clone()).queue(&durable).install().await.unwrap();
    let err = AmqpTopology::new(factory.clone())
        .queue(&transient)
        .install()
        .await
        .unwrap_err();

    assert!(
        matches!(err, AmqpError::DeclarationConflictError(ref name, _) if name == DEFAULT_QUEUE),
        "unexpected error: {err:?}"
    );

    factory.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn auto_ack_drops_messages_the_handler_rejects() {
    let factory = factory();
    let queue = QueueDefinition::new(&format!("auto-ack-{}", Uuid::new_v4())).delete();
    AmqpTopology::new(factory.clone()).queue(&queue).install().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let container = ListenerContainer::new(
        factory.clone(),
        queue.name(),
        ListenerAdapter::<String, _>::new(Arc::new(Forward(Some(tx)))),
    )
    .acknowledge_mode(AcknowledgeMode::Auto);
    container.start().await.unwrap();

    let publisher = RabbitMQPublisher::new(factory.clone());
    publisher
        .publish(&Context::new(), &PublishMessage::to_queue(queue.name(), b"fail-once"))
        .await
        .unwrap();
    publisher
        .publish(&Context::new(), &PublishMessage::to_queue(queue.name(), b"ok"))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("fail-once"));
    // the failed message was acknowledged, so nothing is redelivered before the next one
    assert_eq!(second.as_deref(), Some("ok"));
    assert!(tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .is_err());

    container.stop().await.unwrap();
    factory.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn application_starts_against_a_local_broker() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = RabbitApplication::new(
        &configs(),
        ListenerAdapter::<String, _>::new(Arc::new(Forward(Some(tx)))),
    )
    .unwrap();

    app.start().await.unwrap();
    assert!(app.container().is_running().await);
    assert_eq!(app.container().queue_name(), DEFAULT_QUEUE);

    let marker = format!("ping-{}", Uuid::new_v4());
    app.publisher()
        .publish(
            &Context::new(),
            &PublishMessage::to_queue(DEFAULT_QUEUE, marker.as_bytes()),
        )
        .await
        .unwrap();

    let received = loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if msg == marker {
            break msg;
        }
    };
    assert_eq!(received, marker);

    app.shutdown().await.unwrap();
    assert!(!app.container().is_running().await);
}
