// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! `AmqpError` covers everything that can go wrong while wiring the application
//! to RabbitMQ: configuration, connection, queue declaration, consuming and
//! publishing. `HandlerError` is what a receiver returns when it cannot process
//! a delivery.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Configuration and connection variants are fatal at startup. Declaration
/// conflicts are reported by the broker when a queue already exists with
/// different flags.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// A required configuration key is absent
    #[error("missing required configuration `{0}`")]
    MissingConfiguration(String),

    /// A configuration key is present but unusable
    #[error("invalid configuration `{0}`: {1}")]
    InvalidConfiguration(String, String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// The broker refused a declaration because the queue exists with other flags
    #[error("queue `{0}` already declared with different flags: {1}")]
    DeclarationConflictError(String, String),

    /// Error binding a consumer to a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// The listener container was used in the wrong state
    #[error("listener container error: {0}")]
    ContainerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,
}

/// Failure reported by a message handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload could not be converted to the type the receiver expects
    #[error("failure to convert payload: {0}")]
    Conversion(String),

    /// The receiver ran and failed
    #[error("handler failure: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_name_the_key() {
        assert_eq!(
            AmqpError::MissingConfiguration("ssl.keyStore".to_owned()).to_string(),
            "missing required configuration `ssl.keyStore`"
        );
        assert_eq!(
            AmqpError::DeclarationConflictError(
                "sample_queue".to_owned(),
                "inequivalent arg 'durable'".to_owned()
            )
            .to_string(),
            "queue `sample_queue` already declared with different flags: inequivalent arg 'durable'"
        );
    }

    #[test]
    fn handler_failures_keep_their_reason() {
        assert_eq!(
            HandlerError::failed("device offline"),
            HandlerError::Failed("device offline".to_owned())
        );
    }
}
