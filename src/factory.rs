// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Caching Connection Factory
//!
//! One AMQP connection per process, opened on first use and shared by every
//! listener and publisher. Short-lived users borrow channels from a bounded
//! cache of idle channels; consumers open dedicated channels they keep.

use crate::{connection::ConnectionDescriptor, errors::AmqpError};
use lapin::{Channel, Connection};
use std::{
    ops::Deref,
    sync::{Arc, Mutex},
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, warn};

/// Number of idle channels kept for reuse unless configured otherwise.
pub const DEFAULT_CHANNEL_CACHE_SIZE: usize = 25;

type ChannelCache = Arc<Mutex<Vec<Channel>>>;

pub struct CachingConnectionFactory {
    descriptor: ConnectionDescriptor,
    connection: AsyncMutex<Option<Arc<Connection>>>,
    idle: ChannelCache,
    channel_cache_size: usize,
}

impl CachingConnectionFactory {
    /// Wraps a validated descriptor. No connection is opened until first use.
    pub fn new(descriptor: ConnectionDescriptor) -> Arc<CachingConnectionFactory> {
        Self::with_channel_cache_size(descriptor, DEFAULT_CHANNEL_CACHE_SIZE)
    }

    /// Wraps a validated descriptor with a custom channel cache bound.
    ///
    /// # Parameters
    /// * `descriptor` - Validated connection settings
    /// * `channel_cache_size` - Maximum number of idle channels kept for reuse
    ///
    /// # Returns
    /// An Arc-wrapped factory shared by listeners and publishers
    pub fn with_channel_cache_size(
        descriptor: ConnectionDescriptor,
        channel_cache_size: usize,
    ) -> Arc<CachingConnectionFactory> {
        Arc::new(CachingConnectionFactory {
            descriptor,
            connection: AsyncMutex::new(None),
            idle: Arc::new(Mutex::new(Vec::with_capacity(channel_cache_size))),
            channel_cache_size,
        })
    }

    /// The connection settings this factory connects with.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn channel_cache_size(&self) -> usize {
        self.channel_cache_size
    }

    /// Number of channels currently waiting in the cache.
    pub fn idle_channels(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or_default()
    }

    /// Returns the shared connection, opening it when there is none or the
    /// previous one is no longer connected.
    pub async fn connection(&self) -> Result<Arc<Connection>, AmqpError> {
        let mut guard = self.connection.lock().await;

        if let Some(conn) = guard.as_ref() {
            if conn.status().connected() {
                return Ok(conn.clone());
            }
            warn!("amqp connection lost, reconnecting");
            if let Ok(mut idle) = self.idle.lock() {
                idle.clear();
            }
        }

        debug!(uri = self.descriptor.redacted_uri(), "creating amqp connection...");
        let conn = match Connection::connect_uri_with_config(
            self.descriptor.uri(),
            self.descriptor.properties(),
            self.descriptor.tls_config(),
        )
        .await
        {
            Ok(c) => Ok(Arc::new(c)),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;
        debug!("amqp connected");

        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Opens a new channel on the shared connection. The caller owns it.
    pub async fn create_channel(&self) -> Result<Channel, AmqpError> {
        let conn = self.connection().await?;

        debug!("creating amqp channel...");
        match conn.create_channel().await {
            Ok(c) => {
                debug!(id = c.id(), "channel created");
                Ok(c)
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }

    /// Borrows a channel, reusing an idle one when possible. The channel goes
    /// back to the cache when the returned guard is dropped.
    pub async fn checkout(&self) -> Result<CachedChannel, AmqpError> {
        let cached = self.idle.lock().ok().and_then(|mut idle| idle.pop());

        let channel = match cached {
            Some(channel) if channel.status().connected() => channel,
            _ => self.create_channel().await?,
        };

        Ok(CachedChannel {
            channel,
            idle: self.idle.clone(),
            capacity: self.channel_cache_size,
        })
    }

    /// Closes cached channels and the shared connection.
    pub async fn close(&self) -> Result<(), AmqpError> {
        let idle: Vec<Channel> = match self.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(_) => vec![],
        };

        for channel in idle {
            if channel.status().connected() {
                if let Err(err) = channel.close(200, "factory closed").await {
                    warn!(error = err.to_string(), "error to close cached channel");
                }
            }
        }

        let Some(conn) = self.connection.lock().await.take() else {
            return Ok(());
        };

        if !conn.status().connected() {
            return Ok(());
        }

        match conn.close(200, "factory closed").await {
            Ok(_) => {
                debug!("amqp connection closed");
                Ok(())
            }
            Err(err) => {
                error!(error = err.to_string(), "error to close the connection");
                Err(AmqpError::ConnectionError)
            }
        }
    }
}

/// A channel borrowed from [`CachingConnectionFactory::checkout`].
pub struct CachedChannel {
    channel: Channel,
    idle: ChannelCache,
    capacity: usize,
}

impl Deref for CachedChannel {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        &self.channel
    }
}

impl Drop for CachedChannel {
    fn drop(&mut self) {
        if !self.channel.status().connected() {
            return;
        }

        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.capacity {
                idle.push(self.channel.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionBuilder;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionBuilder::new()
            .host("localhost")
            .port(5672)
            .username("guest")
            .password("guest")
            .build()
            .unwrap()
    }

    #[test]
    fn construction_does_not_connect() {
        let factory = CachingConnectionFactory::new(descriptor());

        assert_eq!(factory.channel_cache_size(), DEFAULT_CHANNEL_CACHE_SIZE);
        assert_eq!(factory.idle_channels(), 0);
        assert_eq!(factory.descriptor().host(), "localhost");
    }

    #[test]
    fn factory_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CachingConnectionFactory>();
    }

    #[tokio::test]
    async fn connection_failure_is_a_connection_error() {
        let descriptor = ConnectionBuilder::new()
            .host("127.0.0.1")
            .port(1)
            .username("guest")
            .password("guest")
            .build()
            .unwrap();
        let factory = CachingConnectionFactory::with_channel_cache_size(descriptor, 2);

        assert_eq!(factory.connection().await.err(), Some(AmqpError::ConnectionError));
        assert_eq!(factory.checkout().await.err(), Some(AmqpError::ConnectionError));
    }

    #[tokio::test]
    async fn closing_an_unused_factory_is_a_noop() {
        let factory = CachingConnectionFactory::new(descriptor());

        assert!(factory.close().await.is_ok());
    }
}
