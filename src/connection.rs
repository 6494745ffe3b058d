// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Descriptor
//!
//! This module turns configuration values into a validated
//! [`ConnectionDescriptor`]: everything needed to open an AMQP connection,
//! including the TLS identity and trust anchors when TLS is enabled.
//! Building a descriptor reads the TLS files but never touches the network.

use crate::{
    configs::{RabbitMQConfigs, Secret},
    errors::AmqpError,
};
use lapin::{
    tcp::{OwnedIdentity, OwnedTLSConfig},
    types::LongString,
    uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo},
    ConnectionProperties,
};
use std::{fmt, fs, path::PathBuf};
use tracing::{debug, error};

pub const KEY_HOST: &str = "host";
pub const KEY_PORT: &str = "port";
pub const KEY_USERNAME: &str = "username";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_SSL_KEY_STORE: &str = "ssl.keyStore";
pub const KEY_SSL_KEY_STORE_PASSWORD: &str = "ssl.keyStorePassword";
pub const KEY_SSL_TRUST_STORE: &str = "ssl.trustStore";
pub const KEY_SSL_TRUST_STORE_PASSWORD: &str = "ssl.trustStorePassword";
/// Virtual host used when none is configured.
pub const DEFAULT_VHOST: &str = "/";

/// TLS material loaded from the key store and trust store.
///
/// The key store is a PKCS#12 archive holding the client certificate and key,
/// opened by the transport with its passphrase. The trust store is a PEM bundle
/// of CA certificates.
#[derive(Clone)]
pub struct TlsMaterial {
    key_store: PathBuf,
    key_store_der: Vec<u8>,
    key_store_passphrase: Secret,
    trust_store: PathBuf,
    trust_store_pem: String,
    trust_store_passphrase: Secret,
}

impl TlsMaterial {
    pub fn key_store(&self) -> &PathBuf {
        &self.key_store
    }

    pub fn trust_store(&self) -> &PathBuf {
        &self.trust_store
    }

    /// Passphrase the trust store was configured with. PEM bundles are not
    /// encrypted, so the transport never needs it.
    pub fn trust_store_passphrase(&self) -> &Secret {
        &self.trust_store_passphrase
    }

    fn tls_config(&self) -> OwnedTLSConfig {
        OwnedTLSConfig {
            identity: Some(OwnedIdentity {
                der: self.key_store_der.clone(),
                password: self.key_store_passphrase.expose().to_owned(),
            }),
            cert_chain: Some(self.trust_store_pem.clone()),
        }
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("key_store", &self.key_store)
            .field("key_store_passphrase", &self.key_store_passphrase)
            .field("trust_store", &self.trust_store)
            .field("trust_store_passphrase", &self.trust_store_passphrase)
            .finish()
    }
}

/// Everything needed to open a connection to the broker.
///
/// Only [`ConnectionBuilder::build`] creates one, so a descriptor always holds
/// the required fields and, when TLS is enabled, loaded TLS material.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    host: String,
    port: u16,
    username: String,
    password: Secret,
    vhost: String,
    connection_name: String,
    heartbeat: Option<u16>,
    connection_timeout: Option<u64>,
    tls: Option<TlsMaterial>,
}

impl ConnectionDescriptor {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn tls(&self) -> Option<&TlsMaterial> {
        self.tls.as_ref()
    }

    /// The broker URI. The scheme is `amqps` when TLS is enabled.
    pub fn uri(&self) -> AMQPUri {
        let mut query = AMQPQueryString::default();
        query.heartbeat = self.heartbeat;
        query.connection_timeout = self.connection_timeout;

        AMQPUri {
            scheme: if self.tls_enabled() {
                AMQPScheme::AMQPS
            } else {
                AMQPScheme::AMQP
            },
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.expose().to_owned(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            query,
        }
    }

    /// The URI with the password masked, for logs.
    ///
    /// The default vhost `/` is left out of the path; any other vhost has its
    /// slashes percent-encoded.
    pub fn redacted_uri(&self) -> String {
        let base = format!(
            "{}://{}:***@{}:{}",
            if self.tls_enabled() { "amqps" } else { "amqp" },
            self.username,
            self.host,
            self.port
        );

        if self.vhost == DEFAULT_VHOST {
            base
        } else {
            format!("{}/{}", base, self.vhost.replace('%', "%25").replace('/', "%2F"))
        }
    }

    pub fn properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            .with_connection_name(LongString::from(self.connection_name.clone()))
    }

    /// TLS settings handed to the transport; empty when TLS is disabled.
    pub fn tls_config(&self) -> OwnedTLSConfig {
        match &self.tls {
            Some(tls) => tls.tls_config(),
            None => OwnedTLSConfig::default(),
        }
    }
}

/// Builder for [`ConnectionDescriptor`].
///
/// Required fields are checked in `build`, so a partially configured builder
/// is always valid to hold.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<Secret>,
    vhost: Option<String>,
    connection_name: Option<String>,
    heartbeat: Option<u16>,
    connection_timeout: Option<u64>,
    ssl_enabled: bool,
    key_store: Option<PathBuf>,
    key_store_passphrase: Option<Secret>,
    trust_store: Option<PathBuf>,
    trust_store_passphrase: Option<Secret>,
}

impl ConnectionBuilder {
    /// Creates an empty builder. Every required key still has to be set.
    pub fn new() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Starts a builder from the `rabbitmq` configuration section.
    ///
    /// # Parameters
    /// * `cfg` - Connection settings, possibly incomplete
    /// * `connection_name` - Name the connection is registered under on the broker
    ///
    /// # Returns
    /// A builder holding every configured value; validation happens in `build`
    pub fn from_configs(cfg: &RabbitMQConfigs, connection_name: &str) -> ConnectionBuilder {
        ConnectionBuilder {
            host: cfg.host.clone(),
            port: cfg.port,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            vhost: Some(cfg.vhost.clone()),
            connection_name: Some(connection_name.to_owned()),
            heartbeat: cfg.heartbeat,
            connection_timeout: cfg.connection_timeout,
            ssl_enabled: cfg.ssl.enabled,
            key_store: cfg.ssl.key_store.clone(),
            key_store_passphrase: cfg.ssl.key_store_password.clone(),
            trust_store: cfg.ssl.trust_store.clone(),
            trust_store_passphrase: cfg.ssl.trust_store_password.clone(),
        }
    }

    /// Sets the broker host name.
    ///
    /// # Parameters
    /// * `host` - Host name or IP address of the broker
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_owned());
        self
    }

    /// Sets the broker port, usually 5672 or 5671 with TLS.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the user to authenticate as.
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_owned());
        self
    }

    /// Sets the password. It never appears in logs or `Debug` output.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(Secret::from(password));
        self
    }

    /// Sets the virtual host, `/` when not called.
    pub fn vhost(mut self, vhost: &str) -> Self {
        self.vhost = Some(vhost.to_owned());
        self
    }

    /// Sets the client-provided connection name shown in the broker's management UI.
    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_owned());
        self
    }

    /// Requests a heartbeat interval in seconds.
    pub fn heartbeat(mut self, seconds: u16) -> Self {
        self.heartbeat = Some(seconds);
        self
    }

    /// Sets the connection timeout in milliseconds.
    pub fn connection_timeout(mut self, millis: u64) -> Self {
        self.connection_timeout = Some(millis);
        self
    }

    /// Turns TLS on. The key store and trust store become required.
    pub fn ssl_enabled(mut self, enabled: bool) -> Self {
        self.ssl_enabled = enabled;
        self
    }

    /// Sets the client identity.
    ///
    /// # Parameters
    /// * `path` - PKCS#12 archive with the client certificate and private key
    /// * `passphrase` - Passphrase protecting the archive
    pub fn key_store(mut self, path: impl Into<PathBuf>, passphrase: &str) -> Self {
        self.key_store = Some(path.into());
        self.key_store_passphrase = Some(Secret::from(passphrase));
        self
    }

    /// Sets the certificates used to verify the broker.
    ///
    /// # Parameters
    /// * `path` - PEM bundle of CA certificates
    /// * `passphrase` - Required alongside the path; a PEM bundle is not encrypted
    pub fn trust_store(mut self, path: impl Into<PathBuf>, passphrase: &str) -> Self {
        self.trust_store = Some(path.into());
        self.trust_store_passphrase = Some(Secret::from(passphrase));
        self
    }

    /// Validates the settings and loads the TLS material.
    ///
    /// # Errors
    /// `MissingConfiguration` naming the first absent required key, or
    /// `InvalidConfiguration` when a TLS file cannot be read.
    pub fn build(self) -> Result<ConnectionDescriptor, AmqpError> {
        let host = required(self.host, KEY_HOST)?;
        let port = required(self.port, KEY_PORT)?;
        let username = required(self.username, KEY_USERNAME)?;
        let password = required(self.password, KEY_PASSWORD)?;

        let tls = if self.ssl_enabled {
            let key_store = required(self.key_store, KEY_SSL_KEY_STORE)?;
            let key_store_passphrase =
                required(self.key_store_passphrase, KEY_SSL_KEY_STORE_PASSWORD)?;
            let trust_store = required(self.trust_store, KEY_SSL_TRUST_STORE)?;
            let trust_store_passphrase =
                required(self.trust_store_passphrase, KEY_SSL_TRUST_STORE_PASSWORD)?;

            debug!(
                key_store = %key_store.display(),
                trust_store = %trust_store.display(),
                "loading tls material"
            );

            let key_store_der = fs::read(&key_store).map_err(|err| {
                error!(error = err.to_string(), "failure to read the key store");
                AmqpError::InvalidConfiguration(
                    KEY_SSL_KEY_STORE.to_owned(),
                    format!("{}: {}", key_store.display(), err),
                )
            })?;

            let trust_store_pem = fs::read_to_string(&trust_store).map_err(|err| {
                error!(error = err.to_string(), "failure to read the trust store");
                AmqpError::InvalidConfiguration(
                    KEY_SSL_TRUST_STORE.to_owned(),
                    format!("{}: {}", trust_store.display(), err),
                )
            })?;

            Some(TlsMaterial {
                key_store,
                key_store_der,
                key_store_passphrase,
                trust_store,
                trust_store_pem,
                trust_store_passphrase,
            })
        } else {
            None
        };

        Ok(ConnectionDescriptor {
            host,
            port,
            username,
            password,
            vhost: self.vhost.unwrap_or_else(|| DEFAULT_VHOST.to_owned()),
            connection_name: self.connection_name.unwrap_or_default(),
            heartbeat: self.heartbeat,
            connection_timeout: self.connection_timeout,
            tls,
        })
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, AmqpError> {
    value.ok_or_else(|| {
        error!(key, "missing required configuration");
        AmqpError::MissingConfiguration(key.to_owned())
    })
}
