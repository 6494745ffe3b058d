// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Configuration
//!
//! Application configuration is read once at startup into an immutable
//! [`Configs`] value. Sources, lowest precedence first:
//!
//! 1. a TOML file (`rabbit.toml` in the working directory when present, or an
//!    explicit path)
//! 2. environment variables `APP_<SECTION>__<KEY>`, e.g. `APP_RABBITMQ__HOST`
//!    or `APP_RABBITMQ__SSL__KEY_STORE`
//!
//! Environment values stay text until deserialization, so a password such as
//! `0042` is not reinterpreted as a number.
//!
//! Required connection keys are kept optional here so that a missing key is
//! reported by the connection builder with the key's name rather than by serde.

use crate::{errors::AmqpError, listener::AcknowledgeMode};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::{fmt, path::Path, path::PathBuf};
use tracing::error;

/// Name of the configuration file looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rabbit";
/// Prefix of the environment variables overriding file values.
pub const ENV_PREFIX: &str = "APP";

/// A string that never shows up in `Debug` or `Display` output.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_owned())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfigs {
    pub name: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfigs {
    fn default() -> Self {
        AppConfigs {
            name: "rabbitmq-listener".to_owned(),
            log_level: "info".to_owned(),
            log_format: LogFormat::default(),
        }
    }
}

/// TLS material locations, only consulted when `enabled` is set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SslConfigs {
    pub enabled: bool,
    #[serde(alias = "keyStore", alias = "keystore")]
    pub key_store: Option<PathBuf>,
    #[serde(alias = "keyStorePassword", alias = "keystorepassword")]
    pub key_store_password: Option<Secret>,
    #[serde(alias = "trustStore", alias = "truststore")]
    pub trust_store: Option<PathBuf>,
    #[serde(alias = "trustStorePassword", alias = "truststorepassword")]
    pub trust_store_password: Option<Secret>,
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RabbitMQConfigs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub vhost: String,
    /// Requested heartbeat in seconds.
    pub heartbeat: Option<u16>,
    /// Connection timeout in milliseconds.
    pub connection_timeout: Option<u64>,
    pub channel_cache_size: usize,
    pub ssl: SslConfigs,
}

impl Default for RabbitMQConfigs {
    fn default() -> Self {
        RabbitMQConfigs {
            host: None,
            port: None,
            username: None,
            password: None,
            vhost: "/".to_owned(),
            heartbeat: None,
            connection_timeout: None,
            channel_cache_size: 25,
            ssl: SslConfigs::default(),
        }
    }
}

/// Listener container settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfigs {
    pub acknowledge_mode: AcknowledgeMode,
    pub prefetch: u16,
    pub concurrent_consumers: usize,
}

impl Default for ListenerConfigs {
    fn default() -> Self {
        ListenerConfigs {
            acknowledge_mode: AcknowledgeMode::default(),
            prefetch: 250,
            concurrent_consumers: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
    pub listener: ListenerConfigs,
}

impl Configs {
    /// Loads the configuration from an optional file and the environment.
    ///
    /// An explicit `path` must exist; the default `rabbit.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Configs, AmqpError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let cfg = Config::builder()
            .add_source(file)
            .add_source(environment())
            .build()
            .map_err(|err| {
                error!(error = err.to_string(), "failure to read configuration");
                AmqpError::InvalidConfiguration("source".to_owned(), err.to_string())
            })?;

        deserialize(cfg)
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Configs, AmqpError> {
        let cfg = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|err| AmqpError::InvalidConfiguration("toml".to_owned(), err.to_string()))?;

        deserialize(cfg)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn deserialize(cfg: Config) -> Result<Configs, AmqpError> {
    cfg.try_deserialize::<Configs>().map_err(|err| {
        error!(error = err.to_string(), "failure to deserialize configuration");
        AmqpError::InvalidConfiguration("configs".to_owned(), err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, sync::Mutex};

    // `load` reads the process environment, which tests share.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn load_with_env(vars: &[(&str, &str)], path: Option<&Path>) -> Result<Configs, AmqpError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let cfg = Configs::load(path);
        for (key, _) in vars {
            std::env::remove_var(key);
        }
        cfg
    }

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let cfg = Configs::from_toml("").unwrap();

        assert_eq!(cfg.app.name, "rabbitmq-listener");
        assert_eq!(cfg.rabbitmq.vhost, "/");
        assert_eq!(cfg.rabbitmq.channel_cache_size, 25);
        assert!(!cfg.rabbitmq.ssl.enabled);
        assert_eq!(cfg.listener.acknowledge_mode, AcknowledgeMode::Auto);
        assert_eq!(cfg.listener.prefetch, 250);
        assert_eq!(cfg.listener.concurrent_consumers, 1);
        assert!(cfg.rabbitmq.host.is_none());
    }

    #[test]
    fn reads_connection_and_camel_case_ssl_keys() {
        let cfg = Configs::from_toml(
            r#"
            [app]
            name = "device-monitor"
            log_format = "json"

            [rabbitmq]
            host = "broker.local"
            port = 5671
            username = "svc"
            password = "s3cret"

            [rabbitmq.ssl]
            enabled = true
            keyStore = "/etc/rabbit/client.p12"
            keyStorePassword = "key-pass"
            trustStore = "/etc/rabbit/ca.pem"
            trustStorePassword = "trust-pass"

            [listener]
            acknowledge_mode = "on_success"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.app.name, "device-monitor");
        assert_eq!(cfg.app.log_format, LogFormat::Json);
        assert_eq!(cfg.rabbitmq.host.as_deref(), Some("broker.local"));
        assert_eq!(cfg.rabbitmq.port, Some(5671));
        assert_eq!(cfg.rabbitmq.password, Some(Secret::from("s3cret")));
        assert!(cfg.rabbitmq.ssl.enabled);
        assert_eq!(
            cfg.rabbitmq.ssl.key_store,
            Some(PathBuf::from("/etc/rabbit/client.p12"))
        );
        assert_eq!(
            cfg.rabbitmq.ssl.trust_store_password,
            Some(Secret::from("trust-pass"))
        );
        assert_eq!(cfg.listener.acknowledge_mode, AcknowledgeMode::OnSuccess);
    }

    #[test]
    fn load_reads_an_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[rabbitmq]\nhost = \"localhost\"\nport = 5672").unwrap();

        let cfg = load_with_env(&[], Some(file.path())).unwrap();

        assert_eq!(cfg.rabbitmq.host.as_deref(), Some("localhost"));
        assert_eq!(cfg.rabbitmq.port, Some(5672));
    }

    #[test]
    fn numeric_looking_env_values_stay_verbatim() {
        let cfg = load_with_env(
            &[
                ("APP_RABBITMQ__PASSWORD", "0042"),
                ("APP_RABBITMQ__USERNAME", "007"),
                ("APP_RABBITMQ__PORT", "5672"),
            ],
            None,
        )
        .unwrap();

        assert_eq!(cfg.rabbitmq.password.unwrap().expose(), "0042");
        assert_eq!(cfg.rabbitmq.username.as_deref(), Some("007"));
        assert_eq!(cfg.rabbitmq.port, Some(5672));
        assert!(!cfg.rabbitmq.ssl.enabled);
    }

    #[test]
    fn env_overrides_every_section() {
        let cfg = load_with_env(
            &[
                ("APP_APP__NAME", "device-monitor"),
                ("APP_RABBITMQ__HOST", "broker.local"),
                ("APP_RABBITMQ__SSL__ENABLED", "true"),
                ("APP_RABBITMQ__SSL__KEY_STORE", "/etc/rabbit/client.p12"),
                ("APP_RABBITMQ__SSL__TRUSTSTORE", "/etc/rabbit/ca.pem"),
                ("APP_LISTENER__ACKNOWLEDGE_MODE", "on_success"),
                ("APP_LISTENER__PREFETCH", "10"),
            ],
            None,
        )
        .unwrap();

        assert_eq!(cfg.app.name, "device-monitor");
        assert_eq!(cfg.rabbitmq.host.as_deref(), Some("broker.local"));
        assert!(cfg.rabbitmq.ssl.enabled);
        assert_eq!(
            cfg.rabbitmq.ssl.key_store,
            Some(PathBuf::from("/etc/rabbit/client.p12"))
        );
        assert_eq!(
            cfg.rabbitmq.ssl.trust_store,
            Some(PathBuf::from("/etc/rabbit/ca.pem"))
        );
        assert_eq!(cfg.listener.acknowledge_mode, AcknowledgeMode::OnSuccess);
        assert_eq!(cfg.listener.prefetch, 10);
    }

    #[test]
    fn env_takes_precedence_over_the_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[rabbitmq]\nhost = \"file-host\"\nport = 5671").unwrap();

        let cfg = load_with_env(&[("APP_RABBITMQ__HOST", "env-host")], Some(file.path())).unwrap();

        assert_eq!(cfg.rabbitmq.host.as_deref(), Some("env-host"));
        assert_eq!(cfg.rabbitmq.port, Some(5671));
    }

    #[test]
    fn load_fails_for_a_missing_explicit_file() {
        let err = load_with_env(&[], Some(Path::new("/nonexistent/rabbit.toml"))).unwrap_err();

        assert!(matches!(err, AmqpError::InvalidConfiguration(..)));
    }

    #[test]
    fn secrets_are_redacted() {
        let cfg = Configs::from_toml("[rabbitmq]\npassword = \"hunter2\"").unwrap();

        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("hunter2"));
        assert_eq!(cfg.rabbitmq.password.unwrap().expose(), "hunter2");
    }
}
