// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level.

use crate::configs::{AppConfigs, LogFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_logging(app: &AppConfigs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&app.log_level));

    let layer = match app.log_format {
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).with_ansi(true).boxed(),
    };

    // a subscriber installed earlier (tests, embedding app) stays in place
    if tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_err()
    {
        tracing::debug!("global tracing subscriber already initialized");
    }

    tracing::info!(app = app.name, format = ?app.log_format, "logging initialized");
}
