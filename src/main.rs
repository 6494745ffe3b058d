// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use async_trait::async_trait;
use rabbitmq_listener::{
    adapter::{ListenerAdapter, Receiver},
    bootstrap::RabbitApplication,
    configs::Configs,
    errors::{AmqpError, HandlerError},
    logging,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

/// Logs every message received on the queue.
struct LogReceiver;

#[async_trait]
impl Receiver<String> for LogReceiver {
    async fn receive_message(&self, payload: String) -> Result<(), HandlerError> {
        info!(payload, "message received");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), AmqpError> {
    dotenvy::dotenv().ok();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Configs::load(path.as_deref())?;
    logging::init_logging(&cfg.app);

    let handler = ListenerAdapter::<String, _>::new(Arc::new(LogReceiver));
    let app = RabbitApplication::new(&cfg, handler)?;

    if let Err(err) = app.start().await {
        error!(error = err.to_string(), "failure to start");
        if let Err(shutdown_err) = app.shutdown().await {
            error!(error = shutdown_err.to_string(), "failure to shutdown");
        }
        return Err(err);
    }

    info!(queue = app.queue().name(), "waiting for messages, ctrl-c to exit");
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = err.to_string(), "failure to listen for ctrl-c");
    }

    app.shutdown().await
}
