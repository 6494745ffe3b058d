// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;
mod otel;

pub mod adapter;
pub mod bootstrap;
pub mod configs;
pub mod connection;
pub mod errors;
pub mod factory;
pub mod handler;
pub mod listener;
pub mod logging;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod topology;

pub use consumer::Settlement;
