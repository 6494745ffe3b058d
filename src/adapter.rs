// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Listener Adapter
//!
//! Connects a typed receiver to a listener container. The receiver declares
//! the payload type it accepts; the adapter converts each delivery into that
//! type with [`FromMessage`] before calling it.
//!
//! ```ignore
//! struct Monitor;
//!
//! #[async_trait]
//! impl Receiver<String> for Monitor {
//!     async fn receive_message(&self, payload: String) -> Result<(), HandlerError> {
//!         tracing::info!(payload, "status update");
//!         Ok(())
//!     }
//! }
//!
//! let handler = ListenerAdapter::new(Arc::new(Monitor));
//! ```

use crate::{errors::HandlerError, handler::MessageHandler, message::ConsumerMessage};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::de::DeserializeOwned;
use std::{marker::PhantomData, sync::Arc};

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Business logic invoked once per delivery with the converted payload.
#[async_trait]
pub trait Receiver<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn receive_message(&self, payload: T) -> Result<(), HandlerError>;
}

/// Conversion from a delivery to a receiver's payload type.
pub trait FromMessage: Sized {
    fn from_message(msg: &ConsumerMessage) -> Result<Self, HandlerError>;
}

/// The raw body.
impl FromMessage for Vec<u8> {
    fn from_message(msg: &ConsumerMessage) -> Result<Self, HandlerError> {
        Ok(msg.data.clone())
    }
}

/// The body as UTF-8 text.
impl FromMessage for String {
    fn from_message(msg: &ConsumerMessage) -> Result<Self, HandlerError> {
        String::from_utf8(msg.data.clone())
            .map_err(|err| HandlerError::Conversion(err.to_string()))
    }
}

/// A JSON body deserialized into `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> FromMessage for Json<T>
where
    T: DeserializeOwned,
{
    fn from_message(msg: &ConsumerMessage) -> Result<Self, HandlerError> {
        if let Some(content_type) = &msg.content_type {
            if !content_type.starts_with(JSON_CONTENT_TYPE) {
                return Err(HandlerError::Conversion(format!(
                    "unexpected content type `{}`",
                    content_type
                )));
            }
        }

        serde_json::from_slice(&msg.data)
            .map(Json)
            .map_err(|err| HandlerError::Conversion(err.to_string()))
    }
}

/// A [`MessageHandler`] forwarding converted payloads to a [`Receiver`].
pub struct ListenerAdapter<T, R: ?Sized> {
    receiver: Arc<R>,
    payload: PhantomData<fn() -> T>,
}

impl<T, R> ListenerAdapter<T, R>
where
    T: FromMessage + Send + 'static,
    R: Receiver<T> + ?Sized + 'static,
{
    pub fn new(receiver: Arc<R>) -> Arc<ListenerAdapter<T, R>> {
        Arc::new(ListenerAdapter {
            receiver,
            payload: PhantomData,
        })
    }
}

#[async_trait]
impl<T, R> MessageHandler for ListenerAdapter<T, R>
where
    T: FromMessage + Send + 'static,
    R: Receiver<T> + ?Sized + 'static,
{
    async fn exec(&self, _ctx: &Context, msg: &ConsumerMessage) -> Result<(), HandlerError> {
        let payload = T::from_message(msg)?;
        self.receiver.receive_message(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct DeviceStatus {
        device: String,
        online: bool,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Receiver<String> for Recorder {
        async fn receive_message(&self, payload: String) -> Result<(), HandlerError> {
            if payload == "boom" {
                return Err(HandlerError::failed("receiver exploded"));
            }
            self.seen.lock().unwrap().push(payload);
            Ok(())
        }
    }

    struct StatusReceiver {
        seen: Mutex<Vec<DeviceStatus>>,
    }

    #[async_trait]
    impl Receiver<Json<DeviceStatus>> for StatusReceiver {
        async fn receive_message(&self, payload: Json<DeviceStatus>) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(payload.0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_text_payloads_to_the_receiver() {
        let receiver = Arc::new(Recorder::default());
        let adapter = ListenerAdapter::<String, _>::new(receiver.clone());

        let msg = ConsumerMessage::new("sample_queue", b"sensor-7 online");
        adapter.exec(&Context::new(), &msg).await.unwrap();

        assert_eq!(*receiver.seen.lock().unwrap(), vec!["sensor-7 online"]);
    }

    #[tokio::test]
    async fn receiver_failures_are_returned() {
        let adapter = ListenerAdapter::<String, _>::new(Arc::new(Recorder::default()));

        let err = adapter
            .exec(&Context::new(), &ConsumerMessage::new("sample_queue", b"boom"))
            .await
            .unwrap_err();

        assert_eq!(err, HandlerError::Failed("receiver exploded".to_owned()));
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_conversion_error() {
        let receiver = Arc::new(Recorder::default());
        let adapter = ListenerAdapter::<String, _>::new(receiver.clone());

        let err = adapter
            .exec(&Context::new(), &ConsumerMessage::new("sample_queue", &[0xff, 0xfe]))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Conversion(_)));
        assert!(receiver.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn decodes_json_payloads() {
        let receiver = Arc::new(StatusReceiver {
            seen: Mutex::new(vec![]),
        });
        let adapter = ListenerAdapter::<Json<DeviceStatus>, _>::new(receiver.clone());

        let msg = ConsumerMessage::new("sample_queue", br#"{"device":"sensor-7","online":true}"#)
            .with_content_type(JSON_CONTENT_TYPE);
        adapter.exec(&Context::new(), &msg).await.unwrap();

        assert_eq!(
            *receiver.seen.lock().unwrap(),
            vec![DeviceStatus {
                device: "sensor-7".to_owned(),
                online: true
            }]
        );
    }

    #[test]
    fn json_rejects_other_content_types() {
        let msg = ConsumerMessage::new("sample_queue", b"{}").with_content_type("text/plain");

        let err = Json::<serde_json::Value>::from_message(&msg).unwrap_err();

        assert_eq!(
            err,
            HandlerError::Conversion("unexpected content type `text/plain`".to_owned())
        );
    }

    #[test]
    fn raw_bytes_are_passed_through() {
        let msg = ConsumerMessage::new("sample_queue", &[1, 2, 3]);

        assert_eq!(Vec::<u8>::from_message(&msg).unwrap(), vec![1, 2, 3]);
    }
}
