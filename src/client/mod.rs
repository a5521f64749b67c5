//! Messaging-client capability
//!
//! The connection adapter never talks to a broker directly. It drives a
//! `MessagingClient`: something that is already connected and can register
//! per-topic handlers, publish with a completion token, and disconnect.
//! `MqttSession` is the rumqttc-backed implementation used by `dial`.

mod session;
mod token;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
pub use rumqttc::QoS;

use crate::utils::{Error, Result};

pub use session::MqttSession;
pub use token::{PublishCompleter, PublishToken};

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Callback run by the client for every message on a subscribed topic.
///
/// The client awaits the returned future before delivering the next message,
/// so a handler that waits for queue capacity stalls delivery.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// A connected publish/subscribe session.
#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// Registers `handler` for messages matching `topic` and requests the
    /// subscription from the broker. If the request cannot be made, the
    /// previous registration for `topic` is left in place. Delivery failures
    /// are not reported here.
    async fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<()>;

    /// Starts a publish and returns its completion token. Publishes reach the
    /// broker in call order whether or not their tokens are awaited. Dropping
    /// the token does not cancel the publish.
    fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> PublishToken;

    /// Ends the session, giving in-flight work up to `grace` to finish.
    async fn disconnect(&self, grace: Duration) -> Result<()>;
}

/// Maps a numeric QoS level (0, 1, 2) to `QoS`.
pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::InvalidQos(other)),
    }
}

/// MQTT topic filter matching with `+` (one level) and `#` (rest) wildcards.
///
/// Topics starting with `$` are not matched by a leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
