use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::PacketConn;
use crate::addr::{NetAddr, TOPIC_NETWORK, TopicAddr};
use crate::client::{InboundMessage, MessageHandler, MessagingClient, QoS};
use crate::utils::{Error, Result};

/// Capacity of the inbound queue shared by all subscriptions. A full queue
/// blocks delivery until a reader drains it.
pub const INBOUND_QUEUE_CAPACITY: usize = 2;

/// Grace period handed to the client when the connection is closed.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct ConnState {
    default_topic: Option<String>,
    default_qos: QoS,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

/// An MQTT session exposed as a `PacketConn`.
///
/// Every subscription feeds one bounded inbound queue; reads take from it in
/// delivery order. Writes publish to the given topic (or the default
/// destination) at the default QoS, never retained.
pub struct MqttConn<C: MessagingClient> {
    client: C,
    state: Mutex<ConnState>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    closed: watch::Sender<bool>,
    disconnect_grace: Duration,
}

impl<C: MessagingClient> MqttConn<C> {
    /// Wraps an already connected client. No subscription is made.
    pub fn wrap(client: C) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (closed, _) = watch::channel(false);
        Self {
            client,
            state: Mutex::new(ConnState {
                default_topic: None,
                default_qos: QoS::AtMostOnce,
                read_deadline: None,
                write_deadline: None,
            }),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
        }
    }

    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    fn state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Subscribes to `topic`; its messages are pushed onto the inbound queue.
    ///
    /// Messages arriving after `close` are dropped and logged.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let tx = self.inbound_tx.clone();
        let closed = self.closed.subscribe();
        let handler: MessageHandler = Arc::new(move |msg: InboundMessage| {
            let tx = tx.clone();
            let closed = *closed.borrow();
            async move {
                if closed {
                    warn!(topic = %msg.topic, "connection closed, dropping delivery");
                    return;
                }
                if let Err(mpsc::error::SendError(msg)) = tx.send(msg).await {
                    warn!(topic = %msg.topic, "inbound queue closed, dropping delivery");
                }
            }
            .boxed()
        });

        self.client.subscribe(topic, qos, handler).await?;
        debug!(topic, ?qos, "subscribed");
        Ok(())
    }

    /// Subscribes to `topic` at QoS 0 and makes it the default destination.
    pub(crate) async fn attach_default_topic(&self, topic: &str) -> Result<()> {
        self.subscribe(topic, QoS::AtMostOnce).await?;
        self.set_default_destination(topic);
        Ok(())
    }

    pub fn set_default_destination(&self, topic: impl Into<String>) {
        self.state().default_topic = Some(topic.into());
    }

    pub fn default_destination(&self) -> Option<String> {
        self.state().default_topic.clone()
    }

    /// Sets the QoS used by every write.
    pub fn set_default_qos(&self, qos: QoS) {
        self.state().default_qos = qos;
    }

    pub fn default_qos(&self) -> QoS {
        self.state().default_qos
    }

    /// Waits for the next inbound message, or for the connection to close.
    async fn next_message(&self) -> Result<InboundMessage> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(Error::Closed),
            msg = inbound.recv() => msg.ok_or(Error::Closed),
        }
    }
}

#[async_trait]
impl<C: MessagingClient> PacketConn for MqttConn<C> {
    type Addr = TopicAddr;

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let topic = self.default_destination().ok_or(Error::NoDestination)?;
        self.write_to(buf, &TopicAddr::new(topic)).await
    }

    async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, TopicAddr)> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let deadline = self.state().read_deadline;
        let msg = match deadline {
            None => self.next_message().await?,
            Some(deadline) => {
                if deadline <= Instant::now() {
                    return Err(Error::Timeout { op: "read" });
                }
                // recv is cancel safe: losing the race consumes nothing
                tokio::time::timeout_at(deadline, self.next_message())
                    .await
                    .map_err(|_| Error::Timeout { op: "read" })??
            }
        };

        let n = buf.len().min(msg.payload.len());
        buf[..n].copy_from_slice(&msg.payload[..n]);
        if n < msg.payload.len() {
            trace!(
                topic = %msg.topic,
                payload_len = msg.payload.len(),
                copied = n,
                "inbound payload truncated"
            );
        }
        Ok((n, TopicAddr::from(msg.topic)))
    }

    async fn write_to(&self, buf: &[u8], addr: &dyn NetAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if addr.network() != TOPIC_NETWORK {
            return Err(Error::AddressType {
                network: addr.network().to_string(),
            });
        }

        let (qos, deadline) = {
            let state = self.state();
            (state.default_qos, state.write_deadline)
        };
        if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Error::Timeout { op: "publish" });
        }

        let topic = addr.to_string();
        let token = self
            .client
            .publish(&topic, qos, false, Bytes::copy_from_slice(buf));
        match deadline {
            None => token.wait().await?,
            Some(deadline) => token.wait_until(deadline).await?,
        }
        trace!(%topic, bytes = buf.len(), "published");
        Ok(buf.len())
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.state().read_deadline = deadline;
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.state().write_deadline = deadline;
    }

    /// Brokers have no notion of a local endpoint; always the empty topic.
    fn local_addr(&self) -> TopicAddr {
        TopicAddr::default()
    }

    /// The default destination, or the empty topic when none is set.
    fn remote_addr(&self) -> TopicAddr {
        self.default_destination()
            .map(TopicAddr::from)
            .unwrap_or_default()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            debug!("close on an already closed connection");
            return Ok(());
        }

        // readers waiting on the queue have seen the flag and released it
        self.inbound_rx.lock().await.close();
        info!(grace = ?self.disconnect_grace, "closing connection");
        self.client.disconnect(self.disconnect_grace).await
    }
}
