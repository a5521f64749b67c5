//! rumqttc-backed session
//!
//! `MqttSession` owns an `AsyncClient` and three background tasks:
//! - the event loop task polls rumqttc's `EventLoop`. It signals the first
//!   CONNACK (or the first connection error) to `connect`, resolves publish
//!   tokens (QoS 0 once the packet is written, QoS 1 on PUBACK, QoS 2 on
//!   PUBCOMP) and forwards inbound publishes to the delivery task. It never
//!   waits on a handler, so writes, acks and pings keep flowing while a
//!   reader is slow.
//! - the delivery task runs the matching handlers one message at a time, so
//!   per-topic order is kept and a slow handler stalls only delivery.
//! - the submit task hands publishes to rumqttc in the order `publish` was
//!   called.
//!
//! Reconnecting after the session is up is left to rumqttc; the event loop
//! only logs the error and keeps polling.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    InboundMessage, MessageHandler, MessagingClient, PublishCompleter, PublishToken, topic_matches,
};
use crate::config::ClientSettings;
use crate::utils::{Error, Result};

struct Subscription {
    filter: String,
    handler: MessageHandler,
}

struct PendingPublish {
    qos: QoS,
    completer: PublishCompleter,
}

/// State shared between the session handle and its event loop task.
#[derive(Default)]
struct Shared {
    subscriptions: RwLock<Vec<Subscription>>,
    /// Publishes handed to rumqttc, in request order, not yet written.
    queued: Mutex<VecDeque<PendingPublish>>,
    /// Written QoS 1/2 publishes waiting for their ack, by packet id.
    awaiting_ack: Mutex<HashMap<u16, PublishCompleter>>,
}

struct PublishRequest {
    topic: String,
    qos: QoS,
    retain: bool,
    payload: Bytes,
    completer: PublishCompleter,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn handlers_for(&self, topic: &str) -> Vec<MessageHandler> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|sub| topic_matches(&sub.filter, topic))
            .map(|sub| sub.handler.clone())
            .collect()
    }

    async fn deliver(&self, publish: Publish) {
        let handlers = self.handlers_for(&publish.topic);
        if handlers.is_empty() {
            trace!(topic = %publish.topic, "no handler for inbound publish");
            return;
        }
        for handler in handlers {
            handler(InboundMessage::new(publish.topic.clone(), publish.payload.clone())).await;
        }
    }

    fn written(&self, pkid: u16) {
        let Some(pending) = lock(&self.queued).pop_front() else {
            trace!(pkid, "outgoing publish without a pending token");
            return;
        };
        match pending.qos {
            QoS::AtMostOnce => pending.completer.complete(Ok(())),
            _ => {
                lock(&self.awaiting_ack).insert(pkid, pending.completer);
            }
        }
    }

    fn acked(&self, pkid: u16) {
        if let Some(completer) = lock(&self.awaiting_ack).remove(&pkid) {
            completer.complete(Ok(()));
        }
    }

    fn fail_pending(&self, reason: &str) {
        let queued: Vec<_> = lock(&self.queued).drain(..).map(|p| p.completer).collect();
        let awaiting: Vec<_> = lock(&self.awaiting_ack).drain().map(|(_, c)| c).collect();
        for completer in queued.into_iter().chain(awaiting) {
            completer.complete(Err(Error::Transport(reason.to_string())));
        }
    }
}

/// A connected MQTT session driven by rumqttc.
pub struct MqttSession {
    client: AsyncClient,
    shared: Arc<Shared>,
    publishes: mpsc::UnboundedSender<PublishRequest>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    /// Delivery and submit tasks.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MqttSession {
    /// Connects to the broker described by `options` and waits for CONNACK.
    ///
    /// Fails without retrying if the first connection attempt errors or no
    /// CONNACK arrives within `settings.connect_timeout()`.
    pub async fn connect(options: MqttOptions, settings: &ClientSettings) -> Result<Self> {
        let (host, port) = options.broker_address();
        let client_id = options.client_id();
        let (client, event_loop) = AsyncClient::new(options, settings.request_capacity);
        let shared = Arc::new(Shared::default());
        let (connected_tx, connected_rx) = oneshot::channel();
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();

        let delivery = tokio::spawn(run_delivery(shared.clone(), deliveries_rx));
        let event_loop = tokio::spawn(run_event_loop(
            event_loop,
            shared.clone(),
            deliveries_tx,
            connected_tx,
            settings.reconnect_delay(),
        ));

        let outcome = match tokio::time::timeout(settings.connect_timeout(), connected_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Connect("event loop stopped before CONNACK".to_string())),
            Err(_) => Err(Error::Connect(format!(
                "no CONNACK within {:?}",
                settings.connect_timeout()
            ))),
        };
        if let Err(err) = outcome {
            event_loop.abort();
            delivery.abort();
            return Err(err);
        }

        let (publishes, publish_rx) = mpsc::unbounded_channel();
        let submit = tokio::spawn(run_submit(client.clone(), shared.clone(), publish_rx));

        info!(%host, port, %client_id, "connected to broker");
        Ok(Self {
            client,
            shared,
            publishes,
            event_loop: Mutex::new(Some(event_loop)),
            workers: Mutex::new(vec![delivery, submit]),
        })
    }

    #[cfg(test)]
    pub(super) fn filters(&self) -> Vec<String> {
        self.shared
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|sub| sub.filter.clone())
            .collect()
    }

    fn stop_workers(&self) {
        for worker in lock(&self.workers).drain(..) {
            worker.abort();
        }
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    deliveries: mpsc::UnboundedSender<Publish>,
    connected: oneshot::Sender<Result<()>>,
    reconnect_delay: Duration,
) {
    let mut connected = Some(connected);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(session_present = ack.session_present, "CONNACK received");
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Err(mpsc::error::SendError(publish)) = deliveries.send(publish) {
                    warn!(topic = %publish.topic, "delivery task gone, dropping publish");
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => shared.acked(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => shared.acked(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => shared.written(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent, stopping event loop");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                debug!("session handle dropped, stopping event loop");
                break;
            }
            Err(err) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Err(Error::Connect(err.to_string())));
                    return;
                }
                warn!(error = %err, "mqtt connection error");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
    shared.fail_pending("session closed");
}

async fn run_delivery(shared: Arc<Shared>, mut deliveries: mpsc::UnboundedReceiver<Publish>) {
    while let Some(publish) = deliveries.recv().await {
        shared.deliver(publish).await;
    }
}

async fn run_submit(
    client: AsyncClient,
    shared: Arc<Shared>,
    mut requests: mpsc::UnboundedReceiver<PublishRequest>,
) {
    while let Some(request) = requests.recv().await {
        let PublishRequest {
            topic,
            qos,
            retain,
            payload,
            completer,
        } = request;
        // pushed before rumqttc sees the request, so `written` finds it
        lock(&shared.queued).push_back(PendingPublish { qos, completer });
        if let Err(err) = client.publish_bytes(topic, qos, retain, payload).await {
            // rumqttc never saw it, so ours is still the newest entry
            if let Some(pending) = lock(&shared.queued).pop_back() {
                pending.completer.complete(Err(err.into()));
            }
        }
    }
}

#[async_trait]
impl MessagingClient for MqttSession {
    async fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<()> {
        // registered before the request so nothing the broker sends is missed
        let replaced = {
            let mut subs = self
                .shared
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match subs.iter_mut().find(|sub| sub.filter == topic) {
                Some(existing) => Some(std::mem::replace(&mut existing.handler, handler)),
                None => {
                    subs.push(Subscription {
                        filter: topic.to_string(),
                        handler,
                    });
                    None
                }
            }
        };

        if let Err(err) = self.client.subscribe(topic, qos).await {
            let mut subs = self
                .shared
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match replaced {
                Some(previous) => {
                    if let Some(existing) = subs.iter_mut().find(|sub| sub.filter == topic) {
                        existing.handler = previous;
                    }
                }
                None => subs.retain(|sub| sub.filter != topic),
            }
            return Err(err.into());
        }
        debug!(topic, ?qos, "subscribe requested");
        Ok(())
    }

    fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> PublishToken {
        let (completer, token) = PublishToken::pair();
        let request = PublishRequest {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
            completer,
        };
        if let Err(mpsc::error::SendError(request)) = self.publishes.send(request) {
            request
                .completer
                .complete(Err(Error::Transport("session closed".to_string())));
        }
        token
    }

    async fn disconnect(&self, grace: Duration) -> Result<()> {
        if let Err(err) = self.client.disconnect().await {
            debug!(error = %err, "disconnect request not delivered");
        }

        let task = lock(&self.event_loop).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!(?grace, "event loop still running after grace period, aborting");
                task.abort();
            }
        }
        self.stop_workers();
        self.shared.fail_pending("session closed");
        info!("disconnected from broker");
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.event_loop).take() {
            task.abort();
        }
        self.stop_workers();
    }
}
