//! rumqttc-backed broker connection.
//!
//! A single `AsyncClient` is shared by every caller. Its `EventLoop` runs on
//! a background task that forwards incoming publishes to the broker inbox,
//! resolves publish acknowledgements and reconnects on its own after
//! network errors.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, QoS,
};
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::config::MqttConfig;
use crate::ports::{BrokerError, BrokerInbox, BrokerMessage, MessageBroker};

/// Pause between polls after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Live MQTT connection.
pub struct MqttBroker {
    client: AsyncClient,
    qos: QoS,
    ack_timeout: Duration,
    connected: Arc<AtomicBool>,
    pending: Arc<Mutex<PendingAcks>>,
    active_topics: Arc<Mutex<HashSet<String>>>,
}

/// Publishes waiting for the broker, matched to packet ids as they go out.
///
/// rumqttc sends publishes in request order, so the oldest queued waiter
/// belongs to the next outgoing publish. A packet id already in flight is a
/// retransmission and takes no new waiter.
#[derive(Default)]
struct PendingAcks {
    queued: VecDeque<oneshot::Sender<()>>,
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

impl PendingAcks {
    fn enqueue(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.queued.push_back(tx);
        rx
    }

    /// A publish left the client. QoS 0 publishes are done at this point.
    fn on_sent(&mut self, pkid: u16, qos: QoS) {
        if qos == QoS::AtMostOnce {
            if let Some(waiter) = self.queued.pop_front() {
                let _ = waiter.send(());
            }
            return;
        }
        if self.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(waiter) = self.queued.pop_front() {
            self.in_flight.insert(pkid, waiter);
        }
    }

    /// PUBACK (QoS 1) or PUBCOMP (QoS 2) for `pkid`.
    fn on_acked(&mut self, pkid: u16) {
        if let Some(waiter) = self.in_flight.remove(&pkid) {
            let _ = waiter.send(());
        }
    }

    /// Connection lost: every waiter fails.
    fn fail_all(&mut self) -> usize {
        let failed = self.queued.len() + self.in_flight.len();
        self.queued.clear();
        self.in_flight.clear();
        failed
    }
}

impl MqttBroker {
    /// Connect to the broker and wait for it to accept the session.
    ///
    /// Returns the broker handle together with the inbox every incoming
    /// publish is delivered to.
    ///
    /// # Errors
    ///
    /// - `BrokerError::Connection` if the broker is unreachable or refuses us
    /// - `BrokerError::ConnectTimeout` if no CONNACK arrives in time
    pub async fn connect(config: &MqttConfig) -> Result<(Self, BrokerInbox), BrokerError> {
        let qos = qos_from_level(config.qos)?;
        let client_id = config.client_id.clone().unwrap_or_else(generate_client_id);

        let mut options = MqttOptions::new(client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.as_str(), password.expose_secret().as_str());
        }

        let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity);

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BrokerError::ConnectTimeout(config.connect_timeout_secs))??;

        tracing::info!(host = %config.host, port = config.port, "MQTT broker connected");

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity);
        let broker = Self::new(client, qos, config.ack_timeout());
        broker.connected.store(true, Ordering::SeqCst);

        tokio::spawn(run_event_loop(
            eventloop,
            ConnectionState {
                client: broker.client.clone(),
                qos,
                connected: broker.connected.clone(),
                pending: broker.pending.clone(),
                active_topics: broker.active_topics.clone(),
            },
            inbox_tx,
        ));

        Ok((broker, inbox_rx))
    }

    fn new(client: AsyncClient, qos: QoS, ack_timeout: Duration) -> Self {
        Self {
            client,
            qos,
            ack_timeout,
            connected: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(PendingAcks::default())),
            active_topics: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Ask the broker to end the session. The event loop stops afterwards.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    fn ensure_connected(&self) -> Result<(), String> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err("broker not connected".to_string())
        }
    }
}

#[async_trait]
impl MessageBroker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let publish_error = |reason: String| BrokerError::Publish {
            topic: topic.to_string(),
            reason,
        };
        self.ensure_connected().map_err(publish_error)?;

        // Queue the waiter under the same lock the event loop takes to pair
        // it with a packet id.
        let acked = {
            let mut pending = self.pending.lock().await;
            self.client
                .try_publish(topic, self.qos, false, payload)
                .map_err(|e| publish_error(request_failure(e)))?;
            pending.enqueue()
        };

        match tokio::time::timeout(self.ack_timeout, acked).await {
            Ok(Ok(())) => {
                tracing::trace!(topic = %topic, "Publish acknowledged");
                Ok(())
            }
            Ok(Err(_)) => Err(publish_error(
                "connection lost before acknowledgement".to_string(),
            )),
            Err(_) => Err(publish_error(format!(
                "no acknowledgement within {}ms",
                self.ack_timeout.as_millis()
            ))),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        let subscribe_error = |reason: String| BrokerError::Subscribe {
            topic: topic.to_string(),
            reason,
        };
        self.ensure_connected().map_err(subscribe_error)?;
        self.client
            .try_subscribe(topic, self.qos)
            .map_err(|e| subscribe_error(request_failure(e)))?;
        self.active_topics.lock().await.insert(topic.to_string());
        tracing::debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        // A fresh session after reconnect must not bring the topic back.
        self.active_topics.lock().await.remove(topic);

        let unsubscribe_error = |reason: String| BrokerError::Unsubscribe {
            topic: topic.to_string(),
            reason,
        };
        self.ensure_connected().map_err(unsubscribe_error)?;
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| unsubscribe_error(request_failure(e)))?;
        tracing::debug!(topic = %topic, "Unsubscribed");
        Ok(())
    }
}

fn request_failure(err: ClientError) -> String {
    match err {
        ClientError::TryRequest(_) => "client request queue full or closed".to_string(),
        other => other.to_string(),
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BrokerError::Connection(format!(
                        "broker refused connection: {:?}",
                        code
                    ))),
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(BrokerError::Connection(e.to_string())),
        }
    }
}

/// Handles shared between the broker and its event loop task.
struct ConnectionState {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
    pending: Arc<Mutex<PendingAcks>>,
    active_topics: Arc<Mutex<HashSet<String>>>,
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    state: ConnectionState,
    inbox: mpsc::Sender<BrokerMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = BrokerMessage::new(publish.topic, publish.payload.to_vec());
                if inbox.send(message).await.is_err() {
                    tracing::info!("Broker inbox dropped, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                state.pending.lock().await.on_sent(pkid, state.qos);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                state.pending.lock().await.on_acked(ack.pkid);
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                state.pending.lock().await.on_acked(comp.pkid);
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                state.connected.store(true, Ordering::SeqCst);
                // A fresh session has forgotten our subscriptions.
                if !ack.session_present {
                    resubscribe(&state.client, &state.active_topics, state.qos).await;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("MQTT broker sent DISCONNECT");
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                tracing::info!("MQTT client dropped, stopping event loop");
                break;
            }
            Err(e) => {
                state.connected.store(false, Ordering::SeqCst);
                let failed = state.pending.lock().await.fail_all();
                tracing::error!(
                    error = %e,
                    failed_publishes = failed,
                    "MQTT connection error, reconnecting"
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    state.connected.store(false, Ordering::SeqCst);
}

async fn resubscribe(client: &AsyncClient, active_topics: &Mutex<HashSet<String>>, qos: QoS) {
    let topics = active_topics.lock().await;
    if topics.is_empty() {
        return;
    }
    tracing::info!(count = topics.len(), "Restoring MQTT subscriptions after reconnect");
    for topic in topics.iter() {
        // The event loop is the request queue's only consumer, so never block here.
        if let Err(e) = client.try_subscribe(topic.as_str(), qos) {
            tracing::error!(topic = %topic, error = %e, "Failed to restore subscription");
        }
    }
}

fn qos_from_level(level: u8) -> Result<QoS, BrokerError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BrokerError::Connection(format!("invalid QoS level {}", other))),
    }
}

fn generate_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("nexus-hub-{}", &suffix[..8])
}
