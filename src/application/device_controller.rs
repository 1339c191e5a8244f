//! Device controller bridging many listeners onto one broker connection.
//!
//! # Message Flow
//!
//! ```text
//!   gateway ──► MessageBroker ──► BrokerInbox ──► DeviceController::dispatch
//!                                                        │
//!                                  ┌─────────────────────┼──────────────────┐
//!                                  ▼                     ▼                  ▼
//!                             listener a            listener b         listener c
//!                             (desk_lamp)           (desk_lamp)        (floor_lamp)
//! ```
//!
//! One broker subscription per device serves every listener registered for
//! that device. Outbound commands go straight to the broker.
//!
//! Broker calls are never made while the listener map is locked: dispatch
//! keeps flowing while a subscribe or unsubscribe waits on the broker.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::zigbee::{DeviceName, DeviceState, DeviceTopics};
use crate::ports::{BrokerInbox, BrokerMessage, DeviceListener, MessageBroker};

/// Fans broker state reports out to registered listeners and forwards
/// commands to the broker.
///
/// # Thread Safety
///
/// The listener map sits behind a `RwLock`. Dispatch holds the read lock
/// while it invokes listeners, so once `unsubscribe_from_device` returns the
/// removed listener is never called again. Listeners must therefore not
/// call back into the controller.
///
/// Subscribe and unsubscribe for the same device are serialized by a
/// per-device mutex, which is the only lock held across broker calls.
pub struct DeviceController {
    broker: Arc<dyn MessageBroker>,
    topics: DeviceTopics,
    listeners: RwLock<HashMap<DeviceName, Vec<Arc<dyn DeviceListener>>>>,
    device_ops: Vec<Mutex<()>>,
}

impl DeviceController {
    /// Create a controller over a broker connection and topic namespace.
    pub fn new(broker: Arc<dyn MessageBroker>, topics: DeviceTopics) -> Self {
        Self {
            broker,
            topics,
            listeners: RwLock::new(HashMap::new()),
            device_ops: DeviceName::ALL.iter().map(|_| Mutex::new(())).collect(),
        }
    }

    /// Create as an Arc (for sharing with every session).
    pub fn new_shared(broker: Arc<dyn MessageBroker>, topics: DeviceTopics) -> Arc<Self> {
        Arc::new(Self::new(broker, topics))
    }

    /// The topic namespace this controller works in.
    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Register `listener` for state updates of `device`.
    ///
    /// The listener is recorded first, so the snapshot reply can never
    /// overtake it. Then the device is asked for a snapshot and, on the first
    /// registration, its state topic is subscribed. If either broker call
    /// fails the registration is rolled back.
    pub async fn subscribe_to_device(
        &self,
        device: DeviceName,
        listener: Arc<dyn DeviceListener>,
    ) -> Result<(), DomainError> {
        let _op = self.device_op(device).lock().await;

        let first = {
            let mut listeners = self.listeners.write().await;
            let first = !listeners.contains_key(&device);
            let registered = listeners.entry(device).or_default();
            registered.push(listener.clone());
            tracing::debug!(
                device = %device,
                listeners = registered.len(),
                "Listener registered"
            );
            first
        };

        if let Err(e) = self.open_device(device, first).await {
            self.remove_listener(device, &listener).await;
            tracing::debug!(device = %device, error = %e, "Listener registration rolled back");
            return Err(e);
        }

        Ok(())
    }

    /// Remove a previously registered listener (matched by identity).
    ///
    /// When the last listener for a device goes, its bookkeeping entry is
    /// deleted and the broker subscription for its state topic is dropped.
    /// Unknown listeners are ignored.
    pub async fn unsubscribe_from_device(
        &self,
        device: DeviceName,
        listener: &Arc<dyn DeviceListener>,
    ) -> Result<(), DomainError> {
        let _op = self.device_op(device).lock().await;

        if self.remove_listener(device, listener).await == Some(true) {
            self.broker.unsubscribe(&self.topics.state(device)).await?;
            tracing::debug!(device = %device, "Last listener removed, topic released");
        }

        Ok(())
    }

    async fn open_device(&self, device: DeviceName, first: bool) -> Result<(), DomainError> {
        self.broker
            .publish(&self.topics.get(device), snapshot_request())
            .await?;
        if first {
            self.broker.subscribe(&self.topics.state(device)).await?;
        }
        Ok(())
    }

    /// Drop `listener` from the map. `None` when it was not registered,
    /// otherwise whether it was the device's last listener.
    async fn remove_listener(
        &self,
        device: DeviceName,
        listener: &Arc<dyn DeviceListener>,
    ) -> Option<bool> {
        let mut listeners = self.listeners.write().await;
        let registered = listeners.get_mut(&device)?;
        let position = registered.iter().position(|l| same_listener(l, listener))?;
        registered.remove(position);

        let last = registered.is_empty();
        if last {
            listeners.remove(&device);
        }
        Some(last)
    }

    fn device_op(&self, device: DeviceName) -> &Mutex<()> {
        &self.device_ops[device as usize]
    }

    /// Command a new (possibly partial) state for `device`.
    ///
    /// Completes once the broker acknowledged the publish. The device's
    /// confirmation arrives later as an ordinary state report.
    pub async fn set_device_state(
        &self,
        device: DeviceName,
        state: &DeviceState,
    ) -> Result<(), DomainError> {
        if state.device() != device {
            return Err(DomainError::validation(
                "state",
                format!("State of {} sent to {}", state.device(), device),
            ));
        }

        let payload = serde_json::to_vec(state)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        self.broker.publish(&self.topics.set(device), payload).await?;

        tracing::debug!(device = %device, "State command published");
        Ok(())
    }

    /// Ask `device` to report its current state.
    pub async fn request_state(&self, device: DeviceName) -> Result<(), DomainError> {
        self.broker
            .publish(&self.topics.get(device), snapshot_request())
            .await?;
        Ok(())
    }

    /// Deliver one inbound broker message to the listeners of its device.
    ///
    /// Messages outside the namespace or for sub-topics are ignored, and a
    /// payload that is not JSON is dropped. Any JSON is forwarded as is. A
    /// failing listener is logged and skipped. Returns how many listeners
    /// accepted the update.
    pub async fn dispatch(&self, message: BrokerMessage) -> usize {
        let Some(device) = self.topics.parse_state(&message.topic) else {
            tracing::trace!(topic = %message.topic, "Ignoring message outside device namespace");
            return 0;
        };

        let state = match DeviceState::from_slice(device, &message.payload) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(
                    device = %device,
                    error = %e,
                    "Dropping non-JSON state payload"
                );
                return 0;
            }
        };
        tracing::trace!(
            device = %device,
            power = ?state.power(),
            brightness = ?state.brightness(),
            "State report received"
        );

        let listeners = self.listeners.read().await;
        let Some(registered) = listeners.get(&device) else {
            return 0;
        };

        let mut delivered = 0;
        for listener in registered {
            let outcome = AssertUnwindSafe(listener.on_state(device, state.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::debug!(
                        device = %device,
                        listener = listener.name(),
                        error = %e,
                        "Listener rejected state update"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        device = %device,
                        listener = listener.name(),
                        "Listener panicked while handling state update"
                    );
                }
            }
        }

        delivered
    }

    /// Dispatch every message from the broker inbox until it closes.
    ///
    /// Messages are handled one at a time, so each device's updates reach
    /// listeners in broker delivery order.
    pub async fn run(self: Arc<Self>, mut inbox: BrokerInbox) {
        tracing::info!(base_topic = %self.topics.base(), "Device dispatch loop started");
        while let Some(message) = inbox.recv().await {
            self.dispatch(message).await;
        }
        tracing::info!("Broker inbox closed, device dispatch loop stopped");
    }

    /// Number of listeners currently registered for `device`.
    pub async fn listener_count(&self, device: DeviceName) -> usize {
        self.listeners
            .read()
            .await
            .get(&device)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Devices with at least one registered listener, in catalog order.
    pub async fn tracked_devices(&self) -> Vec<DeviceName> {
        let mut devices: Vec<_> = self.listeners.read().await.keys().copied().collect();
        devices.sort();
        devices
    }
}

/// Payload asking the gateway to report a device's state.
fn snapshot_request() -> Vec<u8> {
    json!({ "state": {} }).to_string().into_bytes()
}

fn same_listener(a: &Arc<dyn DeviceListener>, b: &Arc<dyn DeviceListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mqtt::{BrokerCall, InMemoryBroker};
    use crate::ports::BrokerError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Records every state it receives.
    struct RecordingListener {
        tag: &'static str,
        log: Arc<Mutex<Vec<(&'static str, DeviceName, Value)>>>,
    }

    #[async_trait]
    impl DeviceListener for RecordingListener {
        async fn on_state(&self, device: DeviceName, state: DeviceState) -> Result<(), DomainError> {
            let value = serde_json::to_value(&state).unwrap();
            self.log.lock().unwrap().push((self.tag, device, value));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "RecordingListener"
        }
    }

    struct FailingListener;

    #[async_trait]
    impl DeviceListener for FailingListener {
        async fn on_state(&self, _: DeviceName, _: DeviceState) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::ConnectionClosed, "gone"))
        }

        fn name(&self) -> &'static str {
            "FailingListener"
        }
    }

    struct PanickingListener;

    #[async_trait]
    impl DeviceListener for PanickingListener {
        async fn on_state(&self, _: DeviceName, _: DeviceState) -> Result<(), DomainError> {
            panic!("listener bug");
        }

        fn name(&self) -> &'static str {
            "PanickingListener"
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, DeviceName, Value)>>>;

    fn setup() -> (Arc<InMemoryBroker>, DeviceController, Log) {
        let broker = Arc::new(InMemoryBroker::new());
        let controller = DeviceController::new(broker.clone(), DeviceTopics::default());
        (broker, controller, Arc::new(Mutex::new(Vec::new())))
    }

    fn recording(tag: &'static str, log: &Log) -> Arc<dyn DeviceListener> {
        Arc::new(RecordingListener {
            tag,
            log: log.clone(),
        })
    }

    fn desk_lamp_report() -> BrokerMessage {
        BrokerMessage::new("nexus/desk_lamp", br#"{"state":"ON","brightness":128}"#.as_slice())
    }

    #[tokio::test]
    async fn subscribe_requests_snapshot_then_subscribes_topic() {
        let (broker, controller, log) = setup();

        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("a", &log))
            .await
            .unwrap();

        assert_eq!(
            broker.calls(),
            vec![
                BrokerCall::Publish {
                    topic: "nexus/desk_lamp/get".to_string(),
                    payload: br#"{"state":{}}"#.to_vec(),
                },
                BrokerCall::Subscribe("nexus/desk_lamp".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn second_listener_reuses_broker_subscription() {
        let (broker, controller, log) = setup();

        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("a", &log))
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("b", &log))
            .await
            .unwrap();

        assert_eq!(broker.subscribe_count("nexus/desk_lamp"), 1);
        assert_eq!(broker.publishes_to("nexus/desk_lamp/get").len(), 2);
        assert_eq!(controller.listener_count(DeviceName::DeskLamp).await, 2);
    }

    #[tokio::test]
    async fn dispatch_fans_out_in_registration_order() {
        let (_broker, controller, log) = setup();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("first", &log))
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("second", &log))
            .await
            .unwrap();

        let delivered = controller.dispatch(desk_lamp_report()).await;

        assert_eq!(delivered, 2);
        let log = log.lock().unwrap();
        let expected = json!({"state": "ON", "brightness": 128});
        assert_eq!(
            *log,
            vec![
                ("first", DeviceName::DeskLamp, expected.clone()),
                ("second", DeviceName::DeskLamp, expected),
            ]
        );
    }

    #[tokio::test]
    async fn unsubscribed_listener_no_longer_receives() {
        let (broker, controller, log) = setup();
        let first = recording("first", &log);
        controller
            .subscribe_to_device(DeviceName::DeskLamp, first.clone())
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("second", &log))
            .await
            .unwrap();

        controller
            .unsubscribe_from_device(DeviceName::DeskLamp, &first)
            .await
            .unwrap();
        controller.dispatch(desk_lamp_report()).await;

        let tags: Vec<_> = log.lock().unwrap().iter().map(|(tag, _, _)| *tag).collect();
        assert_eq!(tags, vec!["second"]);
        assert_eq!(broker.unsubscribe_count("nexus/desk_lamp"), 0);
    }

    #[tokio::test]
    async fn removing_last_listener_drops_entry_and_topic() {
        let (broker, controller, log) = setup();
        let only = recording("only", &log);
        controller
            .subscribe_to_device(DeviceName::DeskLamp, only.clone())
            .await
            .unwrap();

        controller
            .unsubscribe_from_device(DeviceName::DeskLamp, &only)
            .await
            .unwrap();

        assert!(controller.tracked_devices().await.is_empty());
        assert_eq!(broker.unsubscribe_count("nexus/desk_lamp"), 1);
        assert_eq!(controller.dispatch(desk_lamp_report()).await, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribing_unknown_listener_is_noop() {
        let (broker, controller, log) = setup();
        let stranger = recording("stranger", &log);

        controller
            .unsubscribe_from_device(DeviceName::DeskLamp, &stranger)
            .await
            .unwrap();

        assert!(broker.calls().is_empty());
    }

    #[tokio::test]
    async fn set_device_state_publishes_exact_body() {
        let (broker, controller, _log) = setup();
        let state = DeviceState::from_value(
            DeviceName::DeskLamp,
            json!({"state": "ON", "brightness": 128}),
        );

        controller
            .set_device_state(DeviceName::DeskLamp, &state)
            .await
            .unwrap();

        let published = broker.publishes_to("nexus/desk_lamp/set");
        assert_eq!(published.len(), 1);
        let body: Value = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(body, json!({"state": "ON", "brightness": 128}));
    }

    #[tokio::test]
    async fn set_device_state_rejects_mismatched_shape() {
        let (broker, controller, _log) = setup();
        let state = DeviceState::from_value(DeviceName::DeskLamp, json!({"state": "ON"}));

        let result = controller
            .set_device_state(DeviceName::LivingRoomFloorLamp, &state)
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::ValidationFailed);
        assert!(broker.calls().is_empty());
    }

    #[tokio::test]
    async fn broker_failure_propagates_from_set_device_state() {
        let (broker, controller, _log) = setup();
        broker.set_failing(true);
        let state = DeviceState::from_value(DeviceName::DeskLamp, json!({"state": "OFF"}));

        let result = controller.set_device_state(DeviceName::DeskLamp, &state).await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::BrokerUnavailable);
    }

    #[tokio::test]
    async fn failed_subscribe_registers_nothing() {
        let (broker, controller, log) = setup();
        broker.set_failing(true);

        let result = controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("a", &log))
            .await;

        assert!(result.is_err());
        assert_eq!(controller.listener_count(DeviceName::DeskLamp).await, 0);
    }

    #[tokio::test]
    async fn foreign_namespace_is_ignored() {
        let (_broker, controller, log) = setup();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("a", &log))
            .await
            .unwrap();

        let delivered = controller
            .dispatch(BrokerMessage::new(
                "zigbee2mqtt/desk_lamp",
                br#"{"state":"ON"}"#.as_slice(),
            ))
            .await;

        assert_eq!(delivered, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_without_affecting_other_devices() {
        let (_broker, controller, log) = setup();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("desk", &log))
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::LivingRoomFloorLamp, recording("floor", &log))
            .await
            .unwrap();

        let dropped = controller
            .dispatch(BrokerMessage::new("nexus/desk_lamp", b"{not json".as_slice()))
            .await;
        let delivered = controller
            .dispatch(BrokerMessage::new(
                "nexus/living_room_floor_lamp",
                br#"{"state":"OFF"}"#.as_slice(),
            ))
            .await;

        assert_eq!(dropped, 0);
        assert_eq!(delivered, 1);
        let tags: Vec<_> = log.lock().unwrap().iter().map(|(tag, _, _)| *tag).collect();
        assert_eq!(tags, vec!["floor"]);
    }

    #[tokio::test]
    async fn failing_and_panicking_listeners_do_not_block_others() {
        let (_broker, controller, log) = setup();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, Arc::new(FailingListener))
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, Arc::new(PanickingListener))
            .await
            .unwrap();
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("healthy", &log))
            .await
            .unwrap();

        let delivered = controller.dispatch(desk_lamp_report()).await;

        assert_eq!(delivered, 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_state_publishes_snapshot_request() {
        let (broker, controller, _log) = setup();

        controller
            .request_state(DeviceName::LivingRoomFloorLamp)
            .await
            .unwrap();

        assert_eq!(
            broker.publishes_to("nexus/living_room_floor_lamp/get"),
            vec![br#"{"state":{}}"#.to_vec()]
        );
    }

    #[tokio::test]
    async fn run_drains_inbox_until_closed() {
        let (_broker, controller, log) = setup();
        let controller = Arc::new(controller);
        controller
            .subscribe_to_device(DeviceName::DeskLamp, recording("a", &log))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(desk_lamp_report()).await.unwrap();
        tx.send(BrokerMessage::new("nexus/desk_lamp", br#"{"state":"OFF"}"#.as_slice()))
            .await
            .unwrap();
        drop(tx);

        controller.clone().run(rx).await;

        let states: Vec<_> = log.lock().unwrap().iter().map(|(_, _, v)| v["state"].clone()).collect();
        assert_eq!(states, vec![json!("ON"), json!("OFF")]);
    }

    #[tokio::test]
    async fn toggle_command_is_published_unchanged() {
        let (broker, controller, _log) = setup();
        let state = DeviceState::from_value(DeviceName::DeskLamp, json!({"state": "TOGGLE"}));

        controller
            .set_device_state(DeviceName::DeskLamp, &state)
            .await
            .unwrap();

        assert_eq!(
            broker.publishes_to("nexus/desk_lamp/set"),
            vec![br#"{"state":"TOGGLE"}"#.to_vec()]
        );
    }

    #[tokio::test]
    async fn unfamiliar_report_is_forwarded_verbatim() {
        let (_broker, controller, log) = setup();
        controller
            .subscribe_to_device(DeviceName::LivingRoomFloorLamp, recording("floor", &log))
            .await
            .unwrap();
        let report = json!({
            "state": "ON",
            "update": {"installed_version": -1, "latest_version": 16843, "state": "scheduled"}
        });

        let delivered = controller
            .dispatch(BrokerMessage::new(
                "nexus/living_room_floor_lamp",
                report.to_string().into_bytes(),
            ))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(log.lock().unwrap()[0].2, report);
    }

    #[tokio::test]
    async fn failed_topic_subscribe_rolls_back_and_allows_retry() {
        let (broker, controller, log) = setup();
        let listener = recording("a", &log);
        broker.fail_subscribes(true);

        let result = controller
            .subscribe_to_device(DeviceName::DeskLamp, listener.clone())
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::BrokerUnavailable);
        assert!(controller.tracked_devices().await.is_empty());

        broker.fail_subscribes(false);
        controller
            .subscribe_to_device(DeviceName::DeskLamp, listener)
            .await
            .unwrap();
        assert_eq!(broker.subscribe_count("nexus/desk_lamp"), 1);
    }

    /// Broker whose `get` publishes hang until released.
    struct StalledBroker {
        inner: InMemoryBroker,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl MessageBroker for StalledBroker {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
            if topic.ends_with("/get") {
                self.release.notified().await;
            }
            self.inner.publish(topic, payload).await
        }

        async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
            self.inner.subscribe(topic).await
        }

        async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
            self.inner.unsubscribe(topic).await
        }
    }

    #[tokio::test]
    async fn pending_broker_call_does_not_stall_dispatch() {
        let broker = Arc::new(StalledBroker {
            inner: InMemoryBroker::new(),
            release: tokio::sync::Notify::new(),
        });
        let controller = Arc::new(DeviceController::new(broker.clone(), DeviceTopics::default()));
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let pending = tokio::spawn({
            let controller = controller.clone();
            let listener = recording("floor", &log);
            async move {
                controller
                    .subscribe_to_device(DeviceName::LivingRoomFloorLamp, listener)
                    .await
            }
        });
        while controller.listener_count(DeviceName::LivingRoomFloorLamp).await == 0 {
            tokio::task::yield_now().await;
        }

        let delivered = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            controller.dispatch(BrokerMessage::new(
                "nexus/living_room_floor_lamp",
                br#"{"state":"ON"}"#.as_slice(),
            )),
        )
        .await
        .expect("dispatch waited on the broker");
        assert_eq!(delivered, 1);

        broker.release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(broker.inner.subscribe_count("nexus/living_room_floor_lamp"), 1);
    }
}
