use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use boiler_common::{command_topic, device_id_from_topic, wildcard_topic, BusConfig};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::DeviceCache;

const MAX_MQTT_PAYLOAD_BYTES: usize = 16 * 1024;
const OUTBOUND_CAPACITY: usize = 64;

pub type Listener = Box<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Decodes inbound telemetry, records it in the device cache and fans it out
/// to the listeners registered for the originating device.
pub struct TelemetryRouter {
    namespace: String,
    cache: DeviceCache,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl TelemetryRouter {
    pub fn new(namespace: impl Into<String>, cache: DeviceCache) -> Self {
        Self {
            namespace: namespace.into(),
            cache,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub async fn subscribe_local(&self, device_id: &str, listener: Listener) {
        self.listeners
            .lock()
            .await
            .entry(device_id.to_string())
            .or_default()
            .push(listener);
    }

    /// Returns how many listeners accepted the payload. Undecodable messages
    /// are dropped here and never reach a listener.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let Some(device_id) = device_id_from_topic(&self.namespace, topic) else {
            debug!("ignoring message on unrelated topic {topic}");
            return 0;
        };

        if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
            warn!(
                "dropping oversized MQTT payload on topic {} ({} bytes)",
                topic,
                payload.len()
            );
            return 0;
        }

        let decoded = match serde_json::from_slice::<Value>(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("dropping undecodable payload from {device_id}: {err}");
                return 0;
            }
        };
        debug!("telemetry from {device_id}: {decoded}");

        self.cache.update(device_id, decoded.clone()).await;

        let listeners = self.listeners.lock().await;
        let Some(registered) = listeners.get(device_id) else {
            return 0;
        };

        let mut delivered = 0;
        for listener in registered {
            match listener(&decoded) {
                Ok(()) => delivered += 1,
                Err(err) => warn!("listener for {device_id} rejected telemetry: {err:#}"),
            }
        }
        delivered
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Cloneable handle for device commands. Messages are queued for the bus
/// connection; there is no acknowledgement or retry.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    namespace: String,
    sender: mpsc::Sender<OutboundMessage>,
}

impl CommandPublisher {
    pub fn channel(namespace: impl Into<String>) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_CAPACITY);
        (
            Self {
                namespace: namespace.into(),
                sender,
            },
            receiver,
        )
    }

    pub async fn publish<T: Serialize>(&self, device_id: &str, payload: &T) -> anyhow::Result<()> {
        let message = OutboundMessage {
            topic: command_topic(&self.namespace, device_id),
            payload: serde_json::to_vec(payload).context("failed to encode command")?,
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("bus connection is gone"))
    }
}

/// Starts the MQTT connection. The wildcard subscription is (re)issued on
/// every ConnAck so it survives the client's own reconnects.
pub fn connect(
    config: &BusConfig,
    router: Arc<TelemetryRouter>,
    outbound: mpsc::Receiver<OutboundMessage>,
) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }

    let (client, eventloop) = AsyncClient::new(options, 64);

    info!("connecting to MQTT broker {}:{}", config.host, config.port);
    spawn_event_loop(client.clone(), eventloop, router);
    spawn_outbound_loop(client, outbound);
}

fn spawn_event_loop(client: AsyncClient, mut eventloop: EventLoop, router: Arc<TelemetryRouter>) {
    let topic = wildcard_topic(router.namespace());
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    router.dispatch(&message.topic, &message.payload).await;
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected, subscribing to {topic}");
                    // Awaiting here would stall the loop that drains the request queue.
                    if let Err(err) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                        warn!("failed to subscribe to {topic}: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_outbound_loop(client: AsyncClient, mut outbound: mpsc::Receiver<OutboundMessage>) {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            debug!("publishing to {}", message.topic);
            if let Err(err) = client
                .publish(message.topic.as_str(), QoS::AtMostOnce, false, message.payload)
                .await
            {
                warn!("publish to {} failed: {err}", message.topic);
            }
        }
    });
}
