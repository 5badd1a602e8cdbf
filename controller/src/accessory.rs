use anyhow::Context;
use boiler_common::{
    AccessoryConfig, DeviceTelemetry, EngineAction, HeatingMode, SwitchCommand, ThermostatEngine,
};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    bus::{CommandPublisher, Listener, TelemetryRouter},
    control_point::{CharacteristicPanel, Characteristics, ControlPoint},
    store::StateStore,
};

const INBOX_CAPACITY: usize = 32;

#[derive(Debug)]
pub enum AccessoryEvent {
    SensorTelemetry(Value),
    SwitchTelemetry(Value),
    SetTargetHeatingState {
        mode: HeatingMode,
        ack: oneshot::Sender<()>,
    },
    SetTargetTemperature {
        value: f32,
        ack: oneshot::Sender<()>,
    },
}

/// Handle used by the control point surface to talk to a running accessory.
#[derive(Clone)]
pub struct AccessoryHandle {
    name: String,
    inbox: mpsc::Sender<AccessoryEvent>,
    characteristics: watch::Receiver<Characteristics>,
}

impl AccessoryHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn characteristics(&self) -> Characteristics {
        self.characteristics.borrow().clone()
    }

    /// Resolves once the accessory stored the mode and ran its decision step.
    pub async fn set_target_heating_state(&self, mode: HeatingMode) -> anyhow::Result<()> {
        let (ack, done) = oneshot::channel();
        self.command(AccessoryEvent::SetTargetHeatingState { mode, ack }, done)
            .await
    }

    pub async fn set_target_temperature(&self, value: f32) -> anyhow::Result<()> {
        let (ack, done) = oneshot::channel();
        self.command(AccessoryEvent::SetTargetTemperature { value, ack }, done)
            .await
    }

    async fn command(
        &self,
        event: AccessoryEvent,
        done: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        self.inbox
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("accessory {} is not running", self.name))?;
        done.await
            .with_context(|| format!("accessory {} dropped the command", self.name))
    }
}

/// One thermostat accessory. All triggers (telemetry, commands and the poll
/// timer) are funnelled through a single inbox and handled one at a time, so
/// the engine needs no locking.
pub struct Accessory {
    config: AccessoryConfig,
    engine: ThermostatEngine,
    store: StateStore,
    publisher: CommandPublisher,
    panel: CharacteristicPanel,
    inbox: mpsc::Receiver<AccessoryEvent>,
}

/// Restores the accessory's state, wires its bus listeners and starts its task.
pub async fn spawn(
    config: AccessoryConfig,
    router: &TelemetryRouter,
    publisher: CommandPublisher,
) -> AccessoryHandle {
    let store = StateStore::new(config.state_path.clone());
    let snapshot = store.load().await.unwrap_or_else(|err| {
        warn!("[{}] failed to load snapshot, using defaults: {err:#}", config.name);
        None
    });
    let cached_sensor = router.cache().get(&config.sensor_id).await;
    let engine = ThermostatEngine::restore(snapshot, cached_sensor.as_ref());

    let (panel, characteristics) = CharacteristicPanel::new();
    for action in engine.display_all() {
        panel.render(action);
    }

    let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
    router
        .subscribe_local(
            &config.sensor_id,
            forward_to(sender.clone(), AccessoryEvent::SensorTelemetry),
        )
        .await;
    router
        .subscribe_local(
            &config.switch_id,
            forward_to(sender.clone(), AccessoryEvent::SwitchTelemetry),
        )
        .await;

    info!(
        "[{}] sensor {} / switch {}, polling every {:?}, state {:?}",
        config.name,
        config.sensor_id,
        config.switch_id,
        config.poll_interval(),
        engine.state()
    );

    let handle = AccessoryHandle {
        name: config.name.clone(),
        inbox: sender,
        characteristics,
    };

    let accessory = Accessory {
        config,
        engine,
        store,
        publisher,
        panel,
        inbox,
    };
    tokio::spawn(accessory.run());

    handle
}

/// Bus listeners must not block the bus, so a full inbox drops the payload.
fn forward_to(
    sender: mpsc::Sender<AccessoryEvent>,
    wrap: fn(Value) -> AccessoryEvent,
) -> Listener {
    Box::new(move |payload: &Value| {
        sender
            .try_send(wrap(payload.clone()))
            .map_err(|err| anyhow::anyhow!("accessory inbox unavailable: {err}"))
    })
}

impl Accessory {
    async fn run(mut self) {
        let period = self.config.poll_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let actions = self.engine.decide();
                    self.apply(actions).await;
                }
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }

        debug!("[{}] accessory task stopped", self.config.name);
    }

    async fn handle(&mut self, event: AccessoryEvent) {
        match event {
            AccessoryEvent::SensorTelemetry(payload) => {
                let actions = self
                    .engine
                    .on_sensor_telemetry(&DeviceTelemetry::from_json(&payload));
                self.apply(actions).await;
            }
            AccessoryEvent::SwitchTelemetry(payload) => {
                let actions = self
                    .engine
                    .on_switch_telemetry(&DeviceTelemetry::from_json(&payload));
                self.apply(actions).await;
            }
            AccessoryEvent::SetTargetHeatingState { mode, ack } => {
                info!("[{}] target heating state -> {}", self.config.name, mode.as_str());
                let actions = self.engine.set_target_mode(mode);
                self.apply(actions).await;
                let _ = ack.send(());
            }
            AccessoryEvent::SetTargetTemperature { value, ack } => {
                info!("[{}] target temperature -> {value}", self.config.name);
                let actions = self.engine.set_target_temperature(value);
                self.apply(actions).await;
                let _ = ack.send(());
            }
        }
    }

    async fn apply(&mut self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::SwitchRelay(state) => {
                    info!(
                        "[{}] switching {} {}",
                        self.config.name,
                        self.config.switch_id,
                        state.as_str()
                    );
                    if let Err(err) = self
                        .publisher
                        .publish(&self.config.switch_id, &SwitchCommand { state })
                        .await
                    {
                        warn!("[{}] relay command not sent: {err:#}", self.config.name);
                    }
                }
                EngineAction::Persist => {
                    if let Err(err) = self.store.save(self.engine.state()).await {
                        warn!(
                            "[{}] failed to persist state, continuing in memory: {err:#}",
                            self.config.name
                        );
                    }
                }
                display => self.panel.render(display),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{path::Path, time::Duration};

    use boiler_common::{HeatingMode, ThermostatState};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;

    use crate::{bus::OutboundMessage, cache::DeviceCache};

    fn config(state_path: &Path) -> AccessoryConfig {
        AccessoryConfig {
            name: "Thermostat".to_string(),
            sensor_id: "hall_sensor".to_string(),
            switch_id: "boiler".to_string(),
            poll_interval_secs: Some(60),
            state_path: state_path.to_path_buf(),
        }
    }

    async fn start(
        router: &TelemetryRouter,
        state_path: &Path,
    ) -> (AccessoryHandle, Receiver<OutboundMessage>) {
        let (publisher, outbound) = CommandPublisher::channel(router.namespace());
        let handle = spawn(config(state_path), router, publisher).await;
        (handle, outbound)
    }

    fn payload(message: &OutboundMessage) -> Value {
        serde_json::from_slice(&message.payload).unwrap()
    }

    #[tokio::test]
    async fn command_switches_relay_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("thermostat.data");
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (handle, mut outbound) = start(&router, &state_path).await;

        handle
            .set_target_heating_state(HeatingMode::Heat)
            .await
            .unwrap();

        let message = outbound.recv().await.unwrap();
        assert_eq!(message.topic, "zigbee2mqtt/boiler/set");
        assert_eq!(payload(&message), json!({ "state": "ON" }));
        assert!(outbound.try_recv().is_err());

        let characteristics = handle.characteristics();
        assert_eq!(characteristics.current_heating_cooling_state, HeatingMode::Heat);
        assert_eq!(characteristics.target_heating_cooling_state, HeatingMode::Heat);

        let saved = StateStore::new(state_path).load().await.unwrap().unwrap();
        assert_eq!(saved.target_mode, HeatingMode::Heat);
        assert_eq!(saved.current_mode, HeatingMode::Heat);
    }

    #[tokio::test]
    async fn restores_snapshot_and_seeds_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("thermostat.data");
        let snapshot = ThermostatState {
            target_temperature: 23.0,
            target_mode: HeatingMode::Off,
            current_mode: HeatingMode::Off,
            temperature: Some(21.0),
            relative_humidity: None,
        };
        StateStore::new(state_path.clone())
            .save(&snapshot)
            .await
            .unwrap();
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (restored, _outbound) = start(&router, &state_path).await;

        assert_eq!(restored.characteristics().target_temperature, 23.0);
        assert_eq!(restored.characteristics().current_temperature, Some(21.0));

        let mut devices = std::collections::HashMap::new();
        devices.insert(
            "hall_sensor".to_string(),
            json!({ "temperature": 17.5, "humidity": 60 }),
        );
        let seeded_router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::new(devices));
        let (seeded, _outbound) = start(&seeded_router, &dir.path().join("fresh.data")).await;

        let characteristics = seeded.characteristics();
        assert_eq!(characteristics.current_temperature, Some(17.5));
        assert_eq!(characteristics.current_relative_humidity, Some(60.0));
        assert_eq!(characteristics.target_temperature, 20.5);
        assert_eq!(characteristics.target_heating_cooling_state, HeatingMode::Auto);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_reading_acted_on_at_next_poll() {
        let dir = tempfile::tempdir().unwrap();
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (handle, mut outbound) = start(&router, &dir.path().join("thermostat.data")).await;

        let delivered = router
            .dispatch("zigbee2mqtt/hall_sensor", br#"{"temperature":18.0}"#)
            .await;
        assert_eq!(delivered, 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(outbound.try_recv().is_err());
        assert_eq!(handle.characteristics().current_temperature, Some(18.0));

        let message = tokio::time::timeout(Duration::from_secs(60), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload(&message), json!({ "state": "ON" }));

        router
            .dispatch("zigbee2mqtt/hall_sensor", br#"{"temperature":21.0}"#)
            .await;
        let message = tokio::time::timeout(Duration::from_secs(61), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload(&message), json!({ "state": "OFF" }));
        assert_eq!(
            handle.characteristics().current_heating_cooling_state,
            HeatingMode::Off
        );
    }

    #[tokio::test]
    async fn switch_report_is_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (handle, mut outbound) = start(&router, &dir.path().join("thermostat.data")).await;
        handle.set_target_heating_state(HeatingMode::Off).await.unwrap();

        router
            .dispatch("zigbee2mqtt/boiler", br#"{"state":"ON"}"#)
            .await;
        // A command round-trip guarantees the telemetry ahead of it was handled.
        handle.set_target_temperature(20.5).await.unwrap();

        let message = outbound.recv().await.unwrap();
        assert_eq!(payload(&message), json!({ "state": "OFF" }));
        assert_eq!(
            handle.characteristics().current_heating_cooling_state,
            HeatingMode::Off
        );
    }

    #[tokio::test]
    async fn unwritable_snapshot_does_not_stop_control() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (handle, mut outbound) = start(&router, &blocker.join("thermostat.data")).await;

        handle
            .set_target_heating_state(HeatingMode::Heat)
            .await
            .unwrap();

        assert_eq!(payload(&outbound.recv().await.unwrap()), json!({ "state": "ON" }));
        assert_eq!(
            handle.characteristics().current_heating_cooling_state,
            HeatingMode::Heat
        );
    }

    #[tokio::test]
    async fn huge_poll_interval_keeps_accessory_running() {
        let dir = tempfile::tempdir().unwrap();
        let router = TelemetryRouter::new("zigbee2mqtt", DeviceCache::default());
        let (publisher, mut outbound) = CommandPublisher::channel(router.namespace());
        let handle = spawn(
            AccessoryConfig {
                poll_interval_secs: Some(i64::MAX),
                ..config(&dir.path().join("thermostat.data"))
            },
            &router,
            publisher,
        )
        .await;

        handle
            .set_target_heating_state(HeatingMode::Heat)
            .await
            .unwrap();

        assert_eq!(payload(&outbound.recv().await.unwrap()), json!({ "state": "ON" }));
    }
}
