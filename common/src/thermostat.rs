use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{DeviceTelemetry, HeatingMode, SwitchState};

pub const DEFAULT_TARGET_TEMPERATURE: f32 = 20.5;
pub const MIN_TARGET_TEMPERATURE: f32 = 15.0;
pub const MAX_TARGET_TEMPERATURE: f32 = 30.0;

/// Durable control state of one thermostat accessory. This is also the
/// on-disk snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThermostatState {
    #[serde(deserialize_with = "number_or_string")]
    pub target_temperature: f32,
    pub target_mode: HeatingMode,
    #[serde(alias = "mode")]
    pub current_mode: HeatingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<f32>,
}

impl Default for ThermostatState {
    fn default() -> Self {
        Self {
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            target_mode: HeatingMode::Auto,
            current_mode: HeatingMode::Off,
            temperature: None,
            relative_humidity: None,
        }
    }
}

impl ThermostatState {
    pub fn sanitize(&mut self) {
        self.target_temperature = if self.target_temperature.is_finite() {
            round_to_tenth(
                self.target_temperature
                    .clamp(MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE),
            )
        } else {
            DEFAULT_TARGET_TEMPERATURE
        };

        if self.target_mode == HeatingMode::Cool {
            self.target_mode = HeatingMode::Off;
        }

        // The relay only knows on and off.
        if !matches!(self.current_mode, HeatingMode::Off | HeatingMode::Heat) {
            self.current_mode = HeatingMode::Off;
        }
    }
}

/// Older snapshots stored the target temperature as a one-decimal string.
fn number_or_string<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

pub fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineAction {
    SwitchRelay(SwitchState),
    Persist,
    ShowCurrentTemperature(Option<f32>),
    ShowCurrentHumidity(Option<f32>),
    ShowCurrentHeatingState(HeatingMode),
    ShowTargetHeatingState(HeatingMode),
    ShowTargetTemperature(f32),
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    state: ThermostatState,
}

impl ThermostatEngine {
    pub fn new(mut state: ThermostatState) -> Self {
        state.sanitize();
        Self { state }
    }

    /// A persisted snapshot wins outright. Without one, start from defaults
    /// and seed the room readings from the last cached sensor payload.
    pub fn restore(snapshot: Option<ThermostatState>, cached_sensor: Option<&Value>) -> Self {
        match snapshot {
            Some(state) => Self::new(state),
            None => {
                let reading = cached_sensor
                    .map(DeviceTelemetry::from_json)
                    .unwrap_or_default();
                Self::new(ThermostatState {
                    temperature: reading.temperature,
                    relative_humidity: reading.humidity,
                    ..ThermostatState::default()
                })
            }
        }
    }

    pub fn state(&self) -> &ThermostatState {
        &self.state
    }

    pub fn target_temperature(&self) -> f32 {
        self.state.target_temperature
    }

    pub fn target_mode(&self) -> HeatingMode {
        self.state.target_mode
    }

    pub fn current_mode(&self) -> HeatingMode {
        self.state.current_mode
    }

    pub fn temperature(&self) -> Option<f32> {
        self.state.temperature
    }

    pub fn relative_humidity(&self) -> Option<f32> {
        self.state.relative_humidity
    }

    /// Everything the control point shows, for the first render after startup.
    pub fn display_all(&self) -> Vec<EngineAction> {
        vec![
            EngineAction::ShowCurrentTemperature(self.state.temperature),
            EngineAction::ShowCurrentHumidity(self.state.relative_humidity),
            EngineAction::ShowCurrentHeatingState(self.state.current_mode),
            EngineAction::ShowTargetHeatingState(self.state.target_mode),
            EngineAction::ShowTargetTemperature(self.state.target_temperature),
        ]
    }

    /// Readings are overwritten as reported, so a payload without a field
    /// clears it. No decision is taken here; the next poll or command does.
    pub fn on_sensor_telemetry(&mut self, telemetry: &DeviceTelemetry) -> Vec<EngineAction> {
        self.state.temperature = telemetry.temperature;
        self.state.relative_humidity = telemetry.humidity;
        vec![
            EngineAction::ShowCurrentTemperature(self.state.temperature),
            EngineAction::ShowCurrentHumidity(self.state.relative_humidity),
        ]
    }

    /// The switch's own report is authoritative for `current_mode`, even when
    /// it disagrees with the last command.
    pub fn on_switch_telemetry(&mut self, telemetry: &DeviceTelemetry) -> Vec<EngineAction> {
        self.state.current_mode = telemetry.switch_state().heating_mode();
        vec![EngineAction::ShowCurrentHeatingState(self.state.current_mode)]
    }

    pub fn set_target_mode(&mut self, mode: HeatingMode) -> Vec<EngineAction> {
        self.state.target_mode = mode;
        let mut actions = vec![
            EngineAction::Persist,
            EngineAction::ShowTargetHeatingState(mode),
        ];
        actions.append(&mut self.decide());
        actions
    }

    pub fn set_target_temperature(&mut self, value: f32) -> Vec<EngineAction> {
        self.state.target_temperature = round_to_tenth(value);
        let mut actions = vec![
            EngineAction::Persist,
            EngineAction::ShowTargetTemperature(self.state.target_temperature),
        ];
        actions.append(&mut self.decide());
        actions
    }

    /// `None` when in auto mode without a room temperature to compare.
    pub fn desired_mode(&self) -> Option<HeatingMode> {
        match self.state.target_mode {
            HeatingMode::Auto => {
                let temperature = self.state.temperature?;
                if temperature < self.state.target_temperature {
                    Some(HeatingMode::Heat)
                } else {
                    Some(HeatingMode::Off)
                }
            }
            mode => Some(mode),
        }
    }

    pub fn decide(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if let Some(desired) = self.desired_mode() {
            if desired != self.state.current_mode {
                self.state.current_mode = desired;
                actions.push(EngineAction::SwitchRelay(SwitchState::from(desired)));
                actions.push(EngineAction::Persist);
            }
        }

        actions.push(EngineAction::ShowCurrentHeatingState(
            self.state.current_mode,
        ));
        actions
    }
}
