use boiler_common::{EngineAction, HeatingMode, ThermostatState};
use serde::Serialize;
use tokio::sync::watch;

/// Display side of a thermostat surface rendered to users.
pub trait ControlPoint {
    fn display_current_temperature(&self, value: Option<f32>);
    fn display_current_humidity(&self, value: Option<f32>);
    fn display_current_heating_state(&self, mode: HeatingMode);
    fn display_target_heating_state(&self, mode: HeatingMode);
    fn display_target_temperature(&self, value: f32);

    /// Applies a display action. Relay and persistence actions are not for
    /// the control point and are ignored.
    fn render(&self, action: EngineAction) {
        match action {
            EngineAction::ShowCurrentTemperature(value) => self.display_current_temperature(value),
            EngineAction::ShowCurrentHumidity(value) => self.display_current_humidity(value),
            EngineAction::ShowCurrentHeatingState(mode) => self.display_current_heating_state(mode),
            EngineAction::ShowTargetHeatingState(mode) => self.display_target_heating_state(mode),
            EngineAction::ShowTargetTemperature(value) => self.display_target_temperature(value),
            EngineAction::SwitchRelay(_) | EngineAction::Persist => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristics {
    pub current_temperature: Option<f32>,
    pub current_relative_humidity: Option<f32>,
    pub current_heating_cooling_state: HeatingMode,
    pub target_heating_cooling_state: HeatingMode,
    pub target_temperature: f32,
    /// Always 0 (Celsius).
    pub temperature_display_units: u8,
}

impl Default for Characteristics {
    fn default() -> Self {
        let state = ThermostatState::default();
        Self {
            current_temperature: state.temperature,
            current_relative_humidity: state.relative_humidity,
            current_heating_cooling_state: state.current_mode,
            target_heating_cooling_state: state.target_mode,
            target_temperature: state.target_temperature,
            temperature_display_units: 0,
        }
    }
}

/// Control point backed by a watch channel so readers always see the latest
/// characteristic values.
pub struct CharacteristicPanel {
    sender: watch::Sender<Characteristics>,
}

impl CharacteristicPanel {
    pub fn new() -> (Self, watch::Receiver<Characteristics>) {
        let (sender, receiver) = watch::channel(Characteristics::default());
        (Self { sender }, receiver)
    }
}

impl ControlPoint for CharacteristicPanel {
    fn display_current_temperature(&self, value: Option<f32>) {
        self.sender
            .send_modify(|characteristics| characteristics.current_temperature = value);
    }

    fn display_current_humidity(&self, value: Option<f32>) {
        self.sender
            .send_modify(|characteristics| characteristics.current_relative_humidity = value);
    }

    fn display_current_heating_state(&self, mode: HeatingMode) {
        self.sender
            .send_modify(|characteristics| characteristics.current_heating_cooling_state = mode);
    }

    fn display_target_heating_state(&self, mode: HeatingMode) {
        self.sender
            .send_modify(|characteristics| characteristics.target_heating_cooling_state = mode);
    }

    fn display_target_temperature(&self, value: f32) {
        self.sender
            .send_modify(|characteristics| characteristics.target_temperature = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boiler_common::SwitchState;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_updates_matching_characteristic() {
        let (panel, receiver) = CharacteristicPanel::new();

        panel.render(EngineAction::ShowCurrentTemperature(Some(18.5)));
        panel.render(EngineAction::ShowCurrentHumidity(Some(55.0)));
        panel.render(EngineAction::ShowCurrentHeatingState(HeatingMode::Heat));
        panel.render(EngineAction::ShowTargetHeatingState(HeatingMode::Heat));
        panel.render(EngineAction::ShowTargetTemperature(22.5));
        panel.render(EngineAction::SwitchRelay(SwitchState::Off));
        panel.render(EngineAction::Persist);

        let expected = Characteristics {
            current_temperature: Some(18.5),
            current_relative_humidity: Some(55.0),
            current_heating_cooling_state: HeatingMode::Heat,
            target_heating_cooling_state: HeatingMode::Heat,
            target_temperature: 22.5,
            temperature_display_units: 0,
        };
        assert_eq!(*receiver.borrow(), expected);
    }

    #[test]
    fn serializes_modes_as_ordinals() {
        let body = serde_json::to_value(Characteristics::default()).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "currentTemperature": null,
                "currentRelativeHumidity": null,
                "currentHeatingCoolingState": 0,
                "targetHeatingCoolingState": 3,
                "targetTemperature": 20.5,
                "temperatureDisplayUnits": 0,
            })
        );
    }
}
