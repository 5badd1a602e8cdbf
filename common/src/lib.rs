pub mod config;
pub mod control;
pub mod error;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{AccessoryConfig, BusConfig, RuntimeConfig};
pub use control::{validate_target_heating_state, validate_target_temperature};
pub use error::ControlError;
pub use thermostat::{EngineAction, ThermostatEngine, ThermostatState};
pub use topics::*;
pub use types::{DeviceTelemetry, HeatingMode, SwitchCommand, SwitchState};
