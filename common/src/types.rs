use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;

/// Heating/cooling state as rendered by the control point. The ordinals are
/// part of the wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HeatingMode {
    Off = 0,
    Heat = 1,
    Cool = 2,
    Auto = 3,
}

impl HeatingMode {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }
}

impl From<HeatingMode> for u8 {
    fn from(mode: HeatingMode) -> Self {
        mode.ordinal()
    }
}

impl TryFrom<u8> for HeatingMode {
    type Error = ControlError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Heat),
            2 => Ok(Self::Cool),
            3 => Ok(Self::Auto),
            other => Err(ControlError::UnknownHeatingMode(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    /// Anything other than an exact `"ON"` report counts as off.
    pub fn from_report(state: Option<&str>) -> Self {
        match state {
            Some("ON") => Self::On,
            _ => Self::Off,
        }
    }

    pub fn heating_mode(self) -> HeatingMode {
        match self {
            Self::On => HeatingMode::Heat,
            Self::Off => HeatingMode::Off,
        }
    }
}

impl From<HeatingMode> for SwitchState {
    fn from(mode: HeatingMode) -> Self {
        if mode == HeatingMode::Heat {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Outbound relay command body, `{"state": "ON"|"OFF"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCommand {
    pub state: SwitchState,
}

/// Fields of a decoded telemetry payload this system cares about. Sensors and
/// switches share one payload shape; which fields matter depends on which
/// configured id the payload arrived for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceTelemetry {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub state: Option<String>,
}

impl DeviceTelemetry {
    /// Lenient extraction: missing or mistyped fields read as absent.
    pub fn from_json(value: &Value) -> Self {
        Self {
            temperature: value
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|v| v as f32),
            humidity: value
                .get("humidity")
                .and_then(Value::as_f64)
                .map(|v| v as f32),
            state: value
                .get("state")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn switch_state(&self) -> SwitchState {
        SwitchState::from_report(self.state.as_deref())
    }
}
