use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("unknown heating mode ordinal {0}")]
    UnknownHeatingMode(u8),
    #[error("target heating state {0} is not one of 0 (off), 1 (heat), 3 (auto)")]
    InvalidTargetHeatingState(u8),
    #[error("target temperature {0} is outside 15.0..=30.0")]
    TargetTemperatureOutOfRange(f32),
}
