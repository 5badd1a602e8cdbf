use crate::{
    error::ControlError,
    thermostat::{MAX_TARGET_TEMPERATURE, MIN_TARGET_TEMPERATURE},
    types::HeatingMode,
};

pub const VALID_TARGET_HEATING_STATES: [u8; 3] = [0, 1, 3];

/// Host-side check for the target heating state characteristic. Cool is a
/// valid `HeatingMode` but there is no cooling device to target.
pub fn validate_target_heating_state(value: u8) -> Result<HeatingMode, ControlError> {
    if !VALID_TARGET_HEATING_STATES.contains(&value) {
        return Err(ControlError::InvalidTargetHeatingState(value));
    }
    HeatingMode::try_from(value)
}

pub fn validate_target_temperature(value: f32) -> Result<f32, ControlError> {
    if value.is_finite() && (MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(&value) {
        Ok(value)
    } else {
        Err(ControlError::TargetTemperatureOutOfRange(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cool_and_unknown_modes() {
        assert_eq!(validate_target_heating_state(0), Ok(HeatingMode::Off));
        assert_eq!(validate_target_heating_state(1), Ok(HeatingMode::Heat));
        assert_eq!(validate_target_heating_state(3), Ok(HeatingMode::Auto));
        assert_eq!(
            validate_target_heating_state(2),
            Err(ControlError::InvalidTargetHeatingState(2))
        );
        assert_eq!(
            validate_target_heating_state(9),
            Err(ControlError::InvalidTargetHeatingState(9))
        );
    }

    #[test]
    fn target_temperature_bounds_are_inclusive() {
        assert!(validate_target_temperature(15.0).is_ok());
        assert!(validate_target_temperature(30.0).is_ok());
        assert!(validate_target_temperature(14.9).is_err());
        assert!(validate_target_temperature(30.1).is_err());
        assert!(validate_target_temperature(f32::NAN).is_err());
    }
}
