pub const DEFAULT_NAMESPACE: &str = "zigbee2mqtt";

pub fn wildcard_topic(namespace: &str) -> String {
    format!("{namespace}/+")
}

pub fn command_topic(namespace: &str, device_id: &str) -> String {
    format!("{namespace}/{device_id}/set")
}

/// Device id for a telemetry topic: the single non-empty level after
/// `<namespace>/`.
pub fn device_id_from_topic<'a>(namespace: &str, topic: &'a str) -> Option<&'a str> {
    let device_id = topic.strip_prefix(namespace)?.strip_prefix('/')?;
    if device_id.is_empty() || device_id.contains('/') {
        return None;
    }
    Some(device_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_device_id_suffix() {
        assert_eq!(
            device_id_from_topic("zigbee2mqtt", "zigbee2mqtt/living_room"),
            Some("living_room")
        );
        assert_eq!(device_id_from_topic("zigbee2mqtt", "zigbee2mqtt/"), None);
        assert_eq!(
            device_id_from_topic("zigbee2mqtt", "zigbee2mqtt/boiler/set"),
            None
        );
        assert_eq!(device_id_from_topic("zigbee2mqtt", "zigbee2mqttx/a"), None);
        assert_eq!(device_id_from_topic("zigbee2mqtt", "other/a"), None);
    }

    #[test]
    fn builds_bus_topics() {
        assert_eq!(wildcard_topic("zigbee2mqtt"), "zigbee2mqtt/+");
        assert_eq!(command_topic("zigbee2mqtt", "boiler"), "zigbee2mqtt/boiler/set");
    }
}
