use std::{collections::HashMap, io::ErrorKind, path::Path, sync::Arc};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Last decoded payload per device id, shared by the bus router (writer) and
/// accessories bootstrapping their readings (readers).
#[derive(Clone, Default)]
pub struct DeviceCache {
    devices: Arc<RwLock<HashMap<String, Value>>>,
}

impl DeviceCache {
    pub fn new(devices: HashMap<String, Value>) -> Self {
        Self {
            devices: Arc::new(RwLock::new(devices)),
        }
    }

    /// Seeds from a zigbee2mqtt `state.json`. Any problem with the file leaves
    /// the cache empty; live telemetry fills it in.
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no device state snapshot at {}", path.display());
                return Self::default();
            }
            Err(err) => {
                warn!("failed to read device state snapshot {}: {err}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_slice::<HashMap<String, Value>>(&raw) {
            Ok(devices) => {
                info!("seeded device cache from {}", path.display());
                Self::new(devices)
            }
            Err(err) => {
                warn!("ignoring malformed device state snapshot {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub async fn get(&self, device_id: &str) -> Option<Value> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn update(&self, device_id: &str, payload: Value) {
        self.devices
            .write()
            .await
            .insert(device_id.to_string(), payload);
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }
}
