use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::topics::DEFAULT_NAMESPACE;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_STATE_PATH: &str = "/opt/etc/homebridge/thermostat.data";
pub const DEFAULT_DEVICE_CACHE_PATH: &str = "/opt/etc/zigbee2mqtt/data/state.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "boiler-controller".to_string(),
            username: String::new(),
            password: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccessoryConfig {
    pub name: String,
    #[serde(alias = "sensor")]
    pub sensor_id: String,
    #[serde(alias = "switch")]
    pub switch_id: String,
    #[serde(alias = "pollInterval")]
    pub poll_interval_secs: Option<i64>,
    pub state_path: PathBuf,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name: "Thermostat".to_string(),
            sensor_id: String::new(),
            switch_id: String::new(),
            poll_interval_secs: None,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

impl AccessoryConfig {
    /// Effective control-loop latency bound for readings that arrive between
    /// commands. Unset or non-positive values fall back to 60 seconds and
    /// anything above a day is capped to a day.
    pub fn poll_interval(&self) -> Duration {
        let secs = match self.poll_interval_secs {
            Some(secs) if secs > 0 => (secs as u64).min(MAX_POLL_INTERVAL_SECS),
            _ => DEFAULT_POLL_INTERVAL_SECS,
        };
        Duration::from_secs(secs)
    }

    pub fn is_complete(&self) -> bool {
        !self.sensor_id.trim().is_empty() && !self.switch_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub bus: BusConfig,
    pub accessories: Vec<AccessoryConfig>,
    pub device_cache_path: PathBuf,
    pub http_port: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            accessories: Vec::new(),
            device_cache_path: PathBuf::from(DEFAULT_DEVICE_CACHE_PATH),
            http_port: 8080,
        }
    }
}

impl RuntimeConfig {
    /// Drops accessories missing a sensor or switch id and makes names unique.
    /// Returns the names of dropped accessories.
    pub fn sanitize(&mut self) -> Vec<String> {
        let namespace = self.bus.namespace.trim().trim_matches('/');
        self.bus.namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            namespace.to_string()
        };

        let mut dropped = Vec::new();
        self.accessories.retain(|accessory| {
            if accessory.is_complete() {
                true
            } else {
                dropped.push(accessory.name.clone());
                false
            }
        });

        let mut seen = HashSet::new();
        let mut paths = HashSet::new();
        for accessory in &mut self.accessories {
            let base = if accessory.name.trim().is_empty() {
                "Thermostat".to_string()
            } else {
                accessory.name.trim().to_string()
            };
            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.clone()) {
                name = format!("{base} {suffix}");
                suffix += 1;
            }
            accessory.name = name;

            // A snapshot file belongs to exactly one accessory.
            if !paths.insert(accessory.state_path.clone()) {
                let path = sibling_state_path(&accessory.state_path, &accessory.name, &paths);
                paths.insert(path.clone());
                accessory.state_path = path;
            }
        }

        dropped
    }
}

/// `<dir>/thermostat.data` becomes `<dir>/thermostat-<name>.data`, with a
/// numeric suffix if that is taken too.
fn sibling_state_path(path: &Path, name: &str, taken: &HashSet<PathBuf>) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("thermostat");
    let extension = path.extension().and_then(|extension| extension.to_str());
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let file_name = |suffix: Option<usize>| {
        let mut file_name = format!("{stem}-{slug}");
        if let Some(suffix) = suffix {
            file_name.push_str(&format!("-{suffix}"));
        }
        if let Some(extension) = extension {
            file_name.push('.');
            file_name.push_str(extension);
        }
        path.with_file_name(file_name)
    };

    let mut candidate = file_name(None);
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = file_name(Some(suffix));
        suffix += 1;
    }
    candidate
}
