use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use boiler_common::ThermostatState;

/// Snapshot file holding one accessory's `ThermostatState`, rewritten whole on
/// every save.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> anyhow::Result<Option<ThermostatState>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                let state = serde_json::from_slice::<ThermostatState>(&raw).with_context(|| {
                    format!("malformed thermostat snapshot {}", self.path.display())
                })?;
                Ok(Some(state))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    pub async fn save(&self, state: &ThermostatState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec(state)?;
        tokio::fs::write(&self.path, payload)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
