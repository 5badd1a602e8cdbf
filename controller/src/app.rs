use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use boiler_common::{AccessoryConfig, RuntimeConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    accessory,
    api::{self, ApiState},
    bus::{self, CommandPublisher, TelemetryRouter},
    cache::DeviceCache,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("THERMOSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./thermostat.json"));
    let mut config = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    for name in config.sanitize() {
        warn!("skipping accessory {name}: sensor and switch ids are both required");
    }

    let cache = DeviceCache::load(&config.device_cache_path).await;
    info!("device cache holds {} device(s)", cache.len().await);
    let router = Arc::new(TelemetryRouter::new(config.bus.namespace.clone(), cache));
    let (publisher, outbound) = CommandPublisher::channel(config.bus.namespace.clone());

    let mut handles = Vec::with_capacity(config.accessories.len());
    for accessory_config in &config.accessories {
        let handle = accessory::spawn(accessory_config.clone(), &router, publisher.clone()).await;
        handles.push(handle);
    }
    if handles.is_empty() {
        warn!("no thermostat accessories configured, only caching telemetry");
    }

    // Listeners are registered before connecting so no early telemetry is missed.
    bus::connect(&config.bus, router, outbound);

    let app = api::router(ApiState::new(handles));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("malformed config {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("MQTT_HOST") {
        config.bus.host = host;
    }
    if let Some(port) = var("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.bus.port = port;
    }
    if let Some(user) = var("MQTT_USER") {
        config.bus.username = user;
    }
    if let Some(pass) = var("MQTT_PASS") {
        config.bus.password = pass;
    }
    if let Some(client_id) = var("MQTT_CLIENT_ID") {
        config.bus.client_id = client_id;
    }
    if let Some(namespace) = var("MQTT_NAMESPACE") {
        config.bus.namespace = namespace;
    }
    if let Some(port) = var("CONTROLLER_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.http_port = port;
    }
    if let Some(path) = var("DEVICE_CACHE_PATH") {
        config.device_cache_path = PathBuf::from(path);
    }

    if config.accessories.is_empty() {
        if let (Some(sensor_id), Some(switch_id)) =
            (var("THERMOSTAT_SENSOR"), var("THERMOSTAT_SWITCH"))
        {
            config.accessories.push(AccessoryConfig {
                sensor_id,
                switch_id,
                ..AccessoryConfig::default()
            });
        }
    }
}
