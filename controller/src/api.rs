use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use boiler_common::{validate_target_heating_state, validate_target_temperature};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{accessory::AccessoryHandle, control_point::Characteristics};

#[derive(Clone)]
pub struct ApiState {
    accessories: Arc<Vec<AccessoryHandle>>,
}

impl ApiState {
    pub fn new(accessories: Vec<AccessoryHandle>) -> Self {
        Self {
            accessories: Arc::new(accessories),
        }
    }

    fn find(&self, name: &str) -> Option<&AccessoryHandle> {
        self.accessories
            .iter()
            .find(|accessory| accessory.name() == name)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct AccessoryView {
    name: String,
    #[serde(flatten)]
    characteristics: Characteristics,
}

#[derive(Debug, Deserialize)]
struct HeatingStateUpdate {
    value: u8,
}

#[derive(Debug, Deserialize)]
struct TemperatureUpdate {
    value: f32,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/accessories", get(handle_list_accessories))
        .route("/api/accessories/{name}", get(handle_get_accessory))
        .route(
            "/api/accessories/{name}/target-heating-state",
            put(handle_set_target_heating_state),
        )
        .route(
            "/api/accessories/{name}/target-temperature",
            put(handle_set_target_temperature),
        )
        .with_state(state)
}

async fn handle_list_accessories(State(state): State<ApiState>) -> impl IntoResponse {
    let views: Vec<_> = state.accessories.iter().map(view).collect();
    Json(views)
}

async fn handle_get_accessory(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match state.find(&name) {
        Some(accessory) => Json(view(accessory)).into_response(),
        None => unknown_accessory(&name),
    }
}

async fn handle_set_target_heating_state(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<HeatingStateUpdate>,
) -> axum::response::Response {
    let Some(accessory) = state.find(&name) else {
        return unknown_accessory(&name);
    };
    let mode = match validate_target_heating_state(update.value) {
        Ok(mode) => mode,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = accessory.set_target_heating_state(mode).await {
        warn!("target heating state update failed: {err:#}");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "accessory unavailable");
    }
    Json(view(accessory)).into_response()
}

async fn handle_set_target_temperature(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<TemperatureUpdate>,
) -> axum::response::Response {
    let Some(accessory) = state.find(&name) else {
        return unknown_accessory(&name);
    };
    let value = match validate_target_temperature(update.value) {
        Ok(value) => value,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = accessory.set_target_temperature(value).await {
        warn!("target temperature update failed: {err:#}");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "accessory unavailable");
    }
    Json(view(accessory)).into_response()
}

fn view(accessory: &AccessoryHandle) -> AccessoryView {
    AccessoryView {
        name: accessory.name().to_string(),
        characteristics: accessory.characteristics(),
    }
}

fn unknown_accessory(name: &str) -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, &format!("no accessory named {name}"))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
