//! HTTP REST API for the camera registry and the fused world state.
//!
//! Registry operations block (stopping a camera joins its threads), so every
//! handler runs them on the blocking pool.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use camfuse::frame::{CameraId, Placement};
use camfuse::fusion::{WorldSnapshot, WorldState};
use camfuse::registry::{CameraRegistry, CameraState, FreeDevice, RegistryError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::{Any, CorsLayer};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<CameraRegistry>>,
    pub world: WorldState,
}

/// JSON response for the camera listing
#[derive(Serialize)]
pub struct CameraListResponse {
    pub cameras: Vec<CameraState>,
}

/// JSON response for plain-message outcomes
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Query params for activation
#[derive(Deserialize)]
pub struct ActivateQuery {
    pub id: u32,
    pub active: bool,
}

/// JSON request for camera creation and update
#[derive(Deserialize)]
pub struct CameraRequest {
    pub id: u32,
    pub rate_hz: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
}

impl CameraRequest {
    fn placement(&self) -> Placement {
        Placement {
            x: self.x,
            y: self.y,
            angle: self.angle,
        }
    }
}

/// JSON response for free-device probing
#[derive(Serialize)]
pub struct FreeDevicesResponse {
    pub devices: Vec<FreeDevice>,
}

type ApiError = (StatusCode, String);

fn registry_error(err: &RegistryError) -> ApiError {
    let status = match err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::AlreadyRegistered(_) => StatusCode::CONFLICT,
        RegistryError::Config(_) => StatusCode::BAD_REQUEST,
        RegistryError::Device(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

/// Runs one registry operation on the blocking pool.
async fn with_registry<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut CameraRegistry) -> camfuse::registry::Result<T> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    match tokio::task::spawn_blocking(move || {
        let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut guard)
    })
    .await
    {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(registry_error(&err)),
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "registry task failed".to_string(),
        )),
    }
}

/// GET /cameras - List all cameras
async fn list_cameras(State(state): State<AppState>) -> Result<Json<CameraListResponse>, ApiError> {
    let cameras = with_registry(&state, |registry| Ok(registry.list())).await?;
    Ok(Json(CameraListResponse { cameras }))
}

/// PUT /cameras/activate?id=&active= - Start or stop a camera
async fn activate_camera(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = CameraId(query.id);
    let active = query.active;
    with_registry(&state, move |registry| {
        if active {
            registry.start(id)
        } else {
            registry.stop(id)
        }
    })
    .await?;
    Ok(Json(MessageResponse {
        message: format!(
            "camera {} turned {}",
            id,
            if active { "on" } else { "off" }
        ),
    }))
}

/// POST /cameras - Create a camera
async fn create_camera(
    State(state): State<AppState>,
    Json(request): Json<CameraRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let id = CameraId(request.id);
    let placement = request.placement();
    let rate_hz = request.rate_hz;
    with_registry(&state, move |registry| registry.add(id, placement, rate_hz)).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("camera {id} created"),
        }),
    ))
}

/// PUT /cameras - Update pose and rate of a camera
async fn update_camera(
    State(state): State<AppState>,
    Json(request): Json<CameraRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = CameraId(request.id);
    let placement = request.placement();
    let rate_hz = request.rate_hz;
    with_registry(&state, move |registry| {
        registry.update(id, placement, rate_hz)
    })
    .await?;
    Ok(Json(MessageResponse {
        message: format!("camera {id} updated"),
    }))
}

/// GET /cameras/free - Unused device indices with native resolutions
async fn free_devices(
    State(state): State<AppState>,
) -> Result<Json<FreeDevicesResponse>, ApiError> {
    let devices = with_registry(&state, |registry| Ok(registry.free_devices())).await?;
    Ok(Json(FreeDevicesResponse { devices }))
}

/// GET /world - Latest fused world estimate
async fn world(State(state): State<AppState>) -> Json<WorldSnapshot> {
    Json(state.world.snapshot())
}

/// GET /health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/cameras",
            get(list_cameras).post(create_camera).put(update_camera),
        )
        .route("/cameras/activate", put(activate_camera))
        .route("/cameras/free", get(free_devices))
        .route("/world", get(world))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server until the shutdown signal fires.
pub async fn run_http_server(
    state: AppState,
    port: u16,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    log::info!("HTTP server listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_request_accepts_missing_angle() {
        let request: CameraRequest =
            serde_json::from_str(r#"{"id": 1, "rate_hz": 30.0, "x": 2.0, "y": 3.0}"#).unwrap();
        assert_eq!(request.angle, 0.0);
        assert_eq!(request.placement().x, 2.0);
    }

    #[test]
    fn registry_errors_map_to_http_statuses() {
        assert_eq!(
            registry_error(&RegistryError::NotFound(CameraId(1))).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            registry_error(&RegistryError::AlreadyRegistered(CameraId(1))).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            registry_error(&RegistryError::Config("bad rate".into())).0,
            StatusCode::BAD_REQUEST
        );
    }
}
