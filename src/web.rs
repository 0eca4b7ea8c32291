//! Axum-based HTTP API carrying the wallbox service calls
//!
//! With the `openapi` feature the routes are documented through utoipa and
//! a Swagger UI is served at `/docs`.

use crate::config::Config;
use crate::driver::{DriverHandle, DriverSnapshot};
use crate::entities::{self, Entity};
use crate::error::GaroError;
use crate::services::{self, SetCurrentLimitRequest, SetModeRequest};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub driver: DriverHandle,
    /// Where `PUT /api/config` persists accepted configurations
    pub config_path: Option<PathBuf>,
}

/// Error response `{"error": "<message>"}` with a status derived from the error kind
#[derive(Debug)]
pub struct ApiError(pub GaroError);

impl From<GaroError> for ApiError {
    fn from(err: GaroError) -> Self {
        ApiError(err)
    }
}

pub fn status_code_for(err: &GaroError) -> StatusCode {
    match err {
        GaroError::Validation { .. } | GaroError::Config { .. } => StatusCode::BAD_REQUEST,
        GaroError::NotFound { .. } => StatusCode::NOT_FOUND,
        GaroError::Unavailable { .. } | GaroError::Network { .. } | GaroError::Timeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GaroError::Device { .. } | GaroError::Http { .. } | GaroError::Serialization { .. } => {
            StatusCode::BAD_GATEWAY
        }
        GaroError::Io { .. } | GaroError::Generic { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_code_for(&self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Decode a service body; shape errors are reported as validation errors
fn service_body<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError(GaroError::validation("request".to_string(), e.to_string())))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/status", responses(
    (status = 200, description = "Latest driver snapshot", body = DriverSnapshot)
)))]
async fn status(State(state): State<AppState>) -> Json<DriverSnapshot> {
    Json(state.driver.snapshot().as_ref().clone())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entities", responses(
    (status = 200, description = "All sensor entities", body = [Entity])
)))]
async fn list_entities(State(state): State<AppState>) -> Json<Vec<Entity>> {
    Json(entities::build(&state.driver.snapshot()))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entities/{entity_id}",
    params(("entity_id" = String, Path, description = "Entity id, e.g. sensor.garage_charger")),
    responses((status = 200, body = Entity), (status = 404))
))]
async fn get_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Entity>, ApiError> {
    entities::find(&state.driver.snapshot(), &entity_id)
        .map(Json)
        .ok_or_else(|| ApiError(GaroError::not_found(format!("unknown entity {}", entity_id))))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/services/garo_wallbox/set_mode",
    request_body = SetModeRequest,
    responses((status = 200), (status = 400), (status = 404), (status = 503))
))]
async fn set_mode(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body: SetModeRequest = service_body(body)?;
    let mode = services::set_mode(&state.driver, &body).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "entity_id": body.entity_id,
        "mode": mode.state_name(),
    })))
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/services/garo_wallbox/set_current_limit",
    request_body = SetCurrentLimitRequest,
    responses((status = 200), (status = 400), (status = 404), (status = 503))
))]
async fn set_current_limit(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body: SetCurrentLimitRequest = service_body(body)?;
    let limit = services::set_current_limit(&state.driver, &body).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "entity_id": body.entity_id,
        "limit": limit,
    })))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
async fn get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.driver.config().as_ref().clone())
}

#[cfg_attr(feature = "openapi", utoipa::path(put, path = "/api/config", responses(
    (status = 200), (status = 400)
)))]
async fn put_config(
    State(state): State<AppState>,
    Json(new_cfg_value): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_cfg: Config = serde_json::from_value(new_cfg_value)
        .map_err(|e| GaroError::validation("config".to_string(), e.to_string()))?;
    new_cfg.validate()?;
    state.driver.update_config(new_cfg.clone()).await?;

    let mut saved = false;
    if let Some(path) = &state.config_path {
        match new_cfg.save_to_file(path) {
            Ok(()) => saved = true,
            Err(e) => crate::logging::get_logger("web").warn(&format!(
                "Configuration applied but not saved to {}: {}",
                path.display(),
                e
            )),
        }
    }
    Ok(Json(serde_json::json!({ "ok": true, "saved": saved })))
}

#[cfg(feature = "openapi")]
#[utoipa::path(get, path = "/api/config/schema", responses((status = 200)))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error":"schema"})))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses(
    (status = 200, description = "Server-sent status and command events")
)))]
async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.driver.subscribe_events();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|msg| {
        let payload = msg.ok()?;
        let envelope: serde_json::Value = serde_json::from_str(&payload).ok()?;
        let kind = envelope["type"].as_str().unwrap_or("status").to_string();
        Some(Ok::<Event, std::convert::Infallible>(
            Event::default().event(kind).data(envelope["data"].to_string()),
        ))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, status, list_entities, get_entity, set_mode, set_current_limit,
        get_config, put_config, get_config_schema, events,
    ),
    components(schemas(SetModeRequest, SetCurrentLimitRequest, Entity, DriverSnapshot)),
    tags((name = "garo-wallbox", description = "Garo Wallbox bridge API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/entities", get(list_entities))
        .route("/api/entities/{entity_id}", get(get_entity))
        .route(
            &format!("/api/services/{}/{}", services::DOMAIN, services::SERVICE_SET_MODE),
            post(set_mode),
        )
        .route(
            &format!(
                "/api/services/{}/{}",
                services::DOMAIN,
                services::SERVICE_SET_CURRENT_LIMIT
            ),
            post(set_current_limit),
        )
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/events", get(events));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(get_config_schema))
            .merge(
                utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()),
            )
    };

    let router = router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    #[cfg(feature = "compression")]
    let router = router.layer(tower_http::compression::CompressionLayer::new());

    router
}

/// Resolve the bind address, falling back to localhost for unparsable hosts
pub fn bind_address(host: &str, port: u16) -> (SocketAddr, bool) {
    match host.parse::<IpAddr>() {
        Ok(ip) => (SocketAddr::new(ip, port), true),
        Err(_) => (([127, 0, 0, 1], port).into(), false),
    }
}

pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let (addr, parsed_ok) = bind_address(host, port);
    if !parsed_ok {
        logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api, docs /docs)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
