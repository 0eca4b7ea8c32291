use axum::body::Body;
use axum::http::{Request, StatusCode};
use garo_wallbox::config::Config;
use garo_wallbox::driver::{ApiFactory, DriverHandle, GaroDriver};
use garo_wallbox::error::{GaroError, Result};
use garo_wallbox::garo::{
    ApiGeneration, DeviceInfo, MeterPath, MeterStatus, Mode, WallboxApi, WallboxStatus,
};
use garo_wallbox::web::{AppState, build_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct DeviceLog {
    writes: Vec<String>,
    offline: bool,
}

struct FakeWallbox {
    log: Arc<Mutex<DeviceLog>>,
    mode: Mode,
}

#[async_trait::async_trait]
impl WallboxApi for FakeWallbox {
    async fn fetch_info(&mut self) -> Result<DeviceInfo> {
        if self.log.lock().unwrap().offline {
            return Err(GaroError::network("connection refused"));
        }
        DeviceInfo::from_json(&json!({
            "serialNumber": "5550001",
            "productId": 7,
            "maxChargeCurrent": 20,
            "slaveList": [{}]
        }))
    }

    async fn fetch_status(
        &mut self,
        info: &DeviceInfo,
        prev: Option<&WallboxStatus>,
    ) -> Result<WallboxStatus> {
        WallboxStatus::from_json(
            &json!({
                "mode": self.mode.wire_value(),
                "currentTemperature": 22,
                "currentLimit": 20,
                "connector": "CONNECTED",
                "nrOfPhases": 3,
                "currentChargingCurrent": 0,
                "currentChargingPower": 0,
                "accEnergy": 1500
            }),
            info,
            prev,
        )
    }

    async fn fetch_meter(&mut self, _path: MeterPath) -> Result<MeterStatus> {
        Err(GaroError::device("no meter"))
    }

    async fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .writes
            .push(format!("mode={}", mode.wire_value()));
        self.mode = mode;
        Ok(())
    }

    async fn set_current_limit(&mut self, limit: u32) -> Result<()> {
        self.log.lock().unwrap().writes.push(format!("limit={}", limit));
        Ok(())
    }

    fn host(&self) -> &str {
        "10.0.0.20"
    }

    fn generation(&self) -> ApiGeneration {
        ApiGeneration::Current
    }
}

async fn start(name: Option<&str>, offline: bool) -> (DriverHandle, Arc<Mutex<DeviceLog>>) {
    let log = Arc::new(Mutex::new(DeviceLog {
        offline,
        ..Default::default()
    }));
    let factory_log = log.clone();
    let factory: ApiFactory = Arc::new(move |_cfg: &Config| {
        Ok(Box::new(FakeWallbox {
            log: factory_log.clone(),
            mode: Mode::Schema,
        }) as Box<dyn WallboxApi>)
    });

    let mut config = Config::default();
    config.device.host = "10.0.0.20".to_string();
    config.device.name = name.map(str::to_string);
    let (mut driver, handle) = GaroDriver::with_factory(config, factory).unwrap();
    tokio::spawn(async move { driver.run().await });
    // Setup is complete once an explicit refresh returns
    let _ = handle.refresh().await;
    (handle, log)
}

async fn call(handle: &DriverHandle, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let router = build_router(AppState {
        driver: handle.clone(),
        config_path: None,
    });
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_ok() {
    let (handle, _) = start(None, false).await;
    let router = build_router(AppState {
        driver: handle,
        config_path: None,
    });
    let response = router
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn garage_charger_accepts_service_calls() {
    let (handle, log) = start(Some("Garage Charger"), false).await;

    let (status, entity) = call(&handle, "GET", "/api/entities/sensor.garage_charger", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entity["state"], "SCHEMA");
    assert_eq!(entity["unique_id"], "garo_5550001-sensor");

    let (status, body) = call(
        &handle,
        "POST",
        "/api/services/garo_wallbox/set_mode",
        Some(json!({"entity_id": "sensor.garage_charger", "mode": "On"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["mode"], "ON");

    let (status, _) = call(
        &handle,
        "POST",
        "/api/services/garo_wallbox/set_current_limit",
        Some(json!({"entity_id": "sensor.garage_charger", "limit": 13})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(log.lock().unwrap().writes, vec!["mode=ALWAYS_ON", "limit=13"]);

    // The write refreshed the status immediately
    let (_, entity) = call(&handle, "GET", "/api/entities/sensor.garage_charger", None).await;
    assert_eq!(entity["state"], "ON");
}

#[tokio::test]
async fn invalid_mode_is_rejected_without_contacting_device() {
    let (handle, log) = start(Some("Garage Charger"), false).await;
    for mode in ["Auto", "", "ALWAYS", "1"] {
        let (status, body) = call(
            &handle,
            "POST",
            "/api/services/garo_wallbox/set_mode",
            Some(json!({"entity_id": "sensor.garage_charger", "mode": mode})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "mode {mode:?}");
        assert!(body["error"].as_str().unwrap().contains("mode"));
    }
    assert!(log.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn malformed_service_bodies_are_bad_requests() {
    let (handle, log) = start(Some("Garage Charger"), false).await;
    let cases = [
        ("set_mode", json!({"entity_id": "sensor.garage_charger", "mode": 1})),
        ("set_mode", json!({"entity_id": "sensor.garage_charger", "mode": null})),
        ("set_mode", json!({"entity_id": "sensor.garage_charger"})),
        ("set_current_limit", json!({"entity_id": "sensor.garage_charger"})),
        ("set_current_limit", json!({"limit": 10})),
    ];
    for (service, body) in cases {
        let uri = format!("/api/services/garo_wallbox/{service}");
        let (status, reply) = call(&handle, "POST", &uri, Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{service} {body}");
        assert!(reply["error"].is_string(), "{service} {body}: {reply}");
    }
    assert!(log.lock().unwrap().writes.is_empty());
}

#[tokio::test]
async fn out_of_range_limits_are_rejected() {
    let (handle, log) = start(Some("Garage Charger"), false).await;
    // Device maximum is 20 A, configured minimum 6 A
    for limit in [json!(5), json!(21), json!(-3), json!(12.5), json!("many")] {
        let (status, _) = call(
            &handle,
            "POST",
            "/api/services/garo_wallbox/set_current_limit",
            Some(json!({"entity_id": "sensor.garage_charger", "limit": limit})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit {limit}");
    }
    assert!(log.lock().unwrap().writes.is_empty());

    let (status, _) = call(
        &handle,
        "POST",
        "/api/services/garo_wallbox/set_current_limit",
        Some(json!({"entity_id": "sensor.garage_charger", "limit": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_entities_are_not_found() {
    let (handle, log) = start(Some("Garage Charger"), false).await;
    let (status, _) = call(
        &handle,
        "POST",
        "/api/services/garo_wallbox/set_mode",
        Some(json!({"entity_id": "sensor.garage_charger_status", "mode": "Off"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(log.lock().unwrap().writes.is_empty());

    let (status, body) = call(&handle, "GET", "/api/entities/sensor.nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn entity_listing_and_status() {
    let (handle, _) = start(None, false).await;
    let (status, entities) = call(&handle, "GET", "/api/entities", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = entities
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["entity_id"].as_str())
        .collect();
    assert!(ids.contains(&"sensor.garo_wallbox_product_7_10_0_0_20"));
    assert!(ids.contains(&"sensor.garo_wallbox_product_7_10_0_0_20_temperature"));

    let (status, snap) = call(&handle, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snap["available"], true);
    assert_eq!(snap["device_id"], "garo_5550001");
}

#[tokio::test]
async fn unreachable_device_returns_service_unavailable() {
    let (handle, log) = start(Some("Garage Charger"), true).await;
    let (status, body) = call(
        &handle,
        "POST",
        "/api/services/garo_wallbox/set_mode",
        Some(json!({"entity_id": "sensor.garage_charger", "mode": "Off"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{body}");
    assert!(log.lock().unwrap().writes.is_empty());

    let (_, snap) = call(&handle, "GET", "/api/status", None).await;
    assert_eq!(snap["driver_state"], "Initializing");
    assert_eq!(snap["available"], false);
}

#[tokio::test]
async fn config_updates_are_validated_and_applied() {
    let (handle, _) = start(Some("Garage Charger"), false).await;

    let (_, mut cfg) = call(&handle, "GET", "/api/config", None).await;
    cfg["device"]["host"] = json!("");
    let (status, _) = call(&handle, "PUT", "/api/config", Some(cfg.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    cfg["device"]["host"] = json!("10.0.0.20");
    cfg["device"]["name"] = json!("Carport");
    cfg["poll_interval_ms"] = json!(15000);
    let (status, body) = call(&handle, "PUT", "/api/config", Some(cfg)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["saved"], false);

    let (_, cfg) = call(&handle, "GET", "/api/config", None).await;
    assert_eq!(cfg["poll_interval_ms"], 15000);
    let (status, _) = call(&handle, "GET", "/api/entities/sensor.carport", None).await;
    assert_eq!(status, StatusCode::OK);
}
