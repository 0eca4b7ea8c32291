use super::status::{DeviceInfo, MeterStatus, WallboxStatus};
use super::types::{ApiGeneration, MeterPath, Mode};
use crate::config::{ControlsConfig, DeviceConfig};
use crate::error::{GaroError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

const HEADER_JSON: &str = "application/json; charset=utf-8";

/// Device-facing operations the driver needs
#[async_trait::async_trait]
pub trait WallboxApi: Send + Sync {
    async fn fetch_info(&mut self) -> Result<DeviceInfo>;
    async fn fetch_status(
        &mut self,
        info: &DeviceInfo,
        prev: Option<&WallboxStatus>,
    ) -> Result<WallboxStatus>;
    async fn fetch_meter(&mut self, path: MeterPath) -> Result<MeterStatus>;
    async fn set_mode(&mut self, mode: Mode) -> Result<()>;
    async fn set_current_limit(&mut self, limit: u32) -> Result<()>;
    fn host(&self) -> &str;
    fn generation(&self) -> ApiGeneration;
}

/// Base URLs of both firmware generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub current: String,
    pub legacy: String,
}

impl Endpoints {
    pub fn for_host(host: &str) -> Self {
        Self {
            current: format!("http://{}:8080/servlet/rest/chargebox", host),
            legacy: format!("http://{}:2222/rest/chargebox", host),
        }
    }
}

/// HTTP client for the wallbox REST API
pub struct GaroClient {
    http: reqwest::Client,
    host: String,
    endpoints: Endpoints,
    generation: ApiGeneration,
    max_retries: u32,
    retry_delay: Duration,
    logger: StructuredLogger,
}

impl GaroClient {
    pub fn new(device: &DeviceConfig, controls: &ControlsConfig) -> Result<Self> {
        Self::with_endpoints(
            &device.host,
            Endpoints::for_host(&device.host),
            Duration::from_millis(device.request_timeout_ms),
            controls.max_retries,
            Duration::from_millis(controls.retry_delay_ms),
        )
    }

    pub fn with_endpoints(
        host: &str,
        endpoints: Endpoints,
        timeout: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("garo-wallbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GaroError::http(format!("Failed to build HTTP client: {}", e)))?;
        let logger = get_logger_with_context(LogContext::new("client").with_host(host));
        Ok(Self {
            http,
            host: host.to_string(),
            endpoints,
            generation: ApiGeneration::Current,
            max_retries: max_retries.max(1),
            retry_delay,
            logger,
        })
    }

    /// URL for a chargebox action, with a cache-busting tick for reads
    pub fn url(&self, action: &str, add_tick: bool) -> String {
        let base = match self.generation {
            ApiGeneration::Current => &self.endpoints.current,
            ApiGeneration::Legacy => &self.endpoints.legacy,
        };
        if add_tick {
            format!("{}/{}?_={}", base, action, current_millis())
        } else {
            format!("{}/{}", base, action)
        }
    }

    /// Retry transport failures up to `max_retries` attempts
    async fn with_retry<F, Fut, T>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_unreachable() => {
                    attempts += 1;
                    if attempts >= self.max_retries {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("{} attempt {} failed: {}", what, attempts, e));
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_raw(&self, action: &str) -> Result<reqwest::Response> {
        let url = self.url(action, true);
        let (http, url) = (&self.http, url.as_str());
        self.with_retry(action, || async move {
            http.get(url).send().await.map_err(GaroError::from)
        })
        .await
    }

    /// GET with the one-way switch to the legacy endpoint on a non-200 answer
    async fn get_json_with_fallback(&mut self, action: &str) -> Result<Value> {
        let mut response = self.get_raw(action).await?;
        if response.status() != reqwest::StatusCode::OK
            && self.generation == ApiGeneration::Current
        {
            self.generation = ApiGeneration::Legacy;
            self.logger.info(&format!(
                "Switching to pre v1.3.1 endpoint after HTTP {} on {}",
                response.status(),
                action
            ));
            response = self.get_raw(action).await?;
        }
        Self::json_body(action, response).await
    }

    async fn get_json(&self, action: &str) -> Result<Value> {
        let response = self.get_raw(action).await?;
        Self::json_body(action, response).await
    }

    async fn json_body(action: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(GaroError::device(format!(
                "GET {} answered HTTP {}",
                action, status
            )));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn post(&self, action: &str, body: Option<String>) -> Result<()> {
        let url = self.url(action, false);
        let (http, url, body) = (&self.http, url.as_str(), body.as_deref());
        let response = self
            .with_retry(action, || async move {
                let mut request = http.post(url).header(CONTENT_TYPE, HEADER_JSON);
                if let Some(body) = body {
                    request = request.body(body.to_string());
                }
                request.send().await.map_err(GaroError::from)
            })
            .await?;

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                self.logger
                    .debug(&format!("POST {} response body unreadable: {}", action, e));
                String::new()
            }
        };
        if !status.is_success() {
            return Err(GaroError::device(format!(
                "POST {} rejected with HTTP {}: {}",
                action,
                status,
                text.trim()
            )));
        }
        self.logger
            .debug(&format!("POST {} accepted: {}", action, text.trim()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl WallboxApi for GaroClient {
    async fn fetch_info(&mut self) -> Result<DeviceInfo> {
        let doc = self.get_json_with_fallback("config").await?;
        let info = DeviceInfo::from_json(&doc)?;
        self.logger.info(&format!(
            "Wallbox {} (product {}) with {} charger(s), meter: {}",
            info.serial,
            info.product_id,
            info.nof_chargers,
            info.meter_path.map(|p| p.as_str()).unwrap_or("none")
        ));
        Ok(info)
    }

    async fn fetch_status(
        &mut self,
        info: &DeviceInfo,
        prev: Option<&WallboxStatus>,
    ) -> Result<WallboxStatus> {
        let doc = self.get_json_with_fallback("status").await?;
        WallboxStatus::from_json(&doc, info, prev)
    }

    async fn fetch_meter(&mut self, path: MeterPath) -> Result<MeterStatus> {
        let doc = self.get_json(&path.action()).await?;
        let meter = MeterStatus::from_json(&doc)?;
        self.logger.trace(&format!("Meter reading: {:?}", meter));
        Ok(meter)
    }

    async fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.logger.info(&format!("Setting mode to {}", mode.wire_value()));
        match self.generation {
            ApiGeneration::Current => {
                self.post(&format!("mode/{}", mode.wire_value()), None)
                    .await
            }
            ApiGeneration::Legacy => {
                self.post("mode", Some(mode.wire_value().to_string()))
                    .await
            }
        }
    }

    async fn set_current_limit(&mut self, limit: u32) -> Result<()> {
        self.logger
            .info(&format!("Setting current limit to {} A", limit));
        let mut doc = self.get_json("config").await?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| GaroError::device("config document is not an object"))?;
        obj.insert(
            "reducedCurrentIntervals".to_string(),
            reduced_current_intervals(limit),
        );
        let body = serde_json::to_string(&doc)?;
        self.post("config", Some(body)).await
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn generation(&self) -> ApiGeneration {
        self.generation
    }
}

/// Single all-week interval carrying the limit
pub fn reduced_current_intervals(limit: u32) -> Value {
    json!([{
        "chargeLimit": limit.to_string(),
        "schemaId": 1,
        "start": "00:00:00",
        "stop": "24:00:00",
        "weekday": 8
    }])
}

fn current_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GaroClient {
        GaroClient::with_endpoints(
            "10.0.0.7",
            Endpoints::for_host("10.0.0.7"),
            Duration::from_secs(1),
            1,
            Duration::from_millis(1),
        )
        .unwrap()
    }

    #[test]
    fn urls_per_generation() {
        let mut c = client();
        assert_eq!(
            c.url("mode/ALWAYS_ON", false),
            "http://10.0.0.7:8080/servlet/rest/chargebox/mode/ALWAYS_ON"
        );
        let ticked = c.url("status", true);
        assert!(ticked.starts_with("http://10.0.0.7:8080/servlet/rest/chargebox/status?_="));

        c.generation = ApiGeneration::Legacy;
        assert_eq!(
            c.url("config", false),
            "http://10.0.0.7:2222/rest/chargebox/config"
        );
    }

    #[test]
    fn interval_payload() {
        let v = reduced_current_intervals(13);
        assert_eq!(v[0]["chargeLimit"], "13");
        assert_eq!(v[0]["weekday"], 8);
        assert_eq!(v[0]["stop"], "24:00:00");
    }
}
