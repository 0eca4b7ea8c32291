//! `garo_wallbox.set_mode` and `garo_wallbox.set_current_limit`
//!
//! Parameters are validated before anything is sent to the driver; a call
//! that fails validation never reaches the wallbox.

use crate::driver::{DriverHandle, DriverSnapshot};
use crate::entities::main_entity_id;
use crate::error::{GaroError, Result};
use crate::garo::Mode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DOMAIN: &str = "garo_wallbox";
pub const SERVICE_SET_MODE: &str = "set_mode";
pub const SERVICE_SET_CURRENT_LIMIT: &str = "set_current_limit";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SetModeRequest {
    pub entity_id: String,
    /// `On`, `Off` or `Schema`
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SetCurrentLimitRequest {
    pub entity_id: String,
    /// Amperes; an integer or an integer string
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub limit: Value,
}

/// Inclusive current limit range for the device in `snapshot`
pub fn current_limit_bounds(snapshot: &DriverSnapshot, min: u32, configured_max: u32) -> (u32, u32) {
    let max = snapshot
        .info
        .as_ref()
        .and_then(|i| i.max_current)
        .filter(|m| *m > 0)
        .unwrap_or(configured_max);
    (min, max)
}

/// Parse a service `limit` value as a whole number of Amperes
pub fn parse_limit(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        GaroError::validation(
            "limit".to_string(),
            format!("{} is not an integer number of Amperes", value),
        )
    })
}

/// The entity must be the wallbox's main sensor
fn ensure_main_entity(snapshot: &DriverSnapshot, entity_id: &str) -> Result<()> {
    let Some(name) = snapshot.device_name.as_deref() else {
        return Err(GaroError::unavailable(format!(
            "wallbox at {} is not set up yet",
            snapshot.host
        )));
    };
    let expected = main_entity_id(name);
    if entity_id.trim() != expected {
        return Err(GaroError::not_found(format!(
            "entity {} does not accept {} services",
            entity_id, DOMAIN
        )));
    }
    Ok(())
}

pub async fn set_mode(handle: &DriverHandle, request: &SetModeRequest) -> Result<Mode> {
    let mode: Mode = request.mode.parse()?;
    ensure_main_entity(&handle.snapshot(), &request.entity_id)?;
    handle.set_mode(mode).await?;
    Ok(mode)
}

pub async fn set_current_limit(
    handle: &DriverHandle,
    request: &SetCurrentLimitRequest,
) -> Result<u32> {
    let snapshot = handle.snapshot();
    let config = handle.config();
    let limit = parse_limit(&request.limit)?;
    let (min, max) = current_limit_bounds(
        &snapshot,
        config.controls.min_current_limit,
        config.controls.max_current_limit,
    );
    if limit < i64::from(min) || limit > i64::from(max) {
        return Err(GaroError::validation(
            "limit".to_string(),
            format!("{} A is outside {}..={} A", limit, min, max),
        ));
    }
    ensure_main_entity(&snapshot, &request.entity_id)?;
    let limit = u32::try_from(limit)
        .map_err(|_| GaroError::validation("limit", "out of range"))?;
    handle.set_current_limit(limit).await?;
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::garo::DeviceInfo;
    use serde_json::json;

    #[test]
    fn limits_parse_integers_only() {
        assert_eq!(parse_limit(&json!(16)).unwrap(), 16);
        assert_eq!(parse_limit(&json!("10")).unwrap(), 10);
        assert!(parse_limit(&json!(10.5)).is_err());
        assert!(parse_limit(&json!("ten")).is_err());
        assert!(parse_limit(&json!(null)).is_err());
    }

    #[test]
    fn bounds_prefer_device_maximum() {
        let mut snap = DriverSnapshot::initial(&Config::default());
        assert_eq!(current_limit_bounds(&snap, 6, 32), (6, 32));
        snap.info = Some(
            DeviceInfo::from_json(&json!({
                "serialNumber": "1", "productId": 1, "maxChargeCurrent": 20
            }))
            .unwrap(),
        );
        assert_eq!(current_limit_bounds(&snap, 6, 32), (6, 20));
    }

    #[test]
    fn main_entity_is_required() {
        let mut config = Config::default();
        config.device.name = Some("Garage Charger".to_string());
        let snap = DriverSnapshot::initial(&config);
        assert!(ensure_main_entity(&snap, "sensor.garage_charger").is_ok());
        let err = ensure_main_entity(&snap, "sensor.garage_charger_status").unwrap_err();
        assert!(matches!(err, GaroError::NotFound { .. }));

        let unnamed = DriverSnapshot::initial(&Config::default());
        let err = ensure_main_entity(&unnamed, "sensor.x").unwrap_err();
        assert!(matches!(err, GaroError::Unavailable { .. }));
    }
}
