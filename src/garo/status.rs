use super::types::{ConnectorStatus, MeterPath, Mode};
use crate::error::{GaroError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mains voltage used to estimate meter power from phase currents
pub const VOLTAGE: f64 = 230.0;

/// Raw meter currents are reported in deciamperes
pub const CURRENT_DIVIDER: f64 = 10.0;

/// Power readings above this are firmware glitches
pub const MAX_PLAUSIBLE_POWER_W: f64 = 32_000.0;

/// Energy counter jumps larger than this between polls are rejected
pub const MAX_ENERGY_JUMP_WH: f64 = 500_000.0;

/// Static information from the `config` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DeviceInfo {
    pub serial: String,
    pub product_id: i64,
    pub model: String,
    pub max_current: Option<u32>,
    pub temperature_warning: Option<f64>,
    pub temperature_cutoff: Option<f64>,
    /// Main charger plus an optional twin
    pub nof_chargers: usize,
    pub meter_path: Option<MeterPath>,
}

impl DeviceInfo {
    pub fn device_id(&self) -> String {
        format!("garo_{}", self.serial)
    }

    pub fn has_twin(&self) -> bool {
        self.nof_chargers > 1
    }

    /// Device name shown to users: the configured one or `"<model> (<host>)"`
    pub fn display_name(&self, configured: Option<&str>, host: &str) -> String {
        match configured.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} ({})", self.model, host),
        }
    }

    pub fn from_json(doc: &Value) -> Result<Self> {
        let serial = match doc.get("serialNumber") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(GaroError::device("config is missing serialNumber")),
        };
        let product_id = match doc.get("productId") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| GaroError::device("config has no numeric productId"))?;

        let nof_chargers = doc
            .get("slaveList")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(1)
            .max(1);

        let flag = |key: &str| doc.get(key).and_then(Value::as_bool).unwrap_or(false);
        let meter_path = if flag("localLoadBalanced") {
            Some(MeterPath::Local)
        } else if flag("groupLoadBalanced") {
            Some(MeterPath::Central)
        } else if flag("groupLoadBalanced101") {
            Some(MeterPath::Central101)
        } else {
            None
        };

        Ok(Self {
            serial,
            product_id,
            model: model_name(product_id),
            max_current: doc
                .get("maxChargeCurrent")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok()),
            temperature_warning: doc.get("warningTemperature").and_then(Value::as_f64),
            temperature_cutoff: doc.get("cutoffTemperature").and_then(Value::as_f64),
            nof_chargers,
            meter_path,
        })
    }
}

/// Model name for a product id
pub fn model_name(product_id: i64) -> String {
    format!("Garo Wallbox (product {})", product_id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    mode: Mode,
    current_temperature: f64,
    current_limit: i64,
    #[serde(default)]
    factory_current_limit: i64,
    #[serde(default)]
    switch_current_limit: i64,
    #[serde(default)]
    power_mode: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCharger {
    connector: ConnectorStatus,
    nr_of_phases: i64,
    #[serde(default)]
    charge_status: i64,
    current_charging_current: f64,
    #[serde(default)]
    pilot_level: i64,
    #[serde(default)]
    min_current_limit: i64,
    current_charging_power: f64,
    acc_energy: f64,
    #[serde(default)]
    acc_session_energy: f64,
    #[serde(default)]
    session_start_value: f64,
    #[serde(default)]
    session_start_time: i64,
    #[serde(default)]
    acc_session_millis: i64,
    #[serde(default)]
    load_balanced: bool,
    #[serde(default)]
    phase: i64,
    #[serde(default)]
    cable_lock_mode: i64,
    #[serde(default)]
    dip_switch_settings: i64,
}

/// State of one charging outlet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChargerStatus {
    pub status: ConnectorStatus,
    pub status_descr: String,
    pub nr_of_phases: i64,
    pub charge_status: i64,
    /// Amperes
    pub charging_current: f64,
    pub pilot_level: i64,
    pub min_current_limit: i64,
    /// Watts
    pub charging_power: f64,
    /// Lifetime energy counter in Wh
    pub acc_energy: f64,
    pub session_acc_energy: f64,
    pub session_start_energy: f64,
    pub session_start_time: i64,
    /// Seconds
    pub session_duration: f64,
    pub load_balancing: bool,
    pub load_balancing_phase: i64,
    pub cable_lock_mode: i64,
    pub dip_switch_setting: i64,
}

impl ChargerStatus {
    fn from_raw(raw: RawCharger, prev: Option<&ChargerStatus>) -> Self {
        let mut charging_power = raw.current_charging_power.max(0.0);
        if charging_power > MAX_PLAUSIBLE_POWER_W {
            charging_power = 0.0;
        }

        let mut acc_energy = raw.acc_energy;
        if let Some(prev) = prev
            && acc_energy - prev.acc_energy > MAX_ENERGY_JUMP_WH
        {
            acc_energy = prev.acc_energy;
        }

        Self {
            status: raw.connector,
            status_descr: raw.connector.description().to_string(),
            nr_of_phases: raw.nr_of_phases,
            charge_status: raw.charge_status,
            charging_current: (raw.current_charging_current / 1000.0).max(0.0),
            pilot_level: raw.pilot_level,
            min_current_limit: raw.min_current_limit,
            charging_power,
            acc_energy,
            session_acc_energy: raw.acc_session_energy,
            session_start_energy: raw.session_start_value,
            session_start_time: raw.session_start_time,
            session_duration: raw.acc_session_millis as f64 / 1000.0,
            load_balancing: raw.load_balanced,
            load_balancing_phase: raw.phase,
            cable_lock_mode: raw.cable_lock_mode,
            dip_switch_setting: raw.dip_switch_settings,
        }
    }

    /// Lifetime energy in kWh, one decimal
    pub fn acc_energy_k(&self) -> f64 {
        round_to(self.acc_energy / 1000.0, 1)
    }
}

/// Parsed `status` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WallboxStatus {
    pub mode: Mode,
    pub temperature: f64,
    pub temperature_warning: Option<f64>,
    pub temperature_cutoff: Option<f64>,
    pub current_limit: i64,
    pub factory_current_limit: i64,
    pub switch_current_limit: i64,
    pub power_mode: i64,
    pub main_charger: ChargerStatus,
    pub twin_charger: Option<ChargerStatus>,
}

impl WallboxStatus {
    /// Parse a status document, filtering energy glitches against `prev`
    pub fn from_json(doc: &Value, info: &DeviceInfo, prev: Option<&WallboxStatus>) -> Result<Self> {
        let raw: RawStatus = serde_json::from_value(doc.clone())?;

        // Older firmware puts the main charger fields at the top level
        let main_doc = doc.get("mainCharger").unwrap_or(doc);
        let main_raw: RawCharger = serde_json::from_value(main_doc.clone())?;
        let main_charger = ChargerStatus::from_raw(main_raw, prev.map(|p| &p.main_charger));

        let twin_charger = match doc.get("twinCharger") {
            Some(twin) if !twin.is_null() => {
                let raw: RawCharger = serde_json::from_value(twin.clone())?;
                Some(ChargerStatus::from_raw(
                    raw,
                    prev.and_then(|p| p.twin_charger.as_ref()),
                ))
            }
            _ => None,
        };

        Ok(Self {
            mode: raw.mode,
            temperature: raw.current_temperature,
            temperature_warning: info.temperature_warning,
            temperature_cutoff: info.temperature_cutoff,
            current_limit: raw.current_limit,
            factory_current_limit: raw.factory_current_limit,
            switch_current_limit: raw.switch_current_limit,
            power_mode: raw.power_mode,
            main_charger,
            twin_charger,
        })
    }
}

/// Parsed `meterinfo` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MeterStatus {
    pub serial: String,
    #[serde(rename = "type")]
    pub meter_type: String,
    pub phase1_current: f64,
    pub phase2_current: f64,
    pub phase3_current: f64,
    /// Estimated from phase currents, rounded to 10 W
    pub power: i64,
    pub acc_energy_k: f64,
}

impl MeterStatus {
    pub fn device_id(&self) -> String {
        format!("garo_{}", self.serial)
    }

    pub fn from_json(doc: &Value) -> Result<Self> {
        let text = |key: &str| match doc.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let number = |key: &str| -> Result<f64> {
            doc.get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| GaroError::device(format!("meter reading is missing {}", key)))
        };

        let phase1_current = number("phase1Current")? / CURRENT_DIVIDER;
        let phase2_current = number("phase2Current")? / CURRENT_DIVIDER;
        let phase3_current = number("phase3Current")? / CURRENT_DIVIDER;
        let current = phase1_current + phase2_current + phase3_current;

        Ok(Self {
            serial: text("meterSerial"),
            meter_type: text("type"),
            phase1_current,
            phase2_current,
            phase3_current,
            power: ((current * VOLTAGE / 10.0).round_ties_even() * 10.0) as i64,
            acc_energy_k: round_to(number("accEnergy")? / 1000.0, 1),
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
