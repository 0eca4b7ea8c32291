//! Sensor entities derived from driver snapshots
//!
//! Each wallbox exposes a main sensor (state = operating mode) plus one sensor
//! per reading. Twin chargers and a detected energy meter add their own sets.

use crate::driver::DriverSnapshot;
use crate::garo::{ChargerStatus, MeterStatus, Mode, WallboxStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const STATE_UNAVAILABLE: &str = "unavailable";

/// A single sensor as exposed over the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Entity {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub device_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub state: Value,
    pub unit_of_measurement: Option<String>,
    pub icon: Option<String>,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub attributes: serde_json::Map<String, Value>,
}

/// Lowercase ASCII slug with single underscores
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.chars().flat_map(transliterate) {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

fn transliterate(c: char) -> Vec<char> {
    match c {
        'å' | 'ä' | 'à' | 'á' | 'â' | 'Å' | 'Ä' | 'À' | 'Á' | 'Â' => vec!['a'],
        'ö' | 'ø' | 'ò' | 'ó' | 'ô' | 'Ö' | 'Ø' | 'Ò' | 'Ó' | 'Ô' => vec!['o'],
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => vec!['e'],
        'ü' | 'ú' | 'ù' | 'û' | 'Ü' | 'Ú' | 'Ù' | 'Û' => vec!['u'],
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => vec!['i'],
        'æ' | 'Æ' => vec!['a', 'e'],
        'ß' => vec!['s', 's'],
        _ => vec![c],
    }
}

/// Entity id of the main sensor for a device name
pub fn main_entity_id(device_name: &str) -> String {
    format!("sensor.{}", slugify(device_name))
}

#[derive(Debug, Clone, Copy)]
enum Reading {
    Mode,
    Status,
    ChargingCurrent,
    ChargingPower,
    Phases,
    CurrentLimit,
    PilotLevel,
    SessionEnergy,
    TotalEnergy,
    TotalEnergyK,
    Temperature,
}

struct SensorDef {
    key: &'static str,
    label: &'static str,
    unit: Option<&'static str>,
    reading: Reading,
    /// Present on twin chargers as well
    per_charger: bool,
}

const SENSORS: [SensorDef; 11] = [
    SensorDef { key: "sensor", label: "", unit: None, reading: Reading::Mode, per_charger: false },
    SensorDef { key: "status", label: "Status", unit: None, reading: Reading::Status, per_charger: true },
    SensorDef {
        key: "current_charging_current",
        label: "Charging Current",
        unit: Some("A"),
        reading: Reading::ChargingCurrent,
        per_charger: true,
    },
    SensorDef {
        key: "current_charging_power",
        label: "Charging Power",
        unit: Some("W"),
        reading: Reading::ChargingPower,
        per_charger: true,
    },
    SensorDef { key: "nr_of_phases", label: "Phases", unit: None, reading: Reading::Phases, per_charger: true },
    SensorDef {
        key: "current_limit",
        label: "Current Limit",
        unit: Some("A"),
        reading: Reading::CurrentLimit,
        per_charger: false,
    },
    SensorDef {
        key: "pilot_level",
        label: "Pilot Level",
        unit: Some("A"),
        reading: Reading::PilotLevel,
        per_charger: true,
    },
    SensorDef {
        key: "acc_session_energy",
        label: "Session Energy",
        unit: Some("Wh"),
        reading: Reading::SessionEnergy,
        per_charger: true,
    },
    SensorDef {
        key: "latest_reading",
        label: "Total Energy",
        unit: Some("Wh"),
        reading: Reading::TotalEnergy,
        per_charger: true,
    },
    SensorDef {
        key: "latest_reading_k",
        label: "Total Energy (kWh)",
        unit: Some("kWh"),
        reading: Reading::TotalEnergyK,
        per_charger: true,
    },
    SensorDef {
        key: "current_temperature",
        label: "Temperature",
        unit: Some("°C"),
        reading: Reading::Temperature,
        per_charger: false,
    },
];

fn charger_value(reading: Reading, charger: &ChargerStatus) -> Value {
    match reading {
        Reading::Status => json!(charger.status_descr),
        Reading::ChargingCurrent => json!(charger.charging_current),
        Reading::ChargingPower => json!(charger.charging_power),
        Reading::Phases => json!(charger.nr_of_phases),
        Reading::PilotLevel => json!(charger.pilot_level),
        Reading::SessionEnergy => json!(charger.session_acc_energy),
        Reading::TotalEnergy => json!(charger.acc_energy),
        Reading::TotalEnergyK => json!(charger.acc_energy_k()),
        Reading::Mode | Reading::CurrentLimit | Reading::Temperature => Value::Null,
    }
}

fn box_value(reading: Reading, status: &WallboxStatus) -> Value {
    match reading {
        Reading::Mode => json!(status.mode.state_name()),
        Reading::CurrentLimit => json!(status.current_limit),
        Reading::Temperature => json!(status.temperature),
        other => charger_value(other, &status.main_charger),
    }
}

fn icon(reading: Reading, charger: Option<&ChargerStatus>) -> Option<String> {
    let icon = match reading {
        Reading::Mode => "mdi:car-electric",
        Reading::Temperature => "mdi:thermometer",
        Reading::Status => return charger.and_then(|c| c.status.icon()).map(str::to_string),
        Reading::Phases => match charger.map(|c| c.nr_of_phases) {
            Some(1) => "mdi:record-circle-outline",
            _ => "mdi:google-circles-communities",
        },
        _ => "mdi:flash",
    };
    Some(icon.to_string())
}

fn is_total_energy(reading: Reading) -> bool {
    matches!(reading, Reading::TotalEnergy | Reading::TotalEnergyK)
}

fn entity_name(device_name: &str, prefix: Option<&str>, label: &str) -> String {
    [Some(device_name), prefix, Some(label).filter(|l| !l.is_empty())]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}

fn sensor_entity(
    device_name: &str,
    device_id: &str,
    def: &SensorDef,
    twin: bool,
    state: Value,
    charger: Option<&ChargerStatus>,
) -> Entity {
    let (key, prefix) = if twin {
        (format!("twin_{}", def.key), Some("Twin"))
    } else {
        (def.key.to_string(), None)
    };
    let name = entity_name(device_name, prefix, def.label);
    let mut attributes = serde_json::Map::new();
    if matches!(def.reading, Reading::Mode) {
        attributes.insert(
            "modes".to_string(),
            json!(Mode::ALL.iter().map(|m| m.state_name()).collect::<Vec<_>>()),
        );
    }
    Entity {
        entity_id: format!("sensor.{}", slugify(&name)),
        unique_id: format!("{}-{}", device_id, key),
        name,
        device_id: device_id.to_string(),
        state,
        unit_of_measurement: def.unit.map(str::to_string),
        icon: icon(def.reading, charger),
        device_class: is_total_energy(def.reading).then(|| "energy".to_string()),
        state_class: is_total_energy(def.reading).then(|| "total_increasing".to_string()),
        attributes,
    }
}

fn meter_entities(device_name: &str, meter: &MeterStatus, available: bool) -> Vec<Entity> {
    let meter_name = format!("{} meter", device_name);
    let device_id = meter.device_id();
    let readings: [(&str, &str, &str, Value); 5] = [
        ("meter_phase1_current", "Phase 1 Current", "A", json!(meter.phase1_current)),
        ("meter_phase2_current", "Phase 2 Current", "A", json!(meter.phase2_current)),
        ("meter_phase3_current", "Phase 3 Current", "A", json!(meter.phase3_current)),
        ("meter_power", "Power", "W", json!(meter.power)),
        ("meter_acc_energy_k", "Total Energy (kWh)", "kWh", json!(meter.acc_energy_k)),
    ];
    readings
        .into_iter()
        .map(|(key, label, unit, value)| {
            let name = format!("{} {}", meter_name, label);
            let energy = key == "meter_acc_energy_k";
            let mut attributes = serde_json::Map::new();
            attributes.insert("meter_type".to_string(), json!(meter.meter_type));
            Entity {
                entity_id: format!("sensor.{}", slugify(&name)),
                unique_id: format!("{}-{}", device_id, key),
                name,
                device_id: device_id.clone(),
                state: if available { value } else { json!(STATE_UNAVAILABLE) },
                unit_of_measurement: Some(unit.to_string()),
                icon: Some("mdi:flash".to_string()),
                device_class: energy.then(|| "energy".to_string()),
                state_class: energy.then(|| "total_increasing".to_string()),
                attributes,
            }
        })
        .collect()
}

/// All entities for the current snapshot; empty until the device is set up
pub fn build(snapshot: &DriverSnapshot) -> Vec<Entity> {
    let (Some(info), Some(device_name), Some(device_id)) = (
        snapshot.info.as_ref(),
        snapshot.device_name.as_deref(),
        snapshot.device_id.as_deref(),
    ) else {
        return Vec::new();
    };
    let status = snapshot.status.as_ref().filter(|_| snapshot.available);
    let unavailable = || json!(STATE_UNAVAILABLE);

    let mut entities: Vec<Entity> = SENSORS
        .iter()
        .map(|def| {
            let state = status
                .map(|s| box_value(def.reading, s))
                .unwrap_or_else(unavailable);
            let charger = status.map(|s| &s.main_charger);
            sensor_entity(device_name, device_id, def, false, state, charger)
        })
        .collect();

    if info.has_twin() {
        let twin = status.and_then(|s| s.twin_charger.as_ref());
        entities.extend(SENSORS.iter().filter(|s| s.per_charger).map(|def| {
            let state = twin
                .map(|c| charger_value(def.reading, c))
                .unwrap_or_else(unavailable);
            sensor_entity(device_name, device_id, def, true, state, twin)
        }));
    }

    if let Some(meter) = &snapshot.meter {
        entities.extend(meter_entities(device_name, meter, snapshot.available));
    }
    entities
}

/// Look up a single entity by its entity id
pub fn find(snapshot: &DriverSnapshot, entity_id: &str) -> Option<Entity> {
    build(snapshot)
        .into_iter()
        .find(|e| e.entity_id == entity_id)
}
