use crate::error::{GaroError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Charger operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Mode {
    /// Always allow charging
    #[serde(rename = "ALWAYS_ON")]
    On,
    /// Never charge
    #[serde(rename = "ALWAYS_OFF")]
    Off,
    /// Charge according to the schedule stored on the wallbox
    #[serde(rename = "SCHEMA")]
    Schema,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::On, Mode::Off, Mode::Schema];

    /// Value used on the device REST API
    pub fn wire_value(self) -> &'static str {
        match self {
            Mode::On => "ALWAYS_ON",
            Mode::Off => "ALWAYS_OFF",
            Mode::Schema => "SCHEMA",
        }
    }

    /// Entity state of the main sensor
    pub fn state_name(self) -> &'static str {
        match self {
            Mode::On => "ON",
            Mode::Off => "OFF",
            Mode::Schema => "SCHEMA",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.wire_value() == value)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::On => "On",
            Mode::Off => "Off",
            Mode::Schema => "Schema",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = GaroError;

    /// Accepts `On`/`Off`/`Schema` in any case, or the device wire value
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(mode) = Self::from_wire(trimmed) {
            return Ok(mode);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "on" => Ok(Mode::On),
            "off" => Ok(Mode::Off),
            "schema" => Ok(Mode::Schema),
            _ => Err(GaroError::validation(
                "mode".to_string(),
                format!("'{}' is not one of On, Off, Schema", s),
            )),
        }
    }
}

/// Connector state reported per charger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ConnectorStatus {
    Changing,
    NotConnected,
    Connected,
    SearchComm,
    RcdFault,
    Charging,
    ChargingPaused,
    ChargingFinished,
    ChargingCancelled,
    Disabled,
    Overheat,
    CriticalTemperature,
    Initialization,
    CableFault,
    LockFault,
    ContactorFault,
    VentFault,
    DcError,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl ConnectorStatus {
    /// Human readable description shown as the status sensor state
    pub fn description(self) -> &'static str {
        match self {
            ConnectorStatus::CableFault => "Cable fault",
            ConnectorStatus::Changing => "Changing...",
            ConnectorStatus::Charging => "Charging",
            ConnectorStatus::ChargingCancelled => "Charging cancelled",
            ConnectorStatus::ChargingFinished => "Charging finished",
            ConnectorStatus::ChargingPaused => "Charging paused",
            ConnectorStatus::Disabled => "Charging disabled",
            ConnectorStatus::Connected => "Vehicle connected",
            ConnectorStatus::ContactorFault => "Contactor fault",
            ConnectorStatus::CriticalTemperature => "Overtemperature, charging cancelled",
            ConnectorStatus::DcError => "DC error",
            ConnectorStatus::Initialization => "Charger starting...",
            ConnectorStatus::LockFault => "Lock fault",
            ConnectorStatus::NotConnected => "Vehicle not connected",
            ConnectorStatus::Overheat => {
                "Overtemperature, charging temporarily restricted to 6A"
            }
            ConnectorStatus::RcdFault => "RCD fault",
            ConnectorStatus::SearchComm => "Vehicle connected",
            ConnectorStatus::VentFault => "Ventilation required",
            ConnectorStatus::Unavailable => "Unavailable",
            ConnectorStatus::Unknown => "Unknown",
        }
    }

    pub fn icon(self) -> Option<&'static str> {
        let icon = match self {
            ConnectorStatus::CableFault
            | ConnectorStatus::ContactorFault
            | ConnectorStatus::CriticalTemperature
            | ConnectorStatus::DcError
            | ConnectorStatus::LockFault
            | ConnectorStatus::Overheat
            | ConnectorStatus::RcdFault
            | ConnectorStatus::VentFault
            | ConnectorStatus::Unavailable => "mdi:alert",
            ConnectorStatus::Changing => "mdi:update",
            ConnectorStatus::Charging => "mdi:battery-charging",
            ConnectorStatus::ChargingCancelled => "mdi:cancel",
            ConnectorStatus::ChargingFinished => "mdi:battery",
            ConnectorStatus::ChargingPaused => "mdi:pause",
            ConnectorStatus::Connected => "mdi:power-plug",
            ConnectorStatus::Disabled => "mdi:stop-circle-outline",
            ConnectorStatus::Initialization => "mdi:timer-sand",
            ConnectorStatus::NotConnected => "mdi:power-plug-off",
            ConnectorStatus::SearchComm => "mdi:help",
            ConnectorStatus::Unknown => return None,
        };
        Some(icon)
    }
}

/// Energy meter endpoint selected by the load-balancing setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MeterPath {
    Local,
    Central,
    Central101,
}

impl MeterPath {
    pub fn as_str(self) -> &'static str {
        match self {
            MeterPath::Local => "LocalMeter",
            MeterPath::Central => "CentralMeter",
            MeterPath::Central101 => "CentralMeter101",
        }
    }

    /// REST action for the meter readings
    pub fn action(self) -> String {
        format!("meterinfo/{}", self.as_str())
    }
}

/// Firmware REST endpoint generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ApiGeneration {
    /// Firmware 1.3.1 and later, port 8080 under `/servlet`
    Current,
    /// Firmware before 1.3.1, port 2222
    Legacy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_names_case_insensitively() {
        assert_eq!("On".parse::<Mode>().unwrap(), Mode::On);
        assert_eq!("off".parse::<Mode>().unwrap(), Mode::Off);
        assert_eq!("SCHEMA".parse::<Mode>().unwrap(), Mode::Schema);
        assert_eq!("ALWAYS_ON".parse::<Mode>().unwrap(), Mode::On);
    }

    #[test]
    fn mode_rejects_other_values() {
        for bad in ["", "Auto", "ALWAYS", "1", "on off"] {
            let err = bad.parse::<Mode>().unwrap_err();
            assert!(matches!(err, GaroError::Validation { .. }), "{bad}");
        }
    }

    #[test]
    fn mode_serde_uses_wire_values() {
        assert_eq!(serde_json::to_string(&Mode::Off).unwrap(), "\"ALWAYS_OFF\"");
        let m: Mode = serde_json::from_str("\"SCHEMA\"").unwrap();
        assert_eq!(m, Mode::Schema);
    }

    #[test]
    fn connector_status_unknown_strings_fall_back() {
        let s: ConnectorStatus = serde_json::from_str("\"CHARGING_PAUSED\"").unwrap();
        assert_eq!(s, ConnectorStatus::ChargingPaused);
        let s: ConnectorStatus = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(s, ConnectorStatus::Unknown);
        assert_eq!(s.description(), "Unknown");
        assert!(s.icon().is_none());
    }

    #[test]
    fn connector_status_unavailable_is_recognised() {
        let s: ConnectorStatus = serde_json::from_str("\"UNAVAILABLE\"").unwrap();
        assert_eq!(s, ConnectorStatus::Unavailable);
        assert_eq!(s.description(), "Unavailable");
        assert_eq!(s.icon(), Some("mdi:alert"));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"UNAVAILABLE\"");
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(
            ConnectorStatus::NotConnected.description(),
            "Vehicle not connected"
        );
        assert_eq!(
            ConnectorStatus::SearchComm.description(),
            ConnectorStatus::Connected.description()
        );
        assert_eq!(ConnectorStatus::Charging.icon(), Some("mdi:battery-charging"));
    }

    #[test]
    fn meter_action() {
        assert_eq!(MeterPath::Central101.action(), "meterinfo/CentralMeter101");
    }
}
