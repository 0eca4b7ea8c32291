//! Garo Wallbox REST client and device model
//!
//! The wallbox serves a small JSON API under `rest/chargebox`. Firmware from
//! v1.3.1 moved it from port 2222 to `:8080/servlet`; the client starts on the
//! newer endpoint and switches once if the device answers with an error.

mod client;
mod status;
mod types;

pub use client::{Endpoints, GaroClient, WallboxApi, reduced_current_intervals};
pub use status::{
    ChargerStatus, CURRENT_DIVIDER, DeviceInfo, MAX_ENERGY_JUMP_WH, MAX_PLAUSIBLE_POWER_W,
    MeterStatus, VOLTAGE, WallboxStatus, model_name,
};
pub use types::{ApiGeneration, ConnectorStatus, MeterPath, Mode};
