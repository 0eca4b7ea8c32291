//! # garo-wallbox - local bridge for the Garo Wallbox EV charger
//!
//! Polls a Garo Wallbox over its local REST API, maps the responses to typed
//! status and sensor entities, and exposes the `set_mode` and
//! `set_current_limit` services over a small JSON API.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `garo`: REST client, firmware endpoint fallback and status parsing
//! - `driver`: Polling loop owning the device client; commands and snapshots
//! - `entities`: Sensor view (entity ids, units, icons, states)
//! - `services`: Validation and dispatch of the two service calls
//! - `web`: HTTP server and REST API

pub mod config;
pub mod driver;
pub mod entities;
pub mod error;
pub mod garo;
pub mod logging;
pub mod services;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use driver::{DriverHandle, GaroDriver};
pub use error::{GaroError, Result};
