use crate::config::Config;
use crate::error::Result;
use crate::garo::{ApiGeneration, DeviceInfo, MeterStatus, Mode, WallboxStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Main driver state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Waiting for the first successful `config` read
    Initializing,
    /// Driver is running normally
    Running,
    /// Driver is in error state
    Error(String),
    /// Driver is shutting down
    ShuttingDown,
}

impl DriverState {
    pub fn label(&self) -> &'static str {
        match self {
            DriverState::Initializing => "Initializing",
            DriverState::Running => "Running",
            DriverState::Error(_) => "Error",
            DriverState::ShuttingDown => "ShuttingDown",
        }
    }
}

/// Commands accepted by the driver from external components (web, etc.)
#[derive(Debug)]
pub enum DriverCommand {
    SetMode {
        mode: Mode,
        reply: oneshot::Sender<Result<()>>,
    },
    SetCurrentLimit {
        limit: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Replace the configuration; a changed device section re-runs setup
    UpdateConfig {
        config: Box<Config>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Unthrottled status refresh
    Refresh { reply: oneshot::Sender<Result<()>> },
}

impl DriverCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DriverCommand::SetMode { .. } => "set_mode",
            DriverCommand::SetCurrentLimit { .. } => "set_current_limit",
            DriverCommand::UpdateConfig { .. } => "update_config",
            DriverCommand::Refresh { .. } => "refresh",
        }
    }
}

/// Everything the web layer needs to render state without touching the device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DriverSnapshot {
    pub timestamp: String,
    /// Driver state (Initializing, Running, Error, ShuttingDown)
    pub driver_state: String,
    /// Whether the last device request succeeded
    pub available: bool,
    pub host: String,
    pub api_generation: Option<ApiGeneration>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub info: Option<DeviceInfo>,
    pub status: Option<WallboxStatus>,
    pub meter: Option<MeterStatus>,
    /// RFC 3339 time of the last successful status read
    pub last_update: Option<String>,
    pub last_error: Option<String>,
    pub total_polls: u64,
    pub failed_polls: u64,
    pub consecutive_failures: u32,
    pub poll_interval_ms: u64,
    pub min_update_interval_ms: u64,
}

impl DriverSnapshot {
    pub fn initial(config: &Config) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: DriverState::Initializing.label().to_string(),
            available: false,
            host: config.device.host.clone(),
            api_generation: None,
            device_id: None,
            device_name: config
                .device
                .name
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            info: None,
            status: None,
            meter: None,
            last_update: None,
            last_error: None,
            total_polls: 0,
            failed_polls: 0,
            consecutive_failures: 0,
            poll_interval_ms: config.poll_interval_ms,
            min_update_interval_ms: config.controls.min_update_interval_ms,
        }
    }
}
