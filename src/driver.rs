//! Polling driver for a single Garo Wallbox
//!
//! The driver task is the only owner of the device client. Poll ticks and
//! commands from the web layer are multiplexed in one `select!` loop, so the
//! wallbox never sees overlapping requests. Consumers get a [`DriverHandle`]
//! carrying the command sender, the latest snapshot and the event stream.

use crate::config::Config;
use crate::error::{GaroError, Result};
use crate::garo::{DeviceInfo, GaroClient, MeterStatus, Mode, WallboxApi, WallboxStatus};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

mod commands;
mod runtime;
mod snapshot;
mod types;

pub use types::{DriverCommand, DriverSnapshot, DriverState};

/// Builds a device client for a configuration
pub type ApiFactory = Arc<dyn Fn(&Config) -> Result<Box<dyn WallboxApi>> + Send + Sync>;

/// Factory producing the real HTTP client
pub fn http_api_factory() -> ApiFactory {
    Arc::new(|config: &Config| {
        let client = GaroClient::new(&config.device, &config.controls)?;
        Ok(Box::new(client) as Box<dyn WallboxApi>)
    })
}

/// Main driver for one wallbox
pub struct GaroDriver {
    config: Config,
    api: Box<dyn WallboxApi>,
    factory: ApiFactory,
    logger: StructuredLogger,

    state: watch::Sender<DriverState>,
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    snapshot_tx: watch::Sender<Arc<DriverSnapshot>>,
    config_tx: watch::Sender<Arc<Config>>,
    events_tx: broadcast::Sender<String>,

    info: Option<DeviceInfo>,
    device_name: Option<String>,
    status: Option<WallboxStatus>,
    meter: Option<MeterStatus>,
    available: bool,
    last_update: Option<Instant>,
    last_update_at: Option<chrono::DateTime<chrono::Utc>>,
    last_error: Option<String>,
    total_polls: u64,
    failed_polls: u64,
    consecutive_failures: u32,
}

/// Cloneable access to a running driver
#[derive(Clone)]
pub struct DriverHandle {
    commands: mpsc::UnboundedSender<DriverCommand>,
    shutdown: mpsc::UnboundedSender<()>,
    snapshot: watch::Receiver<Arc<DriverSnapshot>>,
    config: watch::Receiver<Arc<Config>>,
    state: watch::Receiver<DriverState>,
    events: broadcast::Sender<String>,
}

impl GaroDriver {
    /// Create a driver talking to the wallbox over HTTP
    pub fn new(config: Config) -> Result<(Self, DriverHandle)> {
        Self::with_factory(config, http_api_factory())
    }

    /// Create a driver with a custom client factory
    pub fn with_factory(config: Config, factory: ApiFactory) -> Result<(Self, DriverHandle)> {
        config.validate()?;
        let api = factory(&config)?;
        let logger = driver_logger(&config.device.host, None);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DriverState::Initializing);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(DriverSnapshot::initial(&config)));
        let (config_tx, config_rx) = watch::channel(Arc::new(config.clone()));
        let (events_tx, _) = broadcast::channel::<String>(100);

        logger.info(&format!(
            "Initializing Garo Wallbox driver for {}",
            config.device.host
        ));

        let handle = DriverHandle {
            commands: commands_tx,
            shutdown: shutdown_tx,
            snapshot: snapshot_rx,
            config: config_rx,
            state: state_rx,
            events: events_tx.clone(),
        };

        let driver = Self {
            device_name: configured_name(&config),
            config,
            api,
            factory,
            logger,
            state: state_tx,
            commands_rx,
            shutdown_rx,
            snapshot_tx,
            config_tx,
            events_tx,
            info: None,
            status: None,
            meter: None,
            available: false,
            last_update: None,
            last_update_at: None,
            last_error: None,
            total_polls: 0,
            failed_polls: 0,
            consecutive_failures: 0,
        };
        Ok((driver, handle))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn status(&self) -> Option<&WallboxStatus> {
        self.status.as_ref()
    }
}

/// Driver logger carrying the wallbox host and, once known, its device id
fn driver_logger(host: &str, info: Option<&DeviceInfo>) -> StructuredLogger {
    let context = LogContext::new("driver").with_host(host);
    match info {
        Some(info) => get_logger_with_context(context.with_device_id(&info.device_id())),
        None => get_logger_with_context(context),
    }
}

fn configured_name(config: &Config) -> Option<String> {
    config
        .device
        .name
        .as_ref()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

impl DriverHandle {
    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<DriverSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<DriverSnapshot>> {
        self.snapshot.clone()
    }

    /// Live JSON events (status after each cycle, command results)
    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.borrow().clone()
    }

    pub fn state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        self.request(|reply| DriverCommand::SetMode { mode, reply })
            .await
    }

    pub async fn set_current_limit(&self, limit: u32) -> Result<()> {
        self.request(|reply| DriverCommand::SetCurrentLimit { limit, reply })
            .await
    }

    pub async fn update_config(&self, config: Config) -> Result<()> {
        self.request(|reply| DriverCommand::UpdateConfig {
            config: Box::new(config),
            reply,
        })
        .await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| DriverCommand::Refresh { reply }).await
    }

    /// Ask the driver loop to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> DriverCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| GaroError::unavailable("driver is not running"))?;
        reply_rx
            .await
            .map_err(|_| GaroError::unavailable("driver dropped the request"))?
    }
}
