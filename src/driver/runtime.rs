use super::types::DriverState;
use crate::error::Result;
use std::time::Instant;
use tokio::time::{Duration, MissedTickBehavior, interval};

impl super::GaroDriver {
    /// Run the driver main loop until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting Garo Wallbox driver main loop");

        let mut period_ms = self.config.poll_interval_ms;
        let mut poll_interval = interval(Duration::from_millis(period_ms));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.config.poll_interval_ms != period_ms {
                period_ms = self.config.poll_interval_ms;
                poll_interval = interval(Duration::from_millis(period_ms));
                poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.logger
                    .info(&format!("Poll interval changed to {} ms", period_ms));
            }

            tokio::select! {
                _ = poll_interval.tick() => {
                    self.on_tick().await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
        self.publish_snapshot();
        self.logger.info("Driver shutdown complete");
        Ok(())
    }

    async fn on_tick(&mut self) {
        if self.info.is_none() {
            // Setup failures are retried on every tick
            let _ = self.setup().await;
            return;
        }
        if self.is_throttled() {
            self.logger.trace("Skipping poll, last update is too recent");
            return;
        }
        if let Err(e) = self.poll_cycle().await {
            self.logger.error(&format!("Poll cycle failed: {}", e));
        }
    }

    /// Whether the last successful update is younger than the minimum interval
    ///
    /// Half a poll period of slack is granted: the update is stamped when the
    /// cycle finishes, so the next tick lands just inside an equal window.
    pub(crate) fn is_throttled(&self) -> bool {
        let min = Duration::from_millis(self.config.controls.min_update_interval_ms);
        let slack = Duration::from_millis(self.config.poll_interval_ms) / 2;
        self.last_update
            .map(|at| at.elapsed() + slack < min)
            .unwrap_or(false)
    }

    /// Read device info, detect the meter and take the first status reading
    pub(crate) async fn setup(&mut self) -> Result<()> {
        let result = self.try_setup().await;
        // Status failures are already counted by the poll cycle
        let count_failure = self.info.is_none();
        match &result {
            Ok(()) => {
                self.state.send_replace(DriverState::Running);
                self.logger.info(&format!(
                    "Wallbox ready: {} ({})",
                    self.device_name.as_deref().unwrap_or_default(),
                    self.info
                        .as_ref()
                        .map(|i| i.device_id())
                        .unwrap_or_default()
                ));
            }
            Err(e) if e.is_unreachable() => {
                self.logger
                    .warn(&format!("Wallbox not ready, will retry: {}", e));
                if count_failure {
                    self.record_failure(e.to_string());
                }
                self.state.send_replace(DriverState::Initializing);
            }
            Err(e) => {
                self.logger
                    .error(&format!("Unexpected error setting up wallbox: {}", e));
                if count_failure {
                    self.record_failure(e.to_string());
                }
                self.state.send_replace(DriverState::Error(e.to_string()));
            }
        }
        self.publish_snapshot();
        result
    }

    async fn try_setup(&mut self) -> Result<()> {
        let info = self.api.fetch_info().await?;
        self.logger = super::driver_logger(&self.config.device.host, Some(&info));
        self.device_name = Some(
            info.display_name(self.config.device.name.as_deref(), self.api.host()),
        );
        self.info = Some(info);
        self.poll_cycle().await
    }

    /// Single polling cycle: status, then the meter on a best-effort basis
    pub(crate) async fn poll_cycle(&mut self) -> Result<()> {
        let Some(info) = self.info.clone() else {
            return self.setup_pending();
        };
        self.logger.debug("Starting poll cycle");
        self.total_polls = self.total_polls.saturating_add(1);

        let status = match self.api.fetch_status(&info, self.status.as_ref()).await {
            Ok(status) => status,
            Err(e) => {
                self.available = false;
                self.record_failure(e.to_string());
                self.publish_snapshot();
                return Err(e);
            }
        };

        if let Some(prev) = &self.status
            && prev.main_charger.status != status.main_charger.status
        {
            self.logger.info(&format!(
                "Connector status changed: {} -> {}",
                prev.main_charger.status_descr, status.main_charger.status_descr
            ));
        }
        self.status = Some(status);
        self.available = true;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_update = Some(Instant::now());
        self.last_update_at = Some(chrono::Utc::now());

        if let Some(path) = info.meter_path {
            match self.api.fetch_meter(path).await {
                Ok(meter) => self.meter = Some(meter),
                Err(e) => self
                    .logger
                    .warn(&format!("Meter {} read failed: {}", path.as_str(), e)),
            }
        }

        if !matches!(self.get_state(), DriverState::Running) {
            self.state.send_replace(DriverState::Running);
        }
        self.publish_snapshot();
        Ok(())
    }

    fn setup_pending(&self) -> Result<()> {
        Err(crate::error::GaroError::unavailable(format!(
            "wallbox at {} is not set up yet",
            self.config.device.host
        )))
    }

    fn record_failure(&mut self, message: String) {
        self.failed_polls = self.failed_polls.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::driver::GaroDriver;
    use crate::error::{GaroError, Result};
    use crate::garo::{
        ApiGeneration, DeviceInfo, MeterPath, MeterStatus, Mode, WallboxApi, WallboxStatus,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        status: u32,
        meter: u32,
        fail_info: bool,
        fail_meter: bool,
    }

    struct FakeApi {
        calls: Arc<Mutex<Calls>>,
    }

    fn info_doc() -> serde_json::Value {
        json!({
            "serialNumber": "777",
            "productId": 3,
            "maxChargeCurrent": 16,
            "slaveList": [{}],
            "localLoadBalanced": true
        })
    }

    fn status_doc() -> serde_json::Value {
        json!({
            "mode": "SCHEMA",
            "currentTemperature": 25,
            "currentLimit": 10,
            "connector": "CONNECTED",
            "nrOfPhases": 1,
            "currentChargingCurrent": 0,
            "currentChargingPower": 0,
            "accEnergy": 100
        })
    }

    #[async_trait::async_trait]
    impl WallboxApi for FakeApi {
        async fn fetch_info(&mut self) -> Result<DeviceInfo> {
            if self.calls.lock().unwrap().fail_info {
                return Err(GaroError::timeout("no answer"));
            }
            DeviceInfo::from_json(&info_doc())
        }
        async fn fetch_status(
            &mut self,
            info: &DeviceInfo,
            prev: Option<&WallboxStatus>,
        ) -> Result<WallboxStatus> {
            self.calls.lock().unwrap().status += 1;
            WallboxStatus::from_json(&status_doc(), info, prev)
        }
        async fn fetch_meter(&mut self, _path: MeterPath) -> Result<MeterStatus> {
            let mut calls = self.calls.lock().unwrap();
            calls.meter += 1;
            if calls.fail_meter {
                return Err(GaroError::device("meter missing"));
            }
            MeterStatus::from_json(&json!({
                "meterSerial": "9", "type": "X",
                "phase1Current": 10, "phase2Current": 0, "phase3Current": 0,
                "accEnergy": 1000
            }))
        }
        async fn set_mode(&mut self, _mode: Mode) -> Result<()> {
            Ok(())
        }
        async fn set_current_limit(&mut self, _limit: u32) -> Result<()> {
            Ok(())
        }
        fn host(&self) -> &str {
            "fake"
        }
        fn generation(&self) -> ApiGeneration {
            ApiGeneration::Current
        }
    }

    fn driver(calls: Arc<Mutex<Calls>>) -> (GaroDriver, crate::driver::DriverHandle) {
        driver_with(Config::default(), calls)
    }

    fn driver_with(
        config: Config,
        calls: Arc<Mutex<Calls>>,
    ) -> (GaroDriver, crate::driver::DriverHandle) {
        let factory: crate::driver::ApiFactory = Arc::new(move |_cfg: &Config| {
            Ok(Box::new(FakeApi {
                calls: calls.clone(),
            }) as Box<dyn WallboxApi>)
        });
        GaroDriver::with_factory(config, factory).unwrap()
    }

    #[tokio::test]
    async fn setup_reads_info_status_and_meter() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut d, handle) = driver(calls.clone());
        d.setup().await.unwrap();

        let snap = handle.snapshot();
        assert_eq!(snap.driver_state, "Running");
        assert!(snap.available);
        assert_eq!(snap.device_id.as_deref(), Some("garo_777"));
        assert_eq!(snap.device_name.as_deref(), Some("Garo Wallbox (product 3) (fake)"));
        assert!(snap.meter.is_some());
        assert_eq!(calls.lock().unwrap().status, 1);
        assert_eq!(d.device_info().map(|i| i.serial.as_str()), Some("777"));
        assert!(d.status().is_some());
        assert_eq!(d.config().poll_interval_ms, snap.poll_interval_ms);
        assert_eq!(d.logger.context.device_id.as_deref(), Some("garo_777"));
        assert_eq!(d.logger.context.host.as_deref(), Some("192.168.1.100"));
    }

    #[tokio::test]
    async fn unreachable_device_stays_initializing() {
        let calls = Arc::new(Mutex::new(Calls {
            fail_info: true,
            ..Default::default()
        }));
        let (mut d, handle) = driver(calls);
        assert!(d.setup().await.is_err());
        assert_eq!(d.get_state(), crate::driver::DriverState::Initializing);
        let snap = handle.snapshot();
        assert!(!snap.available);
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn polls_are_throttled_after_an_update() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (mut d, _handle) = driver(calls.clone());
        d.setup().await.unwrap();
        assert!(d.is_throttled());
        d.on_tick().await;
        assert_eq!(calls.lock().unwrap().status, 1);
    }

    #[tokio::test]
    async fn throttle_equal_to_poll_interval_keeps_every_tick() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut config = Config::default();
        config.poll_interval_ms = 50;
        config.controls.min_update_interval_ms = 50;
        let (mut d, handle) = driver_with(config, calls.clone());
        let task = tokio::spawn(async move { d.run().await });

        // Ticks at 0, 50, ..., 500 ms
        tokio::time::sleep(std::time::Duration::from_millis(525)).await;
        handle.shutdown();
        task.await.unwrap().unwrap();

        let polls = calls.lock().unwrap().status;
        assert!(polls >= 9, "only {polls} status polls over 11 ticks");
    }

    #[tokio::test]
    async fn meter_failure_does_not_fail_cycle() {
        let calls = Arc::new(Mutex::new(Calls {
            fail_meter: true,
            ..Default::default()
        }));
        let (mut d, handle) = driver(calls.clone());
        d.setup().await.unwrap();
        assert!(handle.snapshot().available);
        assert!(handle.snapshot().meter.is_none());
        assert_eq!(calls.lock().unwrap().meter, 1);
    }
}
