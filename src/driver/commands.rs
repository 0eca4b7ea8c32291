use super::types::{DriverCommand, DriverState};
use super::{GaroDriver, configured_name};
use crate::config::Config;
use crate::error::{GaroError, Result};
use crate::garo::Mode;

impl GaroDriver {
    pub(crate) async fn handle_command(&mut self, cmd: DriverCommand) {
        let name = cmd.name();
        match cmd {
            DriverCommand::SetMode { mode, reply } => {
                let result = self.apply_mode(mode).await;
                self.report(name, &result);
                let _ = reply.send(result);
            }
            DriverCommand::SetCurrentLimit { limit, reply } => {
                let result = self.apply_current_limit(limit).await;
                self.report(name, &result);
                let _ = reply.send(result);
            }
            DriverCommand::UpdateConfig { config, reply } => {
                let result = self.apply_config(*config).await;
                self.report(name, &result);
                let _ = reply.send(result);
            }
            DriverCommand::Refresh { reply } => {
                let result = self.refresh_now().await;
                let _ = reply.send(result);
            }
        }
    }

    fn report(&self, command: &str, result: &Result<()>) {
        match result {
            Ok(()) => self.logger.info(&format!("Command {} succeeded", command)),
            Err(e) => self
                .logger
                .warn(&format!("Command {} failed: {}", command, e)),
        }
        self.emit(
            "command",
            serde_json::json!({
                "command": command,
                "ok": result.is_ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            }),
        );
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.info.is_none() {
            return Err(GaroError::unavailable(format!(
                "wallbox at {} is not set up yet",
                self.config.device.host
            )));
        }
        Ok(())
    }

    async fn apply_mode(&mut self, mode: Mode) -> Result<()> {
        self.ensure_ready()?;
        self.api.set_mode(mode).await?;
        self.refresh_after_write().await;
        Ok(())
    }

    async fn apply_current_limit(&mut self, limit: u32) -> Result<()> {
        self.ensure_ready()?;
        self.api.set_current_limit(limit).await?;
        self.refresh_after_write().await;
        Ok(())
    }

    /// The write already succeeded; a failed read-back only shows up in the snapshot
    async fn refresh_after_write(&mut self) {
        if let Err(e) = self.poll_cycle().await {
            self.logger
                .warn(&format!("Status refresh after write failed: {}", e));
        }
    }

    async fn refresh_now(&mut self) -> Result<()> {
        if self.info.is_none() {
            return self.setup().await;
        }
        self.poll_cycle().await
    }

    async fn apply_config(&mut self, new_config: Config) -> Result<()> {
        new_config.validate()?;
        let device_changed = new_config.device != self.config.device
            || new_config.controls.max_retries != self.config.controls.max_retries
            || new_config.controls.retry_delay_ms != self.config.controls.retry_delay_ms;

        if device_changed {
            let api = (self.factory)(&new_config)?;
            self.logger.info(&format!(
                "Device configuration changed, reconnecting to {}",
                new_config.device.host
            ));
            self.api = api;
            self.config = new_config;
            self.logger = super::driver_logger(&self.config.device.host, None);
            self.info = None;
            self.status = None;
            self.meter = None;
            self.available = false;
            self.last_update = None;
            self.last_update_at = None;
            self.device_name = configured_name(&self.config);
            self.state.send_replace(DriverState::Initializing);
        } else {
            self.config = new_config;
            if let Some(info) = &self.info {
                self.device_name =
                    Some(info.display_name(self.config.device.name.as_deref(), self.api.host()));
            }
        }
        self.config_tx
            .send_replace(std::sync::Arc::new(self.config.clone()));

        if device_changed {
            // Setup failures leave the driver initializing; the next tick retries
            let _ = self.setup().await;
        } else {
            self.publish_snapshot();
        }
        Ok(())
    }
}
