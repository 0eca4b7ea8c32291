use super::types::DriverSnapshot;
use std::sync::Arc;

impl super::GaroDriver {
    pub(super) fn build_snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: self.get_state().label().to_string(),
            available: self.available,
            host: self.config.device.host.clone(),
            api_generation: Some(self.api.generation()),
            device_id: self.info.as_ref().map(|i| i.device_id()),
            device_name: self.device_name.clone(),
            info: self.info.clone(),
            status: self.status.clone(),
            meter: self.meter.clone(),
            last_update: self.last_update_at.map(|t| t.to_rfc3339()),
            last_error: self.last_error.clone(),
            total_polls: self.total_polls,
            failed_polls: self.failed_polls,
            consecutive_failures: self.consecutive_failures,
            poll_interval_ms: self.config.poll_interval_ms,
            min_update_interval_ms: self.config.controls.min_update_interval_ms,
        }
    }

    /// Push the current state to watchers and SSE subscribers
    pub(super) fn publish_snapshot(&self) {
        let snapshot = Arc::new(self.build_snapshot());
        if let Ok(data) = serde_json::to_value(snapshot.as_ref()) {
            self.emit("status", data);
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Broadcast a `{"type": .., "data": ..}` event
    pub(super) fn emit(&self, kind: &str, data: serde_json::Value) {
        let envelope = serde_json::json!({ "type": kind, "data": data });
        // No subscribers is not an error
        let _ = self.events_tx.send(envelope.to_string());
    }
}
