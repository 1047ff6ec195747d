//! One-line printer summary pinned to the top row in split-screen mode.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::api::PrinterApi;
use crate::error::ApiError;
use crate::model::{Fan, Heater, PrintStatus, Toolhead};

const OBJECTS: &[&str] = &["print_stats", "virtual_sdcard", "extruder", "heater_bed", "toolhead", "fan"];

#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: String,
    pub extruder: Option<Heater>,
    pub bed: Option<Heater>,
    pub print: PrintStatus,
    pub homed_axes: String,
    pub fan_speed: Option<f64>,
}

impl StatusSnapshot {
    pub fn fetch(api: &dyn PrinterApi) -> Result<Self, ApiError> {
        let status = api.query_objects(OBJECTS)?;
        let get = |name: &str| status.get(name);
        let null = Value::Null;

        let print = PrintStatus::from_status(
            get("print_stats").unwrap_or(&null),
            get("virtual_sdcard").unwrap_or(&null),
        );
        let state = api
            .printer_info()
            .ok()
            .and_then(|info| info.get("state").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| print.state.clone());

        Ok(Self {
            state,
            extruder: get("extruder").map(|s| Heater::from_status("extruder", s)),
            bed: get("heater_bed").map(|s| Heater::from_status("heater_bed", s)),
            homed_axes: get("toolhead")
                .map(|s| Toolhead::from_status(s).homed_axes)
                .unwrap_or_default(),
            fan_speed: get("fan").map(|s| Fan::from_status("fan", s).speed),
            print,
        })
    }

    pub fn render(&self) -> String {
        fn temp(label: &str, h: &Heater) -> String {
            if h.target > 0.0 {
                format!("{label}: {:.1}/{:.0}°C", h.temperature, h.target)
            } else {
                format!("{label}: {:.1}°C", h.temperature)
            }
        }

        let mut parts = vec![self.state.to_uppercase()];
        if let Some(e) = &self.extruder {
            parts.push(temp("Extruder", e));
        }
        if let Some(b) = &self.bed {
            parts.push(temp("Bed", b));
        }
        if self.print.state == "printing" && self.print.progress > 0.0 {
            parts.push(format!("{} {:.1}%", self.print.filename, self.print.progress * 100.0));
        }
        parts.push(if self.homed_axes.is_empty() {
            "Not homed".to_string()
        } else {
            format!("Homed: {}", self.homed_axes.to_uppercase())
        });
        if let Some(speed) = self.fan_speed {
            parts.push(format!("Fan: {:.0}%", speed * 100.0));
        }
        parts.join(" | ")
    }
}

/// Refresh schedule for the status line. Lives on the viewer thread.
#[derive(Debug)]
pub struct StatusLine {
    interval: Duration,
    last: Option<Instant>,
    current: Option<String>,
}

impl StatusLine {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            current: None,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |last| now.duration_since(last) >= self.interval)
    }

    /// Fetch a fresh line if the interval elapsed. Failures keep the previous
    /// line. Returns the new text when it changed.
    pub fn refresh(&mut self, api: &dyn PrinterApi, now: Instant) -> Option<String> {
        if !self.due(now) {
            return None;
        }
        self.last = Some(now);
        match StatusSnapshot::fetch(api) {
            Ok(snapshot) => {
                let line = snapshot.render();
                if self.current.as_deref() == Some(line.as_str()) {
                    return None;
                }
                self.current = Some(line.clone());
                Some(line)
            }
            Err(e) => {
                debug!(error = %e, "status line refresh skipped");
                None
            }
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::mock::MockApi;

    fn printer() -> MockApi {
        let mut api = MockApi::new();
        api.printer_info = json!({ "state": "ready" });
        api.set_status("extruder", json!({ "temperature": 209.6, "target": 210.0, "power": 0.4 }));
        api.set_status("heater_bed", json!({ "temperature": 24.0, "target": 0.0 }));
        api.set_status("toolhead", json!({ "homed_axes": "xyz", "position": [0, 0, 0, 0] }));
        api.set_status("fan", json!({ "speed": 0.5 }));
        api.set_status("print_stats", json!({ "state": "printing", "filename": "cube.gcode" }));
        api.set_status("virtual_sdcard", json!({ "progress": 0.25 }));
        api
    }

    #[test]
    fn renders_compact_summary() {
        let snapshot = StatusSnapshot::fetch(&printer()).unwrap();
        assert_eq!(
            snapshot.render(),
            "READY | Extruder: 209.6/210°C | Bed: 24.0°C | cube.gcode 25.0% | Homed: XYZ | Fan: 50%"
        );
    }

    #[test]
    fn refresh_respects_interval() {
        let api = printer();
        let mut line = StatusLine::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(line.refresh(&api, t0).is_some());
        assert!(line.refresh(&api, t0 + Duration::from_millis(500)).is_none());
        // Due again, but unchanged text is not re-emitted.
        assert!(line.refresh(&api, t0 + Duration::from_secs(3)).is_none());
        assert!(line.current().unwrap().starts_with("READY"));
    }
}
