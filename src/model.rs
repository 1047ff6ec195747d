//! Printer data models. Built from Moonraker object status maps or
//! deserialized straight from file-API responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn num(status: &Value, key: &str) -> Option<f64> {
    status.get(key).and_then(Value::as_f64)
}

fn text(status: &Value, key: &str) -> String {
    status
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSensor {
    pub name: String,
    pub temperature: f64,
    pub measured_min_temp: Option<f64>,
    pub measured_max_temp: Option<f64>,
    pub target: Option<f64>,
    pub power: Option<f64>,
}

impl TemperatureSensor {
    pub fn from_status(name: impl Into<String>, status: &Value) -> Self {
        Self {
            name: name.into(),
            temperature: num(status, "temperature").unwrap_or(0.0),
            measured_min_temp: num(status, "measured_min_temp"),
            measured_max_temp: num(status, "measured_max_temp"),
            target: num(status, "target"),
            power: num(status, "power"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fan {
    pub name: String,
    /// 0.0 - 1.0
    pub speed: f64,
    pub rpm: Option<f64>,
}

impl Fan {
    pub fn from_status(name: impl Into<String>, status: &Value) -> Self {
        Self {
            name: name.into(),
            speed: num(status, "speed").unwrap_or(0.0),
            rpm: num(status, "rpm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Led {
    pub name: String,
    /// One `[r, g, b, w]` entry per LED in the chain.
    pub color_data: Option<Vec<Vec<f64>>>,
}

impl Led {
    pub fn from_status(name: impl Into<String>, status: &Value) -> Self {
        let color_data = status
            .get("color_data")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Self {
            name: name.into(),
            color_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macro {
    pub name: String,
    pub description: Option<String>,
    /// `params.X` names referenced by the macro body, sorted and unique.
    pub parameters: Vec<String>,
    pub gcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heater {
    pub name: String,
    pub temperature: f64,
    pub target: f64,
    pub power: f64,
}

impl Heater {
    pub fn from_status(name: impl Into<String>, status: &Value) -> Self {
        Self {
            name: name.into(),
            temperature: num(status, "temperature").unwrap_or(0.0),
            target: num(status, "target").unwrap_or(0.0),
            power: num(status, "power").unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pin {
    pub name: String,
    pub value: f64,
}

impl Pin {
    pub fn from_status(name: impl Into<String>, status: &Value) -> Self {
        Self {
            name: name.into(),
            value: num(status, "value").unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcodeCommand {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrinterStatus {
    pub state: String,
    pub state_message: String,
}

impl PrinterStatus {
    pub fn from_info(info: &Value) -> Self {
        let state = info
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Self {
            state,
            state_message: text(info, "state_message"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toolhead {
    pub homed_axes: String,
    /// `[x, y, z, e]`
    pub position: Vec<f64>,
    pub print_time: f64,
    pub estimated_print_time: f64,
}

impl Toolhead {
    pub fn from_status(status: &Value) -> Self {
        let position = status
            .get("position")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_else(|| vec![0.0; 4]);
        Self {
            homed_axes: text(status, "homed_axes"),
            position,
            print_time: num(status, "print_time").unwrap_or(0.0),
            estimated_print_time: num(status, "estimated_print_time").unwrap_or(0.0),
        }
    }

    pub fn axis(&self, index: usize) -> f64 {
        self.position.get(index).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endstops {
    pub endstops: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcodeFile {
    #[serde(alias = "path")]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filament_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_layer_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slicer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub dirname: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: f64,
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintStatus {
    /// standby, printing, paused, complete, cancelled, error
    pub state: String,
    pub filename: String,
    pub total_duration: f64,
    pub print_duration: f64,
    pub filament_used: f64,
    /// 0.0 - 1.0
    pub progress: f64,
    pub message: String,
}

impl PrintStatus {
    pub fn from_status(print_stats: &Value, virtual_sdcard: &Value) -> Self {
        let state = print_stats
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("standby")
            .to_string();
        Self {
            state,
            filename: text(print_stats, "filename"),
            total_duration: num(print_stats, "total_duration").unwrap_or(0.0),
            print_duration: num(print_stats, "print_duration").unwrap_or(0.0),
            filament_used: num(print_stats, "filament_used").unwrap_or(0.0),
            progress: num(virtual_sdcard, "progress").unwrap_or(0.0),
            message: text(print_stats, "message"),
        }
    }

    /// Remaining seconds extrapolated from progress, while printing.
    pub fn remaining_secs(&self) -> Option<f64> {
        if self.progress > 0.0 && self.progress < 1.0 {
            Some(self.print_duration / self.progress - self.print_duration)
        } else {
            None
        }
    }
}

/// Kind of a console line. Moonraker's gcode store tags entries as
/// `command` or `response`; errors and warnings are recognised by prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Command,
    #[default]
    Response,
    Error,
    Warning,
}

impl EventKind {
    /// Classify a raw response line by Klipper's `!!` / `//` conventions.
    pub fn classify(text: &str) -> Self {
        if text.starts_with("!!") {
            EventKind::Error
        } else if text.starts_with("// Warning") {
            EventKind::Warning
        } else {
            EventKind::Response
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub message: String,
    /// Epoch seconds; `None` when the source omitted it.
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
}
