//! Plain-text rendering of printer models. Handlers put the rendered text in
//! `CommandOutput::message` and the model itself in `CommandOutput::data`.

use crate::console::ConsoleEvent;
use crate::model::{
    Directory, Endstops, Fan, GcodeCommand, GcodeFile, Heater, Led, Macro, Pin, PrintStatus,
    PrinterStatus, TemperatureSensor, Toolhead,
};
use crate::util::{format_clock, format_datetime, format_duration, format_size};

const NO_ITEMS: &str = "No items";
const PROGRESS_BAR_WIDTH: usize = 30;

fn celsius(v: f64) -> String {
    format!("{v:.1}°C")
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

fn opt(v: Option<f64>, f: impl Fn(f64) -> String) -> String {
    v.map_or_else(|| "-".to_string(), f)
}

fn pad_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Left-aligned text table with a title line and a header rule.
pub fn table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let mut lines = vec![title.to_string()];
    lines.push(pad_row(headers.iter().copied(), &widths));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(pad_row(row.iter().map(String::as_str), &widths));
    }
    lines.join("\n")
}

/// Bare list of names (macros, G-code commands, local entries).
pub fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        return NO_ITEMS.to_string();
    }
    let mut lines = vec![format!("Found {} items:", names.len())];
    lines.extend(names.iter().map(|n| format!("  {n}")));
    lines.join("\n")
}

// ── Sensors, fans, LEDs, heaters, pins ──────────────────────────────

pub fn sensors(sensors: &[TemperatureSensor]) -> String {
    if sensors.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = sensors
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                celsius(s.temperature),
                opt(s.measured_min_temp, celsius),
                opt(s.measured_max_temp, celsius),
                opt(s.target, celsius),
                opt(s.power, percent),
            ]
        })
        .collect();
    table(
        "Temperature Sensors",
        &["Name", "Temperature", "Min", "Max", "Target", "Power"],
        &rows,
    )
}

pub fn sensor(s: &TemperatureSensor) -> String {
    let mut lines = vec![s.name.clone(), format!("  Temperature: {}", celsius(s.temperature))];
    if let Some(v) = s.measured_min_temp {
        lines.push(format!("  Min: {}", celsius(v)));
    }
    if let Some(v) = s.measured_max_temp {
        lines.push(format!("  Max: {}", celsius(v)));
    }
    if let Some(v) = s.target {
        lines.push(format!("  Target: {}", celsius(v)));
    }
    if let Some(v) = s.power {
        lines.push(format!("  Power: {}", percent(v)));
    }
    lines.join("\n")
}

pub fn fans(fans: &[Fan]) -> String {
    if fans.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = fans
        .iter()
        .map(|f| {
            vec![
                f.name.clone(),
                percent(f.speed),
                opt(f.rpm, |r| format!("{r:.0}")),
            ]
        })
        .collect();
    table("Fans", &["Name", "Speed", "RPM"], &rows)
}

pub fn fan(f: &Fan) -> String {
    let mut lines = vec![f.name.clone(), format!("  Speed: {}", percent(f.speed))];
    if let Some(rpm) = f.rpm {
        lines.push(format!("  RPM: {rpm:.0}"));
    }
    lines.join("\n")
}

fn led_colors(data: &[Vec<f64>]) -> String {
    data.iter()
        .map(|c| {
            let channels: Vec<String> = c.iter().map(|v| format!("{v:.2}")).collect();
            format!("({})", channels.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn leds(leds: &[Led]) -> String {
    if leds.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = leds
        .iter()
        .map(|l| {
            let status = match &l.color_data {
                Some(d) if !d.is_empty() => "configured",
                _ => "off",
            };
            vec![l.name.clone(), status.to_string()]
        })
        .collect();
    table("LEDs", &["Name", "Status"], &rows)
}

pub fn led(l: &Led) -> String {
    match &l.color_data {
        Some(d) if !d.is_empty() => format!("{}\n  Color data: {}", l.name, led_colors(d)),
        _ => format!("{}\n  Status: off", l.name),
    }
}

pub fn heaters(heaters: &[Heater]) -> String {
    if heaters.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = heaters
        .iter()
        .map(|h| {
            vec![
                h.name.clone(),
                celsius(h.temperature),
                if h.target > 0.0 { celsius(h.target) } else { "-".into() },
                percent(h.power),
            ]
        })
        .collect();
    table("Heaters", &["Name", "Temperature", "Target", "Power"], &rows)
}

pub fn heater(h: &Heater) -> String {
    [
        h.name.clone(),
        format!("  Temperature: {}", celsius(h.temperature)),
        format!("  Target: {}", celsius(h.target)),
        format!("  Power: {}", percent(h.power)),
    ]
    .join("\n")
}

pub fn pins(pins: &[Pin]) -> String {
    if pins.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = pins
        .iter()
        .map(|p| vec![p.name.clone(), format!("{:.2}", p.value)])
        .collect();
    table("Output Pins", &["Name", "Value"], &rows)
}

pub fn pin(p: &Pin) -> String {
    format!("{}\n  Value: {:.2}", p.name, p.value)
}

// ── Macros and G-code help ──────────────────────────────────────────

pub fn macro_detail(m: &Macro) -> String {
    let mut lines = vec![format!("Macro: {}", m.name)];
    if let Some(desc) = &m.description {
        lines.push(format!("Description: {desc}"));
    }
    if m.parameters.is_empty() {
        lines.push("Parameters: None".into());
    } else {
        lines.push("Parameters:".into());
        lines.extend(m.parameters.iter().map(|p| format!("  - {p}")));
    }
    let example: Vec<String> = m
        .parameters
        .iter()
        .take(3)
        .map(|p| format!("{p}=<value>"))
        .collect();
    lines.push("Usage:".into());
    if example.is_empty() {
        lines.push(format!("  run {}", m.name));
    } else {
        lines.push(format!("  run {} {}", m.name, example.join(" ")));
    }
    if let Some(gcode) = &m.gcode {
        let body: Vec<&str> = gcode.trim().lines().collect();
        if !body.is_empty() {
            lines.push("G-code:".into());
            lines.extend(
                body.iter()
                    .take(5)
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| format!("  {l}")),
            );
            if body.len() > 5 {
                lines.push(format!("  ... ({} lines total)", body.len()));
            }
        }
    }
    lines.join("\n")
}

pub fn gcode_command(c: &GcodeCommand) -> String {
    format!(
        "G-code: {}\nDescription: {}\nUsage:\n  run_gcode {}",
        c.name, c.description, c.name
    )
}

// ── Printer state ───────────────────────────────────────────────────

pub fn toolhead(t: &Toolhead) -> String {
    let homed = if t.homed_axes.is_empty() {
        "Not homed".to_string()
    } else {
        let axes: Vec<String> = t
            .homed_axes
            .chars()
            .map(|c| c.to_ascii_uppercase().to_string())
            .collect();
        format!("Homed: {}", axes.join(", "))
    };
    let mut lines = vec!["Toolhead Status".to_string(), format!("  {homed}"), "Position:".into()];
    for (i, axis) in ["X", "Y", "Z", "E"].iter().enumerate() {
        lines.push(format!("  {axis}: {:.2} mm", t.axis(i)));
    }
    lines.join("\n")
}

pub fn endstops(e: &Endstops) -> String {
    if e.endstops.is_empty() {
        return "Endstop Status\n  No endstops found".to_string();
    }
    let rows: Vec<Vec<String>> = e
        .endstops
        .iter()
        .map(|(name, state)| vec![name.clone(), state.clone()])
        .collect();
    table("Endstop Status", &["Endstop", "State"], &rows)
}

pub fn printer_status(s: &PrinterStatus) -> String {
    let mut lines = vec![
        "Printer Status".to_string(),
        format!("  State: {}", s.state.to_uppercase()),
    ];
    if !s.state_message.is_empty() {
        lines.push(format!("  Message: {}", s.state_message.trim_end()));
    }
    lines.join("\n")
}

pub fn print_status(p: &PrintStatus) -> String {
    let mut lines = vec![
        "Print Status".to_string(),
        format!("  State: {}", p.state.to_uppercase()),
    ];
    if !p.filename.is_empty() {
        lines.push(format!("  File: {}", p.filename));
    }
    if matches!(p.state.as_str(), "printing" | "paused") && p.progress > 0.0 {
        lines.push(format!("  Progress: {:.1}%", p.progress * 100.0));
        let filled = ((PROGRESS_BAR_WIDTH as f64) * p.progress.clamp(0.0, 1.0)) as usize;
        lines.push(format!(
            "  [{}{}]",
            "#".repeat(filled),
            ".".repeat(PROGRESS_BAR_WIDTH - filled)
        ));
    }
    if p.print_duration > 0.0 || p.total_duration > 0.0 {
        lines.push("Timing:".into());
        if p.print_duration > 0.0 {
            lines.push(format!("  Print time: {}", format_duration(p.print_duration)));
        }
        if p.total_duration > 0.0 {
            lines.push(format!("  Total time: {}", format_duration(p.total_duration)));
        }
        if p.state == "printing" {
            if let Some(remaining) = p.remaining_secs() {
                lines.push(format!("  Remaining: ~{}", format_duration(remaining)));
            }
        }
    }
    if p.filament_used > 0.0 {
        lines.push(format!("Filament used: {:.2} m", p.filament_used / 1000.0));
    }
    if !p.message.is_empty() {
        lines.push(format!("Message: {}", p.message));
    }
    lines.join("\n")
}

// ── Files ───────────────────────────────────────────────────────────

fn estimate(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

pub fn gcode_files(files: &[GcodeFile]) -> String {
    if files.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = files
        .iter()
        .map(|f| {
            vec![
                f.filename.clone(),
                format_size(f.size),
                opt(f.estimated_time, estimate),
                format_datetime(f.modified),
            ]
        })
        .collect();
    table("G-code Files", &["Filename", "Size", "Est. Time", "Modified"], &rows)
}

pub fn gcode_file(f: &GcodeFile) -> String {
    let mut lines = vec![
        format!("File: {}", f.filename),
        format!("  Size: {}", format_size(f.size)),
        format!("  Modified: {}", format_datetime(f.modified)),
    ];
    if let Some(t) = f.estimated_time {
        lines.push(format!("  Estimated time: {}", estimate(t)));
    }
    if let Some(mm) = f.filament_total {
        lines.push(format!("  Filament: {:.2} m", mm / 1000.0));
    }
    if let Some(h) = f.first_layer_height {
        lines.push(format!("  First layer height: {h} mm"));
    }
    if let Some(h) = f.layer_height {
        lines.push(format!("  Layer height: {h} mm"));
    }
    if let Some(h) = f.object_height {
        lines.push(format!("  Object height: {h} mm"));
    }
    if let Some(slicer) = &f.slicer {
        lines.push(format!("  Slicer: {slicer}"));
    }
    lines.join("\n")
}

pub fn directories(dirs: &[Directory]) -> String {
    if dirs.is_empty() {
        return NO_ITEMS.to_string();
    }
    let rows: Vec<Vec<String>> = dirs
        .iter()
        .map(|d| {
            vec![
                d.dirname.clone(),
                format_size(d.size),
                format_datetime(d.modified),
                d.permissions.clone().unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    table("Directories", &["Directory", "Size", "Modified", "Permissions"], &rows)
}

// ── Console ─────────────────────────────────────────────────────────

/// `[HH:MM:SS] text`
pub fn console_line(event: &ConsoleEvent) -> String {
    format!("[{}] {}", format_clock(event.timestamp), event.text)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_columns() {
        let out = table(
            "Fans",
            &["Name", "Speed"],
            &[vec!["BedFans".into(), "50%".into()], vec!["fan".into(), "0%".into()]],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["Fans", "Name     Speed", "-------  -----", "BedFans  50%", "fan      0%"]);
    }

    #[test]
    fn empty_lists_say_no_items() {
        assert_eq!(fans(&[]), "No items");
        assert_eq!(name_list(&[]), "No items");
    }

    #[test]
    fn macro_usage_example_uses_first_three_params() {
        let m = Macro {
            name: "PRINT_START".into(),
            description: Some("Start".into()),
            parameters: vec!["BED".into(), "CHAMBER".into(), "EXTRUDER".into(), "SIZE".into()],
            gcode: None,
        };
        let out = macro_detail(&m);
        assert!(out.ends_with("  run PRINT_START BED=<value> CHAMBER=<value> EXTRUDER=<value>"));
        assert!(out.contains("  - SIZE"));
    }

    #[test]
    fn toolhead_lists_homed_axes() {
        let t = Toolhead {
            homed_axes: "xyz".into(),
            position: vec![1.0, 2.0, 3.0, 4.0],
            print_time: 0.0,
            estimated_print_time: 0.0,
        };
        let out = toolhead(&t);
        assert!(out.contains("Homed: X, Y, Z"));
        assert!(out.contains("Z: 3.00 mm"));
    }

    #[test]
    fn print_progress_bar_only_while_printing() {
        let mut p = PrintStatus::from_status(
            &serde_json::json!({ "state": "printing", "print_duration": 60.0 }),
            &serde_json::json!({ "progress": 0.5 }),
        );
        assert!(print_status(&p).contains("Progress: 50.0%"));
        assert!(print_status(&p).contains("Remaining: ~0:01:00"));
        p.state = "complete".into();
        assert!(!print_status(&p).contains("Progress"));
    }
}
