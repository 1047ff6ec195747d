//! Write commands that drive the printer through G-code or dedicated
//! endpoints.

use tracing::warn;

use super::common::{gcode_number, integer, number, required_arg, required_number, send};
use crate::entity::{list_entities, EntityCategory};
use crate::error::HandlerError;
use crate::parser::ParsedInvocation;
use crate::registry::{CommandContext, CommandOutput};

const DEFAULT_FEEDRATE: i64 = 300;
const GCODE_PREVIEW: usize = 20;

pub fn set_fan(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let name = required_arg(inv, 0, "NAME")?;
    let speed = required_number(inv, "SPEED")?;

    // The part-cooling fan is driven with M106/M107; everything else by name.
    let script = match name {
        "fan" | "part_cooling" if speed == 0.0 => "M107".to_string(),
        "fan" | "part_cooling" => format!("M106 S{}", (speed * 255.0) as u32),
        _ => format!("SET_FAN_SPEED FAN={name} SPEED={}", gcode_number(speed)),
    };
    send(ctx, &script)?;
    Ok(CommandOutput::new(format!(
        "Set {name} speed to {}",
        gcode_number(speed)
    )))
}

pub fn set_led(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let name = required_arg(inv, 0, "NAME")?;
    let red = required_number(inv, "RED")?;
    let green = required_number(inv, "GREEN")?;
    let blue = required_number(inv, "BLUE")?;
    let white = number(inv, "WHITE")?.unwrap_or(0.0);
    let index = integer(inv, "INDEX")?;

    let (r, g, b) = (gcode_number(red), gcode_number(green), gcode_number(blue));
    let mut script = format!("SET_LED LED={name} RED={r} GREEN={g} BLUE={b}");
    if white > 0.0 {
        script.push_str(&format!(" WHITE={}", gcode_number(white)));
    }
    if let Some(index) = index {
        script.push_str(&format!(" INDEX={index}"));
    }
    send(ctx, &script)?;
    Ok(CommandOutput::new(format!(
        "Set {name} color to R={r} G={g} B={b}"
    )))
}

pub fn set_heater(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let name = required_arg(inv, 0, "NAME")?;
    let temp = gcode_number(required_number(inv, "TEMP")?);

    let script = match name {
        "extruder" | "hotend" => format!("M104 S{temp}"),
        "heater_bed" | "bed" => format!("M140 S{temp}"),
        _ => format!("SET_HEATER_TEMPERATURE HEATER={name} TARGET={temp}"),
    };
    send(ctx, &script)?;
    Ok(CommandOutput::new(format!(
        "Set {name} target temperature to {temp}°C"
    )))
}

pub fn set_pin(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let name = required_arg(inv, 0, "NAME")?;
    let value = gcode_number(required_number(inv, "VALUE")?);
    send(ctx, &format!("SET_PIN PIN={name} VALUE={value}"))?;
    Ok(CommandOutput::new(format!("Set {name} to {value}")))
}

pub fn home(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let mut axes: Vec<String> = Vec::with_capacity(inv.positional.len());
    for raw in &inv.positional {
        let axis = raw.to_ascii_uppercase();
        if !matches!(axis.as_str(), "X" | "Y" | "Z") {
            return Err(HandlerError::invalid("AXES", raw, "expected X, Y or Z"));
        }
        if !axes.contains(&axis) {
            axes.push(axis);
        }
    }

    if axes.is_empty() {
        send(ctx, "G28")?;
        return Ok(CommandOutput::new("Homing all axes"));
    }
    send(ctx, &format!("G28 {}", axes.join(" ")))?;
    Ok(CommandOutput::new(format!("Homing {}", axes.join(", "))))
}

pub fn extrude(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let amount = required_number(inv, "AMOUNT")?;
    if amount == 0.0 {
        return Err(HandlerError::invalid("AMOUNT", 0, "must not be zero"));
    }
    let feedrate = integer(inv, "FEEDRATE")?.unwrap_or(DEFAULT_FEEDRATE);
    if feedrate <= 0 {
        return Err(HandlerError::invalid("FEEDRATE", feedrate, "must be positive"));
    }

    // Relative extrusion for the move, then back to absolute even if the
    // move itself failed.
    send(ctx, "M83")?;
    let moved = send(ctx, &format!("G1 E{} F{feedrate}", gcode_number(amount)));
    let restored = send(ctx, "M82");
    moved?;
    restored?;

    let action = if amount > 0.0 { "Extruding" } else { "Retracting" };
    Ok(CommandOutput::new(format!(
        "{action} {}mm at {feedrate}mm/min",
        gcode_number(amount.abs())
    )))
}

/// `<words...> KEY=VALUE...` in input order.
fn build_script<'a>(words: impl Iterator<Item = &'a String>, inv: &ParsedInvocation) -> String {
    words
        .cloned()
        .chain(inv.keyword.iter().map(|(k, v)| format!("{k}={v}")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn executed(script: &str, response: String) -> CommandOutput {
    if response.trim().is_empty() {
        CommandOutput::new(format!("Executed: {script}"))
    } else {
        CommandOutput::new(response)
    }
}

pub fn run_gcode(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    if inv.positional.is_empty() {
        let commands: Vec<String> = ctx.session.api().gcode_help()?.into_keys().collect();
        if commands.is_empty() {
            return Ok(CommandOutput::new("No G-code commands available"));
        }
        let mut lines = vec!["Available G-code commands (use 'get_gcode <cmd>' for help):".to_string()];
        lines.extend(commands.iter().take(GCODE_PREVIEW).map(|c| format!("  {c}")));
        if commands.len() > GCODE_PREVIEW {
            lines.push(format!("  ... and {} more", commands.len() - GCODE_PREVIEW));
        }
        return Ok(CommandOutput::data(lines.join("\n"), &commands));
    }

    let script = build_script(inv.positional.iter(), inv);
    let response = send(ctx, &script)?;
    Ok(executed(&script, response))
}

pub fn run_macro(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let Some(name) = inv.positional.first() else {
        let macros = list_entities(ctx.session.api(), EntityCategory::Macro)?;
        if macros.is_empty() {
            return Ok(CommandOutput::new("No macros available"));
        }
        let mut lines = vec!["Available macros:".to_string()];
        lines.extend(macros.iter().map(|m| format!("  {m}")));
        return Ok(CommandOutput::data(lines.join("\n"), &macros));
    };

    let script = build_script(std::iter::once(name), inv);
    let response = send(ctx, &script)?;
    Ok(executed(&script, response))
}

pub fn emergency_stop(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    warn!("emergency stop requested");
    ctx.session.api().emergency_stop()?;
    Ok(CommandOutput::new("Emergency stop sent"))
}

pub fn restart(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    ctx.session.api().restart()?;
    Ok(CommandOutput::new("Restart requested"))
}

pub fn firmware_restart(
    ctx: &CommandContext<'_>,
    _inv: &ParsedInvocation,
) -> Result<CommandOutput, HandlerError> {
    ctx.session.api().firmware_restart()?;
    Ok(CommandOutput::new("Firmware restart requested"))
}
