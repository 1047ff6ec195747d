use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::api::PrinterApi;
use crate::entity::{list_entities, object_names, resolve_object, EntityCategory};
use crate::error::HandlerError;
use crate::model::{
    Endstops, Fan, GcodeCommand, Heater, Led, Macro, Pin, PrintStatus, PrinterStatus,
    TemperatureSensor, Toolhead,
};
use crate::parser::ParsedInvocation;
use crate::registry::{CommandContext, CommandOutput};
use crate::render;

const MACRO_GCODE_LIMIT: usize = 500;

// ── Entity queries ──────────────────────────────────────────────────

/// Status of one named object, matched against the printer's objects by
/// display name first. An object the printer doesn't report is an error.
fn fetch_one<T>(
    api: &dyn PrinterApi,
    category: EntityCategory,
    name: &str,
    build: fn(String, &Value) -> T,
) -> Result<T, HandlerError> {
    let object = resolve_object(api, category, name)?;
    let status = api.query_objects(&[object.as_str()])?;
    let data = status
        .get(&object)
        .ok_or_else(|| HandlerError::failed(format!("Unknown {}: {name}", category.slug())))?;
    Ok(build(name.to_string(), data))
}

/// Status of every object in the category, queried in one request.
fn fetch_all<T>(
    api: &dyn PrinterApi,
    category: EntityCategory,
    build: fn(String, &Value) -> T,
) -> Result<Vec<T>, HandlerError> {
    let objects = object_names(api, category)?;
    if objects.is_empty() {
        return Ok(Vec::new());
    }
    let refs: Vec<&str> = objects.iter().map(String::as_str).collect();
    let status = api.query_objects(&refs)?;
    debug!(category = category.slug(), count = objects.len(), "queried objects");
    Ok(objects
        .iter()
        .map(|obj| build(category.display_name(obj), status.get(obj).unwrap_or(&Value::Null)))
        .collect())
}

fn entity_command<T: serde::Serialize>(
    ctx: &CommandContext<'_>,
    inv: &ParsedInvocation,
    category: EntityCategory,
    build: fn(String, &Value) -> T,
    one: fn(&T) -> String,
    many: fn(&[T]) -> String,
) -> Result<CommandOutput, HandlerError> {
    let api = ctx.session.api();
    match inv.arg(0) {
        Some(name) => {
            let item = fetch_one(api, category, name, build)?;
            Ok(CommandOutput::data(one(&item), &item))
        }
        None => {
            let items = fetch_all(api, category, build)?;
            Ok(CommandOutput::data(many(&items), &items))
        }
    }
}

pub fn get_sensor(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    entity_command(
        ctx,
        inv,
        EntityCategory::Sensor,
        |name, s| TemperatureSensor::from_status(name, s),
        render::sensor,
        render::sensors,
    )
}

pub fn get_fan(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    entity_command(
        ctx,
        inv,
        EntityCategory::Fan,
        |name, s| Fan::from_status(name, s),
        render::fan,
        render::fans,
    )
}

pub fn get_led(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    entity_command(
        ctx,
        inv,
        EntityCategory::Led,
        |name, s| Led::from_status(name, s),
        render::led,
        render::leds,
    )
}

pub fn get_heater(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    entity_command(
        ctx,
        inv,
        EntityCategory::Heater,
        |name, s| Heater::from_status(name, s),
        render::heater,
        render::heaters,
    )
}

pub fn get_pin(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    entity_command(
        ctx,
        inv,
        EntityCategory::Pin,
        |name, s| Pin::from_status(name, s),
        render::pin,
        render::pins,
    )
}

// ── Macros ──────────────────────────────────────────────────────────

/// `params.NAME` references in a macro body, sorted and unique.
fn macro_parameters(gcode: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    for (at, _) in gcode.match_indices("params.") {
        let rest = gcode.get(at + "params.".len()..).unwrap_or_default();
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_')
            .collect();
        if name.starts_with(|c: char| c.is_ascii_uppercase() || c == '_') {
            found.insert(name);
        }
    }
    found.into_iter().collect()
}

fn truncate_gcode(gcode: &str) -> String {
    match gcode.char_indices().nth(MACRO_GCODE_LIMIT) {
        Some((cut, _)) => format!("{}...", gcode.get(..cut).unwrap_or(gcode)),
        None => gcode.to_string(),
    }
}

fn load_macro(api: &dyn PrinterApi, name: &str) -> Result<Macro, HandlerError> {
    let status = api.query_objects(&["configfile"])?;
    let settings = status
        .get("configfile")
        .and_then(|c| c.get("settings"))
        .cloned()
        .unwrap_or(Value::Null);

    let lower = name.to_lowercase();
    let (key, display) = match lower.strip_prefix("gcode_macro ") {
        Some(bare) => (lower.clone(), name.get(name.len().saturating_sub(bare.len())..).unwrap_or(bare)),
        None => (format!("gcode_macro {lower}"), name),
    };
    let config = settings
        .get(&key)
        .ok_or_else(|| HandlerError::failed(format!("Macro not found: {name}")))?;

    let gcode = config.get("gcode").and_then(Value::as_str).unwrap_or_default();
    Ok(Macro {
        name: display.to_string(),
        description: config
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters: macro_parameters(gcode),
        gcode: (!gcode.is_empty()).then(|| truncate_gcode(gcode)),
    })
}

pub fn get_macro(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let api = ctx.session.api();
    match inv.arg(0) {
        Some(name) => {
            let m = load_macro(api, name)?;
            Ok(CommandOutput::data(render::macro_detail(&m), &m))
        }
        None => {
            let names = list_entities(api, EntityCategory::Macro)?;
            Ok(CommandOutput::data(render::name_list(&names), &names))
        }
    }
}

// ── G-code help ─────────────────────────────────────────────────────

pub fn get_gcode(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let help = ctx.session.api().gcode_help()?;
    let Some(wanted) = inv.arg(0) else {
        let names: Vec<String> = help.into_keys().collect();
        return Ok(CommandOutput::data(render::name_list(&names), &names));
    };

    let found = help.get_key_value(wanted).or_else(|| {
        help.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
    });
    let (name, description) =
        found.ok_or_else(|| HandlerError::failed(format!("G-code command not found: {wanted}")))?;
    let command = GcodeCommand {
        name: name.clone(),
        description: description.clone(),
    };
    Ok(CommandOutput::data(render::gcode_command(&command), &command))
}

// ── Printer state ───────────────────────────────────────────────────

pub fn get_toolhead(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let status = ctx.session.api().query_objects(&["toolhead"])?;
    let toolhead = Toolhead::from_status(status.get("toolhead").unwrap_or(&Value::Null));
    Ok(CommandOutput::data(render::toolhead(&toolhead), &toolhead))
}

pub fn get_endstops(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let endstops = Endstops {
        endstops: ctx.session.api().endstops()?,
    };
    Ok(CommandOutput::data(render::endstops(&endstops), &endstops))
}

pub fn get_status(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let status = PrinterStatus::from_info(&ctx.session.api().printer_info()?);
    Ok(CommandOutput::data(render::printer_status(&status), &status))
}

pub fn get_print_status(
    ctx: &CommandContext<'_>,
    _inv: &ParsedInvocation,
) -> Result<CommandOutput, HandlerError> {
    let status = ctx
        .session
        .api()
        .query_objects(&["print_stats", "virtual_sdcard"])?;
    let null = Value::Null;
    let print = PrintStatus::from_status(
        status.get("print_stats").unwrap_or(&null),
        status.get("virtual_sdcard").unwrap_or(&null),
    );
    Ok(CommandOutput::data(render::print_status(&print), &print))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::api::mock::MockApi;
    use crate::parser::parse;
    use crate::registry::CommandRegistry;
    use crate::state::{test_session, Session};

    fn run(session: &Session, line: &str) -> Result<CommandOutput, HandlerError> {
        let registry = CommandRegistry::with_builtins().unwrap();
        let inv = parse(line).unwrap().unwrap();
        let descriptor = registry.resolve(&inv.command).unwrap();
        let ctx = CommandContext {
            session,
            registry: &registry,
        };
        (descriptor.handler)(&ctx, &inv)
    }

    fn printer() -> MockApi {
        let mut api = MockApi::with_objects(&[
            "extruder",
            "heater_bed",
            "temperature_sensor chamber",
            "fan",
            "fan_generic BedFans",
            "gcode_macro PRINT_START",
            "output_pin beeper",
        ]);
        api.set_status("extruder", json!({ "temperature": 210.3, "target": 210.0, "power": 0.5 }));
        api.set_status("heater_bed", json!({ "temperature": 60.1, "target": 60.0 }));
        api.set_status("temperature_sensor chamber", json!({ "temperature": 35.0 }));
        api.set_status("fan", json!({ "speed": 1.0 }));
        api.set_status("fan_generic BedFans", json!({ "speed": 0.5, "rpm": 1200.0 }));
        api.set_status("output_pin beeper", json!({ "value": 0.0 }));
        api.set_status(
            "configfile",
            json!({ "settings": { "gcode_macro print_start": {
                "description": "Start a print",
                "gcode": "M190 S{params.BED}\nM109 S{params.EXTRUDER}\n{% set b = params.BED %}",
            }}}),
        );
        api
    }

    fn session(api: MockApi) -> Session {
        test_session(Arc::new(api), PathBuf::from("/tmp"))
    }

    #[test]
    fn all_sensors_use_display_names() {
        let out = run(&session(printer()), "get_sensor").unwrap();
        let data = out.data.unwrap();
        let names: Vec<&str> = data
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["extruder", "heater_bed", "chamber"]);
    }

    #[test]
    fn single_fan_gets_default_prefix() {
        let out = run(&session(printer()), "get_fan BedFans").unwrap();
        assert_eq!(out.data.unwrap()["speed"], 0.5);
    }

    #[test]
    fn listed_names_resolve_under_any_prefix() {
        let mut api = MockApi::with_objects(&["heater_fan hotend_fan", "led chamber"]);
        api.set_status("heater_fan hotend_fan", json!({ "speed": 0.75 }));
        api.set_status("led chamber", json!({ "color_data": [[0.1, 0.2, 0.3, 0.0]] }));
        let session = session(api);

        let fan = run(&session, "get_fan hotend_fan").unwrap().data.unwrap();
        assert_eq!(fan["name"], "hotend_fan");
        assert_eq!(fan["speed"], 0.75);

        let led = run(&session, "get_led chamber").unwrap().data.unwrap();
        assert_eq!(led["name"], "chamber");
    }

    #[test]
    fn unknown_entity_fails() {
        let err = run(&session(printer()), "get_pin nothing").unwrap_err();
        assert_eq!(err.to_string(), "Unknown pin: nothing");
    }

    #[test]
    fn macro_detail_extracts_sorted_params() {
        let out = run(&session(printer()), "get_macro PRINT_START").unwrap();
        let data = out.data.unwrap();
        assert_eq!(data["name"], "PRINT_START");
        assert_eq!(data["description"], "Start a print");
        assert_eq!(data["parameters"], json!(["BED", "EXTRUDER"]));
        assert!(out.message.contains("run PRINT_START BED=<value> EXTRUDER=<value>"));
    }

    #[test]
    fn missing_macro() {
        let err = run(&session(printer()), "get_macro NOPE").unwrap_err();
        assert_eq!(err.to_string(), "Macro not found: NOPE");
    }

    #[test]
    fn macro_list_without_name() {
        let out = run(&session(printer()), "get_macro").unwrap();
        assert_eq!(out.message, "Found 1 items:\n  PRINT_START");
    }

    #[test]
    fn long_macro_bodies_are_truncated() {
        let body = "G1 X1\n".repeat(200);
        let cut = truncate_gcode(&body);
        assert_eq!(cut.chars().count(), MACRO_GCODE_LIMIT + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_gcode("G28"), "G28");
    }

    #[test]
    fn gcode_lookup_ignores_case() {
        let mut api = printer();
        api.help.insert("SET_FAN_SPEED".into(), "Set a fan speed".into());
        let session = session(api);
        let out = run(&session, "get_gcode set_fan_speed").unwrap();
        assert_eq!(out.data.unwrap()["name"], "SET_FAN_SPEED");
        let err = run(&session, "get_gcode NOPE").unwrap_err();
        assert_eq!(err.to_string(), "G-code command not found: NOPE");
    }

    #[test]
    fn status_and_print_status() {
        let mut api = printer();
        api.printer_info = json!({ "state": "ready", "state_message": "Printer is ready" });
        api.set_status("print_stats", json!({ "state": "printing", "filename": "cube.gcode" }));
        api.set_status("virtual_sdcard", json!({ "progress": 0.5 }));
        let session = session(api);
        assert_eq!(run(&session, "get_status").unwrap().data.unwrap()["state"], "ready");
        let print = run(&session, "get_print_status").unwrap().data.unwrap();
        assert_eq!(print["filename"], "cube.gcode");
        assert_eq!(print["progress"], 0.5);
    }
}
