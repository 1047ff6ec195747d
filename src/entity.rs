//! Entity categories and Klipper object-name rules.
//!
//! Klipper names most objects `<type> <name>` (`fan_generic BedFans`,
//! `output_pin case_light`). Users type the bare name; display strips the
//! type prefix and lookups add the category's default prefix back.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::PrinterApi;
use crate::error::ApiError;
use crate::paths::GCODES_ROOT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Sensor,
    Fan,
    Led,
    Macro,
    Heater,
    Pin,
    GcodeCommand,
    GcodeFile,
}

impl EntityCategory {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Fan => "fan",
            Self::Led => "led",
            Self::Macro => "macro",
            Self::Heater => "heater",
            Self::Pin => "pin",
            Self::GcodeCommand => "gcode",
            Self::GcodeFile => "file",
        }
    }

    pub fn all() -> &'static [EntityCategory] {
        &[
            Self::Sensor,
            Self::Fan,
            Self::Led,
            Self::Macro,
            Self::Heater,
            Self::Pin,
            Self::GcodeCommand,
            Self::GcodeFile,
        ]
    }

    /// Parse a category slug; a trailing `s` is accepted (`fans`, `files`).
    pub fn from_slug(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        Self::all()
            .iter()
            .copied()
            .find(|c| c.slug() == lower || c.slug() == singular)
    }

    /// Object-type prefixes (with the separating space) owned by this category.
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Sensor => &["temperature_sensor ", "temperature_host "],
            Self::Fan => &["fan_generic ", "heater_fan ", "controller_fan "],
            Self::Led => &["neopixel ", "led ", "dotstar "],
            Self::Macro => &["gcode_macro "],
            Self::Heater => &["heater_generic "],
            Self::Pin => &["output_pin "],
            Self::GcodeCommand | Self::GcodeFile => &[],
        }
    }

    /// Unprefixed objects that belong to the category.
    fn is_bare_member(&self, obj: &str) -> bool {
        match self {
            Self::Sensor => obj == "extruder" || obj == "heater_bed",
            Self::Fan => obj == "fan",
            Self::Heater => obj == "heater_bed" || is_extruder(obj),
            _ => false,
        }
    }

    /// Whether names come from `printer/objects/list`.
    pub fn is_printer_object(&self) -> bool {
        !matches!(self, Self::GcodeCommand | Self::GcodeFile)
    }

    pub fn matches_object(&self, obj: &str) -> bool {
        self.is_bare_member(obj) || self.prefixes().iter().any(|p| obj.starts_with(p))
    }

    /// Display name: the object name with its type prefix removed.
    pub fn display_name(&self, obj: &str) -> String {
        self.prefixes()
            .iter()
            .find_map(|p| obj.strip_prefix(p))
            .unwrap_or(obj)
            .to_string()
    }

    /// Full object name for a user-typed name: kept when it already carries a
    /// known prefix or is a bare member, otherwise the default prefix is added.
    pub fn object_name(&self, name: &str) -> String {
        if self.matches_object(name) {
            return name.to_string();
        }
        match self {
            Self::Sensor => format!("temperature_sensor {name}"),
            Self::Fan => format!("fan_generic {name}"),
            Self::Led => format!("neopixel {name}"),
            Self::Macro => format!("gcode_macro {name}"),
            Self::Heater if name.starts_with("extruder") => name.to_string(),
            Self::Heater => format!("heater_generic {name}"),
            Self::Pin => format!("output_pin {name}"),
            Self::GcodeCommand | Self::GcodeFile => name.to_string(),
        }
    }
}

/// `extruder`, `extruder1`, `extruder2`, ... but not `extruder_stepper x`.
fn is_extruder(obj: &str) -> bool {
    obj.strip_prefix("extruder")
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

/// Full object names of every printer object in `category`.
pub fn object_names(
    api: &dyn PrinterApi,
    category: EntityCategory,
) -> Result<Vec<String>, ApiError> {
    Ok(api
        .list_objects()?
        .into_iter()
        .filter(|obj| category.matches_object(obj))
        .collect())
}

/// Full object name for a user-typed name. A listed object whose display
/// name or full name matches wins, so `hotend_fan` finds `heater_fan
/// hotend_fan`; otherwise the default prefix rule applies.
pub fn resolve_object(
    api: &dyn PrinterApi,
    category: EntityCategory,
    name: &str,
) -> Result<String, ApiError> {
    let listed = object_names(api, category)?
        .into_iter()
        .find(|obj| obj == name || category.display_name(obj) == name);
    Ok(listed.unwrap_or_else(|| category.object_name(name)))
}

/// User-facing names for `category`, de-duplicated in first-seen order.
pub fn list_entities(
    api: &dyn PrinterApi,
    category: EntityCategory,
) -> Result<Vec<String>, ApiError> {
    let raw: Vec<String> = match category {
        EntityCategory::GcodeCommand => api.gcode_help()?.into_keys().collect(),
        EntityCategory::GcodeFile => api
            .list_files(GCODES_ROOT)?
            .into_iter()
            .map(|f| f.filename)
            .collect(),
        _ => object_names(api, category)?
            .iter()
            .map(|obj| category.display_name(obj))
            .collect(),
    };

    let mut names: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    debug!(category = category.slug(), count = names.len(), "listed entities");
    Ok(names)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;

    #[test]
    fn prefix_rules() {
        assert_eq!(EntityCategory::Fan.object_name("BedFans"), "fan_generic BedFans");
        assert_eq!(EntityCategory::Fan.object_name("fan"), "fan");
        assert_eq!(
            EntityCategory::Fan.object_name("heater_fan hotend_fan"),
            "heater_fan hotend_fan"
        );
        assert_eq!(EntityCategory::Heater.object_name("extruder1"), "extruder1");
        assert_eq!(EntityCategory::Heater.object_name("chamber"), "heater_generic chamber");
        assert_eq!(EntityCategory::Sensor.object_name("heater_bed"), "heater_bed");
        assert_eq!(EntityCategory::Pin.object_name("beeper"), "output_pin beeper");
        assert_eq!(EntityCategory::Led.object_name("sb_leds"), "neopixel sb_leds");
    }

    #[test]
    fn display_strips_prefix() {
        assert_eq!(EntityCategory::Fan.display_name("controller_fan mcu"), "mcu");
        assert_eq!(EntityCategory::Sensor.display_name("extruder"), "extruder");
        assert_eq!(EntityCategory::Macro.display_name("gcode_macro PRINT_START"), "PRINT_START");
    }

    #[test]
    fn extruder_membership() {
        assert!(EntityCategory::Heater.matches_object("extruder"));
        assert!(EntityCategory::Heater.matches_object("extruder2"));
        assert!(!EntityCategory::Heater.matches_object("extruder_stepper belt"));
    }

    #[test]
    fn slugs_round_trip_with_plurals() {
        assert_eq!(EntityCategory::from_slug("fans"), Some(EntityCategory::Fan));
        assert_eq!(EntityCategory::from_slug("LED"), Some(EntityCategory::Led));
        assert_eq!(EntityCategory::from_slug("files"), Some(EntityCategory::GcodeFile));
        assert_eq!(EntityCategory::from_slug("gcode"), Some(EntityCategory::GcodeCommand));
        assert_eq!(EntityCategory::from_slug("toaster"), None);
    }

    #[test]
    fn resolve_prefers_listed_objects() {
        let api = MockApi::with_objects(&[
            "fan",
            "heater_fan hotend_fan",
            "controller_fan mcu",
            "led chamber",
        ]);
        assert_eq!(
            resolve_object(&api, EntityCategory::Fan, "hotend_fan").unwrap(),
            "heater_fan hotend_fan"
        );
        assert_eq!(resolve_object(&api, EntityCategory::Fan, "fan").unwrap(), "fan");
        assert_eq!(
            resolve_object(&api, EntityCategory::Fan, "controller_fan mcu").unwrap(),
            "controller_fan mcu"
        );
        assert_eq!(resolve_object(&api, EntityCategory::Led, "chamber").unwrap(), "led chamber");
        assert_eq!(
            resolve_object(&api, EntityCategory::Fan, "missing").unwrap(),
            "fan_generic missing"
        );
    }

    #[test]
    fn list_entities_filters_and_dedups() {
        let api = MockApi::with_objects(&[
            "fan",
            "fan_generic BedFans",
            "heater_fan hotend_fan",
            "output_pin beeper",
            "fan_generic BedFans",
        ]);
        let fans = list_entities(&api, EntityCategory::Fan).unwrap();
        assert_eq!(fans, vec!["fan", "BedFans", "hotend_fan"]);
    }
}
