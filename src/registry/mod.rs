pub mod catalog;
pub mod handlers;
pub mod params;
pub mod validation;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::entity::EntityCategory;
use crate::error::{HandlerError, ShellError};
use crate::parser::ParsedInvocation;
use crate::state::Session;
use crate::util::levenshtein;

use params::{ArgCompletion, ParamSpec, ParamStyle, ValueKind};

// ── Handler modules (dispatch targets) ──────────────────────────
use handlers::{control, files, local, query, session};

// ── Command metadata ────────────────────────────────────────────

/// Read/write classification. Metadata for help and display only; every
/// class goes through the same dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Read,
    Write,
    Utility,
}

impl Classification {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Utility => "utility",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Read => "Inspect printer state and files",
            Self::Write => "Change printer state, run G-code, manage files",
            Self::Utility => "Shell navigation, help and session commands",
        }
    }

    pub fn all() -> &'static [Classification] {
        &[Self::Read, Self::Write, Self::Utility]
    }
}

// ── Command output ──────────────────────────────────────────────

/// What the REPL should do after rendering a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Continue,
    Exit,
    EnterConsole,
}

/// Result of executing a command. `message` is the rendered text, `data`
/// carries the structured value for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip)]
    pub flow: Flow,
}

impl CommandOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
            flow: Flow::Continue,
        }
    }

    pub fn data(message: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            message: message.into(),
            data: serde_json::to_value(data).ok(),
            flow: Flow::Continue,
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }
}

// ── Descriptors ─────────────────────────────────────────────────

/// What every handler receives besides its invocation.
pub struct CommandContext<'a> {
    pub session: &'a Session,
    pub registry: &'a CommandRegistry,
}

pub type Handler =
    fn(&CommandContext<'_>, &ParsedInvocation) -> Result<CommandOutput, HandlerError>;

#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub classification: Classification,
    pub params: Vec<ParamSpec>,
    /// Completion source for the first positional argument.
    pub completes: Option<ArgCompletion>,
    /// Accept arbitrary `KEY=VALUE` pairs (forwarded to G-code/macros).
    pub open_keywords: bool,
    pub usage: &'static str,
    pub description: &'static str,
    pub handler: Handler,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("classification", &self.classification)
            .field("params", &self.params)
            .field("completes", &self.completes)
            .field("open_keywords", &self.open_keywords)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CommandDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.classification == other.classification
            && self.params == other.params
            && self.completes == other.completes
            && self.open_keywords == other.open_keywords
            && self.usage == other.usage
            && self.description == other.description
    }
}

impl CommandDescriptor {
    pub fn keyword(&self, key: &str) -> Option<&ParamSpec> {
        self.params
            .iter()
            .find(|p| p.style == ParamStyle::Keyword && p.key == key)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.style == ParamStyle::Keyword)
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        match self.completes {
            Some(ArgCompletion::Entity(category)) => Some(category),
            _ => None,
        }
    }
}

// ── Registry ────────────────────────────────────────────────────

/// Name → descriptor lookup. Built once at startup, then shared read-only.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandDescriptor>,
}

const MAX_SUGGESTIONS: usize = 3;

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin command.
    pub fn with_builtins() -> Result<Self, ShellError> {
        let mut registry = Self::new();
        for descriptor in builtin_commands() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), ShellError> {
        if self.commands.contains_key(descriptor.name) {
            return Err(ShellError::DuplicateCommand {
                name: descriptor.name.to_string(),
            });
        }
        self.commands.insert(descriptor.name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Exact, case-sensitive lookup; `NotFound` carries up to three suggestions.
    pub fn resolve(&self, name: &str) -> Result<&CommandDescriptor, ShellError> {
        self.get(name).ok_or_else(|| ShellError::NotFound {
            name: name.to_string(),
            suggestions: self.suggest(name),
        })
    }

    /// Sorted command names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Names that extend `input` or lie within a small edit distance of it,
    /// prefix matches first, then by distance.
    pub fn suggest(&self, input: &str) -> Vec<String> {
        if input.is_empty() {
            return Vec::new();
        }
        let lower = input.to_ascii_lowercase();
        let threshold = (lower.chars().count() / 3).max(2);
        let mut scored: Vec<(bool, usize, &str)> = self
            .names()
            .filter_map(|name| {
                let prefix = name.starts_with(&lower);
                let distance = levenshtein(&lower, name);
                (prefix || distance <= threshold).then_some((!prefix, distance, name))
            })
            .collect();
        scored.sort_unstable();
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, _, name)| name.to_string())
            .collect()
    }
}

// ── define_commands! macro ──────────────────────────────────────

/// Single source of truth for the builtin command table. Each entry gives
/// the classification (plus an optional `@completion` source and flags), the
/// name, the handler, the parameter schema, a usage line and a description.
/// Generates `builtin_commands()`.
macro_rules! define_commands {
    (
        $(
            [ $class:ident $( @ $comp:ident $( ( $cat:ident ) )? )? $(, $flag:ident)* ]
            $name:literal => $handler:path {
                $( $style:ident $pkey:ident : $kind:ident $( ( $req:ident ) )? ),* $(,)?
            }
            $usage:literal : $desc:literal ;
        )*
    ) => {
        pub fn builtin_commands() -> Vec<CommandDescriptor> {
            vec![
                $( CommandDescriptor {
                    name: $name,
                    classification: Classification::$class,
                    params: vec![
                        $( ParamSpec {
                            key: stringify!($pkey),
                            style: define_commands!(@style $style),
                            kind: ValueKind::$kind,
                            required: define_commands!(@has_flag required; $($req)?),
                        }, )*
                    ],
                    completes: define_commands!(@complete $( $comp $( ($cat) )? )?),
                    open_keywords: define_commands!(@has_flag open_keywords; $($flag)*),
                    usage: $usage,
                    description: $desc,
                    handler: $handler,
                }, )*
            ]
        }
    };

    (@style arg) => { ParamStyle::Positional };
    (@style key) => { ParamStyle::Keyword };

    (@complete) => { None };
    (@complete entity ($cat:ident)) => { Some(ArgCompletion::Entity(EntityCategory::$cat)) };
    (@complete axes) => { Some(ArgCompletion::Axes) };
    (@complete local_path) => { Some(ArgCompletion::LocalPath) };

    // Flag helpers. Literal tokens match before metavariables, so the named
    // flag matches the first arm and any other ident recurses.
    (@has_flag required; required $($rest:ident)*) => { true };
    (@has_flag required; $_other:ident $($rest:ident)*) => { define_commands!(@has_flag required; $($rest)*) };
    (@has_flag required;) => { false };

    (@has_flag open_keywords; open_keywords $($rest:ident)*) => { true };
    (@has_flag open_keywords; $_other:ident $($rest:ident)*) => { define_commands!(@has_flag open_keywords; $($rest)*) };
    (@has_flag open_keywords;) => { false };
}

// ── Command definitions ─────────────────────────────────────────

define_commands! {
    // ── Query ───────────────────────────────────────────────────
    [Read @entity(Sensor)] "get_sensor" => query::get_sensor { arg NAME: Text }
    "get_sensor [name]" : "Get sensor(s): get_sensor [name]";

    [Read @entity(Fan)] "get_fan" => query::get_fan { arg NAME: Text }
    "get_fan [name]" : "Get fan(s): get_fan [name]";

    [Read @entity(Led)] "get_led" => query::get_led { arg NAME: Text }
    "get_led [name]" : "Get LED(s): get_led [name]";

    [Read @entity(Macro)] "get_macro" => query::get_macro { arg NAME: Text }
    "get_macro [name]" : "Get macro(s): get_macro [name]";

    [Read @entity(Heater)] "get_heater" => query::get_heater { arg NAME: Text }
    "get_heater [name]" : "Get heater(s): get_heater [name]";

    [Read @entity(Pin)] "get_pin" => query::get_pin { arg NAME: Text }
    "get_pin [name]" : "Get pin(s): get_pin [name]";

    [Read] "get_toolhead" => query::get_toolhead {}
    "get_toolhead" : "Get toolhead status and homing state";

    [Read] "get_endstops" => query::get_endstops {}
    "get_endstops" : "Get endstop status";

    [Read] "get_status" => query::get_status {}
    "get_status" : "Get printer status";

    [Read] "get_print_status" => query::get_print_status {}
    "get_print_status" : "Get current print job status";

    [Read @entity(GcodeFile)] "get_file" => files::get_file {}
    "get_file [flags] [pattern...] | get_file <filename>" :
    "Get file(s): get_file [flags] [pattern] or get_file <filename>\n  Flags: -t (time) -S (size) -n (name) -r (reverse)\n  Example: get_file -t *.gcode";

    [Read @entity(GcodeCommand)] "get_gcode" => query::get_gcode { arg COMMAND: Text }
    "get_gcode [command]" : "Get G-code command(s): get_gcode [command]";

    // ── Control ─────────────────────────────────────────────────
    [Write @entity(Fan)] "set_fan" => control::set_fan {
        arg NAME: Text(required), key SPEED: Fraction(required)
    }
    "set_fan <name> SPEED=<0.0-1.0>" : "Set fan speed: set_fan <name> SPEED=<0.0-1.0>";

    [Write @entity(Led)] "set_led" => control::set_led {
        arg NAME: Text(required),
        key RED: Fraction(required),
        key GREEN: Fraction(required),
        key BLUE: Fraction(required),
        key WHITE: Fraction,
        key INDEX: Integer,
    }
    "set_led <name> RED=<0-1> GREEN=<0-1> BLUE=<0-1> [WHITE=<0-1>] [INDEX=<n>]" :
    "Set LED color: set_led <name> RED=<0-1> GREEN=<0-1> BLUE=<0-1> [WHITE=<0-1>] [INDEX=<n>]";

    [Write @entity(Heater)] "set_heater" => control::set_heater {
        arg NAME: Text(required), key TEMP: Temperature(required)
    }
    "set_heater <name> TEMP=<celsius>" :
    "Set heater temp: set_heater <name> TEMP=<celsius> (CAUTION: Physical heater control)";

    [Write @entity(Pin)] "set_pin" => control::set_pin {
        arg NAME: Text(required), key VALUE: Fraction(required)
    }
    "set_pin <name> VALUE=<0.0-1.0>" : "Set pin value: set_pin <name> VALUE=<0.0-1.0>";

    [Write @axes] "home" => control::home { arg AXES: Axis }
    "home [X] [Y] [Z]" : "Home axes: home [X] [Y] [Z] (no args = home all)";

    [Write] "extrude" => control::extrude {
        key AMOUNT: Number(required), key FEEDRATE: Integer
    }
    "extrude AMOUNT=<mm> [FEEDRATE=<mm/min>]" :
    "Extrude filament: extrude AMOUNT=<mm> [FEEDRATE=<mm/min>]";

    [Write @entity(GcodeCommand), open_keywords] "run_gcode" => control::run_gcode { arg COMMAND: Text }
    "run_gcode <command> [params...]" : "Run G-code: run_gcode <command> [params...]";

    [Write @entity(Macro), open_keywords] "run" => control::run_macro { arg MACRO: Text }
    "run <macro> [PARAM=value ...]" : "Run macro: run <macro_name> [PARAM=value ...]";

    [Write] "emergency_stop" => control::emergency_stop {}
    "emergency_stop" : "Emergency stop (M112): halts the printer immediately";

    [Write] "restart" => control::restart {}
    "restart" : "Restart the Klipper host software";

    [Write] "firmware_restart" => control::firmware_restart {}
    "firmware_restart" : "Restart Klipper and the printer MCU firmware";

    // ── Files ───────────────────────────────────────────────────
    [Write @entity(GcodeFile)] "delete_file" => files::delete_file { arg FILENAME: Text(required) }
    "delete_file <filename>" : "Delete G-code file: delete_file <filename>";

    [Write @entity(GcodeFile)] "move_file" => files::move_file {
        arg SOURCE: Text(required), arg DEST: Text(required)
    }
    "move_file <source> <dest>" : "Move G-code file: move_file <source> <dest>";

    [Write @entity(GcodeFile)] "copy_file" => files::copy_file {
        arg SOURCE: Text(required), arg DEST: Text(required)
    }
    "copy_file <source> <dest>" : "Copy G-code file: copy_file <source> <dest>";

    [Write @entity(GcodeFile)] "print_file" => files::print_file { arg FILENAME: Text(required) }
    "print_file <filename>" : "Print G-code file: print_file <filename>";

    [Write] "mkdir" => files::mkdir { arg PATH: Text(required) }
    "mkdir <path>" : "Create directory: mkdir <path>";

    [Read] "list_dir" => files::list_dir {}
    "list_dir [flags] [pattern...] [path]" :
    "List directories: list_dir [flags] [pattern]\n  Flags: -t (time) -S (size) -n (name) -r (reverse)\n  Example: list_dir -t subfolder_*";

    [Write @local_path] "upload_file" => files::upload_file {
        arg LOCAL: Text(required), arg REMOTE: Text
    }
    "upload_file <local_path> [remote_path]" : "Upload file: upload_file <local_path> [remote_path]";

    [Read @entity(GcodeFile)] "download_file" => files::download_file {
        arg REMOTE: Text(required), arg LOCAL: Text(required)
    }
    "download_file <remote_path> <local_path>" :
    "Download file: download_file <remote_path> <local_path>";

    // ── Local ───────────────────────────────────────────────────
    [Utility] "pwd" => local::pwd {}
    "pwd" : "Show current local working directory";

    [Utility @local_path] "cd" => local::cd { arg PATH: Text }
    "cd [path]" : "Change local directory: cd <path>";

    [Utility @local_path] "ls" => local::ls {}
    "ls [flags] [pattern...] [path]" :
    "List local files: ls [flags] [pattern]\n  Flags: -t (time) -S (size) -n (name) -r (reverse) -a (all/hidden)\n  Example: ls -t *.gcode";

    // ── Session ─────────────────────────────────────────────────
    [Utility] "help" => session::help { arg TOPIC: Text }
    "help [command|read|write|utility]" : "Show available commands";

    [Utility] "exit" => session::exit {}
    "exit" : "Exit the console";

    [Utility] "quit" => session::exit {}
    "quit" : "Exit the console";

    [Utility] "console" => session::console {}
    "console" : "Enter interactive console viewer with real-time output";

    [Utility] "refresh" => session::refresh { arg CATEGORY: Text }
    "refresh [sensor|fan|led|macro|heater|pin|gcode|file]" :
    "Forget cached completion names (one category or all)";

    [Utility] "history" => session::history {}
    "history" : "Show command history for this session";
}
