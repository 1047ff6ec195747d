//! Helpers shared by handlers: argument access, G-code sending, and the
//! flag/pattern/sort logic of the listing commands (`get_file`, `list_dir`, `ls`).

use tracing::info;

use crate::error::HandlerError;
use crate::model::{Directory, GcodeFile};
use crate::parser::ParsedInvocation;
use crate::registry::params::parse_number;
use crate::registry::CommandContext;
use crate::util::{glob_match, is_glob};

// ── Arguments ───────────────────────────────────────────────────────

/// Positional argument the schema marks required. Validation has already
/// run, so a miss only happens when a handler is called directly.
pub fn required_arg<'a>(
    inv: &'a ParsedInvocation,
    index: usize,
    param: &str,
) -> Result<&'a str, HandlerError> {
    inv.arg(index)
        .ok_or_else(|| HandlerError::invalid(param, "", "is required"))
}

pub fn number(inv: &ParsedInvocation, key: &str) -> Result<Option<f64>, HandlerError> {
    inv.kw(key)
        .map(|raw| parse_number(raw).map_err(|reason| HandlerError::invalid(key, raw, reason)))
        .transpose()
}

pub fn required_number(inv: &ParsedInvocation, key: &str) -> Result<f64, HandlerError> {
    number(inv, key)?.ok_or_else(|| HandlerError::invalid(key, "", "is required"))
}

pub fn integer(inv: &ParsedInvocation, key: &str) -> Result<Option<i64>, HandlerError> {
    inv.kw(key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| HandlerError::invalid(key, raw, "expected an integer"))
        })
        .transpose()
}

/// Number as it appears in a G-code line: integral values keep one decimal
/// (`1.0`), others print in shortest form (`0.35`).
pub fn gcode_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Send a script through the command client and return its response.
pub fn send(ctx: &CommandContext<'_>, script: &str) -> Result<String, HandlerError> {
    info!(script, "run_gcode");
    Ok(ctx.session.api().run_gcode(script)?)
}

// ── Listings ────────────────────────────────────────────────────────

/// Anything the listing commands can filter and sort.
pub trait Listable {
    fn list_name(&self) -> &str;
    fn modified(&self) -> f64;
    fn size(&self) -> u64;
}

impl Listable for GcodeFile {
    fn list_name(&self) -> &str {
        &self.filename
    }
    fn modified(&self) -> f64 {
        self.modified
    }
    fn size(&self) -> u64 {
        self.size
    }
}

impl Listable for Directory {
    fn list_name(&self) -> &str {
        &self.dirname
    }
    fn modified(&self) -> f64 {
        self.modified
    }
    fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Name,
    Time,
    Size,
}

/// Parsed listing arguments: `-tSnr[a]` flags (combinable, last sort key
/// wins), wildcard patterns, and the remaining operands in order.
#[derive(Debug, Default, PartialEq)]
pub struct Listing {
    pub sort: SortKey,
    pub reverse: bool,
    pub all: bool,
    pub patterns: Vec<String>,
    pub operands: Vec<String>,
}

impl Listing {
    pub fn parse(args: &[String], allow_hidden: bool) -> Result<Self, HandlerError> {
        let mut listing = Self::default();
        for arg in args {
            if let Some(flags) = arg.strip_prefix('-').filter(|f| !f.is_empty()) {
                for flag in flags.chars() {
                    match flag {
                        't' => listing.sort = SortKey::Time,
                        'S' => listing.sort = SortKey::Size,
                        'n' => listing.sort = SortKey::Name,
                        'r' => listing.reverse = true,
                        'a' if allow_hidden => listing.all = true,
                        other => {
                            return Err(HandlerError::failed(format!("Unknown flag: -{other}")))
                        }
                    }
                }
            } else if is_glob(arg) {
                listing.patterns.push(arg.clone());
            } else {
                listing.operands.push(arg.clone());
            }
        }
        Ok(listing)
    }

    /// True when no pattern was given or any pattern matches.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| glob_match(p, name))
    }

    /// Filter by pattern, then sort. Name sorts A→Z ignoring case; time and
    /// size sort newest/largest first; `-r` flips either.
    pub fn apply<T: Listable>(&self, items: Vec<T>) -> Vec<T> {
        let mut items: Vec<T> = items
            .into_iter()
            .filter(|i| self.matches(i.list_name()))
            .collect();
        match self.sort {
            SortKey::Name => items.sort_by_cached_key(|i| i.list_name().to_lowercase()),
            SortKey::Time => items.sort_by(|a, b| b.modified().total_cmp(&a.modified())),
            SortKey::Size => items.sort_by(|a, b| b.size().cmp(&a.size())),
        }
        if self.reverse {
            items.reverse();
        }
        items
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn file(name: &str, size: u64, modified: f64) -> GcodeFile {
        GcodeFile {
            filename: name.into(),
            size,
            modified,
            estimated_time: None,
            filament_total: None,
            first_layer_height: None,
            layer_height: None,
            object_height: None,
            slicer: None,
        }
    }

    fn names(files: &[GcodeFile]) -> Vec<&str> {
        files.iter().map(|f| f.filename.as_str()).collect()
    }

    fn sample() -> Vec<GcodeFile> {
        vec![
            file("benchy.gcode", 300, 20.0),
            file("Cube.gcode", 100, 30.0),
            file("apple.gcode", 200, 10.0),
            file("notes.txt", 50, 40.0),
        ]
    }

    #[test]
    fn splits_flags_patterns_and_operands() {
        let listing = Listing::parse(&args(&["-tr", "*.gcode", "sub"]), false).unwrap();
        assert_eq!(listing.sort, SortKey::Time);
        assert!(listing.reverse);
        assert_eq!(listing.patterns, vec!["*.gcode"]);
        assert_eq!(listing.operands, vec!["sub"]);
    }

    #[test]
    fn unknown_flag_fails() {
        let err = Listing::parse(&args(&["-x"]), false).unwrap_err();
        assert_eq!(err.to_string(), "Unknown flag: -x");
        assert!(Listing::parse(&args(&["-a"]), false).is_err());
        assert!(Listing::parse(&args(&["-a"]), true).unwrap().all);
    }

    #[test]
    fn name_sort_ignores_case() {
        let listing = Listing::parse(&[], false).unwrap();
        assert_eq!(
            names(&listing.apply(sample())),
            vec!["apple.gcode", "benchy.gcode", "Cube.gcode", "notes.txt"]
        );
    }

    #[test]
    fn time_and_size_sort_descending_unless_reversed() {
        let by_time = Listing::parse(&args(&["-t", "*.gcode"]), false).unwrap();
        assert_eq!(
            names(&by_time.apply(sample())),
            vec!["Cube.gcode", "benchy.gcode", "apple.gcode"]
        );
        let by_size = Listing::parse(&args(&["-Sr"]), false).unwrap();
        assert_eq!(
            names(&by_size.apply(sample())),
            vec!["notes.txt", "Cube.gcode", "apple.gcode", "benchy.gcode"]
        );
    }

    #[test]
    fn gcode_numbers_match_firmware_style() {
        assert_eq!(gcode_number(1.0), "1.0");
        assert_eq!(gcode_number(0.35), "0.35");
        assert_eq!(gcode_number(210.0), "210.0");
        assert_eq!(gcode_number(-5.0), "-5.0");
    }
}
