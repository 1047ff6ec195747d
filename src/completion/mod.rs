//! Context-aware tab completion: command names, then entity names (or axes,
//! or local paths) for the first argument, then `KEY=` for keyword
//! parameters not yet on the line.

pub mod cache;
pub mod helper;

use std::fs;
use std::path::PathBuf;

use crate::parser::{lex, split_keyword, Token};
use crate::paths::home_dir;
use crate::registry::params::{ArgCompletion, ParamStyle};
use crate::registry::{CommandDescriptor, CommandRegistry};
use crate::state::Session;
use crate::util::quote_if_needed;

pub use helper::ShellHelper;

/// Candidates replace `line[start..pos]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub start: usize,
    pub candidates: Vec<String>,
}

/// The token under the cursor and what precedes it.
struct Cursor<'a> {
    tokens: Vec<Token>,
    /// Index of the current token; equals `tokens.len()` for a fresh one.
    index: usize,
    word: &'a str,
    start: usize,
}

fn locate(prefix: &str) -> Cursor<'_> {
    let lexed = lex(prefix);
    let current = lexed
        .tokens
        .last()
        .filter(|t| t.end == prefix.len())
        .map(|t| t.start);
    match current {
        Some(start) => Cursor {
            index: lexed.tokens.len() - 1,
            word: prefix.get(start..).unwrap_or(""),
            start,
            tokens: lexed.tokens,
        },
        None => Cursor {
            index: lexed.tokens.len(),
            word: "",
            start: prefix.len(),
            tokens: lexed.tokens,
        },
    }
}

/// Compute candidates for the cursor at byte offset `pos`. Never fails: a
/// collaborator error during name lookup yields no candidates.
///
/// Entity names and paths containing whitespace come back double-quoted so
/// the inserted text lexes as one argument; with the quotes stripped every
/// entity candidate is one of the cached names.
pub fn complete(line: &str, pos: usize, session: &Session, registry: &CommandRegistry) -> Completion {
    let prefix = line.get(..pos).unwrap_or(line);
    let cursor = locate(prefix);

    if cursor.index == 0 {
        let candidates = registry
            .names()
            .filter(|name| name.starts_with(cursor.word))
            .map(str::to_string)
            .collect();
        return Completion {
            start: cursor.start,
            candidates,
        };
    }

    let Some(descriptor) = cursor.tokens.first().and_then(|t| registry.get(&t.text)) else {
        return Completion::default();
    };
    // Values after `KEY=` are free text.
    if split_keyword(cursor.word).is_some() {
        return Completion::default();
    }

    let before = cursor.tokens.get(1..cursor.index).unwrap_or_default();
    let positional_index = before
        .iter()
        .filter(|t| split_keyword(&t.text).is_none() && !t.text.starts_with('-'))
        .count();
    // The word as typed, with any opening quote stripped.
    let typed = cursor
        .tokens
        .get(cursor.index)
        .map_or("", |t| t.text.as_str());

    let candidates = match argument_source(descriptor, positional_index, typed) {
        Some(source) => argument_candidates(source, typed, before, session),
        None => keyword_candidates(descriptor, positional_index, typed, &cursor.tokens, cursor.index),
    };
    Completion {
        start: cursor.start,
        candidates,
    }
}

/// Which dynamic source, if any, completes this argument slot.
fn argument_source(
    descriptor: &CommandDescriptor,
    positional_index: usize,
    typed: &str,
) -> Option<ArgCompletion> {
    if typed.starts_with('-') {
        return None;
    }
    let takes_positionals = descriptor
        .params
        .iter()
        .any(|p| p.style == ParamStyle::Positional);
    match descriptor.completes? {
        source @ ArgCompletion::Entity(_) if positional_index == 0 => Some(source),
        ArgCompletion::Axes => Some(ArgCompletion::Axes),
        // `ls` declares no positionals; every operand is a path.
        ArgCompletion::LocalPath if positional_index == 0 || !takes_positionals => {
            Some(ArgCompletion::LocalPath)
        }
        _ => None,
    }
}

fn argument_candidates(
    source: ArgCompletion,
    typed: &str,
    before: &[Token],
    session: &Session,
) -> Vec<String> {
    match source {
        ArgCompletion::Entity(category) => {
            let lower = typed.to_lowercase();
            session
                .entity_names(category)
                .iter()
                .filter(|name| name.to_lowercase().starts_with(&lower))
                .map(|name| quote_if_needed(name))
                .collect()
        }
        ArgCompletion::Axes => ["X", "Y", "Z"]
            .into_iter()
            .filter(|axis| axis.starts_with(typed))
            .filter(|axis| !before.iter().any(|t| t.text.eq_ignore_ascii_case(axis)))
            .map(str::to_string)
            .collect(),
        ArgCompletion::LocalPath => path_candidates(typed, session),
    }
}

/// Entries of the directory named by the typed word's leading part, sorted,
/// directories suffixed with `/`. Dotfiles only when asked for.
fn path_candidates(typed: &str, session: &Session) -> Vec<String> {
    let (dir_part, file_prefix) = match typed.rfind('/') {
        Some(i) => typed.split_at(i + 1),
        None => ("", typed),
    };
    let dir: PathBuf = if dir_part.is_empty() {
        session.cwd()
    } else if let Some(rest) = dir_part.strip_prefix("~/") {
        match home_dir() {
            Some(home) => home.join(rest),
            None => return Vec::new(),
        }
    } else {
        session.resolve_local(dir_part)
    };
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let show_hidden = file_prefix.starts_with('.');
    let mut candidates: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(file_prefix) || (!show_hidden && name.starts_with('.')) {
                return None;
            }
            let slash = if entry.path().is_dir() { "/" } else { "" };
            Some(quote_if_needed(&format!("{dir_part}{name}{slash}")))
        })
        .collect();
    candidates.sort();
    candidates
}

/// `KEY=` for declared keywords not already given, once every required
/// positional is filled.
fn keyword_candidates(
    descriptor: &CommandDescriptor,
    positional_index: usize,
    typed: &str,
    tokens: &[Token],
    current: usize,
) -> Vec<String> {
    let required_positionals = descriptor
        .params
        .iter()
        .filter(|p| p.style == ParamStyle::Positional && p.required)
        .count();
    if positional_index < required_positionals {
        return Vec::new();
    }
    let present: Vec<String> = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != current)
        .filter_map(|(_, t)| split_keyword(&t.text))
        .map(|(key, _)| key.to_ascii_uppercase())
        .collect();
    descriptor
        .keywords()
        .filter(|p| !present.iter().any(|k| k == p.key))
        .map(|p| format!("{}=", p.key))
        .filter(|candidate| candidate.starts_with(typed))
        .collect()
}
