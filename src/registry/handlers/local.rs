//! Local working-directory navigation (`pwd`, `cd`, `ls`). Relative paths in
//! `upload_file`/`download_file` resolve against the same directory.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::debug;

use super::common::{Listable, Listing};
use crate::error::HandlerError;
use crate::parser::ParsedInvocation;
use crate::paths::home_dir;
use crate::registry::{CommandContext, CommandOutput};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalEntry {
    pub name: String,
    pub size: u64,
    pub modified: f64,
    pub is_dir: bool,
}

impl Listable for LocalEntry {
    fn list_name(&self) -> &str {
        &self.name
    }
    fn modified(&self) -> f64 {
        self.modified
    }
    fn size(&self) -> u64 {
        self.size
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn home() -> Result<PathBuf, HandlerError> {
    home_dir().ok_or_else(|| HandlerError::failed("Cannot determine home directory"))
}

pub fn pwd(ctx: &CommandContext<'_>, _inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    Ok(CommandOutput::new(format!("Local: {}", ctx.session.cwd().display())))
}

pub fn cd(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let target = match inv.arg(0) {
        None | Some("~") => home()?,
        Some(path) => match path.strip_prefix("~/") {
            Some(rest) => home()?.join(rest),
            None => normalize(&ctx.session.resolve_local(path)),
        },
    };
    if !target.is_dir() {
        return Err(HandlerError::failed(format!(
            "Not a directory: {}",
            target.display()
        )));
    }
    ctx.session.set_cwd(target.clone());
    Ok(CommandOutput::new(format!("Changed to: {}", target.display())))
}

fn read_entries(dir: &Path, show_hidden: bool) -> Result<Vec<LocalEntry>, HandlerError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        // Entries that can't be stat'ed are skipped.
        let Ok(meta) = fs::metadata(entry.path()) else {
            debug!(name = %name, "skipping unreadable entry");
            continue;
        };
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        entries.push(LocalEntry {
            name,
            size: meta.len(),
            modified,
            is_dir: meta.is_dir(),
        });
    }
    Ok(entries)
}

pub fn ls(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let listing = Listing::parse(&inv.positional, true)?;
    let dir = listing
        .operands
        .last()
        .map_or_else(|| ctx.session.cwd(), |p| ctx.session.resolve_local(p));
    if !dir.is_dir() {
        return Err(HandlerError::failed(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let entries = listing.apply(read_entries(&dir, listing.all)?);
    if entries.is_empty() {
        return Ok(CommandOutput::data("(empty directory)", &entries));
    }
    let message = entries
        .iter()
        .map(|e| {
            if e.is_dir {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(CommandOutput::data(message, &entries))
}
