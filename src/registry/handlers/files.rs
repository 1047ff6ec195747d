//! Remote file management under the printer's `gcodes` root, plus transfers
//! between the printer and the local working directory.

use std::path::PathBuf;

use tracing::info;

use super::common::{required_arg, Listing};
use crate::entity::EntityCategory;
use crate::error::HandlerError;
use crate::parser::ParsedInvocation;
use crate::paths::{remote_dir_path, GCODES_ROOT};
use crate::registry::{CommandContext, CommandOutput};
use crate::render;

/// The file list changed remotely; completion must requery it.
fn files_changed(ctx: &CommandContext<'_>) {
    ctx.session.invalidate(EntityCategory::GcodeFile);
}

pub fn get_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let listing = Listing::parse(&inv.positional, false)?;
    let api = ctx.session.api();

    if listing.patterns.is_empty() {
        if let Some(filename) = listing.operands.first() {
            let file = api.file_metadata(filename)?;
            return Ok(CommandOutput::data(render::gcode_file(&file), &file));
        }
    }

    let files = listing.apply(api.list_files(GCODES_ROOT)?);
    Ok(CommandOutput::data(render::gcode_files(&files), &files))
}

pub fn delete_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let filename = required_arg(inv, 0, "FILENAME")?;
    ctx.session.api().delete_file(filename)?;
    files_changed(ctx);
    Ok(CommandOutput::new(format!("Deleted: {filename}")))
}

pub fn move_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let source = required_arg(inv, 0, "SOURCE")?;
    let dest = required_arg(inv, 1, "DEST")?;
    ctx.session.api().move_file(source, dest)?;
    files_changed(ctx);
    Ok(CommandOutput::new(format!("Moved: {source} -> {dest}")))
}

pub fn copy_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let source = required_arg(inv, 0, "SOURCE")?;
    let dest = required_arg(inv, 1, "DEST")?;
    ctx.session.api().copy_file(source, dest)?;
    files_changed(ctx);
    Ok(CommandOutput::new(format!("Copied: {source} -> {dest}")))
}

pub fn print_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let filename = required_arg(inv, 0, "FILENAME")?;
    info!(filename, "starting print");
    ctx.session.api().start_print(filename)?;
    Ok(CommandOutput::new(format!("Starting print: {filename}")))
}

pub fn mkdir(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let path = remote_dir_path(required_arg(inv, 0, "PATH")?);
    let created = ctx.session.api().create_directory(&path)?;
    Ok(CommandOutput::new(format!("Created directory: {created}")))
}

pub fn list_dir(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let listing = Listing::parse(&inv.positional, false)?;
    let base = listing.operands.last().map_or(GCODES_ROOT, String::as_str);
    let dirs = listing.apply(ctx.session.api().list_directory(base)?);
    Ok(CommandOutput::data(render::directories(&dirs), &dirs))
}

pub fn upload_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let local = ctx.session.resolve_local(required_arg(inv, 0, "LOCAL")?);
    if !local.is_file() {
        return Err(HandlerError::failed(format!(
            "Local file not found: {}",
            local.display()
        )));
    }
    let remote = inv.arg(1).unwrap_or(GCODES_ROOT);

    info!(local = %local.display(), remote, "uploading");
    let stored = ctx.session.api().upload_file(&local, remote)?;
    files_changed(ctx);
    Ok(CommandOutput::new(format!(
        "Uploaded: {} -> {stored}",
        local.display()
    )))
}

pub fn download_file(ctx: &CommandContext<'_>, inv: &ParsedInvocation) -> Result<CommandOutput, HandlerError> {
    let remote = required_arg(inv, 0, "REMOTE")?;
    let mut local: PathBuf = ctx.session.resolve_local(required_arg(inv, 1, "LOCAL")?);
    // Downloading into a directory keeps the remote file name.
    if local.is_dir() {
        let name = remote.rsplit('/').next().unwrap_or(remote);
        local.push(name);
    }

    info!(remote, local = %local.display(), "downloading");
    let bytes = ctx
        .session
        .api()
        .download_file(&remote_dir_path(remote), &local)?;
    Ok(CommandOutput::data(
        format!("Downloaded: {remote} -> {}", local.display()),
        serde_json::json!({ "remote": remote, "local": local, "bytes": bytes }),
    ))
}
