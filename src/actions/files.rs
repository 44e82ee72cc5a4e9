//! File and directory placement

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::{ActionContext, ActionOutput};
use crate::config::{CopyDirectoryParams, CopyFileParams, CreateDirectoryParams};

pub fn copy_file(ctx: &ActionContext<'_>, params: &CopyFileParams) -> Result<ActionOutput> {
    let source = ctx.source_path(&params.source);
    let destination = ctx.target_path(&params.destination);
    tracing::debug!("Copying file {:?} -> {:?}", source, destination);

    if destination.exists() && !params.overwrite {
        bail!("Destination {:?} already exists", destination);
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let bytes = fs::copy(&source, &destination)
        .with_context(|| format!("Failed to copy {:?} to {:?}", source, destination))?;
    Ok(ActionOutput::ok_with(format!("{} bytes copied", bytes)))
}

pub fn copy_directory(
    ctx: &ActionContext<'_>,
    params: &CopyDirectoryParams,
) -> Result<ActionOutput> {
    let source = ctx.source_path(&params.source);
    let destination = ctx.target_path(&params.destination);
    tracing::debug!("Copying directory {:?} -> {:?}", source, destination);

    if !source.is_dir() {
        bail!("Source directory {:?} not found", source);
    }

    let files = copy_tree(&source, &destination, params.recursive)?;
    Ok(ActionOutput::ok_with(format!("{} files copied", files)))
}

/// Copy `source` into `destination`; returns the number of files copied
fn copy_tree(source: &Path, destination: &Path, recursive: bool) -> Result<usize> {
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create directory {:?}", destination))?;

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut copied = 0;

    for entry in WalkDir::new(source).min_depth(1).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", source))?;
        let relative = entry.path().strip_prefix(source)?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory {:?}", target))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {:?} to {:?}", entry.path(), target)
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

pub fn create_directory(
    ctx: &ActionContext<'_>,
    params: &CreateDirectoryParams,
) -> Result<ActionOutput> {
    let path = ctx.target_path(&params.path);
    tracing::debug!("Creating directory {:?}", path);
    fs::create_dir_all(&path).with_context(|| format!("Failed to create directory {:?}", path))?;
    Ok(ActionOutput::ok())
}
