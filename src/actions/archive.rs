//! Native archive extraction (zip, tar, tar.gz)
//!
//! Entries with absolute paths or `..` components are rejected before
//! anything is written outside the destination.

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path};

use super::{ActionContext, ActionOutput};
use crate::config::ExtractArchiveParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

pub fn extract_archive(
    ctx: &ActionContext<'_>,
    params: &ExtractArchiveParams,
) -> Result<ActionOutput> {
    let archive = ctx.source_path(&params.archive_path);
    let destination = ctx.target_path(&params.destination);
    tracing::debug!("Extracting {:?} -> {:?}", archive, destination);

    let Some(format) = ArchiveFormat::from_path(&archive) else {
        bail!("Unsupported archive format: {:?}", archive);
    };

    fs::create_dir_all(&destination)
        .with_context(|| format!("Failed to create directory {:?}", destination))?;
    let file = File::open(&archive).with_context(|| format!("Failed to open {:?}", archive))?;

    let entries = match format {
        ArchiveFormat::Zip => extract_zip(file, &destination),
        ArchiveFormat::Tar => extract_tar(BufReader::new(file), &destination),
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(BufReader::new(file)), &destination),
    }
    .with_context(|| format!("Failed to extract {:?}", archive))?;

    Ok(ActionOutput::ok_with(format!("{} entries extracted", entries)))
}

fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn extract_zip(file: File, destination: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry escapes the destination: {}", entry.name());
        };
        let target = destination.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {:?}", target))?;
        io::copy(&mut entry, &mut out)?;

        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(archive.len())
}

fn extract_tar<R: Read>(reader: R, destination: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if !is_safe_relative(&path) {
            bail!("Archive entry escapes the destination: {}", path.display());
        }

        // unpack_in re-checks containment and creates parent directories
        if !entry.unpack_in(destination)? {
            bail!("Archive entry escapes the destination: {}", path.display());
        }
        count += 1;
    }

    Ok(count)
}
