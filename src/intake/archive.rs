//! Expand ZIP uploads into a private scratch directory.

use std::{fs, io::Cursor};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::{async_utils::spawn_blocking_propagating_panics, pages::SUPPORTED_FILE_TYPES, prelude::*};

use super::{classify::file_type_tag, error::IntakeError};

/// A supported file found in an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// The path inside the archive, with `/` separators.
    pub name: String,
    /// Where the file was extracted.
    pub path: PathBuf,
}

/// An extracted archive. Dropping this removes the scratch directory.
#[derive(Debug)]
pub struct ExpandedArchive {
    dir: TempDir,
    entries: Vec<ArchiveEntry>,
}

impl ExpandedArchive {
    /// Supported entries, sorted by name.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// The scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Extract `data` into a fresh directory under `scratch_root` (or the system
/// temporary directory), and list the files we know how to read.
#[instrument(level = "debug", skip_all, fields(bytes = data.len()))]
pub async fn expand(
    data: Vec<u8>,
    scratch_root: Option<&Path>,
) -> Result<ExpandedArchive, IntakeError> {
    let scratch_root = scratch_root.map(Path::to_owned);
    spawn_blocking_propagating_panics(move || expand_sync(data, scratch_root.as_deref())).await
}

fn expand_sync(data: Vec<u8>, scratch_root: Option<&Path>) -> Result<ExpandedArchive, IntakeError> {
    // Open the archive before we touch the disk, so that garbage uploads
    // never create a directory.
    let mut archive = ZipArchive::new(Cursor::new(data))
        .context("failed to open ZIP archive")
        .map_err(IntakeError::ArchiveFormat)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("bulk");
    let dir = match scratch_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };

    // `extract` refuses entries that would escape `dir`.
    archive
        .extract(dir.path())
        .context("failed to extract ZIP archive")
        .map_err(IntakeError::ArchiveFormat)?;

    let mut entries = Vec::new();
    collect_entries(dir.path(), dir.path(), &mut entries)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(entries = entries.len(), "Expanded archive");
    Ok(ExpandedArchive { dir, entries })
}

/// Recursively find supported files under `dir`.
fn collect_entries(
    root: &Path,
    dir: &Path,
    entries: &mut Vec<ArchiveEntry>,
) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();

        // Hidden files and `__MACOSX/` resource forks are still entries. If
        // they have a supported extension, they get a fragment like anything
        // else. Symlinks are never followed.
        if file_type.is_dir() {
            collect_entries(root, &path, entries)?;
        } else if file_type.is_file() && is_supported(&file_name) {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ArchiveEntry { name, path });
        }
    }
    Ok(())
}

fn is_supported(file_name: &str) -> bool {
    SUPPORTED_FILE_TYPES.contains(&file_type_tag(file_name).as_str())
}
