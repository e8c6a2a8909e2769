use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};
use crate::scanner::{Manifest, Skipped};

/// Outcome of one archive run.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Absolute location of the archive.
    pub destination: PathBuf,
    /// Relative paths (under the destination) that were written.
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<Skipped>,
    pub bytes_copied: u64,
}

/// Recreate `destination` and copy every manifest entry beneath it, keeping
/// each file's path relative to `source_root`.
///
/// Anything already at `destination` is removed first, so a destination that
/// is `source_root` or one of its ancestors is refused with
/// [`ArchiveError::Config`]. Only failures to prepare the destination itself
/// are returned as errors; a file that cannot be copied is logged and
/// recorded in [`ArchiveSummary::skipped`].
pub fn archive(manifest: &Manifest, destination: &Path, source_root: &Path) -> Result<ArchiveSummary> {
    log::info!("Creating archive at {}", destination.display());

    ensure_outside_source(destination, source_root)?;
    prepare_destination(destination)?;

    let mut copied = Vec::with_capacity(manifest.len());
    let mut skipped = Vec::new();
    let mut bytes_copied = 0u64;

    for file in manifest.files() {
        let relative = reroot_relative(file, source_root);
        let dest_path = destination.join(&relative);

        match copy_file(file, &dest_path) {
            Ok(bytes) => {
                log::debug!("Copied {} -> {}", file.display(), dest_path.display());
                bytes_copied += bytes;
                copied.push(relative);
            }
            Err(e) => {
                log::warn!("Could not copy {}: {}", file.display(), e);
                skipped.push(Skipped {
                    path: file.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let destination = std::path::absolute(destination)
        .map_err(|e| ArchiveError::filesystem(destination, e))?;

    log::info!(
        "Archive created with {} files ({} skipped)",
        copied.len(),
        skipped.len()
    );

    Ok(ArchiveSummary {
        destination,
        copied,
        skipped,
        bytes_copied,
    })
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .map_err(|e| ArchiveError::filesystem(path, e))
}

/// Clearing the destination must never reach the files being archived.
fn ensure_outside_source(destination: &Path, source_root: &Path) -> Result<()> {
    let destination = resolve(destination)?;
    let source_root = resolve(source_root)?;
    if source_root.starts_with(&destination) {
        return Err(ArchiveError::Config(format!(
            "Output directory {} would overwrite the scan root {}",
            destination.display(),
            source_root.display()
        )));
    }
    Ok(())
}

/// Ensure the parent exists, drop any previous archive, and create an empty directory.
fn prepare_destination(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::filesystem(parent, e))?;
    }

    match fs::symlink_metadata(destination) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(destination).map_err(|e| ArchiveError::filesystem(destination, e))?;
        }
        Ok(_) => {
            fs::remove_file(destination).map_err(|e| ArchiveError::filesystem(destination, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ArchiveError::filesystem(destination, e)),
    }

    fs::create_dir_all(destination).map_err(|e| ArchiveError::filesystem(destination, e))
}

/// Path of `file` relative to `root`, or its file name if it lies outside `root`.
fn reroot_relative(file: &Path, root: &Path) -> PathBuf {
    match file.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| file.to_path_buf()),
    }
}

fn copy_file(source: &Path, dest: &Path) -> std::io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, dest)
}
