//! Filesystem utilities.
//!
//! Crash-tolerant file writes and validation of names that end up as file
//! or archive entry names.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Name Validation
// =============================================================================

/// Validates that `name` is a single, flat path component.
///
/// Rejects empty names, `.`/`..`, path separators and a leading drive
/// prefix (`C:`) so the name can be joined onto a directory or used as a
/// flat archive entry. Other colons are allowed (`Episode 01: Pilot.mp4`).
pub fn validate_flat_name(name: &str, label: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{label} is empty"));
    }
    if name == "." || name == ".." {
        return Err(format!("Invalid {label}: {name}"));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(format!(
            "Invalid {label}: must not contain path separators: {name}"
        ));
    }
    if has_drive_prefix(name) {
        return Err(format!("Invalid {label}: must not start with a drive: {name}"));
    }
    Ok(())
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write a file through a sibling temp file that is swapped into place only
/// after `write` succeeds and the data is synced. The temp file is removed
/// on any error.
pub fn write_atomically<F>(path: &Path, write: F) -> CoreResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> CoreResult<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let result = (|| {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        atomic_replace(path, &tmp_path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// Write bytes to `path` using an atomic replace pattern.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    write_atomically(path, |writer| {
        writer.write_all(bytes)?;
        Ok(())
    })
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// `{path}.{suffix}` next to `path`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let name = match path.file_name() {
        Some(name) => format!("{}.{}", name.to_string_lossy(), suffix),
        None => format!("adipack.{}", suffix),
    };
    path.with_file_name(name)
}

pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    sibling_path(path, "tmp")
}

fn bak_path_for(path: &Path) -> PathBuf {
    sibling_path(path, "bak")
}

/// Move `staged` over `dest`. Renaming over an existing file is not atomic
/// everywhere, so an existing `dest` is parked as `.bak` and restored if the
/// swap fails.
fn atomic_replace(dest: &Path, staged: &Path) -> CoreResult<()> {
    if !dest.exists() {
        return Ok(std::fs::rename(staged, dest)?);
    }

    let parked = bak_path_for(dest);
    let _ = std::fs::remove_file(&parked);
    std::fs::rename(dest, &parked)?;

    if let Err(e) = std::fs::rename(staged, dest) {
        let _ = std::fs::rename(&parked, dest);
        return Err(e.into());
    }
    let _ = std::fs::remove_file(&parked);
    Ok(())
}
