//! Archive builder and finished package

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::fs::{validate_flat_name, write_atomically};
use crate::core::{ArtifactSource, CoreError, CoreResult};

/// Entries at or above this size need zip64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

#[derive(Debug)]
enum EntrySource {
    Bytes(Vec<u8>),
    File { path: PathBuf, len: u64 },
}

/// Collects named entries and emits the archive in one step.
#[derive(Debug)]
pub struct PackageBuilder {
    entries: Vec<(String, EntrySource)>,
    names: HashSet<String>,
    compression: CompressionMethod,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashSet::new(),
            compression: CompressionMethod::Deflated,
        }
    }

    /// Use a different compression method for every entry
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Queue an in-memory entry
    pub fn add_bytes(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> CoreResult<()> {
        let name = self.claim_name(name.into())?;
        self.entries.push((name, EntrySource::Bytes(bytes)));
        Ok(())
    }

    /// Queue an entry streamed from a local file at finalize time
    pub fn add_file(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> CoreResult<()> {
        let path = path.into();
        let len = std::fs::metadata(&path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .ok_or_else(|| {
                CoreError::ArchiveWriteFailed(format!(
                    "Cannot read package entry source: {}",
                    path.display()
                ))
            })?;

        let name = self.claim_name(name.into())?;
        self.entries.push((name, EntrySource::File { path, len }));
        Ok(())
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Drop everything queued so far. Nothing has been written yet.
    pub fn abort(self) {
        tracing::debug!("Package build aborted with {} queued entries", self.entries.len());
    }

    /// Produce the archive in memory.
    pub fn finalize(self) -> CoreResult<Package> {
        let cursor = self.write_archive(Cursor::new(Vec::new()))?;
        let bytes = cursor.into_inner();
        let size_bytes = bytes.len() as u64;
        Ok(Package {
            source: ArtifactSource::Bytes(bytes),
            entry_names: self.into_names(),
            size_bytes,
        })
    }

    /// Produce the archive at `path` (temp file + rename; nothing is left on error).
    pub fn finalize_to(self, path: &Path) -> CoreResult<Package> {
        write_atomically(path, |writer| {
            self.write_archive(writer)?;
            Ok(())
        })
        .map_err(|e| match e {
            CoreError::ArchiveWriteFailed(_) => e,
            other => CoreError::ArchiveWriteFailed(other.to_string()),
        })?;

        let size_bytes = std::fs::metadata(path)?.len();
        Ok(Package {
            source: ArtifactSource::File(path.to_path_buf()),
            entry_names: self.into_names(),
            size_bytes,
        })
    }

    fn claim_name(&mut self, name: String) -> CoreResult<String> {
        validate_flat_name(&name, "package entry name").map_err(CoreError::ArchiveWriteFailed)?;
        if !self.names.insert(name.clone()) {
            return Err(CoreError::ArchiveWriteFailed(format!(
                "Duplicate package entry: {}",
                name
            )));
        }
        Ok(name)
    }

    fn into_names(self) -> Vec<String> {
        self.entries.into_iter().map(|(n, _)| n).collect()
    }

    fn write_archive<W: Write + Seek>(&self, sink: W) -> CoreResult<W> {
        let mut zip = ZipWriter::new(sink);

        for (name, source) in &self.entries {
            let len = match source {
                EntrySource::Bytes(bytes) => bytes.len() as u64,
                EntrySource::File { len, .. } => *len,
            };
            let options = SimpleFileOptions::default()
                .compression_method(self.compression)
                .large_file(len >= ZIP64_THRESHOLD);

            zip.start_file(name.as_str(), options)
                .map_err(|e| write_failed(name, e))?;

            match source {
                EntrySource::Bytes(bytes) => {
                    zip.write_all(bytes).map_err(|e| write_failed(name, e))?;
                }
                EntrySource::File { path, .. } => {
                    let mut file = File::open(path).map_err(|e| write_failed(name, e))?;
                    std::io::copy(&mut file, &mut zip).map_err(|e| write_failed(name, e))?;
                }
            }
            tracing::debug!("Packed entry {} ({} bytes)", name, len);
        }

        zip.finish()
            .map_err(|e| CoreError::ArchiveWriteFailed(format!("Failed to finish archive: {}", e)))
    }
}

fn write_failed(entry: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::ArchiveWriteFailed(format!("Failed to write entry {}: {}", entry, err))
}

/// One file read back out of a package
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A finished archive
#[derive(Clone, Debug)]
pub struct Package {
    source: ArtifactSource,
    entry_names: Vec<String>,
    size_bytes: u64,
}

impl Package {
    /// Where the archive bytes live
    pub fn source(&self) -> &ArtifactSource {
        &self.source
    }

    pub fn into_source(self) -> ArtifactSource {
        self.source
    }

    /// Entry names in archive order
    pub fn entry_names(&self) -> &[String] {
        &self.entry_names
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Read every entry back out of the archive, in archive order.
    pub fn entries(&self) -> CoreResult<Vec<PackageEntry>> {
        match &self.source {
            ArtifactSource::Bytes(bytes) => read_entries(Cursor::new(bytes.as_slice())),
            ArtifactSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        CoreError::ArtifactNotFound(path.display().to_string())
                    } else {
                        CoreError::IoError(e)
                    }
                })?;
                read_entries(file)
            }
        }
    }
}

fn read_entries<R: Read + Seek>(reader: R) -> CoreResult<Vec<PackageEntry>> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| CoreError::ValidationError(format!("Not a valid package: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| CoreError::ValidationError(format!("Corrupt package entry: {}", e)))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        entries.push(PackageEntry {
            name: file.name().to_string(),
            bytes,
        });
    }
    Ok(entries)
}
