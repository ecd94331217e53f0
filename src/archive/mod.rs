//! Safe extraction of plugin and template archives.
//!
//! Plugins ship as `tar.gz`, template archives as `zip`. The format is chosen by
//! the caller from where the bytes came from, never by sniffing the content.
//!
//! Every entry name is checked before anything is written: the cleaned path
//! `dest/<entry>` must stay inside `dest`. Entries containing `..` that escape the
//! root, absolute paths, Windows prefixes and symlink/hard-link entries abort the
//! whole extraction with [`IacpmError::InvalidArchive`]. Extraction into a
//! directory that already has content is allowed; files are overwritten.
//!
//! All functions here perform blocking I/O. Async callers run them inside
//! `tokio::task::spawn_blocking`.

use crate::constants::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::core::IacpmError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

/// Supported archive encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip-compressed tar stream (plugin releases)
    TarGz,
    /// zip archive (template downloads)
    Zip,
}

impl ArchiveFormat {
    /// Picks a format from a file name's extension.
    ///
    /// Only used for local archives handed to the CLI, where the file name is all
    /// the context there is.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TarGz => write!(f, "tar.gz"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// Extracts `reader` into `dest` using `format`.
///
/// `dest` is created if missing. On error, entries written before the failing one
/// remain; callers extract into a private staging directory and discard it.
pub fn extract(reader: impl Read, dest: &Path, format: ArchiveFormat) -> Result<()> {
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(reader, dest),
        ArchiveFormat::Zip => extract_zip(reader, dest),
    }
}

/// Extracts a gzip-compressed tar stream.
pub fn extract_tar_gz(reader: impl Read, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extraction directory: {}", dest.display()))?;

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().context("Failed to read tar archive")?;

    for entry in entries {
        let mut entry = entry.context("Failed to read tar entry")?;
        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_type = entry.header().entry_type();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(invalid_entry(&raw_name, "links are not allowed in archives"));
        }

        let target = sanitize_entry_path(dest, &raw_name)?;
        let mode = entry.header().mode().ok();

        if entry_type.is_dir() {
            create_dir(&target, mode)?;
        } else if entry_type.is_file() || entry_type == tar::EntryType::Continuous {
            write_file(&target, &mut entry, mode, &raw_name)?;
        } else {
            // PAX/GNU metadata headers are consumed by the tar crate; anything else
            // (devices, fifos) is skipped.
            tracing::debug!(entry = %raw_name, ?entry_type, "Skipping unsupported tar entry");
        }
    }

    Ok(())
}

/// Extracts a zip archive.
///
/// Zip needs random access, so the stream is buffered in memory first. Template
/// archives are small enough for this.
pub fn extract_zip(mut reader: impl Read, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extraction directory: {}", dest.display()))?;

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).context("Failed to read zip archive")?;

    let mut archive =
        zip::ZipArchive::new(Cursor::new(buffer)).context("Failed to open zip archive")?;

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .with_context(|| format!("Failed to read zip entry #{index}"))?;
        let raw_name = file.name().to_string();

        if file.is_symlink() {
            return Err(invalid_entry(&raw_name, "links are not allowed in archives"));
        }

        let target = sanitize_entry_path(dest, &raw_name)?;
        let mode = file.unix_mode();

        if file.is_dir() {
            create_dir(&target, mode)?;
        } else {
            write_file(&target, &mut file, mode, &raw_name)?;
        }
    }

    Ok(())
}

/// Resolves `entry` below `root`, rejecting anything that would land outside it.
///
/// The check is lexical: `.` components are dropped, `..` pops the last pushed
/// component and fails if there is nothing left to pop. This mirrors cleaning
/// `root/entry` and testing the result for a `root` prefix on separator
/// boundaries.
pub fn sanitize_entry_path(root: &Path, entry: &str) -> Result<PathBuf> {
    // Archives written on Windows may use backslashes
    let normalized = entry.replace('\\', "/");
    let mut relative = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(invalid_entry(entry, "path escapes the destination directory"));
                }
                relative.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid_entry(entry, "absolute paths are not allowed"));
            }
        }
    }

    Ok(root.join(relative))
}

fn invalid_entry(entry: &str, reason: &str) -> anyhow::Error {
    IacpmError::InvalidArchive {
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn create_dir(path: &Path, mode: Option<u32>) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    set_mode(path, mode.unwrap_or(DEFAULT_DIR_MODE) | 0o700)
}

fn write_file(path: &Path, contents: &mut impl Read, mode: Option<u32>, entry: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    std::io::copy(contents, &mut file)
        .with_context(|| format!("Failed to extract archive entry: {entry}"))?;

    set_mode(path, mode.unwrap_or(DEFAULT_FILE_MODE))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // Only permission bits; file type bits from the archive header are dropped
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
