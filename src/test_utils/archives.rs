//! In-memory archive builders for tests.
//!
//! Unlike `tar::Builder::append_path`, [`build_tar_gz`] writes entry names
//! verbatim, so tests can produce the malicious `../` entries the extractor
//! must reject.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Cursor, Write};

/// One entry of a tar archive under construction.
#[derive(Debug, Clone)]
pub struct TarEntry {
    name: String,
    kind: TarEntryKind,
    mode: u32,
}

#[derive(Debug, Clone)]
enum TarEntryKind {
    File(Vec<u8>),
    Dir,
    Symlink(String),
}

impl TarEntry {
    pub fn file(name: &str, contents: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            kind: TarEntryKind::File(contents.to_vec()),
            mode: 0o644,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TarEntryKind::Dir,
            mode: 0o755,
        }
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TarEntryKind::Symlink(target.to_string()),
            mode: 0o777,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Builds a gzip-compressed tar archive from `entries`, in order.
pub fn build_tar_gz(entries: &[TarEntry]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        let name = entry.name.as_bytes();
        assert!(name.len() < 100, "test tar entry names must be short: {}", entry.name);
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_mode(entry.mode);
        header.set_mtime(0);

        let data: &[u8] = match &entry.kind {
            TarEntryKind::File(contents) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(contents.len() as u64);
                contents
            }
            TarEntryKind::Dir => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                &[]
            }
            TarEntryKind::Symlink(target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_link_name(target).expect("valid link name");
                &[]
            }
        };
        header.set_cksum();
        builder.append(&header, data).expect("append tar entry");
    }

    builder
        .into_inner()
        .expect("finish tar archive")
        .finish()
        .expect("finish gzip stream")
}

/// Builds a zip archive. `None` contents add a directory entry.
pub fn build_zip(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();

    for (name, contents) in entries {
        match contents {
            Some(contents) => {
                writer.start_file(*name, options).expect("start zip entry");
                writer.write_all(contents).expect("write zip entry");
            }
            None => {
                writer.add_directory(*name, options).expect("add zip directory");
            }
        }
    }

    writer.finish().expect("finish zip archive").into_inner()
}
