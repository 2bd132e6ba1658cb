//! Deployable archive for the compute function.
//!
//! Entries are written in sorted name order with a fixed timestamp and
//! permissions, so the same input always yields byte-identical output.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Directory names never included in a payload.
const SKIPPED_DIRS: [&str; 2] = ["__pycache__", "node_modules"];

/// Errors raised while building or reading a payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PackageError {
    /// The payload would contain no files.
    #[error("function payload has no files")]
    NoFiles,
    /// An entry name was empty.
    #[error("function payload entry names must not be empty")]
    EmptyName,
    /// Two inputs mapped to the same entry name.
    #[error("duplicate payload entry '{0}'")]
    DuplicateEntry(String),
    /// Writing or reading the archive failed.
    #[error("archive error: {0}")]
    Archive(String),
    /// Reading the source directory failed.
    #[error("failed to read function source `{path}`: {message}")]
    Source {
        /// Path that failed.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
}

impl From<zip::result::ZipError> for PackageError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Builds a zip archive from a mapping of entry name to content.
///
/// The input order does not affect the output.
///
/// # Errors
///
/// Returns [`PackageError`] when the mapping is empty, contains an empty or
/// duplicate name, or the archive cannot be written.
pub fn package<I, K, V>(files: I) -> Result<Vec<u8>, PackageError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<[u8]>,
{
    let mut sorted = BTreeMap::new();
    for (name, content) in files {
        let name = name.into();
        if name.is_empty() {
            return Err(PackageError::EmptyName);
        }
        if sorted.contains_key(&name) {
            return Err(PackageError::DuplicateEntry(name));
        }
        sorted.insert(name, content);
    }
    if sorted.is_empty() {
        return Err(PackageError::NoFiles);
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in &sorted {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(content.as_ref())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Reads every file entry of an archive into a sorted mapping.
///
/// # Errors
///
/// Returns [`PackageError::Archive`] when the bytes are not a readable zip
/// archive.
pub fn unpack(archive: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, PackageError> {
    let mut reader = ZipArchive::new(Cursor::new(archive))?;
    let mut files = BTreeMap::new();
    for index in 0..reader.len() {
        let mut entry = reader.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.insert(entry.name().to_owned(), content);
    }
    Ok(files)
}

/// Loads the function sources under `root`, keyed by `/`-separated relative
/// path. Hidden entries and cache directories are skipped.
///
/// # Errors
///
/// Returns [`PackageError::Source`] when a directory or file cannot be read.
pub fn load_source_dir(root: &Utf8Path) -> Result<BTreeMap<String, Vec<u8>>, PackageError> {
    let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(|err| {
        PackageError::Source {
            path: root.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let mut files = BTreeMap::new();
    collect(&dir, root, "", &mut files)?;
    Ok(files)
}

fn collect(
    dir: &Dir,
    path: &Utf8Path,
    prefix: &str,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> Result<(), PackageError> {
    let source_err = |err: std::io::Error| PackageError::Source {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    for entry in dir.entries().map_err(source_err)? {
        let entry = entry.map_err(source_err)?;
        let name = entry.file_name().map_err(source_err)?;
        if name.starts_with('.') {
            continue;
        }
        let key = format!("{prefix}{name}");
        let file_type = entry.file_type().map_err(source_err)?;
        if file_type.is_dir() {
            if SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            let child = dir.open_dir(&name).map_err(source_err)?;
            collect(&child, &path.join(&name), &format!("{key}/"), files)?;
        } else if file_type.is_file() {
            let content = dir.read(&name).map_err(source_err)?;
            files.insert(key, content);
        }
    }
    Ok(())
}
