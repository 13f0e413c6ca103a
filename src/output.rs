//! The final output boundary of a build.
//!
//! This module contains the [`FileHandle`] struct, the unit of data flowing
//! through every pipeline, and [`write`], which materializes a batch of
//! handles under a destination root.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::WriteError;

/// The content of a [`FileHandle`].
#[derive(Debug, Clone)]
pub enum FileData {
    /// Text content (UTF-8).
    Utf8(String),
    /// Binary content (raw bytes).
    Binary(Vec<u8>),
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileData::Utf8(s) => s.as_bytes(),
            FileData::Binary(b) => b.as_slice(),
        }
    }
}

/// A single file travelling through a pipeline.
///
/// `source` is where the contents came from on disk and only serves error
/// reporting; `path` is relative to the destination root and decides where
/// the file lands when written. Stages may rewrite either the path or the
/// data, or collapse many handles into one.
#[derive(Debug, Clone)]
pub struct FileHandle {
    /// The path of the originating file, if any.
    pub source: Utf8PathBuf,
    /// The destination path, relative to the output root.
    pub path: Utf8PathBuf,
    /// The content of the file.
    pub data: FileData,
}

impl FileHandle {
    /// Creates a text handle not backed by any source file.
    pub fn utf8(path: impl Into<Utf8PathBuf>, data: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            path,
            data: FileData::Utf8(data.into()),
        }
    }

    /// Creates a binary handle not backed by any source file.
    pub fn binary(path: impl Into<Utf8PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            path,
            data: FileData::Binary(data.into()),
        }
    }
}

/// Writes every handle to `dest_root/handle.path`, creating intermediate
/// directories and overwriting existing files. The first failed write aborts
/// with the offending path; files written before it are left in place.
pub fn write(dest_root: impl AsRef<Utf8Path>, handles: &[FileHandle]) -> Result<(), WriteError> {
    let dest_root = dest_root.as_ref();

    for handle in handles {
        let path = dest_root.join(&handle.path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WriteError {
                path: path.clone(),
                source,
            })?;
        }

        fs::write(&path, &handle.data).map_err(|source| WriteError { path, source })?;
    }

    Ok(())
}
