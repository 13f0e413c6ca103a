//! Source file selection.
//!
//! A [`Source`] turns an ordered list of glob patterns into concrete
//! [`FileHandle`]s ready to be threaded through a pipeline. Matching is
//! delegated to the `glob` crate; this module only decides ordering and how
//! destination-relative paths are derived.

use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ResolveError;
use crate::output::{FileData, FileHandle};

/// A source specification: one or more glob patterns plus an optional base
/// directory controlling how relative paths are computed.
#[derive(Debug, Clone)]
pub struct Source {
    patterns: Vec<String>,
    base: Option<Utf8PathBuf>,
}

impl Source {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            base: None,
        }
    }

    /// Computes every match's relative path against `base` instead of the
    /// pattern's own directory component. Useful for keeping the directory
    /// structure of a deep vendored tree. Every match must live under
    /// `base`; one that does not fails resolution with the offending file.
    pub fn base(mut self, base: impl Into<Utf8PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Expands the patterns against the filesystem.
    ///
    /// Pattern order is preserved; matches within one pattern come out in
    /// lexicographic order. A file matched by several patterns is resolved
    /// once, at its first occurrence, so a literal pattern can pin a file
    /// ahead of a glob that also covers it. A pattern matching nothing
    /// contributes nothing, which is not an error.
    pub fn resolve(&self) -> Result<Vec<FileHandle>, ResolveError> {
        let mut handles = Vec::new();
        let mut resolved = HashSet::new();

        for pattern in &self.patterns {
            let mut matches = Vec::new();

            for entry in glob::glob(pattern)? {
                let entry = Utf8PathBuf::try_from(entry?)?;
                if entry.is_dir() {
                    continue;
                }
                matches.push(entry);
            }

            matches.sort();

            let prefix = match &self.base {
                Some(base) => base.clone(),
                None => pattern_prefix(pattern),
            };

            for entry in matches {
                if !resolved.insert(entry.clone()) {
                    continue;
                }

                let path = match entry.strip_prefix(&prefix) {
                    Ok(path) => path.to_owned(),
                    // The default prefix is the pattern's own literal
                    // directory, which every match starts with; only an
                    // explicit base can miss.
                    Err(_) if self.base.is_some() => {
                        return Err(ResolveError::OutsideBase {
                            file: entry,
                            base: prefix,
                        });
                    }
                    Err(_) => entry.clone(),
                };
                let data = match String::from_utf8(fs::read(&entry)?) {
                    Ok(text) => FileData::Utf8(text),
                    Err(err) => FileData::Binary(err.into_bytes()),
                };

                handles.push(FileHandle {
                    source: entry,
                    path,
                    data,
                });
            }
        }

        Ok(handles)
    }
}

/// The literal directory component of a pattern: every path component up to
/// the first one containing a glob metacharacter. A pattern without any
/// metacharacter names a single file, so its final component is dropped.
fn pattern_prefix(pattern: &str) -> Utf8PathBuf {
    let components: Vec<_> = Utf8Path::new(pattern).components().collect();
    let cut = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[', '{']))
        .unwrap_or_else(|| components.len().saturating_sub(1));

    components[..cut].iter().collect()
}
