//! Composable file transformation pipelines.
//!
//! A [`Pipeline`] is a list of [`Stage`]s folded over a batch of
//! [`FileHandle`]s in the order the build author declared them. Stages are
//! plain data, so a single stage can be unit-tested in isolation and a
//! pipeline can be inspected before it runs.
//!
//! Pipelines come in two flavors. A strict pipeline aborts on the first
//! per-file failure. A guarded pipeline logs the failure together with the
//! offending file and drops that file from the stream, letting the rest of
//! the batch through. Guarded mode is chosen per pipeline at the
//! construction site, never globally.

use std::fmt::Debug;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::error::PipelineError;
use crate::output::{FileData, FileHandle};

type RenameFn = Box<dyn Fn(&Utf8Path) -> Utf8PathBuf + Send + Sync>;
type CompileFn = Box<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;
type MinifyFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// One transform applied to a stream of file handles.
pub enum Stage {
    /// Rewrites destination paths; contents are untouched.
    Rename(RenameFn),
    /// Merges all handles' contents, in input order, into a single handle.
    Concat { target: Utf8PathBuf },
    /// 1:1 fallible content transform. Failures carry the source file.
    Compile(CompileFn),
    /// 1:1 infallible content transform. Binary handles pass through.
    Minify(MinifyFn),
}

impl Stage {
    pub fn rename<F>(func: F) -> Self
    where
        F: Fn(&Utf8Path) -> Utf8PathBuf + Send + Sync + 'static,
    {
        Stage::Rename(Box::new(func))
    }

    /// Drops the directory component, flattening the output tree.
    pub fn flatten() -> Self {
        Stage::rename(|path| path.file_name().unwrap_or(path.as_str()).into())
    }

    /// Inserts a suffix between the file stem and its extension,
    /// `style.css` + `".min"` -> `style.min.css`.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Stage::rename(move |path| {
            let stem = path.file_stem().unwrap_or_default();
            let name = match path.extension() {
                Some(ext) => format!("{stem}{suffix}.{ext}"),
                None => format!("{stem}{suffix}"),
            };
            path.with_file_name(name)
        })
    }

    /// Replaces the file extension.
    pub fn extension(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Stage::rename(move |path| path.with_extension(&extension))
    }

    pub fn concat(target: impl Into<Utf8PathBuf>) -> Self {
        Stage::Concat {
            target: target.into(),
        }
    }

    pub fn compile<F>(func: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Stage::Compile(Box::new(func))
    }

    pub fn minify<F>(func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Stage::Minify(Box::new(func))
    }

    /// Compiles SCSS to compressed CSS with the given include paths.
    #[cfg(feature = "grass")]
    pub fn scss<I, P>(include_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        let paths: Vec<Utf8PathBuf> = include_paths.into_iter().map(Into::into).collect();

        Stage::compile(move |text| {
            let mut options = grass::Options::default().style(grass::OutputStyle::Compressed);
            for path in &paths {
                options = options.load_path(path.as_std_path());
            }

            grass::from_string(text.to_owned(), &options)
                .map_err(|err| anyhow::anyhow!(err.to_string()))
        })
    }

    /// Runs this stage in strict mode. Used directly in tests and by strict
    /// pipelines; guarded pipelines go through [`Pipeline::run`].
    pub fn apply(&self, input: Vec<FileHandle>) -> Result<Vec<FileHandle>, PipelineError> {
        self.run(input, false)
    }

    fn run(&self, input: Vec<FileHandle>, guarded: bool) -> Result<Vec<FileHandle>, PipelineError> {
        match self {
            Stage::Rename(func) => Ok(input
                .into_iter()
                .map(|mut handle| {
                    handle.path = func(&handle.path);
                    handle
                })
                .collect()),

            Stage::Concat { target } => {
                let mut bytes = Vec::new();
                for handle in &input {
                    bytes.extend_from_slice(handle.data.as_ref());
                }

                let data = match String::from_utf8(bytes) {
                    Ok(text) => FileData::Utf8(text),
                    Err(err) => FileData::Binary(err.into_bytes()),
                };

                Ok(vec![FileHandle {
                    source: target.clone(),
                    path: target.clone(),
                    data,
                }])
            }

            Stage::Compile(func) => {
                let mut output = Vec::with_capacity(input.len());

                for mut handle in input {
                    match compile_one(func, &handle) {
                        Ok(text) => {
                            handle.data = FileData::Utf8(text);
                            output.push(handle);
                        }
                        Err(err) if guarded => {
                            warn!(file = %handle.source, "skipping file: {err}");
                        }
                        Err(err) => return Err(err),
                    }
                }

                Ok(output)
            }

            Stage::Minify(func) => Ok(input
                .into_iter()
                .map(|mut handle| {
                    if let FileData::Utf8(text) = &handle.data {
                        handle.data = FileData::Utf8(func(text));
                    }
                    handle
                })
                .collect()),
        }
    }
}

fn compile_one(func: &CompileFn, handle: &FileHandle) -> Result<String, PipelineError> {
    let FileData::Utf8(text) = &handle.data else {
        return Err(PipelineError::InvalidUtf8 {
            file: handle.source.clone(),
        });
    };

    func(text).map_err(|source| PipelineError::Compile {
        file: handle.source.clone(),
        source,
    })
}

impl Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Rename(_) => write!(f, "Stage::Rename(*)"),
            Stage::Concat { target } => write!(f, "Stage::Concat({target})"),
            Stage::Compile(_) => write!(f, "Stage::Compile(*)"),
            Stage::Minify(_) => write!(f, "Stage::Minify(*)"),
        }
    }
}

/// An ordered chain of stages plus the error containment mode.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    guarded: bool,
}

impl Pipeline {
    /// A strict pipeline: the first per-file failure aborts the whole run.
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            guarded: false,
        }
    }

    /// A guarded pipeline: per-file failures are logged and the offending
    /// file is dropped from the stream.
    pub fn guarded(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            guarded: true,
        }
    }

    /// Folds the input through every stage, left to right.
    pub fn run(&self, input: Vec<FileHandle>) -> Result<Vec<FileHandle>, PipelineError> {
        self.stages
            .iter()
            .try_fold(input, |handles, stage| stage.run(handles, self.guarded))
    }
}
