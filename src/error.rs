use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors found while validating the task graph. All of these are detected
/// eagerly, before any task action runs.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle between tasks: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("task '{0}' is registered more than once")]
    DuplicateTask(String),

    #[error("no task named '{0}' is registered")]
    UnknownTask(String),
}

/// Errors from expanding source patterns against the filesystem.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't read source file.\n{0}")]
    FileSystem(#[from] std::io::Error),

    #[error("'{file}' does not start with base directory '{base}'")]
    OutsideBase {
        file: Utf8PathBuf,
        base: Utf8PathBuf,
    },
}

/// Errors raised by a pipeline stage. `Compile` carries the identity of the
/// offending source file; in a guarded pipeline it is logged and the file is
/// dropped instead of aborting the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Couldn't compile '{file}'.\n{source}")]
    Compile {
        file: Utf8PathBuf,
        source: anyhow::Error,
    },

    #[error("File '{file}' is not valid UTF-8")]
    InvalidUtf8 { file: Utf8PathBuf },
}

#[derive(Debug, Error)]
#[error("Couldn't write '{path}'.\n{source}")]
pub struct WriteError {
    pub path: Utf8PathBuf,
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
#[error("Couldn't remove '{path}'.\n{source}")]
pub struct CleanError {
    pub path: Utf8PathBuf,
    pub source: std::io::Error,
}

/// Top level failure of a build run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task '{name}':\n{source}")]
    Task {
        name: String,
        source: anyhow::Error,
    },
}
