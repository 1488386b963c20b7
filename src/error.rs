use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Failures raised by the deployment engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Can't read application config {}: {reason}", .path.display())]
    ConfigUnreadable { path: PathBuf, reason: String },

    #[error("No revision found for application {app_id}")]
    NoVersions { app_id: String },

    #[error("No compose project file found in {}", .dir.display())]
    NoProjectFile { dir: PathBuf },

    #[error("Both {first} and {second} exist in {}, remove one of them", .dir.display())]
    AmbiguousProjectFile {
        dir: PathBuf,
        first: String,
        second: String,
    },

    #[error("Path {filename:?} escapes the deployment directory")]
    PathTraversal { filename: String },

    #[error("`{command}` failed ({status}):\n{output}")]
    DriverFailure {
        command: String,
        status: String,
        output: String,
    },

    #[error("{} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Application {app_id} is not deployed")]
    NotDeployed { app_id: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Serialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Container inspection failed: {reason}")]
    Inspector { reason: String },
}

impl EngineError {
    /// Builds a `map_err` adapter attaching `context` to an I/O failure.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> EngineError {
        let context = context.into();
        move |source| EngineError::Io { context, source }
    }
}

/// Lifecycle operations exposed by the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Deploy,
    Start,
    Stop,
    Restart,
    Update,
    Rename,
    Delete,
    Status,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Deploy => "deploy",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Restart => "restart",
            Operation::Update => "update",
            Operation::Rename => "rename",
            Operation::Delete => "delete",
            Operation::Status => "status",
        };
        f.write_str(name)
    }
}

/// A fatal lifecycle failure, always tagged with the application and the operation attempted.
#[derive(Debug, Error)]
#[error("{operation} of application {app_id} failed: {source}")]
pub struct LifecycleError {
    pub app_id: String,
    pub operation: Operation,
    #[source]
    pub source: EngineError,
}

impl LifecycleError {
    pub fn new(app_id: &str, operation: Operation, source: EngineError) -> Self {
        Self {
            app_id: app_id.to_string(),
            operation,
            source,
        }
    }
}
