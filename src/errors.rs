use std::error::Error;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

/// A complete wire frame whose payload could not be parsed as JSON.
///
/// Fatal for the stream that produced it: the producer kills the tracer and
/// reports the run as failed (§ protocol failure).
#[derive(Debug)]
pub struct FrameError(pub serde_json::Error);

impl Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed trace frame: {}", self.0)
    }
}

impl Error for FrameError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(err: serde_json::Error) -> Self {
        Self(err)
    }
}

/// Failure to start a tracer run, before any element is produced.
#[derive(Debug)]
pub enum LaunchError {
    /// The configured tracer command is empty.
    MissingTracerCommand,
    /// No tracer entry path was configured (neither CLI, env, nor config file).
    MissingTracerEntry,
    /// The loopback listener could not be opened.
    Bind(io::Error),
    /// The tracer subprocess could not be spawned.
    Spawn { program: String, source: io::Error },
}

impl Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTracerCommand => {
                write!(f, "tracer command is missing")
            }
            Self::MissingTracerEntry => {
                write!(f, "no tracer entry path configured")
            }
            Self::Bind(err) => write!(f, "can't open trace socket: {err}"),
            Self::Spawn { program, source } => {
                write!(f, "can't start tracer '{program}': {source}")
            }
        }
    }
}

impl Error for LaunchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingTracerCommand | Self::MissingTracerEntry => None,
            Self::Bind(err) => Some(err),
            Self::Spawn { source, .. } => Some(source),
        }
    }
}

/// Errors from the trace cache store.
#[derive(Debug)]
pub enum CacheError {
    /// `load` was called for a hash that was never stored.
    Missing { hash: String },
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { hash } => write!(f, "no cached trace for hash {hash}"),
            Self::Io(err) => write!(f, "trace cache i/o error: {err}"),
            Self::Json(err) => write!(f, "trace cache contains invalid JSON: {err}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Missing { .. } => None,
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// Errors from starting a visualization run in a session.
#[derive(Debug)]
pub enum StartError {
    /// The target file could not be read (needed for hashing).
    ReadTarget { path: PathBuf, source: io::Error },
    Cache(CacheError),
    Launch(LaunchError),
}

impl Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadTarget { path, source } => {
                write!(f, "can't read {}: {source}", path.display())
            }
            Self::Cache(err) => write!(f, "{err}"),
            Self::Launch(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StartError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ReadTarget { source, .. } => Some(source),
            Self::Cache(err) => Some(err),
            Self::Launch(err) => Some(err),
        }
    }
}

impl From<CacheError> for StartError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err)
    }
}

impl From<LaunchError> for StartError {
    fn from(err: LaunchError) -> Self {
        Self::Launch(err)
    }
}
