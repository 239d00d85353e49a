use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trace data in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Archive error: {0}")]
    Archive(#[from] rkyv::rancor::Error),

    #[error("invalid info file: {0}")]
    InfoDecode(#[from] toml::de::Error),

    #[error("cannot encode info file: {0}")]
    InfoEncode(#[from] toml::ser::Error),

    #[error("recording stopped early on {tasks} thread(s)")]
    Incomplete { tasks: usize },
}

impl TraceError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TraceError::File {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TraceError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
