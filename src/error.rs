use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the registry, launcher and store layers.
#[derive(Debug, Error)]
pub enum RandRunError {
    #[error("failed to read runnable list {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable runnables to choose from")]
    EmptyRegistry,

    #[error("failed to launch `{command}`")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store {op} failed for {}", path.display())]
    Store {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store {} is locked by another tracked run", path.display())]
    StoreBusy { path: PathBuf },
}

impl RandRunError {
    /// Map a SQLite failure, singling out lock contention.
    pub fn store(op: &'static str, path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        let path = path.into();
        match source.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                RandRunError::StoreBusy { path }
            }
            _ => RandRunError::Store { op, path, source },
        }
    }
}
