//! Error types for modsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use modsync_core::{GitHash, ModuleIdentity};
use modsync_git::RepoError;

use crate::collaborators::BoxError;

/// Every way a sync run can terminate early.
///
/// Recoverable per-commit defects never show up here unless the
/// [`ErrorHandler`](crate::ErrorHandler) chose to abort.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two modules share the same string form.
    #[error("duplicate module {0}")]
    DuplicateModule(String),

    /// Repository or storage access failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepoError),

    #[error(
        "default branch mismatch for module {module}: registry has {remote:?}, repository has {local:?}"
    )]
    DefaultBranchMismatch {
        module: ModuleIdentity,
        local: String,
        remote: String,
    },

    #[error("resolve sync point for module {module} on branch {branch}: {source}")]
    Resolver {
        module: ModuleIdentity,
        branch: String,
        #[source]
        source: BoxError,
    },

    #[error("check synced commits for module {module}: {source}")]
    Checker {
        module: ModuleIdentity,
        #[source]
        source: BoxError,
    },

    #[error("get default branch for module {module}: {source}")]
    DefaultBranchGetter {
        module: ModuleIdentity,
        #[source]
        source: BoxError,
    },

    /// The sink refused a module commit. Always fatal.
    #[error("sync {module} at {commit}: {source}")]
    Sink {
        module: ModuleIdentity,
        commit: GitHash,
        #[source]
        source: BoxError,
    },

    /// The error handler chose to abort.
    #[error("sync aborted at module {module}: {source}")]
    Aborted {
        module: String,
        #[source]
        source: BoxError,
    },

    #[error("sync cancelled")]
    Cancelled,
}

/// All errors that can arise from the local registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("module {0} not found in registry")]
    ModuleNotFound(ModuleIdentity),

    #[error("module {0} already exists in registry")]
    ModuleExists(ModuleIdentity),
}

/// Convenience constructor for [`RegistryError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
