//! Error policy: decides whether a recoverable defect aborts the sync.

use thiserror::Error;

use modsync_core::{BuildError, Commit, GitHash, Module, ModuleConfigError};

use crate::collaborators::BoxError;

/// Why a recorded sync point cannot serve as a resume boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncPointError {
    #[error("commit not found in the repository")]
    NotFound,

    #[error("commit is not in the history of branch {branch}")]
    NotInHistory { branch: String },
}

/// Decides what happens when the engine hits a recoverable defect.
///
/// `Ok(())` skips the defect and continues; `Err` aborts the sync in a
/// partially-synced state.
pub trait ErrorHandler {
    /// The module declaration is missing or malformed at `commit`.
    fn invalid_module_config(
        &self,
        module: &Module,
        commit: &Commit,
        err: &ModuleConfigError,
    ) -> Result<(), BoxError>;

    /// The declaration parses but the module does not build at `commit`.
    fn build_failure(&self, module: &Module, commit: &Commit, err: &BuildError)
        -> Result<(), BoxError>;

    /// The recorded sync point for `module` on `branch` is unusable.
    ///
    /// `Ok(())` resumes from the repository root.
    fn invalid_sync_point(
        &self,
        module: &Module,
        branch: &str,
        sync_point: &GitHash,
        err: &SyncPointError,
    ) -> Result<(), BoxError>;
}

/// Warns and continues on bad commits; refuses to continue past a lost sync
/// point.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn invalid_module_config(
        &self,
        module: &Module,
        commit: &Commit,
        err: &ModuleConfigError,
    ) -> Result<(), BoxError> {
        // Resumption means a commit is normally seen once, so this warns once.
        tracing::warn!(
            "invalid module config: module={module} commit={} error={err}",
            commit.hash
        );
        Ok(())
    }

    fn build_failure(
        &self,
        module: &Module,
        commit: &Commit,
        err: &BuildError,
    ) -> Result<(), BoxError> {
        tracing::warn!(
            "module build failure: module={module} commit={} error={err}",
            commit.hash
        );
        Ok(())
    }

    fn invalid_sync_point(
        &self,
        module: &Module,
        branch: &str,
        sync_point: &GitHash,
        err: &SyncPointError,
    ) -> Result<(), BoxError> {
        match err {
            SyncPointError::NotFound => Err(format!(
                "last synced commit {sync_point} was not found for module {module}; did you rebase?"
            )
            .into()),
            SyncPointError::NotInHistory { .. } => Err(format!(
                "last synced commit {sync_point} for module {module} is not in the history of branch {branch}: {err}"
            )
            .into()),
        }
    }
}
