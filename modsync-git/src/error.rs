//! Error types for modsync-git.

use std::path::PathBuf;

use thiserror::Error;

use modsync_core::{GitHash, HashError};

/// All errors that can arise from repository access.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to open repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// The object store has no commit with this hash.
    #[error("object {0} not found")]
    ObjectNotFound(GitHash),

    #[error("remote branch {remote}/{branch} not found")]
    NoRemoteBranch { remote: &'static str, branch: String },

    #[error("remote {0} has no default branch (refs/remotes/{0}/HEAD is not set)")]
    NoDefaultBranch(&'static str),

    #[error("HEAD is not attached to a branch")]
    DetachedHead,

    #[error("invalid object name: {0}")]
    Hash(#[from] HashError),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl RepoError {
    /// True for the "hash absent from the object store" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::ObjectNotFound(_))
    }
}
