//! Collaborator contracts consumed by the sync engine.

use modsync_core::{Bucket, Commit, GitHash};

use crate::error::RepoError;

/// The only remote whose tracking branches are visible to the engine.
pub const REMOTE: &str = "origin";

/// Read-only view of a repository's branches and commit graph.
pub trait Repository {
    /// The remote's recorded default branch.
    fn default_branch(&self) -> Result<String, RepoError>;

    /// The locally checked-out branch.
    fn current_branch(&self) -> Result<String, RepoError>;

    /// Every remote-tracking branch under [`REMOTE`], sorted by name.
    fn remote_branches(&self) -> Result<Vec<String>, RepoError>;

    /// Head commit of a remote-tracking branch.
    fn remote_branch_head(&self, branch: &str) -> Result<GitHash, RepoError>;

    /// Resolve a hash to a commit, or [`RepoError::ObjectNotFound`].
    fn commit(&self, hash: &GitHash) -> Result<Commit, RepoError>;

    /// Names of the tags pointing at a commit, sorted.
    fn tags_for_commit(&self, hash: &GitHash) -> Result<Vec<String>, RepoError>;
}

/// Produces content-addressable snapshots of repository subtrees.
pub trait StorageProvider {
    /// Snapshot `dir` (repository-relative, `.` for the root) at `commit`.
    ///
    /// A directory absent at that commit yields an empty bucket.
    fn snapshot(&self, commit: &GitHash, dir: &str) -> Result<Bucket, RepoError>;
}
