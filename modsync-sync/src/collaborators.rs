//! Registry-side collaborators the engine consults before and during a walk.
//!
//! Each trait is also implemented for plain closures with the matching
//! signature.

use std::collections::BTreeSet;

use modsync_core::{GitHash, ModuleIdentity};

/// Error type returned by collaborators and sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Finds the last commit already synced for a module on a branch.
pub trait SyncPointResolver {
    /// `Ok(None)` means nothing has been synced yet.
    fn resolve(&self, module: &ModuleIdentity, branch: &str) -> Result<Option<GitHash>, BoxError>;
}

impl<F> SyncPointResolver for F
where
    F: Fn(&ModuleIdentity, &str) -> Result<Option<GitHash>, BoxError>,
{
    fn resolve(&self, module: &ModuleIdentity, branch: &str) -> Result<Option<GitHash>, BoxError> {
        self(module, branch)
    }
}

/// Reports which of a set of commits a registry already holds for a module.
pub trait SyncedCommitChecker {
    /// Returns the subset of `candidates` already synced.
    fn synced(
        &self,
        module: &ModuleIdentity,
        candidates: &BTreeSet<GitHash>,
    ) -> Result<BTreeSet<GitHash>, BoxError>;
}

impl<F> SyncedCommitChecker for F
where
    F: Fn(&ModuleIdentity, &BTreeSet<GitHash>) -> Result<BTreeSet<GitHash>, BoxError>,
{
    fn synced(
        &self,
        module: &ModuleIdentity,
        candidates: &BTreeSet<GitHash>,
    ) -> Result<BTreeSet<GitHash>, BoxError> {
        self(module, candidates)
    }
}

/// What a registry records as a module's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDefaultBranch {
    Branch(String),
    /// The module has not been created yet; the check passes.
    ModuleDoesNotExist,
}

/// Looks up a module's default branch in the registry.
pub trait DefaultBranchGetter {
    fn default_branch(&self, module: &ModuleIdentity) -> Result<RemoteDefaultBranch, BoxError>;
}

impl<F> DefaultBranchGetter for F
where
    F: Fn(&ModuleIdentity) -> Result<RemoteDefaultBranch, BoxError>,
{
    fn default_branch(&self, module: &ModuleIdentity) -> Result<RemoteDefaultBranch, BoxError> {
        self(module)
    }
}
