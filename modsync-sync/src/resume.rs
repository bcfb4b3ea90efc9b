//! Resumption: turns recorded sync points and synced-commit sets into the
//! commits each module still needs on a branch.

use std::collections::{BTreeSet, HashSet};

use modsync_core::{GitHash, Module, ModuleIdentity};
use modsync_git::Repository;

use crate::collaborators::{SyncPointResolver, SyncedCommitChecker};
use crate::error::SyncError;
use crate::handler::{ErrorHandler, SyncPointError};
use crate::materialize::abort;
use crate::walk::{Ancestry, AncestryPolicy};

/// What one branch still needs, across every module.
#[derive(Debug)]
pub(crate) struct BranchPlan {
    /// Commits pending for at least one module, in delivery order.
    pub order: Vec<GitHash>,
    /// Pending commits per module, indexed like the module list.
    pub pending: Vec<HashSet<GitHash>>,
}

/// A module as seen by the reconciler: the identity it resumes under, if any.
pub(crate) struct Target<'m> {
    pub module: &'m Module,
    pub identity: Option<ModuleIdentity>,
}

pub(crate) struct Reconciler<'a> {
    pub repo: &'a dyn Repository,
    pub handler: &'a dyn ErrorHandler,
    pub resolver: Option<&'a dyn SyncPointResolver>,
    pub checker: Option<&'a dyn SyncedCommitChecker>,
    pub policy: AncestryPolicy,
}

impl Reconciler<'_> {
    pub fn plan(
        &self,
        branch: &str,
        head: &GitHash,
        targets: &[Target<'_>],
    ) -> Result<BranchPlan, SyncError> {
        let mut boundaries = Vec::with_capacity(targets.len());
        for target in targets {
            boundaries.push(self.boundary(branch, target)?);
        }

        let known: Vec<GitHash> = boundaries.iter().flatten().cloned().collect();
        let to_root = boundaries.iter().any(Option::is_none);
        let ancestry = Ancestry::walk(self.repo, head, self.policy, &known, to_root)?;

        let mut pending = Vec::with_capacity(targets.len());
        for (target, boundary) in targets.iter().zip(&boundaries) {
            let mut commits = match boundary {
                None => ancestry.order().to_vec(),
                Some(sync_point) => match ancestry.after(sync_point) {
                    Some(commits) => commits,
                    None => {
                        let err = SyncPointError::NotInHistory {
                            branch: branch.to_owned(),
                        };
                        self.handler
                            .invalid_sync_point(target.module, branch, sync_point, &err)
                            .map_err(|source| abort(target.module, source))?;
                        tracing::warn!(
                            "sync point {sync_point} for {} is not on {branch}; resuming from the root",
                            target.module
                        );
                        ancestry.order().to_vec()
                    }
                },
            };
            self.drop_synced(target, &mut commits)?;
            tracing::info!(
                "{} on {branch}: {} commit(s) to sync",
                target.module,
                commits.len()
            );
            pending.push(commits.into_iter().collect::<HashSet<_>>());
        }

        let order = ancestry
            .order()
            .iter()
            .filter(|hash| pending.iter().any(|p| p.contains(*hash)))
            .cloned()
            .collect();
        Ok(BranchPlan { order, pending })
    }

    /// The last synced commit to resume after, or `None` to start at the root.
    fn boundary(&self, branch: &str, target: &Target<'_>) -> Result<Option<GitHash>, SyncError> {
        let (Some(resolver), Some(identity)) = (self.resolver, &target.identity) else {
            return Ok(None);
        };
        let sync_point =
            resolver
                .resolve(identity, branch)
                .map_err(|source| SyncError::Resolver {
                    module: identity.clone(),
                    branch: branch.to_owned(),
                    source,
                })?;
        let Some(sync_point) = sync_point else {
            return Ok(None);
        };
        match self.repo.commit(&sync_point) {
            Ok(_) => Ok(Some(sync_point)),
            Err(err) if err.is_not_found() => {
                self.handler
                    .invalid_sync_point(target.module, branch, &sync_point, &SyncPointError::NotFound)
                    .map_err(|source| abort(target.module, source))?;
                tracing::warn!(
                    "sync point {sync_point} for {} not found; resuming from the root",
                    target.module
                );
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn drop_synced(&self, target: &Target<'_>, commits: &mut Vec<GitHash>) -> Result<(), SyncError> {
        let (Some(checker), Some(identity)) = (self.checker, &target.identity) else {
            return Ok(());
        };
        if commits.is_empty() {
            return Ok(());
        }
        let candidates: BTreeSet<GitHash> = commits.iter().cloned().collect();
        let synced = checker
            .synced(identity, &candidates)
            .map_err(|source| SyncError::Checker {
                module: identity.clone(),
                source,
            })?;
        if !synced.is_empty() {
            tracing::debug!("{} has {} commit(s) already synced", target.module, synced.len());
            commits.retain(|hash| !synced.contains(hash));
        }
        Ok(())
    }
}
