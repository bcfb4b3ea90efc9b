//! The sync engine.

use std::collections::HashSet;

use modsync_core::{Module, ModuleCommit};
use modsync_git::{Repository, StorageProvider};

use crate::branch::select_branches;
use crate::cancel::CancelToken;
use crate::collaborators::{
    BoxError, DefaultBranchGetter, RemoteDefaultBranch, SyncPointResolver, SyncedCommitChecker,
};
use crate::error::SyncError;
use crate::handler::ErrorHandler;
use crate::materialize::Materializer;
use crate::resume::{Reconciler, Target};
use crate::walk::AncestryPolicy;

/// Replays repository history into a sink, one [`ModuleCommit`] per
/// (module, commit) pair that still needs syncing.
///
/// Built once through [`Syncer::builder`]; [`Syncer::sync`] can be called
/// any number of times.
pub struct Syncer<'a> {
    repo: &'a dyn Repository,
    storage: &'a dyn StorageProvider,
    handler: &'a dyn ErrorHandler,
    modules: Vec<Module>,
    resolver: Option<&'a dyn SyncPointResolver>,
    checker: Option<&'a dyn SyncedCommitChecker>,
    default_branch_getter: Option<&'a dyn DefaultBranchGetter>,
    all_branches: bool,
    ancestry: AncestryPolicy,
}

/// Accumulates [`Syncer`] configuration. Duplicate modules are rejected by
/// [`SyncerBuilder::build`].
pub struct SyncerBuilder<'a> {
    syncer: Syncer<'a>,
}

impl<'a> Syncer<'a> {
    pub fn builder(
        repo: &'a dyn Repository,
        storage: &'a dyn StorageProvider,
        handler: &'a dyn ErrorHandler,
    ) -> SyncerBuilder<'a> {
        SyncerBuilder {
            syncer: Syncer {
                repo,
                storage,
                handler,
                modules: Vec::new(),
                resolver: None,
                checker: None,
                default_branch_getter: None,
                all_branches: false,
                ancestry: AncestryPolicy::default(),
            },
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Walk every selected branch and hand each pending module commit to
    /// `sink`, oldest first.
    ///
    /// Branches are processed one after another, commits in delivery order,
    /// and modules within a commit in registration order. A sink error always
    /// ends the run.
    pub fn sync<F>(&self, cancel: &CancelToken, mut sink: F) -> Result<(), SyncError>
    where
        F: FnMut(ModuleCommit) -> Result<(), BoxError>,
    {
        if self.modules.is_empty() {
            tracing::info!("no modules to sync");
            return Ok(());
        }
        let branches = select_branches(self.repo, self.all_branches)?;
        self.check_default_branch()?;

        let materializer = Materializer {
            repo: self.repo,
            storage: self.storage,
            handler: self.handler,
        };
        let reconciler = Reconciler {
            repo: self.repo,
            handler: self.handler,
            resolver: self.resolver,
            checker: self.checker,
            policy: self.ancestry,
        };

        for branch in &branches {
            let head = self.repo.remote_branch_head(branch)?;
            let mut targets = Vec::with_capacity(self.modules.len());
            for module in &self.modules {
                targets.push(Target {
                    module,
                    identity: materializer.identity_at(module, &head)?,
                });
            }
            let plan = reconciler.plan(branch, &head, &targets)?;
            tracing::info!(
                "syncing branch {branch} at {}: {} commit(s)",
                head.short(),
                plan.order.len()
            );

            for hash in &plan.order {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let commit = self.repo.commit(hash)?;
                let tags = self.repo.tags_for_commit(hash)?;
                for (module, pending) in self.modules.iter().zip(&plan.pending) {
                    if cancel.is_cancelled() {
                        return Err(SyncError::Cancelled);
                    }
                    if !pending.contains(hash) {
                        continue;
                    }
                    let Some(module_commit) =
                        materializer.materialize(module, &commit, branch, &tags)?
                    else {
                        continue;
                    };
                    let identity = module_commit.identity.clone();
                    sink(module_commit).map_err(|source| SyncError::Sink {
                        module: identity,
                        commit: hash.clone(),
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Compare each module's registry default branch with the repository's,
    /// before anything is delivered.
    fn check_default_branch(&self) -> Result<(), SyncError> {
        let Some(getter) = self.default_branch_getter else {
            return Ok(());
        };
        let local = self.repo.default_branch()?;
        let head = self.repo.remote_branch_head(&local)?;
        let materializer = Materializer {
            repo: self.repo,
            storage: self.storage,
            handler: self.handler,
        };
        for module in &self.modules {
            let Some(identity) = materializer.identity_at(module, &head)? else {
                tracing::debug!("{module} has no identity on {local}; skipping default branch check");
                continue;
            };
            let remote = getter
                .default_branch(&identity)
                .map_err(|source| SyncError::DefaultBranchGetter {
                    module: identity.clone(),
                    source,
                })?;
            match remote {
                RemoteDefaultBranch::Branch(remote) if remote != local => {
                    return Err(SyncError::DefaultBranchMismatch {
                        module: identity,
                        local,
                        remote,
                    });
                }
                RemoteDefaultBranch::Branch(_) => {}
                RemoteDefaultBranch::ModuleDoesNotExist => {
                    tracing::debug!("{identity} does not exist yet; default branch check passes");
                }
            }
        }
        Ok(())
    }
}

impl<'a> SyncerBuilder<'a> {
    /// Register a module. Modules are processed in registration order.
    pub fn module(mut self, module: Module) -> Self {
        self.syncer.modules.push(module);
        self
    }

    /// Resume each (module, branch) after the sync point `resolver` reports.
    pub fn resumption(mut self, resolver: &'a dyn SyncPointResolver) -> Self {
        self.syncer.resolver = Some(resolver);
        self
    }

    /// Skip commits `checker` reports as already synced.
    pub fn commit_checker(mut self, checker: &'a dyn SyncedCommitChecker) -> Self {
        self.syncer.checker = Some(checker);
        self
    }

    /// Refuse to sync modules whose registry default branch differs from the
    /// repository's.
    pub fn default_branch_getter(mut self, getter: &'a dyn DefaultBranchGetter) -> Self {
        self.syncer.default_branch_getter = Some(getter);
        self
    }

    /// Sync every remote-tracking branch instead of the current one.
    pub fn all_branches(mut self, all_branches: bool) -> Self {
        self.syncer.all_branches = all_branches;
        self
    }

    pub fn ancestry(mut self, policy: AncestryPolicy) -> Self {
        self.syncer.ancestry = policy;
        self
    }

    pub fn build(self) -> Result<Syncer<'a>, SyncError> {
        let mut seen = HashSet::new();
        for module in &self.syncer.modules {
            let key = module.to_string();
            if !seen.insert(key.clone()) {
                return Err(SyncError::DuplicateModule(key));
            }
        }
        Ok(self.syncer)
    }
}
