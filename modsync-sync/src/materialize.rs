//! Per-commit module materialization.

use modsync_core::{
    Commit, GitHash, Module, ModuleCommit, ModuleConfig, ModuleConfigError, ModuleIdentity,
};
use modsync_git::{Repository, StorageProvider};

use crate::error::SyncError;
use crate::handler::ErrorHandler;

/// Turns (module, commit) pairs into deliverable [`ModuleCommit`]s, routing
/// recoverable defects through the error handler.
pub(crate) struct Materializer<'a> {
    pub repo: &'a dyn Repository,
    pub storage: &'a dyn StorageProvider,
    pub handler: &'a dyn ErrorHandler,
}

impl Materializer<'_> {
    /// `Ok(None)` means the handler chose to skip this commit for `module`.
    pub fn materialize(
        &self,
        module: &Module,
        commit: &Commit,
        branch: &str,
        tags: &[String],
    ) -> Result<Option<ModuleCommit>, SyncError> {
        let bucket = self.storage.snapshot(&commit.hash, module.dir())?;

        let config = match ModuleConfig::from_bucket(&bucket) {
            Ok(config) => config,
            Err(err) => return self.invalid_config(module, commit, &err),
        };
        let identity = match (module.identity_override(), &config.name) {
            (Some(identity), _) | (None, Some(identity)) => identity.clone(),
            (None, None) => {
                return self.invalid_config(module, commit, &ModuleConfigError::MissingName)
            }
        };
        if let Err(err) = config.build(&bucket) {
            self.handler
                .build_failure(module, commit, &err)
                .map_err(|source| abort(module, source))?;
            tracing::debug!("skip {module} at {}: {err}", commit.hash.short());
            return Ok(None);
        }

        Ok(Some(ModuleCommit {
            identity,
            bucket,
            commit: commit.clone(),
            branch: branch.to_owned(),
            tags: tags.to_vec(),
        }))
    }

    fn invalid_config(
        &self,
        module: &Module,
        commit: &Commit,
        err: &ModuleConfigError,
    ) -> Result<Option<ModuleCommit>, SyncError> {
        self.handler
            .invalid_module_config(module, commit, err)
            .map_err(|source| abort(module, source))?;
        tracing::debug!("skip {module} at {}: {err}", commit.hash.short());
        Ok(None)
    }

    /// The registry identity `module` resumes under on a branch at `head`:
    /// the override, or the newest name declared along the first-parent
    /// chain from `head`.
    pub fn identity_at(
        &self,
        module: &Module,
        head: &GitHash,
    ) -> Result<Option<ModuleIdentity>, SyncError> {
        if let Some(identity) = module.identity_override() {
            return Ok(Some(identity.clone()));
        }
        let mut next = Some(head.clone());
        while let Some(hash) = next {
            let bucket = self.storage.snapshot(&hash, module.dir())?;
            match ModuleConfig::from_bucket(&bucket) {
                Ok(ModuleConfig { name: Some(name), .. }) => return Ok(Some(name)),
                Ok(_) => tracing::debug!("{module} declares no name at {}", hash.short()),
                Err(err) => {
                    tracing::debug!("no declared identity for {module} at {}: {err}", hash.short())
                }
            }
            next = self.repo.commit(&hash)?.parents.into_iter().next();
        }
        Ok(None)
    }
}

pub(crate) fn abort(module: &Module, source: crate::collaborators::BoxError) -> SyncError {
    SyncError::Aborted {
        module: module.to_string(),
        source,
    }
}
