//! Branch selection.

use modsync_git::{RepoError, Repository, REMOTE};

use crate::error::SyncError;

/// Pick the branches to sync, in processing order.
///
/// In single-branch mode this is the checked-out branch, provided it has a
/// remote-tracking ref. In all-branches mode it is the remote's default branch
/// followed by every other remote-tracking branch by name.
pub(crate) fn select_branches(
    repo: &dyn Repository,
    all_branches: bool,
) -> Result<Vec<String>, SyncError> {
    let remote_branches = repo.remote_branches()?;
    if !all_branches {
        let current = repo.current_branch()?;
        if !remote_branches.contains(&current) {
            tracing::warn!(
                "branch {current} has no remote-tracking ref under {REMOTE}; nothing to sync"
            );
            return Ok(Vec::new());
        }
        return Ok(vec![current]);
    }

    let default = repo.default_branch()?;
    if !remote_branches.contains(&default) {
        return Err(RepoError::NoRemoteBranch {
            remote: REMOTE,
            branch: default,
        }
        .into());
    }
    let mut others: Vec<String> = remote_branches
        .into_iter()
        .filter(|b| *b != default)
        .collect();
    others.sort();

    let mut branches = Vec::with_capacity(others.len() + 1);
    branches.push(default);
    branches.extend(others);
    Ok(branches)
}
