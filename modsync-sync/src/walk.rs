//! Commit graph walker.
//!
//! Produces a branch's ancestry oldest-first, so that no commit is delivered
//! before any of its delivered ancestors.

use std::collections::{HashMap, HashSet};

use modsync_core::GitHash;
use modsync_git::Repository;

use crate::error::SyncError;

/// How merge commits are linearized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AncestryPolicy {
    /// Follow only the first parent of every commit. Commits reachable only
    /// through a merge's other parents are not visited.
    #[default]
    FirstParent,
    /// Visit every ancestor. Parents are explored in recorded order and every
    /// commit follows all of its parents.
    Topological,
}

/// The ancestry of one branch head, oldest first.
#[derive(Debug)]
pub struct Ancestry {
    policy: AncestryPolicy,
    order: Vec<GitHash>,
    position: HashMap<GitHash, usize>,
    parents: HashMap<GitHash, Vec<GitHash>>,
}

impl Ancestry {
    /// Walk back from `head`.
    ///
    /// Under [`AncestryPolicy::FirstParent`] the walk stops as soon as every
    /// hash in `boundaries` has been seen, unless `to_root` is set. The
    /// topological walk always reaches the root.
    pub fn walk(
        repo: &dyn Repository,
        head: &GitHash,
        policy: AncestryPolicy,
        boundaries: &[GitHash],
        to_root: bool,
    ) -> Result<Self, SyncError> {
        let (order, parents) = match policy {
            AncestryPolicy::FirstParent => first_parent(repo, head, boundaries, to_root)?,
            AncestryPolicy::Topological => topological(repo, head)?,
        };
        let position = order
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Ok(Self {
            policy,
            order,
            position,
            parents,
        })
    }

    /// Commits in delivery order.
    pub fn order(&self) -> &[GitHash] {
        &self.order
    }

    pub fn contains(&self, hash: &GitHash) -> bool {
        self.position.contains_key(hash)
    }

    /// Commits strictly newer than `boundary`, in delivery order.
    ///
    /// Returns `None` when the boundary is not part of this ancestry.
    pub fn after(&self, boundary: &GitHash) -> Option<Vec<GitHash>> {
        let pos = *self.position.get(boundary)?;
        match self.policy {
            AncestryPolicy::FirstParent => Some(self.order[pos + 1..].to_vec()),
            AncestryPolicy::Topological => {
                let synced = self.ancestors_of(boundary);
                Some(
                    self.order
                        .iter()
                        .filter(|h| !synced.contains(*h))
                        .cloned()
                        .collect(),
                )
            }
        }
    }

    /// `hash` and every commit reachable from it through any parent.
    fn ancestors_of(&self, hash: &GitHash) -> HashSet<&GitHash> {
        let mut seen: HashSet<&GitHash> = HashSet::new();
        let mut stack = vec![hash];
        while let Some(current) = stack.pop() {
            let Some((key, parents)) = self.parents.get_key_value(current) else {
                continue;
            };
            if !seen.insert(key) {
                continue;
            }
            stack.extend(parents.iter());
        }
        seen
    }
}

type Walked = (Vec<GitHash>, HashMap<GitHash, Vec<GitHash>>);

fn first_parent(
    repo: &dyn Repository,
    head: &GitHash,
    boundaries: &[GitHash],
    to_root: bool,
) -> Result<Walked, SyncError> {
    let mut remaining: HashSet<&GitHash> = boundaries.iter().collect();
    let mut chain = Vec::new();
    let mut parents = HashMap::new();
    let mut next = Some(head.clone());
    while let Some(hash) = next {
        let commit = repo.commit(&hash)?;
        remaining.remove(&hash);
        next = commit.parents.first().cloned();
        parents.insert(hash.clone(), commit.parents);
        chain.push(hash);
        if !to_root && !boundaries.is_empty() && remaining.is_empty() {
            break;
        }
    }
    chain.reverse();
    Ok((chain, parents))
}

fn topological(repo: &dyn Repository, head: &GitHash) -> Result<Walked, SyncError> {
    let mut parents: HashMap<GitHash, Vec<GitHash>> = HashMap::new();
    let mut order = Vec::new();
    let mut visited: HashSet<GitHash> = HashSet::new();

    parents.insert(head.clone(), repo.commit(head)?.parents);
    visited.insert(head.clone());
    // (commit, index of the next parent to explore)
    let mut stack = vec![(head.clone(), 0usize)];
    while let Some((hash, next)) = stack.pop() {
        let parent = parents.get(&hash).and_then(|p| p.get(next)).cloned();
        match parent {
            Some(parent) => {
                stack.push((hash, next + 1));
                if visited.insert(parent.clone()) {
                    parents.insert(parent.clone(), repo.commit(&parent)?.parents);
                    stack.push((parent, 0));
                }
            }
            // All parents emitted; post-order puts parents first.
            None => order.push(hash),
        }
    }
    Ok((order, parents))
}
