//! In-memory [`Repository`] and [`StorageProvider`].
//!
//! Commit hashes are derived from commit content, so the same sequence of
//! calls always produces the same graph.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, Offset, Utc};

use modsync_core::{bucket::sha256_hex, Bucket, Commit, GitHash, GitIdentity};

use crate::error::RepoError;
use crate::repository::{Repository, StorageProvider, REMOTE};

const EPOCH_SECONDS: i64 = 1_700_000_000;

#[derive(Debug, Clone)]
struct StoredCommit {
    commit: Commit,
    files: BTreeMap<String, Vec<u8>>,
}

/// A commit graph held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    commits: HashMap<GitHash, StoredCommit>,
    remote_branches: BTreeMap<String, GitHash>,
    default_branch: Option<String>,
    current_branch: Option<String>,
    tags: BTreeMap<String, GitHash>,
    clock: i64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit with the full repository tree `files`.
    ///
    /// Returns the new commit's hash.
    pub fn add_commit<I, P, C>(&mut self, parents: &[&GitHash], files: I) -> GitHash
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        self.clock += 1;
        let files: BTreeMap<String, Vec<u8>> = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();

        let mut preimage = format!("commit {}\n", self.clock);
        for parent in parents {
            preimage.push_str(&format!("parent {parent}\n"));
        }
        for (path, content) in &files {
            preimage.push_str(&format!("{} {}\n", sha256_hex(content), path));
        }
        // Truncated to SHA-1 length, like the object names of most repositories.
        let hash = match GitHash::from_hex(&sha256_hex(preimage.as_bytes())[..40]) {
            Ok(hash) => hash,
            Err(e) => unreachable!("sha256 hex is always a valid hash: {e}"),
        };

        let signature = GitIdentity {
            name: "Test Author".to_owned(),
            email: "author@example.com".to_owned(),
            timestamp: timestamp(EPOCH_SECONDS + self.clock * 60),
        };
        let commit = Commit {
            hash: hash.clone(),
            parents: parents.iter().map(|p| (*p).clone()).collect(),
            author: signature.clone(),
            committer: signature,
            message: format!("commit {}", self.clock),
        };
        self.commits
            .insert(hash.clone(), StoredCommit { commit, files });
        hash
    }

    /// Point `refs/remotes/origin/<branch>` at `head`.
    pub fn set_remote_branch(&mut self, branch: &str, head: &GitHash) {
        self.remote_branches.insert(branch.to_owned(), head.clone());
    }

    /// Set the branch `refs/remotes/origin/HEAD` refers to.
    pub fn set_default_branch(&mut self, branch: &str) {
        self.default_branch = Some(branch.to_owned());
    }

    /// Attach the local HEAD to `branch`.
    pub fn checkout(&mut self, branch: &str) {
        self.current_branch = Some(branch.to_owned());
    }

    pub fn tag(&mut self, name: &str, target: &GitHash) {
        self.tags.insert(name.to_owned(), target.clone());
    }
}

fn timestamp(seconds: i64) -> DateTime<FixedOffset> {
    DateTime::from_timestamp(seconds, 0)
        .unwrap_or_default()
        .with_timezone(&Utc.fix())
}

impl Repository for MemoryRepository {
    fn default_branch(&self) -> Result<String, RepoError> {
        self.default_branch
            .clone()
            .ok_or(RepoError::NoDefaultBranch(REMOTE))
    }

    fn current_branch(&self) -> Result<String, RepoError> {
        self.current_branch.clone().ok_or(RepoError::DetachedHead)
    }

    fn remote_branches(&self) -> Result<Vec<String>, RepoError> {
        Ok(self.remote_branches.keys().cloned().collect())
    }

    fn remote_branch_head(&self, branch: &str) -> Result<GitHash, RepoError> {
        self.remote_branches
            .get(branch)
            .cloned()
            .ok_or_else(|| RepoError::NoRemoteBranch {
                remote: REMOTE,
                branch: branch.to_owned(),
            })
    }

    fn commit(&self, hash: &GitHash) -> Result<Commit, RepoError> {
        self.commits
            .get(hash)
            .map(|stored| stored.commit.clone())
            .ok_or_else(|| RepoError::ObjectNotFound(hash.clone()))
    }

    fn tags_for_commit(&self, hash: &GitHash) -> Result<Vec<String>, RepoError> {
        Ok(self
            .tags
            .iter()
            .filter(|(_, target)| *target == hash)
            .map(|(name, _)| name.clone())
            .collect())
    }
}

impl StorageProvider for MemoryRepository {
    fn snapshot(&self, commit: &GitHash, dir: &str) -> Result<Bucket, RepoError> {
        let stored = self
            .commits
            .get(commit)
            .ok_or_else(|| RepoError::ObjectNotFound(commit.clone()))?;
        if dir == "." {
            return Ok(stored.files.iter().map(|(p, c)| (p.clone(), c.clone())).collect());
        }
        let prefix = format!("{dir}/");
        Ok(stored
            .files
            .iter()
            .filter_map(|(path, content)| {
                path.strip_prefix(prefix.as_str())
                    .map(|rel| (rel.to_owned(), content.clone()))
            })
            .collect())
    }
}
