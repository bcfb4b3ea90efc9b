//! `git2`-backed [`Repository`] and [`StorageProvider`].

use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{ErrorCode, ObjectType, Oid, TreeWalkMode, TreeWalkResult};

use modsync_core::{types::normalize_dir, Bucket, Commit, GitHash, GitIdentity};

use crate::error::RepoError;
use crate::repository::{Repository, StorageProvider, REMOTE};

const SYMLINK_MODE: i32 = 0o120000;

/// A repository opened from disk.
pub struct GitRepository {
    repo: git2::Repository,
    symlinks: bool,
    tags: OnceCell<HashMap<GitHash, Vec<String>>>,
}

impl GitRepository {
    /// Open the repository at `path` (a work tree or a `.git` directory).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let repo = git2::Repository::open(path).map_err(|source| RepoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_git2(repo))
    }

    /// Search upwards from `path` for a repository.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let repo = git2::Repository::discover(path).map_err(|source| RepoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_git2(repo))
    }

    pub fn from_git2(repo: git2::Repository) -> Self {
        Self {
            repo,
            symlinks: false,
            tags: OnceCell::new(),
        }
    }

    /// Follow symlinks inside the commit tree when taking snapshots.
    pub fn with_symlinks(mut self) -> Self {
        self.symlinks = true;
        self
    }

    fn find_commit(&self, hash: &GitHash) -> Result<git2::Commit<'_>, RepoError> {
        // A SHA-256 name cannot exist in a SHA-1 object store.
        let oid =
            Oid::from_str(hash.as_str()).map_err(|_| RepoError::ObjectNotFound(hash.clone()))?;
        self.repo.find_commit(oid).map_err(|e| match e.code() {
            ErrorCode::NotFound => RepoError::ObjectNotFound(hash.clone()),
            _ => RepoError::Git(e),
        })
    }

    fn tag_index(&self) -> Result<&HashMap<GitHash, Vec<String>>, RepoError> {
        if let Some(index) = self.tags.get() {
            return Ok(index);
        }
        let index = self.build_tag_index()?;
        Ok(self.tags.get_or_init(|| index))
    }

    fn build_tag_index(&self) -> Result<HashMap<GitHash, Vec<String>>, RepoError> {
        let mut index: HashMap<GitHash, Vec<String>> = HashMap::new();
        let names = self.repo.tag_names(None)?;
        for name in names.iter().flatten() {
            let reference = self.repo.find_reference(&format!("refs/tags/{name}"))?;
            // Tags of trees or blobs have no commit to attach to.
            let Ok(commit) = reference.peel_to_commit() else {
                continue;
            };
            let hash = oid_to_hash(commit.id())?;
            index.entry(hash).or_default().push(name.to_owned());
        }
        for names in index.values_mut() {
            names.sort();
            names.dedup();
        }
        tracing::debug!("indexed tags for {} commits", index.len());
        Ok(index)
    }

    /// Resolve a symlink blob at `link_path` (root-relative) to the blob it
    /// points at, if that blob lives inside the same commit tree.
    fn follow_symlink(
        &self,
        root: &git2::Tree<'_>,
        link_path: &str,
        target: &[u8],
    ) -> Result<Option<Vec<u8>>, RepoError> {
        let Ok(target) = std::str::from_utf8(target) else {
            return Ok(None);
        };
        let joined = match link_path.rsplit_once('/') {
            Some((parent, _)) => format!("{parent}/{target}"),
            None => target.to_owned(),
        };
        let Ok(resolved) = normalize_dir(&joined) else {
            return Ok(None);
        };
        match root.get_path(Path::new(&resolved)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => {
                let blob = self.repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn oid_to_hash(oid: Oid) -> Result<GitHash, RepoError> {
    Ok(GitHash::from_hex(&oid.to_string())?)
}

fn identity(sig: &git2::Signature<'_>) -> GitIdentity {
    let when = sig.when();
    let offset =
        FixedOffset::east_opt(when.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    let timestamp = DateTime::from_timestamp(when.seconds(), 0)
        .unwrap_or_default()
        .with_timezone(&offset);
    GitIdentity {
        name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
        email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
        timestamp,
    }
}

impl Repository for GitRepository {
    fn default_branch(&self) -> Result<String, RepoError> {
        let reference = match self
            .repo
            .find_reference(&format!("refs/remotes/{REMOTE}/HEAD"))
        {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(RepoError::NoDefaultBranch(REMOTE))
            }
            Err(e) => return Err(e.into()),
        };
        let prefix = format!("refs/remotes/{REMOTE}/");
        reference
            .symbolic_target()
            .and_then(|target| target.strip_prefix(prefix.as_str()))
            .map(str::to_owned)
            .ok_or(RepoError::NoDefaultBranch(REMOTE))
    }

    fn current_branch(&self) -> Result<String, RepoError> {
        let head = self.repo.find_reference("HEAD")?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_owned)
            .ok_or(RepoError::DetachedHead)
    }

    fn remote_branches(&self) -> Result<Vec<String>, RepoError> {
        let prefix = format!("refs/remotes/{REMOTE}/");
        let mut branches = Vec::new();
        for reference in self.repo.references_glob(&format!("{prefix}*"))? {
            let reference = reference?;
            let Some(name) = reference.name().and_then(|n| n.strip_prefix(prefix.as_str()))
            else {
                continue;
            };
            if name != "HEAD" {
                branches.push(name.to_owned());
            }
        }
        branches.sort();
        Ok(branches)
    }

    fn remote_branch_head(&self, branch: &str) -> Result<GitHash, RepoError> {
        let name = format!("refs/remotes/{REMOTE}/{branch}");
        let reference = self.repo.find_reference(&name).map_err(|e| match e.code() {
            ErrorCode::NotFound => RepoError::NoRemoteBranch {
                remote: REMOTE,
                branch: branch.to_owned(),
            },
            _ => RepoError::Git(e),
        })?;
        oid_to_hash(reference.peel_to_commit()?.id())
    }

    fn commit(&self, hash: &GitHash) -> Result<Commit, RepoError> {
        let commit = self.find_commit(hash)?;
        let parents = commit
            .parent_ids()
            .map(oid_to_hash)
            .collect::<Result<Vec<_>, _>>()?;
        let author = identity(&commit.author());
        let committer = identity(&commit.committer());
        Ok(Commit {
            hash: hash.clone(),
            parents,
            author,
            committer,
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        })
    }

    fn tags_for_commit(&self, hash: &GitHash) -> Result<Vec<String>, RepoError> {
        Ok(self.tag_index()?.get(hash).cloned().unwrap_or_default())
    }
}

impl StorageProvider for GitRepository {
    fn snapshot(&self, commit: &GitHash, dir: &str) -> Result<Bucket, RepoError> {
        let root = self.find_commit(commit)?.tree()?;
        let tree = if dir == "." {
            root.clone()
        } else {
            match root.get_path(Path::new(dir)) {
                Ok(entry) if entry.kind() == Some(ObjectType::Tree) => {
                    self.repo.find_tree(entry.id())?
                }
                Ok(_) => return Ok(Bucket::new()),
                Err(e) if e.code() == ErrorCode::NotFound => return Ok(Bucket::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let mut entries = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |parent, entry| {
            // Submodules are commits, not blobs, and are skipped here.
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    entries.push((format!("{parent}{name}"), entry.id(), entry.filemode()));
                }
            }
            TreeWalkResult::Ok
        })?;

        let mut bucket = Bucket::new();
        for (path, oid, mode) in entries {
            let blob = self.repo.find_blob(oid)?;
            if mode != SYMLINK_MODE {
                bucket.insert(path, blob.content().to_vec());
                continue;
            }
            if !self.symlinks {
                continue;
            }
            let link_path = if dir == "." {
                path.clone()
            } else {
                format!("{dir}/{path}")
            };
            if let Some(content) = self.follow_symlink(&root, &link_path, blob.content())? {
                bucket.insert(path, content);
            }
        }
        Ok(bucket)
    }
}
