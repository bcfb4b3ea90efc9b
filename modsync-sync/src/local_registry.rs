//! File-backed module registry.
//!
//! Layout under the registry root:
//!
//! ```text
//! modules/<remote>/<owner>/<repository>.json   one record per module
//! blobs/<sha256>                               file contents, stored once
//! manifests/<sha256>                           bucket manifests, stored once
//! ```
//!
//! Every write goes to `<path>.tmp` first and is renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use modsync_core::{GitHash, GitIdentity, ModuleCommit, ModuleIdentity};

use crate::collaborators::{
    BoxError, DefaultBranchGetter, RemoteDefaultBranch, SyncPointResolver, SyncedCommitChecker,
};
use crate::error::{io_err, RegistryError};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => f.write_str("public"),
            Visibility::Private => f.write_str("private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!(
                "invalid visibility '{other}': expected public or private"
            )),
        }
    }
}

/// One commit as the registry recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedCommit {
    pub commit_name: String,
    pub branch: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub manifest_digest: String,
    pub author: GitIdentity,
    pub committer: GitIdentity,
    pub synced_at: DateTime<Utc>,
}

/// Everything the registry knows about a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub identity: ModuleIdentity,
    pub visibility: Visibility,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    /// Last synced commit per branch.
    #[serde(default)]
    pub sync_points: BTreeMap<String, GitHash>,
    #[serde(default)]
    pub commits: BTreeMap<GitHash, SyncedCommit>,
}

/// Where a push left a module on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitSyncPoint {
    pub branch: String,
    pub git_commit_hash: GitHash,
    pub commit_name: String,
}

// ---------------------------------------------------------------------------
// LocalRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    /// Open (or lazily create) a registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/modules/<remote>/<owner>/<repository>.json`
    pub fn record_path(&self, identity: &ModuleIdentity) -> PathBuf {
        self.root
            .join("modules")
            .join(identity.remote())
            .join(identity.owner())
            .join(format!("{}.json", identity.repository()))
    }

    /// Load a module's record, or `None` if the module does not exist.
    pub fn load(&self, identity: &ModuleIdentity) -> Result<Option<ModuleRecord>, RegistryError> {
        read_record(&self.record_path(identity))
    }

    /// Create a module. Fails if it already exists.
    pub fn create(
        &self,
        identity: &ModuleIdentity,
        visibility: Visibility,
        default_branch: &str,
    ) -> Result<ModuleRecord, RegistryError> {
        if self.load(identity)?.is_some() {
            return Err(RegistryError::ModuleExists(identity.clone()));
        }
        let record = ModuleRecord {
            identity: identity.clone(),
            visibility,
            default_branch: default_branch.to_owned(),
            created_at: Utc::now(),
            sync_points: BTreeMap::new(),
            commits: BTreeMap::new(),
        };
        self.save(&record)?;
        tracing::info!("created module {identity} ({visibility}, default branch {default_branch})");
        Ok(record)
    }

    /// Record a module commit and advance its branch's sync point.
    ///
    /// Pushing a commit the module already holds only moves the sync point
    /// and returns the existing commit name.
    pub fn push(&self, module_commit: &ModuleCommit) -> Result<GitSyncPoint, RegistryError> {
        let identity = &module_commit.identity;
        let mut record = self
            .load(identity)?
            .ok_or_else(|| RegistryError::ModuleNotFound(identity.clone()))?;
        let hash = &module_commit.commit.hash;
        let branch = &module_commit.branch;

        let commit_name = match record.commits.get_mut(hash) {
            Some(existing) => {
                for tag in &module_commit.tags {
                    if !existing.tags.contains(tag) {
                        existing.tags.push(tag.clone());
                    }
                }
                existing.tags.sort();
                tracing::debug!("{identity} already has {hash}");
                existing.commit_name.clone()
            }
            None => {
                let manifest_digest = self.store_content(module_commit)?;
                let commit_name = commit_name(identity, hash, &manifest_digest);
                record.commits.insert(
                    hash.clone(),
                    SyncedCommit {
                        commit_name: commit_name.clone(),
                        branch: branch.clone(),
                        tags: module_commit.tags.clone(),
                        manifest_digest,
                        author: module_commit.commit.author.clone(),
                        committer: module_commit.commit.committer.clone(),
                        synced_at: Utc::now(),
                    },
                );
                commit_name
            }
        };
        record.sync_points.insert(branch.clone(), hash.clone());
        self.save(&record)?;

        Ok(GitSyncPoint {
            branch: branch.clone(),
            git_commit_hash: hash.clone(),
            commit_name,
        })
    }

    /// Every module record, sorted by identity.
    pub fn list(&self) -> Result<Vec<ModuleRecord>, RegistryError> {
        let mut records = Vec::new();
        collect_records(&self.root.join("modules"), &mut records)?;
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    fn save(&self, record: &ModuleRecord) -> Result<(), RegistryError> {
        let path = self.record_path(&record.identity);
        let json = serde_json::to_vec_pretty(record).map_err(|source| RegistryError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)
    }

    /// Store every blob and the manifest. Returns the manifest digest.
    fn store_content(&self, module_commit: &ModuleCommit) -> Result<String, RegistryError> {
        for (_, blob) in module_commit.bucket.iter() {
            let path = self.root.join("blobs").join(blob.digest());
            if !path.exists() {
                write_atomic(&path, blob.content())?;
            }
        }
        let manifest = module_commit.bucket.manifest();
        let digest = module_commit.bucket.digest();
        let path = self.root.join("manifests").join(&digest);
        if !path.exists() {
            write_atomic(&path, manifest.as_bytes())?;
        }
        Ok(digest)
    }
}

/// First 32 hex characters of SHA-256 over identity, git hash and manifest.
fn commit_name(identity: &ModuleIdentity, hash: &GitHash, manifest_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(hash.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(manifest_digest.as_bytes());
    let mut name = hex::encode(hasher.finalize());
    name.truncate(32);
    name
}

fn read_record(path: &Path) -> Result<Option<ModuleRecord>, RegistryError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| RegistryError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn collect_records(dir: &Path, records: &mut Vec<ModuleRecord>) -> Result<(), RegistryError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(dir, e)),
    };
    for entry in entries {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if path.is_dir() {
            collect_records(&path, records)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(record) = read_record(&path)? {
                records.push(record);
            }
        }
    }
    Ok(())
}

/// Write to `<path>.tmp`, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), RegistryError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid registry path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

impl SyncPointResolver for LocalRegistry {
    fn resolve(&self, module: &ModuleIdentity, branch: &str) -> Result<Option<GitHash>, BoxError> {
        Ok(self
            .load(module)?
            .and_then(|record| record.sync_points.get(branch).cloned()))
    }
}

impl SyncedCommitChecker for LocalRegistry {
    fn synced(
        &self,
        module: &ModuleIdentity,
        candidates: &BTreeSet<GitHash>,
    ) -> Result<BTreeSet<GitHash>, BoxError> {
        let Some(record) = self.load(module)? else {
            return Ok(BTreeSet::new());
        };
        Ok(candidates
            .iter()
            .filter(|hash| record.commits.contains_key(*hash))
            .cloned()
            .collect())
    }
}

impl DefaultBranchGetter for LocalRegistry {
    fn default_branch(&self, module: &ModuleIdentity) -> Result<RemoteDefaultBranch, BoxError> {
        Ok(match self.load(module)? {
            Some(record) => RemoteDefaultBranch::Branch(record.default_branch),
            None => RemoteDefaultBranch::ModuleDoesNotExist,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
