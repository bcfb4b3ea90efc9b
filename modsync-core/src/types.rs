//! Domain types for modsync.
//!
//! Repository-relative directories are `/`-separated strings, never `PathBuf`:
//! they name tree entries inside git objects, not files on disk.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::error::{HashError, IdentityError, ModuleError};

// ---------------------------------------------------------------------------
// ModuleIdentity
// ---------------------------------------------------------------------------

/// The identity of a module in a registry: `<remote>/<owner>/<repository>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleIdentity {
    remote: String,
    owner: String,
    repository: String,
}

impl ModuleIdentity {
    pub fn new(
        remote: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let (remote, owner, repository) = (remote.into(), owner.into(), repository.into());
        format!("{remote}/{owner}/{repository}").parse()
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// `owner/repository`, the name a registry knows the module by.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

impl FromStr for ModuleIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [remote, owner, repository] = parts.as_slice() else {
            return Err(IdentityError::Shape {
                input: s.to_owned(),
            });
        };
        if !is_valid_remote(remote) {
            return Err(IdentityError::Remote {
                input: s.to_owned(),
                remote: (*remote).to_owned(),
            });
        }
        for (part, value) in [("owner", owner), ("repository", repository)] {
            if !is_valid_segment(value) {
                return Err(IdentityError::Segment {
                    input: s.to_owned(),
                    part,
                    value: (*value).to_owned(),
                });
            }
        }
        Ok(Self {
            remote: (*remote).to_owned(),
            owner: (*owner).to_owned(),
            repository: (*repository).to_owned(),
        })
    }
}

impl TryFrom<String> for ModuleIdentity {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModuleIdentity> for String {
    fn from(id: ModuleIdentity) -> Self {
        id.to_string()
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.remote, self.owner, self.repository)
    }
}

fn is_valid_remote(remote: &str) -> bool {
    let (host, port) = match remote.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (remote, None),
    };
    if let Some(port) = port {
        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    !host.is_empty()
        && !host.starts_with(['.', '-'])
        && !host.ends_with(['.', '-'])
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

fn is_valid_segment(segment: &str) -> bool {
    let mut bytes = segment.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A module to sync: a repository subdirectory plus an optional identity
/// override. Two modules are the same module when their string forms match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    dir: String,
    identity_override: Option<ModuleIdentity>,
}

impl Module {
    pub fn new(
        dir: &str,
        identity_override: Option<ModuleIdentity>,
    ) -> Result<Self, ModuleError> {
        Ok(Self {
            dir: normalize_dir(dir)?,
            identity_override,
        })
    }

    /// Directory relative to the repository root; `.` is the root itself.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn identity_override(&self) -> Option<&ModuleIdentity> {
        self.identity_override.as_ref()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity_override {
            Some(identity) => write!(f, "{}:{}", self.dir, identity),
            None => self.dir.fmt(f),
        }
    }
}

/// Normalize a repository-relative directory.
///
/// Strips `.` components and trailing separators and resolves `..` lexically.
/// The repository root normalizes to `.`.
pub fn normalize_dir(dir: &str) -> Result<String, ModuleError> {
    let unified = dir.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(ModuleError::AbsoluteDir {
            dir: dir.to_owned(),
        });
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(ModuleError::EscapesRoot {
                        dir: dir.to_owned(),
                    });
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        Ok(".".to_owned())
    } else {
        Ok(parts.join("/"))
    }
}

// ---------------------------------------------------------------------------
// Git values
// ---------------------------------------------------------------------------

/// A git object name in lower-case hex (SHA-1 or SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitHash(String);

impl GitHash {
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let valid_len = hex.len() == 40 || hex.len() == 64;
        if !valid_len || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError {
                input: hex.to_owned(),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl FromStr for GitHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for GitHash {
    type Error = HashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<GitHash> for String {
    fn from(hash: GitHash) -> Self {
        hash.0
    }
}

impl fmt::Display for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Author or committer of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<FixedOffset>,
}

/// A commit as read from the repository. The engine never mutates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: GitHash,
    /// Parents in recorded order; the first parent is the mainline.
    pub parents: Vec<GitHash>,
    pub author: GitIdentity,
    pub committer: GitIdentity,
    pub message: String,
}

// ---------------------------------------------------------------------------
// ModuleCommit
// ---------------------------------------------------------------------------

/// A module materialized at one commit of one branch, ready to hand to a sink.
#[derive(Debug, Clone)]
pub struct ModuleCommit {
    /// Registry identity, accounting for any configured override.
    pub identity: ModuleIdentity,
    /// Snapshot of the module directory at `commit`.
    pub bucket: Bucket,
    pub commit: Commit,
    pub branch: String,
    /// Tags pointing at `commit`, sorted, each name once.
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
