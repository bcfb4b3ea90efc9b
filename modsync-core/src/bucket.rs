//! Content-addressable directory snapshots.
//!
//! A [`Bucket`] is a read-only view of a module directory at one commit. Every
//! blob is addressed by its SHA-256 digest; the bucket as a whole is addressed
//! by the digest of its manifest.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// File content plus its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    digest: String,
    content: Vec<u8>,
}

impl Blob {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            digest: sha256_hex(&content),
            content,
        }
    }

    /// Hex SHA-256 of the content.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// Snapshot of a directory tree, keyed by `/`-separated relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    files: BTreeMap<String, Blob>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, content: Vec<u8>) {
        self.files.insert(path.into(), Blob::new(content));
    }

    pub fn get(&self, path: &str) -> Option<&Blob> {
        self.files.get(path)
    }

    /// True if any file lives under `dir/`.
    pub fn contains_dir(&self, dir: &str) -> bool {
        let prefix = format!("{dir}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(path, _)| path.starts_with(&prefix))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Blob)> {
        self.files.iter().map(|(p, b)| (p.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Canonical manifest: `sha256:<hex>  <path>` per file, sorted by path.
    pub fn manifest(&self) -> String {
        let mut out = String::new();
        for (path, blob) in &self.files {
            out.push_str("sha256:");
            out.push_str(&blob.digest);
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Hex SHA-256 of [`Bucket::manifest`].
    pub fn digest(&self) -> String {
        sha256_hex(self.manifest().as_bytes())
    }
}

impl<P: Into<String>, C: Into<Vec<u8>>> FromIterator<(P, C)> for Bucket {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut bucket = Bucket::new();
        for (path, content) in iter {
            bucket.insert(path, content.into());
        }
        bucket
    }
}
