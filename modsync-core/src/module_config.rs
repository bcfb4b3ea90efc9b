//! Module declaration (`modsync.yaml`) parsing and build validation.
//!
//! ```yaml
//! version: v1
//! name: buf.build/acme/petapis
//! build:
//!   excludes: [vendor]
//!   extensions: [proto]
//! ```

use serde::Deserialize;

use crate::bucket::Bucket;
use crate::error::{BuildError, ModuleConfigError};
use crate::types::{normalize_dir, ModuleIdentity};

/// File name of the module declaration, relative to the module root.
pub const MODULE_CONFIG_FILE: &str = "modsync.yaml";

const SUPPORTED_VERSION: &str = "v1";

fn default_extensions() -> Vec<String> {
    vec!["proto".to_owned()]
}

/// `build:` section of the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModuleConfig {
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    build: BuildConfig,
}

/// A parsed module declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub name: Option<ModuleIdentity>,
    pub build: BuildConfig,
}

impl ModuleConfig {
    /// Read and parse the declaration from a module snapshot.
    pub fn from_bucket(bucket: &Bucket) -> Result<Self, ModuleConfigError> {
        let blob = bucket
            .get(MODULE_CONFIG_FILE)
            .ok_or(ModuleConfigError::Missing {
                file: MODULE_CONFIG_FILE,
            })?;
        Self::parse(blob.content())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleConfigError> {
        let raw: RawModuleConfig =
            serde_yaml::from_slice(bytes).map_err(|source| ModuleConfigError::Parse {
                file: MODULE_CONFIG_FILE,
                source,
            })?;
        if raw.version != SUPPORTED_VERSION {
            return Err(ModuleConfigError::UnsupportedVersion(raw.version));
        }
        let name = raw
            .name
            .map(|n| n.parse::<ModuleIdentity>())
            .transpose()?;
        Ok(Self {
            name,
            build: raw.build,
        })
    }

    /// Validate that the module builds from `bucket`.
    ///
    /// Returns the source files that make up the module, sorted by path.
    pub fn build(&self, bucket: &Bucket) -> Result<Vec<String>, BuildError> {
        let mut excludes = Vec::with_capacity(self.build.excludes.len());
        for exclude in &self.build.excludes {
            match normalize_dir(exclude) {
                Ok(normalized) if normalized == *exclude && normalized != "." => {}
                _ => return Err(BuildError::InvalidExclude(exclude.clone())),
            }
            if !bucket.contains_dir(exclude) {
                return Err(BuildError::ExcludeNotFound(exclude.clone()));
            }
            excludes.push(format!("{exclude}/"));
        }

        let mut sources = Vec::new();
        for (path, blob) in bucket.iter() {
            if excludes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
                continue;
            }
            let is_source = path
                .rsplit_once('.')
                .is_some_and(|(_, ext)| self.build.extensions.iter().any(|e| e == ext));
            if !is_source {
                continue;
            }
            if std::str::from_utf8(blob.content()).is_err() {
                return Err(BuildError::InvalidUtf8(path.to_owned()));
            }
            sources.push(path.to_owned());
        }

        if sources.is_empty() {
            return Err(BuildError::NoSourceFiles {
                extensions: self.build.extensions.clone(),
            });
        }
        Ok(sources)
    }
}
