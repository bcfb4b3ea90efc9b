//! modsync core library: domain types, content snapshots, module declarations.
//!
//! - [`types`]: identities, modules, commits and the deliverable [`ModuleCommit`]
//! - [`bucket`]: content-addressable directory snapshots
//! - [`module_config`]: `modsync.yaml` parsing and build validation
//! - [`error`]: error enums for all of the above

pub mod bucket;
pub mod error;
pub mod module_config;
pub mod types;

pub use bucket::{Blob, Bucket};
pub use error::{BuildError, HashError, IdentityError, ModuleConfigError, ModuleError};
pub use module_config::{BuildConfig, ModuleConfig, MODULE_CONFIG_FILE};
pub use types::{Commit, GitHash, GitIdentity, Module, ModuleCommit, ModuleIdentity};
