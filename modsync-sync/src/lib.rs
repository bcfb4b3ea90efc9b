//! # modsync-sync
//!
//! Replays a repository's history into a registry, one module snapshot per
//! commit, resuming where the previous run stopped.
//!
//! Build a [`Syncer`] with [`Syncer::builder`], then call [`Syncer::sync`]
//! with a sink that receives every [`ModuleCommit`](modsync_core::ModuleCommit)
//! in ancestry order. [`LocalRegistry`] is a file-backed registry that can act
//! as both the resumption source and the sink.

mod branch;
pub mod cancel;
pub mod collaborators;
pub mod error;
pub mod handler;
pub mod local_registry;
mod materialize;
mod resume;
pub mod syncer;
pub mod walk;

pub use cancel::CancelToken;
pub use collaborators::{
    BoxError, DefaultBranchGetter, RemoteDefaultBranch, SyncPointResolver, SyncedCommitChecker,
};
pub use error::{RegistryError, SyncError};
pub use handler::{ErrorHandler, LoggingErrorHandler, SyncPointError};
pub use local_registry::{GitSyncPoint, LocalRegistry, Visibility};
pub use syncer::{Syncer, SyncerBuilder};
pub use walk::AncestryPolicy;
