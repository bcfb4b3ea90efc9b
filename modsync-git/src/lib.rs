//! # modsync-git
//!
//! Read-only repository access for the sync engine.
//!
//! The engine talks to a repository through the [`Repository`] and
//! [`StorageProvider`] traits. [`GitRepository`] implements both on top of
//! `git2`; [`MemoryRepository`] implements both over an in-memory commit graph.

pub mod error;
pub mod git;
pub mod memory;
pub mod repository;

pub use error::RepoError;
pub use git::GitRepository;
pub use memory::MemoryRepository;
pub use repository::{Repository, StorageProvider, REMOTE};
