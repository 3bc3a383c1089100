//! Remote store abstraction for Nexus Vault.
//!
//! The vault never talks to a repository host directly. Everything goes
//! through [`RemoteStore`], which offers exactly two things: read blobs
//! (optionally pinned to the head they were read at), and atomically publish
//! a set of changes as one new commit.
//!
//! # Design Principles
//! - One publish = one commit = one remote round trip
//! - Nothing is pushed unless every staged change made it into the commit
//! - No locking: the default is last-push-wins, with an opt-in head check

pub mod git;
pub mod memory;
pub mod raw;
pub mod remote;

pub use git::{GitRemote, RemoteLocation, DEFAULT_BRANCH, DEFAULT_HOST, DEFAULT_REPOSITORY};
pub use memory::MemoryRemote;
pub use raw::RawFetcher;
pub use remote::{
    Changeset, CommitAuthor, HeadCheck, PublishOptions, PublishReceipt, RemoteStore,
    Snapshot,
};
