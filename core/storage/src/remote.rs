//! Remote store trait definition.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use nexusvault_common::{Error, Result};

/// Identity recorded on every commit the vault creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The set of blob writes and removals that go into one commit.
///
/// Paths are relative to the repository root and use '/' separators.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    writes: BTreeMap<String, Vec<u8>>,
    removals: BTreeSet<String>,
}

impl Changeset {
    /// Create an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `data` to be written at `path`, replacing any earlier write.
    ///
    /// # Errors
    /// - Path is empty, absolute, contains `..` or empty components, or
    ///   reaches into `.git`
    pub fn write(&mut self, path: impl Into<String>, data: Vec<u8>) -> Result<&mut Self> {
        let path = path.into();
        validate_repo_path(&path)?;
        self.removals.remove(&path);
        self.writes.insert(path, data);
        Ok(self)
    }

    /// Stage removal of the blob at `path`.
    pub fn remove(&mut self, path: impl Into<String>) -> Result<&mut Self> {
        let path = path.into();
        validate_repo_path(&path)?;
        self.writes.remove(&path);
        self.removals.insert(path);
        Ok(self)
    }

    /// Staged writes, ordered by path.
    pub fn writes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.writes
    }

    /// Staged removals, ordered by path.
    pub fn removals(&self) -> &BTreeSet<String> {
        &self.removals
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }
}

fn validate_repo_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(Error::InvalidInput(format!(
            "Invalid repository path: {:?}",
            path
        )));
    }
    for component in path.split('/') {
        if component.is_empty() || component == "." || component == ".." || component == ".git"
        {
            return Err(Error::InvalidInput(format!(
                "Invalid repository path: {:?}",
                path
            )));
        }
    }
    Ok(())
}

/// Optional optimistic concurrency check applied before pushing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeadCheck {
    /// Push regardless of what the remote head is (last push wins).
    #[default]
    Unchecked,
    /// Reject with `Error::Conflict` unless the remote head equals this
    /// commit id (`None` = the remote branch must not exist yet).
    Expect(Option<String>),
}

/// Options for a single publish.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Replace all history with a single fresh commit containing only the
    /// staged writes. Removals are meaningless in this mode.
    pub force: bool,
    /// Head check performed before the commit is pushed.
    pub head_check: HeadCheck,
}

impl PublishOptions {
    /// Options for a destructive history replacement.
    pub fn force() -> Self {
        Self {
            force: true,
            head_check: HeadCheck::Unchecked,
        }
    }

    pub fn with_head_check(mut self, head_check: HeadCheck) -> Self {
        self.head_check = head_check;
        self
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Id of the commit now at the remote head.
    pub commit: String,
    /// Staged removals whose blob was already absent.
    pub missing_removals: Vec<String>,
}

/// A blob read together with the commit it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Head commit id, `None` for an empty repository.
    pub head: Option<String>,
    /// Blob content at that commit, `None` if the path does not exist there.
    pub content: Option<Vec<u8>>,
}

/// A version-controlled blob store reached over an authenticated transport.
///
/// Implementations are bound to one repository at construction time; the
/// owner, URL and credential never appear in these calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logging (e.g. "git", "memory").
    fn name(&self) -> &str;

    /// Read the blob at `path` from the current head without mutating anything.
    ///
    /// # Errors
    /// - `Error::NotFound` if the repository is empty or has no such path
    /// - `Error::Transport` for any other failure
    async fn fetch_blob(&self, path: &str) -> Result<Vec<u8>>;

    /// Current head commit id, or `None` for an empty repository.
    async fn head(&self) -> Result<Option<String>>;

    /// Read the head commit id and the blob at `path` in one consistent read.
    ///
    /// Unlike [`RemoteStore::fetch_blob`], the content is guaranteed to come
    /// from the commit named by `head`, never from a cache of an older one.
    ///
    /// # Errors
    /// - `Error::Transport` if the repository cannot be read
    async fn fetch_snapshot(&self, path: &str) -> Result<Snapshot>;

    /// Atomically publish `changes` as exactly one new commit.
    ///
    /// # Postconditions
    /// - On success the remote head is the new commit, containing every
    ///   staged write and none of the staged removals
    /// - On failure nothing was pushed
    ///
    /// # Errors
    /// - `Error::Conflict` if `opts.head_check` does not match the remote
    /// - `Error::Transport` for clone, commit or push failures
    async fn publish(
        &self,
        changes: Changeset,
        message: &str,
        author: &CommitAuthor,
        opts: PublishOptions,
    ) -> Result<PublishReceipt>;
}

/// Compare an observed head against a head check.
pub(crate) fn check_head(check: &HeadCheck, observed: Option<&str>) -> Result<()> {
    match check {
        HeadCheck::Unchecked => Ok(()),
        HeadCheck::Expect(expected) if expected.as_deref() == observed => Ok(()),
        HeadCheck::Expect(expected) => Err(Error::Conflict(format!(
            "remote head is {} but {} was expected; re-connect and retry",
            observed.unwrap_or("<empty>"),
            expected.as_deref().unwrap_or("<empty>")
        ))),
    }
}
