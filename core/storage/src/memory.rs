//! In-memory remote store for testing.

use async_trait::async_trait;
use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::remote::{
    check_head, Changeset, CommitAuthor, PublishOptions, PublishReceipt, RemoteStore, Snapshot,
};
use nexusvault_common::{Error, Result};

/// One commit in the in-memory history.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub id: String,
    pub parent: Option<String>,
    pub message: String,
    pub author: CommitAuthor,
    pub tree: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    history: Vec<CommitRecord>,
    publish_count: usize,
    sequence: u64,
    fail_next_publish: Option<String>,
}

/// In-memory remote store.
///
/// Keeps a linear commit history with whole-tree snapshots. Clones share
/// the same repository, so an "owner" and a "recipient" handle can be made
/// from one instance. All data is lost on drop.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<RwLock<State>>,
}

impl MemoryRemote {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next publish fail with a transport error before anything
    /// is committed.
    pub fn fail_next_publish(&self, reason: impl Into<String>) {
        self.write_state().fail_next_publish = Some(reason.into());
    }

    /// Number of publish calls that reached this store, successful or not.
    pub fn publish_count(&self) -> usize {
        self.read_state().publish_count
    }

    /// The current head commit, if any.
    pub fn head_commit(&self) -> Option<CommitRecord> {
        self.read_state().history.last().cloned()
    }

    /// Number of commits reachable from the head.
    pub fn history_len(&self) -> usize {
        self.read_state().history.len()
    }

    /// Paths present in the head tree.
    pub fn paths(&self) -> Vec<String> {
        self.head_commit()
            .map(|c| c.tree.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn commit_id(
    sequence: u64,
    parent: Option<&str>,
    message: &str,
    tree: &BTreeMap<String, Vec<u8>>,
) -> String {
    let mut hasher = Blake2b::<U20>::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(parent.unwrap_or("").as_bytes());
    hasher.update(message.as_bytes());
    for (path, data) in tree {
        hasher.update(path.as_bytes());
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_blob(&self, path: &str) -> Result<Vec<u8>> {
        let state = self.read_state();
        state
            .history
            .last()
            .and_then(|commit| commit.tree.get(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", path)))
    }

    async fn head(&self) -> Result<Option<String>> {
        Ok(self.read_state().history.last().map(|c| c.id.clone()))
    }

    async fn fetch_snapshot(&self, path: &str) -> Result<Snapshot> {
        let state = self.read_state();
        Ok(match state.history.last() {
            Some(commit) => Snapshot {
                head: Some(commit.id.clone()),
                content: commit.tree.get(path).cloned(),
            },
            None => Snapshot::default(),
        })
    }

    async fn publish(
        &self,
        changes: Changeset,
        message: &str,
        author: &CommitAuthor,
        opts: PublishOptions,
    ) -> Result<PublishReceipt> {
        let mut state = self.write_state();
        state.publish_count += 1;

        if let Some(reason) = state.fail_next_publish.take() {
            return Err(Error::Transport(reason));
        }

        let head = state.history.last();
        check_head(&opts.head_check, head.map(|c| c.id.as_str()))?;

        let (parent, mut tree) = match head {
            Some(commit) if !opts.force => (Some(commit.id.clone()), commit.tree.clone()),
            _ => (None, BTreeMap::new()),
        };

        let mut missing_removals = Vec::new();
        if !opts.force {
            for path in changes.removals() {
                if tree.remove(path).is_none() {
                    missing_removals.push(path.clone());
                }
            }
        }
        for (path, data) in changes.writes() {
            tree.insert(path.clone(), data.clone());
        }

        state.sequence += 1;
        let id = commit_id(state.sequence, parent.as_deref(), message, &tree);
        let record = CommitRecord {
            id: id.clone(),
            parent,
            message: message.to_string(),
            author: author.clone(),
            tree,
        };

        if opts.force {
            state.history.clear();
        }
        state.history.push(record);

        debug!(commit = %id, force = opts.force, "Published to memory remote");
        Ok(PublishReceipt {
            commit: id,
            missing_removals,
        })
    }
}
