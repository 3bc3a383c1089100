//! Vault session management.
//!
//! A session is the decrypted state of one connected vault: the path index,
//! the share index once it is needed, the vault password and the settings.
//! It exists only in memory and is consumed by [`VaultSession::disconnect`].
//! The password is zeroized when the session is dropped.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Settings, INDEX_PATH, SHARE_INDEX_PATH};
use crate::index::VaultIndex;
use crate::shares::ShareIndex;
use nexusvault_common::{Error, Result, SensitiveBytes};
use nexusvault_storage::{Changeset, HeadCheck, PublishOptions, PublishReceipt, RemoteStore};

/// Active vault session.
pub struct VaultSession {
    username: String,
    password: SensitiveBytes,
    settings: Settings,
    remote: Arc<dyn RemoteStore>,
    index: VaultIndex,
    /// False until an index blob exists on the remote.
    initialized: bool,
    /// Decrypted on first use.
    shares: Option<ShareIndex>,
    /// Remote head as of the last fetch or publish.
    observed_head: Option<String>,
}

impl VaultSession {
    /// Connect to a vault by fetching and decrypting its index.
    ///
    /// The remote is already bound to the owner's repository and credential.
    /// The index and the observed head come from one snapshot read, so a
    /// later publish always builds on the index it was read with. A remote
    /// without an index is an empty vault, not an error.
    ///
    /// # Errors
    /// - `IndexError::WrongPassword` if the index does not open
    /// - `IndexError::Malformed` if it opens but does not parse
    /// - `Error::Transport` if the remote cannot be reached
    /// - `Error::InvalidInput` for an empty username or password, or bad settings
    pub async fn connect(
        username: impl Into<String>,
        password: SensitiveBytes,
        settings: Settings,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        let username = username.into();
        if username.is_empty() {
            return Err(Error::InvalidInput("Username cannot be empty".to_string()));
        }
        if password.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }
        settings.validate()?;

        debug!(user = %username, remote = remote.name(), "Connecting to vault");
        let snapshot = remote.fetch_snapshot(INDEX_PATH).await?;
        let observed_head = snapshot.head;

        let (index, initialized) = match snapshot.content {
            Some(blob) => (VaultIndex::from_bytes(&blob, password.as_bytes())?, true),
            None => {
                debug!("No index on remote, vault is empty");
                (VaultIndex::new(), false)
            }
        };

        info!(user = %username, entries = index.len(), "Connected to vault");
        Ok(Self {
            username,
            password,
            settings,
            remote,
            index,
            initialized,
            shares: None,
            observed_head,
        })
    }

    /// End the session, dropping every secret it holds.
    pub fn disconnect(self) {
        info!(user = %self.username, "Disconnected from vault");
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &VaultIndex {
        &self.index
    }

    /// True once the vault has an index on the remote.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn observed_head(&self) -> Option<&str> {
        self.observed_head.as_deref()
    }

    pub(crate) fn password(&self) -> &[u8] {
        self.password.as_bytes()
    }

    pub(crate) fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    /// The share index, fetching and decrypting it on first use.
    ///
    /// # Errors
    /// - Same as [`VaultSession::connect`] for the share index blob
    pub async fn shares(&mut self) -> Result<&ShareIndex> {
        if self.shares.is_none() {
            let loaded = match self.remote.fetch_blob(SHARE_INDEX_PATH).await {
                Ok(blob) => ShareIndex::from_bytes(&blob, self.password.as_bytes())?,
                Err(Error::NotFound(_)) => ShareIndex::new(),
                Err(e) => return Err(e),
            };
            debug!(shares = loaded.len(), "Loaded share index");
            self.shares = Some(loaded);
        }
        Ok(self.shares.get_or_insert_with(ShareIndex::new))
    }

    fn head_check(&self) -> HeadCheck {
        if self.settings.strict_publish {
            HeadCheck::Expect(self.observed_head.clone())
        } else {
            HeadCheck::Unchecked
        }
    }

    /// Publish one commit for `action` and record the new head.
    pub(crate) async fn publish(
        &mut self,
        changes: Changeset,
        action: &str,
    ) -> Result<PublishReceipt> {
        let opts = PublishOptions::default().with_head_check(self.head_check());
        self.publish_with(changes, action, opts).await
    }

    /// Replace the whole remote history with one commit.
    pub(crate) async fn publish_forced(
        &mut self,
        changes: Changeset,
        action: &str,
    ) -> Result<PublishReceipt> {
        self.publish_with(changes, action, PublishOptions::force()).await
    }

    async fn publish_with(
        &mut self,
        changes: Changeset,
        action: &str,
        opts: PublishOptions,
    ) -> Result<PublishReceipt> {
        let message = self.settings.commit_message_for(action);
        let author = self.settings.commit_author();
        let receipt = self
            .remote
            .publish(changes, &message, &author, opts)
            .await?;
        self.observed_head = Some(receipt.commit.clone());
        Ok(receipt)
    }

    /// Install state that was just published.
    pub(crate) fn commit_index(&mut self, index: VaultIndex) {
        self.index = index;
        self.initialized = true;
    }

    pub(crate) fn commit_shares(&mut self, shares: ShareIndex) {
        self.shares = Some(shares);
    }

    /// Forget everything after the remote was wiped.
    pub(crate) fn reset(&mut self) {
        self.index = VaultIndex::new();
        self.shares = Some(ShareIndex::new());
        self.initialized = false;
    }
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("username", &self.username)
            .field("remote", &self.remote.name())
            .field("entries", &self.index.len())
            .field("observed_head", &self.observed_head)
            .finish_non_exhaustive()
    }
}
