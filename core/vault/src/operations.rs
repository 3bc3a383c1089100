//! Vault file operations with encryption/decryption.
//!
//! Every mutating operation works on a copy of the index, publishes the
//! content change and the re-encrypted index as one commit, and only then
//! installs the new index in the session. A failed publish leaves both the
//! remote and the session as they were.

use tracing::{debug, info, warn};

use crate::config::INDEX_PATH;
use crate::index::{VaultEntry, VaultIndex};
use crate::progress::{Progress, NO_PROGRESS};
use crate::session::VaultSession;
use nexusvault_common::{Error, Result, VaultPath};
use nexusvault_crypto::{
    decrypt_with_key, encrypt_with_key, generate_file_key, generate_random_name,
};
use nexusvault_storage::Changeset;

/// Vault operations handler.
///
/// Borrows a connected session for the duration of a command.
pub struct VaultOperations<'a> {
    session: &'a mut VaultSession,
    progress: &'a dyn Progress,
}

impl<'a> VaultOperations<'a> {
    /// Create new operations handler for a session.
    pub fn new(session: &'a mut VaultSession) -> Self {
        Self {
            session,
            progress: &NO_PROGRESS,
        }
    }

    /// Report steps to `progress`.
    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    fn index_change(&self, index: &VaultIndex) -> Result<Changeset> {
        let settings = self.session.settings();
        let mut changes = Changeset::new();
        changes.write(INDEX_PATH, index.to_bytes(self.session.password(), &settings.kdf)?)?;
        Ok(changes)
    }

    /// Initialize a new vault by publishing an empty index.
    ///
    /// # Preconditions
    /// - The remote holds no index yet
    ///
    /// # Errors
    /// - `Error::InvalidInput` if the vault is already set up
    /// - Publish failure
    pub async fn setup(&mut self) -> Result<()> {
        if self.session.is_initialized() {
            return Err(Error::InvalidInput(format!(
                "Vault for {} is already set up",
                self.session.username()
            )));
        }

        self.progress.step(1, 2, "Encrypting empty index...");
        let index = VaultIndex::new();
        let changes = self.index_change(&index)?;
        self.progress.done("Index encrypted");

        self.progress.step(2, 2, "Publishing vault...");
        self.session.publish(changes, "Setup").await?;
        self.session.commit_index(index);
        self.progress.done("Vault published");

        info!(user = %self.session.username(), "Vault set up");
        Ok(())
    }

    /// Store `content` at `path`.
    ///
    /// A new path gets a fresh storage name and file key. An existing file
    /// keeps both, so its blob is replaced in place.
    ///
    /// # Postconditions
    /// - Exactly one commit holding the content blob and the new index
    ///
    /// # Errors
    /// - `path` names a folder
    /// - Existing file key does not open under the vault password
    /// - Publish failure
    pub async fn upload(&mut self, path: &VaultPath, content: &[u8]) -> Result<VaultEntry> {
        debug!(path = %path, size = content.len(), "Uploading file");
        let settings = self.session.settings().clone();
        let password = self.session.password();

        self.progress.step(1, 4, "Validating vault...");
        let (real_name, file_key, sealed_key) = match self.session.index().find_entry(path) {
            Some(entry) if entry.is_folder() => {
                return Err(Error::InvalidInput(format!(
                    "'{}' is a directory, you can only upload individual files",
                    path
                )));
            }
            Some(entry) => {
                debug!(real_name = %entry.real_name, "Updating existing file");
                let key = entry.open_key(password)?;
                let sealed = entry.file_key.clone().unwrap_or_default();
                (entry.real_name.clone(), key, sealed)
            }
            None => {
                let key = generate_file_key()?;
                let sealed = VaultEntry::seal_key(&key, password, &settings.kdf)?;
                (generate_random_name(settings.file_hash_bytes())?, key, sealed)
            }
        };
        self.progress.done("File validated");

        self.progress.step(2, 4, "Encrypting file...");
        let ciphertext = encrypt_with_key(content, &file_key)?;
        self.progress.done("File encrypted");

        self.progress.step(3, 4, "Updating vault index...");
        let mut index = self.session.index().clone();
        index.add_file(path, real_name.clone(), sealed_key);
        let mut changes = self.index_change(&index)?;
        changes.write(real_name.clone(), ciphertext)?;
        self.progress.done("Vault index updated");

        self.progress.step(4, 4, "Uploading to remote...");
        self.session.publish(changes, "Upload").await?;
        let entry = index
            .find_entry(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        self.session.commit_index(index);
        self.progress.done("Upload completed");

        info!(size = content.len(), "File uploaded");
        Ok(entry)
    }

    /// Fetch and decrypt the file at `path`.
    ///
    /// # Errors
    /// - `Error::NotFound` if the path is not in the index or its blob is gone
    /// - `path` names a folder
    /// - Decryption failure
    pub async fn download(&self, path: &VaultPath) -> Result<Vec<u8>> {
        let entry = self.file_entry(path, "download")?;
        debug!(path = %path, real_name = %entry.real_name, "Downloading file");

        self.progress.step(1, 2, "Fetching encrypted file...");
        let ciphertext = self.session.remote().fetch_blob(&entry.real_name).await?;
        self.progress.done("File fetched");

        self.progress.step(2, 2, "Decrypting file...");
        let key = entry.open_key(self.session.password())?;
        let content = decrypt_with_key(&ciphertext, &key)?;
        self.progress.done("File decrypted");

        debug!(size = content.len(), "File downloaded");
        Ok(content)
    }

    fn file_entry(&self, path: &VaultPath, verb: &str) -> Result<&VaultEntry> {
        let entry = self
            .session
            .index()
            .find_entry(path)
            .ok_or_else(|| Error::NotFound(format!("'{}' is not in the vault", path)))?;
        if entry.is_folder() {
            return Err(Error::InvalidInput(format!(
                "'{}' is a directory, you can only {} individual files",
                path, verb
            )));
        }
        Ok(entry)
    }

    /// Remove `path` from the vault.
    ///
    /// For a file, the storage blob is removed in the same commit as the
    /// index update. A blob that is already missing is only noted. Folders
    /// must be empty.
    ///
    /// # Errors
    /// - `Error::NotFound` if the path is not in the index
    /// - Folder still has entries below it
    /// - Publish failure
    pub async fn delete(&mut self, path: &VaultPath) -> Result<()> {
        debug!(path = %path, "Deleting entry");

        self.progress.step(1, 2, "Updating vault index...");
        let mut index = self.session.index().clone();
        let entry = index
            .remove(path)
            .ok_or_else(|| Error::NotFound(format!("'{}' is not in the vault", path)))?;
        if entry.is_folder() && index.has_children(path) {
            return Err(Error::InvalidInput(format!(
                "Folder '{}' is not empty",
                path
            )));
        }
        let mut changes = self.index_change(&index)?;
        if entry.is_file() {
            changes.remove(entry.real_name.clone())?;
        }
        self.progress.done("Vault index updated");

        self.progress.step(2, 2, "Pushing changes...");
        let receipt = self.session.publish(changes, "Delete").await?;
        for missing in &receipt.missing_removals {
            warn!(real_name = %missing, "Storage file already missing from remote");
        }
        self.session.commit_index(index);
        self.progress.done("Changes pushed");

        info!("Entry deleted");
        Ok(())
    }

    /// Create an explicit folder entry.
    ///
    /// # Errors
    /// - A file exists at `path`
    /// - Publish failure
    pub async fn make_folder(&mut self, path: &VaultPath) -> Result<()> {
        if self
            .session
            .index()
            .find_entry(path)
            .is_some_and(VaultEntry::is_folder)
        {
            debug!(path = %path, "Folder already exists");
            return Ok(());
        }

        let mut index = self.session.index().clone();
        index.add_folder(path)?;
        let changes = self.index_change(&index)?;

        self.progress.step(1, 1, "Publishing folder...");
        self.session.publish(changes, "Create folder").await?;
        self.session.commit_index(index);
        self.progress.done("Folder created");
        Ok(())
    }

    /// All entries, ordered by path.
    pub fn list(&self) -> Vec<(String, VaultEntry)> {
        self.session
            .index()
            .list()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect()
    }

    /// Entries whose path contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<(String, VaultEntry)> {
        self.session
            .index()
            .search(query)
            .into_iter()
            .map(|(p, e)| (p.to_string(), e.clone()))
            .collect()
    }

    /// Wipe the remote: all history is replaced by one empty commit.
    ///
    /// # Postconditions
    /// - Remote head is a single parentless commit with an empty tree
    /// - Session index and share index are empty
    pub async fn purge(&mut self) -> Result<()> {
        warn!(user = %self.session.username(), "Purging vault");

        self.progress.step(1, 1, "Wiping remote repository...");
        self.session
            .publish_forced(Changeset::new(), "Purge vault")
            .await?;
        self.session.reset();
        self.progress.done("Remote repository wiped");

        info!("Vault purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::progress::recording::RecordingProgress;
    use nexusvault_common::IndexError;
    use nexusvault_crypto::KdfParams;
    use nexusvault_storage::{MemoryRemote, RemoteStore};
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings {
            kdf: KdfParams::light(),
            ..Settings::default()
        }
    }

    fn path(p: &str) -> VaultPath {
        VaultPath::parse_entry(p).unwrap()
    }

    async fn connect(remote: &MemoryRemote, password: &str) -> Result<VaultSession> {
        VaultSession::connect("alice", password.into(), settings(), Arc::new(remote.clone()))
            .await
    }

    async fn vault() -> (MemoryRemote, VaultSession) {
        let remote = MemoryRemote::new();
        let mut session = connect(&remote, "vault-pw").await.unwrap();
        VaultOperations::new(&mut session).setup().await.unwrap();
        (remote, session)
    }

    #[tokio::test]
    async fn test_setup_publishes_empty_index() {
        let (remote, session) = vault().await;

        assert!(session.is_initialized());
        assert_eq!(remote.paths(), vec![INDEX_PATH.to_string()]);
        assert_eq!(remote.head_commit().unwrap().message, "Nexus: Setup");

        let reconnected = connect(&remote, "vault-pw").await.unwrap();
        assert!(reconnected.index().is_empty());
        assert!(reconnected.is_initialized());
    }

    #[tokio::test]
    async fn test_setup_twice_rejected() {
        let (_remote, mut session) = vault().await;
        assert!(matches!(
            VaultOperations::new(&mut session).setup().await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (remote, mut session) = vault().await;
        let before = remote.publish_count();

        let entry = VaultOperations::new(&mut session)
            .upload(&path("docs/a.txt"), b"hello vault")
            .await
            .unwrap();

        assert_eq!(remote.publish_count(), before + 1);
        assert_eq!(entry.real_name.len(), 32);
        assert!(remote.paths().contains(&entry.real_name));
        assert_ne!(
            remote.fetch_blob(&entry.real_name).await.unwrap(),
            b"hello vault".to_vec()
        );

        let ops = VaultOperations::new(&mut session);
        assert_eq!(ops.download(&path("docs/a.txt")).await.unwrap(), b"hello vault");
    }

    #[tokio::test]
    async fn test_empty_file_roundtrip() {
        let (_remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);

        ops.upload(&path("empty"), b"").await.unwrap();
        assert!(ops.download(&path("empty")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_session_reads_published_state() {
        let (remote, mut session) = vault().await;
        VaultOperations::new(&mut session)
            .upload(&path("a.bin"), &[7u8; 1000])
            .await
            .unwrap();
        session.disconnect();

        let mut other = connect(&remote, "vault-pw").await.unwrap();
        let ops = VaultOperations::new(&mut other);
        assert_eq!(ops.download(&path("a.bin")).await.unwrap(), vec![7u8; 1000]);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_storage_name() {
        let (remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);

        let first = ops.upload(&path("a.txt"), b"one").await.unwrap();
        let second = ops.upload(&path("a.txt"), b"two").await.unwrap();

        assert_eq!(first.real_name, second.real_name);
        assert_eq!(ops.download(&path("a.txt")).await.unwrap(), b"two");
        assert_eq!(remote.paths().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_reports_progress() {
        let (_remote, mut session) = vault().await;
        let progress = RecordingProgress::default();

        VaultOperations::new(&mut session)
            .with_progress(&progress)
            .upload(&path("a"), b"x")
            .await
            .unwrap();

        assert_eq!(progress.steps(), vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
        assert_eq!(progress.events().last().unwrap(), "done Upload completed");
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_session_unchanged() {
        let (remote, mut session) = vault().await;
        remote.fail_next_publish("network down");

        let result = VaultOperations::new(&mut session)
            .upload(&path("a.txt"), b"x")
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(session.index().is_empty());
        assert_eq!(remote.paths(), vec![INDEX_PATH.to_string()]);
    }

    #[tokio::test]
    async fn test_delete_then_list() {
        let (remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);
        let entry = ops.upload(&path("a.txt"), b"x").await.unwrap();
        ops.upload(&path("b.txt"), b"y").await.unwrap();

        ops.delete(&path("a.txt")).await.unwrap();

        let listed: Vec<String> = ops.list().into_iter().map(|(p, _)| p).collect();
        assert_eq!(listed, vec!["b.txt".to_string()]);
        assert!(!remote.paths().contains(&entry.real_name));
        assert!(matches!(
            ops.download(&path("a.txt")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ops.delete(&path("a.txt")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_blob() {
        let (remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);
        let entry = ops.upload(&path("a.txt"), b"x").await.unwrap();

        let mut changes = Changeset::new();
        changes.remove(entry.real_name.clone()).unwrap();
        remote
            .publish(
                changes,
                "lost",
                &nexusvault_storage::CommitAuthor::new("t", "t@example.com"),
                Default::default(),
            )
            .await
            .unwrap();

        ops.delete(&path("a.txt")).await.unwrap();
        assert!(ops.list().is_empty());
    }

    #[tokio::test]
    async fn test_dangling_entry_reports_not_found() {
        let (remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);
        let entry = ops.upload(&path("a.txt"), b"x").await.unwrap();

        let mut changes = Changeset::new();
        changes.remove(entry.real_name.clone()).unwrap();
        remote
            .publish(
                changes,
                "lost",
                &nexusvault_storage::CommitAuthor::new("t", "t@example.com"),
                Default::default(),
            )
            .await
            .unwrap();

        assert!(ops.download(&path("a.txt")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_folders() {
        let (_remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);

        ops.make_folder(&path("docs")).await.unwrap();
        ops.make_folder(&path("docs")).await.unwrap();
        ops.upload(&path("docs/a.txt"), b"x").await.unwrap();

        assert!(matches!(
            ops.download(&path("docs")).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ops.upload(&path("docs"), b"x").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(ops.delete(&path("docs")).await.is_err());

        ops.delete(&path("docs/a.txt")).await.unwrap();
        ops.delete(&path("docs")).await.unwrap();
        assert!(ops.list().is_empty());
    }

    #[tokio::test]
    async fn test_search() {
        let (_remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);
        ops.upload(&path("Photos/beach.jpg"), b"1").await.unwrap();
        ops.upload(&path("notes.md"), b"2").await.unwrap();

        let hits: Vec<String> = ops.search("PHOTO").into_iter().map(|(p, _)| p).collect();
        assert_eq!(hits, vec!["Photos/beach.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_empties_vault() {
        let (remote, mut session) = vault().await;
        let mut ops = VaultOperations::new(&mut session);
        ops.upload(&path("a.txt"), b"x").await.unwrap();

        ops.purge().await.unwrap();

        assert!(ops.list().is_empty());
        assert!(remote.paths().is_empty());
        assert_eq!(remote.history_len(), 1);

        let fresh = connect(&remote, "vault-pw").await.unwrap();
        assert!(fresh.index().is_empty());
        assert!(!fresh.is_initialized());
    }

    #[tokio::test]
    async fn test_wrong_password_after_upload() {
        let (remote, mut session) = vault().await;
        VaultOperations::new(&mut session)
            .upload(&path("a.txt"), b"x")
            .await
            .unwrap();

        assert!(matches!(
            connect(&remote, "not-the-password").await,
            Err(Error::Index(IndexError::WrongPassword))
        ));
    }

    #[tokio::test]
    async fn test_strict_publish_detects_concurrent_writer() {
        let remote = MemoryRemote::new();
        let strict = Settings {
            strict_publish: true,
            ..settings()
        };
        let mut first =
            VaultSession::connect("alice", "pw".into(), strict.clone(), Arc::new(remote.clone()))
                .await
                .unwrap();
        VaultOperations::new(&mut first).setup().await.unwrap();

        let mut second =
            VaultSession::connect("alice", "pw".into(), strict, Arc::new(remote.clone()))
                .await
                .unwrap();
        VaultOperations::new(&mut second)
            .upload(&path("b.txt"), b"b")
            .await
            .unwrap();

        let result = VaultOperations::new(&mut first)
            .upload(&path("a.txt"), b"a")
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_operations_over_git_remote() {
        use crate::share::{download_shared, ShareManager, ShareString};
        use nexusvault_storage::GitRemote;

        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init_bare(dir.path()).unwrap();
        let url = dir.path().to_str().unwrap().to_string();
        let remote: Arc<dyn RemoteStore> = Arc::new(GitRemote::new(url.clone(), None));

        let mut session =
            VaultSession::connect("alice", "vault-pw".into(), settings(), remote.clone())
                .await
                .unwrap();
        assert!(!session.is_initialized());
        let mut ops = VaultOperations::new(&mut session);
        ops.setup().await.unwrap();
        ops.upload(&path("docs/a.txt"), b"alpha").await.unwrap();
        ops.upload(&path("b.txt"), b"").await.unwrap();
        ops.delete(&path("b.txt")).await.unwrap();
        session.disconnect();

        let mut session =
            VaultSession::connect("alice", "vault-pw".into(), settings(), remote.clone())
                .await
                .unwrap();
        assert_eq!(session.observed_head(), remote.head().await.unwrap().as_deref());
        let keys: Vec<&str> = session.index().list().map(|(p, _)| p).collect();
        assert_eq!(keys, vec!["docs/a.txt"]);
        assert_eq!(
            VaultOperations::new(&mut session)
                .download(&path("docs/a.txt"))
                .await
                .unwrap(),
            b"alpha"
        );

        let share = ShareManager::new(&mut session)
            .share(&path("docs/a.txt"), "share-pw")
            .await
            .unwrap();
        let received = ShareString::parse(&share.to_string()).unwrap();
        let recipient = GitRemote::new(url, None);
        let download = download_shared(&received, &recipient).await.unwrap();
        assert_eq!(download.content, b"alpha");
        assert_eq!(download.filename.as_deref(), Some("a.txt"));

        VaultOperations::new(&mut session).purge().await.unwrap();
        session.disconnect();

        let session = VaultSession::connect("alice", "vault-pw".into(), settings(), remote)
            .await
            .unwrap();
        assert!(!session.is_initialized());
        assert!(session.index().is_empty());

        let bare = git2::Repository::open_bare(dir.path()).unwrap();
        let head = bare
            .find_reference("refs/heads/master")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(head.parent_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_messages_never_contain_paths() {
        let (remote, mut session) = vault().await;
        VaultOperations::new(&mut session)
            .upload(&path("secret/plans.txt"), b"x")
            .await
            .unwrap();

        let message = remote.head_commit().unwrap().message;
        assert_eq!(message, "Nexus: Upload");
        assert!(!message.contains("plans"));
    }
}
