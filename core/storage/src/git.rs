//! Git-backed remote store.
//!
//! Every read and publish works in a throwaway repository: the vault branch
//! is fetched (shallow where the transport allows it) into a fresh local
//! repository, and a publish checks it out, writes the staged blobs, creates
//! one commit and pushes it. libgit2 is blocking, so all repository work runs
//! on the blocking thread pool.

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{
    Commit, Cred, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, Signature,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::raw::RawFetcher;
use crate::remote::{
    check_head, Changeset, CommitAuthor, PublishOptions, PublishReceipt, RemoteStore, Snapshot,
};
use nexusvault_common::{Error, Result, SensitiveBytes};

/// Branch every vault lives on.
pub const DEFAULT_BRANCH: &str = "master";

/// Default repository name under the owner's account.
pub const DEFAULT_REPOSITORY: &str = ".nexus";

/// Default repository host.
pub const DEFAULT_HOST: &str = "github.com";

/// Where an owner's vault repository lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub owner: String,
    pub repository: String,
    pub host: String,
}

impl RemoteLocation {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        host: impl Into<String>,
    ) -> Result<Self> {
        let location = Self {
            owner: owner.into(),
            repository: repository.into(),
            host: host.into(),
        };
        for (what, value) in [
            ("owner", &location.owner),
            ("repository", &location.repository),
            ("host", &location.host),
        ] {
            if value.is_empty() || value.contains(['/', ':', ' ']) {
                return Err(Error::InvalidInput(format!("Invalid {}: {:?}", what, value)));
            }
        }
        Ok(location)
    }

    /// SSH URL used for fetch and push.
    pub fn ssh_url(&self) -> String {
        format!("git@{}:{}/{}.git", self.host, self.owner, self.repository)
    }

    /// Base URL serving raw blobs of the vault branch.
    pub fn raw_base_url(&self) -> String {
        if self.host == DEFAULT_HOST {
            format!(
                "https://raw.githubusercontent.com/{}/{}/{}/",
                self.owner, self.repository, DEFAULT_BRANCH
            )
        } else {
            format!(
                "https://{}/{}/{}/raw/{}/",
                self.host, self.owner, self.repository, DEFAULT_BRANCH
            )
        }
    }
}

/// How [`RemoteStore::fetch_blob`] reads single blobs.
#[derive(Debug, Clone)]
enum BlobFetch {
    /// Unauthenticated HTTPS raw download. Raw hosts may serve a cached
    /// copy, so this is only used for read-only access to someone else's
    /// vault.
    Raw(RawFetcher),
    /// Fetch the branch and read the blob from its tip.
    Git,
}

/// Remote store backed by a git repository.
#[derive(Debug, Clone)]
pub struct GitRemote {
    url: String,
    branch: String,
    credential: Option<SensitiveBytes>,
    fetch: BlobFetch,
}

impl GitRemote {
    /// Create a store for `url`, reading blobs through git.
    ///
    /// `credential` is a private key in OpenSSH/PEM form, used for SSH
    /// transports. Local and `file://` URLs need none.
    pub fn new(url: impl Into<String>, credential: Option<SensitiveBytes>) -> Self {
        Self {
            url: url.into(),
            branch: DEFAULT_BRANCH.to_string(),
            credential,
            fetch: BlobFetch::Git,
        }
    }

    /// Create a store for an owner's hosted vault over SSH.
    pub fn for_location(location: &RemoteLocation, credential: Option<SensitiveBytes>) -> Self {
        Self::new(location.ssh_url(), credential)
    }

    /// Create a read-only store for someone else's hosted vault.
    ///
    /// Blobs come over raw HTTPS without any credential. Publishing through
    /// this store fails at the SSH transport.
    pub fn public(location: &RemoteLocation) -> Result<Self> {
        let mut remote = Self::new(location.ssh_url(), None);
        remote.fetch = BlobFetch::Raw(RawFetcher::new(&location.raw_base_url())?);
        Ok(remote)
    }

    /// Use a different branch than `master`.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteStore for GitRemote {
    fn name(&self) -> &str {
        "git"
    }

    async fn fetch_blob(&self, path: &str) -> Result<Vec<u8>> {
        match &self.fetch {
            BlobFetch::Raw(fetcher) => fetcher.fetch(path).await,
            BlobFetch::Git => self
                .fetch_snapshot(path)
                .await?
                .content
                .ok_or_else(|| Error::NotFound(format!("Object not found: {}", path))),
        }
    }

    async fn head(&self) -> Result<Option<String>> {
        let this = self.clone();
        run_blocking(move || this.remote_head()).await
    }

    async fn fetch_snapshot(&self, path: &str) -> Result<Snapshot> {
        let this = self.clone();
        let path = path.to_string();
        run_blocking(move || this.snapshot_blocking(&path)).await
    }

    async fn publish(
        &self,
        changes: Changeset,
        message: &str,
        author: &CommitAuthor,
        opts: PublishOptions,
    ) -> Result<PublishReceipt> {
        let this = self.clone();
        let message = message.to_string();
        let author = author.clone();
        run_blocking(move || this.publish_blocking(&changes, &message, &author, &opts)).await
    }
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| Error::Transport(format!("Repository task failed: {}", e)))?
}

/// Attach context to libgit2 failures.
trait GitContext<T> {
    fn context(self, what: &str) -> Result<T>;
}

impl<T> GitContext<T> for std::result::Result<T, git2::Error> {
    fn context(self, what: &str) -> Result<T> {
        self.map_err(|e| Error::Transport(format!("{}: {}", what, e.message())))
    }
}

/// libgit2's local transport does not support shallow fetches.
fn is_local_url(url: &str) -> bool {
    url.starts_with("file://") || !(url.contains("://") || url.contains('@'))
}

/// Read `path` from the tree of commit `tip`.
fn read_blob(repo: &Repository, tip: Oid, path: &str) -> Result<Option<Vec<u8>>> {
    let tree = repo
        .find_commit(tip)
        .and_then(|commit| commit.tree())
        .context("Failed to read head tree")?;
    let entry = match tree.get_path(Path::new(path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Transport(format!(
                "Failed to look up {}: {}",
                path,
                e.message()
            )))
        }
    };
    Ok(entry
        .to_object(repo)
        .and_then(|object| object.peel_to_blob())
        .ok()
        .map(|blob| blob.content().to_vec()))
}

impl GitRemote {
    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(key) = &self.credential {
            let mut attempts = 0u32;
            callbacks.credentials(move |_url, username, _allowed| {
                attempts += 1;
                if attempts > 3 {
                    return Err(git2::Error::from_str("authentication failed"));
                }
                let pem = std::str::from_utf8(key.as_bytes())
                    .map_err(|_| git2::Error::from_str("private key is not valid UTF-8"))?;
                Cred::ssh_key_from_memory(username.unwrap_or("git"), None, pem, None)
            });
        }
        callbacks
    }

    /// Fetch the vault branch into `repo` and return its tip.
    ///
    /// A remote without the branch (including an empty one) yields `None`.
    fn fetch_branch(&self, repo: &Repository) -> Result<Option<Oid>> {
        let tracking = format!("refs/remotes/origin/{}", self.branch);
        let refspec = format!("+refs/heads/{}:{}", self.branch, tracking);

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.callbacks());
        if !is_local_url(&self.url) {
            fetch.depth(1);
        }

        let mut remote = repo.remote_anonymous(&self.url).context("Invalid remote")?;
        remote
            .fetch(&[refspec.as_str()], Some(&mut fetch), None)
            .context("Failed to fetch vault")?;

        match repo.find_reference(&tracking) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(Error::Transport(format!(
                "Failed to read fetched branch: {}",
                e.message()
            ))),
        }
    }

    fn scratch_fetch(&self) -> Result<(tempfile::TempDir, Repository, Option<Oid>)> {
        let scratch = tempfile::tempdir()?;
        let repo = Repository::init_bare(scratch.path())
            .context("Failed to create scratch repository")?;
        let tip = self.fetch_branch(&repo)?;
        Ok((scratch, repo, tip))
    }

    fn remote_head(&self) -> Result<Option<String>> {
        let (_scratch, _repo, tip) = self.scratch_fetch()?;
        Ok(tip.map(|oid| oid.to_string()))
    }

    fn snapshot_blocking(&self, path: &str) -> Result<Snapshot> {
        let (_scratch, repo, tip) = self.scratch_fetch()?;
        let Some(tip) = tip else {
            return Ok(Snapshot::default());
        };
        Ok(Snapshot {
            head: Some(tip.to_string()),
            content: read_blob(&repo, tip, path)?,
        })
    }

    fn init_into(&self, dir: &Path) -> Result<Repository> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(&self.branch);
        let repo = Repository::init_opts(dir, &opts).context("Failed to initialize repository")?;
        repo.remote("origin", &self.url)
            .context("Failed to configure remote")?;
        Ok(repo)
    }

    /// Point the local branch at `tip` and populate the work tree and index.
    fn check_out(&self, repo: &Repository, tip: Oid) -> Result<()> {
        let commit = repo.find_commit(tip).context("Failed to read fetched commit")?;
        repo.reference(
            &format!("refs/heads/{}", self.branch),
            tip,
            true,
            "nexus: fetched vault",
        )
        .context("Failed to set branch")?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .context("Failed to check out vault")?;
        Ok(())
    }

    fn publish_blocking(
        &self,
        changes: &Changeset,
        message: &str,
        author: &CommitAuthor,
        opts: &PublishOptions,
    ) -> Result<PublishReceipt> {
        let workdir = tempfile::tempdir()?;
        let repo = self.init_into(workdir.path())?;

        let tip = self.fetch_branch(&repo)?;
        check_head(&opts.head_check, tip.map(|oid| oid.to_string()).as_deref())?;
        match tip {
            Some(tip) if !opts.force => {
                debug!(tip = %tip, "Building on fetched vault");
                self.check_out(&repo, tip)?;
            }
            _ => debug!(force = opts.force, "Starting from an empty tree"),
        }

        let mut index = repo.index().context("Failed to open index")?;
        for (path, data) in changes.writes() {
            let target = workdir.path().join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, data)?;
            index
                .add_path(Path::new(path))
                .context("Failed to stage blob")?;
        }

        let mut missing_removals = Vec::new();
        if !opts.force {
            for path in changes.removals() {
                if index.get_path(Path::new(path), 0).is_none() {
                    missing_removals.push(path.clone());
                    continue;
                }
                index
                    .remove_path(Path::new(path))
                    .context("Failed to unstage blob")?;
                let target = workdir.path().join(path);
                if target.exists() {
                    fs::remove_file(target)?;
                }
            }
        }

        index.write().context("Failed to write index")?;
        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = repo.find_tree(tree_id).context("Failed to read tree")?;

        let signature =
            Signature::now(&author.name, &author.email).context("Invalid commit author")?;
        let parent = if opts.force {
            None
        } else {
            repo.head().ok().and_then(|head| head.peel_to_commit().ok())
        };
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let commit = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .context("Failed to create commit")?;

        self.push(&repo, opts.force)?;

        info!(commit = %commit, force = opts.force, "Published commit");
        Ok(PublishReceipt {
            commit: commit.to_string(),
            missing_removals,
        })
    }

    fn push(&self, repo: &Repository, force: bool) -> Result<()> {
        let refspec = format!(
            "{}refs/heads/{branch}:refs/heads/{branch}",
            if force { "+" } else { "" },
            branch = self.branch
        );

        let mut rejection: Option<String> = None;
        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{}: {}", refname, status));
                }
                Ok(())
            });
            let mut push = PushOptions::new();
            push.remote_callbacks(callbacks);

            let mut remote = repo.find_remote("origin").context("Missing origin")?;
            remote
                .push(&[refspec.as_str()], Some(&mut push))
                .context("Failed to push")?;
        }

        match rejection {
            Some(reason) => Err(Error::Transport(format!("Push rejected: {}", reason))),
            None => Ok(()),
        }
    }
}
