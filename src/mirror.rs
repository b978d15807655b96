// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror repository management.
//!
//! A __mirror__ is a Git working tree that sits inside the configuration root
//! and holds a copy of every mapped path. It mediates between the live
//! configuration and a remote repository shared by all of the user's
//! machines:
//!
//! ```text
//! configuration root <-> mirror root <-> remote
//!        (adopt / apply)         (commit, push / pull)
//! ```
//!
//! # Ordering Guarantees
//!
//! - Push always adopts before committing, so nothing staged is stale.
//! - Pull always hard resets and cleans the mirror before pulling, so apply
//!   starts from a clean, conflict-free state.
//!
//! # Last Writer Wins
//!
//! There is no merging of divergent machine states. Whatever machine pushes
//! last defines the canonical configuration, and pulling overwrites local
//! files with it.

pub mod compare;
pub mod gateway;
pub mod transfer;

use crate::{
    config::{ConfigError, Metadata},
    mirror::{
        compare::{compare, CompareError, Comparison},
        gateway::{GatewayError, Git2Gateway, RepoGateway, RepoStatus, REMOTE_NAME},
        transfer::{adopt, apply, SyncResult, TransferError},
    },
    path::{Environment, Layout, PathError},
    store::{MetadataStore, StoreError, METADATA_FILE},
};

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Outcome of initializing a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Mirror was cloned from a remote that already had history. Nothing was
    /// adopted; pull next to install the shared configuration.
    pub joined: bool,
    pub results: Vec<SyncResult>,
    pub committed: bool,
    pub pushed: bool,
}

/// Outcome of pushing local configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub results: Vec<SyncResult>,
    pub committed: bool,
    pub pushed: bool,
}

/// Outcome of pulling remote configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub changed: bool,
    pub insertions: usize,
    pub deletions: usize,
    pub results: Vec<SyncResult>,
}

/// Overall sync status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub initialized: bool,
    pub metadata: Option<Metadata>,
    pub comparisons: Vec<Comparison>,
    pub repo: Option<RepoStatus>,
}

impl StatusReport {
    /// Every mapping is in sync between configuration root and mirror.
    pub fn is_synced(&self) -> bool {
        self.comparisons.iter().all(|comparison| comparison.in_sync)
    }
}

/// Configuration mirror.
///
/// Ties a [`Layout`] to a [`RepoGateway`] and sequences adopt, apply, and
/// repository operations into the init, push, pull, and status flows.
#[derive(Debug)]
pub struct Mirror<G = Git2Gateway>
where
    G: RepoGateway,
{
    layout: Layout,
    env: Environment,
    gateway: G,
}

impl<G> Mirror<G>
where
    G: RepoGateway,
{
    /// Construct new mirror handle. Touches nothing on disk.
    pub fn new(layout: Layout, env: Environment, gateway: G) -> Self {
        Self {
            layout,
            env,
            gateway,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn root(&self) -> &Path {
        &self.layout.mirror_root
    }

    fn store(&self) -> MetadataStore {
        MetadataStore::new(self.root())
    }

    /// Check that mirror exists and is a repository.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::NotInitialized`] if the mirror root is missing.
    /// - Return [`MirrorError::NotARepository`] if the mirror root exists
    ///   without repository metadata.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.root().is_dir() {
            return Err(MirrorError::NotInitialized {
                path: self.root().to_path_buf(),
            });
        }

        if !self.gateway.is_repository(self.root()) {
            return Err(MirrorError::NotARepository {
                path: self.root().to_path_buf(),
            });
        }

        Ok(())
    }

    /// Create mirror, optionally connected to a remote.
    ///
    /// With a remote, the remote is cloned. If it already has history then
    /// this machine joins it as is, and nothing is adopted. Otherwise the
    /// configuration root is adopted into a first commit, which is pushed if
    /// there is a remote to push to.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::AlreadyInitialized`] if mirror is already a
    ///   repository.
    /// - Return [`MirrorError::NetworkOrAccessFailure`] if remote cannot be
    ///   reached.
    /// - Return [`MirrorError::UnsupportedPlatform`] if the platform is not
    ///   supported.
    #[instrument(skip(self), level = "debug")]
    pub fn init(&self, remote: Option<&str>) -> Result<InitReport> {
        let root = self.root();
        if self.gateway.is_repository(root) {
            return Err(MirrorError::AlreadyInitialized {
                path: root.to_path_buf(),
            });
        }
        let metadata = Metadata::create(&self.layout.config_root, &self.env)?;

        // INVARIANT: Mirror root is exclusively ours, so leftovers of a
        // previous failed attempt can go.
        if root.exists() {
            warn!("remove stale mirror directory {:?}", root.display());
            fs::remove_dir_all(root).map_err(|err| MirrorError::Io {
                source: err,
                path: root.to_path_buf(),
            })?;
        }
        fs::create_dir_all(&self.layout.config_root).map_err(|err| MirrorError::Io {
            source: err,
            path: self.layout.config_root.clone(),
        })?;

        match remote {
            Some(url) => {
                if !self.gateway.test_reachable(url) {
                    return Err(MirrorError::NetworkOrAccessFailure {
                        message: format!("cannot reach remote {url}"),
                    });
                }
                self.gateway.clone_into(url, root)?;
            }
            None => self.gateway.init_at(root)?,
        }

        self.ignore_metadata()?;
        self.store().write(&metadata)?;

        if remote.is_some() && self.gateway.has_commits(root)? {
            info!("remote already has history, pull to install it");
            return Ok(InitReport {
                joined: true,
                results: Vec::new(),
                committed: false,
                pushed: false,
            });
        }

        let results = adopt(&self.layout.config_root, root)?;
        let message = format!("Initial sync from {}", metadata.machine_id);
        let committed = self.gateway.commit_all(root, &message)?.committed;
        let pushed = match remote {
            Some(_) => self.gateway.push(root)?.pushed,
            None => false,
        };

        Ok(InitReport {
            joined: false,
            results,
            committed,
            pushed,
        })
    }

    /// Capture configuration root, commit, and push it.
    ///
    /// Without a remote, changes are only committed locally.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::NotInitialized`] or
    ///   [`MirrorError::NotARepository`] if there is no usable mirror.
    /// - Return [`MirrorError::NetworkOrAccessFailure`] if push fails.
    #[instrument(skip(self), level = "debug")]
    pub fn push(&self, message: Option<&str>) -> Result<PushReport> {
        self.ensure_initialized()?;
        let root = self.root();

        let results = adopt(&self.layout.config_root, root)?;
        let message = match message {
            Some(message) => message.to_string(),
            None => format!("Sync from {}", self.machine_label()),
        };
        let committed = self.gateway.commit_all(root, &message)?.committed;

        let pushed = match self.gateway.status(root)?.remote_url {
            Some(_) => self.gateway.push(root)?.pushed,
            None => {
                warn!("no remote configured, changes were only committed locally");
                false
            }
        };
        self.store().touch_last_sync()?;

        Ok(PushReport {
            results,
            committed,
            pushed,
        })
    }

    /// Pull remote configuration and install it into the configuration root.
    ///
    /// Local, unpushed edits inside the mirror are discarded first.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::NotInitialized`] or
    ///   [`MirrorError::NotARepository`] if there is no usable mirror.
    /// - Return [`MirrorError::NoRemoteConfigured`] if there is no remote.
    /// - Return [`MirrorError::MergeConflict`] if pull leaves conflicts.
    /// - Return [`MirrorError::NetworkOrAccessFailure`] if fetch fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self) -> Result<PullReport> {
        self.ensure_initialized()?;
        let root = self.root();
        if self.gateway.status(root)?.remote_url.is_none() {
            return Err(MirrorError::NoRemoteConfigured);
        }

        self.gateway.hard_reset(root)?;
        self.gateway.clean_untracked(root)?;
        let outcome = self.gateway.pull(root)?;
        let results = apply(root, &self.layout.config_root)?;
        self.store().touch_last_sync()?;

        Ok(PullReport {
            changed: outcome.changed,
            insertions: outcome.insertions,
            deletions: outcome.deletions,
            results,
        })
    }

    /// Report sync state. Works even when the mirror does not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Compare`] if an existing file cannot be read.
    /// - Return [`MirrorError::Gateway`] if repository state cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn status(&self) -> Result<StatusReport> {
        let initialized = self.ensure_initialized().is_ok();
        let comparisons = compare(&self.layout.config_root, self.root())?;
        let (metadata, repo) = if initialized {
            (self.store().read(), Some(self.gateway.status(self.root())?))
        } else {
            (None, None)
        };

        Ok(StatusReport {
            initialized,
            metadata,
            comparisons,
            repo,
        })
    }

    /// Connect an existing mirror to a remote, replacing any previous URL.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::NotInitialized`] or
    ///   [`MirrorError::NotARepository`] if there is no usable mirror.
    pub fn set_remote(&self, url: &str) -> Result<()> {
        self.ensure_initialized()?;
        self.gateway.add_remote(self.root(), REMOTE_NAME, url)?;
        Ok(())
    }

    fn machine_label(&self) -> String {
        self.store()
            .read()
            .map(|metadata| metadata.machine_id)
            .unwrap_or_else(|| self.env.hostname.clone())
    }

    fn ignore_metadata(&self) -> Result<()> {
        // INVARIANT: Exclude through the repository's own exclude file, never
        // through a tracked ".gitignore" that a hard reset could revert.
        let info = self.root().join(".git").join("info");
        let path = info.join("exclude");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(MirrorError::Io { source: err, path }),
        };

        if content.lines().any(|line| line.trim() == METADATA_FILE) {
            return Ok(());
        }

        let mut content = content;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(METADATA_FILE);
        content.push('\n');
        fs::create_dir_all(&info).map_err(|err| MirrorError::Io {
            source: err,
            path: info.clone(),
        })?;
        fs::write(&path, content).map_err(|err| MirrorError::Io { source: err, path })
    }
}

/// Mirror error types.
///
/// Each variant carries a stable message. Use [`MirrorError::hint`] for a
/// suggestion on how to recover.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Mirror root does not exist.
    #[error("mirror at {:?} is not initialized", path.display())]
    NotInitialized { path: PathBuf },

    /// Mirror root exists, but is not a repository.
    #[error("mirror at {:?} is not a git repository", path.display())]
    NotARepository { path: PathBuf },

    /// Mirror root is already a repository.
    #[error("mirror at {:?} is already initialized", path.display())]
    AlreadyInitialized { path: PathBuf },

    /// Pull needs a remote, but none is configured.
    #[error("no remote is configured for the mirror")]
    NoRemoteConfigured,

    /// Pull left conflicted paths behind.
    #[error("pull produced merge conflicts in {paths:?}")]
    MergeConflict { paths: Vec<String> },

    /// Remote cannot be reached or refused access.
    #[error("cannot access remote: {message}")]
    NetworkOrAccessFailure { message: String },

    /// Platform cannot be determined or is not supported.
    #[error(transparent)]
    UnsupportedPlatform(PathError),

    /// Sync status cannot be computed.
    #[error(transparent)]
    Compare(#[from] CompareError),

    /// Content cannot be moved between configuration root and mirror.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Metadata cannot be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Filesystem operation on mirror fails.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Repository operation fails.
    #[error(transparent)]
    Gateway(GatewayError),
}

impl MirrorError {
    /// Suggestion for how to recover, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized { .. } => Some("run `claude-sync init` first"),
            Self::NotARepository { .. } => {
                Some("remove the mirror directory and run `claude-sync init` again")
            }
            Self::AlreadyInitialized { .. } => Some("use `claude-sync push` or `claude-sync pull`"),
            Self::NoRemoteConfigured => Some("run `claude-sync init --remote <url>` on a fresh mirror"),
            Self::MergeConflict { .. } => {
                Some("inspect the mirror with `git status`, then run `claude-sync pull` again")
            }
            Self::NetworkOrAccessFailure { .. } => {
                Some("check the remote URL, your network, and your git credentials")
            }
            Self::UnsupportedPlatform(_) => Some("only linux and macos are supported"),
            _ => None,
        }
    }
}

impl From<GatewayError> for MirrorError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotARepository { path } => Self::NotARepository { path },
            GatewayError::NoRemote => Self::NoRemoteConfigured,
            GatewayError::MergeConflict { paths } => Self::MergeConflict { paths },
            GatewayError::Network { message } => Self::NetworkOrAccessFailure { message },
            err => Self::Gateway(err),
        }
    }
}

impl From<PathError> for MirrorError {
    fn from(err: PathError) -> Self {
        Self::UnsupportedPlatform(err)
    }
}

impl From<ConfigError> for MirrorError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Platform(err) => Self::UnsupportedPlatform(err),
            err => Self::Store(StoreError::Serialize(err)),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
