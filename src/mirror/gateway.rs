// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository gateway.
//!
//! Narrow layer of indirection over every version control operation the
//! mirror needs. The orchestrators in [`crate::mirror`] only ever talk to a
//! [`RepoGateway`], so they can be exercised against an in-memory fake
//! without touching Git at all. [`Git2Gateway`] is the real implementation
//! backed by libgit2.
//!
//! # Remote Access
//!
//! Clone, fetch, and push go through [`auth_git2`] for credentials. Progress
//! is shown with an [`indicatif`] progress bar, and the bar is suspended
//! whenever the user has to be prompted for a username, password, or SSH key
//! passphrase.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    BranchType, Commit, Config, Direction, ErrorClass, ErrorCode, FetchOptions, IndexAddOption,
    PushOptions, Remote, RemoteCallbacks, Repository, RepositoryInitOptions, ResetType, Signature,
    Status, StatusOptions, Tree,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    cell::RefCell,
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Name of the remote every mirror pushes to and pulls from.
pub const REMOTE_NAME: &str = "origin";

/// Branch a freshly initialized mirror starts on.
pub const DEFAULT_BRANCH: &str = "main";

/// Snapshot of mirror repository state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    /// No modified, untracked, or conflicted paths.
    pub clean: bool,

    /// Current branch, `None` when `HEAD` is detached.
    pub branch: Option<String>,

    /// URL of [`REMOTE_NAME`], if configured.
    pub remote_url: Option<String>,

    /// Commits on the branch missing from its remote-tracking branch.
    pub ahead: usize,

    /// Commits on the remote-tracking branch missing from the branch.
    pub behind: usize,

    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicted: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub pushed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    pub changed: bool,
    pub insertions: usize,
    pub deletions: usize,
}

/// Version control operations required by the mirror.
pub trait RepoGateway {
    /// Path is the top-level of a repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// Repository has at least one commit on `HEAD`.
    fn has_commits(&self, path: &Path) -> Result<bool>;

    /// Gather branch, remote, and working tree state.
    fn status(&self, path: &Path) -> Result<RepoStatus>;

    /// Stage every addition, modification, and deletion, then commit.
    fn commit_all(&self, path: &Path, message: &str) -> Result<CommitOutcome>;

    /// Push current branch to [`REMOTE_NAME`].
    fn push(&self, path: &Path) -> Result<PushOutcome>;

    /// Fetch current branch from [`REMOTE_NAME`] and move onto it.
    ///
    /// Local commits the remote does not have are discarded.
    fn pull(&self, path: &Path) -> Result<PullOutcome>;

    /// Discard all changes to tracked files.
    fn hard_reset(&self, path: &Path) -> Result<()>;

    /// Remove untracked files and directories, leaving ignored ones alone.
    fn clean_untracked(&self, path: &Path) -> Result<()>;

    /// Clone remote repository into path.
    fn clone_into(&self, url: &str, path: &Path) -> Result<()>;

    /// Initialize a new repository at path.
    fn init_at(&self, path: &Path) -> Result<()>;

    /// Add remote, or point an existing one at a new URL.
    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<()>;

    /// Remote at URL can be connected to with current credentials.
    fn test_reachable(&self, url: &str) -> bool;
}

/// Repository gateway through libgit2.
#[derive(Debug, Clone, Default)]
pub struct Git2Gateway {
    interactive: bool,
}

impl Git2Gateway {
    /// Construct gateway that shows progress and may prompt for credentials.
    pub fn interactive() -> Self {
        Self { interactive: true }
    }

    /// Construct gateway that never draws to the terminal.
    pub fn quiet() -> Self {
        Self { interactive: false }
    }

    fn progress_bar(&self, message: &str) -> Result<ProgressBar> {
        if !self.interactive {
            return Ok(ProgressBar::hidden());
        }

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Ok(bar)
    }

    fn authenticator(&self, bar: &ProgressBar) -> GitAuthenticator {
        let authenticator = GitAuthenticator::default();
        if self.interactive {
            authenticator.set_prompter(IndicatifPrompter::new(bar.clone()))
        } else {
            authenticator
        }
    }
}

/// Build remote callbacks that authenticate and report transfer progress.
fn remote_callbacks<'a>(
    authenticator: &'a GitAuthenticator,
    config: &'a Config,
    bar: &'a ProgressBar,
) -> RemoteCallbacks<'a> {
    let mut throttle = Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(config));
    rc.transfer_progress(move |progress| {
        if throttle.elapsed() > Duration::from_millis(10) {
            throttle = Instant::now();
            bar.set_length(progress.total_objects() as u64);
            bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    rc
}

impl RepoGateway for Git2Gateway {
    fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    fn has_commits(&self, path: &Path) -> Result<bool> {
        let repo = open(path)?;
        let has_commits = repo.head().ok().and_then(|head| head.target()).is_some();
        Ok(has_commits)
    }

    #[instrument(skip(self, path), level = "debug")]
    fn status(&self, path: &Path) -> Result<RepoStatus> {
        let repo = open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let mut status = RepoStatus::default();
        for entry in repo.statuses(Some(&mut opts))?.iter() {
            let entry_path = entry.path().unwrap_or_default().to_string();
            let flags = entry.status();
            if flags.is_conflicted() {
                status.conflicted.push(entry_path);
            } else if flags == Status::WT_NEW {
                status.untracked.push(entry_path);
            } else if !flags.is_ignored() {
                status.modified.push(entry_path);
            }
        }

        status.clean =
            status.modified.is_empty() && status.untracked.is_empty() && status.conflicted.is_empty();
        status.branch = current_branch(&repo)?;
        status.remote_url = repo
            .find_remote(REMOTE_NAME)
            .ok()
            .and_then(|remote| remote.url().map(ToString::to_string));
        if let Some(branch) = &status.branch {
            if let Some((ahead, behind)) = ahead_behind(&repo, branch)? {
                status.ahead = ahead;
                status.behind = behind;
            }
        }

        Ok(status)
    }

    #[instrument(skip(self, path, message), level = "debug")]
    fn commit_all(&self, path: &Path, message: &str) -> Result<CommitOutcome> {
        let repo = open(path)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        if parent.as_ref().is_some_and(|parent| parent.tree_id() == tree_id) {
            debug!("nothing to commit in {:?}", path.display());
            return Ok(CommitOutcome { committed: false });
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = signature(&repo)?;
        let parents = parent.iter().collect::<Vec<&Commit<'_>>>();
        let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!("commit {oid}: {message}");

        Ok(CommitOutcome { committed: true })
    }

    #[instrument(skip(self, path), level = "debug")]
    fn push(&self, path: &Path) -> Result<PushOutcome> {
        let repo = open(path)?;
        let branch = current_branch(&repo)?.ok_or(GatewayError::DetachedHead)?;
        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| GatewayError::NoRemote)?;

        let local_ref = format!("refs/heads/{branch}");
        let Ok(local) = repo.refname_to_id(&local_ref) else {
            warn!("branch {branch} has no commits, nothing to push");
            return Ok(PushOutcome { pushed: false });
        };

        // INVARIANT: Avoid the network when the remote already has everything.
        if let Some((0, _)) = ahead_behind(&repo, &branch)? {
            debug!("branch {branch} is not ahead of {REMOTE_NAME}");
            return Ok(PushOutcome { pushed: false });
        }

        let bar = self.progress_bar(remote.url().unwrap_or(REMOTE_NAME))?;
        let authenticator = self.authenticator(&bar);
        let config = git_config()?;
        let rejected = RefCell::new(None);
        {
            let mut rc = remote_callbacks(&authenticator, &config, &bar);
            rc.push_update_reference(|refname, status| {
                if let Some(status) = status {
                    *rejected.borrow_mut() = Some(format!("{refname}: {status}"));
                }
                Ok(())
            });
            let mut po = PushOptions::new();
            po.remote_callbacks(rc);

            let refspec = format!("{local_ref}:{local_ref}");
            remote.push(&[refspec.as_str()], Some(&mut po)).map_err(network)?;
        }
        bar.finish_and_clear();

        if let Some(reason) = rejected.into_inner() {
            return Err(GatewayError::Network {
                message: format!("remote rejected push of {reason}"),
            });
        }

        // INVARIANT: Keep remote-tracking branch and upstream in step with
        // what was just pushed.
        repo.reference(
            &format!("refs/remotes/{REMOTE_NAME}/{branch}"),
            local,
            true,
            "push: update remote-tracking branch",
        )?;
        repo.find_branch(&branch, BranchType::Local)?
            .set_upstream(Some(&format!("{REMOTE_NAME}/{branch}")))?;
        info!("pushed {branch} to {REMOTE_NAME}");

        Ok(PushOutcome { pushed: true })
    }

    #[instrument(skip(self, path), level = "debug")]
    fn pull(&self, path: &Path) -> Result<PullOutcome> {
        let repo = open(path)?;
        let branch = current_branch(&repo)?.ok_or(GatewayError::DetachedHead)?;
        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| GatewayError::NoRemote)?;

        let tracking_ref = format!("refs/remotes/{REMOTE_NAME}/{branch}");
        let bar = self.progress_bar(remote.url().unwrap_or(REMOTE_NAME))?;
        let authenticator = self.authenticator(&bar);
        let config = git_config()?;
        {
            let mut fo = FetchOptions::new();
            fo.remote_callbacks(remote_callbacks(&authenticator, &config, &bar));
            let refspec = format!("+refs/heads/{branch}:{tracking_ref}");
            remote
                .fetch(&[refspec.as_str()], Some(&mut fo), None)
                .map_err(network)?;
        }
        bar.finish_and_clear();

        let Ok(fetched_id) = repo.refname_to_id(&tracking_ref) else {
            info!("{REMOTE_NAME} has no branch {branch} yet");
            return Ok(PullOutcome::default());
        };
        let fetched = repo.find_commit(fetched_id)?;
        let local_ref = format!("refs/heads/{branch}");

        let Some(head) = repo.head().ok().and_then(|head| head.peel_to_commit().ok()) else {
            // INVARIANT: Unborn branch simply takes over whatever was fetched.
            repo.reference(&local_ref, fetched_id, true, "pull: initial checkout")?;
            repo.set_head(&local_ref)?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            set_upstream(&repo, &branch)?;
            let (insertions, deletions) = diff_stats(&repo, None, &fetched.tree()?)?;
            return Ok(PullOutcome {
                changed: true,
                insertions,
                deletions,
            });
        };

        if head.id() == fetched_id {
            debug!("{branch} already up to date");
            return Ok(PullOutcome::default());
        }

        let annotated = repo.find_annotated_commit(fetched_id)?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;
        let old_tree = head.tree()?;
        if analysis.is_fast_forward() {
            info!("fast-forward {branch} to {fetched_id}");
            // INVARIANT: Check out before moving the branch, so the old HEAD
            // is the baseline and deleted paths get removed too.
            repo.checkout_tree(fetched.as_object(), Some(CheckoutBuilder::new().force()))?;
            repo.find_reference(&local_ref)?
                .set_target(fetched_id, &format!("pull: fast-forward to {fetched_id}"))?;
        } else {
            // INVARIANT: Last writer wins. Local history that the remote does
            // not have is dropped, never merged.
            warn!("{branch} diverged from {tracking_ref}, reset to {fetched_id}");
            repo.reset(
                fetched.as_object(),
                ResetType::Hard,
                Some(CheckoutBuilder::new().force()),
            )?;
        }

        let paths = conflicted_paths(&repo)?;
        if !paths.is_empty() {
            return Err(GatewayError::MergeConflict { paths });
        }

        set_upstream(&repo, &branch)?;
        let new_tree = repo.head()?.peel_to_tree()?;
        let (insertions, deletions) = diff_stats(&repo, Some(&old_tree), &new_tree)?;

        Ok(PullOutcome {
            changed: true,
            insertions,
            deletions,
        })
    }

    #[instrument(skip(self, path), level = "debug")]
    fn hard_reset(&self, path: &Path) -> Result<()> {
        let repo = open(path)?;
        repo.cleanup_state()?;
        let Some(head) = repo.head().ok().and_then(|head| head.peel_to_commit().ok()) else {
            debug!("nothing to reset, branch is unborn");
            return Ok(());
        };

        repo.reset(
            head.as_object(),
            ResetType::Hard,
            Some(CheckoutBuilder::new().force()),
        )?;

        Ok(())
    }

    #[instrument(skip(self, path), level = "debug")]
    fn clean_untracked(&self, path: &Path) -> Result<()> {
        let repo = open(path)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| GatewayError::NotARepository {
                path: path.to_path_buf(),
            })?
            .to_path_buf();

        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false);

        for entry in repo.statuses(Some(&mut opts))?.iter() {
            if !entry.status().is_wt_new() {
                continue;
            }

            let Some(relative) = entry.path() else {
                continue;
            };
            let target = workdir.join(relative);
            debug!("remove untracked {:?}", target.display());
            let result = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            result.map_err(|err| GatewayError::Io {
                source: err,
                path: target,
            })?;
        }

        Ok(())
    }

    #[instrument(skip(self, url, path), level = "debug")]
    fn clone_into(&self, url: &str, path: &Path) -> Result<()> {
        info!("clone {url} into {:?}", path.display());
        let bar = self.progress_bar(url)?;
        let authenticator = self.authenticator(&bar);
        let config = git_config()?;

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&authenticator, &config, &bar));
        let repo = RepoBuilder::new()
            .fetch_options(fo)
            .clone(url, path)
            .map_err(network)?;
        bar.finish_and_clear();

        // INVARIANT: Cloning an empty remote leaves whatever branch name the
        // remote advertises, so pin it to the default branch instead.
        if repo.head().is_err() {
            repo.set_head(&format!("refs/heads/{DEFAULT_BRANCH}"))?;
        }

        Ok(())
    }

    #[instrument(skip(self, path), level = "debug")]
    fn init_at(&self, path: &Path) -> Result<()> {
        info!("initialize mirror repository at {:?}", path.display());
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(DEFAULT_BRANCH);
        Repository::init_opts(path, &opts)?;

        Ok(())
    }

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<()> {
        let repo = open(path)?;
        if repo.find_remote(name).is_ok() {
            info!("point remote {name} at {url}");
            repo.remote_set_url(name, url)?;
        } else {
            repo.remote(name, url)?;
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn test_reachable(&self, url: &str) -> bool {
        let bar = ProgressBar::hidden();
        let authenticator = self.authenticator(&bar);
        let Ok(config) = git_config() else {
            return false;
        };
        let Ok(mut remote) = Remote::create_detached(url) else {
            return false;
        };

        let rc = remote_callbacks(&authenticator, &config, &bar);
        let reachable = match remote.connect_auth(Direction::Fetch, Some(rc), None) {
            Ok(_) => true,
            Err(error) => {
                warn!("cannot reach {url}: {}", error.message());
                false
            }
        };
        reachable
    }
}

fn open(path: &Path) -> Result<Repository> {
    Repository::open(path).map_err(|err| match err.code() {
        ErrorCode::NotFound => GatewayError::NotARepository {
            path: path.to_path_buf(),
        },
        _ => GatewayError::Git2(err),
    })
}

fn git_config() -> Result<Config> {
    Ok(Config::open_default().or_else(|_| Config::new())?)
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    // INVARIANT: Always provide valid name and email, even when git has no
    // identity configured on this machine.
    Ok(repo
        .signature()
        .or_else(|_| Signature::now("claude-sync", "claude-sync@localhost"))?)
}

fn current_branch(repo: &Repository) -> Result<Option<String>> {
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(ToString::to_string)),
        Ok(_) => Ok(None),
        Err(err) if err.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(ToString::to_string))
        }
        Err(err) => Err(err.into()),
    }
}

fn ahead_behind(repo: &Repository, branch: &str) -> Result<Option<(usize, usize)>> {
    let local = repo.refname_to_id(&format!("refs/heads/{branch}"));
    let upstream = repo.refname_to_id(&format!("refs/remotes/{REMOTE_NAME}/{branch}"));
    match (local, upstream) {
        (Ok(local), Ok(upstream)) => Ok(Some(repo.graph_ahead_behind(local, upstream)?)),
        _ => Ok(None),
    }
}

fn set_upstream(repo: &Repository, branch: &str) -> Result<()> {
    repo.find_branch(branch, BranchType::Local)?
        .set_upstream(Some(&format!("{REMOTE_NAME}/{branch}")))?;
    Ok(())
}

fn diff_stats(repo: &Repository, old: Option<&Tree<'_>>, new: &Tree<'_>) -> Result<(usize, usize)> {
    let stats = repo.diff_tree_to_tree(old, Some(new), None)?.stats()?;
    Ok((stats.insertions(), stats.deletions()))
}

fn conflicted_paths(repo: &Repository) -> Result<Vec<String>> {
    let index = repo.index()?;
    if !index.has_conflicts() {
        return Ok(Vec::new());
    }

    let paths = index
        .conflicts()?
        .filter_map(|conflict| conflict.ok())
        .filter_map(|conflict| conflict.our.or(conflict.their).or(conflict.ancestor))
        .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
        .collect();
    Ok(paths)
}

fn network(err: git2::Error) -> GatewayError {
    GatewayError::Network {
        message: err.message().to_string(),
    }
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Repository gateway error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Path holds no repository.
    #[error("{:?} is not a git repository", path.display())]
    NotARepository { path: PathBuf },

    /// Repository has no remote to talk to.
    #[error("no remote named {REMOTE_NAME:?} is configured")]
    NoRemote,

    /// Current branch cannot be determined.
    #[error("HEAD is detached")]
    DetachedHead,

    /// Integrating remote changes left conflicts.
    #[error("merge left conflicts in {paths:?}")]
    MergeConflict { paths: Vec<String> },

    /// Remote cannot be reached or refused access.
    #[error("remote access failed: {message}")]
    Network { message: String },

    /// Working tree cannot be modified.
    #[error("failed to remove {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(git2::Error),
}

impl From<git2::Error> for GatewayError {
    fn from(err: git2::Error) -> Self {
        match (err.class(), err.code()) {
            (ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http | ErrorClass::Ssl, _)
            | (_, ErrorCode::Auth | ErrorCode::Certificate) => network(err),
            _ => Self::Git2(err),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
