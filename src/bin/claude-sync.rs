// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use claude_sync::{
    mirror::{gateway::Git2Gateway, StatusReport},
    Environment, Layout, Mirror, MirrorError, SyncResult,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "claude-sync [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Use this configuration root instead of discovering one.
    #[arg(long, global = true, value_name = "path")]
    pub config_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let env = Environment::from_process()?;
        let layout = match self.config_root {
            Some(path) => Layout::with_config_root(path),
            None => Layout::resolve(&env),
        };
        let mirror = Mirror::new(layout, env, Git2Gateway::interactive());

        match self.command {
            Command::Init(opts) => run_init(&mirror, opts),
            Command::Push(opts) => run_push(&mirror, opts),
            Command::Pull => run_pull(&mirror),
            Command::Status => run_status(&mirror),
            Command::Remote(opts) => {
                mirror.set_remote(&opts.url)?;
                info!("mirror now syncs with {}", opts.url);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create the mirror, optionally connected to a remote.
    #[command(override_usage = "claude-sync init [options]")]
    Init(InitOptions),

    /// Capture local configuration, commit, and push it.
    #[command(override_usage = "claude-sync push [options]")]
    Push(PushOptions),

    /// Pull remote configuration and install it locally.
    Pull,

    /// Show what is in sync.
    Status,

    /// Connect an existing mirror to a remote.
    #[command(override_usage = "claude-sync remote <url>")]
    Remote(RemoteOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// URL of remote repository to sync with.
    #[arg(short, long, value_name = "url")]
    pub remote: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PushOptions {
    /// Commit message to use instead of the default.
    #[arg(short, long, value_name = "message")]
    pub message: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoteOptions {
    /// URL of remote repository to sync with.
    #[arg(value_name = "url")]
    pub url: String,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:#}");
        if let Some(hint) = error.downcast_ref::<MirrorError>().and_then(MirrorError::hint) {
            error!("hint: {hint}");
        }
        exit(1);
    }

    exit(0)
}

fn run_init(mirror: &Mirror, opts: InitOptions) -> Result<()> {
    let report = mirror.init(opts.remote.as_deref())?;
    if report.joined {
        info!("joined existing remote, run `claude-sync pull` to install its configuration");
        return Ok(());
    }

    log_results(&report.results);
    info!(
        "initialized mirror at {:?} (committed: {}, pushed: {})",
        mirror.layout().mirror_root.display(),
        report.committed,
        report.pushed
    );

    Ok(())
}

fn run_push(mirror: &Mirror, opts: PushOptions) -> Result<()> {
    let report = mirror.push(opts.message.as_deref())?;
    log_results(&report.results);
    match (report.committed, report.pushed) {
        (false, false) => info!("nothing to push"),
        (true, false) => info!("committed locally"),
        (_, true) => info!("pushed"),
    }

    Ok(())
}

fn run_pull(mirror: &Mirror) -> Result<()> {
    let report = mirror.pull()?;
    if report.changed {
        info!(
            "pulled {} insertions, {} deletions",
            report.insertions, report.deletions
        );
    } else {
        info!("already up to date");
    }
    log_results(&report.results);

    Ok(())
}

fn run_status(mirror: &Mirror) -> Result<()> {
    let report = mirror.status()?;
    log_status(mirror, &report);

    Ok(())
}

fn log_results(results: &[SyncResult]) {
    for result in results.iter().filter(|result| result.is_change()) {
        info!("{:>8}  {}", result.action, result.path.display());
    }
}

fn log_status(mirror: &Mirror, report: &StatusReport) {
    if !report.initialized {
        warn!(
            "mirror at {:?} is not initialized",
            mirror.layout().mirror_root.display()
        );
    }

    if let Some(metadata) = &report.metadata {
        let last_sync = metadata
            .last_sync
            .map(|stamp| stamp.to_rfc3339())
            .unwrap_or_else(|| "never".into());
        info!(
            "machine {} ({}), last sync {last_sync}",
            metadata.machine_id, metadata.platform
        );
    } else if report.initialized {
        warn!("mirror metadata is missing or unreadable");
    }

    if let Some(repo) = &report.repo {
        info!(
            "branch {}, remote {}, ahead {}, behind {}",
            repo.branch.as_deref().unwrap_or("(detached)"),
            repo.remote_url.as_deref().unwrap_or("(none)"),
            repo.ahead,
            repo.behind
        );
        for path in &repo.conflicted {
            warn!("conflicted: {path}");
        }
    }

    for comparison in &report.comparisons {
        let state = match (comparison.source_exists, comparison.target_exists) {
            (false, false) => "absent",
            (true, false) => "local only",
            (false, true) => "mirror only",
            (true, true) if comparison.in_sync => "in sync",
            (true, true) => "modified",
        };
        info!("{:>12}  {}", state, comparison.mapping.source);
    }
}
