// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{MachineFixture, RemoteFixture};

use anyhow::Result;
use claude_sync::{MirrorError, SyncAction};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;

#[sealed_test]
fn second_machine_joins_and_pulls() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "# be terse\n")?;
    laptop.write("settings.json", "{\"model\": \"opus\"}\n")?;
    laptop.write("agents/reviewer.md", "review things\n")?;

    let report = laptop.mirror().init(Some(&remote.url()))?;
    assert!(!report.joined);
    assert!(report.committed);
    assert!(report.pushed);
    assert_eq!(remote.commit_count()?, 1);

    let desktop = MachineFixture::new("desktop")?;
    desktop.write("CLAUDE.md", "# stale\n")?;
    let report = desktop.mirror().init(Some(&remote.url()))?;
    assert!(report.joined);
    assert!(report.results.is_empty());
    assert_eq!(remote.commit_count()?, 1);

    let report = desktop.mirror().pull()?;
    assert!(!report.changed);
    assert_eq!(desktop.read("CLAUDE.md")?, "# be terse\n");
    assert_eq!(desktop.read("settings.json")?, "{\"model\": \"opus\"}\n");
    assert_eq!(desktop.read("agents/reviewer.md")?, "review things\n");

    let status = desktop.mirror().status()?;
    assert!(status.initialized);
    assert!(status.is_synced());
    assert!(status.metadata.is_some_and(|metadata| metadata.last_sync.is_some()));

    Ok(())
}

#[sealed_test]
fn last_writer_wins_across_machines() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "from laptop\n")?;
    laptop.mirror().init(Some(&remote.url()))?;

    let desktop = MachineFixture::new("desktop")?;
    desktop.mirror().init(Some(&remote.url()))?;
    desktop.mirror().pull()?;

    desktop.write("CLAUDE.md", "from desktop\n")?;
    desktop.write("commands/deploy.md", "ship it\n")?;
    let report = desktop.mirror().push(Some("desktop edits"))?;
    assert!(report.committed);
    assert!(report.pushed);
    assert_eq!(remote.commit_count()?, 2);

    let report = laptop.mirror().pull()?;
    assert!(report.changed);
    assert!(report.insertions > 0);
    assert_eq!(laptop.read("CLAUDE.md")?, "from desktop\n");
    assert_eq!(laptop.read("commands/deploy.md")?, "ship it\n");

    Ok(())
}

#[sealed_test]
fn push_without_changes_commits_nothing() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "unchanged\n")?;
    laptop.mirror().init(Some(&remote.url()))?;

    let report = laptop.mirror().push(None)?;
    assert!(!report.committed);
    assert!(!report.pushed);
    assert!(report
        .results
        .iter()
        .all(|result| result.action == SyncAction::Skipped));
    assert_eq!(remote.commit_count()?, 1);

    Ok(())
}

#[sealed_test]
fn deletions_reach_remote_but_not_other_config_roots() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("skills/old.md", "retired\n")?;
    laptop.write("skills/new.md", "current\n")?;
    laptop.mirror().init(Some(&remote.url()))?;

    let desktop = MachineFixture::new("desktop")?;
    desktop.mirror().init(Some(&remote.url()))?;
    desktop.mirror().pull()?;
    assert!(desktop.has("skills/old.md"));

    laptop.remove("skills/old.md")?;
    let report = laptop.mirror().push(None)?;
    assert!(report.pushed);
    assert!(report
        .results
        .iter()
        .any(|result| result.action == SyncAction::Deleted));

    desktop.mirror().pull()?;
    assert!(!desktop.mirror_has("skills/old.md"));
    assert!(desktop.has("skills/old.md"));
    assert_eq!(desktop.read("skills/new.md")?, "current\n");

    Ok(())
}

#[sealed_test]
fn local_only_mirror() -> Result<()> {
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "offline\n")?;

    let report = laptop.mirror().init(None)?;
    assert!(!report.joined);
    assert!(report.committed);
    assert!(!report.pushed);

    let result = laptop.mirror().init(None);
    assert!(matches!(result, Err(MirrorError::AlreadyInitialized { .. })));

    laptop.write("CLAUDE.md", "still offline\n")?;
    let report = laptop.mirror().push(None)?;
    assert!(report.committed);
    assert!(!report.pushed);

    let result = laptop.mirror().pull();
    assert!(matches!(result, Err(MirrorError::NoRemoteConfigured)));

    Ok(())
}

#[sealed_test]
fn local_only_mirror_can_gain_remote() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "was offline\n")?;
    laptop.mirror().init(None)?;

    laptop.mirror().set_remote(&remote.url())?;
    laptop.write("CLAUDE.md", "now online\n")?;
    let report = laptop.mirror().push(None)?;
    assert!(report.pushed);
    assert_eq!(remote.commit_count()?, 2);

    Ok(())
}

#[sealed_test]
fn unreachable_remote_fails_init() -> Result<()> {
    let laptop = MachineFixture::new("laptop")?;
    let result = laptop.mirror().init(Some("/definitely/not/a/remote.git"));
    assert!(matches!(
        result,
        Err(MirrorError::NetworkOrAccessFailure { .. })
    ));
    assert!(!laptop.mirror_has(".git"));

    Ok(())
}

#[sealed_test]
fn diverged_machine_takes_remote_state_on_pull() -> Result<()> {
    let remote = RemoteFixture::new("remote.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "shared\n")?;
    laptop.mirror().init(Some(&remote.url()))?;

    let desktop = MachineFixture::new("desktop")?;
    desktop.mirror().init(Some(&remote.url()))?;
    desktop.mirror().pull()?;

    laptop.write("CLAUDE.md", "laptop\n")?;
    desktop.write("CLAUDE.md", "desktop\n")?;
    desktop.mirror().push(None)?;

    let result = laptop.mirror().push(None);
    assert!(matches!(
        result,
        Err(MirrorError::NetworkOrAccessFailure { .. })
    ));

    let report = laptop.mirror().pull()?;
    assert!(report.changed);
    assert_eq!(laptop.read("CLAUDE.md")?, "desktop\n");
    assert!(laptop.mirror().status()?.is_synced());

    let report = laptop.mirror().pull()?;
    assert!(!report.changed);

    laptop.write("CLAUDE.md", "laptop again\n")?;
    let report = laptop.mirror().push(None)?;
    assert!(report.pushed);
    assert_eq!(remote.commit_count()?, 3);

    desktop.mirror().pull()?;
    assert_eq!(desktop.read("CLAUDE.md")?, "laptop again\n");

    Ok(())
}

#[sealed_test]
fn set_remote_replaces_existing_remote() -> Result<()> {
    let old = RemoteFixture::new("old.git")?;
    let new = RemoteFixture::new("new.git")?;
    let laptop = MachineFixture::new("laptop")?;
    laptop.write("CLAUDE.md", "moving\n")?;
    laptop.mirror().init(Some(&old.url()))?;

    laptop.mirror().set_remote(&new.url())?;
    let status = laptop.mirror().status()?;
    assert_eq!(
        status.repo.and_then(|repo| repo.remote_url),
        Some(new.url())
    );

    Ok(())
}
