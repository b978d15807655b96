// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directional synchronization.
//!
//! Two complementary procedures move mapped content between the
//! configuration root and the mirror root:
//!
//! - [`adopt`] captures the configuration root into the mirror. The result is
//!   an exact mirror: anything whose source vanished is deleted from the
//!   mirror as well.
//! - [`apply`] installs the mirror into the configuration root. It only ever
//!   creates or overwrites. Local files that the mirror does not know about
//!   are left alone.
//!
//! The two are deliberately asymmetric. The configuration root is shared with
//! Claude itself, so nothing here ever deletes from it.
//!
//! Both procedures walk [`MAPPINGS`] in order and report one [`SyncResult`]
//! per leaf file they touched. Directory mappings expand into their files
//! recursively.

use crate::{
    mapping::{Mapping, MappingKind, MAPPINGS},
    mirror::compare::{probe, CompareError, Fingerprint},
};

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// What happened to a single leaf path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// New file in the configuration root.
    Created,

    /// Existing file overwritten.
    Updated,

    /// File removed from the mirror because its source vanished.
    Deleted,

    /// New file in the mirror.
    Copied,

    /// Nothing to do.
    Skipped,
}

impl Display for SyncAction {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Copied => "copied",
            Self::Skipped => "skipped",
        })
    }
}

/// Outcome of synchronizing one leaf path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Mapping name joined with the leaf's path inside the mapping.
    pub path: PathBuf,
    pub action: SyncAction,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
}

impl SyncResult {
    fn new(
        path: impl Into<PathBuf>,
        action: SyncAction,
        source_path: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            action,
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }

    /// Result changed something on disk.
    pub fn is_change(&self) -> bool {
        self.action != SyncAction::Skipped
    }
}

/// Capture configuration root state into the mirror root.
///
/// For each mapping, in table order:
///
/// - Source absent: delete the mirror copy if there is one.
/// - Directory: replace the mirror tree with a fresh copy of the source
///   tree, reporting leaves that disappeared as [`SyncAction::Deleted`].
/// - File: copy over the mirror copy.
///
/// Leaves whose mirror copy already has identical content are reported as
/// [`SyncAction::Skipped`], so adopting twice in a row changes nothing the
/// second time.
///
/// # Errors
///
/// - Return [`TransferError::KindMismatch`] if a source path is not the kind
///   of entry its mapping declares.
/// - Return [`TransferError`] I/O variants on any filesystem failure.
#[instrument(skip(config_root, mirror_root), level = "debug")]
pub fn adopt(
    config_root: impl AsRef<Path>,
    mirror_root: impl AsRef<Path>,
) -> Result<Vec<SyncResult>> {
    let mut results = Vec::new();
    for mapping in MAPPINGS {
        let source = mapping.source_in(config_root.as_ref());
        let target = mapping.target_in(mirror_root.as_ref());

        if !probe(&source)? {
            results.extend(adopt_removal(mapping, &source, &target)?);
            continue;
        }

        expect_kind(mapping, &source)?;
        match mapping.kind {
            MappingKind::File => results.push(adopt_file(mapping, &source, &target)?),
            MappingKind::Directory => results.extend(adopt_directory(mapping, &source, &target)?),
        }
    }

    log_summary("adopt", &results);
    Ok(results)
}

fn adopt_removal(mapping: &Mapping, source: &Path, target: &Path) -> Result<Vec<SyncResult>> {
    if !probe(target)? {
        return Ok(vec![SyncResult::new(
            mapping.target,
            SyncAction::Skipped,
            source,
            target,
        )]);
    }

    let mut results = Vec::new();
    if target.is_dir() {
        for leaf in leaves(target)? {
            results.push(SyncResult::new(
                Path::new(mapping.target).join(&leaf),
                SyncAction::Deleted,
                source.join(&leaf),
                target.join(&leaf),
            ));
        }
    }

    if results.is_empty() {
        results.push(SyncResult::new(
            mapping.target,
            SyncAction::Deleted,
            source,
            target,
        ));
    }

    debug!("source of {} vanished, delete mirror copy", mapping.target);
    remove_path(target)?;

    Ok(results)
}

fn adopt_file(mapping: &Mapping, source: &Path, target: &Path) -> Result<SyncResult> {
    if target.is_dir() {
        remove_path(target)?;
    }

    let existed = probe(target)?;
    if existed && Fingerprint::of(source)? == Fingerprint::of(target)? {
        return Ok(SyncResult::new(
            mapping.target,
            SyncAction::Skipped,
            source,
            target,
        ));
    }

    copy_file(source, target)?;
    let action = if existed {
        SyncAction::Updated
    } else {
        SyncAction::Copied
    };

    Ok(SyncResult::new(mapping.target, action, source, target))
}

fn adopt_directory(mapping: &Mapping, source: &Path, target: &Path) -> Result<Vec<SyncResult>> {
    // INVARIANT: Remember what the mirror held before wiping it.
    let mut previous = BTreeMap::new();
    if target.is_dir() {
        for leaf in leaves(target)? {
            let fingerprint = Fingerprint::of(target.join(&leaf))?;
            previous.insert(leaf, fingerprint);
        }
    }

    if probe(target)? {
        remove_path(target)?;
    }
    fs::create_dir_all(target).map_err(|err| TransferError::CreateDir {
        source: err,
        path: target.to_path_buf(),
    })?;

    let mut results = Vec::new();
    for leaf in leaves(source)? {
        let from = source.join(&leaf);
        let to = target.join(&leaf);
        copy_file(&from, &to)?;

        let action = match previous.remove(&leaf) {
            Some(before) if before == Fingerprint::of(&from)? => SyncAction::Skipped,
            Some(_) => SyncAction::Updated,
            None => SyncAction::Copied,
        };
        results.push(SyncResult::new(
            Path::new(mapping.target).join(&leaf),
            action,
            from,
            to,
        ));
    }

    // INVARIANT: Whatever is left was not recreated, so it got deleted.
    for leaf in previous.into_keys() {
        results.push(SyncResult::new(
            Path::new(mapping.target).join(&leaf),
            SyncAction::Deleted,
            source.join(&leaf),
            target.join(&leaf),
        ));
    }

    Ok(results)
}

/// Install mirror root state into the configuration root.
///
/// Every leaf present in the mirror is copied over its configuration root
/// counterpart, reported as [`SyncAction::Created`] or
/// [`SyncAction::Updated`]. Mappings missing from the mirror are
/// [`SyncAction::Skipped`].
///
/// Never deletes anything from the configuration root. Local entries that
/// the mirror lacks survive untouched.
///
/// # Errors
///
/// - Return [`TransferError::KindMismatch`] if a mirror path is not the kind
///   of entry its mapping declares.
/// - Return [`TransferError`] I/O variants on any filesystem failure.
#[instrument(skip(mirror_root, config_root), level = "debug")]
pub fn apply(
    mirror_root: impl AsRef<Path>,
    config_root: impl AsRef<Path>,
) -> Result<Vec<SyncResult>> {
    let mut results = Vec::new();
    for mapping in MAPPINGS {
        let source = mapping.target_in(mirror_root.as_ref());
        let target = mapping.source_in(config_root.as_ref());

        if !probe(&source)? {
            results.push(SyncResult::new(
                mapping.source,
                SyncAction::Skipped,
                &source,
                &target,
            ));
            continue;
        }

        expect_kind(mapping, &source)?;
        match mapping.kind {
            MappingKind::File => {
                results.push(install_file(Path::new(mapping.source), &source, &target)?)
            }
            MappingKind::Directory => {
                for leaf in leaves(&source)? {
                    results.push(install_file(
                        &Path::new(mapping.source).join(&leaf),
                        &source.join(&leaf),
                        &target.join(&leaf),
                    )?);
                }
            }
        }
    }

    log_summary("apply", &results);
    Ok(results)
}

fn install_file(name: &Path, source: &Path, target: &Path) -> Result<SyncResult> {
    if target.is_dir() {
        remove_path(target)?;
    }

    let action = if probe(target)? {
        SyncAction::Updated
    } else {
        SyncAction::Created
    };
    copy_file(source, target)?;

    Ok(SyncResult::new(name, action, source, target))
}

fn expect_kind(mapping: &Mapping, path: &Path) -> Result<()> {
    let is_dir = path.is_dir();
    if is_dir != mapping.is_directory() {
        return Err(TransferError::KindMismatch {
            path: path.to_path_buf(),
            expected: mapping.kind,
        });
    }

    Ok(())
}

/// List every regular file below root as paths relative to root.
fn leaves(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|err| TransferError::Walk {
            source: err,
            path: root.to_path_buf(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        // INVARIANT: Walk entries always live under the walk root.
        if let Ok(relative) = entry.path().strip_prefix(root) {
            paths.push(relative.to_path_buf());
        }
    }

    Ok(paths)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| TransferError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    fs::copy(from, to).map_err(|err| TransferError::Copy {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })?;

    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let is_real_dir = fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    let result = if is_real_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| TransferError::Remove {
        source: err,
        path: path.to_path_buf(),
    })
}

fn log_summary(operation: &str, results: &[SyncResult]) {
    let changed = results.iter().filter(|result| result.is_change()).count();
    info!("{operation}: {changed} changed, {} unchanged", results.len() - changed);
    for result in results.iter().filter(|result| result.is_change()) {
        debug!("{operation}: {} {}", result.action, result.path.display());
    }
}

/// Directional sync error types.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Fingerprinting or existence check fails.
    #[error(transparent)]
    Compare(#[from] CompareError),

    /// Path on disk is not the kind of entry its mapping declares.
    #[error("expected {:?} to be a {expected:?} entry", path.display())]
    KindMismatch { path: PathBuf, expected: MappingKind },

    /// Directory tree cannot be walked.
    #[error("failed to walk directory tree at {:?}", path.display())]
    Walk {
        #[source]
        source: walkdir::Error,
        path: PathBuf,
    },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Path cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::compare::compare;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn seed_config() -> anyhow::Result<()> {
        fs::create_dir_all("config/hooks")?;
        fs::write("config/CLAUDE.md", "A")?;
        fs::write("config/settings.json", r#"{"x":1}"#)?;
        fs::write("config/hooks/run.sh", "#!/bin/sh")?;
        Ok(())
    }

    fn action_of(results: &[SyncResult], path: &str) -> SyncAction {
        results
            .iter()
            .find(|result| result.path == Path::new(path))
            .map(|result| result.action)
            .unwrap()
    }

    fn changes(results: &[SyncResult]) -> Vec<(String, SyncAction)> {
        results
            .iter()
            .filter(|result| result.is_change())
            .map(|result| (result.path.display().to_string(), result.action))
            .collect()
    }

    #[sealed_test]
    fn adopt_copies_mapped_entries() -> anyhow::Result<()> {
        seed_config()?;
        fs::write("config/history.jsonl", "not mapped")?;

        let results = adopt("config", "mirror")?;
        let expect = vec![
            ("CLAUDE.md".to_string(), SyncAction::Copied),
            ("settings.json".to_string(), SyncAction::Copied),
            ("hooks/run.sh".to_string(), SyncAction::Copied),
        ];
        assert_eq!(changes(&results), expect);

        assert_eq!(fs::read_to_string("mirror/CLAUDE.md")?, "A");
        assert_eq!(fs::read_to_string("mirror/settings.json")?, r#"{"x":1}"#);
        assert_eq!(fs::read_to_string("mirror/hooks/run.sh")?, "#!/bin/sh");
        assert!(!Path::new("mirror/history.jsonl").exists());

        Ok(())
    }

    #[sealed_test]
    fn adopt_propagates_edits() -> anyhow::Result<()> {
        seed_config()?;
        adopt("config", "mirror")?;

        fs::write("config/CLAUDE.md", "B")?;
        let status = compare("config", "mirror")?;
        assert!(!status[0].in_sync);

        let results = adopt("config", "mirror")?;
        assert_eq!(action_of(&results, "CLAUDE.md"), SyncAction::Updated);
        assert_eq!(fs::read_to_string("mirror/CLAUDE.md")?, "B");
        assert!(compare("config", "mirror")?.iter().all(|c| c.in_sync));

        Ok(())
    }

    #[sealed_test]
    fn adopt_twice_changes_nothing() -> anyhow::Result<()> {
        seed_config()?;
        adopt("config", "mirror")?;

        let results = adopt("config", "mirror")?;
        assert!(results.iter().all(|result| result.action == SyncAction::Skipped));
        assert_eq!(fs::read_to_string("mirror/hooks/run.sh")?, "#!/bin/sh");

        Ok(())
    }

    #[sealed_test]
    fn adopt_deletes_vanished_leaf() -> anyhow::Result<()> {
        seed_config()?;
        adopt("config", "mirror")?;

        fs::remove_file("config/hooks/run.sh")?;
        let results = adopt("config", "mirror")?;
        assert_eq!(action_of(&results, "hooks/run.sh"), SyncAction::Deleted);
        assert!(!Path::new("mirror/hooks/run.sh").exists());
        assert!(Path::new("mirror/hooks").is_dir());

        Ok(())
    }

    #[sealed_test]
    fn adopt_deletes_vanished_mappings() -> anyhow::Result<()> {
        seed_config()?;
        fs::create_dir_all("config/agents/nested")?;
        fs::write("config/agents/nested/a.md", "a")?;
        fs::write("config/agents/b.md", "b")?;
        adopt("config", "mirror")?;

        fs::remove_file("config/settings.json")?;
        fs::remove_dir_all("config/agents")?;
        let results = adopt("config", "mirror")?;

        let expect = vec![
            ("settings.json".to_string(), SyncAction::Deleted),
            ("agents/b.md".to_string(), SyncAction::Deleted),
            ("agents/nested/a.md".to_string(), SyncAction::Deleted),
        ];
        assert_eq!(changes(&results), expect);
        assert!(!Path::new("mirror/settings.json").exists());
        assert!(!Path::new("mirror/agents").exists());

        Ok(())
    }

    #[sealed_test]
    fn adopt_clears_shrunk_directory() -> anyhow::Result<()> {
        fs::create_dir_all("config/commands/old")?;
        fs::write("config/commands/old/x.md", "x")?;
        fs::write("config/commands/keep.md", "keep")?;
        adopt("config", "mirror")?;

        fs::remove_dir_all("config/commands/old")?;
        fs::write("config/commands/keep.md", "kept")?;
        fs::write("config/commands/new.md", "new")?;
        let results = adopt("config", "mirror")?;

        let expect = vec![
            ("commands/keep.md".to_string(), SyncAction::Updated),
            ("commands/new.md".to_string(), SyncAction::Copied),
            ("commands/old/x.md".to_string(), SyncAction::Deleted),
        ];
        assert_eq!(changes(&results), expect);
        assert!(!Path::new("mirror/commands/old").exists());

        Ok(())
    }

    #[sealed_test]
    fn adopt_rejects_kind_mismatch() -> anyhow::Result<()> {
        fs::create_dir_all("config")?;
        fs::write("config/hooks", "i should be a directory")?;

        let result = adopt("config", "mirror");
        assert!(matches!(result, Err(TransferError::KindMismatch { .. })));

        Ok(())
    }

    #[sealed_test]
    fn apply_installs_mirror_content() -> anyhow::Result<()> {
        fs::create_dir_all("mirror/hooks")?;
        fs::create_dir_all("config")?;
        fs::write("mirror/CLAUDE.md", "remote")?;
        fs::write("mirror/hooks/run.sh", "#!/bin/sh")?;
        fs::write("config/CLAUDE.md", "local")?;

        let results = apply("mirror", "config")?;
        let expect = vec![
            ("CLAUDE.md".to_string(), SyncAction::Updated),
            ("hooks/run.sh".to_string(), SyncAction::Created),
        ];
        assert_eq!(changes(&results), expect);
        assert_eq!(action_of(&results, "settings.json"), SyncAction::Skipped);
        assert_eq!(fs::read_to_string("config/CLAUDE.md")?, "remote");
        assert_eq!(fs::read_to_string("config/hooks/run.sh")?, "#!/bin/sh");

        Ok(())
    }

    // Apply is additive only. Unlike adopt, it never deletes local entries
    // that the mirror lacks.
    #[sealed_test]
    fn apply_never_deletes_local_entries() -> anyhow::Result<()> {
        fs::create_dir_all("mirror/hooks")?;
        fs::create_dir_all("config/hooks")?;
        fs::write("mirror/hooks/run.sh", "#!/bin/sh")?;
        fs::write("config/hooks/local.sh", "mine")?;
        fs::write("config/settings.json", "{}")?;

        let results = apply("mirror", "config")?;
        assert_eq!(action_of(&results, "settings.json"), SyncAction::Skipped);
        assert_eq!(fs::read_to_string("config/settings.json")?, "{}");
        assert_eq!(fs::read_to_string("config/hooks/local.sh")?, "mine");
        assert_eq!(fs::read_to_string("config/hooks/run.sh")?, "#!/bin/sh");

        Ok(())
    }

    #[sealed_test]
    fn adopt_then_apply_round_trips() -> anyhow::Result<()> {
        seed_config()?;
        fs::create_dir_all("config/skills/deep/er")?;
        fs::write("config/skills/deep/er/SKILL.md", "skill")?;
        fs::write("config/skills/bin.dat", [0u8, 159, 146, 150])?;
        adopt("config", "mirror")?;

        apply("mirror", "fresh")?;
        for path in [
            "CLAUDE.md",
            "settings.json",
            "hooks/run.sh",
            "skills/deep/er/SKILL.md",
            "skills/bin.dat",
        ] {
            assert_eq!(
                fs::read(Path::new("fresh").join(path))?,
                fs::read(Path::new("config").join(path))?
            );
        }

        Ok(())
    }

    #[cfg(unix)]
    #[sealed_test]
    fn adopt_keeps_executable_bit() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        seed_config()?;
        fs::set_permissions("config/hooks/run.sh", fs::Permissions::from_mode(0o755))?;
        adopt("config", "mirror")?;

        let mode = fs::metadata("mirror/hooks/run.sh")?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        Ok(())
    }
}
