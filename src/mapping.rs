// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mapping table.
//!
//! Fixed, ordered listing of every path that gets synchronized between the
//! configuration root and the mirror root. All machines sharing a mirror
//! remote must agree on this table. Anything not listed here is never
//! touched on either side.

use std::path::{Path, PathBuf};

/// What sort of filesystem entry a mapping covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// A single plain file.
    File,

    /// A whole directory tree, synchronized recursively.
    Directory,
}

/// One synchronized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mapping {
    /// Name relative to the configuration root.
    pub source: &'static str,

    /// Name relative to the mirror root.
    pub target: &'static str,

    pub kind: MappingKind,
}

impl Mapping {
    const fn file(name: &'static str) -> Self {
        Self {
            source: name,
            target: name,
            kind: MappingKind::File,
        }
    }

    const fn directory(name: &'static str) -> Self {
        Self {
            source: name,
            target: name,
            kind: MappingKind::Directory,
        }
    }

    /// Absolute path of the mapping on the configuration side.
    pub fn source_in(&self, config_root: impl AsRef<Path>) -> PathBuf {
        config_root.as_ref().join(self.source)
    }

    /// Absolute path of the mapping on the mirror side.
    pub fn target_in(&self, mirror_root: impl AsRef<Path>) -> PathBuf {
        mirror_root.as_ref().join(self.target)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == MappingKind::Directory
    }
}

/// Everything that gets synchronized, in the order it is processed.
pub const MAPPINGS: &[Mapping] = &[
    Mapping::file("CLAUDE.md"),
    Mapping::file("settings.json"),
    Mapping::directory("agents"),
    Mapping::directory("commands"),
    Mapping::directory("hooks"),
    Mapping::directory("skills"),
];
