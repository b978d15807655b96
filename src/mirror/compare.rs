// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Sync status comparison.
//!
//! Decide whether each mapping is in sync between the configuration root and
//! the mirror root. Files are compared by content fingerprint, never by
//! modification time, so clock skew between machines cannot produce false
//! differences.
//!
//! # Directory Mappings
//!
//! Directory mappings are only checked for existence. When both sides exist
//! the mapping is reported as in sync regardless of what the trees contain.
//! Status reporting relies on this coarse signal, so do not treat it as a
//! guarantee that directory contents match.

use crate::mapping::{Mapping, MappingKind, MAPPINGS};

use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Content digest of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint file content at target path.
    ///
    /// # Errors
    ///
    /// - Return [`CompareError::Read`] if the file cannot be opened or read.
    pub fn of(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let read_error = |source| CompareError::Read {
            source,
            path: path.to_path_buf(),
        };

        let mut file = File::open(path).map_err(read_error)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(read_error)?;

        Ok(Self(hasher.finalize().into()))
    }

    /// Fingerprint in-memory content.
    #[cfg(test)]
    fn of_bytes(data: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(data.as_ref()).into())
    }
}

/// Sync status of one mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub mapping: Mapping,
    pub source_exists: bool,
    pub target_exists: bool,
    pub in_sync: bool,
}

/// Compare every mapping between configuration root and mirror root.
///
/// Results keep the order of [`MAPPINGS`]. Missing paths are a valid state
/// and never an error.
///
/// # Errors
///
/// - Return [`CompareError::Probe`] if existence of a path cannot be checked.
/// - Return [`CompareError::Read`] if an existing file cannot be read.
#[instrument(skip(config_root, mirror_root), level = "debug")]
pub fn compare(
    config_root: impl AsRef<Path>,
    mirror_root: impl AsRef<Path>,
) -> Result<Vec<Comparison>> {
    MAPPINGS
        .iter()
        .map(|mapping| compare_mapping(mapping, config_root.as_ref(), mirror_root.as_ref()))
        .collect()
}

fn compare_mapping(mapping: &Mapping, config_root: &Path, mirror_root: &Path) -> Result<Comparison> {
    let source = mapping.source_in(config_root);
    let target = mapping.target_in(mirror_root);
    let source_exists = probe(&source)?;
    let target_exists = probe(&target)?;

    let in_sync = match (source_exists, target_exists) {
        (false, false) => true,
        (true, false) | (false, true) => false,
        (true, true) => match mapping.kind {
            MappingKind::File => Fingerprint::of(&source)? == Fingerprint::of(&target)?,
            MappingKind::Directory => true,
        },
    };
    debug!("{} in sync: {in_sync}", mapping.source);

    Ok(Comparison {
        mapping: *mapping,
        source_exists,
        target_exists,
        in_sync,
    })
}

/// Check that path exists, distinguishing absence from failure to look.
pub(crate) fn probe(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|source| CompareError::Probe {
        source,
        path: path.to_path_buf(),
    })
}

/// Comparison error types.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// Existence of path cannot be determined.
    #[error("failed to check existence of {:?}", path.display())]
    Probe {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Existing file cannot be read for fingerprinting.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = CompareError> = std::result::Result<T, E>;
