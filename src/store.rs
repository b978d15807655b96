// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Metadata store.
//!
//! Every mirror keeps a small [`Metadata`] record at its top-level in a file
//! named "metadata.toml". The record is machine-local: the mirror's
//! exclude file lists it, so it never travels to the remote.
//!
//! Corrupt or missing metadata is not an error. Reading simply yields nothing,
//! and callers treat the mirror's sync history as unknown.

use crate::config::{ConfigError, Metadata};

use chrono::{DateTime, Utc};
use std::{
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// File name of the metadata record inside the mirror root.
pub const METADATA_FILE: &str = "metadata.toml";

/// Read and write the metadata record of a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Construct store for mirror root.
    pub fn new(mirror_root: impl AsRef<Path>) -> Self {
        Self {
            path: mirror_root.as_ref().join(METADATA_FILE),
        }
    }

    /// Absolute path to the metadata file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read current metadata record.
    ///
    /// Returns `None` if the file is missing, unreadable, or does not parse.
    pub fn read(&self) -> Option<Metadata> {
        let content = match read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no metadata at {:?}", self.path.display());
                return None;
            }
            Err(err) => {
                warn!("cannot read metadata at {:?}: {err}", self.path.display());
                return None;
            }
        };

        match content.parse() {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!("ignoring corrupt metadata at {:?}: {err}", self.path.display());
                None
            }
        }
    }

    /// Overwrite metadata record.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Serialize`] if the record cannot be serialized.
    /// - Return [`StoreError::Write`] if the file cannot be written.
    pub fn write(&self, metadata: &Metadata) -> Result<()> {
        let content = toml::ser::to_string_pretty(metadata)
            .map_err(|err| StoreError::Serialize(ConfigError::Serialize(err)))?;
        write(&self.path, content).map_err(|err| StoreError::Write {
            source: err,
            path: self.path.clone(),
        })
    }

    /// Stamp current time as the last sync.
    ///
    /// Does nothing if there is no record yet.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError`] if the updated record cannot be written.
    pub fn touch_last_sync(&self) -> Result<()> {
        self.touch_last_sync_at(Utc::now())
    }

    /// Stamp given time as the last sync.
    ///
    /// Does nothing if there is no record yet.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError`] if the updated record cannot be written.
    pub fn touch_last_sync_at(&self, timestamp: DateTime<Utc>) -> Result<()> {
        let Some(mut metadata) = self.read() else {
            debug!("no metadata to stamp at {:?}", self.path.display());
            return Ok(());
        };

        metadata.last_sync = Some(timestamp);
        self.write(&metadata)
    }
}

/// Metadata store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Metadata record cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] ConfigError),

    /// Metadata file cannot be written to.
    #[error("failed to write metadata to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Platform;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    fn sample() -> Metadata {
        Metadata {
            schema_version: 1,
            last_sync: None,
            machine_id: "0123456789abcdef".into(),
            platform: Platform::Linux,
            config_path: PathBuf::from("/home/blah/.claude"),
        }
    }

    #[sealed_test]
    fn write_then_read() -> anyhow::Result<()> {
        let store = MetadataStore::new(".");
        store.write(&sample())?;

        assert_eq!(store.read(), Some(sample()));

        Ok(())
    }

    #[sealed_test]
    fn read_missing_or_corrupt_is_none() -> anyhow::Result<()> {
        let store = MetadataStore::new(".");
        assert_eq!(store.read(), None);

        fs::write(store.path(), "this is { not toml")?;
        assert_eq!(store.read(), None);

        Ok(())
    }

    #[sealed_test]
    fn touch_only_changes_timestamp() -> anyhow::Result<()> {
        let store = MetadataStore::new(".");
        store.write(&sample())?;

        let stamp = Utc.with_ymd_and_hms(2025, 6, 7, 8, 9, 10).unwrap();
        store.touch_last_sync_at(stamp)?;

        let mut expect = sample();
        expect.last_sync = Some(stamp);
        assert_eq!(store.read(), Some(expect));

        store.touch_last_sync()?;
        let result = store.read().unwrap();
        assert!(result.last_sync.unwrap() > stamp);
        assert_eq!(Metadata { last_sync: None, ..result }, sample());

        Ok(())
    }

    #[sealed_test]
    fn touch_without_record_is_noop() -> anyhow::Result<()> {
        let store = MetadataStore::new(".");
        store.touch_last_sync()?;

        assert!(!store.path().exists());

        Ok(())
    }
}
