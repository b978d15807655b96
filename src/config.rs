// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Metadata layout.
//!
//! Specify the layout of the metadata record kept at the top of every mirror
//! to simplify the process of serialization and deserialization. File I/O is
//! left to [`crate::store`].

use crate::path::{resolve_platform, Environment, PathError, Platform};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Current metadata schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Mirror metadata layout.
///
/// Created once when a mirror is initialized. Only `last_sync` changes
/// afterwards, every time a push or pull succeeds. Fields this version does
/// not know about are ignored when parsing, so newer records stay readable.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Metadata {
    /// Layout version of this record.
    pub schema_version: u32,

    /// Time of the last successful push or pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    /// Stable identifier of the machine that owns this mirror.
    pub machine_id: String,

    /// Platform of the machine that owns this mirror.
    pub platform: Platform,

    /// Configuration root this mirror was created for.
    pub config_path: PathBuf,
}

impl Metadata {
    /// Construct fresh metadata for a configuration root.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Platform`] if the environment does not describe
    ///   a supported platform.
    pub fn create(config_path: impl Into<PathBuf>, env: &Environment) -> Result<Self> {
        let platform = resolve_platform(env)?;
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            last_sync: None,
            machine_id: machine_id(&env.hostname, platform),
            platform,
            config_path: config_path.into(),
        })
    }
}

impl FromStr for Metadata {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Metadata {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Derive machine identifier from host name and platform.
///
/// Same inputs always give the same identifier.
pub fn machine_id(hostname: &str, platform: Platform) -> String {
    let digest = Sha256::digest(format!("{hostname}:{platform}").as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize metadata.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize metadata.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Platform cannot be determined.
    #[error(transparent)]
    Platform(#[from] PathError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
