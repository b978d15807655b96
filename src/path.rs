// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the user's Claude configuration lives, and where its
//! mirror repository should be kept. Every function here is a pure function
//! of an [`Environment`], so callers can resolve paths repeatedly without
//! touching process state.
//!
//! # Configuration Root Discovery
//!
//! The primary location is `$HOME/.claude`. If that directory does not exist,
//! then `$XDG_CONFIG_HOME/claude` is tried, with the base defaulting to
//! `$HOME/.config`. If neither exists, the primary location is returned so the
//! caller can create it.

use serde::{Deserialize, Serialize};
use std::{
    env,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
};

/// Primary configuration directory name under the user's home directory.
pub const PRIMARY_CONFIG_DIR: &str = ".claude";

/// Configuration directory name under the XDG-style base directory.
pub const ALTERNATE_CONFIG_DIR: &str = "claude";

/// Directory name of the mirror repository inside the configuration root.
pub const MIRROR_DIR: &str = "sync-repo";

/// Snapshot of the process environment the resolver depends on.
///
/// Build one with [`Environment::from_process`] in binaries, or construct it
/// directly in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Absolute path to the user's home directory.
    pub home: PathBuf,

    /// Value of `XDG_CONFIG_HOME`, if set and non-empty.
    pub xdg_config_home: Option<PathBuf>,

    /// Host name of this machine.
    pub hostname: String,

    /// Operating system name as reported by [`std::env::consts::OS`].
    pub os: String,
}

impl Environment {
    /// Capture the current process environment.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::NoWayHome`] if home directory path cannot be
    ///   determined.
    pub fn from_process() -> Result<Self> {
        let home = dirs::home_dir().ok_or(PathError::NoWayHome)?;
        let xdg_config_home = env::var_os("XDG_CONFIG_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            home,
            xdg_config_home,
            hostname: hostname(),
            os: env::consts::OS.to_string(),
        })
    }

    /// Base directory for the alternate configuration root.
    pub fn config_base(&self) -> PathBuf {
        self.xdg_config_home
            .clone()
            .unwrap_or_else(|| self.home.join(".config"))
    }
}

fn hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .chain(fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".into())
}

/// Determine absolute path to the configuration root.
///
/// Does not create anything. May return a path that does not exist yet.
pub fn resolve_config_root(env: &Environment) -> PathBuf {
    let primary = env.home.join(PRIMARY_CONFIG_DIR);
    if primary.is_dir() {
        return primary;
    }

    let alternate = env.config_base().join(ALTERNATE_CONFIG_DIR);
    if alternate.is_dir() {
        return alternate;
    }

    primary
}

/// Determine absolute path to the mirror root.
pub fn resolve_mirror_root(env: &Environment) -> PathBuf {
    resolve_config_root(env).join(MIRROR_DIR)
}

/// Determine which supported platform the environment describes.
///
/// # Errors
///
/// - Return [`PathError::UnsupportedPlatform`] for anything besides Linux and
///   macOS.
pub fn resolve_platform(env: &Environment) -> Result<Platform> {
    match env.os.as_str() {
        "linux" => Ok(Platform::Linux),
        "macos" => Ok(Platform::MacOs),
        other => Err(PathError::UnsupportedPlatform(other.to_string())),
    }
}

/// Platforms whose configuration layout is understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Resolved pair of roots that every sync operation works between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub config_root: PathBuf,
    pub mirror_root: PathBuf,
}

impl Layout {
    /// Construct layout from explicit roots.
    pub fn new(config_root: impl Into<PathBuf>, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            mirror_root: mirror_root.into(),
        }
    }

    /// Construct layout whose mirror lives at its default place inside a
    /// given configuration root.
    pub fn with_config_root(config_root: impl AsRef<Path>) -> Self {
        let config_root = config_root.as_ref();
        Self::new(config_root, config_root.join(MIRROR_DIR))
    }

    /// Resolve layout from environment.
    pub fn resolve(env: &Environment) -> Self {
        Self::with_config_root(resolve_config_root(env))
    }
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Operating system is neither Linux nor macOS.
    #[error("unsupported platform {0:?}, only linux and macos are supported")]
    UnsupportedPlatform(String),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn fake_env(os: &str) -> anyhow::Result<Environment> {
        let cwd = env::current_dir()?;
        Ok(Environment {
            home: cwd.join("home"),
            xdg_config_home: None,
            hostname: "box".into(),
            os: os.into(),
        })
    }

    #[sealed_test]
    fn config_root_prefers_primary() -> anyhow::Result<()> {
        let mut env = fake_env("linux")?;
        env.xdg_config_home = Some(env.home.join("xdg"));
        fs::create_dir_all(env.home.join(".claude"))?;
        fs::create_dir_all(env.home.join("xdg/claude"))?;

        assert_eq!(resolve_config_root(&env), env.home.join(".claude"));
        assert_eq!(
            resolve_mirror_root(&env),
            env.home.join(".claude").join(MIRROR_DIR)
        );

        Ok(())
    }

    #[sealed_test]
    fn config_root_uses_alternate_when_primary_missing() -> anyhow::Result<()> {
        let mut env = fake_env("linux")?;
        env.xdg_config_home = Some(env.home.join("xdg"));
        fs::create_dir_all(env.home.join("xdg/claude"))?;

        assert_eq!(resolve_config_root(&env), env.home.join("xdg/claude"));

        Ok(())
    }

    #[sealed_test]
    fn config_root_alternate_defaults_to_dot_config() -> anyhow::Result<()> {
        let env = fake_env("macos")?;
        fs::create_dir_all(env.home.join(".config/claude"))?;

        assert_eq!(resolve_config_root(&env), env.home.join(".config/claude"));

        Ok(())
    }

    #[sealed_test]
    fn config_root_falls_back_to_primary() -> anyhow::Result<()> {
        let env = fake_env("linux")?;

        assert_eq!(resolve_config_root(&env), env.home.join(".claude"));
        assert_eq!(resolve_config_root(&env), resolve_config_root(&env));

        Ok(())
    }

    #[test_case("linux", Some(Platform::Linux); "linux")]
    #[test_case("macos", Some(Platform::MacOs); "macos")]
    #[test_case("windows", None; "windows")]
    #[test_case("freebsd", None; "freebsd")]
    #[test]
    fn platform_resolution(os: &str, expect: Option<Platform>) {
        let env = Environment {
            home: PathBuf::from("/home/blah"),
            xdg_config_home: None,
            hostname: "box".into(),
            os: os.into(),
        };

        pretty_assertions::assert_eq!(resolve_platform(&env).ok(), expect);
    }

    #[sealed_test(env = [("XDG_CONFIG_HOME", "/tmp/blah-xdg")])]
    fn from_process_reads_override() -> anyhow::Result<()> {
        let env = Environment::from_process()?;
        assert_eq!(env.xdg_config_home, Some(PathBuf::from("/tmp/blah-xdg")));
        assert!(!env.hostname.is_empty());

        Ok(())
    }
}
