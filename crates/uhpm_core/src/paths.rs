//! Filesystem layout of a UHPM installation.
//!
//! # Responsibility
//! - Resolve every directory and file UHPM owns from a single base directory.
//!
//! # Invariants
//! - All returned paths live under `base_dir()`.
//! - `create_directories()` is idempotent.

use std::path::{Path, PathBuf};

/// Environment variable overriding the base directory.
pub const UHPM_HOME_ENV: &str = "UHPM_HOME";
const DEFAULT_BASE_DIR_NAME: &str = ".uhpm";

/// Resolves UHPM directories.
pub trait UhpmPaths {
    fn base_dir(&self) -> &Path;

    fn packages_dir(&self) -> PathBuf {
        self.base_dir().join("packages")
    }

    fn db_path(&self) -> PathBuf {
        self.base_dir().join("packages.db")
    }

    fn config_path(&self) -> PathBuf {
        self.base_dir().join("config.toml")
    }

    fn cache_dir(&self) -> PathBuf {
        self.base_dir().join("cache")
    }

    fn temp_dir(&self) -> PathBuf {
        self.base_dir().join("tmp")
    }

    fn log_dir(&self) -> PathBuf {
        self.base_dir().join("logs")
    }

    /// Directory of one installed package release.
    fn package_dir(&self, name: &str, version: &semver::Version) -> PathBuf {
        self.packages_dir().join(format!("{name}@{version}"))
    }

    fn create_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.base_dir().to_path_buf(),
            self.packages_dir(),
            self.cache_dir(),
            self.temp_dir(),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Paths rooted at `$UHPM_HOME` or `~/.uhpm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomePaths {
    base: PathBuf,
}

impl HomePaths {
    /// Resolves the base directory from the environment.
    ///
    /// Returns `None` when neither `UHPM_HOME` nor a home directory is known.
    pub fn from_env() -> Option<Self> {
        if let Some(value) = std::env::var_os(UHPM_HOME_ENV) {
            if !value.is_empty() {
                return Some(Self::at(PathBuf::from(value)));
            }
        }
        dirs::home_dir().map(|home| Self::at(home.join(DEFAULT_BASE_DIR_NAME)))
    }

    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl UhpmPaths for HomePaths {
    fn base_dir(&self) -> &Path {
        &self.base
    }
}

/// Directory relative symlink targets resolve against.
pub fn default_link_root() -> Option<PathBuf> {
    dirs::home_dir()
}

#[cfg(test)]
mod tests {
    use super::{HomePaths, UhpmPaths};
    use semver::Version;

    #[test]
    fn layout_is_rooted_at_base() {
        let paths = HomePaths::at("/opt/uhpm");
        assert_eq!(paths.packages_dir(), std::path::Path::new("/opt/uhpm/packages"));
        assert_eq!(paths.db_path(), std::path::Path::new("/opt/uhpm/packages.db"));
        assert_eq!(paths.config_path(), std::path::Path::new("/opt/uhpm/config.toml"));
        assert_eq!(
            paths.package_dir("tool", &Version::new(1, 2, 3)),
            std::path::Path::new("/opt/uhpm/packages/tool@1.2.3")
        );
    }

    #[test]
    fn create_directories_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = HomePaths::at(dir.path().join("home"));
        paths.create_directories().unwrap();
        paths.create_directories().unwrap();
        assert!(paths.cache_dir().is_dir());
        assert!(paths.log_dir().is_dir());
        assert!(paths.temp_dir().is_dir());
    }
}
