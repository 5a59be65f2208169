//! Installation entity: what one installed package placed on disk.
//!
//! # Invariants
//! - One installation per installed `PackageId`.
//! - `symlinks` and `installed_files` describe the user-visible side of an
//!   active installation; the package directory itself is not listed.

use crate::config::InstallMode;
use crate::model::file_metadata::FileMetadata;
use crate::model::package::PackageId;
use crate::model::symlink::Symlink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstallationId(Uuid);

impl InstallationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for InstallationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for InstallationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InstallationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub id: InstallationId,
    pub package_id: PackageId,
    pub install_mode: InstallMode,
    pub installed_files: BTreeMap<PathBuf, FileMetadata>,
    pub symlinks: Vec<Symlink>,
    pub installed_at: DateTime<Utc>,
    pub active: bool,
}

impl Installation {
    pub fn new(package_id: PackageId, install_mode: InstallMode) -> Self {
        Self {
            id: InstallationId::new(),
            package_id,
            install_mode,
            installed_files: BTreeMap::new(),
            symlinks: Vec::new(),
            installed_at: Utc::now(),
            active: false,
        }
    }

    pub fn add_installed_file(&mut self, metadata: FileMetadata) {
        self.installed_files.insert(metadata.path.clone(), metadata);
    }

    pub fn add_symlink(&mut self, symlink: Symlink) {
        self.symlinks.push(symlink);
    }

    /// Forgets every user-visible file; used after deactivation.
    pub fn clear_exposed(&mut self) {
        self.installed_files.clear();
        self.symlinks.clear();
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Number of user-visible entries (links plus direct copies).
    pub fn exposed_count(&self) -> usize {
        self.installed_files.len() + self.symlinks.len()
    }

    /// Compares recorded links and copies with the filesystem.
    pub fn verify_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for link in &self.symlinks {
            if !link.source.exists() {
                report.missing.push(link.source.clone());
            }
            match std::fs::read_link(&link.target) {
                Ok(points_to) if points_to == link.source => {}
                Ok(_) => report.modified.push(link.target.clone()),
                Err(_) => report.missing.push(link.target.clone()),
            }
        }

        for (path, metadata) in &self.installed_files {
            if metadata.is_directory() {
                if !path.is_dir() {
                    report.missing.push(path.clone());
                }
                continue;
            }
            match std::fs::read(path) {
                Ok(data) => match metadata.verify_checksum(&data) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => report.modified.push(path.clone()),
                },
                Err(_) => report.missing.push(path.clone()),
            }
        }

        report
    }
}

/// Result of comparing an installation with the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub missing: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.modified.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Installation, InstallationId};
    use crate::config::InstallMode;
    use crate::model::file_metadata::FileMetadata;
    use crate::model::package::PackageId;
    use semver::Version;

    fn package_id() -> PackageId {
        PackageId::new("tool", &Version::new(1, 0, 0))
    }

    #[test]
    fn new_installation_is_inactive_and_empty() {
        let installation = Installation::new(package_id(), InstallMode::Symlink);
        assert!(!installation.active);
        assert_eq!(installation.exposed_count(), 0);
        assert!(installation.verify_integrity().is_ok());
    }

    #[test]
    fn parses_installation_id() {
        let id = InstallationId::new();
        assert_eq!(InstallationId::parse(&id.to_string()).unwrap(), id);
        assert!(InstallationId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn integrity_reports_missing_and_modified_copies() {
        let dir = tempfile::tempdir().unwrap();
        let intact = dir.path().join("intact");
        let changed = dir.path().join("changed");
        std::fs::write(&intact, b"same").unwrap();
        std::fs::write(&changed, b"after").unwrap();

        let mut installation = Installation::new(package_id(), InstallMode::Direct);
        installation.add_installed_file(FileMetadata::for_contents(intact, b"same"));
        installation.add_installed_file(FileMetadata::for_contents(changed.clone(), b"before"));
        installation.add_installed_file(FileMetadata::for_contents(dir.path().join("gone"), b"x"));

        let report = installation.verify_integrity();
        assert_eq!(report.modified, vec![changed]);
        assert_eq!(report.missing, vec![dir.path().join("gone")]);
    }
}
