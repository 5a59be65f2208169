//! Repository index listing the versions a registry offers.

use crate::model::dependency::Dependency;
use semver::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackageEntry {
    pub name: String,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub packages: Vec<RepositoryPackageEntry>,
}

impl RepositoryIndex {
    pub fn get_versions(&self, package: &str) -> Option<&[String]> {
        self.packages
            .iter()
            .find(|entry| entry.name == package)
            .map(|entry| entry.versions.as_slice())
    }

    /// Parsed versions of `package` in ascending order; unparsable entries are skipped.
    pub fn sorted_versions(&self, package: &str) -> Vec<Version> {
        let mut parsed: Vec<Version> = self
            .get_versions(package)
            .unwrap_or_default()
            .iter()
            .filter_map(|raw| Version::parse(raw).ok())
            .collect();
        parsed.sort();
        parsed.dedup();
        parsed
    }

    pub fn latest_version(&self, package: &str) -> Option<Version> {
        self.sorted_versions(package).pop()
    }

    /// Highest version of `dep.name` matching the dependency requirement.
    pub fn latest_satisfying(&self, dep: &Dependency) -> Option<Version> {
        self.sorted_versions(&dep.name)
            .into_iter()
            .rev()
            .find(|version| dep.matches_version(version))
    }

    /// Names containing `query` (case-insensitive).
    pub fn matching_names(&self, query: &str) -> Vec<&str> {
        let needle = query.to_ascii_lowercase();
        self.packages
            .iter()
            .filter(|entry| entry.name.to_ascii_lowercase().contains(&needle))
            .map(|entry| entry.name.as_str())
            .collect()
    }
}
