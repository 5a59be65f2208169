//! Results returned by package manager operations.

use crate::model::package::{PackageId, PackageReference};
use semver::Version;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub package_id: PackageId,
    /// Every package installed by the call, dependencies first.
    pub installed_packages: Vec<PackageReference>,
    pub installed_files: Vec<PathBuf>,
    pub symlinks_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalResult {
    pub package_id: PackageId,
    pub removed_files: usize,
    pub freed_space: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchResult {
    pub package_name: String,
    pub from_version: Option<Version>,
    pub to_version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateCandidate {
    pub current: PackageReference,
    pub latest: Version,
}
