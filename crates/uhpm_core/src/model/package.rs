//! Package domain model.
//!
//! # Responsibility
//! - Define the canonical package record shared by registries, the resolver
//!   and the local database.
//! - Parse user-facing package references (`name@version`).
//!
//! # Invariants
//! - `PackageId` is always `<name>@<version>`.
//! - A package can only be active while it is installed.
//! - `validate()` must pass before a package is persisted.

use crate::model::dependency::Dependency;
use crate::model::target::Target;
use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Longest accepted package name.
pub const MAX_PACKAGE_NAME_LEN: usize = 50;

static PACKAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid package name regex"));

const FORBIDDEN_PRERELEASE_TAGS: &[&str] = &["broken", "unstable"];

/// Stable `<name>@<version>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(name: &str, version: &Version) -> Self {
        Self(format!("{name}@{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PackageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a package's archive comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackageSource {
    Git { url: String, release: Option<String> },
    Http { url: String },
    Local { path: PathBuf },
}

impl PackageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Git { .. } => "git",
            Self::Http { .. } => "http",
            Self::Local { .. } => "local",
        }
    }

    pub fn location(&self) -> String {
        match self {
            Self::Git { url, .. } | Self::Http { url } => url.clone(),
            Self::Local { path } => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    pub hash: String,
}

impl Checksum {
    pub fn sha256(hash: impl Into<String>) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            hash: hash.into(),
        }
    }
}

/// Canonical package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub author: String,
    pub description: Option<String>,
    pub source: PackageSource,
    pub target: Target,
    pub checksum: Option<Checksum>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Virtual names this package satisfies in addition to its own name.
    #[serde(default)]
    pub provides: Vec<String>,
    /// Package names that must not be installed alongside this one.
    #[serde(default)]
    pub conflicts: Vec<String>,
    pub installed: bool,
    pub active: bool,
}

impl Package {
    /// Creates a not-yet-installed package with no dependencies.
    pub fn new(
        name: impl Into<String>,
        version: Version,
        author: impl Into<String>,
        source: PackageSource,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            author: author.into(),
            description: None,
            source,
            target: Target::any(),
            checksum: None,
            dependencies: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            installed: false,
            active: false,
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(&self.name, &self.version)
    }

    pub fn reference(&self) -> PackageReference {
        PackageReference::new(self.name.clone(), self.version.clone())
    }

    pub fn matches_target(&self, target: &Target) -> bool {
        self.target.matches(target)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.name == name)
    }

    /// Returns whether this package answers to `name` directly or via `provides`.
    pub fn satisfies_name(&self, name: &str) -> bool {
        self.name == name || self.provides.iter().any(|provided| provided == name)
    }

    pub fn mark_installed(&mut self) {
        self.installed = true;
    }

    /// Clears both installed and active flags.
    pub fn mark_removed(&mut self) {
        self.installed = false;
        self.active = false;
    }

    /// Activates the package; no-op while it is not installed.
    pub fn activate(&mut self) {
        if self.installed {
            self.active = true;
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Validates naming, authorship, version and source invariants.
    pub fn validate(&self) -> Result<(), PackageValidationError> {
        validate_package_name(&self.name)?;

        if self.author.trim().is_empty() {
            return Err(PackageValidationError::EmptyAuthor);
        }

        let pre = self.version.pre.as_str();
        if FORBIDDEN_PRERELEASE_TAGS.iter().any(|tag| pre.contains(tag)) {
            return Err(PackageValidationError::ForbiddenPrerelease(
                self.version.to_string(),
            ));
        }

        validate_source(&self.source)?;

        let mut seen = BTreeSet::new();
        for dependency in &self.dependencies {
            if !seen.insert(dependency.name.as_str()) {
                return Err(PackageValidationError::DuplicateDependency(
                    dependency.name.clone(),
                ));
            }
        }

        if let Some(checksum) = &self.checksum {
            if checksum.algorithm.trim().is_empty() || checksum.hash.trim().is_empty() {
                return Err(PackageValidationError::EmptyChecksum);
            }
        }

        Ok(())
    }

    /// Validates a package fetched from a remote registry.
    ///
    /// Remote packages must carry a checksum so the download can be verified.
    pub fn validate_remote(&self) -> Result<(), PackageValidationError> {
        self.validate()?;
        if self.checksum.is_none() {
            return Err(PackageValidationError::MissingChecksum(self.id()));
        }
        Ok(())
    }
}

/// Validates a package name against the naming rules.
pub fn validate_package_name(name: &str) -> Result<(), PackageValidationError> {
    if name.trim().is_empty() {
        return Err(PackageValidationError::EmptyName);
    }
    if name.len() > MAX_PACKAGE_NAME_LEN || !PACKAGE_NAME_RE.is_match(name) {
        return Err(PackageValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_source(source: &PackageSource) -> Result<(), PackageValidationError> {
    match source {
        PackageSource::Git { url, .. } => {
            if url.trim().is_empty() {
                return Err(PackageValidationError::InvalidSource(
                    "git url cannot be empty".to_string(),
                ));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("git@")
            {
                return Err(PackageValidationError::InvalidSource(format!(
                    "git url must be http, https or git@ form: {url}"
                )));
            }
        }
        PackageSource::Http { url } => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PackageValidationError::InvalidSource(format!(
                    "http url must start with http:// or https://: {url}"
                )));
            }
        }
        PackageSource::Local { path } => {
            if path.as_os_str().is_empty() {
                return Err(PackageValidationError::InvalidSource(
                    "local path cannot be empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Package validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageValidationError {
    EmptyName,
    InvalidName(String),
    EmptyAuthor,
    ForbiddenPrerelease(String),
    InvalidSource(String),
    DuplicateDependency(String),
    EmptyChecksum,
    MissingChecksum(PackageId),
}

impl Display for PackageValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "package name cannot be empty"),
            Self::InvalidName(name) => write!(
                f,
                "invalid package name `{name}`: must start with a letter, contain only letters, digits, `-` or `_`, and be at most {MAX_PACKAGE_NAME_LEN} characters"
            ),
            Self::EmptyAuthor => write!(f, "package author cannot be empty"),
            Self::ForbiddenPrerelease(version) => write!(
                f,
                "version `{version}` uses a forbidden pre-release tag (broken/unstable)"
            ),
            Self::InvalidSource(message) => write!(f, "invalid package source: {message}"),
            Self::DuplicateDependency(name) => write!(f, "dependency declared twice: {name}"),
            Self::EmptyChecksum => write!(f, "checksum algorithm and hash cannot be empty"),
            Self::MissingChecksum(id) => {
                write!(f, "remote package {id} must include a checksum")
            }
        }
    }
}

impl Error for PackageValidationError {}

/// Exact `name@version` pointer to one package release.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageReference {
    pub name: String,
    pub version: Version,
}

impl PackageReference {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(&self.name, &self.version)
    }

    /// Parses `name@version`; exactly one `@` and a full semver version.
    pub fn parse(input: &str) -> Result<Self, ReferenceParseError> {
        let trimmed = input.trim();
        let parts: Vec<&str> = trimmed.split('@').collect();
        if parts.len() != 2 {
            return Err(ReferenceParseError::InvalidFormat(trimmed.to_string()));
        }
        let name = checked_reference_name(parts[0], trimmed)?;
        let version =
            Version::parse(parts[1].trim()).map_err(|err| ReferenceParseError::InvalidVersion {
                input: trimmed.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self::new(name, version))
    }
}

impl Display for PackageReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl From<&Package> for PackageReference {
    fn from(package: &Package) -> Self {
        package.reference()
    }
}

impl TryFrom<&str> for PackageReference {
    type Error = ReferenceParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// User request for a package: a name plus an optional version requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    pub requirement: VersionReq,
}

impl PackageRequest {
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: VersionReq::STAR,
        }
    }

    /// Parses `name`, `name@1.2.3` (exact) or `name@^1.2` (requirement).
    pub fn parse(input: &str) -> Result<Self, ReferenceParseError> {
        let trimmed = input.trim();
        let Some((name, raw)) = trimmed.split_once('@') else {
            return Ok(Self::any(checked_reference_name(trimmed, trimmed)?));
        };
        let name = checked_reference_name(name, trimmed)?;

        let raw = raw.trim();
        let requirement = match Version::parse(raw) {
            Ok(version) => exact_requirement(&version),
            Err(_) => VersionReq::parse(raw).map_err(|err| {
                ReferenceParseError::InvalidRequirement {
                    input: trimmed.to_string(),
                    message: err.to_string(),
                }
            })?,
        };

        Ok(Self {
            name: name.to_string(),
            requirement,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.requirement.matches(version)
    }
}

impl From<&PackageReference> for PackageRequest {
    fn from(reference: &PackageReference) -> Self {
        Self {
            name: reference.name.clone(),
            requirement: exact_requirement(&reference.version),
        }
    }
}

impl Display for PackageRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.requirement == VersionReq::STAR {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.requirement)
        }
    }
}

/// Checks the name part of a reference typed by a user or read from a
/// meta file; names end up in repository paths and URLs.
pub(crate) fn checked_reference_name<'a>(
    name: &'a str,
    input: &str,
) -> Result<&'a str, ReferenceParseError> {
    let name = name.trim();
    match validate_package_name(name) {
        Ok(()) => Ok(name),
        Err(PackageValidationError::EmptyName) => {
            Err(ReferenceParseError::EmptyName(input.to_string()))
        }
        Err(_) => Err(ReferenceParseError::InvalidName {
            input: input.to_string(),
            name: name.to_string(),
        }),
    }
}

/// Builds a requirement matching exactly `version`, pre-release included.
pub fn exact_requirement(version: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![semver::Comparator {
            op: semver::Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        }],
    }
}

/// Package reference parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceParseError {
    InvalidFormat(String),
    EmptyName(String),
    InvalidName { input: String, name: String },
    InvalidVersion { input: String, message: String },
    InvalidRequirement { input: String, message: String },
}

impl Display for ReferenceParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(input) => {
                write!(f, "invalid package reference `{input}`: expected name@version")
            }
            Self::EmptyName(input) => write!(f, "package reference `{input}` has no name"),
            Self::InvalidName { input, name } => write!(
                f,
                "invalid package name `{name}` in `{input}`: use letters, digits, `-` or `_`"
            ),
            Self::InvalidVersion { input, message } => {
                write!(f, "invalid version in package reference `{input}`: {message}")
            }
            Self::InvalidRequirement { input, message } => {
                write!(f, "invalid version requirement in `{input}`: {message}")
            }
        }
    }
}

impl Error for ReferenceParseError {}
