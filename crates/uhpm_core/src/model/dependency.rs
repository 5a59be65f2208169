//! Package dependency declarations.
//!
//! # Invariants
//! - A dependency without an explicit requirement accepts any version (`*`).
//! - Only `DependencyKind::Required` entries take part in installation.

use crate::model::package::{checked_reference_name, ReferenceParseError};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Role a dependency plays for the declaring package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Required,
    Optional,
    Build,
    Dev,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Build => "build",
            Self::Dev => "dev",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "required" => Some(Self::Required),
            "optional" => Some(Self::Optional),
            "build" => Some(Self::Build),
            "dev" => Some(Self::Dev),
            _ => None,
        }
    }
}

/// Semver requirement attached to a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub requirement: VersionReq,
}

impl VersionConstraint {
    pub fn new(requirement: VersionReq) -> Self {
        Self { requirement }
    }

    pub fn any() -> Self {
        Self::new(VersionReq::STAR)
    }

    pub fn is_any(&self) -> bool {
        self.requirement == VersionReq::STAR
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub constraint: VersionConstraint,
    pub kind: DependencyKind,
    #[serde(default)]
    pub provides: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Dependency {
    /// Creates a required dependency on `name` limited by `requirement`.
    pub fn required(name: impl Into<String>, requirement: VersionReq) -> Self {
        Self {
            name: name.into(),
            constraint: VersionConstraint::new(requirement),
            kind: DependencyKind::Required,
            provides: None,
            features: Vec::new(),
        }
    }

    /// Parses the meta-file form `name` or `name@<requirement>`.
    pub fn parse(spec: &str) -> Result<Self, ReferenceParseError> {
        let spec = spec.trim();
        let (name, requirement) = match spec.split_once('@') {
            Some((name, raw_req)) => {
                let requirement = VersionReq::parse(raw_req.trim()).map_err(|err| {
                    ReferenceParseError::InvalidRequirement {
                        input: spec.to_string(),
                        message: err.to_string(),
                    }
                })?;
                (name.trim(), requirement)
            }
            None => (spec, VersionReq::STAR),
        };

        let name = checked_reference_name(name, spec)?;
        Ok(Self::required(name, requirement))
    }

    pub fn with_kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn matches_version(&self, version: &Version) -> bool {
        self.constraint.requirement.matches(version)
    }

    pub fn is_required(&self) -> bool {
        self.kind == DependencyKind::Required
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.constraint.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.constraint.requirement)
        }
    }
}

/// Incompatibility found while planning an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyConflict {
    /// Package whose requirement cannot be met.
    pub package: String,
    /// Requirement or conflict declaration that failed.
    pub required: String,
    /// Version (or package) currently installed or planned.
    pub installed: String,
    pub message: String,
}

impl Display for DependencyConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: requires {}, found {} ({})",
            self.package, self.required, self.installed, self.message
        )
    }
}
