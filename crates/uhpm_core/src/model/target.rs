//! Platform target a package was built for.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Meta-file value meaning "runs on every platform".
pub const ANY_TARGET: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    Linux,
    MacOS,
    Any,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    X86_64,
    Aarch64,
    Any,
    Custom(String),
}

/// Operating system and CPU architecture pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub os: OperatingSystem,
    pub arch: Architecture,
}

impl Target {
    /// Target of the running binary.
    pub fn current() -> Self {
        Self {
            os: OperatingSystem::parse(std::env::consts::OS),
            arch: Architecture::parse(std::env::consts::ARCH),
        }
    }

    /// Target that matches every platform.
    pub fn any() -> Self {
        Self {
            os: OperatingSystem::Any,
            arch: Architecture::Any,
        }
    }

    /// Builds a target from optional meta-file fields; missing fields mean `any`.
    pub fn from_meta(os: Option<&str>, arch: Option<&str>) -> Self {
        Self {
            os: os.map_or(OperatingSystem::Any, OperatingSystem::parse),
            arch: arch.map_or(Architecture::Any, Architecture::parse),
        }
    }

    /// Returns whether a package built for `self` runs on `other`.
    ///
    /// `Any` on either side matches everything.
    pub fn matches(&self, other: &Target) -> bool {
        let os_ok = self.os == OperatingSystem::Any
            || other.os == OperatingSystem::Any
            || self.os == other.os;
        let arch_ok = self.arch == Architecture::Any
            || other.arch == Architecture::Any
            || self.arch == other.arch;
        os_ok && arch_ok
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

impl OperatingSystem {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "linux" => Self::Linux,
            "macos" | "darwin" | "osx" => Self::MacOS,
            "" | ANY_TARGET => Self::Any,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Linux => "linux",
            Self::MacOS => "macos",
            Self::Any => ANY_TARGET,
            Self::Custom(value) => value.as_str(),
        }
    }
}

impl Architecture {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Self::X86_64,
            "aarch64" | "arm64" => Self::Aarch64,
            "" | ANY_TARGET => Self::Any,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Any => ANY_TARGET,
            Self::Custom(value) => value.as_str(),
        }
    }
}
