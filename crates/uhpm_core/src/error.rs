//! Service-level error shared by registries, the resolver and the package
//! manager.

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::dependency::DependencyConflict;
use crate::model::package::{PackageId, PackageValidationError, ReferenceParseError};
use crate::model::symlink::SymlinkValidationError;
use crate::net::NetError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type UhpmResult<T> = Result<T, UhpmError>;

#[derive(Debug)]
pub enum UhpmError {
    Db(DbError),
    Repo(RepoError),
    Config(ConfigError),
    Net(NetError),
    Archive(ArchiveError),
    Validation(PackageValidationError),
    InvalidReference(ReferenceParseError),
    InvalidSymlink(SymlinkValidationError),
    Io { path: PathBuf, source: std::io::Error },
    PackageNotFound(String),
    NoMatchingVersion { name: String, requirement: String },
    AlreadyInstalled(PackageId),
    NotInstalled(String),
    DependencyCycle(Vec<String>),
    IncompatibleRequirements { name: String, first: String, second: String },
    Conflicts(Vec<DependencyConflict>),
    TargetMismatch { package: PackageId, target: String },
    HasDependents { package: PackageId, dependents: Vec<String> },
    FileConflict(PathBuf),
    RegistryUnavailable(String),
    NoRegistries,
    HomeDirUnavailable,
}

impl Display for UhpmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Net(err) => write!(f, "{err}"),
            Self::Archive(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidReference(err) => write!(f, "{err}"),
            Self::InvalidSymlink(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::PackageNotFound(name) => write!(f, "package not found: {name}"),
            Self::NoMatchingVersion { name, requirement } => {
                write!(f, "no version of {name} satisfies {requirement}")
            }
            Self::AlreadyInstalled(id) => write!(f, "package already installed: {id}"),
            Self::NotInstalled(id) => write!(f, "package is not installed: {id}"),
            Self::DependencyCycle(path) => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            Self::IncompatibleRequirements {
                name,
                first,
                second,
            } => write!(
                f,
                "incompatible requirements for {name}: {first} and {second}"
            ),
            Self::Conflicts(conflicts) => {
                write!(f, "package conflicts:")?;
                for conflict in conflicts {
                    write!(f, " [{conflict}]")?;
                }
                Ok(())
            }
            Self::TargetMismatch { package, target } => {
                write!(f, "{package} does not support target {target}")
            }
            Self::HasDependents {
                package,
                dependents,
            } => write!(
                f,
                "{package} is required by {}; use force to remove anyway",
                dependents.join(", ")
            ),
            Self::FileConflict(path) => write!(
                f,
                "{} already exists and is not managed by uhpm",
                path.display()
            ),
            Self::RegistryUnavailable(name) => write!(f, "repository unavailable: {name}"),
            Self::NoRegistries => write!(f, "no enabled repositories configured"),
            Self::HomeDirUnavailable => {
                write!(f, "cannot determine home directory; set UHPM_HOME")
            }
        }
    }
}

impl Error for UhpmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Net(err) => Some(err),
            Self::Archive(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidReference(err) => Some(err),
            Self::InvalidSymlink(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl UhpmError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

impl From<DbError> for UhpmError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for UhpmError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ConfigError> for UhpmError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<NetError> for UhpmError {
    fn from(value: NetError) -> Self {
        Self::Net(value)
    }
}

impl From<ArchiveError> for UhpmError {
    fn from(value: ArchiveError) -> Self {
        Self::Archive(value)
    }
}

impl From<PackageValidationError> for UhpmError {
    fn from(value: PackageValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ReferenceParseError> for UhpmError {
    fn from(value: ReferenceParseError) -> Self {
        Self::InvalidReference(value)
    }
}

impl From<SymlinkValidationError> for UhpmError {
    fn from(value: SymlinkValidationError) -> Self {
        Self::InvalidSymlink(value)
    }
}

impl From<rusqlite::Error> for UhpmError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
