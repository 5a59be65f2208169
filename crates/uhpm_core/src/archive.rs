//! `.uhp` package archives and the files inside a package directory.
//!
//! # Responsibility
//! - Parse `meta.toml` into a validated `Package`.
//! - Parse `instlist` into install entries.
//! - Pack and unpack gzip-compressed tar archives.
//!
//! # Invariants
//! - Unpacking never writes outside the destination directory.
//! - `pack_directory` output depends only on file names, contents and
//!   executable bits.
//! - `instlist` sources are relative paths inside the package directory.

use crate::model::dependency::Dependency;
use crate::model::package::{Checksum, Package, PackageSource, PackageValidationError};
use crate::model::target::Target;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

pub const META_FILE: &str = "meta.toml";
pub const INSTLIST_FILE: &str = "instlist";
pub const PACKAGE_EXTENSION: &str = "uhp";

pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Debug)]
pub enum ArchiveError {
    Io(std::io::Error),
    MissingMeta,
    InvalidMeta(String),
    InvalidPackage(PackageValidationError),
    InvalidInstlist { line: usize, message: String },
    UnsafePath(PathBuf),
    UnsupportedEntry(PathBuf),
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "archive io error: {err}"),
            Self::MissingMeta => write!(f, "package has no {META_FILE}"),
            Self::InvalidMeta(message) => write!(f, "invalid {META_FILE}: {message}"),
            Self::InvalidPackage(err) => write!(f, "invalid package: {err}"),
            Self::InvalidInstlist { line, message } => {
                write!(f, "invalid {INSTLIST_FILE} line {line}: {message}")
            }
            Self::UnsafePath(path) => {
                write!(f, "path escapes the package directory: {}", path.display())
            }
            Self::UnsupportedEntry(path) => {
                write!(f, "unsupported archive entry type: {}", path.display())
            }
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidPackage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PackageValidationError> for ArchiveError {
    fn from(value: PackageValidationError) -> Self {
        Self::InvalidPackage(value)
    }
}

/// Contents of `meta.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `name` or `name@<requirement>` entries.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_arch: Option<String>,
}

impl PackageMeta {
    pub fn from_toml_str(raw: &str) -> ArchiveResult<Self> {
        toml::from_str(raw).map_err(|err| ArchiveError::InvalidMeta(err.to_string()))
    }

    pub fn to_toml_string(&self) -> ArchiveResult<String> {
        toml::to_string_pretty(self).map_err(|err| ArchiveError::InvalidMeta(err.to_string()))
    }

    pub fn from_package(package: &Package) -> Self {
        let target_os = package.target.os.as_str().to_string();
        let target_arch = package.target.arch.as_str().to_string();
        Self {
            name: package.name.clone(),
            version: package.version.to_string(),
            author: package.author.clone(),
            description: package.description.clone(),
            dependencies: package.dependencies.iter().map(ToString::to_string).collect(),
            provides: package.provides.clone(),
            conflicts: package.conflicts.clone(),
            checksum_algorithm: package.checksum.as_ref().map(|c| c.algorithm.clone()),
            checksum_hash: package.checksum.as_ref().map(|c| c.hash.clone()),
            target_os: Some(target_os),
            target_arch: Some(target_arch),
        }
    }

    /// Converts the meta into a validated package record from `source`.
    pub fn into_package(self, source: PackageSource) -> ArchiveResult<Package> {
        let version = Version::parse(self.version.trim()).map_err(|err| {
            ArchiveError::InvalidMeta(format!("version `{}`: {err}", self.version))
        })?;

        let dependencies = self
            .dependencies
            .iter()
            .map(|spec| Dependency::parse(spec))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ArchiveError::InvalidMeta(err.to_string()))?;

        let checksum = match (self.checksum_algorithm, self.checksum_hash) {
            (Some(algorithm), Some(hash)) => Some(Checksum { algorithm, hash }),
            (None, None) => None,
            _ => {
                return Err(ArchiveError::InvalidMeta(
                    "checksum_algorithm and checksum_hash must be set together".to_string(),
                ))
            }
        };

        let mut package = Package::new(self.name, version, self.author, source);
        package.description = self.description;
        package.dependencies = dependencies;
        package.provides = self.provides;
        package.conflicts = self.conflicts;
        package.checksum = checksum;
        package.target = Target::from_meta(self.target_os.as_deref(), self.target_arch.as_deref());
        package.validate()?;
        Ok(package)
    }
}

/// One `instlist` line: a file inside the package and where it is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    /// Relative to the package directory.
    pub source: PathBuf,
    /// Absolute, or relative to the link root.
    pub target: PathBuf,
}

/// Parses `instlist` content.
///
/// Blank lines and `#` comments are skipped. Every other line must hold
/// exactly two whitespace-separated fields.
pub fn parse_instlist(content: &str) -> ArchiveResult<Vec<InstallEntry>> {
    let mut entries = Vec::new();
    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [source, target] = fields.as_slice() else {
            return Err(ArchiveError::InvalidInstlist {
                line: line_no,
                message: format!("expected `<source> <target>`, got {} fields", fields.len()),
            });
        };

        let source = PathBuf::from(source);
        if !is_contained_relative(&source) {
            return Err(ArchiveError::InvalidInstlist {
                line: line_no,
                message: format!("source `{}` must stay inside the package", source.display()),
            });
        }

        entries.push(InstallEntry {
            source,
            target: PathBuf::from(target),
        });
    }
    Ok(entries)
}

/// Loads `instlist` from an unpacked package; a missing file means no entries.
pub fn load_instlist(package_dir: &Path) -> ArchiveResult<Vec<InstallEntry>> {
    match std::fs::read_to_string(package_dir.join(INSTLIST_FILE)) {
        Ok(content) => parse_instlist(&content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

pub fn load_meta(package_dir: &Path) -> ArchiveResult<PackageMeta> {
    match std::fs::read_to_string(package_dir.join(META_FILE)) {
        Ok(raw) => PackageMeta::from_toml_str(&raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ArchiveError::MissingMeta),
        Err(err) => Err(err.into()),
    }
}

/// Reads `meta.toml` from archive bytes without unpacking anything else.
pub fn read_meta_from_archive(bytes: &[u8]) -> ArchiveResult<PackageMeta> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = normalize_entry_path(&entry.path()?)?;
        if path == Path::new(META_FILE) {
            let mut raw = String::new();
            entry.read_to_string(&mut raw)?;
            return PackageMeta::from_toml_str(&raw);
        }
    }
    Err(ArchiveError::MissingMeta)
}

/// Extracts archive bytes into `dest`; returns the relative paths of the
/// regular files written.
pub fn unpack(bytes: &[u8], dest: &Path) -> ArchiveResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut written = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = normalize_entry_path(&entry.path()?)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        let out_path = dest.join(&relative);
        if entry_type.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&out_path)?;
            written.push(relative);
        } else {
            return Err(ArchiveError::UnsupportedEntry(relative));
        }
    }

    debug!(
        "event=archive_unpack module=archive status=ok files={} dest={}",
        written.len(),
        dest.display()
    );
    Ok(written)
}

/// Packs every regular file under `dir` into `.uhp` bytes.
pub fn pack_directory(dir: &Path) -> ArchiveResult<Vec<u8>> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    if !files.iter().any(|path| path == Path::new(META_FILE)) {
        return Err(ArchiveError::MissingMeta);
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for relative in &files {
        let absolute = dir.join(relative);
        let content = std::fs::read(&absolute)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(file_mode(&absolute)?);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, relative, content.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    let bytes = encoder.finish()?;
    debug!(
        "event=archive_pack module=archive status=ok files={} bytes={}",
        files.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn collect_files(base: &Path, current: &Path, out: &mut Vec<PathBuf>) -> ArchiveResult<()> {
    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(base, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(base)
                .map_err(|_| ArchiveError::UnsafePath(path.clone()))?;
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> ArchiveResult<u32> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(if mode & 0o111 != 0 { 0o755 } else { 0o644 })
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> ArchiveResult<u32> {
    Ok(0o644)
}

/// Strips `./` prefixes and rejects absolute or parent-relative paths.
fn normalize_entry_path(path: &Path) -> ArchiveResult<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.to_path_buf()));
            }
        }
    }
    Ok(normalized)
}

fn is_contained_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
