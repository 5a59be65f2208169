//! Metadata tracked for every file an installation places on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// The only checksum algorithm UHPM computes and verifies.
pub const SHA256: &str = "sha256";

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Computes `algorithm` over `data`.
pub fn compute_checksum(algorithm: &str, data: &[u8]) -> Result<String, ChecksumError> {
    match algorithm.trim().to_ascii_lowercase().as_str() {
        SHA256 => Ok(sha256_hex(data)),
        other => Err(ChecksumError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    UnsupportedAlgorithm(String),
}

impl Display for ChecksumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(algorithm) => {
                write!(f, "unsupported checksum algorithm: {algorithm}")
            }
        }
    }
}

impl Error for ChecksumError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub algorithm: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::read_only()
    }
}

impl FilePermissions {
    pub fn executable() -> Self {
        Self {
            read: true,
            write: false,
            execute: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            execute: false,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            execute: false,
        }
    }

    pub fn is_executable(&self) -> bool {
        self.execute
    }

    /// Owner permission bits (`0o700` mask).
    pub fn octal(&self) -> u32 {
        let mut result = 0;
        if self.read {
            result |= 0o400;
        }
        if self.write {
            result |= 0o200;
        }
        if self.execute {
            result |= 0o100;
        }
        result
    }

    /// Reads owner bits from a unix mode.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            read: mode & 0o400 != 0,
            write: mode & 0o200 != 0,
            execute: mode & 0o100 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Executable,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Executable => "executable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(Self::Regular),
            "directory" => Some(Self::Directory),
            "symlink" => Some(Self::Symlink),
            "executable" => Some(Self::Executable),
            _ => None,
        }
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: Option<FileChecksum>,
    pub permissions: FilePermissions,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub file_type: FileType,
}

impl FileMetadata {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let now = Utc::now();
        Self {
            path,
            size,
            checksum: None,
            permissions: FilePermissions::default(),
            created_at: now,
            modified_at: now,
            file_type: FileType::Regular,
        }
    }

    /// Builds metadata for `data` stored at `path`, with a SHA-256 checksum.
    pub fn for_contents(path: PathBuf, data: &[u8]) -> Self {
        Self::new(path, data.len() as u64).with_checksum(SHA256, &sha256_hex(data))
    }

    pub fn with_checksum(mut self, algorithm: &str, hash: &str) -> Self {
        self.checksum = Some(FileChecksum {
            algorithm: algorithm.to_string(),
            hash: hash.to_string(),
        });
        self
    }

    pub fn with_permissions(mut self, permissions: FilePermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn is_executable(&self) -> bool {
        self.permissions.is_executable()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Checks `data` against the recorded checksum; `true` when none is recorded.
    pub fn verify_checksum(&self, data: &[u8]) -> Result<bool, ChecksumError> {
        match &self.checksum {
            Some(checksum) => Ok(compute_checksum(&checksum.algorithm, data)? == checksum.hash),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{sha256_hex, ChecksumError, FileMetadata, FilePermissions};
    use std::path::PathBuf;

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verifies_checksum_of_contents() {
        let meta = FileMetadata::for_contents(PathBuf::from("bin/tool"), b"payload");
        assert_eq!(meta.size, 7);
        assert!(meta.verify_checksum(b"payload").unwrap());
        assert!(!meta.verify_checksum(b"tampered").unwrap());
    }

    #[test]
    fn missing_checksum_verifies_and_unknown_algorithm_fails() {
        let meta = FileMetadata::new(PathBuf::from("a"), 1);
        assert!(meta.verify_checksum(b"anything").unwrap());

        let md5 = meta.with_checksum("md5", "abc");
        assert_eq!(
            md5.verify_checksum(b"x").unwrap_err(),
            ChecksumError::UnsupportedAlgorithm("md5".to_string())
        );
    }

    #[test]
    fn permission_bits_follow_owner_mode() {
        let perms = FilePermissions::executable();
        assert_eq!(perms.octal(), 0o500);
        let from_mode = FilePermissions::from_mode(0o755);
        assert!(from_mode.read && from_mode.write && from_mode.execute);
    }
}
