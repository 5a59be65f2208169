//! On-disk cache for downloaded archives and repository indexes.
//!
//! # Invariants
//! - Archives live at `<root>/packages/<name>-<version>.uhp`.
//! - Indexes live at `<root>/indexes/<sha256(url)>.toml`.
//! - Missing entries read as `None`, never as errors.

use crate::model::file_metadata::sha256_hex;
use crate::model::package::PackageReference;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const PACKAGES_DIR: &str = "packages";
const INDEXES_DIR: &str = "indexes";

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_path(&self, package_ref: &PackageReference) -> PathBuf {
        self.root.join(PACKAGES_DIR).join(format!(
            "{}-{}.uhp",
            package_ref.name, package_ref.version
        ))
    }

    fn index_path(&self, repository_url: &str) -> PathBuf {
        self.root
            .join(INDEXES_DIR)
            .join(format!("{}.toml", sha256_hex(repository_url.as_bytes())))
    }

    pub fn get_package(&self, package_ref: &PackageReference) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.package_path(package_ref))
    }

    pub fn put_package(&self, package_ref: &PackageReference, data: &[u8]) -> io::Result<()> {
        write_atomic(&self.package_path(package_ref), data)?;
        debug!(
            "event=cache_put module=cache status=ok kind=package package={} bytes={}",
            package_ref,
            data.len()
        );
        Ok(())
    }

    pub fn remove_package(&self, package_ref: &PackageReference) -> io::Result<()> {
        remove_optional(&self.package_path(package_ref))
    }

    pub fn has_package(&self, package_ref: &PackageReference) -> bool {
        self.package_path(package_ref).is_file()
    }

    pub fn clear_packages(&self) -> io::Result<()> {
        let dir = self.root.join(PACKAGES_DIR);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn get_index(&self, repository_url: &str) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.index_path(repository_url))
    }

    pub fn put_index(&self, repository_url: &str, data: &[u8]) -> io::Result<()> {
        write_atomic(&self.index_path(repository_url), data)
    }

    pub fn invalidate_index(&self, repository_url: &str) -> io::Result<()> {
        remove_optional(&self.index_path(repository_url))
    }

    /// Total bytes of every cached file.
    pub fn cache_size(&self) -> io::Result<u64> {
        let mut total = 0;
        for path in self.cached_files()? {
            total += std::fs::metadata(&path)?.len();
        }
        Ok(total)
    }

    /// Removes cached files last modified more than `max_age` ago.
    pub fn cleanup_old_entries(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for path in self.cached_files()? {
            let modified = std::fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                remove_optional(&path)?;
                removed += 1;
            }
        }
        info!(
            "event=cache_cleanup module=cache status=ok removed={} max_age_secs={}",
            removed,
            max_age.as_secs()
        );
        Ok(removed)
    }

    fn cached_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in [PACKAGES_DIR, INDEXES_DIR] {
            let entries = match std::fs::read_dir(self.root.join(dir)) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn remove_optional(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Writes through a sibling temp file so readers never see partial data.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("partial");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}
