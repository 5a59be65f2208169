//! Registry backed by a directory tree: `<root>/<name>/<version>/meta.toml`.

use super::PackageRegistry;
use crate::archive::{self, ArchiveError};
use crate::config::RepositoryConfig;
use crate::error::{UhpmError, UhpmResult};
use crate::model::index::{RepositoryIndex, RepositoryPackageEntry};
use crate::model::package::{validate_package_name, Package, PackageReference, PackageSource};
use crate::net::ProgressFn;
use log::{debug, warn};
use semver::Version;
use std::path::{Path, PathBuf};

pub struct LocalRegistry {
    config: RepositoryConfig,
    root: PathBuf,
}

impl LocalRegistry {
    /// Builds a registry from a `file://` or plain-path repository config.
    pub fn new(config: RepositoryConfig) -> UhpmResult<Self> {
        let root = config.local_path().ok_or_else(|| {
            UhpmError::Config(crate::config::ConfigError::InvalidRepository {
                name: config.name.clone(),
                message: format!("not a local repository url: {}", config.url),
            })
        })?;
        Ok(Self { config, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, package_ref: &PackageReference) -> UhpmResult<PathBuf> {
        validate_package_name(&package_ref.name)?;
        Ok(self
            .root
            .join(&package_ref.name)
            .join(package_ref.version.to_string()))
    }

    fn package_names(&self) -> UhpmResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(UhpmError::io(&self.root)(err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(UhpmError::io(&self.root))?;
            let is_dir = entry
                .file_type()
                .map_err(UhpmError::io(entry.path()))?
                .is_dir();
            // Skips `.git` and other directories that cannot be packages.
            match entry.file_name().to_str() {
                Some(name) if is_dir && validate_package_name(name).is_ok() => {
                    names.push(name.to_string())
                }
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}

impl PackageRegistry for LocalRegistry {
    fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn get_package(&self, package_ref: &PackageReference) -> UhpmResult<Package> {
        let dir = self.version_dir(package_ref)?;
        let meta = match archive::load_meta(&dir) {
            Ok(meta) => meta,
            Err(ArchiveError::MissingMeta) => {
                return Err(UhpmError::PackageNotFound(package_ref.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut package = meta.into_package(PackageSource::Local { path: dir })?;
        if package.name != package_ref.name || package.version != package_ref.version {
            return Err(ArchiveError::InvalidMeta(format!(
                "meta describes {} but lives under {}",
                package.reference(),
                package_ref
            ))
            .into());
        }
        // Archives are packed on demand, so a checksum in meta.toml cannot describe them.
        package.checksum = None;
        Ok(package)
    }

    fn search_packages(&self, query: &str) -> UhpmResult<Vec<Package>> {
        let needle = query.to_ascii_lowercase();
        let mut results = Vec::new();
        for name in self.package_names()? {
            if !name.to_ascii_lowercase().contains(&needle) {
                continue;
            }
            let Some(version) = self.get_package_versions(&name)?.pop() else {
                continue;
            };
            match self.get_package(&PackageReference::new(name.clone(), version)) {
                Ok(package) => results.push(package),
                Err(err) => warn!(
                    "event=registry_search module=registry status=error registry={} package={} error={}",
                    self.config.name, name, err
                ),
            }
        }
        Ok(results)
    }

    fn get_package_versions(&self, name: &str) -> UhpmResult<Vec<Version>> {
        validate_package_name(name)?;
        let dir = self.root.join(name);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(UhpmError::io(&dir)(err)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(UhpmError::io(&dir))?;
            let parsed = entry
                .file_name()
                .to_str()
                .and_then(|raw| Version::parse(raw).ok());
            if let Some(version) = parsed {
                if entry.path().join(archive::META_FILE).is_file() {
                    versions.push(version);
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn download_package(
        &self,
        package_ref: &PackageReference,
        progress: ProgressFn<'_>,
    ) -> UhpmResult<Vec<u8>> {
        let dir = self.version_dir(package_ref)?;
        if !dir.join(archive::META_FILE).is_file() {
            return Err(UhpmError::PackageNotFound(package_ref.to_string()));
        }
        let bytes = archive::pack_directory(&dir)?;
        let len = bytes.len() as u64;
        progress(len, Some(len));
        debug!(
            "event=registry_download module=registry status=ok registry={} package={} bytes={}",
            self.config.name, package_ref, len
        );
        Ok(bytes)
    }

    fn get_index(&self) -> UhpmResult<RepositoryIndex> {
        let mut packages = Vec::new();
        for name in self.package_names()? {
            let versions = self.get_package_versions(&name)?;
            if versions.is_empty() {
                continue;
            }
            packages.push(RepositoryPackageEntry {
                name,
                versions: versions.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(RepositoryIndex {
            name: self.config.name.clone(),
            url: self.config.url.clone(),
            packages,
        })
    }

    fn update_index(&self) -> UhpmResult<RepositoryIndex> {
        self.get_index()
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalRegistry;
    use crate::config::{RepositoryConfig, RepositoryType};
    use crate::error::UhpmError;
    use crate::model::package::PackageReference;
    use crate::registry::PackageRegistry;
    use semver::Version;
    use std::path::Path;

    fn write_release(root: &Path, name: &str, version: &str) {
        let dir = root.join(name).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("meta.toml"),
            format!("name = \"{name}\"\nversion = \"{version}\"\nauthor = \"tester\"\n"),
        )
        .unwrap();
    }

    #[test]
    fn lists_versions_in_ascending_order() {
        let dir = tempfile::tempdir().unwrap();
        write_release(dir.path(), "tool", "1.10.0");
        write_release(dir.path(), "tool", "1.2.0");
        std::fs::create_dir_all(dir.path().join("tool").join("not-a-version")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let registry = LocalRegistry::new(RepositoryConfig::new(
            "local",
            dir.path().display().to_string(),
            RepositoryType::Binary,
        ))
        .unwrap();

        assert_eq!(
            registry.get_package_versions("tool").unwrap(),
            vec![Version::new(1, 2, 0), Version::new(1, 10, 0)]
        );
        assert_eq!(registry.get_latest_version("tool").unwrap(), Version::new(1, 10, 0));
        assert!(registry.get_package_versions("missing").unwrap().is_empty());
        assert_eq!(registry.get_index().unwrap().packages.len(), 1);
    }

    #[test]
    fn names_outside_the_repository_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        write_release(dir.path(), "secret", "1.0.0");
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        let registry = LocalRegistry::new(RepositoryConfig::new(
            "local",
            repo.display().to_string(),
            RepositoryType::Binary,
        ))
        .unwrap();

        let escaping = PackageReference::new("../secret", Version::new(1, 0, 0));
        assert!(matches!(
            registry.get_package(&escaping).unwrap_err(),
            UhpmError::Validation(_)
        ));
        assert!(registry.get_package_versions("../secret").is_err());
    }

    #[test]
    fn rejects_remote_urls() {
        assert!(LocalRegistry::new(RepositoryConfig::new(
            "remote",
            "https://example.com",
            RepositoryType::Binary
        ))
        .is_err());
    }
}
