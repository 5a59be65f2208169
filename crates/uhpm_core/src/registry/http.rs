//! Registry served over HTTP.
//!
//! Layout under the repository base URL:
//! - `index.toml`
//! - `packages/<name>-<version>-meta.toml`
//! - `packages/<name>-<version>.uhp`

use super::PackageRegistry;
use crate::archive::{ArchiveError, PackageMeta};
use crate::cache::FileCache;
use crate::config::RepositoryConfig;
use crate::error::{UhpmError, UhpmResult};
use crate::model::index::RepositoryIndex;
use crate::model::package::{Package, PackageReference, PackageSource, PackageValidationError};
use crate::net::{self, NetError, ProgressFn, Transport};
use log::{info, warn};
use semver::Version;

pub struct HttpRegistry<T: Transport> {
    config: RepositoryConfig,
    base_url: String,
    transport: T,
    cache: FileCache,
}

impl<T: Transport> HttpRegistry<T> {
    pub fn new(config: RepositoryConfig, transport: T, cache: FileCache) -> Self {
        let base_url = config.url.trim_end_matches('/').to_string();
        Self {
            config,
            base_url,
            transport,
            cache,
        }
    }

    pub fn index_url(&self) -> String {
        format!("{}/index.toml", self.base_url)
    }

    pub fn meta_url(&self, package_ref: &PackageReference) -> String {
        format!(
            "{}/packages/{}-{}-meta.toml",
            self.base_url, package_ref.name, package_ref.version
        )
    }

    pub fn archive_url(&self, package_ref: &PackageReference) -> String {
        format!(
            "{}/packages/{}-{}.uhp",
            self.base_url, package_ref.name, package_ref.version
        )
    }

    /// Returns cached bytes for `url`, fetching and caching them on a miss.
    fn fetch_cached_text(&self, url: &str) -> UhpmResult<String> {
        let cached = self
            .cache
            .get_index(url)
            .map_err(UhpmError::io(self.cache.root()))?;
        let bytes = match cached {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                let bytes = self.transport.get(url)?;
                self.cache
                    .put_index(url, &bytes)
                    .map_err(UhpmError::io(self.cache.root()))?;
                bytes
            }
        };
        String::from_utf8(bytes).map_err(|err| {
            UhpmError::Net(NetError::Transport {
                url: url.to_string(),
                message: format!("response is not UTF-8: {err}"),
            })
        })
    }
}

impl<T: Transport> PackageRegistry for HttpRegistry<T> {
    fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn get_package(&self, package_ref: &PackageReference) -> UhpmResult<Package> {
        let meta_url = self.meta_url(package_ref);
        let raw = match self.fetch_cached_text(&meta_url) {
            Ok(raw) => raw,
            Err(UhpmError::Net(NetError::NotFound(_))) => {
                return Err(UhpmError::PackageNotFound(package_ref.to_string()))
            }
            Err(err) => return Err(err),
        };

        let package = PackageMeta::from_toml_str(&raw)?.into_package(PackageSource::Http {
            url: self.archive_url(package_ref),
        })?;
        if package.name != package_ref.name || package.version != package_ref.version {
            return Err(ArchiveError::InvalidMeta(format!(
                "{meta_url} describes {}",
                package.reference()
            ))
            .into());
        }
        package.validate_remote()?;
        Ok(package)
    }

    fn search_packages(&self, query: &str) -> UhpmResult<Vec<Package>> {
        let index = self.get_index()?;
        let mut results = Vec::new();
        for name in index.matching_names(query) {
            let Some(version) = index.latest_version(name) else {
                continue;
            };
            match self.get_package(&PackageReference::new(name, version)) {
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
        Ok(self.get_index()?.sorted_versions(name))
    }

    fn download_package(
        &self,
        package_ref: &PackageReference,
        progress: ProgressFn<'_>,
    ) -> UhpmResult<Vec<u8>> {
        let package = self.get_package(package_ref)?;
        let checksum = package
            .checksum
            .ok_or_else(|| PackageValidationError::MissingChecksum(package_ref.id()))?;
        let url = self.archive_url(package_ref);

        let cached = self
            .cache
            .get_package(package_ref)
            .map_err(UhpmError::io(self.cache.root()))?;
        if let Some(bytes) = cached {
            if net::verify_checksum(&url, &bytes, &checksum).is_ok() {
                let len = bytes.len() as u64;
                progress(len, Some(len));
                return Ok(bytes);
            }
            warn!(
                "event=cache_verify module=registry status=error package={} reason=checksum_mismatch",
                package_ref
            );
            self.cache
                .remove_package(package_ref)
                .map_err(UhpmError::io(self.cache.root()))?;
        }

        let bytes = net::download_with_checksum(&self.transport, &url, &checksum, progress)?;
        self.cache
            .put_package(package_ref, &bytes)
            .map_err(UhpmError::io(self.cache.root()))?;
        Ok(bytes)
    }

    fn get_index(&self) -> UhpmResult<RepositoryIndex> {
        let index_url = self.index_url();
        let raw = self.fetch_cached_text(&index_url)?;
        toml::from_str(&raw).map_err(|err| {
            UhpmError::Net(NetError::Transport {
                url: index_url,
                message: format!("invalid index: {err}"),
            })
        })
    }

    fn update_index(&self) -> UhpmResult<RepositoryIndex> {
        self.cache
            .invalidate_index(&self.index_url())
            .map_err(UhpmError::io(self.cache.root()))?;
        let index = self.get_index()?;
        info!(
            "event=index_update module=registry status=ok registry={} packages={}",
            self.config.name,
            index.packages.len()
        );
        Ok(index)
    }

    fn is_available(&self) -> bool {
        self.transport.is_url_available(&self.index_url())
    }
}
