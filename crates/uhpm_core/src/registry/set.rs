//! Priority-ordered collection of registries.
//!
//! # Invariants
//! - Registries are consulted by ascending priority; equal priorities keep
//!   insertion order.
//! - For a given release the first registry that has it wins.

use super::{HttpRegistry, LocalRegistry, PackageRegistry};
use crate::cache::FileCache;
use crate::config::UhpmConfig;
use crate::error::{UhpmError, UhpmResult};
use crate::model::dependency::Dependency;
use crate::model::package::{Package, PackageId, PackageReference};
use crate::net::{HttpTransport, HttpTransportConfig, ProgressFn};
use log::{info, warn};
use semver::{Version, VersionReq};
use std::collections::BTreeSet;

/// Outcome of refreshing one registry's index.
#[derive(Debug)]
pub struct SyncReport {
    pub registry: String,
    pub result: UhpmResult<usize>,
}

#[derive(Default)]
pub struct RegistrySet {
    registries: Vec<Box<dyn PackageRegistry>>,
}

impl RegistrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds registries for every enabled repository in `config`.
    pub fn from_config(config: &UhpmConfig, cache: &FileCache) -> UhpmResult<Self> {
        let mut set = Self::new();
        for repository in config.enabled_repositories() {
            if repository.is_remote() {
                let transport = HttpTransport::new(HttpTransportConfig {
                    auth: repository.authentication.clone(),
                    ..HttpTransportConfig::default()
                })?;
                set.push(Box::new(HttpRegistry::new(
                    repository.clone(),
                    transport,
                    cache.clone(),
                )));
            } else {
                set.push(Box::new(LocalRegistry::new(repository.clone())?));
            }
        }
        info!(
            "event=registries_load module=registry status=ok count={}",
            set.len()
        );
        Ok(set)
    }

    /// Adds a registry at its priority position.
    pub fn push(&mut self, registry: Box<dyn PackageRegistry>) {
        let priority = registry.config().priority;
        let position = self
            .registries
            .iter()
            .position(|existing| existing.config().priority > priority)
            .unwrap_or(self.registries.len());
        self.registries.insert(position, registry);
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PackageRegistry> {
        self.registries.iter().map(|registry| registry.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|registry| registry.name()).collect()
    }

    /// Returns the package from the first registry that offers `package_ref`.
    pub fn get_package(&self, package_ref: &PackageReference) -> UhpmResult<Package> {
        Ok(self.find(package_ref)?.1)
    }

    pub fn download_package(
        &self,
        package_ref: &PackageReference,
        progress: ProgressFn<'_>,
    ) -> UhpmResult<Vec<u8>> {
        let (registry, _) = self.find(package_ref)?;
        registry.download_package(package_ref, progress)
    }

    /// Versions offered by any registry, ascending and deduplicated.
    ///
    /// Registries that fail are skipped while another one answers; when
    /// nothing is found, the first failure is returned instead of an empty
    /// list.
    pub fn versions(&self, name: &str) -> UhpmResult<Vec<Version>> {
        self.ensure_not_empty()?;
        let mut merged = BTreeSet::new();
        let mut first_error = None;
        for registry in self.iter() {
            match registry.get_package_versions(name) {
                Ok(versions) => merged.extend(versions),
                Err(err) => {
                    warn!(
                        "event=registry_versions module=registry status=error registry={} package={} error={}",
                        registry.name(),
                        name,
                        err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) if merged.is_empty() => Err(err),
            _ => Ok(merged.into_iter().collect()),
        }
    }

    pub fn latest_version(&self, name: &str) -> UhpmResult<Version> {
        self.versions(name)?
            .pop()
            .ok_or_else(|| UhpmError::PackageNotFound(name.to_string()))
    }

    /// Highest version of `name` accepted by `requirement`.
    pub fn latest_satisfying(&self, name: &str, requirement: &VersionReq) -> UhpmResult<Version> {
        let versions = self.versions(name)?;
        if versions.is_empty() {
            return Err(UhpmError::PackageNotFound(name.to_string()));
        }
        versions
            .into_iter()
            .rev()
            .find(|version| requirement.matches(version))
            .ok_or_else(|| UhpmError::NoMatchingVersion {
                name: name.to_string(),
                requirement: requirement.to_string(),
            })
    }

    /// Every release of `dependency.name` satisfying its requirement, ascending.
    pub fn satisfying_versions(&self, dependency: &Dependency) -> UhpmResult<Vec<Version>> {
        Ok(self
            .versions(&dependency.name)?
            .into_iter()
            .filter(|version| dependency.matches_version(version))
            .collect())
    }

    /// Search results across registries; the first registry wins per release.
    pub fn search(&self, query: &str) -> UhpmResult<Vec<Package>> {
        self.ensure_not_empty()?;
        let mut seen: BTreeSet<PackageId> = BTreeSet::new();
        let mut results = Vec::new();
        for registry in self.iter() {
            let found = match registry.search_packages(query) {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        "event=registry_search module=registry status=error registry={} error={}",
                        registry.name(),
                        err
                    );
                    continue;
                }
            };
            for package in found {
                if seen.insert(package.id()) {
                    results.push(package);
                }
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(results)
    }

    /// Refreshes every registry index; failures are reported per registry.
    pub fn update_indexes(&self) -> Vec<SyncReport> {
        self.iter()
            .map(|registry| SyncReport {
                registry: registry.name().to_string(),
                result: registry.update_index().map(|index| index.packages.len()),
            })
            .collect()
    }

    /// First registry holding `package_ref`. A registry failure is only
    /// reported when no later registry has the release.
    fn find(&self, package_ref: &PackageReference) -> UhpmResult<(&dyn PackageRegistry, Package)> {
        self.ensure_not_empty()?;
        let mut first_error = None;
        for registry in self.iter() {
            match registry.get_package(package_ref) {
                Ok(package) => return Ok((registry, package)),
                Err(UhpmError::PackageNotFound(_)) => continue,
                Err(err) => {
                    warn!(
                        "event=registry_lookup module=registry status=error registry={} package={} error={}",
                        registry.name(),
                        package_ref,
                        err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| UhpmError::PackageNotFound(package_ref.to_string())))
    }

    fn ensure_not_empty(&self) -> UhpmResult<()> {
        if self.registries.is_empty() {
            return Err(UhpmError::NoRegistries);
        }
        Ok(())
    }
}
