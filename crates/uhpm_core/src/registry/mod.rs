//! Package registries: where installable packages come from.
//!
//! # Responsibility
//! - Define the `PackageRegistry` contract shared by local directories and
//!   HTTP repositories.
//! - Merge several registries into one priority-ordered view.
//!
//! # Invariants
//! - `get_package_versions` returns ascending versions and an empty list for
//!   unknown packages.
//! - Packages returned by a registry have passed `Package::validate()`.

use crate::config::RepositoryConfig;
use crate::error::{UhpmError, UhpmResult};
use crate::model::dependency::Dependency;
use crate::model::index::RepositoryIndex;
use crate::model::package::{Package, PackageReference};
use crate::net::ProgressFn;
use semver::Version;

pub mod http;
pub mod local;
pub mod set;

pub use http::HttpRegistry;
pub use local::LocalRegistry;
pub use set::RegistrySet;

pub trait PackageRegistry {
    fn config(&self) -> &RepositoryConfig;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn get_package(&self, package_ref: &PackageReference) -> UhpmResult<Package>;

    /// Latest release of every package whose name contains `query`.
    fn search_packages(&self, query: &str) -> UhpmResult<Vec<Package>>;

    fn get_package_versions(&self, name: &str) -> UhpmResult<Vec<Version>>;

    fn get_latest_version(&self, name: &str) -> UhpmResult<Version> {
        self.get_package_versions(name)?
            .pop()
            .ok_or_else(|| UhpmError::PackageNotFound(name.to_string()))
    }

    /// Resolves each dependency to its newest satisfying release.
    fn resolve_dependencies(&self, dependencies: &[Dependency]) -> UhpmResult<Vec<Package>> {
        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let version = self
                .get_package_versions(&dependency.name)?
                .into_iter()
                .rev()
                .find(|version| dependency.matches_version(version))
                .ok_or_else(|| UhpmError::NoMatchingVersion {
                    name: dependency.name.clone(),
                    requirement: dependency.constraint.requirement.to_string(),
                })?;
            resolved.push(
                self.get_package(&PackageReference::new(dependency.name.clone(), version))?,
            );
        }
        Ok(resolved)
    }

    /// Returns `.uhp` archive bytes for `package_ref`.
    fn download_package(
        &self,
        package_ref: &PackageReference,
        progress: ProgressFn<'_>,
    ) -> UhpmResult<Vec<u8>>;

    fn get_index(&self) -> UhpmResult<RepositoryIndex>;

    /// Drops cached index data and reloads it from the source.
    fn update_index(&self) -> UhpmResult<RepositoryIndex>;

    fn is_available(&self) -> bool;
}
