//! Package manager use-cases.
//!
//! # Responsibility
//! - Install, remove, activate and switch package versions.
//! - Keep the package directory, the user-visible links and the database in
//!   step for every installed release.
//!
//! # Invariants
//! - Installed releases live in `<packages>/<name>@<version>`.
//! - At most one release per package name is active.
//! - A failed installation leaves neither a package directory nor database
//!   rows behind.
//! - Every state change is published as a `PackageEvent`.

use super::linker::{platform_supports_symlinks, Linker};
use crate::archive::{self, PACKAGE_EXTENSION};
use crate::cache::FileCache;
use crate::config::{InstallMode, UhpmConfig};
use crate::db::open_db;
use crate::error::{UhpmError, UhpmResult};
use crate::events::{EventBus, EventPublisher};
use crate::model::events::PackageEvent;
use crate::model::installation::{Installation, IntegrityReport};
use crate::model::operations::{InstallResult, RemovalResult, SwitchResult, UpdateCandidate};
use crate::model::package::{
    validate_package_name, Package, PackageReference, PackageRequest, PackageSource,
};
use crate::net;
use crate::paths::{default_link_root, HomePaths, UhpmPaths};
use crate::registry::set::SyncReport;
use crate::registry::RegistrySet;
use crate::repo::{
    InstallationStore, PackageListQuery, PackageStore, RepoError, SqliteInstallationStore,
    SqlitePackageStore,
};
use crate::resolver::{resolve_for_removal, DependencyResolver, ResolutionPlan};
use log::{error, info, warn};
use rusqlite::Connection;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub struct PackageManager {
    conn: Connection,
    paths: HomePaths,
    config: UhpmConfig,
    registries: RegistrySet,
    cache: FileCache,
    events: Arc<dyn EventPublisher>,
    link_root: PathBuf,
}

impl PackageManager {
    /// Opens the package manager rooted at `paths`.
    ///
    /// # Side effects
    /// - Creates the UHPM directory layout.
    /// - Opens and migrates `packages.db`.
    pub fn open(paths: HomePaths) -> UhpmResult<Self> {
        paths
            .create_directories()
            .map_err(UhpmError::io(paths.base_dir()))?;
        let config = UhpmConfig::load(&paths.config_path())?;
        let cache = FileCache::new(paths.cache_dir());
        let registries = RegistrySet::from_config(&config, &cache)?;
        let conn = open_db(paths.db_path())?;
        Self::from_parts(conn, paths, config, registries, Arc::new(EventBus::new()))
    }

    /// Assembles a manager from already opened parts.
    pub fn from_parts(
        conn: Connection,
        paths: HomePaths,
        config: UhpmConfig,
        registries: RegistrySet,
        events: Arc<dyn EventPublisher>,
    ) -> UhpmResult<Self> {
        SqlitePackageStore::try_new(&conn)?;
        SqliteInstallationStore::try_new(&conn)?;

        let link_root = match &config.link_root {
            Some(root) => root.clone(),
            None => default_link_root().ok_or(UhpmError::HomeDirUnavailable)?,
        };
        let cache = FileCache::new(paths.cache_dir());
        Ok(Self {
            conn,
            paths,
            config,
            registries,
            cache,
            events,
            link_root,
        })
    }

    pub fn paths(&self) -> &HomePaths {
        &self.paths
    }

    pub fn config(&self) -> &UhpmConfig {
        &self.config
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn link_root(&self) -> &Path {
        &self.link_root
    }

    /// Installs the newest release matching `request` plus its dependencies
    /// and activates it.
    pub fn install(&self, request: &PackageRequest) -> UhpmResult<InstallResult> {
        traced("package_install", &request.to_string(), || {
            let installed = self.installed_packages()?;
            let already_active = installed.iter().find(|package| {
                package.active && package.name == request.name && request.matches(&package.version)
            });
            if let Some(active) = already_active {
                return Err(UhpmError::AlreadyInstalled(active.id()));
            }

            let plan = DependencyResolver::new(&self.registries)
                .resolve_for_installation(request, &installed)?;
            self.install_plan(plan, &request.name, None)
        })
    }

    /// Installs a local `.uhp` archive; its dependencies come from the
    /// registries.
    pub fn install_archive(&self, path: &Path) -> UhpmResult<InstallResult> {
        traced("package_install_archive", &path.display().to_string(), || {
            let bytes = std::fs::read(path).map_err(UhpmError::io(path))?;
            let mut package = archive::read_meta_from_archive(&bytes)?.into_package(
                PackageSource::Local {
                    path: path.to_path_buf(),
                },
            )?;
            // meta.toml travels inside the archive and cannot checksum it.
            package.checksum = None;

            let installed = self.installed_packages()?;
            if let Some(existing) = installed.iter().find(|p| p.id() == package.id()) {
                return Err(UhpmError::AlreadyInstalled(existing.id()));
            }

            let root_name = package.name.clone();
            let plan = DependencyResolver::new(&self.registries).resolve_package(package, &installed)?;
            self.install_plan(plan, &root_name, Some(bytes))
        })
    }

    /// Removes an installed release; refuses while other installed packages
    /// depend on it unless `force` is set.
    pub fn remove(&self, package_ref: &PackageReference, force: bool) -> UhpmResult<RemovalResult> {
        traced("package_remove", &package_ref.to_string(), || {
            let package = self.installed_package(package_ref)?;
            let dependents = resolve_for_removal(package_ref, &self.installed_packages()?);
            if !dependents.is_empty() && !force {
                return Err(UhpmError::HasDependents {
                    package: package.id(),
                    dependents: dependents.iter().map(ToString::to_string).collect(),
                });
            }
            if !dependents.is_empty() {
                warn!(
                    "event=package_remove module=service status=start forced=true package={} dependents={}",
                    package_ref,
                    dependents.len()
                );
            }

            self.events.publish(PackageEvent::RemoveStarted {
                package_ref: package_ref.clone(),
            });

            let mut removed_files = 0;
            if package.active {
                removed_files += self.deactivate_package(&package)?;
            }

            let package_dir = self.package_dir(&package);
            let (file_count, freed_space) = dir_usage(&package_dir);
            match std::fs::remove_dir_all(&package_dir) {
                Ok(()) => removed_files += file_count,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(UhpmError::io(&package_dir)(err)),
            }
            self.packages()?.delete_package(&package.id())?;

            self.events.publish(PackageEvent::RemoveCompleted {
                package_ref: package_ref.clone(),
            });
            Ok(RemovalResult {
                package_id: package.id(),
                removed_files,
                freed_space,
            })
        })
    }

    /// Makes an installed release the active one for its name.
    pub fn activate(&self, package_ref: &PackageReference) -> UhpmResult<Installation> {
        traced("package_activate", &package_ref.to_string(), || {
            let package = self.installed_package(package_ref)?;
            if package.active {
                if let Some(installation) = self.installations()?.get_installation(&package.id())? {
                    return Ok(installation);
                }
            }
            self.activate_package(&package)
        })
    }

    /// Removes the user-visible links of an installed release; returns how
    /// many entries were removed.
    pub fn deactivate(&self, package_ref: &PackageReference) -> UhpmResult<usize> {
        traced("package_deactivate", &package_ref.to_string(), || {
            let package = self.installed_package(package_ref)?;
            if !package.active {
                return Ok(0);
            }
            self.deactivate_package(&package)
        })
    }

    /// Activates `name@version`, installing it first when needed. The
    /// previously active release stays installed.
    pub fn switch(&self, name: &str, version: &Version) -> UhpmResult<SwitchResult> {
        validate_package_name(name)?;
        let target = PackageReference::new(name, version.clone());
        traced("package_switch", &target.to_string(), || {
            let from_version = self.active_package(name)?.map(|package| package.version);
            if from_version.as_ref() == Some(version) {
                return Ok(SwitchResult {
                    package_name: name.to_string(),
                    from_version,
                    to_version: version.clone(),
                });
            }

            match self.packages()?.get_package(&target.id())? {
                Some(package) if package.installed => {
                    self.activate_package(&package)?;
                }
                _ => {
                    self.install(&PackageRequest::from(&target))?;
                }
            }

            Ok(SwitchResult {
                package_name: name.to_string(),
                from_version,
                to_version: version.clone(),
            })
        })
    }

    /// Switches `name` to the newest registry release; `None` when the
    /// installed release is already the newest.
    pub fn update(&self, name: &str) -> UhpmResult<Option<SwitchResult>> {
        validate_package_name(name)?;
        let current = match self.active_package(name)? {
            Some(package) => package,
            None => self
                .installed_packages()?
                .into_iter()
                .filter(|package| package.name == name)
                .max_by(|a, b| a.version.cmp(&b.version))
                .ok_or_else(|| UhpmError::NotInstalled(name.to_string()))?,
        };

        let latest = self.registries.latest_version(name)?;
        if latest <= current.version {
            info!(
                "event=package_update module=service status=ok package={} result=up_to_date",
                current.reference()
            );
            return Ok(None);
        }

        self.events.publish(PackageEvent::UpdateStarted {
            package_ref: current.reference(),
        });
        let result = self.switch(name, &latest)?;
        let updated = self.installed_package(&PackageReference::new(name, latest))?;
        self.events
            .publish(PackageEvent::UpdateCompleted { package: updated });
        Ok(Some(result))
    }

    /// Updates every package that has a newer registry release.
    pub fn update_all(&self) -> UhpmResult<Vec<SwitchResult>> {
        let mut results = Vec::new();
        for candidate in self.check_updates()? {
            if let Some(result) = self.update(&candidate.current.name)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Installed packages whose registries offer a newer release.
    pub fn check_updates(&self) -> UhpmResult<Vec<UpdateCandidate>> {
        if self.registries.is_empty() {
            return Ok(Vec::new());
        }

        let mut current: Vec<Package> = Vec::new();
        for package in self.installed_packages()? {
            match current.iter_mut().find(|existing| existing.name == package.name) {
                Some(existing) if package.active || (!existing.active && package.version > existing.version) => {
                    *existing = package;
                }
                Some(_) => {}
                None => current.push(package),
            }
        }

        let mut candidates = Vec::new();
        for package in current {
            let latest = match self.registries.latest_version(&package.name) {
                Ok(latest) => latest,
                Err(UhpmError::PackageNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if latest > package.version {
                candidates.push(UpdateCandidate {
                    current: package.reference(),
                    latest,
                });
            }
        }
        Ok(candidates)
    }

    /// Installed releases sorted by name, then version.
    pub fn list_installed(&self) -> UhpmResult<Vec<Package>> {
        self.installed_packages()
    }

    pub fn search(&self, query: &str) -> UhpmResult<Vec<Package>> {
        self.registries.search(query)
    }

    /// Describes the release matching `request`, preferring installed ones.
    pub fn info(&self, request: &PackageRequest) -> UhpmResult<Package> {
        let installed = self
            .packages()?
            .list_packages(&PackageListQuery {
                name: Some(request.name.clone()),
                installed_only: true,
                active_only: false,
            })?
            .into_iter()
            .filter(|package| request.matches(&package.version))
            .max_by(|a, b| a.active.cmp(&b.active).then_with(|| a.version.cmp(&b.version)));
        if let Some(package) = installed {
            return Ok(package);
        }

        let version = self
            .registries
            .latest_satisfying(&request.name, &request.requirement)?;
        self.registries
            .get_package(&PackageReference::new(request.name.clone(), version))
    }

    /// Compares an installed release with the filesystem.
    pub fn verify(&self, package_ref: &PackageReference) -> UhpmResult<IntegrityReport> {
        let package = self.installed_package(package_ref)?;
        let package_dir = self.package_dir(&package);
        let mut report = match self.installations()?.get_installation(&package.id())? {
            Some(installation) => installation.verify_integrity(),
            None => IntegrityReport::default(),
        };

        if !package_dir.is_dir() {
            report.missing.push(package_dir);
        } else {
            for entry in archive::load_instlist(&package_dir)? {
                let source = package_dir.join(&entry.source);
                if !source.exists() && !report.missing.contains(&source) {
                    report.missing.push(source);
                }
            }
        }

        info!(
            "event=package_verify module=service status={} package={} missing={} modified={}",
            if report.is_ok() { "ok" } else { "error" },
            package_ref,
            report.missing.len(),
            report.modified.len()
        );
        Ok(report)
    }

    /// Refreshes every registry index.
    pub fn sync_repositories(&self) -> Vec<SyncReport> {
        let reports = self.registries.update_indexes();
        for report in &reports {
            match &report.result {
                Ok(count) => info!(
                    "event=repository_sync module=service status=ok registry={} packages={}",
                    report.registry, count
                ),
                Err(err) => error!(
                    "event=repository_sync module=service status=error registry={} error={}",
                    report.registry, err
                ),
            }
        }
        reports
    }

    /// Drops cache entries older than `cache.max_age_days`; returns how many
    /// were removed.
    pub fn clean_cache(&self) -> UhpmResult<usize> {
        let max_age = Duration::from_secs(self.config.cache.max_age_days * SECONDS_PER_DAY);
        let removed = self
            .cache
            .cleanup_old_entries(max_age)
            .map_err(UhpmError::io(self.cache.root()))?;
        info!(
            "event=cache_clean module=service status=ok removed={} max_age_days={}",
            removed, self.config.cache.max_age_days
        );
        Ok(removed)
    }

    /// Drops every cached package archive.
    pub fn clear_cache(&self) -> UhpmResult<()> {
        self.cache
            .clear_packages()
            .map_err(UhpmError::io(self.cache.root()))
    }

    pub fn cache_size(&self) -> UhpmResult<u64> {
        self.cache
            .cache_size()
            .map_err(UhpmError::io(self.cache.root()))
    }

    fn install_plan(
        &self,
        plan: ResolutionPlan,
        root_name: &str,
        mut local_root: Option<Vec<u8>>,
    ) -> UhpmResult<InstallResult> {
        if !plan.conflicts.is_empty() {
            return Err(UhpmError::Conflicts(plan.conflicts));
        }

        for reference in plan
            .satisfied
            .iter()
            .cloned()
            .chain(plan.to_install.iter().map(Package::reference))
            .filter(|reference| reference.name != root_name)
        {
            self.events.publish(PackageEvent::DependencyResolved {
                dependency: reference.name.clone(),
                package_ref: reference,
            });
        }

        let mut root_id = None;
        let mut installed_packages = Vec::new();
        let mut exposed = Vec::new();
        for package in &plan.to_install {
            let local = if package.name == root_name {
                local_root.take()
            } else {
                None
            };
            let (installed, installation) = self.install_one(package, local)?;
            if installed.name == root_name {
                root_id = Some(installed.id());
            }
            installed_packages.push(installed.reference());
            exposed.push(installation);
        }

        // Installed but inactive dependencies are linked again, unless the
        // user has another release of that name active.
        for reference in plan.satisfied.iter().filter(|r| r.name != root_name) {
            let package = self.installed_package(reference)?;
            if !package.active && self.active_package(&package.name)?.is_none() {
                exposed.push(self.activate_package(&package)?);
            }
        }

        // The root may already be installed but inactive.
        if let Some(reference) = plan.satisfied.iter().find(|r| r.name == root_name) {
            let package = self.installed_package(reference)?;
            root_id = Some(package.id());
            if !package.active {
                exposed.push(self.activate_package(&package)?);
            }
        }

        let package_id = root_id.ok_or_else(|| UhpmError::PackageNotFound(root_name.to_string()))?;
        let mut result = InstallResult {
            package_id,
            installed_packages,
            installed_files: Vec::new(),
            symlinks_created: 0,
        };
        for installation in &exposed {
            record_exposure(&mut result, installation);
        }
        Ok(result)
    }

    fn install_one(
        &self,
        package: &Package,
        local: Option<Vec<u8>>,
    ) -> UhpmResult<(Package, Installation)> {
        let package_ref = package.reference();
        if let Some(existing) = self.packages()?.get_package(&package.id())? {
            if existing.installed {
                return Err(UhpmError::AlreadyInstalled(existing.id()));
            }
        }

        self.events.publish(PackageEvent::InstallationStarted {
            package_ref: package_ref.clone(),
        });
        let package_dir = self.package_dir(package);
        match self.unpack_and_record(package, local, &package_dir) {
            Ok((installed, installation)) => {
                self.events.publish(PackageEvent::InstallationCompleted {
                    package: installed.clone(),
                });
                Ok((installed, installation))
            }
            Err(err) => {
                self.rollback_install(package, &package_dir);
                self.events.publish(PackageEvent::InstallationFailed {
                    package_ref,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn unpack_and_record(
        &self,
        package: &Package,
        local: Option<Vec<u8>>,
        package_dir: &Path,
    ) -> UhpmResult<(Package, Installation)> {
        let bytes = match local {
            Some(bytes) => bytes,
            None => self.fetch_archive(package)?,
        };
        if let Some(checksum) = &package.checksum {
            net::verify_checksum(&package.source.location(), &bytes, checksum)?;
        }

        if package_dir.exists() {
            warn!(
                "event=package_unpack module=service status=start reason=stale_directory package={}",
                package.reference()
            );
            std::fs::remove_dir_all(package_dir).map_err(UhpmError::io(package_dir))?;
        }
        archive::unpack(&bytes, package_dir)?;

        let meta = archive::load_meta(package_dir)?;
        if meta.name != package.name || meta.version.trim() != package.version.to_string() {
            return Err(archive::ArchiveError::InvalidMeta(format!(
                "archive contains {}@{} instead of {}",
                meta.name,
                meta.version,
                package.reference()
            ))
            .into());
        }
        // Fail before touching the database when the instlist is unusable.
        archive::load_instlist(package_dir)?;

        let mut installed = package.clone();
        installed.mark_installed();
        installed.deactivate();
        self.packages()?.save_package(&installed)?;
        self.installations()?
            .save_installation(&Installation::new(installed.id(), self.install_mode()))?;

        let installation = self.activate_package(&installed)?;
        installed.activate();
        Ok((installed, installation))
    }

    fn rollback_install(&self, package: &Package, package_dir: &Path) {
        if let Err(err) = std::fs::remove_dir_all(package_dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "event=install_rollback module=service status=error package={} error={}",
                    package.reference(),
                    err
                );
            }
        }
        let deleted = self
            .packages()
            .and_then(|store| store.delete_package(&package.id()).map_err(UhpmError::from));
        match deleted {
            Ok(()) | Err(UhpmError::Repo(RepoError::NotFound(_))) => {}
            Err(err) => warn!(
                "event=install_rollback module=service status=error package={} error={}",
                package.reference(),
                err
            ),
        }
    }

    fn fetch_archive(&self, package: &Package) -> UhpmResult<Vec<u8>> {
        let package_ref = package.reference();
        self.events.publish(PackageEvent::DownloadStarted {
            package_ref: package_ref.clone(),
            size: None,
        });
        let events = &self.events;
        let mut progress = |downloaded: u64, total: Option<u64>| {
            events.publish(PackageEvent::DownloadProgress {
                package_ref: package_ref.clone(),
                downloaded,
                total,
            });
        };
        let bytes = self.registries.download_package(&package_ref, &mut progress)?;
        self.events
            .publish(PackageEvent::DownloadCompleted { package_ref });
        Ok(bytes)
    }

    /// Deactivates the other active release of the same name, then exposes
    /// `package`. The previous release is restored when exposing fails.
    fn activate_package(&self, package: &Package) -> UhpmResult<Installation> {
        let previous = self
            .active_package(&package.name)?
            .filter(|active| active.id() != package.id());
        if let Some(previous) = &previous {
            self.deactivate_package(previous)?;
        }

        match self.expose(package) {
            Ok(installation) => Ok(installation),
            Err(err) => {
                if let Some(previous) = previous {
                    if let Err(restore_err) = self.expose(&previous) {
                        error!(
                            "event=package_activate module=service status=error package={} restore_error={}",
                            previous.reference(),
                            restore_err
                        );
                    }
                }
                Err(err)
            }
        }
    }

    fn expose(&self, package: &Package) -> UhpmResult<Installation> {
        let id = package.id();
        let mode = self.install_mode();
        let installations = self.installations()?;
        let mut installation = installations
            .get_installation(&id)?
            .unwrap_or_else(|| Installation::new(id.clone(), mode));

        let package_dir = self.package_dir(package);
        let entries = archive::load_instlist(&package_dir)?;
        let packages_dir = self.paths.packages_dir();
        let other_active = self
            .packages()?
            .list_packages(&PackageListQuery {
                name: None,
                installed_only: true,
                active_only: true,
            })?
            .into_iter()
            .filter(|active| active.name != package.name)
            .map(|active| active.id().to_string());
        let linker = Linker::new(&packages_dir, &self.link_root).protect(other_active);
        let batch = linker.plan(&package_dir, &entries)?;

        installation.clear_exposed();
        installation.install_mode = mode;
        if mode == InstallMode::Symlink {
            for link in linker.link(&batch)? {
                installation.add_symlink(link);
            }
        } else {
            for file in linker.copy(&batch)? {
                installation.add_installed_file(file);
            }
        }
        installation.activate();

        let stored = installations
            .save_installation(&installation)
            .map_err(UhpmError::from)
            .and_then(|()| Ok(self.packages()?.set_active(&id, true)?));
        if let Err(err) = stored {
            linker.unexpose(&installation);
            return Err(err);
        }

        self.events.publish(PackageEvent::ActivationChanged {
            package_ref: package.reference(),
            active: true,
        });
        Ok(installation)
    }

    fn deactivate_package(&self, package: &Package) -> UhpmResult<usize> {
        let id = package.id();
        let installations = self.installations()?;
        let mut removed = 0;
        if let Some(mut installation) = installations.get_installation(&id)? {
            let packages_dir = self.paths.packages_dir();
            removed = Linker::new(&packages_dir, &self.link_root).unexpose(&installation);
            installation.clear_exposed();
            installation.deactivate();
            installations.save_installation(&installation)?;
        }
        self.packages()?.set_active(&id, false)?;

        self.events.publish(PackageEvent::ActivationChanged {
            package_ref: package.reference(),
            active: false,
        });
        Ok(removed)
    }

    fn install_mode(&self) -> InstallMode {
        if self
            .config
            .default_install_mode
            .should_use_symlinks(platform_supports_symlinks())
        {
            InstallMode::Symlink
        } else {
            InstallMode::Direct
        }
    }

    fn installed_package(&self, package_ref: &PackageReference) -> UhpmResult<Package> {
        match self.packages()?.get_package(&package_ref.id())? {
            Some(package) if package.installed => Ok(package),
            _ => Err(UhpmError::NotInstalled(package_ref.to_string())),
        }
    }

    fn installed_packages(&self) -> UhpmResult<Vec<Package>> {
        Ok(self.packages()?.list_packages(&PackageListQuery::installed())?)
    }

    fn active_package(&self, name: &str) -> UhpmResult<Option<Package>> {
        Ok(self
            .packages()?
            .list_packages(&PackageListQuery {
                name: Some(name.to_string()),
                installed_only: true,
                active_only: true,
            })?
            .pop())
    }

    fn package_dir(&self, package: &Package) -> PathBuf {
        self.paths.package_dir(&package.name, &package.version)
    }

    fn packages(&self) -> UhpmResult<SqlitePackageStore<'_>> {
        Ok(SqlitePackageStore::try_new(&self.conn)?)
    }

    fn installations(&self) -> UhpmResult<SqliteInstallationStore<'_>> {
        Ok(SqliteInstallationStore::try_new(&self.conn)?)
    }
}

/// Whether `path` looks like a package archive.
pub fn is_package_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

fn record_exposure(result: &mut InstallResult, installation: &Installation) {
    result.symlinks_created += installation.symlinks.len();
    result
        .installed_files
        .extend(installation.symlinks.iter().map(|link| link.target.clone()));
    result.installed_files.extend(
        installation
            .installed_files
            .values()
            .filter(|file| !file.is_directory())
            .map(|file| file.path.clone()),
    );
}

/// Regular file count and total size under `dir`; symlinks are not followed.
fn dir_usage(dir: &Path) -> (usize, u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, 0);
    };
    let mut files = 0;
    let mut bytes = 0;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.path().symlink_metadata() else {
            continue;
        };
        if metadata.is_dir() {
            let (nested_files, nested_bytes) = dir_usage(&entry.path());
            files += nested_files;
            bytes += nested_bytes;
        } else {
            files += 1;
            bytes += metadata.len();
        }
    }
    (files, bytes)
}

fn traced<T>(event: &'static str, subject: &str, op: impl FnOnce() -> UhpmResult<T>) -> UhpmResult<T> {
    let started_at = Instant::now();
    info!("event={event} module=service status=start subject={subject}");
    let result = op();
    match &result {
        Ok(_) => info!(
            "event={event} module=service status=ok subject={subject} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={event} module=service status=error subject={subject} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}
