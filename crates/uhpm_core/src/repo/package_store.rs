//! Package repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist package records and their dependency lists.
//! - Maintain the "one active version per package name" rule.
//!
//! # Invariants
//! - `save_package` rewrites the dependency rows in the same transaction as
//!   the package row.
//! - At most one row per `name` has `active = 1`.
//! - Read paths reject invalid persisted state instead of masking it.

use super::{
    ensure_tables, join_list, parse_bool, split_list, RepoError, RepoResult,
};
use crate::model::dependency::{Dependency, DependencyKind, VersionConstraint};
use crate::model::package::{Checksum, Package, PackageId, PackageSource};
use crate::model::target::Target;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use semver::{Version, VersionReq};
use std::path::PathBuf;

const PACKAGE_SELECT_SQL: &str = "SELECT
    id,
    name,
    version,
    author,
    description,
    source_type,
    source_location,
    source_release,
    target_os,
    target_arch,
    checksum_algorithm,
    checksum_hash,
    provides,
    conflicts,
    installed,
    active
FROM packages";

/// Filters for listing stored packages.
#[derive(Debug, Clone, Default)]
pub struct PackageListQuery {
    /// Exact package name.
    pub name: Option<String>,
    pub installed_only: bool,
    pub active_only: bool,
}

impl PackageListQuery {
    pub fn installed() -> Self {
        Self {
            installed_only: true,
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Repository interface for package records.
pub trait PackageStore {
    /// Inserts or replaces a package and its dependency list.
    fn save_package(&self, package: &Package) -> RepoResult<()>;
    fn get_package(&self, id: &PackageId) -> RepoResult<Option<Package>>;
    /// Lists packages ordered by name, then ascending version.
    fn list_packages(&self, query: &PackageListQuery) -> RepoResult<Vec<Package>>;
    /// Marks one release active, deactivating every other release of the same name.
    fn set_active(&self, id: &PackageId, active: bool) -> RepoResult<()>;
    fn delete_package(&self, id: &PackageId) -> RepoResult<()>;
}

/// SQLite-backed package repository.
pub struct SqlitePackageStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePackageStore<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["packages", "dependencies"])?;
        Ok(Self { conn })
    }
}

impl PackageStore for SqlitePackageStore<'_> {
    fn save_package(&self, package: &Package) -> RepoResult<()> {
        package.validate()?;
        let id = package.id();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let (source_release, source_location) = match &package.source {
            PackageSource::Git { url, release } => (release.as_deref(), url.clone()),
            PackageSource::Http { url } => (None, url.clone()),
            PackageSource::Local { path } => (None, path.display().to_string()),
        };

        tx.execute(
            "INSERT INTO packages (
                id,
                name,
                version,
                author,
                description,
                source_type,
                source_location,
                source_release,
                target_os,
                target_arch,
                checksum_algorithm,
                checksum_hash,
                provides,
                conflicts,
                installed,
                active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT (id) DO UPDATE SET
                author = excluded.author,
                description = excluded.description,
                source_type = excluded.source_type,
                source_location = excluded.source_location,
                source_release = excluded.source_release,
                target_os = excluded.target_os,
                target_arch = excluded.target_arch,
                checksum_algorithm = excluded.checksum_algorithm,
                checksum_hash = excluded.checksum_hash,
                provides = excluded.provides,
                conflicts = excluded.conflicts,
                installed = excluded.installed,
                active = excluded.active,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                id.as_str(),
                package.name.as_str(),
                package.version.to_string(),
                package.author.as_str(),
                package.description.as_deref(),
                package.source.kind(),
                source_location,
                source_release,
                package.target.os.as_str(),
                package.target.arch.as_str(),
                package.checksum.as_ref().map(|c| c.algorithm.as_str()),
                package.checksum.as_ref().map(|c| c.hash.as_str()),
                join_list(&package.provides),
                join_list(&package.conflicts),
                package.installed,
                package.active,
            ],
        )?;

        if package.active {
            tx.execute(
                "UPDATE packages
                 SET active = 0,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE name = ?1 AND id <> ?2 AND active = 1;",
                params![package.name.as_str(), id.as_str()],
            )?;
        }

        tx.execute(
            "DELETE FROM dependencies WHERE package_id = ?1;",
            [id.as_str()],
        )?;
        for dependency in &package.dependencies {
            tx.execute(
                "INSERT INTO dependencies (package_id, name, requirement, kind, provides, features)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    id.as_str(),
                    dependency.name.as_str(),
                    dependency.constraint.requirement.to_string(),
                    dependency.kind.as_str(),
                    dependency.provides.as_deref(),
                    join_list(&dependency.features),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_package(&self, id: &PackageId) -> RepoResult<Option<Package>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PACKAGE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            let mut package = parse_package_row(row)?;
            package.dependencies = load_dependencies(self.conn, id)?;
            return Ok(Some(package));
        }
        Ok(None)
    }

    fn list_packages(&self, query: &PackageListQuery) -> RepoResult<Vec<Package>> {
        let mut sql = format!("{PACKAGE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(name) = &query.name {
            sql.push_str(" AND name = ?");
            bind_values.push(Value::Text(name.clone()));
        }
        if query.installed_only {
            sql.push_str(" AND installed = 1");
        }
        if query.active_only {
            sql.push_str(" AND active = 1");
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut packages = Vec::new();
        while let Some(row) = rows.next()? {
            packages.push(parse_package_row(row)?);
        }

        for package in &mut packages {
            package.dependencies = load_dependencies(self.conn, &package.id())?;
        }
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(packages)
    }

    fn set_active(&self, id: &PackageId, active: bool) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let row: Option<(String, i64)> = tx
            .query_row(
                "SELECT name, installed FROM packages WHERE id = ?1;",
                [id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, installed)) = row else {
            return Err(RepoError::NotFound(id.to_string()));
        };

        if active {
            if !parse_bool(installed, "packages.installed")? {
                return Err(RepoError::NotInstalled(id.to_string()));
            }
            tx.execute(
                "UPDATE packages
                 SET active = 0,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE name = ?1 AND id <> ?2 AND active = 1;",
                params![name, id.as_str()],
            )?;
        }

        tx.execute(
            "UPDATE packages
             SET active = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![active, id.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_package(&self, id: &PackageId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM packages WHERE id = ?1;", [id.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn load_dependencies(conn: &Connection, id: &PackageId) -> RepoResult<Vec<Dependency>> {
    let mut stmt = conn.prepare(
        "SELECT name, requirement, kind, provides, features
         FROM dependencies
         WHERE package_id = ?1
         ORDER BY name ASC;",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut dependencies = Vec::new();
    while let Some(row) = rows.next()? {
        dependencies.push(parse_dependency_row(row)?);
    }
    Ok(dependencies)
}

fn parse_dependency_row(row: &Row<'_>) -> RepoResult<Dependency> {
    let requirement_text: String = row.get("requirement")?;
    let requirement = VersionReq::parse(&requirement_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid requirement `{requirement_text}` in dependencies.requirement"
        ))
    })?;
    let kind_text: String = row.get("kind")?;
    let kind = DependencyKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid kind `{kind_text}` in dependencies.kind"))
    })?;
    let features_text: String = row.get("features")?;

    Ok(Dependency {
        name: row.get("name")?,
        constraint: VersionConstraint::new(requirement),
        kind,
        provides: row.get("provides")?,
        features: split_list(&features_text),
    })
}

fn parse_package_row(row: &Row<'_>) -> RepoResult<Package> {
    let id_text: String = row.get("id")?;
    let version_text: String = row.get("version")?;
    let version = Version::parse(&version_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid version `{version_text}` in packages.version ({id_text})"
        ))
    })?;

    let source_type: String = row.get("source_type")?;
    let location: String = row.get("source_location")?;
    let release: Option<String> = row.get("source_release")?;
    let source = parse_source(&source_type, location, release).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid source type `{source_type}` in packages.source_type ({id_text})"
        ))
    })?;

    let target_os: String = row.get("target_os")?;
    let target_arch: String = row.get("target_arch")?;

    let checksum = match (
        row.get::<_, Option<String>>("checksum_algorithm")?,
        row.get::<_, Option<String>>("checksum_hash")?,
    ) {
        (Some(algorithm), Some(hash)) => Some(Checksum { algorithm, hash }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "checksum algorithm and hash must be set together ({id_text})"
            )));
        }
    };

    let provides: String = row.get("provides")?;
    let conflicts: String = row.get("conflicts")?;

    let package = Package {
        name: row.get("name")?,
        version,
        author: row.get("author")?,
        description: row.get("description")?,
        source,
        target: Target::from_meta(Some(&target_os), Some(&target_arch)),
        checksum,
        dependencies: Vec::new(),
        provides: split_list(&provides),
        conflicts: split_list(&conflicts),
        installed: parse_bool(row.get("installed")?, "packages.installed")?,
        active: parse_bool(row.get("active")?, "packages.active")?,
    };
    package
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("stored package `{id_text}`: {err}")))?;

    if package.id().as_str() != id_text {
        return Err(RepoError::InvalidData(format!(
            "package id `{id_text}` does not match name and version"
        )));
    }
    Ok(package)
}

fn parse_source(kind: &str, location: String, release: Option<String>) -> Option<PackageSource> {
    match kind {
        "git" => Some(PackageSource::Git {
            url: location,
            release,
        }),
        "http" => Some(PackageSource::Http { url: location }),
        "local" => Some(PackageSource::Local {
            path: PathBuf::from(location),
        }),
        _ => None,
    }
}
