//! Installation records: which files and links each installed package owns.
//!
//! # Invariants
//! - One installation row per package id.
//! - `save_installation` replaces the file and symlink rows atomically.

use super::{
    datetime_to_db, ensure_tables, parse_bool, parse_datetime, RepoError, RepoResult,
};
use crate::config::InstallMode;
use crate::model::file_metadata::{FileChecksum, FileMetadata, FilePermissions, FileType};
use crate::model::installation::{Installation, InstallationId};
use crate::model::package::PackageId;
use crate::model::symlink::{Symlink, SymlinkMetadata, SymlinkType};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Repository interface for installation records.
pub trait InstallationStore {
    fn save_installation(&self, installation: &Installation) -> RepoResult<()>;
    fn get_installation(&self, package_id: &PackageId) -> RepoResult<Option<Installation>>;
    fn set_installation_active(&self, package_id: &PackageId, active: bool) -> RepoResult<()>;
    fn delete_installation(&self, package_id: &PackageId) -> RepoResult<()>;
}

/// SQLite-backed installation repository.
pub struct SqliteInstallationStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInstallationStore<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["installations", "installed_files", "symlinks"])?;
        Ok(Self { conn })
    }
}

impl InstallationStore for SqliteInstallationStore<'_> {
    fn save_installation(&self, installation: &Installation) -> RepoResult<()> {
        for link in &installation.symlinks {
            link.validate()?;
        }

        let id_text = installation.id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        // Cascades to installed_files and symlinks.
        tx.execute(
            "DELETE FROM installations WHERE id = ?1 OR package_id = ?2;",
            params![id_text.as_str(), installation.package_id.as_str()],
        )?;
        tx.execute(
            "INSERT INTO installations (id, package_id, install_mode, installed_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id_text.as_str(),
                installation.package_id.as_str(),
                installation.install_mode.as_str(),
                datetime_to_db(&installation.installed_at),
                installation.active,
            ],
        )?;

        for metadata in installation.installed_files.values() {
            tx.execute(
                "INSERT INTO installed_files (
                    installation_id,
                    path,
                    size,
                    checksum_algorithm,
                    checksum_hash,
                    file_type,
                    readable,
                    writable,
                    executable,
                    created_at,
                    modified_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    id_text.as_str(),
                    metadata.path.to_string_lossy(),
                    i64::try_from(metadata.size).unwrap_or(i64::MAX),
                    metadata.checksum.as_ref().map(|c| c.algorithm.as_str()),
                    metadata.checksum.as_ref().map(|c| c.hash.as_str()),
                    metadata.file_type.as_str(),
                    metadata.permissions.read,
                    metadata.permissions.write,
                    metadata.permissions.execute,
                    datetime_to_db(&metadata.created_at),
                    datetime_to_db(&metadata.modified_at),
                ],
            )?;
        }

        for link in &installation.symlinks {
            tx.execute(
                "INSERT INTO symlinks (installation_id, source, target, link_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    id_text.as_str(),
                    link.source.to_string_lossy(),
                    link.target.to_string_lossy(),
                    link.link_type.as_str(),
                    datetime_to_db(&link.metadata.created_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_installation(&self, package_id: &PackageId) -> RepoResult<Option<Installation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, package_id, install_mode, installed_at, active
             FROM installations
             WHERE package_id = ?1;",
        )?;
        let mut rows = stmt.query([package_id.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut installation = parse_installation_row(row, package_id)?;
        let id_text = installation.id.to_string();
        installation.installed_files = load_installed_files(self.conn, &id_text)?;
        installation.symlinks = load_symlinks(self.conn, &id_text)?;
        Ok(Some(installation))
    }

    fn set_installation_active(&self, package_id: &PackageId, active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE installations SET active = ?1 WHERE package_id = ?2;",
            params![active, package_id.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(package_id.to_string()));
        }
        Ok(())
    }

    fn delete_installation(&self, package_id: &PackageId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM installations WHERE package_id = ?1;",
            [package_id.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(package_id.to_string()));
        }
        Ok(())
    }
}

fn parse_installation_row(row: &Row<'_>, package_id: &PackageId) -> RepoResult<Installation> {
    let id_text: String = row.get("id")?;
    let id = InstallationId::parse(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in installations.id"))
    })?;

    let mode_text: String = row.get("install_mode")?;
    let install_mode = InstallMode::parse(&mode_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid install mode `{mode_text}` in installations.install_mode"
        ))
    })?;

    Ok(Installation {
        id,
        package_id: package_id.clone(),
        install_mode,
        installed_files: BTreeMap::new(),
        symlinks: Vec::new(),
        installed_at: parse_datetime(row.get("installed_at")?, "installations.installed_at")?,
        active: parse_bool(row.get("active")?, "installations.active")?,
    })
}

fn load_installed_files(
    conn: &Connection,
    installation_id: &str,
) -> RepoResult<BTreeMap<PathBuf, FileMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT
            path,
            size,
            checksum_algorithm,
            checksum_hash,
            file_type,
            readable,
            writable,
            executable,
            created_at,
            modified_at
         FROM installed_files
         WHERE installation_id = ?1
         ORDER BY path ASC;",
    )?;
    let mut rows = stmt.query([installation_id])?;
    let mut files = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let metadata = parse_file_row(row)?;
        files.insert(metadata.path.clone(), metadata);
    }
    Ok(files)
}

fn parse_file_row(row: &Row<'_>) -> RepoResult<FileMetadata> {
    let path = PathBuf::from(row.get::<_, String>("path")?);
    let size: i64 = row.get("size")?;
    let size = u64::try_from(size).map_err(|_| {
        RepoError::InvalidData(format!("negative size `{size}` in installed_files.size"))
    })?;

    let type_text: String = row.get("file_type")?;
    let file_type = FileType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid file type `{type_text}` in installed_files.file_type"
        ))
    })?;

    let checksum = match (
        row.get::<_, Option<String>>("checksum_algorithm")?,
        row.get::<_, Option<String>>("checksum_hash")?,
    ) {
        (Some(algorithm), Some(hash)) => Some(FileChecksum { algorithm, hash }),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "checksum algorithm and hash must be set together for `{}`",
                path.display()
            )));
        }
    };

    Ok(FileMetadata {
        size,
        checksum,
        permissions: FilePermissions {
            read: parse_bool(row.get("readable")?, "installed_files.readable")?,
            write: parse_bool(row.get("writable")?, "installed_files.writable")?,
            execute: parse_bool(row.get("executable")?, "installed_files.executable")?,
        },
        created_at: parse_datetime(row.get("created_at")?, "installed_files.created_at")?,
        modified_at: parse_datetime(row.get("modified_at")?, "installed_files.modified_at")?,
        file_type,
        path,
    })
}

fn load_symlinks(conn: &Connection, installation_id: &str) -> RepoResult<Vec<Symlink>> {
    let mut stmt = conn.prepare(
        "SELECT source, target, link_type, created_at
         FROM symlinks
         WHERE installation_id = ?1
         ORDER BY target ASC;",
    )?;
    let mut rows = stmt.query([installation_id])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        let type_text: String = row.get("link_type")?;
        let link_type = SymlinkType::parse(&type_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid link type `{type_text}` in symlinks.link_type"
            ))
        })?;
        let metadata = SymlinkMetadata {
            created_at: parse_datetime(row.get("created_at")?, "symlinks.created_at")?,
            ..SymlinkMetadata::default()
        };
        links.push(
            Symlink::new(
                row.get::<_, String>("source")?,
                row.get::<_, String>("target")?,
                link_type,
            )
            .with_metadata(metadata),
        );
    }
    Ok(links)
}
