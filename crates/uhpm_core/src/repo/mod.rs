//! SQLite-backed stores for package records and installations.
//!
//! `SqlitePackageStore` owns `packages` and `dependencies`;
//! `SqliteInstallationStore` owns `installations`, `installed_files` and
//! `symlinks`. The package manager talks to both through their traits so
//! tests can run against an in-memory database.
//!
//! # Invariants
//! - A package row is only written after `Package::validate()` passes.
//! - Rows that fail to decode surface as `RepoError::InvalidData`, never
//!   as silently defaulted values.

use crate::db::DbError;
use crate::model::package::PackageValidationError;
use crate::model::symlink::SymlinkValidationError;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod installation_store;
pub mod package_store;

pub use installation_store::{InstallationStore, SqliteInstallationStore};
pub use package_store::{PackageListQuery, PackageStore, SqlitePackageStore};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by package and installation storage.
#[derive(Debug)]
pub enum RepoError {
    Validation(PackageValidationError),
    InvalidSymlink(SymlinkValidationError),
    Db(DbError),
    NotFound(String),
    NotInstalled(String),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidSymlink(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::NotInstalled(id) => write!(f, "package is not installed: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "database is missing required table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidSymlink(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_)
            | Self::NotInstalled(_)
            | Self::InvalidData(_)
            | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<PackageValidationError> for RepoError {
    fn from(value: PackageValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<SymlinkValidationError> for RepoError {
    fn from(value: SymlinkValidationError) -> Self {
        Self::InvalidSymlink(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        DbError::from(value).into()
    }
}

/// Fails with the first of `tables` the schema lacks.
fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    let mut stmt =
        conn.prepare_cached("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    for table in tables {
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        if count == 0 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn datetime_to_db(value: &DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

fn parse_datetime(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value).single().ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}"))
    })
}

/// Joins list values into one text column; empty lists become `''`.
fn join_list(values: &[String]) -> String {
    values.join(",")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
