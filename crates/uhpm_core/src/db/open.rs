//! Opening `packages.db`.
//!
//! # Invariants
//! - Returned connections enforce foreign keys and are fully migrated.
//! - File databases run in WAL mode so a read-only command can run while
//!   another `uhpm` process holds the write lock.

use super::migrations::{apply_migrations, schema_version};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the database at `path`.
///
/// # Side effects
/// - Creates missing parent directories.
/// - Logs `event=db_open` with the schema version and steps applied.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    let result = create_parent(path)
        .and_then(|()| Connection::open(path).map_err(DbError::from))
        .and_then(|mut conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            prepare(&mut conn, started_at, &path.display().to_string())?;
            Ok(conn)
        });
    if let Err(err) = &result {
        error!(
            "event=db_open module=db status=error path={} duration_ms={} error={}",
            path.display(),
            started_at.elapsed().as_millis(),
            err
        );
    }
    result
}

/// Opens a private in-memory database with the full schema.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    let mut conn = Connection::open_in_memory()?;
    prepare(&mut conn, started_at, ":memory:")?;
    Ok(conn)
}

fn create_parent(path: &Path) -> DbResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|source| DbError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            }),
        _ => Ok(()),
    }
}

fn prepare(conn: &mut Connection, started_at: Instant, location: &str) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let applied = apply_migrations(conn)?;
    info!(
        "event=db_open module=db status=ok path={location} schema={} migrated={applied} duration_ms={}",
        schema_version(conn)?,
        started_at.elapsed().as_millis()
    );
    Ok(())
}
