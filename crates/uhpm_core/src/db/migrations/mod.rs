//! Ordered schema steps for `packages.db`.
//!
//! # Invariants
//! - `STEPS` versions start at 1 and grow by exactly one.
//! - Each step runs in its own immediate transaction together with the
//!   `PRAGMA user_version` bump, so an interrupted upgrade resumes at the
//!   first step that did not commit.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "packages",
        sql: include_str!("0001_packages.sql"),
    },
    Step {
        version: 2,
        name: "installations",
        sql: include_str!("0002_installations.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings `conn` up to `latest_version()`; returns how many steps ran.
///
/// # Errors
/// - `SchemaTooNew` when the file is ahead of this build.
/// - `Migration` naming the step that failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let mut applied = 0;
    for step in STEPS.iter().filter(|step| step.version > found) {
        run_step(conn, step).map_err(|source| DbError::Migration {
            version: step.version,
            name: step.name,
            source,
        })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
        applied += 1;
    }
    Ok(applied)
}

fn run_step(conn: &mut Connection, step: &Step) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)?;
    tx.commit()
}
