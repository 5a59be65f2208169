use rusqlite::Connection;
use uhpm_core::db::migrations::{apply_migrations, latest_version, schema_version};
use uhpm_core::db::{open_db, open_db_in_memory, DbError};

const TABLES: [&str; 5] = [
    "packages",
    "dependencies",
    "installations",
    "installed_files",
    "symlinks",
];

fn tables(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}

#[test]
fn fresh_database_has_every_table() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let present = tables(&conn);
    for table in TABLES {
        assert!(present.iter().any(|name| name == table), "missing {table}");
    }
}

#[test]
fn open_db_creates_missing_parent_directories() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("nested/state/packages.db");

    open_db(&path).unwrap();

    assert!(path.is_file());
}

#[test]
fn reopening_runs_no_further_steps() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("packages.db");
    drop(open_db(&path).unwrap());

    let mut conn = Connection::open(&path).unwrap();
    assert_eq!(apply_migrations(&mut conn).unwrap(), 0);
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
}

#[test]
fn partially_migrated_file_resumes_at_the_next_step() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("packages.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(include_str!("../src/db/migrations/0001_packages.sql"))
            .unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
    }

    let conn = open_db(&path).unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert!(tables(&conn).iter().any(|name| name == "symlinks"));
}

#[test]
fn file_from_a_newer_uhpm_is_refused() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("packages.db");
    Connection::open(&path)
        .unwrap()
        .pragma_update(None, "user_version", 42)
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 42);
            assert_eq!(supported, latest_version());
        }
        other => panic!("expected SchemaTooNew, got {other}"),
    }
}

#[test]
fn dependency_rows_need_an_existing_package() {
    let conn = open_db_in_memory().unwrap();

    let result = conn.execute(
        "INSERT INTO dependencies (package_id, name, requirement, kind)
         VALUES ('ghost@1.0.0', 'lib', '*', 'required')",
        [],
    );

    let err = result.unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"), "{err}");
}
