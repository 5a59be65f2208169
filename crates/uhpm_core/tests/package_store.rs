mod support;

use semver::{Version, VersionReq};
use support::installed;
use uhpm_core::db::open_db_in_memory;
use uhpm_core::model::dependency::Dependency;
use uhpm_core::model::package::{Checksum, PackageId, PackageSource};
use uhpm_core::repo::{PackageListQuery, PackageStore, RepoError, SqlitePackageStore};
use uhpm_core::Package;

#[test]
fn save_and_get_round_trip_keeps_dependencies() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let mut package = installed("editor", "2.1.0", true);
    package.description = Some("terminal editor".to_string());
    package.checksum = Some(Checksum::sha256("ab".repeat(32)));
    package.provides = vec!["vi".to_string()];
    package.conflicts = vec!["nano".to_string()];
    package.dependencies = vec![
        Dependency::required("libterm", VersionReq::parse("^1.2").unwrap()),
        Dependency::required("base", VersionReq::STAR),
    ];
    store.save_package(&package).unwrap();

    let loaded = store.get_package(&package.id()).unwrap().unwrap();
    assert_eq!(loaded.description.as_deref(), Some("terminal editor"));
    assert_eq!(loaded.provides, vec!["vi"]);
    assert_eq!(loaded.conflicts, vec!["nano"]);
    assert_eq!(loaded.checksum, package.checksum);
    assert!(loaded.installed && loaded.active);

    let names: Vec<&str> = loaded.dependencies.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["base", "libterm"]);
}

#[test]
fn saving_again_replaces_dependency_rows() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let mut package = installed("tool", "1.0.0", false);
    package.dependencies = vec![Dependency::required("old", VersionReq::STAR)];
    store.save_package(&package).unwrap();

    package.dependencies = vec![Dependency::required("new", VersionReq::STAR)];
    store.save_package(&package).unwrap();

    let loaded = store.get_package(&package.id()).unwrap().unwrap();
    assert_eq!(loaded.dependencies.len(), 1);
    assert_eq!(loaded.dependencies[0].name, "new");
}

#[test]
fn git_sources_keep_their_release() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let package = Package::new(
        "fetcher",
        Version::new(0, 3, 0),
        "tester",
        PackageSource::Git {
            url: "https://example.com/fetcher.git".to_string(),
            release: Some("v0.3.0".to_string()),
        },
    );
    store.save_package(&package).unwrap();

    let loaded = store.get_package(&package.id()).unwrap().unwrap();
    assert_eq!(loaded.source, package.source);
    assert!(!loaded.installed);
}

#[test]
fn only_one_version_per_name_stays_active() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let old = installed("tool", "1.0.0", true);
    let new = installed("tool", "2.0.0", false);
    let other = installed("other", "1.0.0", true);
    store.save_package(&old).unwrap();
    store.save_package(&new).unwrap();
    store.save_package(&other).unwrap();

    store.set_active(&new.id(), true).unwrap();

    let active = store
        .list_packages(&PackageListQuery {
            active_only: true,
            ..PackageListQuery::default()
        })
        .unwrap();
    let ids: Vec<String> = active.iter().map(|p| p.id().to_string()).collect();
    assert_eq!(ids, vec!["other@1.0.0", "tool@2.0.0"]);
}

#[test]
fn saving_an_active_version_deactivates_its_siblings() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    store.save_package(&installed("tool", "1.0.0", true)).unwrap();
    store.save_package(&installed("tool", "1.1.0", true)).unwrap();

    let old = store
        .get_package(&PackageId::new("tool", &Version::new(1, 0, 0)))
        .unwrap()
        .unwrap();
    assert!(!old.active);
}

#[test]
fn list_filters_by_name_and_sorts_versions() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    for version in ["1.10.0", "1.2.0", "1.9.3"] {
        store.save_package(&installed("tool", version, false)).unwrap();
    }
    store.save_package(&installed("zeta", "1.0.0", false)).unwrap();

    let versions: Vec<String> = store
        .list_packages(&PackageListQuery::named("tool"))
        .unwrap()
        .iter()
        .map(|p| p.version.to_string())
        .collect();
    assert_eq!(versions, vec!["1.2.0", "1.9.3", "1.10.0"]);

    let all = store.list_packages(&PackageListQuery::installed()).unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn activating_an_uninstalled_record_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let mut package = installed("tool", "1.0.0", false);
    package.mark_removed();
    store.save_package(&package).unwrap();

    let err = store.set_active(&package.id(), true).unwrap_err();
    assert!(matches!(err, RepoError::NotInstalled(_)), "{err}");
}

#[test]
fn missing_records_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();
    let id = PackageId::new("ghost", &Version::new(1, 0, 0));

    assert!(store.get_package(&id).unwrap().is_none());
    assert!(matches!(
        store.set_active(&id, true).unwrap_err(),
        RepoError::NotFound(_)
    ));
    assert!(matches!(
        store.delete_package(&id).unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[test]
fn invalid_packages_are_not_persisted() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();

    let package = installed("Bad Name", "1.0.0", false);
    let err = store.save_package(&package).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)), "{err}");
    assert!(store
        .list_packages(&PackageListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn rows_that_no_longer_validate_are_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let store = SqlitePackageStore::try_new(&conn).unwrap();
    store.save_package(&installed("tool", "1.0.0", false)).unwrap();
    conn.execute(
        "UPDATE packages SET id = 'Bad Name@1.0.0', name = 'Bad Name' WHERE id = 'tool@1.0.0'",
        [],
    )
    .unwrap();

    let err = store
        .get_package(&PackageId::new("Bad Name", &Version::new(1, 0, 0)))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)), "{err}");
    assert!(matches!(
        store.list_packages(&PackageListQuery::default()).unwrap_err(),
        RepoError::InvalidData(_)
    ));
}

#[test]
fn try_new_requires_migrated_tables() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let err = SqlitePackageStore::try_new(&conn).err().unwrap();
    assert!(matches!(err, RepoError::MissingRequiredTable("packages")), "{err}");
}
