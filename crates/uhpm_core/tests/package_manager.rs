mod support;

use semver::Version;
use std::path::PathBuf;
use std::sync::Arc;
use support::{local_registry, Release};
use uhpm_core::archive::pack_directory;
use uhpm_core::db::open_db_in_memory;
use uhpm_core::service::is_package_archive;
use uhpm_core::{
    EventBus, HomePaths, InstallMode, PackageEvent, PackageManager, PackageReference,
    PackageRequest, RegistrySet, UhpmConfig, UhpmError, UhpmPaths,
};

struct Fixture {
    dir: tempfile::TempDir,
    events: Arc<EventBus>,
    manager: PackageManager,
}

impl Fixture {
    fn new(mode: InstallMode) -> Self {
        Self::with_registries(mode, true)
    }

    fn with_registries(mode: InstallMode, with_local: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = HomePaths::at(dir.path().join("home"));
        paths.create_directories().unwrap();
        let config = UhpmConfig {
            default_install_mode: mode,
            link_root: Some(dir.path().join("links")),
            ..UhpmConfig::default()
        };
        let mut registries = RegistrySet::new();
        if with_local {
            registries.push(Box::new(local_registry(&dir.path().join("repo"))));
        }
        let events = Arc::new(EventBus::new());
        let manager = PackageManager::from_parts(
            open_db_in_memory().unwrap(),
            paths,
            config,
            registries,
            events.clone(),
        )
        .unwrap();
        Self {
            dir,
            events,
            manager,
        }
    }

    fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    fn link(&self, relative: &str) -> PathBuf {
        self.dir.path().join("links").join(relative)
    }

    fn publish(&self, release: Release) {
        release.publish(&self.repo());
    }

    fn install(&self, spec: &str) -> uhpm_core::InstallResult {
        self.manager
            .install(&PackageRequest::parse(spec).unwrap())
            .unwrap()
    }

    fn active_ids(&self) -> Vec<String> {
        self.manager
            .list_installed()
            .unwrap()
            .iter()
            .filter(|package| package.active)
            .map(|package| package.id().to_string())
            .collect()
    }

    fn event_names(&self) -> Vec<&'static str> {
        self.events
            .history(usize::MAX)
            .iter()
            .map(PackageEvent::name)
            .collect()
    }
}

fn reference(name: &str, version: &str) -> PackageReference {
    PackageReference::new(name, Version::parse(version).unwrap())
}

fn tool(version: &str) -> Release {
    Release::new("tool", version).exposed("bin/tool", &format!("tool {version}"), "bin/tool")
}

#[cfg(unix)]
#[test]
fn install_links_the_package_and_its_dependencies() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(
        Release::new("app", "1.0.0")
            .depends("libcore@^1")
            .exposed("bin/app", "app", "bin/app"),
    );
    fx.publish(Release::new("libcore", "1.3.0").exposed("lib/core.so", "core", "lib/libcore.so"));

    let result = fx.install("app");

    assert_eq!(result.package_id.to_string(), "app@1.0.0");
    assert_eq!(
        result.installed_packages,
        vec![reference("libcore", "1.3.0"), reference("app", "1.0.0")]
    );
    assert_eq!(result.symlinks_created, 2);

    let app_link = fx.link("bin/app");
    let points_to = std::fs::read_link(&app_link).unwrap();
    assert!(points_to.starts_with(fx.manager.paths().packages_dir()));
    assert_eq!(std::fs::read_to_string(&app_link).unwrap(), "app");
    assert_eq!(
        std::fs::read_to_string(fx.link("lib/libcore.so")).unwrap(),
        "core"
    );
    assert_eq!(fx.active_ids(), vec!["app@1.0.0", "libcore@1.3.0"]);

    let names = fx.event_names();
    for expected in [
        "dependency_resolved",
        "download_started",
        "installation_started",
        "activation_changed",
        "installation_completed",
    ] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[cfg(unix)]
#[test]
fn inactive_dependencies_are_linked_again() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(Release::new("libcore", "1.3.0").exposed("lib/core.so", "core", "lib/libcore.so"));
    fx.publish(
        Release::new("app", "1.0.0")
            .depends("libcore@^1")
            .exposed("bin/app", "app", "bin/app"),
    );
    fx.install("libcore");
    fx.manager.deactivate(&reference("libcore", "1.3.0")).unwrap();

    let result = fx.install("app");

    assert_eq!(result.installed_packages, vec![reference("app", "1.0.0")]);
    assert_eq!(fx.active_ids(), vec!["app@1.0.0", "libcore@1.3.0"]);
    assert_eq!(std::fs::read_to_string(fx.link("lib/libcore.so")).unwrap(), "core");
}

#[cfg(unix)]
#[test]
fn satisfied_dependency_does_not_displace_the_active_release() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(Release::new("libcore", "1.3.0").exposed("lib/core.so", "core 1", "lib/libcore.so"));
    fx.publish(Release::new("libcore", "2.0.0").exposed("lib/core.so", "core 2", "lib/libcore.so"));
    fx.publish(Release::new("app", "1.0.0").depends("libcore@^1"));
    fx.install("libcore@1.3.0");
    fx.install("libcore@2.0.0");

    fx.install("app");

    assert_eq!(fx.active_ids(), vec!["app@1.0.0", "libcore@2.0.0"]);
    assert_eq!(std::fs::read_to_string(fx.link("lib/libcore.so")).unwrap(), "core 2");
}

#[test]
fn installing_an_active_release_again_is_rejected() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    fx.install("tool");

    let err = fx
        .manager
        .install(&PackageRequest::any("tool"))
        .unwrap_err();
    assert!(matches!(err, UhpmError::AlreadyInstalled(_)), "{err}");
}

#[cfg(unix)]
#[test]
fn switch_keeps_the_previous_release_installed() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(tool("1.0.0"));
    fx.publish(tool("2.0.0"));
    fx.install("tool@1.0.0");

    let result = fx
        .manager
        .switch("tool", &Version::new(2, 0, 0))
        .unwrap();
    assert_eq!(result.from_version, Some(Version::new(1, 0, 0)));
    assert_eq!(
        std::fs::read_to_string(fx.link("bin/tool")).unwrap(),
        "tool 2.0.0"
    );
    assert_eq!(fx.manager.list_installed().unwrap().len(), 2);
    assert_eq!(fx.active_ids(), vec!["tool@2.0.0"]);

    fx.manager.switch("tool", &Version::new(1, 0, 0)).unwrap();
    assert_eq!(
        std::fs::read_to_string(fx.link("bin/tool")).unwrap(),
        "tool 1.0.0"
    );
    assert_eq!(fx.active_ids(), vec!["tool@1.0.0"]);

    let same = fx.manager.switch("tool", &Version::new(1, 0, 0)).unwrap();
    assert_eq!(same.from_version, Some(Version::new(1, 0, 0)));
}

#[cfg(unix)]
#[test]
fn deactivate_and_activate_toggle_links() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(tool("1.0.0"));
    fx.install("tool");
    let tool_ref = reference("tool", "1.0.0");

    assert_eq!(fx.manager.deactivate(&tool_ref).unwrap(), 1);
    assert!(std::fs::symlink_metadata(fx.link("bin/tool")).is_err());
    assert!(fx.active_ids().is_empty());
    assert_eq!(fx.manager.deactivate(&tool_ref).unwrap(), 0);

    let installation = fx.manager.activate(&tool_ref).unwrap();
    assert_eq!(installation.exposed_count(), 1);
    assert!(fx.link("bin/tool").exists());
    assert_eq!(fx.active_ids(), vec!["tool@1.0.0"]);
}

#[test]
fn remove_refuses_while_dependents_remain() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(Release::new("app", "1.0.0").depends("libcore"));
    fx.publish(Release::new("libcore", "1.0.0").file("lib/core", "core"));
    fx.install("app");
    let libcore = reference("libcore", "1.0.0");

    let err = fx.manager.remove(&libcore, false).unwrap_err();
    match err {
        UhpmError::HasDependents { dependents, .. } => {
            assert_eq!(dependents, vec!["app@1.0.0"])
        }
        other => panic!("unexpected error: {other}"),
    }

    let result = fx.manager.remove(&libcore, true).unwrap();
    assert_eq!(result.package_id.to_string(), "libcore@1.0.0");
    assert!(result.removed_files >= 2);
    assert!(result.freed_space > 0);
    assert_eq!(fx.active_ids(), vec!["app@1.0.0"]);
}

#[test]
fn remove_deletes_the_package_directory_and_exposed_files() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    fx.install("tool");
    let tool_ref = reference("tool", "1.0.0");
    let package_dir = fx
        .manager
        .paths()
        .package_dir("tool", &Version::new(1, 0, 0));
    assert!(package_dir.is_dir());

    fx.manager.remove(&tool_ref, false).unwrap();

    assert!(!package_dir.exists());
    assert!(!fx.link("bin/tool").exists());
    assert!(fx.manager.list_installed().unwrap().is_empty());
    assert!(matches!(
        fx.manager.remove(&tool_ref, false).unwrap_err(),
        UhpmError::NotInstalled(_)
    ));

    let names = fx.event_names();
    assert!(names.contains(&"remove_started"));
    assert!(names.contains(&"remove_completed"));
}

#[test]
fn file_conflicts_roll_back_the_installation() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    let foreign = fx.link("bin/tool");
    std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
    std::fs::write(&foreign, "user file").unwrap();

    let err = fx
        .manager
        .install(&PackageRequest::any("tool"))
        .unwrap_err();
    assert!(matches!(err, UhpmError::FileConflict(ref path) if *path == foreign), "{err}");

    assert_eq!(std::fs::read_to_string(&foreign).unwrap(), "user file");
    assert!(!fx
        .manager
        .paths()
        .package_dir("tool", &Version::new(1, 0, 0))
        .exists());
    assert!(fx.manager.list_installed().unwrap().is_empty());
    assert!(fx.event_names().contains(&"installation_failed"));
}

#[cfg(unix)]
#[test]
fn links_of_another_active_package_are_not_taken_over() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(Release::new("alpha", "1.0.0").exposed("bin/tool", "alpha", "bin/tool"));
    fx.publish(Release::new("beta", "1.0.0").exposed("bin/tool", "beta", "bin/tool"));
    fx.install("alpha");

    let err = fx.manager.install(&PackageRequest::any("beta")).unwrap_err();

    let link = fx.link("bin/tool");
    assert!(matches!(err, UhpmError::FileConflict(ref path) if *path == link), "{err}");
    assert_eq!(std::fs::read_to_string(&link).unwrap(), "alpha");
    assert_eq!(fx.active_ids(), vec!["alpha@1.0.0"]);
    assert!(fx
        .manager
        .verify(&reference("alpha", "1.0.0"))
        .unwrap()
        .is_ok());
}

#[cfg(unix)]
#[test]
fn links_of_a_deactivated_package_may_be_replaced() {
    let fx = Fixture::new(InstallMode::Symlink);
    fx.publish(Release::new("alpha", "1.0.0").exposed("bin/tool", "alpha", "bin/tool"));
    fx.publish(Release::new("beta", "1.0.0").exposed("bin/tool", "beta", "bin/tool"));
    fx.install("alpha");
    let stale = fx.link("bin/tool");
    let kept = std::fs::read_link(&stale).unwrap();
    fx.manager.deactivate(&reference("alpha", "1.0.0")).unwrap();
    std::os::unix::fs::symlink(&kept, &stale).unwrap();

    fx.install("beta");

    assert_eq!(std::fs::read_to_string(&stale).unwrap(), "beta");
}

#[test]
fn direct_mode_copies_files_and_verify_reports_changes() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(
        Release::new("dotfiles", "1.0.0")
            .exposed("config/app.toml", "answer = 42", ".config/app.toml")
            .file("share/themes/dark", "dark"),
    );
    let dotfiles = reference("dotfiles", "1.0.0");

    let result = fx.install("dotfiles");
    assert_eq!(result.symlinks_created, 0);
    assert_eq!(result.installed_files, vec![fx.link(".config/app.toml")]);

    let copied = fx.link(".config/app.toml");
    assert!(!std::fs::symlink_metadata(&copied)
        .unwrap()
        .file_type()
        .is_symlink());
    assert!(fx.manager.verify(&dotfiles).unwrap().is_ok());

    std::fs::write(&copied, "answer = 0").unwrap();
    assert_eq!(fx.manager.verify(&dotfiles).unwrap().modified, vec![copied.clone()]);

    std::fs::remove_file(&copied).unwrap();
    assert_eq!(fx.manager.verify(&dotfiles).unwrap().missing, vec![copied]);
}

#[test]
fn direct_mode_copies_directories_recursively() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(
        Release::new("themes", "1.0.0")
            .file("themes/dark", "dark")
            .file("themes/extra/light", "light")
            .expose("themes", ".themes"),
    );

    let result = fx.install("themes");
    assert_eq!(result.installed_files.len(), 2);
    assert_eq!(
        std::fs::read_to_string(fx.link(".themes/extra/light")).unwrap(),
        "light"
    );

    let removed = fx
        .manager
        .deactivate(&reference("themes", "1.0.0"))
        .unwrap();
    assert_eq!(removed, 4);
    assert!(!fx.link(".themes").exists());
}

#[test]
fn verify_notices_a_missing_package_directory() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    fx.install("tool");
    let package_dir = fx
        .manager
        .paths()
        .package_dir("tool", &Version::new(1, 0, 0));
    std::fs::remove_dir_all(&package_dir).unwrap();

    let report = fx.manager.verify(&reference("tool", "1.0.0")).unwrap();
    assert_eq!(report.missing, vec![package_dir]);
}

#[test]
fn local_archives_install_with_registry_dependencies() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(Release::new("libcore", "1.0.0"));
    let source = Release::new("plugin", "0.2.0")
        .depends("libcore@^1")
        .exposed("plugin.so", "plugin", "plugins/plugin.so")
        .write_to(&fx.dir.path().join("plugin-src"));
    let archive = fx.dir.path().join("plugin-0.2.0.uhp");
    std::fs::write(&archive, pack_directory(&source).unwrap()).unwrap();
    assert!(is_package_archive(&archive));

    let result = fx.manager.install_archive(&archive).unwrap();

    assert_eq!(result.package_id.to_string(), "plugin@0.2.0");
    assert_eq!(
        result.installed_packages,
        vec![reference("libcore", "1.0.0"), reference("plugin", "0.2.0")]
    );
    assert_eq!(
        std::fs::read_to_string(fx.link("plugins/plugin.so")).unwrap(),
        "plugin"
    );
    assert!(matches!(
        fx.manager.install_archive(&archive).unwrap_err(),
        UhpmError::AlreadyInstalled(_)
    ));
}

#[test]
fn update_switches_to_the_newest_release() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    fx.install("tool");
    fx.publish(tool("1.1.0"));

    let candidates = fx.manager.check_updates().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].current, reference("tool", "1.0.0"));
    assert_eq!(candidates[0].latest, Version::new(1, 1, 0));

    let result = fx.manager.update("tool").unwrap().unwrap();
    assert_eq!(result.from_version, Some(Version::new(1, 0, 0)));
    assert_eq!(result.to_version, Version::new(1, 1, 0));
    assert_eq!(
        std::fs::read_to_string(fx.link("bin/tool")).unwrap(),
        "tool 1.1.0"
    );

    assert!(fx.manager.update("tool").unwrap().is_none());
    assert!(fx.manager.check_updates().unwrap().is_empty());
    assert!(fx.manager.update_all().unwrap().is_empty());

    let names = fx.event_names();
    assert!(names.contains(&"update_started"));
    assert!(names.contains(&"update_completed"));
}

#[test]
fn updating_an_unknown_package_is_not_installed() {
    let fx = Fixture::new(InstallMode::Direct);
    assert!(matches!(
        fx.manager.update("ghost").unwrap_err(),
        UhpmError::NotInstalled(_)
    ));
}

#[test]
fn check_updates_without_registries_is_empty() {
    let fx = Fixture::with_registries(InstallMode::Direct, false);
    assert!(fx.manager.check_updates().unwrap().is_empty());
    assert!(matches!(
        fx.manager.install(&PackageRequest::any("tool")).unwrap_err(),
        UhpmError::NoRegistries
    ));
}

#[test]
fn info_prefers_the_installed_release() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(tool("1.0.0"));
    fx.install("tool");
    fx.publish(tool("2.0.0"));

    let installed = fx.manager.info(&PackageRequest::any("tool")).unwrap();
    assert_eq!(installed.version, Version::new(1, 0, 0));
    assert!(installed.installed);

    let available = fx
        .manager
        .info(&PackageRequest::parse("tool@^2").unwrap())
        .unwrap();
    assert_eq!(available.version, Version::new(2, 0, 0));
    assert!(!available.installed);

    let found = fx.manager.search("too").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version, Version::new(2, 0, 0));
}

#[test]
fn conflicting_packages_are_refused() {
    let fx = Fixture::new(InstallMode::Direct);
    fx.publish(Release::new("vim", "9.0.0").provides("vi"));
    fx.publish(Release::new("nvi", "1.0.0").conflicts("vi"));
    fx.install("vim");

    let err = fx
        .manager
        .install(&PackageRequest::any("nvi"))
        .unwrap_err();
    assert!(matches!(err, UhpmError::Conflicts(_)), "{err}");
    assert_eq!(fx.active_ids(), vec!["vim@9.0.0"]);
}

#[test]
fn cache_maintenance_reports_sizes() {
    let fx = Fixture::new(InstallMode::Direct);
    assert_eq!(fx.manager.cache_size().unwrap(), 0);
    assert_eq!(fx.manager.clean_cache().unwrap(), 0);
    fx.manager.clear_cache().unwrap();

    let reports = fx.manager.sync_repositories();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_ok());
}
