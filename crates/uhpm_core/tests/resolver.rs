mod support;

use semver::Version;
use support::{installed, local_registry, Release};
use std::path::Path;
use uhpm_core::model::dependency::Dependency;
use uhpm_core::model::target::Target;
use uhpm_core::resolver::resolve_for_removal;
use uhpm_core::{
    DependencyResolver, Package, PackageReference, PackageRequest, RegistrySet, UhpmError,
};

fn registries(root: &Path) -> RegistrySet {
    let mut set = RegistrySet::new();
    set.push(Box::new(local_registry(root)));
    set
}

fn plan_names(packages: &[Package]) -> Vec<String> {
    packages.iter().map(|p| p.id().to_string()).collect()
}

#[test]
fn dependencies_come_before_their_dependents() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("app", "1.0.0")
        .depends("libui@^2")
        .depends("libcore")
        .publish(dir.path());
    Release::new("libui", "2.3.0")
        .depends("libcore@>=1.1")
        .publish(dir.path());
    Release::new("libui", "3.0.0").publish(dir.path());
    Release::new("libcore", "1.0.0").publish(dir.path());
    Release::new("libcore", "1.2.0").publish(dir.path());
    let set = registries(dir.path());

    let plan = DependencyResolver::new(&set)
        .resolve_for_installation(&PackageRequest::any("app"), &[])
        .unwrap();

    assert_eq!(
        plan_names(&plan.to_install),
        vec!["libcore@1.2.0", "libui@2.3.0", "app@1.0.0"]
    );
    assert!(plan.satisfied.is_empty());
    assert!(plan.conflicts.is_empty());
}

#[test]
fn installed_releases_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("app", "1.0.0")
        .depends("libcore@^1")
        .publish(dir.path());
    Release::new("libcore", "1.9.0").publish(dir.path());
    let set = registries(dir.path());
    let present = vec![installed("libcore", "1.1.0", true)];

    let plan = DependencyResolver::new(&set)
        .resolve_for_installation(&PackageRequest::any("app"), &present)
        .unwrap();

    assert_eq!(plan_names(&plan.to_install), vec!["app@1.0.0"]);
    assert_eq!(
        plan.satisfied,
        vec![PackageReference::new("libcore", Version::new(1, 1, 0))]
    );
}

#[test]
fn satisfied_request_yields_an_empty_plan() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("tool", "2.0.0").publish(dir.path());
    let set = registries(dir.path());

    let plan = DependencyResolver::new(&set)
        .resolve_for_installation(
            &PackageRequest::parse("tool@^1").unwrap(),
            &[installed("tool", "1.4.0", true)],
        )
        .unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.satisfied.len(), 1);
}

#[test]
fn cycles_are_reported_with_their_path() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("a", "1.0.0").depends("b").publish(dir.path());
    Release::new("b", "1.0.0").depends("c").publish(dir.path());
    Release::new("c", "1.0.0").depends("a").publish(dir.path());
    let set = registries(dir.path());

    let err = DependencyResolver::new(&set)
        .resolve_for_installation(&PackageRequest::any("a"), &[])
        .unwrap_err();
    match err {
        UhpmError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "c", "a"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn diverging_requirements_are_incompatible() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("app", "1.0.0")
        .depends("left")
        .depends("right")
        .publish(dir.path());
    Release::new("left", "1.0.0")
        .depends("shared@^1")
        .publish(dir.path());
    Release::new("right", "1.0.0")
        .depends("shared@^2")
        .publish(dir.path());
    Release::new("shared", "1.5.0").publish(dir.path());
    Release::new("shared", "2.0.0").publish(dir.path());
    let set = registries(dir.path());

    let err = DependencyResolver::new(&set)
        .resolve_for_installation(&PackageRequest::any("app"), &[])
        .unwrap_err();
    match err {
        UhpmError::IncompatibleRequirements { name, .. } => assert_eq!(name, "shared"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_versions_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("app", "1.0.0")
        .depends("libcore@^5")
        .publish(dir.path());
    Release::new("libcore", "1.0.0").publish(dir.path());
    let set = registries(dir.path());
    let resolver = DependencyResolver::new(&set);

    assert!(matches!(
        resolver
            .resolve_for_installation(&PackageRequest::any("app"), &[])
            .unwrap_err(),
        UhpmError::NoMatchingVersion { .. }
    ));
    assert!(matches!(
        resolver
            .resolve_for_installation(&PackageRequest::any("ghost"), &[])
            .unwrap_err(),
        UhpmError::PackageNotFound(_)
    ));
}

#[test]
fn conflicts_with_installed_and_provided_names_are_collected() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("vim", "9.0.0").conflicts("vi").publish(dir.path());
    let set = registries(dir.path());

    let mut nvi = installed("nvi", "1.81.6", true);
    nvi.provides = vec!["vi".to_string()];

    let plan = DependencyResolver::new(&set)
        .resolve_for_installation(&PackageRequest::any("vim"), &[nvi])
        .unwrap();
    assert_eq!(plan.conflicts.len(), 1);
    assert_eq!(plan.conflicts[0].package, "vim");
    assert_eq!(plan.conflicts[0].installed, "nvi@1.81.6");
}

#[test]
fn foreign_targets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let set = registries(dir.path());

    let mut package = installed("local-tool", "1.0.0", false);
    package.mark_removed();
    package.target = Target::from_meta(Some("plan9"), Some("mips"));

    let err = DependencyResolver::new(&set)
        .resolve_package(package, &[])
        .unwrap_err();
    assert!(matches!(err, UhpmError::TargetMismatch { .. }), "{err}");
}

#[test]
fn dependency_graph_links_every_reachable_release() {
    let dir = tempfile::tempdir().unwrap();
    Release::new("app", "1.0.0")
        .depends("libui")
        .depends("libcore")
        .publish(dir.path());
    Release::new("libui", "1.0.0").depends("libcore").publish(dir.path());
    Release::new("libcore", "1.0.0").publish(dir.path());
    let set = registries(dir.path());
    let resolver = DependencyResolver::new(&set);
    let app = set
        .get_package(&PackageReference::new("app", Version::new(1, 0, 0)))
        .unwrap();

    let graph = resolver.build_dependency_graph(&[app.clone()]).unwrap();
    assert_eq!(graph.nodes.len(), 3);
    let core = PackageReference::new("libcore", Version::new(1, 0, 0)).id();
    let mut dependents: Vec<String> = graph
        .dependents_of(&core)
        .iter()
        .map(|id| id.to_string())
        .collect();
    dependents.sort();
    assert_eq!(dependents, vec!["app@1.0.0", "libui@1.0.0"]);
    assert_eq!(graph.dependencies_of(&app.id()).len(), 2);
}

#[test]
fn removal_blocks_on_required_dependents() {
    let mut app = installed("app", "1.0.0", true);
    app.dependencies = vec![Dependency::parse("libcore@^1").unwrap()];
    let present = vec![app, installed("libcore", "1.2.0", true)];

    let blocked = resolve_for_removal(
        &PackageReference::new("libcore", Version::new(1, 2, 0)),
        &present,
    );
    assert_eq!(
        blocked,
        vec![PackageReference::new("app", Version::new(1, 0, 0))]
    );
}
