//! Dependency resolution against registries and the installed set.
//!
//! # Responsibility
//! - Turn an install request into an ordered list of releases to install.
//! - Find installed packages that still need a release being removed.
//!
//! # Invariants
//! - `ResolutionPlan::to_install` lists dependencies before their dependents.
//! - An installed release that satisfies a requirement is reused.
//! - Only `DependencyKind::Required` dependencies are followed.
//! - Every name resolves to a single version within one plan.

use crate::error::{UhpmError, UhpmResult};
use crate::model::dependency::{Dependency, DependencyConflict};
use crate::model::package::{
    exact_requirement, Package, PackageId, PackageReference, PackageRequest,
};
use crate::model::target::Target;
use crate::registry::RegistrySet;
use log::debug;
use semver::{Version, VersionReq};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Releases to fetch and install, dependencies first.
    pub to_install: Vec<Package>,
    /// Requirements already met by installed releases.
    pub satisfied: Vec<PackageReference>,
    pub conflicts: Vec<DependencyConflict>,
}

impl ResolutionPlan {
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty()
    }
}

/// Releases reachable from a set of roots, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<PackageId, Package>,
    /// Package id to the ids of its required dependencies.
    pub edges: BTreeMap<PackageId, Vec<PackageId>>,
}

impl DependencyGraph {
    pub fn dependencies_of(&self, id: &PackageId) -> &[PackageId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &PackageId) -> Vec<&PackageId> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(owner, _)| owner)
            .collect()
    }
}

/// Name chosen for a plan and the requirement that chose it.
struct Choice {
    version: Version,
    requirement: VersionReq,
}

struct PlanState {
    plan: ResolutionPlan,
    chosen: BTreeMap<String, Choice>,
    stack: Vec<String>,
}

pub struct DependencyResolver<'a> {
    registries: &'a RegistrySet,
    target: Target,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registries: &'a RegistrySet) -> Self {
        Self {
            registries,
            target: Target::current(),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Plans the installation of `request` on top of `installed`.
    pub fn resolve_for_installation(
        &self,
        request: &PackageRequest,
        installed: &[Package],
    ) -> UhpmResult<ResolutionPlan> {
        let mut state = PlanState {
            plan: ResolutionPlan::default(),
            chosen: BTreeMap::new(),
            stack: Vec::new(),
        };
        self.visit(&request.name, &request.requirement, installed, &mut state)?;
        state.plan.conflicts = self.check_conflicts(&state.plan.to_install, installed);
        debug!(
            "event=resolve module=resolver status=ok request={} to_install={} satisfied={} conflicts={}",
            request,
            state.plan.to_install.len(),
            state.plan.satisfied.len(),
            state.plan.conflicts.len()
        );
        Ok(state.plan)
    }

    /// Plans the installation of an already loaded release, e.g. from a local archive.
    pub fn resolve_package(
        &self,
        root: Package,
        installed: &[Package],
    ) -> UhpmResult<ResolutionPlan> {
        self.ensure_target(&root)?;
        let mut state = PlanState {
            plan: ResolutionPlan::default(),
            chosen: BTreeMap::new(),
            stack: vec![root.name.clone()],
        };
        state.chosen.insert(
            root.name.clone(),
            Choice {
                version: root.version.clone(),
                requirement: exact_requirement(&root.version),
            },
        );
        for dependency in root.dependencies.iter().filter(|dep| dep.is_required()) {
            self.visit(
                &dependency.name,
                &dependency.constraint.requirement,
                installed,
                &mut state,
            )?;
        }
        state.plan.to_install.push(root);
        state.plan.conflicts = self.check_conflicts(&state.plan.to_install, installed);
        Ok(state.plan)
    }

    fn visit(
        &self,
        name: &str,
        requirement: &VersionReq,
        installed: &[Package],
        state: &mut PlanState,
    ) -> UhpmResult<()> {
        if let Some(position) = state.stack.iter().position(|entry| entry == name) {
            let mut cycle = state.stack[position..].to_vec();
            cycle.push(name.to_string());
            return Err(UhpmError::DependencyCycle(cycle));
        }

        if let Some(choice) = state.chosen.get(name) {
            if requirement.matches(&choice.version) {
                return Ok(());
            }
            return Err(UhpmError::IncompatibleRequirements {
                name: name.to_string(),
                first: choice.requirement.to_string(),
                second: requirement.to_string(),
            });
        }

        if let Some(existing) = installed_satisfying(installed, name, requirement) {
            state.chosen.insert(
                name.to_string(),
                Choice {
                    version: existing.version.clone(),
                    requirement: requirement.clone(),
                },
            );
            state.plan.satisfied.push(existing.reference());
            return Ok(());
        }

        let version = self.registries.latest_satisfying(name, requirement)?;
        let package = self
            .registries
            .get_package(&PackageReference::new(name, version.clone()))?;
        self.ensure_target(&package)?;

        state.chosen.insert(
            name.to_string(),
            Choice {
                version,
                requirement: requirement.clone(),
            },
        );
        state.stack.push(name.to_string());
        for dependency in package.dependencies.iter().filter(|dep| dep.is_required()) {
            self.visit(
                &dependency.name,
                &dependency.constraint.requirement,
                installed,
                state,
            )?;
        }
        state.stack.pop();
        state.plan.to_install.push(package);
        Ok(())
    }

    fn ensure_target(&self, package: &Package) -> UhpmResult<()> {
        if package.matches_target(&self.target) {
            return Ok(());
        }
        Err(UhpmError::TargetMismatch {
            package: package.id(),
            target: self.target.to_string(),
        })
    }

    /// Conflicts between `planned` releases and each other or the installed set.
    pub fn check_conflicts(
        &self,
        planned: &[Package],
        installed: &[Package],
    ) -> Vec<DependencyConflict> {
        let present: Vec<&Package> = installed
            .iter()
            .filter(|package| package.installed)
            .chain(planned.iter())
            .collect();

        let mut conflicts = Vec::new();
        for package in planned {
            for other in &present {
                if other.name == package.name {
                    continue;
                }
                if package.conflicts.iter().any(|name| other.satisfies_name(name)) {
                    conflicts.push(DependencyConflict {
                        package: package.name.clone(),
                        required: package.reference().to_string(),
                        installed: other.reference().to_string(),
                        message: format!("{} conflicts with {}", package.name, other.name),
                    });
                } else if other.conflicts.iter().any(|name| package.satisfies_name(name)) {
                    conflicts.push(DependencyConflict {
                        package: other.name.clone(),
                        required: package.reference().to_string(),
                        installed: other.reference().to_string(),
                        message: format!("{} conflicts with {}", other.name, package.name),
                    });
                }
            }
        }
        conflicts.dedup();
        conflicts
    }

    /// Registry versions of `dependency.name` that satisfy it, ascending.
    pub fn find_satisfying_versions(&self, dependency: &Dependency) -> UhpmResult<Vec<Version>> {
        self.registries.satisfying_versions(dependency)
    }

    /// Resolves the required dependency closure of `roots` to newest releases.
    pub fn build_dependency_graph(&self, roots: &[Package]) -> UhpmResult<DependencyGraph> {
        let mut graph = DependencyGraph::default();
        let mut queue: VecDeque<Package> = roots.iter().cloned().collect();

        while let Some(package) = queue.pop_front() {
            let id = package.id();
            if graph.nodes.contains_key(&id) {
                continue;
            }

            let mut edges = Vec::new();
            for dependency in package.dependencies.iter().filter(|dep| dep.is_required()) {
                let version = self
                    .registries
                    .latest_satisfying(&dependency.name, &dependency.constraint.requirement)?;
                let dep_ref = PackageReference::new(dependency.name.clone(), version);
                let dep_id = dep_ref.id();
                if !graph.nodes.contains_key(&dep_id) {
                    queue.push_back(self.registries.get_package(&dep_ref)?);
                }
                edges.push(dep_id);
            }
            graph.edges.insert(id.clone(), edges);
            graph.nodes.insert(id, package);
        }
        Ok(graph)
    }
}

/// Installed releases that would be left without a required dependency if
/// `package_ref` were removed.
pub fn resolve_for_removal(
    package_ref: &PackageReference,
    installed: &[Package],
) -> Vec<PackageReference> {
    let alternatives: Vec<&Version> = installed
        .iter()
        .filter(|package| {
            package.installed
                && package.name == package_ref.name
                && package.version != package_ref.version
        })
        .map(|package| &package.version)
        .collect();

    installed
        .iter()
        .filter(|package| package.installed && package.reference() != *package_ref)
        .filter(|package| {
            package.dependencies.iter().any(|dependency| {
                dependency.is_required()
                    && dependency.name == package_ref.name
                    && dependency.matches_version(&package_ref.version)
                    && !alternatives
                        .iter()
                        .any(|version| dependency.matches_version(version))
            })
        })
        .map(Package::reference)
        .collect()
}

/// Highest installed release of `name` accepted by `requirement`.
fn installed_satisfying<'p>(
    installed: &'p [Package],
    name: &str,
    requirement: &VersionReq,
) -> Option<&'p Package> {
    installed
        .iter()
        .filter(|package| package.installed && package.name == name)
        .filter(|package| requirement.matches(&package.version))
        .max_by(|a, b| a.active.cmp(&b.active).then_with(|| a.version.cmp(&b.version)))
}

#[cfg(test)]
mod tests {
    use super::resolve_for_removal;
    use crate::model::dependency::Dependency;
    use crate::model::package::{Package, PackageReference, PackageSource};
    use semver::{Version, VersionReq};
    use std::path::PathBuf;

    fn installed(name: &str, version: &str, deps: &[(&str, &str)]) -> Package {
        let mut package = Package::new(
            name,
            Version::parse(version).unwrap(),
            "tester",
            PackageSource::Local {
                path: PathBuf::from("/repo"),
            },
        );
        package.dependencies = deps
            .iter()
            .map(|(dep, req)| Dependency::required(*dep, VersionReq::parse(req).unwrap()))
            .collect();
        package.mark_installed();
        package
    }

    #[test]
    fn removal_reports_dependents_without_alternatives() {
        let packages = vec![
            installed("lib", "1.0.0", &[]),
            installed("app", "2.0.0", &[("lib", "^1.0")]),
            installed("other", "1.0.0", &[("lib", "^2.0")]),
        ];
        let target = PackageReference::new("lib", Version::new(1, 0, 0));
        assert_eq!(
            resolve_for_removal(&target, &packages),
            vec![PackageReference::new("app", Version::new(2, 0, 0))]
        );
    }

    #[test]
    fn removal_ignores_dependents_served_by_another_version() {
        let packages = vec![
            installed("lib", "1.0.0", &[]),
            installed("lib", "1.4.0", &[]),
            installed("app", "2.0.0", &[("lib", "^1.0")]),
        ];
        let target = PackageReference::new("lib", Version::new(1, 0, 0));
        assert!(resolve_for_removal(&target, &packages).is_empty());
    }
}
