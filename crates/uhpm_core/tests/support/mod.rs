#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uhpm_core::archive::pack_directory;
use uhpm_core::model::file_metadata::sha256_hex;
use uhpm_core::model::package::{Package, PackageSource};
use uhpm_core::net::{NetError, NetResult, Transport};
use uhpm_core::registry::LocalRegistry;
use uhpm_core::{RepositoryConfig, RepositoryType};

/// One release written into a local repository directory.
pub struct Release {
    name: String,
    version: String,
    dependencies: Vec<String>,
    conflicts: Vec<String>,
    provides: Vec<String>,
    files: Vec<(String, String)>,
    instlist: Vec<(String, String)>,
}

impl Release {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            files: Vec::new(),
            instlist: Vec::new(),
        }
    }

    pub fn depends(mut self, spec: &str) -> Self {
        self.dependencies.push(spec.to_string());
        self
    }

    pub fn conflicts(mut self, name: &str) -> Self {
        self.conflicts.push(name.to_string());
        self
    }

    pub fn provides(mut self, name: &str) -> Self {
        self.provides.push(name.to_string());
        self
    }

    pub fn file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((path.to_string(), contents.to_string()));
        self
    }

    /// Adds an `instlist` line exposing `source` at `target`.
    pub fn expose(mut self, source: &str, target: &str) -> Self {
        self.instlist.push((source.to_string(), target.to_string()));
        self
    }

    /// Adds `path` to the package and exposes it at `target`.
    pub fn exposed(self, path: &str, contents: &str, target: &str) -> Self {
        self.file(path, contents).expose(path, target)
    }

    pub fn meta_toml(&self) -> String {
        let list = |items: &[String]| {
            items
                .iter()
                .map(|item| format!("\"{item}\""))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "name = \"{}\"\nversion = \"{}\"\nauthor = \"tester\"\ndescription = \"{} test package\"\ndependencies = [{}]\nconflicts = [{}]\nprovides = [{}]\n",
            self.name,
            self.version,
            self.name,
            list(&self.dependencies),
            list(&self.conflicts),
            list(&self.provides),
        )
    }

    /// Writes the release into `<dir>` as an unpacked package.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("meta.toml"), self.meta_toml()).unwrap();
        for (path, contents) in &self.files {
            let file = dir.join(path);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, contents).unwrap();
        }
        if !self.instlist.is_empty() {
            let lines: Vec<String> = self
                .instlist
                .iter()
                .map(|(source, target)| format!("{source} {target}"))
                .collect();
            std::fs::write(dir.join("instlist"), lines.join("\n") + "\n").unwrap();
        }
        dir.to_path_buf()
    }

    /// Writes the release into a `<root>/<name>/<version>` repository tree.
    pub fn publish(&self, repo_root: &Path) -> PathBuf {
        self.write_to(&repo_root.join(&self.name).join(&self.version))
    }
}

pub fn local_repository(name: &str, root: &Path) -> RepositoryConfig {
    RepositoryConfig::new(name, root.display().to_string(), RepositoryType::Binary)
}

pub fn local_registry(root: &Path) -> LocalRegistry {
    LocalRegistry::new(local_repository("local", root)).unwrap()
}

pub fn installed(name: &str, version: &str, active: bool) -> Package {
    let mut package = Package::new(
        name,
        semver::Version::parse(version).unwrap(),
        "tester",
        PackageSource::Local {
            path: PathBuf::from("/repo").join(name),
        },
    );
    package.mark_installed();
    if active {
        package.activate();
    }
    package
}

/// In-memory HTTP stand-in; records every URL requested.
#[derive(Clone, Default)]
pub struct FakeTransport {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn serve(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes.into());
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|hit| *hit == url).count()
    }

    /// Publishes `release` under `base` with a correct checksum; returns the archive bytes.
    pub fn publish(&self, base: &str, release: &Release, scratch: &Path) -> Vec<u8> {
        let dir = release.write_to(&scratch.join(format!("{}-{}", release.name, release.version)));
        let bytes = pack_directory(&dir).unwrap();
        let meta = format!(
            "{}checksum_algorithm = \"sha256\"\nchecksum_hash = \"{}\"\n",
            release.meta_toml(),
            sha256_hex(&bytes)
        );
        let stem = format!("{base}/packages/{}-{}", release.name, release.version);
        self.serve(&format!("{stem}-meta.toml"), meta);
        self.serve(&format!("{stem}.uhp"), bytes.clone());
        bytes
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str) -> NetResult<Vec<u8>> {
        self.hits.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| NetError::NotFound(url.to_string()))
    }

    fn is_url_available(&self, url: &str) -> bool {
        self.files.lock().unwrap().contains_key(url)
    }
}
