//! Exposes package files to the user through symlinks or copies.
//!
//! # Responsibility
//! - Turn `instlist` entries into absolute source/target pairs.
//! - Create and remove the user-visible entries of one installation.
//!
//! # Invariants
//! - A pre-existing target is only replaced when it is a symlink into a
//!   release under the packages directory that is not protected; links of
//!   other active packages and foreign files are a `FileConflict`.
//! - A failed `link`/`copy` leaves no partially created entries behind.
//! - `unexpose` only removes links that still point at their recorded source.

use crate::archive::InstallEntry;
use crate::error::{UhpmError, UhpmResult};
use crate::model::file_metadata::{FileMetadata, FilePermissions, FileType};
use crate::model::installation::Installation;
use crate::model::symlink::{Symlink, SymlinkBatch};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

pub struct Linker<'a> {
    packages_dir: &'a Path,
    link_root: &'a Path,
    /// Release directories (`name@version`) whose links must stay.
    protected: BTreeSet<String>,
}

impl<'a> Linker<'a> {
    pub fn new(packages_dir: &'a Path, link_root: &'a Path) -> Self {
        Self {
            packages_dir,
            link_root,
            protected: BTreeSet::new(),
        }
    }

    /// Keeps links into `releases` from being taken over.
    pub fn protect(mut self, releases: impl IntoIterator<Item = String>) -> Self {
        self.protected.extend(releases);
        self
    }

    /// Resolves `entries` for the package unpacked at `package_dir` and
    /// checks every target for conflicts.
    pub fn plan(&self, package_dir: &Path, entries: &[InstallEntry]) -> UhpmResult<SymlinkBatch> {
        let mut batch = SymlinkBatch::new(self.link_root.to_path_buf());
        for entry in entries {
            let source = package_dir.join(&entry.source);
            let metadata = std::fs::metadata(&source).map_err(UhpmError::io(&source))?;
            let link = if metadata.is_dir() {
                Symlink::directory(source, &entry.target)
            } else {
                Symlink::file(source, &entry.target)
            };
            let target = link.resolve_absolute_path(self.link_root);
            batch.add_link(Symlink {
                target,
                ..link
            })?;
        }

        for link in &batch.links {
            self.check_target(&link.target)?;
        }
        Ok(batch)
    }

    /// Creates every link in `batch`.
    pub fn link(&self, batch: &SymlinkBatch) -> UhpmResult<Vec<Symlink>> {
        let mut created: Vec<Symlink> = Vec::with_capacity(batch.len());
        for link in &batch.links {
            if let Err(err) = self.create_link(link) {
                for done in created.iter().rev() {
                    remove_path(&done.target);
                }
                return Err(err);
            }
            created.push(link.clone());
        }
        debug!(
            "event=links_create module=linker status=ok count={}",
            created.len()
        );
        Ok(created)
    }

    /// Copies every source in `batch` to its target; directories are copied
    /// recursively and every created path is recorded.
    pub fn copy(&self, batch: &SymlinkBatch) -> UhpmResult<Vec<FileMetadata>> {
        let mut written = Vec::new();
        for link in &batch.links {
            let result = self
                .replace_owned(&link.target)
                .and_then(|()| copy_tree(&link.source, &link.target, &mut written));
            if let Err(err) = result {
                remove_recorded(&written);
                return Err(err);
            }
        }
        debug!(
            "event=files_copy module=linker status=ok count={}",
            written.len()
        );
        Ok(written)
    }

    /// Removes the links and copies recorded by `installation`; returns how
    /// many entries were removed.
    pub fn unexpose(&self, installation: &Installation) -> usize {
        let mut removed = 0;
        for link in &installation.symlinks {
            match std::fs::read_link(&link.target) {
                Ok(points_to) if points_to == link.source => {
                    if remove_path(&link.target) {
                        removed += 1;
                    }
                }
                Ok(_) => warn!(
                    "event=link_remove module=linker status=error reason=retargeted target={}",
                    link.target.display()
                ),
                Err(_) => {}
            }
        }

        let files: Vec<&FileMetadata> = installation.installed_files.values().collect();
        removed += remove_recorded_refs(&files);
        removed
    }

    fn check_target(&self, target: &Path) -> UhpmResult<()> {
        match std::fs::symlink_metadata(target) {
            Ok(_) if self.is_replaceable(target) => Ok(()),
            Ok(_) => Err(UhpmError::FileConflict(target.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UhpmError::io(target)(err)),
        }
    }

    /// A symlink into an unprotected release is a leftover of an inactive
    /// or removed UHPM installation.
    fn is_replaceable(&self, target: &Path) -> bool {
        let Ok(points_to) = std::fs::read_link(target) else {
            return false;
        };
        let Ok(inside) = points_to.strip_prefix(self.packages_dir) else {
            return false;
        };
        match inside.components().next() {
            Some(Component::Normal(release)) => release
                .to_str()
                .is_some_and(|release| !self.protected.contains(release)),
            _ => false,
        }
    }

    fn replace_owned(&self, target: &Path) -> UhpmResult<()> {
        self.check_target(target)?;
        if self.is_replaceable(target) {
            std::fs::remove_file(target).map_err(UhpmError::io(target))?;
        }
        Ok(())
    }

    fn create_link(&self, link: &Symlink) -> UhpmResult<()> {
        self.replace_owned(&link.target)?;
        if let Some(parent) = link.target.parent() {
            std::fs::create_dir_all(parent).map_err(UhpmError::io(parent))?;
        }
        platform_symlink(link).map_err(UhpmError::io(&link.target))
    }
}

#[cfg(unix)]
fn platform_symlink(link: &Symlink) -> io::Result<()> {
    std::os::unix::fs::symlink(&link.source, &link.target)
}

#[cfg(windows)]
fn platform_symlink(link: &Symlink) -> io::Result<()> {
    if link.is_directory_link() {
        std::os::windows::fs::symlink_dir(&link.source, &link.target)
    } else {
        std::os::windows::fs::symlink_file(&link.source, &link.target)
    }
}

#[cfg(not(any(unix, windows)))]
fn platform_symlink(_link: &Symlink) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Whether symlink installs work without extra privileges here.
pub fn platform_supports_symlinks() -> bool {
    cfg!(unix)
}

fn copy_tree(source: &Path, target: &Path, written: &mut Vec<FileMetadata>) -> UhpmResult<()> {
    let metadata = std::fs::metadata(source).map_err(UhpmError::io(source))?;
    if metadata.is_dir() {
        let existed = target.is_dir();
        std::fs::create_dir_all(target).map_err(UhpmError::io(target))?;
        if !existed {
            written.push(
                FileMetadata::new(target.to_path_buf(), 0).with_file_type(FileType::Directory),
            );
        }

        let mut children = std::fs::read_dir(source)
            .map_err(UhpmError::io(source))?
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(UhpmError::io(source))?;
        children.sort();
        for child in children {
            copy_tree(&source.join(&child), &target.join(&child), written)?;
        }
        return Ok(());
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(UhpmError::io(parent))?;
    }
    let data = std::fs::read(source).map_err(UhpmError::io(source))?;
    std::fs::copy(source, target).map_err(UhpmError::io(target))?;

    let permissions = file_permissions(&metadata);
    let file_type = if permissions.is_executable() {
        FileType::Executable
    } else {
        FileType::Regular
    };
    written.push(
        FileMetadata::for_contents(target.to_path_buf(), &data)
            .with_permissions(permissions)
            .with_file_type(file_type),
    );
    Ok(())
}

#[cfg(unix)]
fn file_permissions(metadata: &std::fs::Metadata) -> FilePermissions {
    use std::os::unix::fs::PermissionsExt;
    FilePermissions::from_mode(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn file_permissions(metadata: &std::fs::Metadata) -> FilePermissions {
    if metadata.permissions().readonly() {
        FilePermissions::read_only()
    } else {
        FilePermissions::read_write()
    }
}

fn remove_recorded(files: &[FileMetadata]) -> usize {
    let refs: Vec<&FileMetadata> = files.iter().collect();
    remove_recorded_refs(&refs)
}

/// Removes files first, then directories deepest-first; non-empty
/// directories are kept.
fn remove_recorded_refs(files: &[&FileMetadata]) -> usize {
    let mut removed = 0;
    for file in files.iter().filter(|file| !file.is_directory()) {
        if remove_path(&file.path) {
            removed += 1;
        }
    }

    let mut dirs: Vec<&PathBuf> = files
        .iter()
        .filter(|file| file.is_directory())
        .map(|file| &file.path)
        .collect();
    dirs.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
    for dir in dirs {
        if std::fs::remove_dir(dir).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Removes a file or symlink; `false` when nothing was removed.
fn remove_path(path: &Path) -> bool {
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            std::fs::remove_file(path).or_else(|_| std::fs::remove_dir(path))
        }
        Ok(_) => std::fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return false,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(
                "event=file_remove module=linker status=error path={} error={}",
                path.display(),
                err
            );
            false
        }
    }
}
