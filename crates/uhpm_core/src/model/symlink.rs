//! Symlinks an installation exposes under the link root.
//!
//! # Invariants
//! - `source` lives inside the package directory; `target` is where the user
//!   sees the file.
//! - Within one batch every `target` is unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymlinkType {
    #[default]
    File,
    Directory,
}

impl SymlinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(Self::File),
            "directory" => Some(Self::Directory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkMetadata {
    pub created_at: DateTime<Utc>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub description: Option<String>,
}

impl Default for SymlinkMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            owner: None,
            group: None,
            description: None,
        }
    }
}

impl SymlinkMetadata {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symlink {
    pub source: PathBuf,
    pub target: PathBuf,
    pub link_type: SymlinkType,
    pub metadata: SymlinkMetadata,
}

impl Symlink {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, link_type: SymlinkType) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            link_type,
            metadata: SymlinkMetadata::default(),
        }
    }

    pub fn file(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::new(source, target, SymlinkType::File)
    }

    pub fn directory(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::new(source, target, SymlinkType::Directory)
    }

    pub fn with_metadata(mut self, metadata: SymlinkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_directory_link(&self) -> bool {
        self.link_type == SymlinkType::Directory
    }

    /// Resolves a relative `target` against `base_dir`.
    pub fn resolve_absolute_path(&self, base_dir: &Path) -> PathBuf {
        if self.target.is_absolute() {
            self.target.clone()
        } else {
            base_dir.join(&self.target)
        }
    }

    pub fn validate(&self) -> Result<(), SymlinkValidationError> {
        if self.source.as_os_str().is_empty() {
            return Err(SymlinkValidationError::EmptySource);
        }
        if self.target.as_os_str().is_empty() {
            return Err(SymlinkValidationError::EmptyTarget);
        }
        if self.source == self.target {
            return Err(SymlinkValidationError::SameSourceAndTarget(
                self.source.clone(),
            ));
        }
        Ok(())
    }
}

/// Set of links created together for one installation.
#[derive(Debug, Clone, Default)]
pub struct SymlinkBatch {
    pub links: Vec<Symlink>,
    pub base_directory: PathBuf,
}

impl SymlinkBatch {
    pub fn new(base_directory: PathBuf) -> Self {
        Self {
            links: Vec::new(),
            base_directory,
        }
    }

    pub fn add_link(&mut self, symlink: Symlink) -> Result<(), SymlinkValidationError> {
        symlink.validate()?;
        if self.links.iter().any(|link| link.target == symlink.target) {
            return Err(SymlinkValidationError::DuplicateTarget(symlink.target));
        }
        self.links.push(symlink);
        Ok(())
    }

    pub fn validate_all(&self) -> Result<(), SymlinkValidationError> {
        let mut targets = HashSet::new();
        for link in &self.links {
            link.validate()?;
            if !targets.insert(&link.target) {
                return Err(SymlinkValidationError::DuplicateTarget(link.target.clone()));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymlinkValidationError {
    EmptySource,
    EmptyTarget,
    SameSourceAndTarget(PathBuf),
    DuplicateTarget(PathBuf),
}

impl Display for SymlinkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySource => write!(f, "symlink source cannot be empty"),
            Self::EmptyTarget => write!(f, "symlink target cannot be empty"),
            Self::SameSourceAndTarget(path) => write!(
                f,
                "symlink source and target cannot be the same: {}",
                path.display()
            ),
            Self::DuplicateTarget(path) => {
                write!(f, "duplicate symlink target: {}", path.display())
            }
        }
    }
}

impl Error for SymlinkValidationError {}

#[cfg(test)]
mod tests {
    use super::{Symlink, SymlinkBatch, SymlinkValidationError};
    use std::path::{Path, PathBuf};

    #[test]
    fn resolves_relative_targets_against_base() {
        let link = Symlink::file("/pkgs/tool@1.0.0/bin/tool", ".local/bin/tool");
        assert_eq!(
            link.resolve_absolute_path(Path::new("/home/user")),
            PathBuf::from("/home/user/.local/bin/tool")
        );

        let absolute = Symlink::file("/pkgs/a", "/opt/a");
        assert_eq!(
            absolute.resolve_absolute_path(Path::new("/home/user")),
            PathBuf::from("/opt/a")
        );
    }

    #[test]
    fn rejects_degenerate_links() {
        assert_eq!(
            Symlink::file("", "/x").validate().unwrap_err(),
            SymlinkValidationError::EmptySource
        );
        assert_eq!(
            Symlink::file("/x", "").validate().unwrap_err(),
            SymlinkValidationError::EmptyTarget
        );
        assert!(matches!(
            Symlink::file("/x", "/x").validate().unwrap_err(),
            SymlinkValidationError::SameSourceAndTarget(_)
        ));
    }

    #[test]
    fn batch_rejects_duplicate_targets() {
        let mut batch = SymlinkBatch::new(PathBuf::from("/home/user"));
        batch.add_link(Symlink::file("/p/a", "bin/tool")).unwrap();
        let err = batch
            .add_link(Symlink::file("/p/b", "bin/tool"))
            .unwrap_err();
        assert_eq!(
            err,
            SymlinkValidationError::DuplicateTarget(PathBuf::from("bin/tool"))
        );
        assert_eq!(batch.len(), 1);
        assert!(batch.validate_all().is_ok());
    }
}
