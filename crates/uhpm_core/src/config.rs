//! User configuration: install mode, link root, cache policy and repositories.
//!
//! # Responsibility
//! - Load and save `config.toml` under the UHPM base directory.
//! - Validate repository declarations before they reach the registry layer.
//!
//! # Invariants
//! - A missing config file yields `UhpmConfig::default()`.
//! - Repository names are unique and non-empty.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_REPOSITORY_PRIORITY: u32 = 100;
const DEFAULT_CACHE_MAX_AGE_DAYS: u64 = 30;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
    Serialize(String),
    InvalidInstallMode(String),
    DuplicateRepository(String),
    InvalidRepository { name: String, message: String },
    RepositoryNotFound(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "config file `{}`: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid config file `{}`: {message}", path.display())
            }
            Self::Serialize(message) => write!(f, "failed to serialize config: {message}"),
            Self::InvalidInstallMode(value) => write!(
                f,
                "invalid install mode `{value}`; use `symlink`, `direct` or `auto`"
            ),
            Self::DuplicateRepository(name) => write!(f, "repository declared twice: {name}"),
            Self::InvalidRepository { name, message } => {
                write!(f, "invalid repository `{name}`: {message}")
            }
            Self::RepositoryNotFound(name) => write!(f, "repository not found: {name}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// How package files are exposed to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    Symlink,
    Direct,
    #[default]
    Auto,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symlink => "symlink",
            Self::Direct => "direct",
            Self::Auto => "auto",
        }
    }

    /// Parses user input; accepts common aliases, case-insensitive.
    pub fn parse(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "symlink" | "symbolic" | "link" => Ok(Self::Symlink),
            "direct" | "copy" | "hard" => Ok(Self::Direct),
            "auto" | "automatic" => Ok(Self::Auto),
            _ => Err(ConfigError::InvalidInstallMode(value.to_string())),
        }
    }

    pub fn should_use_symlinks(self, platform_supports_symlinks: bool) -> bool {
        match self {
            Self::Symlink => true,
            Self::Direct => false,
            Self::Auto => platform_supports_symlinks,
        }
    }
}

impl Display for InstallMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for InstallMode {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    #[default]
    Binary,
    Source,
    Universal,
    Mixed,
}

impl Display for RepositoryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Binary => "binary",
            Self::Source => "source",
            Self::Universal => "universal",
            Self::Mixed => "mixed",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RepositoryAuth {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            token: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    DEFAULT_REPOSITORY_PRIORITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub repo_type: RepositoryType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower values are consulted first.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<RepositoryAuth>,
}

impl RepositoryConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, repo_type: RepositoryType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            repo_type,
            enabled: true,
            priority: DEFAULT_REPOSITORY_PRIORITY,
            authentication: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auth(mut self, auth: RepositoryAuth) -> Self {
        self.authentication = Some(auth);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_local(&self) -> bool {
        self.url.starts_with("file://") || !self.url.contains("://")
    }

    pub fn is_remote(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.url.strip_prefix("file://") {
            Some(PathBuf::from(path))
        } else if !self.url.contains("://") {
            Some(PathBuf::from(&self.url))
        } else {
            None
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidRepository {
                name: self.name.clone(),
                message: "name cannot be empty".to_string(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidRepository {
                name: self.name.clone(),
                message: "url cannot be empty".to_string(),
            });
        }
        if !self.is_local() && !self.is_remote() {
            return Err(ConfigError::InvalidRepository {
                name: self.name.clone(),
                message: format!("unsupported url scheme: {}", self.url),
            });
        }
        Ok(())
    }
}

fn default_max_age_days() -> u64 {
    DEFAULT_CACHE_MAX_AGE_DAYS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cached archives and indexes older than this are removed by `cache clean`.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_CACHE_MAX_AGE_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UhpmConfig {
    #[serde(default)]
    pub default_install_mode: InstallMode,
    /// Directory relative symlink targets resolve against; defaults to home.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

impl UhpmConfig {
    /// Loads config from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "event=config_load module=config status=ok source=default path={}",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::from_toml_str(&raw).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        info!(
            "event=config_load module=config status=ok source=file path={} repositories={}",
            path.display(),
            config.repositories.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| ConfigError::Parse {
            path: PathBuf::new(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Serialize(err.to_string()))
    }

    /// Writes config as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;
        let rendered = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "event=config_save module=config status=ok path={}",
            path.display()
        );
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = std::collections::BTreeSet::new();
        for repository in &self.repositories {
            repository.validate()?;
            if !names.insert(repository.name.as_str()) {
                return Err(ConfigError::DuplicateRepository(repository.name.clone()));
            }
        }
        Ok(())
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|repo| repo.name == name)
    }

    pub fn add_repository(&mut self, repository: RepositoryConfig) -> ConfigResult<()> {
        repository.validate()?;
        if self.repository(&repository.name).is_some() {
            return Err(ConfigError::DuplicateRepository(repository.name));
        }
        self.repositories.push(repository);
        Ok(())
    }

    pub fn remove_repository(&mut self, name: &str) -> ConfigResult<RepositoryConfig> {
        let Some(position) = self.repositories.iter().position(|repo| repo.name == name) else {
            return Err(ConfigError::RepositoryNotFound(name.to_string()));
        };
        Ok(self.repositories.remove(position))
    }

    /// Enabled repositories, lowest priority value first; ties keep file order.
    pub fn enabled_repositories(&self) -> Vec<&RepositoryConfig> {
        let mut enabled: Vec<&RepositoryConfig> =
            self.repositories.iter().filter(|repo| repo.enabled).collect();
        enabled.sort_by_key(|repo| repo.priority);
        if enabled.is_empty() && !self.repositories.is_empty() {
            warn!("event=config_repositories module=config status=warn reason=all_disabled");
        }
        enabled
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, InstallMode, RepositoryAuth, RepositoryConfig, RepositoryType, UhpmConfig,
    };
    use std::path::PathBuf;

    #[test]
    fn parses_install_mode_aliases() {
        assert_eq!(InstallMode::parse("LINK").unwrap(), InstallMode::Symlink);
        assert_eq!(InstallMode::parse(" copy ").unwrap(), InstallMode::Direct);
        assert_eq!(InstallMode::parse("automatic").unwrap(), InstallMode::Auto);
        assert!(matches!(
            InstallMode::parse("hardlink").unwrap_err(),
            ConfigError::InvalidInstallMode(_)
        ));
    }

    #[test]
    fn auto_mode_follows_platform_support() {
        assert!(InstallMode::Auto.should_use_symlinks(true));
        assert!(!InstallMode::Auto.should_use_symlinks(false));
        assert!(InstallMode::Symlink.should_use_symlinks(false));
        assert!(!InstallMode::Direct.should_use_symlinks(true));
    }

    #[test]
    fn repository_url_classification() {
        let file = RepositoryConfig::new("a", "file:///srv/repo", RepositoryType::Binary);
        assert!(file.is_local());
        assert_eq!(file.local_path(), Some(PathBuf::from("/srv/repo")));

        let plain = RepositoryConfig::new("b", "/srv/other", RepositoryType::Binary);
        assert!(plain.is_local());

        let remote = RepositoryConfig::new("c", "https://pkgs.example.com", RepositoryType::Mixed);
        assert!(remote.is_remote());
        assert!(!remote.is_local());
        assert_eq!(remote.local_path(), None);
    }

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let config = UhpmConfig::from_toml_str(
            r#"
            default_install_mode = "direct"

            [[repositories]]
            name = "main"
            url = "https://pkgs.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_install_mode, InstallMode::Direct);
        assert_eq!(config.cache.max_age_days, 30);
        let repo = &config.repositories[0];
        assert!(repo.enabled);
        assert_eq!(repo.priority, 100);
        assert_eq!(repo.repo_type, RepositoryType::Binary);
    }

    #[test]
    fn rejects_duplicate_repository_names() {
        let err = UhpmConfig::from_toml_str(
            r#"
            [[repositories]]
            name = "main"
            url = "/a"

            [[repositories]]
            name = "main"
            url = "/b"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRepository(name) if name == "main"));
    }

    #[test]
    fn orders_enabled_repositories_by_priority() {
        let mut config = UhpmConfig::default();
        config
            .add_repository(RepositoryConfig::new("slow", "/a", RepositoryType::Binary).with_priority(200))
            .unwrap();
        config
            .add_repository(RepositoryConfig::new("off", "/b", RepositoryType::Binary).disabled())
            .unwrap();
        config
            .add_repository(RepositoryConfig::new("fast", "/c", RepositoryType::Binary).with_priority(10))
            .unwrap();

        let names: Vec<&str> = config
            .enabled_repositories()
            .iter()
            .map(|repo| repo.name.as_str())
            .collect();
        assert_eq!(names, vec!["fast", "slow"]);
    }

    #[test]
    fn save_then_load_preserves_auth_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = UhpmConfig {
            default_install_mode: InstallMode::Symlink,
            ..UhpmConfig::default()
        };
        config
            .add_repository(
                RepositoryConfig::new("private", "https://example.com/repo", RepositoryType::Binary)
                    .with_auth(RepositoryAuth::token("secret")),
            )
            .unwrap();
        config.save(&path).unwrap();

        let loaded = UhpmConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = UhpmConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, UhpmConfig::default());
    }
}
