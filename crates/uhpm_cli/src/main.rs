//! `uhpm` command-line front end.
//!
//! # Responsibility
//! - Parse commands and global flags.
//! - Bootstrap logging, then delegate to `uhpm_core::PackageManager`.
//! - Render results as text or, with `--json`, as JSON on stdout.

mod output;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use output::Output;
use semver::Version;
use std::path::{Path, PathBuf};
use uhpm_core::paths::UHPM_HOME_ENV;
use uhpm_core::{
    default_log_level, init_logging_with, HomePaths, LogLevel, LoggingOptions, PackageManager,
    PackageReference, PackageRequest, RepositoryAuth, RepositoryConfig, RepositoryType,
    UhpmConfig, UhpmError, UhpmPaths,
};

/// Universal home package manager
#[derive(Parser, Debug)]
#[command(name = "uhpm", version, about, long_about = None)]
struct Cli {
    /// UHPM base directory (defaults to ~/.uhpm)
    #[arg(long, global = true, env = UHPM_HOME_ENV)]
    home: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also print warnings and errors from the log on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a package from the repositories or a local .uhp file
    Install {
        /// `name`, `name@1.2.3` or `name@^1.2`
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        package: Option<String>,
        /// Local package archive
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Remove an installed package version
    Remove {
        /// `name@version`
        package: String,
        /// Remove even when other packages depend on it
        #[arg(long)]
        force: bool,
    },
    /// Activate another version of an installed package
    Switch { name: String, version: String },
    /// Update one package, or every package with a newer release
    Update { name: Option<String> },
    /// List installed packages
    List,
    /// Search the repositories
    Search { query: String },
    /// Show package details
    Info {
        /// `name`, `name@1.2.3` or `name@^1.2`
        package: String,
    },
    /// Expose an installed version through symlinks or copies
    Activate { package: String },
    /// Remove the links of an installed version
    Deactivate { package: String },
    /// Check the files of an installed version
    Verify { package: String },
    /// Refresh repository indexes
    Sync,
    /// Manage repositories
    #[command(subcommand)]
    Repo(RepoCommand),
    /// Inspect or clean the download cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum RepoCommand {
    /// List configured repositories
    List,
    /// Add a repository
    Add(RepoAddArgs),
    /// Remove a repository
    Remove { name: String },
}

#[derive(Args, Debug)]
struct RepoAddArgs {
    name: String,
    /// `https://...`, `file://...` or a directory path
    url: String,
    /// Lower values are consulted first
    #[arg(long, default_value_t = 100)]
    priority: u32,
    #[arg(long = "type", value_enum, default_value_t = RepoTypeArg::Binary)]
    repo_type: RepoTypeArg,
    /// Bearer token
    #[arg(long, conflicts_with_all = ["username", "password"])]
    token: Option<String>,
    #[arg(long, requires = "password")]
    username: Option<String>,
    #[arg(long, requires = "username")]
    password: Option<String>,
    /// Add the repository disabled
    #[arg(long)]
    disabled: bool,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum RepoTypeArg {
    Binary,
    Source,
    Universal,
    Mixed,
}

impl From<RepoTypeArg> for RepositoryType {
    fn from(value: RepoTypeArg) -> Self {
        match value {
            RepoTypeArg::Binary => Self::Binary,
            RepoTypeArg::Source => Self::Source,
            RepoTypeArg::Universal => Self::Universal,
            RepoTypeArg::Mixed => Self::Mixed,
        }
    }
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print the cache size in bytes
    Size,
    /// Remove stale cache entries
    Clean {
        /// Remove every cached archive regardless of age
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the configuration file path
    Path,
}

fn main() {
    let cli = Cli::parse();
    let out = Output::new(cli.json);
    if let Err(err) = run(cli, &out) {
        out.error(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli, out: &Output) -> Result<()> {
    let paths = resolve_paths(cli.home.as_deref())?;
    let config = UhpmConfig::load(&paths.config_path())
        .with_context(|| format!("loading {}", paths.config_path().display()))?;
    start_logging(cli.log_level.as_deref(), cli.verbose, &config, &paths);
    debug!(
        "event=cli_start module=cli status=ok version={} home={}",
        uhpm_core::core_version(),
        paths.base_dir().display()
    );

    let command = match cli.command {
        Command::Config(command) => return run_config(command, &paths, &config, out),
        Command::Repo(command) => return run_repo(command, &paths, config, out),
        command => command,
    };

    let manager = PackageManager::open(paths)?;
    match command {
        Command::Install { package, file } => {
            let result = match (file, package) {
                (Some(file), _) => manager.install_archive(&file)?,
                (None, Some(package)) if is_local_archive(&package) => {
                    manager.install_archive(Path::new(&package))?
                }
                (None, Some(package)) => manager.install(&PackageRequest::parse(&package)?)?,
                (None, None) => bail!("nothing to install"),
            };
            out.install(&result)
        }
        Command::Remove { package, force } => {
            let result = manager.remove(&PackageReference::parse(&package)?, force)?;
            out.removal(&result)
        }
        Command::Switch { name, version } => {
            let version = Version::parse(&version)
                .with_context(|| format!("invalid version `{version}`"))?;
            out.switches(&[manager.switch(&name, &version)?])
        }
        Command::Update { name } => {
            let results = match name {
                Some(name) => manager.update(&name)?.into_iter().collect(),
                None => manager.update_all()?,
            };
            out.switches(&results)
        }
        Command::List => out.packages(&manager.list_installed()?),
        Command::Search { query } => out.packages(&manager.search(&query)?),
        Command::Info { package } => out.package(&manager.info(&PackageRequest::parse(&package)?)?),
        Command::Activate { package } => {
            let reference = PackageReference::parse(&package)?;
            let installation = manager.activate(&reference)?;
            out.message(
                &format!(
                    "activated {reference} ({} entries)",
                    installation.exposed_count()
                ),
                serde_json::json!({
                    "package": reference.to_string(),
                    "active": true,
                    "entries": installation.exposed_count(),
                }),
            )
        }
        Command::Deactivate { package } => {
            let reference = PackageReference::parse(&package)?;
            let removed = manager.deactivate(&reference)?;
            out.message(
                &format!("deactivated {reference} ({removed} entries removed)"),
                serde_json::json!({
                    "package": reference.to_string(),
                    "active": false,
                    "removed": removed,
                }),
            )
        }
        Command::Verify { package } => {
            let reference = PackageReference::parse(&package)?;
            let report = manager.verify(&reference)?;
            out.integrity(&reference, &report)?;
            if !report.is_ok() {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Sync => {
            let reports = manager.sync_repositories();
            out.sync(&reports)?;
            if reports.iter().any(|report| report.result.is_err()) {
                bail!("some repositories could not be synchronized");
            }
            Ok(())
        }
        Command::Cache(CacheCommand::Size) => {
            let size = manager.cache_size()?;
            out.message(
                &format!("{size} bytes"),
                serde_json::json!({ "bytes": size }),
            )
        }
        Command::Cache(CacheCommand::Clean { all }) => {
            if all {
                manager.clear_cache()?;
                out.message("cache cleared", serde_json::json!({ "cleared": true }))
            } else {
                let removed = manager.clean_cache()?;
                out.message(
                    &format!("removed {removed} stale entries"),
                    serde_json::json!({ "removed": removed }),
                )
            }
        }
        Command::Config(_) | Command::Repo(_) => Ok(()),
    }
}

fn run_config(
    command: ConfigCommand,
    paths: &HomePaths,
    config: &UhpmConfig,
    out: &Output,
) -> Result<()> {
    let config_path = paths.config_path();
    match command {
        ConfigCommand::Show => out.config(config),
        ConfigCommand::Path => out.message(
            &config_path.display().to_string(),
            serde_json::json!({ "path": config_path }),
        ),
        ConfigCommand::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    config_path.display()
                );
            }
            UhpmConfig::default().save(&config_path)?;
            out.message(
                &format!("wrote {}", config_path.display()),
                serde_json::json!({ "path": config_path }),
            )
        }
    }
}

fn run_repo(
    command: RepoCommand,
    paths: &HomePaths,
    mut config: UhpmConfig,
    out: &Output,
) -> Result<()> {
    match command {
        RepoCommand::List => out.repositories(&config.repositories),
        RepoCommand::Add(args) => {
            let mut repository = RepositoryConfig::new(&args.name, &args.url, args.repo_type.into())
                .with_priority(args.priority);
            if let Some(token) = args.token {
                repository = repository.with_auth(RepositoryAuth::token(token));
            } else if let (Some(username), Some(password)) = (args.username, args.password) {
                repository = repository.with_auth(RepositoryAuth::basic(username, password));
            }
            if args.disabled {
                repository = repository.disabled();
            }
            config.add_repository(repository)?;
            config.save(&paths.config_path())?;
            out.message(
                &format!("added repository {}", args.name),
                serde_json::json!({ "added": args.name }),
            )
        }
        RepoCommand::Remove { name } => {
            let removed = config.remove_repository(&name)?;
            config.save(&paths.config_path())?;
            out.message(
                &format!("removed repository {}", removed.name),
                serde_json::json!({ "removed": removed.name }),
            )
        }
    }
}

fn resolve_paths(home: Option<&Path>) -> Result<HomePaths> {
    let paths = match home {
        Some(home) => HomePaths::at(home),
        None => HomePaths::from_env().ok_or(UhpmError::HomeDirUnavailable)?,
    };
    if paths.base_dir().is_absolute() {
        return Ok(paths);
    }
    let cwd = std::env::current_dir().context("resolving the current directory")?;
    Ok(HomePaths::at(cwd.join(paths.base_dir())))
}

/// Logging failures are reported but never stop the command.
fn start_logging(flag: Option<&str>, verbose: bool, config: &UhpmConfig, paths: &HomePaths) {
    let level = match flag.or(config.log_level.as_deref()).map(LogLevel::parse) {
        Some(Ok(level)) => level,
        Some(Err(err)) => {
            eprintln!("warning: {err}; using {}", default_log_level());
            default_log_level()
        }
        None => default_log_level(),
    };
    let mut options = LoggingOptions::new(level, paths.log_dir());
    if verbose {
        options = options.echo(LogLevel::Warn);
    }
    if let Err(err) = init_logging_with(&options) {
        eprintln!("warning: logging disabled: {err}");
    }
}

fn is_local_archive(argument: &str) -> bool {
    let path = Path::new(argument);
    uhpm_core::service::is_package_archive(path) && path.is_file()
}
