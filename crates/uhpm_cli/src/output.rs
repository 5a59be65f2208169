//! Text and JSON rendering of command results.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use uhpm_core::registry::set::SyncReport;
use uhpm_core::{
    InstallResult, IntegrityReport, Package, PackageReference, RemovalResult, RepositoryConfig,
    SwitchResult, UhpmConfig,
};

const REDACTED: &str = "***";

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn error(&self, err: &anyhow::Error) {
        if self.json {
            let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
            println!("{}", json!({ "error": err.to_string(), "causes": chain }));
        } else {
            eprintln!("error: {err:#}");
        }
    }

    pub fn message(&self, text: &str, value: serde_json::Value) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{text}");
        }
        Ok(())
    }

    pub fn install(&self, result: &InstallResult) -> Result<()> {
        if self.json {
            return self.print_json(result);
        }
        for reference in &result.installed_packages {
            println!("installed {reference}");
        }
        println!(
            "{} active: {} links, {} files exposed",
            result.package_id,
            result.symlinks_created,
            result.installed_files.len()
        );
        Ok(())
    }

    pub fn removal(&self, result: &RemovalResult) -> Result<()> {
        if self.json {
            return self.print_json(result);
        }
        println!(
            "removed {} ({} files, {} bytes freed)",
            result.package_id, result.removed_files, result.freed_space
        );
        Ok(())
    }

    pub fn switches(&self, results: &[SwitchResult]) -> Result<()> {
        if self.json {
            return self.print_json(&results);
        }
        if results.is_empty() {
            println!("everything is up to date");
        }
        for result in results {
            match &result.from_version {
                Some(from) if *from == result.to_version => {
                    println!("{} is already at {}", result.package_name, from)
                }
                Some(from) => println!(
                    "{}: {} -> {}",
                    result.package_name, from, result.to_version
                ),
                None => println!("{}: activated {}", result.package_name, result.to_version),
            }
        }
        Ok(())
    }

    pub fn packages(&self, packages: &[Package]) -> Result<()> {
        if self.json {
            return self.print_json(&packages);
        }
        if packages.is_empty() {
            println!("no packages");
        }
        for package in packages {
            let marker = if package.active { "*" } else { " " };
            let description = package.description.as_deref().unwrap_or("");
            println!("{marker} {:<30} {description}", package.id());
        }
        Ok(())
    }

    pub fn package(&self, package: &Package) -> Result<()> {
        if self.json {
            return self.print_json(package);
        }
        println!("name:        {}", package.name);
        println!("version:     {}", package.version);
        println!("author:      {}", package.author);
        if let Some(description) = &package.description {
            println!("description: {description}");
        }
        println!(
            "source:      {} {}",
            package.source.kind(),
            package.source.location()
        );
        println!("target:      {}", package.target);
        if !package.dependencies.is_empty() {
            let deps: Vec<String> = package.dependencies.iter().map(ToString::to_string).collect();
            println!("depends on:  {}", deps.join(", "));
        }
        if !package.provides.is_empty() {
            println!("provides:    {}", package.provides.join(", "));
        }
        if !package.conflicts.is_empty() {
            println!("conflicts:   {}", package.conflicts.join(", "));
        }
        println!(
            "status:      {}",
            match (package.installed, package.active) {
                (true, true) => "installed, active",
                (true, false) => "installed",
                _ => "available",
            }
        );
        Ok(())
    }

    pub fn integrity(&self, reference: &PackageReference, report: &IntegrityReport) -> Result<()> {
        if self.json {
            return self.print_json(&json!({
                "package": reference.to_string(),
                "ok": report.is_ok(),
                "missing": report.missing,
                "modified": report.modified,
            }));
        }
        if report.is_ok() {
            println!("{reference}: ok");
            return Ok(());
        }
        for path in &report.missing {
            println!("missing:  {}", path.display());
        }
        for path in &report.modified {
            println!("modified: {}", path.display());
        }
        Ok(())
    }

    pub fn sync(&self, reports: &[SyncReport]) -> Result<()> {
        if self.json {
            let rendered: Vec<serde_json::Value> = reports
                .iter()
                .map(|report| match &report.result {
                    Ok(count) => json!({ "registry": report.registry, "packages": count }),
                    Err(err) => json!({ "registry": report.registry, "error": err.to_string() }),
                })
                .collect();
            return self.print_json(&rendered);
        }
        if reports.is_empty() {
            println!("no enabled repositories");
        }
        for report in reports {
            match &report.result {
                Ok(count) => println!("{}: {count} packages", report.registry),
                Err(err) => println!("{}: failed: {err}", report.registry),
            }
        }
        Ok(())
    }

    pub fn config(&self, config: &UhpmConfig) -> Result<()> {
        let mut shown = config.clone();
        for repository in &mut shown.repositories {
            redact(repository);
        }
        if self.json {
            return self.print_json(&shown);
        }
        print!("{}", shown.to_toml_string()?);
        Ok(())
    }

    pub fn repositories(&self, repositories: &[RepositoryConfig]) -> Result<()> {
        let shown: Vec<RepositoryConfig> = repositories
            .iter()
            .cloned()
            .map(|mut repository| {
                redact(&mut repository);
                repository
            })
            .collect();
        if self.json {
            return self.print_json(&shown);
        }
        if shown.is_empty() {
            println!("no repositories configured");
        }
        for repository in &shown {
            println!(
                "{:<16} {:>4} {:<9} {}{}",
                repository.name,
                repository.priority,
                repository.repo_type,
                repository.url,
                if repository.enabled { "" } else { " (disabled)" }
            );
        }
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn redact(repository: &mut RepositoryConfig) {
    if let Some(auth) = &mut repository.authentication {
        if auth.password.is_some() {
            auth.password = Some(REDACTED.to_string());
        }
        if auth.token.is_some() {
            auth.token = Some(REDACTED.to_string());
        }
    }
}
