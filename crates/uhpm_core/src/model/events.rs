//! Lifecycle events published by the package manager.

use crate::model::package::{Package, PackageReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    InstallationStarted {
        package_ref: PackageReference,
    },
    InstallationCompleted {
        package: Package,
    },
    InstallationFailed {
        package_ref: PackageReference,
        error: String,
    },
    RemoveStarted {
        package_ref: PackageReference,
    },
    RemoveCompleted {
        package_ref: PackageReference,
    },
    UpdateStarted {
        package_ref: PackageReference,
    },
    UpdateCompleted {
        package: Package,
    },
    ActivationChanged {
        package_ref: PackageReference,
        active: bool,
    },
    DownloadStarted {
        package_ref: PackageReference,
        size: Option<u64>,
    },
    DownloadProgress {
        package_ref: PackageReference,
        downloaded: u64,
        total: Option<u64>,
    },
    DownloadCompleted {
        package_ref: PackageReference,
    },
    DependencyResolved {
        dependency: String,
        package_ref: PackageReference,
    },
}

impl PackageEvent {
    /// Stable event name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallationStarted { .. } => "installation_started",
            Self::InstallationCompleted { .. } => "installation_completed",
            Self::InstallationFailed { .. } => "installation_failed",
            Self::RemoveStarted { .. } => "remove_started",
            Self::RemoveCompleted { .. } => "remove_completed",
            Self::UpdateStarted { .. } => "update_started",
            Self::UpdateCompleted { .. } => "update_completed",
            Self::ActivationChanged { .. } => "activation_changed",
            Self::DownloadStarted { .. } => "download_started",
            Self::DownloadProgress { .. } => "download_progress",
            Self::DownloadCompleted { .. } => "download_completed",
            Self::DependencyResolved { .. } => "dependency_resolved",
        }
    }

    /// Package the event is about.
    pub fn package_ref(&self) -> PackageReference {
        match self {
            Self::InstallationCompleted { package } | Self::UpdateCompleted { package } => {
                package.reference()
            }
            Self::InstallationStarted { package_ref }
            | Self::InstallationFailed { package_ref, .. }
            | Self::RemoveStarted { package_ref }
            | Self::RemoveCompleted { package_ref }
            | Self::UpdateStarted { package_ref }
            | Self::ActivationChanged { package_ref, .. }
            | Self::DownloadStarted { package_ref, .. }
            | Self::DownloadProgress { package_ref, .. }
            | Self::DownloadCompleted { package_ref }
            | Self::DependencyResolved { package_ref, .. } => package_ref.clone(),
        }
    }
}
