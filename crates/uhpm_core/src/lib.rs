//! Core domain logic for UHPM, the universal home package manager.
//! This crate owns package state, resolution and installation; the CLI is a
//! thin front end over `PackageManager`.

pub mod archive;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod net;
pub mod paths;
pub mod registry;
pub mod repo;
pub mod resolver;
pub mod service;

pub use config::{InstallMode, RepositoryAuth, RepositoryConfig, RepositoryType, UhpmConfig};
pub use error::{UhpmError, UhpmResult};
pub use events::{EventBus, EventPublisher, SubscriptionId};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogLevel, LoggingError,
    LoggingOptions, LoggingStatus,
};
pub use model::events::PackageEvent;
pub use model::installation::{Installation, IntegrityReport};
pub use model::operations::{InstallResult, RemovalResult, SwitchResult, UpdateCandidate};
pub use model::package::{Package, PackageId, PackageReference, PackageRequest, PackageSource};
pub use paths::{HomePaths, UhpmPaths};
pub use registry::{PackageRegistry, RegistrySet};
pub use resolver::{DependencyResolver, ResolutionPlan};
pub use service::PackageManager;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
