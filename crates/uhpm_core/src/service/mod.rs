//! Package manager use-case services.
//!
//! # Responsibility
//! - Orchestrate registries, the resolver, archives and storage into
//!   install/remove/switch use-cases.
//! - Keep the CLI decoupled from storage and filesystem details.

pub mod linker;
pub mod package_manager;

pub use package_manager::{is_package_archive, PackageManager};
