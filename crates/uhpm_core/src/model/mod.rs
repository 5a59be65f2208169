//! Package manager domain model.
//!
//! # Responsibility
//! - Define the records shared by registries, the resolver, storage and the
//!   package manager service.
//! - Keep parsing and validation rules next to the data they guard.
//!
//! # Invariants
//! - Every package release is identified by a stable `PackageId`.
//! - Model types never touch the database; `Installation::verify_integrity`
//!   is the only model operation that reads the filesystem.

pub mod dependency;
pub mod events;
pub mod file_metadata;
pub mod index;
pub mod installation;
pub mod operations;
pub mod package;
pub mod symlink;
pub mod target;
