//! # layered-vfs
//!
//! Open content buried under nested storage layers (a disk image inside a
//! compressed container inside a partition inside a file system) through a
//! single composite address, without knowing how many layers there are or
//! what formats they use.
//!
//! - **Path specifications**: immutable, `Arc`-shared chains of typed nodes,
//!   compared and cached by their canonical text form
//! - **Mount points**: named sub-chains spliced in through `MOUNT` nodes
//! - **Resolver helpers**: per-format open routines registered at runtime
//! - **Object cache**: opened handles shared between equal chains, released
//!   by reference count and bounded by LRU
//!
//! ## Quick Start
//!
//! ```ignore
//! use layered_vfs::prelude::*;
//!
//! let image = PathSpec::builder("OS").param("location", "/evidence/img.raw.gz").build()?;
//! let stream = PathSpec::builder("GZIP").parent(image).build()?;
//!
//! let resolver = Resolver::new();
//! let mut file = resolver.open_file_object(&stream)?;
//! let bytes = file.read_to_vec()?;
//! ```
//!
//! ## Mount Points
//!
//! ```ignore
//! resolver.register_mount_point("C", partition_chain)?;
//!
//! let mount = PathSpec::builder("MOUNT").param("identifier", "C").build()?;
//! let file = PathSpec::builder("FS").param("inode", 128).parent(mount).build()?;
//!
//! // Same cache entry as the chain with the partition spelled out.
//! let handle = resolver.open_file_object(&file)?;
//! ```
//!
//! ## Modules
//!
//! - [`path`]: path specifications, type definitions, canonical form
//! - [`mount`]: the mount point table
//! - [`resolver`]: resolver, helper registry and object cache
//! - [`file_io`]: byte sources and the [`FileObject`] cursor
//! - [`format`]: built-in `OS`, `DATA_RANGE` and `GZIP` helpers
//! - [`config`]: cache capacities and helper registration
//! - [`diagnostic`]: errors and error formatting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod diagnostic;
pub mod file_io;
pub mod format;
pub mod mount;
pub mod path;
pub mod prelude;
pub mod resolver;

// =============================================================================
// Path Specifications
// =============================================================================

pub use path::{
    PathSpec, PathSpecBuilder, ParentRule, TypeDefinition, TypeIndicator,
    register_type_definition,
};

// =============================================================================
// Resolution
// =============================================================================

pub use file_io::{DataSource, FileObject, FileSystem, MemorySource, TextFile};
pub use mount::MountPointTable;
pub use resolver::{
    CacheStats, Cached, FactoryFn, HelperRegistry, ObjectCache, Resolver, ResolverHelper,
};

// =============================================================================
// Diagnostics
// =============================================================================

pub use diagnostic::{
    // Error type
    VfsError, VfsResult,
    // Options for formatting
    DiagnosticOptions, DisplayStyle,
    // Rendering
    format_error, format_error_with_options,
};

// =============================================================================
// Infrastructure
// =============================================================================

pub use config::{Config, ConfigBuilder};
