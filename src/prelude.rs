//! Prelude module for convenient imports.
//!
//! ```ignore
//! use layered_vfs::prelude::*;
//! ```

// Path specifications
pub use crate::path::{PathSpec, PathSpecBuilder, TypeIndicator};

// Resolution
pub use crate::resolver::{global, FactoryFn, Resolver, ResolverHelper};

// Byte streams
pub use crate::file_io::{DataSource, FileObject, FileSystem, MemorySource, TextFile};

// Diagnostics
pub use crate::diagnostic::{format_error, VfsError, VfsResult};

// Configuration
pub use crate::config::ConfigBuilder;

// std traits needed to use FileObject
pub use std::io::{Read, Seek, SeekFrom};
