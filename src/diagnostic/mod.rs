//! Errors and diagnostic formatting for path resolution.

mod error;
mod format;

pub use error::{BackendError, RegistryKind, VfsError, VfsResult};
pub use format::{
    chain_summary, format_error, format_error_with_options, hint, DiagnosticOptions,
    DisplayStyle,
};
