//! Error type shared by path specifications, registries and the resolver.

use std::io;

use thiserror::Error;

use crate::path::PathSpec;

/// Result alias used throughout the crate.
pub type VfsResult<T> = Result<T, VfsError>;

/// Boxed error raised by an external format implementation.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for path specification construction and resolution.
///
/// Registration errors ([`AlreadyRegistered`](Self::AlreadyRegistered),
/// [`NotRegistered`](Self::NotRegistered)) indicate a setup bug. Mount errors
/// ([`MountNotFound`](Self::MountNotFound), [`CyclicMount`](Self::CyclicMount))
/// are expected at runtime and worth handling.
///
/// # Example
///
/// ```ignore
/// match resolver.open_file_object(&spec) {
///     Ok(file) => { /* read */ }
///     Err(VfsError::MountNotFound { identifier }) => {
///         eprintln!("mount {identifier} is gone, remount and retry");
///     }
///     Err(VfsError::OpenFailed { path_spec, source }) => {
///         eprintln!("{} failed: {source}", path_spec.type_indicator());
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum VfsError {
    /// Bad, missing or unknown parameter for a type indicator.
    #[error("invalid parameter for {type_indicator}: {message}")]
    InvalidParameter {
        /// Type indicator of the node being built or opened.
        type_indicator: String,
        /// What was wrong.
        message: String,
    },

    /// A registry key was registered twice.
    #[error("{kind} already registered: {key}")]
    AlreadyRegistered {
        /// Which registry rejected the key.
        kind: RegistryKind,
        /// The duplicate key.
        key: String,
    },

    /// A registry key was removed without being registered.
    #[error("{kind} not registered: {key}")]
    NotRegistered {
        /// Which registry rejected the key.
        kind: RegistryKind,
        /// The missing key.
        key: String,
    },

    /// A `MOUNT` node names an identifier absent from the mount table.
    #[error("mount point not found: {identifier}")]
    MountNotFound {
        /// The unresolved mount identifier.
        identifier: String,
    },

    /// Mount substitution did not terminate.
    #[error("cyclic mount point: {identifier} (gave up after {substitutions} substitutions)")]
    CyclicMount {
        /// Identifier being substituted when the bound was hit.
        identifier: String,
        /// Number of substitutions performed.
        substitutions: usize,
    },

    /// No helper is registered for the type indicator.
    #[error("unsupported type indicator: {type_indicator}")]
    UnsupportedType {
        /// The type indicator without a helper.
        type_indicator: String,
    },

    /// A helper failed to open the layer described by `path_spec`.
    #[error("failed to open {}: {source}", .path_spec.type_indicator())]
    OpenFailed {
        /// The full chain that was being opened.
        path_spec: PathSpec,
        /// The cause raised by the helper.
        #[source]
        source: Box<VfsError>,
    },

    /// Comparable text could not be parsed back into a chain.
    #[error("malformed path specification at line {line}: {message}")]
    MalformedComparable {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// I/O error from the storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Corrupt or unexpected data in a format layer.
    #[error("format error: {0}")]
    Format(String),

    /// Error raised by an external format implementation.
    #[error(transparent)]
    Backend(BackendError),
}

/// Identifies which registry produced a registration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// The mount point table.
    MountPoint,
    /// The resolver helper registry.
    Helper,
    /// The type definition registry.
    TypeDefinition,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MountPoint => f.write_str("mount point"),
            Self::Helper => f.write_str("resolver helper"),
            Self::TypeDefinition => f.write_str("type definition"),
        }
    }
}

impl VfsError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(type_indicator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            type_indicator: type_indicator.into(),
            message: message.into(),
        }
    }

    /// Create an AlreadyRegistered error.
    pub fn already_registered(kind: RegistryKind, key: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            kind,
            key: key.into(),
        }
    }

    /// Create a NotRegistered error.
    pub fn not_registered(kind: RegistryKind, key: impl Into<String>) -> Self {
        Self::NotRegistered {
            kind,
            key: key.into(),
        }
    }

    /// Create a Format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Wrap an arbitrary error raised by a format implementation.
    pub fn backend(error: impl Into<BackendError>) -> Self {
        Self::Backend(error.into())
    }

    /// Check if this error is an expected mount condition callers may recover from.
    pub fn is_mount_error(&self) -> bool {
        matches!(self, Self::MountNotFound { .. } | Self::CyclicMount { .. })
    }

    /// Check if this error is a registry setup error.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered { .. } | Self::NotRegistered { .. }
        )
    }

    /// Get the chain a failed open was annotated with, if any.
    pub fn path_spec(&self) -> Option<&PathSpec> {
        match self {
            Self::OpenFailed { path_spec, .. } => Some(path_spec),
            _ => None,
        }
    }

    /// Get the innermost cause, skipping `OpenFailed` wrappers.
    pub fn root_cause(&self) -> &VfsError {
        let mut current = self;
        while let Self::OpenFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Annotate a helper failure with the chain being opened.
    ///
    /// Resolver-level errors and errors that already carry a chain pass
    /// through unchanged, so the innermost (most precise) chain is kept.
    pub(crate) fn annotate(self, path_spec: &PathSpec) -> Self {
        match self {
            Self::Io(_) | Self::Format(_) | Self::Backend(_) | Self::InvalidParameter { .. } => {
                Self::OpenFailed {
                    path_spec: path_spec.clone(),
                    source: Box::new(self),
                }
            }
            other => other,
        }
    }
}

impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(e) => e,
            VfsError::InvalidParameter { .. } | VfsError::MalformedComparable { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            VfsError::MountNotFound { .. } => io::Error::new(io::ErrorKind::NotFound, e),
            VfsError::UnsupportedType { .. } => io::Error::new(io::ErrorKind::Unsupported, e),
            VfsError::Format(_) => io::Error::new(io::ErrorKind::InvalidData, e),
            other => io::Error::other(other),
        }
    }
}
