//! Resolver helpers: format-specific factories keyed by type indicator.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::Resolver;
use crate::diagnostic::{RegistryKind, VfsError, VfsResult};
use crate::file_io::{DataSource, FileSystem};
use crate::path::{PathSpec, TypeIndicator};

// =============================================================================
// ResolverHelper Trait
// =============================================================================

/// Opens the layer described by a path specification of one type.
///
/// A helper that reads through its parent layer re-resolves the parent via
/// the `resolver` it is handed (usually with
/// [`Resolver::open_parent`]), which goes through the same cache.
///
/// # Example
///
/// ```ignore
/// struct XorHelper;
///
/// impl ResolverHelper for XorHelper {
///     fn type_indicator(&self) -> TypeIndicator {
///         TypeIndicator::from_static("XOR")
///     }
///
///     fn open_file_object(
///         &self,
///         path_spec: &PathSpec,
///         resolver: &Resolver,
///     ) -> VfsResult<Arc<dyn DataSource>> {
///         let parent = resolver.open_parent(path_spec)?;
///         Ok(Arc::new(XorStream::new(parent)))
///     }
/// }
/// ```
pub trait ResolverHelper: Send + Sync {
    /// The type indicator this helper handles.
    fn type_indicator(&self) -> TypeIndicator;

    /// Open the byte stream described by `path_spec`.
    fn open_file_object(
        &self,
        path_spec: &PathSpec,
        resolver: &Resolver,
    ) -> VfsResult<Arc<dyn DataSource>>;

    /// Open the structural layer `path_spec` belongs to.
    ///
    /// Only helpers for file-system or volume-system types implement this.
    fn open_file_system(
        &self,
        path_spec: &PathSpec,
        resolver: &Resolver,
    ) -> VfsResult<Arc<dyn FileSystem>> {
        let _ = resolver;
        Err(VfsError::UnsupportedType {
            type_indicator: format!("{} (file system)", path_spec.type_indicator()),
        })
    }
}

// =============================================================================
// FactoryFn
// =============================================================================

type OpenFn = dyn Fn(&PathSpec, &Resolver) -> VfsResult<Arc<dyn DataSource>> + Send + Sync;

/// A helper built from a closure.
///
/// # Example
///
/// ```ignore
/// resolver.register_helper(FactoryFn::new("QCOW", |spec, resolver| {
///     let parent = resolver.open_parent(spec)?;
///     Ok(Arc::new(QcowImage::open(parent)?))
/// }))?;
/// ```
pub struct FactoryFn {
    type_indicator: TypeIndicator,
    open: Box<OpenFn>,
}

impl FactoryFn {
    /// Create a helper for `type_indicator` that opens with `open`.
    pub fn new<F>(type_indicator: impl Into<TypeIndicator>, open: F) -> Self
    where
        F: Fn(&PathSpec, &Resolver) -> VfsResult<Arc<dyn DataSource>> + Send + Sync + 'static,
    {
        Self {
            type_indicator: type_indicator.into(),
            open: Box::new(open),
        }
    }
}

impl ResolverHelper for FactoryFn {
    fn type_indicator(&self) -> TypeIndicator {
        self.type_indicator.clone()
    }

    fn open_file_object(
        &self,
        path_spec: &PathSpec,
        resolver: &Resolver,
    ) -> VfsResult<Arc<dyn DataSource>> {
        (self.open)(path_spec, resolver)
    }
}

// =============================================================================
// HelperRegistry
// =============================================================================

/// Maps type indicators to their helpers.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: RwLock<FxHashMap<TypeIndicator, Arc<dyn ResolverHelper>>>,
}

impl HelperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper under its type indicator.
    ///
    /// Fails with `AlreadyRegistered` if a helper for the type exists.
    pub fn register(&self, helper: impl ResolverHelper + 'static) -> VfsResult<()> {
        self.register_arc(Arc::new(helper))
    }

    /// Register a helper that is already wrapped in `Arc`.
    pub fn register_arc(&self, helper: Arc<dyn ResolverHelper>) -> VfsResult<()> {
        let type_indicator = helper.type_indicator();
        let mut helpers = self.helpers.write();
        if helpers.contains_key(type_indicator.as_str()) {
            return Err(VfsError::already_registered(
                RegistryKind::Helper,
                type_indicator.as_str(),
            ));
        }
        tracing::debug!(type_indicator = %type_indicator, "registered resolver helper");
        helpers.insert(type_indicator, helper);
        Ok(())
    }

    /// Remove the helper for a type indicator.
    ///
    /// Fails with `NotRegistered` if there is none.
    pub fn deregister(&self, type_indicator: &str) -> VfsResult<Arc<dyn ResolverHelper>> {
        let removed = self.helpers.write().remove(type_indicator);
        match removed {
            Some(helper) => {
                tracing::debug!(type_indicator, "deregistered resolver helper");
                Ok(helper)
            }
            None => Err(VfsError::not_registered(RegistryKind::Helper, type_indicator)),
        }
    }

    /// Look up the helper for a type indicator.
    pub fn get(&self, type_indicator: &str) -> Option<Arc<dyn ResolverHelper>> {
        self.helpers.read().get(type_indicator).cloned()
    }

    /// Check if a helper is registered for the type indicator.
    pub fn contains(&self, type_indicator: &str) -> bool {
        self.helpers.read().contains_key(type_indicator)
    }

    /// Registered type indicators, sorted.
    pub fn type_indicators(&self) -> Vec<TypeIndicator> {
        let mut indicators: Vec<_> = self.helpers.read().keys().cloned().collect();
        indicators.sort();
        indicators
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.read().len()
    }

    /// Check if no helper is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("type_indicators", &self.type_indicators())
            .finish()
    }
}
