//! Named sub-chains spliced into other chains through `MOUNT` nodes.
//!
//! A `MOUNT(identifier=C)` node stands for whatever chain is registered
//! under `C`. The resolver substitutes it before touching any cache, so a
//! mounted chain and the chain it expands to share cache entries.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::diagnostic::{RegistryKind, VfsError, VfsResult};
use crate::path::PathSpec;

/// Parameter of a `MOUNT` node naming the mount point.
pub const IDENTIFIER_KEY: &str = "identifier";

/// Maps mount identifiers to the chains they stand for.
#[derive(Debug, Default)]
pub struct MountPointTable {
    mounts: RwLock<FxHashMap<String, PathSpec>>,
}

impl MountPointTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path_spec` under `identifier`.
    ///
    /// Fails with `AlreadyRegistered` if the identifier is taken.
    pub fn register(&self, identifier: impl Into<String>, path_spec: PathSpec) -> VfsResult<()> {
        let identifier = identifier.into();
        let mut mounts = self.mounts.write();
        if mounts.contains_key(&identifier) {
            return Err(VfsError::already_registered(
                RegistryKind::MountPoint,
                identifier,
            ));
        }
        tracing::debug!(%identifier, target = %path_spec.type_indicator(), "registered mount point");
        mounts.insert(identifier, path_spec);
        Ok(())
    }

    /// Remove a mount point, returning the chain it stood for.
    ///
    /// Fails with `NotRegistered` if the identifier is unknown.
    pub fn deregister(&self, identifier: &str) -> VfsResult<PathSpec> {
        let removed = self.mounts.write().remove(identifier);
        match removed {
            Some(path_spec) => {
                tracing::debug!(identifier, "deregistered mount point");
                Ok(path_spec)
            }
            None => Err(VfsError::not_registered(RegistryKind::MountPoint, identifier)),
        }
    }

    /// Look up the chain registered under `identifier`.
    pub fn get(&self, identifier: &str) -> Option<PathSpec> {
        self.mounts.read().get(identifier).cloned()
    }

    /// Check if `identifier` is registered.
    pub fn contains(&self, identifier: &str) -> bool {
        self.mounts.read().contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<_> = self.mounts.read().keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Number of registered mount points.
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every mount point.
    pub fn clear(&self) {
        self.mounts.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(location: &str) -> PathSpec {
        PathSpec::builder("OS")
            .param("location", location)
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let table = MountPointTable::new();
        table.register("C", image("/img.raw")).unwrap();

        assert_eq!(table.get("C"), Some(image("/img.raw")));
        assert!(table.get("D").is_none());
        assert_eq!(table.identifiers(), vec!["C".to_string()]);
    }

    #[test]
    fn test_duplicate_register_fails() {
        let table = MountPointTable::new();
        table.register("C", image("/a")).unwrap();

        let err = table.register("C", image("/b")).unwrap_err();
        assert!(matches!(
            err,
            VfsError::AlreadyRegistered {
                kind: RegistryKind::MountPoint,
                ..
            }
        ));
        assert_eq!(table.get("C"), Some(image("/a")));
    }

    #[test]
    fn test_deregister_absent_fails() {
        let table = MountPointTable::new();
        let err = table.deregister("C").unwrap_err();
        assert!(matches!(
            err,
            VfsError::NotRegistered {
                kind: RegistryKind::MountPoint,
                ..
            }
        ));
    }

    #[test]
    fn test_register_then_deregister() {
        let table = MountPointTable::new();
        table.register("C", image("/img.raw")).unwrap();

        assert_eq!(table.deregister("C").unwrap(), image("/img.raw"));
        assert!(table.get("C").is_none());
        assert!(table.is_empty());
    }
}
