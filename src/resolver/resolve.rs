//! The resolver: mount substitution, cache lookup and helper dispatch.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use super::cache::{CacheStats, Cached, ObjectCache};
use super::helper::{HelperRegistry, ResolverHelper};
use crate::config::{self, Config};
use crate::diagnostic::{VfsError, VfsResult};
use crate::file_io::{DataSource, FileObject, FileSystem};
use crate::mount::{MountPointTable, IDENTIFIER_KEY};
use crate::path::{comparable, PathSpec, TypeIndicator};

/// Opens path specification chains into byte streams.
///
/// A resolver owns its mount point table, helper registry and two caches
/// (file objects and file systems). Cloning is cheap and clones share all
/// of that state.
///
/// # Resolution
///
/// ```text
/// open_file_object(spec)
/// ├── normalize        MOUNT nodes replaced by their registered chains
/// ├── cache lookup     key = comparable form of the normalized chain
/// └── on miss          helper for the leaf type opens it, re-resolving
///                      the parent through this resolver when it needs to
/// ```
///
/// # Example
///
/// ```ignore
/// let resolver = Resolver::new();
/// let spec = PathSpec::builder("OS").param("location", "/img.raw.gz").build()?;
/// let spec = PathSpec::builder("GZIP").parent(spec).build()?;
///
/// let mut file = resolver.open_file_object(&spec)?;
/// let bytes = file.read_to_vec()?;
/// ```
#[derive(Clone)]
pub struct Resolver {
    helpers: Arc<HelperRegistry>,
    mount_points: Arc<MountPointTable>,
    file_objects: ObjectCache<dyn DataSource>,
    file_systems: ObjectCache<dyn FileSystem>,
}

impl Resolver {
    /// Create a resolver from the global configuration.
    pub fn new() -> Self {
        Self::with_config(config::get())
    }

    /// Create a resolver from an explicit configuration.
    pub fn with_config(config: &Config) -> Self {
        let helpers = HelperRegistry::new();
        if config.builtin_helpers {
            for helper in crate::format::builtin_helpers(config) {
                if let Err(e) = helpers.register_arc(helper) {
                    tracing::warn!(error = %e, "skipped built-in helper");
                }
            }
        }

        Self {
            helpers: Arc::new(helpers),
            mount_points: Arc::new(MountPointTable::new()),
            file_objects: ObjectCache::new("file_objects", config.max_file_objects),
            file_systems: ObjectCache::new("file_systems", config.max_file_systems),
        }
    }

    // =========================================================================
    // Registries
    // =========================================================================

    /// The helper registry this resolver dispatches through.
    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    /// The mount point table this resolver substitutes from.
    pub fn mount_points(&self) -> &MountPointTable {
        &self.mount_points
    }

    /// Register a resolver helper. See [`HelperRegistry::register`].
    pub fn register_helper(&self, helper: impl ResolverHelper + 'static) -> VfsResult<()> {
        self.helpers.register(helper)
    }

    /// Remove a resolver helper. See [`HelperRegistry::deregister`].
    pub fn deregister_helper(&self, type_indicator: &str) -> VfsResult<()> {
        self.helpers.deregister(type_indicator).map(drop)
    }

    /// Register a mount point. See [`MountPointTable::register`].
    pub fn register_mount_point(
        &self,
        identifier: impl Into<String>,
        path_spec: PathSpec,
    ) -> VfsResult<()> {
        self.mount_points.register(identifier, path_spec)
    }

    /// Remove a mount point. See [`MountPointTable::deregister`].
    pub fn deregister_mount_point(&self, identifier: &str) -> VfsResult<PathSpec> {
        self.mount_points.deregister(identifier)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Replace every `MOUNT` node in the chain with its registered target.
    ///
    /// The leaf-most mount node is substituted first; the nodes above it are
    /// rebuilt on top of the target and the mount node's own ancestors are
    /// dropped. Substitution repeats until no mount node is left.
    ///
    /// # Errors
    ///
    /// - `MountNotFound` if a mount identifier is not registered.
    /// - `CyclicMount` after more substitutions than there are mount points
    ///   plus one.
    pub fn normalize(&self, path_spec: &PathSpec) -> VfsResult<PathSpec> {
        let limit = self.mount_points.len() + 1;
        let mut current = path_spec.clone();
        let mut substitutions = 0;

        while let Some(mount) = current.find(TypeIndicator::MOUNT.as_str()) {
            let identifier = mount.get(IDENTIFIER_KEY).unwrap_or_default().to_owned();
            if substitutions >= limit {
                return Err(VfsError::CyclicMount {
                    identifier,
                    substitutions,
                });
            }

            let target = self
                .mount_points
                .get(&identifier)
                .ok_or_else(|| VfsError::MountNotFound {
                    identifier: identifier.clone(),
                })?;

            let above: Vec<&PathSpec> = current
                .ancestors()
                .take_while(|spec| !spec.ptr_eq(mount))
                .collect();
            let mut rebuilt = target;
            for spec in above.into_iter().rev() {
                rebuilt = spec.with_parent(Some(rebuilt))?;
            }

            tracing::debug!(%identifier, "substituted mount point");
            substitutions += 1;
            current = rebuilt;
        }

        Ok(current)
    }

    /// Open the byte stream a chain describes.
    ///
    /// Equal chains share one cached source; each call returns its own
    /// cursor at offset zero. Nothing is cached when the open fails.
    ///
    /// # Errors
    ///
    /// - Mount errors from [`normalize`](Self::normalize).
    /// - `UnsupportedType` if no helper handles the leaf type.
    /// - `OpenFailed` wrapping the helper's error, annotated with the chain.
    pub fn open_file_object(&self, path_spec: &PathSpec) -> VfsResult<FileObject> {
        let path_spec = self.normalize(path_spec)?;
        let _span = tracing::debug_span!(
            "open_file_object",
            type_indicator = %path_spec.type_indicator(),
            depth = path_spec.depth(),
        )
        .entered();

        let source = self
            .file_objects
            .get_or_try_insert_with(path_spec.comparable(), || {
                let helper = self.helper_for(path_spec.type_indicator())?;
                helper
                    .open_file_object(&path_spec, self)
                    .map_err(|e| e.annotate(&path_spec))
            })?;

        Ok(FileObject::new(path_spec, source))
    }

    /// Open the byte stream of the layer below `path_spec`.
    ///
    /// This is what helpers call to read through their parent.
    pub fn open_parent(&self, path_spec: &PathSpec) -> VfsResult<FileObject> {
        let parent = path_spec.parent().ok_or_else(|| {
            VfsError::invalid_parameter(path_spec.type_indicator().as_str(), "missing parent")
        })?;
        self.open_file_object(parent)
    }

    /// Open the file system a chain's leaf node lives in.
    ///
    /// The cache key is the parent chain plus the leaf's type indicator
    /// without its parameters, so every file in one file system shares a
    /// single opened instance.
    pub fn open_file_system(&self, path_spec: &PathSpec) -> VfsResult<Cached<dyn FileSystem>> {
        let path_spec = self.normalize(path_spec)?;
        let _span = tracing::debug_span!(
            "open_file_system",
            type_indicator = %path_spec.type_indicator(),
        )
        .entered();

        let key = file_system_key(&path_spec);
        self.file_systems.get_or_try_insert_with(&key, || {
            let helper = self.helper_for(path_spec.type_indicator())?;
            helper
                .open_file_system(&path_spec, self)
                .map_err(|e| e.annotate(&path_spec))
        })
    }

    fn helper_for(&self, type_indicator: &TypeIndicator) -> VfsResult<Arc<dyn ResolverHelper>> {
        self.helpers
            .get(type_indicator.as_str())
            .ok_or_else(|| VfsError::UnsupportedType {
                type_indicator: type_indicator.to_string(),
            })
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// Cache of opened byte streams, keyed by comparable form.
    pub fn file_object_cache(&self) -> &ObjectCache<dyn DataSource> {
        &self.file_objects
    }

    /// Cache of opened file systems.
    pub fn file_system_cache(&self) -> &ObjectCache<dyn FileSystem> {
        &self.file_systems
    }

    /// Statistics for the file object and file system caches.
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.file_objects.stats(), self.file_systems.stats())
    }

    /// Drop every cached object. Handles already returned stay usable.
    pub fn clear_caches(&self) {
        self.file_objects.clear();
        self.file_systems.clear();
        tracing::debug!("cleared resolver caches");
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("helpers", &self.helpers)
            .field("mount_points", &self.mount_points.identifiers())
            .field("file_objects", &self.file_objects)
            .field("file_systems", &self.file_systems)
            .finish()
    }
}

fn file_system_key(path_spec: &PathSpec) -> String {
    let mut key = path_spec
        .parent()
        .map(|parent| parent.comparable().to_owned())
        .unwrap_or_default();
    comparable::write_line(&mut key, path_spec.type_indicator(), &BTreeMap::new());
    key
}

// =============================================================================
// Global Resolver
// =============================================================================

/// Process-wide resolver, built from [`config::get`] on first use.
static GLOBAL: LazyLock<Resolver> = LazyLock::new(Resolver::new);

/// Get the process-wide resolver.
///
/// Its registries live as long as the process; call
/// [`Resolver::clear_caches`] to release cached handles.
pub fn global() -> &'static Resolver {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::file_io::MemorySource;
    use crate::resolver::FactoryFn;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolver() -> Resolver {
        Resolver::with_config(&ConfigBuilder::new().builtin_helpers(false).build())
    }

    fn memory(data: &str) -> Arc<dyn DataSource> {
        Arc::new(MemorySource::new(data.as_bytes()))
    }

    /// Registers `OS` as an in-memory source and the given types as
    /// pass-through layers, each counting how often it is opened.
    fn counting_resolver(layers: &[&'static str]) -> (Resolver, Arc<AtomicUsize>) {
        let resolver = resolver();
        let opens = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&opens);
        resolver
            .register_helper(FactoryFn::new("OS", move |spec, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(memory(spec.get("location").unwrap_or_default()))
            }))
            .unwrap();

        for &layer in layers {
            let counter = Arc::clone(&opens);
            resolver
                .register_helper(FactoryFn::new(layer, move |spec, resolver| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::clone(resolver.open_parent(spec)?.source()))
                }))
                .unwrap();
        }

        (resolver, opens)
    }

    fn os(location: &str) -> PathSpec {
        PathSpec::builder("OS")
            .param("location", location)
            .build()
            .unwrap()
    }

    fn layer(type_indicator: &'static str, parent: PathSpec) -> PathSpec {
        PathSpec::builder(type_indicator).parent(parent).build().unwrap()
    }

    fn mount(identifier: &str) -> PathSpec {
        PathSpec::builder("MOUNT")
            .param("identifier", identifier)
            .build()
            .unwrap()
    }

    #[test]
    fn test_open_reads_through_layers() {
        let (resolver, _) = counting_resolver(&["QCOW"]);
        let spec = layer("QCOW", os("/img.qcow2"));

        let mut file = resolver.open_file_object(&spec).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();

        assert_eq!(text, "/img.qcow2");
        assert_eq!(file.path_spec(), &spec);
    }

    #[test]
    fn test_equal_chains_open_once() {
        let (resolver, opens) = counting_resolver(&["QCOW"]);

        let a = resolver.open_file_object(&layer("QCOW", os("/a"))).unwrap();
        let b = resolver.open_file_object(&layer("QCOW", os("/a"))).unwrap();

        assert!(Arc::ptr_eq(a.source(), b.source()));
        assert_eq!(opens.load(Ordering::SeqCst), 2); // OS + QCOW
        assert_eq!(
            resolver.file_object_cache().references(a.path_spec().comparable()),
            Some(2)
        );
    }

    #[test]
    fn test_shared_prefix_opened_once() {
        let (resolver, opens) = counting_resolver(&["QCOW", "RAW"]);
        let base = os("/a");

        let _qcow = resolver.open_file_object(&layer("QCOW", base.clone())).unwrap();
        let _raw = resolver.open_file_object(&layer("RAW", base)).unwrap();

        assert_eq!(opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsupported_type() {
        let (resolver, _) = counting_resolver(&[]);
        let err = resolver
            .open_file_object(&layer("GZIP", os("/a")))
            .unwrap_err();

        assert!(matches!(
            err,
            VfsError::UnsupportedType { ref type_indicator } if type_indicator == "GZIP"
        ));
        assert!(resolver.file_object_cache().is_empty());
    }

    #[test]
    fn test_failed_open_is_annotated_and_not_cached() {
        let (resolver, _) = counting_resolver(&[]);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        resolver
            .register_helper(FactoryFn::new("QCOW", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(VfsError::format("bad header"))
            }))
            .unwrap();

        let spec = layer("QCOW", os("/a"));
        for _ in 0..2 {
            let err = resolver.open_file_object(&spec).unwrap_err();
            assert_eq!(err.path_spec(), Some(&spec));
            assert!(matches!(err.root_cause(), VfsError::Format(_)));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!resolver.file_object_cache().contains(spec.comparable()));
    }

    #[test]
    fn test_mount_normalization() {
        let (resolver, _) = counting_resolver(&[]);
        let target = PathSpec::builder("PARTITION")
            .param("location", "/p1")
            .parent(layer("QCOW", os("/img.qcow2")))
            .build()
            .unwrap();
        resolver.register_mount_point("C", target.clone()).unwrap();

        let mounted = PathSpec::builder("FS")
            .param("inode", 128)
            .parent(mount("C"))
            .build()
            .unwrap();
        let direct = PathSpec::builder("FS")
            .param("inode", 128)
            .parent(target)
            .build()
            .unwrap();

        let normalized = resolver.normalize(&mounted).unwrap();
        assert_eq!(normalized, direct);
        assert_eq!(normalized.comparable(), direct.comparable());
        assert_eq!(
            normalized.comparable(),
            "type: OS, location=/img.qcow2\n\
             type: QCOW\n\
             type: PARTITION, location=/p1\n\
             type: FS, inode=128\n"
        );
    }

    #[test]
    fn test_nested_mounts() {
        let (resolver, _) = counting_resolver(&[]);
        resolver.register_mount_point("disk", os("/disk.raw")).unwrap();
        resolver
            .register_mount_point("part", layer("PARTITION", mount("disk")))
            .unwrap();

        let spec = layer("RAW", mount("part"));
        let normalized = resolver.normalize(&spec).unwrap();

        assert_eq!(normalized, layer("RAW", layer("PARTITION", os("/disk.raw"))));
    }

    #[test]
    fn test_mount_parent_is_discarded() {
        let (resolver, _) = counting_resolver(&[]);
        resolver.register_mount_point("C", os("/target")).unwrap();

        let mount_with_parent = PathSpec::builder("MOUNT")
            .param("identifier", "C")
            .parent(os("/ignored"))
            .build()
            .unwrap();
        let spec = layer("GZIP", mount_with_parent);

        let normalized = resolver.normalize(&spec).unwrap();
        assert_eq!(normalized, layer("GZIP", os("/target")));
        assert_eq!(
            normalized.comparable(),
            "type: OS, location=/target\ntype: GZIP\n"
        );
        assert!(normalized.find("OS").is_some_and(|root| root.get("location") == Some("/target")));
    }

    #[test]
    fn test_mount_not_found() {
        let (resolver, _) = counting_resolver(&["RAW"]);
        let err = resolver
            .open_file_object(&layer("RAW", mount("X")))
            .unwrap_err();

        assert!(err.is_mount_error());
        assert!(matches!(err, VfsError::MountNotFound { ref identifier } if identifier == "X"));
    }

    #[test]
    fn test_self_referencing_mount() {
        let (resolver, _) = counting_resolver(&[]);
        resolver.register_mount_point("C", mount("C")).unwrap();

        let err = resolver.normalize(&layer("RAW", mount("C"))).unwrap_err();
        assert!(matches!(err, VfsError::CyclicMount { substitutions: 2, .. }));
    }

    #[test]
    fn test_short_mount_cycle() {
        let (resolver, _) = counting_resolver(&[]);
        resolver.register_mount_point("A", mount("B")).unwrap();
        resolver.register_mount_point("B", mount("A")).unwrap();

        let err = resolver.normalize(&mount("A")).unwrap_err();
        assert!(err.is_mount_error());
        assert!(matches!(err, VfsError::CyclicMount { .. }));
    }

    #[test]
    fn test_open_parent_of_root_fails() {
        let (resolver, _) = counting_resolver(&[]);
        let err = resolver.open_parent(&os("/a")).unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));
    }

    struct InodeFs;

    impl FileSystem for InodeFs {
        fn open_file(&self, path_spec: &PathSpec) -> VfsResult<Arc<dyn DataSource>> {
            let inode: u64 = path_spec.require("inode")?;
            Ok(memory(&format!("inode {inode}")))
        }
    }

    struct FsHelper {
        mounts: Arc<AtomicUsize>,
    }

    impl ResolverHelper for FsHelper {
        fn type_indicator(&self) -> TypeIndicator {
            TypeIndicator::FS
        }

        fn open_file_object(
            &self,
            path_spec: &PathSpec,
            resolver: &Resolver,
        ) -> VfsResult<Arc<dyn DataSource>> {
            resolver.open_file_system(path_spec)?.open_file(path_spec)
        }

        fn open_file_system(
            &self,
            path_spec: &PathSpec,
            resolver: &Resolver,
        ) -> VfsResult<Arc<dyn FileSystem>> {
            resolver.open_parent(path_spec)?;
            self.mounts.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(InodeFs))
        }
    }

    #[test]
    fn test_file_system_shared_by_siblings() {
        let (resolver, _) = counting_resolver(&[]);
        let mounts = Arc::new(AtomicUsize::new(0));
        resolver
            .register_helper(FsHelper {
                mounts: Arc::clone(&mounts),
            })
            .unwrap();

        for inode in [11, 12, 13] {
            let spec = PathSpec::builder("FS")
                .param("inode", inode)
                .parent(os("/fs.img"))
                .build()
                .unwrap();
            let text = resolver.open_file_object(&spec).unwrap().read_to_vec().unwrap();
            assert_eq!(text, format!("inode {inode}").into_bytes());
        }

        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert!(resolver
            .file_system_cache()
            .contains("type: OS, location=/fs.img\ntype: FS\n"));
    }

    #[test]
    fn test_file_system_unsupported_by_helper() {
        let (resolver, _) = counting_resolver(&["RAW"]);
        let err = resolver
            .open_file_system(&layer("RAW", os("/a")))
            .err()
            .unwrap();
        assert!(matches!(err, VfsError::UnsupportedType { .. }));
    }

    #[test]
    fn test_clear_caches_keeps_open_handles_usable() {
        let (resolver, opens) = counting_resolver(&[]);
        let mut file = resolver.open_file_object(&os("abc")).unwrap();

        resolver.clear_caches();
        assert_eq!(file.read_to_vec().unwrap(), b"abc");

        resolver.open_file_object(&os("abc")).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }
}
