//! Reference-counted object cache keyed by comparable path specifications.
//!
//! # Caching Strategy
//!
//! ```text
//! ObjectCache<T> (one per namespace: file objects, file systems)
//! └── FxHashMap<String, Arc<Slot<T>>>      key = comparable form
//!     └── Slot
//!         ├── object: Mutex<Option<Arc<T>>>  ─┐ None while the first open runs
//!         ├── references: AtomicUsize         ├─ held by live Cached<T> leases
//!         └── last_access: AtomicU64          ─┘ LRU order among idle slots
//! ```
//!
//! Each key has its own slot mutex, so at most one cold open per key runs at
//! a time; later callers block on the slot and then see the published object.
//! Entries are only evicted once idle (zero references) and only while the
//! cache holds more than `capacity` entries, least recently used first.
//! Evicting drops the cache's `Arc`; consumers that still hold the object
//! keep it alive.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::diagnostic::VfsResult;

// =============================================================================
// CacheStats
// =============================================================================

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a published object.
    pub hits: u64,
    /// Lookups that had to open (or found nothing).
    pub misses: u64,
    /// Idle entries dropped to respect the capacity.
    pub evictions: u64,
    /// Entries currently stored.
    pub entries: usize,
}

// =============================================================================
// Slot
// =============================================================================

struct Slot<T: ?Sized> {
    object: Mutex<Option<Arc<T>>>,
    references: AtomicUsize,
    last_access: AtomicU64,
}

impl<T: ?Sized> Slot<T> {
    fn empty() -> Self {
        Self {
            object: Mutex::new(None),
            references: AtomicUsize::new(0),
            last_access: AtomicU64::new(0),
        }
    }

    fn is_idle(&self) -> bool {
        self.references.load(Ordering::Acquire) == 0
    }

    /// Decrement the reference count, saturating at zero.
    ///
    /// Returns `true` if the slot just became idle.
    fn release(&self) -> bool {
        self.references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous == 1)
            .unwrap_or(false)
    }
}

struct CacheInner<T: ?Sized> {
    name: &'static str,
    capacity: usize,
    slots: RwLock<FxHashMap<String, Arc<Slot<T>>>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: ?Sized> CacheInner<T> {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn acquire(self: &Arc<Self>, slot: &Arc<Slot<T>>, object: Arc<T>) -> Cached<T> {
        slot.references.fetch_add(1, Ordering::AcqRel);
        slot.last_access.store(self.tick(), Ordering::Relaxed);
        Cached {
            object,
            lease: Some(Lease {
                slot: Arc::clone(slot),
                cache: Arc::downgrade(self),
            }),
        }
    }

    /// Drop idle entries, least recently used first, until within capacity.
    fn evict_idle(&self) {
        let mut candidates: Vec<(u64, String)> = {
            let slots = self.slots.read();
            if slots.len() <= self.capacity {
                return;
            }
            slots
                .iter()
                .filter(|(_, slot)| slot.is_idle())
                .filter(|(_, slot)| slot.object.try_lock().is_some_and(|o| o.is_some()))
                .map(|(key, slot)| (slot.last_access.load(Ordering::Relaxed), key.clone()))
                .collect()
        };
        candidates.sort_unstable();

        // Dropped after the map lock is released: dropping an object may
        // release leases it holds on other entries, which re-enters this cache.
        let mut evicted = Vec::new();
        {
            let mut slots = self.slots.write();
            for (_, key) in candidates {
                if slots.len() <= self.capacity {
                    break;
                }
                if slots.get(&key).is_some_and(|slot| slot.is_idle())
                    && let Some(slot) = slots.remove(&key)
                {
                    tracing::debug!(cache = self.name, key = %key.trim_end(), "evicted idle entry");
                    evicted.push(slot);
                }
            }
            if slots.len() > self.capacity {
                tracing::debug!(
                    cache = self.name,
                    entries = slots.len(),
                    capacity = self.capacity,
                    "cache over capacity, remaining entries are referenced"
                );
            }
        }
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        drop(evicted);
    }
}

// =============================================================================
// ObjectCache
// =============================================================================

/// Keyed cache of shared, reference-counted objects.
///
/// Cloning an `ObjectCache` yields another handle to the same cache.
pub struct ObjectCache<T: ?Sized> {
    inner: Arc<CacheInner<T>>,
}

impl<T: ?Sized> Clone for ObjectCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ObjectCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("entries", &self.inner.slots.read().len())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> ObjectCache<T> {
    /// Create an empty cache holding at most `capacity` idle entries.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                name,
                capacity,
                slots: RwLock::new(FxHashMap::default()),
                clock: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    /// Look up a published object and take a reference on it.
    ///
    /// Waits if the object for `key` is currently being opened.
    pub fn get(&self, key: &str) -> Option<Cached<T>> {
        let slot = self.inner.slots.read().get(key).cloned();
        let found = slot.and_then(|slot| {
            let object = slot.object.lock().clone()?;
            Some(self.inner.acquire(&slot, object))
        });
        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store an object and take a reference on it.
    ///
    /// An entry already stored under `key` is displaced: the cache drops its
    /// reference, and consumers still holding it keep it alive.
    pub fn put(&self, key: impl Into<String>, object: Arc<T>) -> Cached<T> {
        let key = key.into();
        let slot = Arc::new(Slot::empty());
        *slot.object.lock() = Some(Arc::clone(&object));
        let cached = self.inner.acquire(&slot, object);

        let displaced = self.inner.slots.write().insert(key.clone(), slot);
        if displaced.is_some() {
            tracing::debug!(cache = self.inner.name, key = %key.trim_end(), "displaced entry");
        }
        drop(displaced);

        self.inner.evict_idle();
        cached
    }

    /// Return the object for `key`, opening it with `open` on a miss.
    ///
    /// Only one caller runs `open` for a given key at a time. If `open`
    /// fails nothing is cached and the error is returned.
    pub fn get_or_try_insert_with<F>(&self, key: &str, open: F) -> VfsResult<Cached<T>>
    where
        F: FnOnce() -> VfsResult<Arc<T>>,
    {
        let slot = self.slot_for(key);
        let mut object = slot.object.lock();

        if let Some(existing) = object.as_ref() {
            let existing = Arc::clone(existing);
            drop(object);
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(cache = self.inner.name, key = %key.trim_end(), "cache hit");
            return Ok(self.inner.acquire(&slot, existing));
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache = self.inner.name, key = %key.trim_end(), "cache miss");

        match open() {
            Ok(opened) => {
                *object = Some(Arc::clone(&opened));
                let cached = self.inner.acquire(&slot, opened);
                drop(object);

                // A failed concurrent open may have unlinked this slot.
                self.inner
                    .slots
                    .write()
                    .entry(key.to_owned())
                    .or_insert_with(|| Arc::clone(&slot));

                self.inner.evict_idle();
                Ok(cached)
            }
            Err(e) => {
                drop(object);
                let unlinked = {
                    let mut slots = self.inner.slots.write();
                    let is_ours = slots.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot));
                    if is_ours { slots.remove(key) } else { None }
                };
                drop(unlinked);
                Err(e)
            }
        }
    }

    fn slot_for(&self, key: &str) -> Arc<Slot<T>> {
        if let Some(slot) = self.inner.slots.read().get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.inner.slots.write();
        Arc::clone(
            slots
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Slot::empty())),
        )
    }

    /// Drop one reference on the entry stored under `key`.
    ///
    /// The entry stays cached while idle and becomes eligible for eviction.
    /// Returns `false` if there is no such entry or it holds no references.
    /// Only needed for references detached with [`Cached::detach`]; live
    /// [`Cached`] values release themselves when dropped.
    pub fn release(&self, key: &str) -> bool {
        let slot = self.inner.slots.read().get(key).cloned();
        match slot {
            Some(slot) if slot.references.load(Ordering::Acquire) > 0 => {
                if slot.release() {
                    self.inner.evict_idle();
                }
                true
            }
            _ => false,
        }
    }

    /// Remove an entry regardless of its references.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.inner.slots.write().remove(key);
        removed.is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let removed: Vec<_> = self.inner.slots.write().drain().collect();
        tracing::debug!(cache = self.inner.name, entries = removed.len(), "cleared cache");
        drop(removed);
    }

    /// Check if a published or in-flight entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.slots.read().contains_key(key)
    }

    /// Number of live references on the entry stored under `key`.
    pub fn references(&self, key: &str) -> Option<usize> {
        self.inner
            .slots
            .read()
            .get(key)
            .map(|slot| slot.references.load(Ordering::Acquire))
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries kept once idle.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

// =============================================================================
// Cached
// =============================================================================

/// A cached object together with the reference it holds on its entry.
///
/// Dereferences to the object. Cloning takes another reference; dropping
/// releases it.
pub struct Cached<T: ?Sized> {
    object: Arc<T>,
    lease: Option<Lease<T>>,
}

struct Lease<T: ?Sized> {
    slot: Arc<Slot<T>>,
    cache: Weak<CacheInner<T>>,
}

impl<T: ?Sized> Drop for Lease<T> {
    fn drop(&mut self) {
        if self.slot.release()
            && let Some(cache) = self.cache.upgrade()
        {
            cache.evict_idle();
        }
    }
}

impl<T: ?Sized> Cached<T> {
    /// Wrap an object that is not stored in any cache.
    pub fn uncached(object: Arc<T>) -> Self {
        Self {
            object,
            lease: None,
        }
    }

    /// Get the shared object.
    pub fn object(&self) -> &Arc<T> {
        &self.object
    }

    /// Take the object out without releasing the reference.
    ///
    /// The entry stays referenced until [`ObjectCache::release`] is called
    /// for its key.
    pub fn detach(mut self) -> Arc<T> {
        if let Some(lease) = self.lease.take() {
            // Keep the count raised past the lease's own release.
            lease.slot.references.fetch_add(1, Ordering::AcqRel);
            drop(lease);
        }
        Arc::clone(&self.object)
    }
}

impl<T: ?Sized> Clone for Cached<T> {
    fn clone(&self) -> Self {
        let lease = self.lease.as_ref().map(|lease| {
            lease.slot.references.fetch_add(1, Ordering::AcqRel);
            Lease {
                slot: Arc::clone(&lease.slot),
                cache: Weak::clone(&lease.cache),
            }
        });
        Self {
            object: Arc::clone(&self.object),
            lease,
        }
    }
}

impl<T: ?Sized> Deref for Cached<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: ?Sized> std::fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("cached", &self.lease.is_some())
            .finish_non_exhaustive()
    }
}
