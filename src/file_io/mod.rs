//! Byte-stream handles produced by the resolver.
//!
//! ```text
//! FileObject (one per caller, own offset)
//! └── Cached<dyn DataSource> ── shared through the object cache
//!     └── DataSource::read_at(offset, buf)   positional, &self, thread-safe
//! ```
//!
//! Format helpers implement [`DataSource`] (and [`FileSystem`] for layers
//! that contain many files). Callers only ever see [`FileObject`], a
//! `Read + Seek` cursor, so cached sources can be shared without any caller
//! moving another caller's position.

mod text_file;

pub use text_file::{Lines, TextFile};

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::diagnostic::VfsResult;
use crate::path::PathSpec;
use crate::resolver::Cached;

// =============================================================================
// DataSource Trait
// =============================================================================

/// Random-access, shareable byte source for one layer.
pub trait DataSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read; `0` at or past the end.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` completely from `offset`, or fail with `UnexpectedEof`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// =============================================================================
// FileSystem Trait
// =============================================================================

/// An opened structural layer (volume system or file system) that many
/// leaf path specifications are resolved against.
///
/// The resolver caches file systems separately from file objects, keyed by
/// the chain up to and including the file-system layer, so sibling files
/// share a single opened instance.
pub trait FileSystem: Send + Sync {
    /// Open the file addressed by the leaf node of `path_spec`.
    fn open_file(&self, path_spec: &PathSpec) -> VfsResult<Arc<dyn DataSource>>;
}

// =============================================================================
// MemorySource
// =============================================================================

/// Byte source backed by an in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Create a source over the given bytes.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl DataSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        let Some(available) = self.data.get(start..) else {
            return Ok(0);
        };
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

// =============================================================================
// FileObject
// =============================================================================

/// Cursor over a resolved byte stream.
///
/// Holds a reference on the cached source for as long as it lives. Cloning
/// yields an independent cursor at the same position.
#[derive(Clone)]
pub struct FileObject {
    path_spec: PathSpec,
    source: Cached<dyn DataSource>,
    offset: u64,
}

impl FileObject {
    /// Create a cursor at offset zero.
    pub fn new(path_spec: PathSpec, source: Cached<dyn DataSource>) -> Self {
        Self {
            path_spec,
            source,
            offset: 0,
        }
    }

    /// Create a cursor over a source that is not stored in any cache.
    pub fn uncached(path_spec: PathSpec, source: Arc<dyn DataSource>) -> Self {
        Self::new(path_spec, Cached::uncached(source))
    }

    /// The normalized chain this stream was opened from.
    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    /// The shared source behind this cursor.
    pub fn source(&self) -> &Arc<dyn DataSource> {
        self.source.object()
    }

    /// Total size of the stream.
    pub fn size(&self) -> u64 {
        self.source.size()
    }

    /// Current cursor position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Positional read that leaves the cursor untouched.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.source.read_at(offset, buf)
    }

    /// Read from the cursor to the end of the stream.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let remaining = self.size().saturating_sub(self.offset);
        let mut buf = Vec::with_capacity(usize::try_from(remaining).unwrap_or(0));
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for FileObject {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(self.offset, buf)?;
        self.offset += n as u64;
        tracing::trace!(offset = self.offset, read = n, "file object read");
        Ok(n)
    }
}

impl Seek for FileObject {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        self.offset = target;
        Ok(target)
    }
}

impl std::fmt::Debug for FileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObject")
            .field("path_spec", &self.path_spec)
            .field("size", &self.size())
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ObjectCache;

    fn spec() -> PathSpec {
        PathSpec::builder("OS")
            .param("location", "/mem")
            .build()
            .unwrap()
    }

    fn file(data: &'static [u8]) -> FileObject {
        FileObject::uncached(spec(), Arc::new(MemorySource::new(data)))
    }

    #[test]
    fn test_memory_source_read_at() {
        let source = MemorySource::new(&b"hello world"[..]);
        let mut buf = [0u8; 5];

        assert_eq!(source.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(source.read_at(9, &mut buf).unwrap(), 2);
        assert_eq!(source.read_at(11, &mut buf).unwrap(), 0);
        assert_eq!(source.read_at(u64::MAX, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_exact_at_eof() {
        let source = MemorySource::new(&b"abc"[..]);
        let mut buf = [0u8; 4];
        let err = source.read_exact_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_and_seek() {
        let mut file = file(b"0123456789");
        let mut buf = [0u8; 3];

        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"012");
        assert_eq!(file.offset(), 3);

        file.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(file.read_to_vec().unwrap(), b"89");

        file.seek(SeekFrom::Current(-5)).unwrap();
        assert_eq!(file.offset(), 5);

        assert!(file.seek(SeekFrom::Current(-6)).is_err());
        assert_eq!(file.offset(), 5);

        file.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_clones_have_independent_cursors() {
        let mut a = file(b"abcdef");
        a.seek(SeekFrom::Start(2)).unwrap();
        let mut b = a.clone();

        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cd");
        assert_eq!(b.offset(), 2);
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cd");
    }

    #[test]
    fn test_file_object_holds_cache_reference() {
        let cache: ObjectCache<dyn DataSource> = ObjectCache::new("test", 4);
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new(&b"x"[..]));
        let key = spec().comparable().to_owned();

        let file = FileObject::new(spec(), cache.put(key.clone(), source));
        let copy = file.clone();
        assert_eq!(cache.references(&key), Some(2));

        drop(file);
        drop(copy);
        assert_eq!(cache.references(&key), Some(0));
    }
}
