//! Byte windows of a parent stream.

use std::io;
use std::sync::Arc;

use crate::diagnostic::{VfsError, VfsResult};
use crate::file_io::{DataSource, FileObject};
use crate::path::{PathSpec, TypeIndicator};
use crate::resolver::{Resolver, ResolverHelper};

/// `size` bytes of `parent` starting at `offset`.
///
/// Keeps its parent referenced in the cache for as long as it lives.
#[derive(Debug)]
pub struct DataRange {
    parent: FileObject,
    offset: u64,
    size: u64,
}

impl DataRange {
    /// Create a window over `parent`.
    ///
    /// Fails with `Format` if the window extends past the end of the parent.
    pub fn new(parent: FileObject, offset: u64, size: u64) -> VfsResult<Self> {
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= parent.size())
            .ok_or_else(|| {
                VfsError::format(format!(
                    "range {offset}+{size} exceeds parent size {}",
                    parent.size()
                ))
            })?;
        tracing::trace!(offset, end, "data range");
        Ok(Self {
            parent,
            offset,
            size,
        })
    }
}

impl DataSource for DataRange {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let available = usize::try_from(self.size - offset).unwrap_or(usize::MAX);
        let n = buf.len().min(available);
        self.parent.read_at(self.offset + offset, &mut buf[..n])
    }
}

/// Opens `DATA_RANGE` nodes over their parent stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataRangeHelper;

impl ResolverHelper for DataRangeHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::DATA_RANGE
    }

    fn open_file_object(
        &self,
        path_spec: &PathSpec,
        resolver: &Resolver,
    ) -> VfsResult<Arc<dyn DataSource>> {
        let offset = path_spec.require("range_offset")?;
        let size = path_spec.require("range_size")?;
        let parent = resolver.open_parent(path_spec)?;
        Ok(Arc::new(DataRange::new(parent, offset, size)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::MemorySource;

    fn parent(data: &'static [u8]) -> FileObject {
        let spec = PathSpec::builder("OS")
            .param("location", "/mem")
            .build()
            .unwrap();
        FileObject::uncached(spec, Arc::new(MemorySource::new(data)))
    }

    #[test]
    fn test_window_reads() {
        let range = DataRange::new(parent(b"0123456789"), 2, 5).unwrap();
        let mut buf = [0u8; 8];

        assert_eq!(range.size(), 5);
        assert_eq!(range.read_at(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"23456");
        assert_eq!(range.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"56");
        assert_eq!(range.read_at(5, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_range_past_end_rejected() {
        let err = DataRange::new(parent(b"0123"), 2, 3).unwrap_err();
        assert!(matches!(err, VfsError::Format(_)));

        let err = DataRange::new(parent(b"0123"), u64::MAX, 2).unwrap_err();
        assert!(matches!(err, VfsError::Format(_)));
    }

    #[test]
    fn test_bad_parameter_is_annotated() {
        let resolver = Resolver::with_config(&crate::config::Config::default());
        let spec = PathSpec::builder("DATA_RANGE")
            .param("range_offset", "ten")
            .param("range_size", 4)
            .parent(
                PathSpec::builder("OS")
                    .param("location", "/nonexistent")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();

        let err = resolver.open_file_object(&spec).unwrap_err();
        assert_eq!(err.path_spec(), Some(&spec));
        assert!(matches!(
            err.root_cause(),
            VfsError::InvalidParameter { .. }
        ));
    }
}
