//! Gzip-compressed streams.

use std::io::{self, Read};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;

use crate::config::DEFAULT_MAX_DECOMPRESSED_SIZE;
use crate::diagnostic::{VfsError, VfsResult};
use crate::file_io::{DataSource, MemorySource};
use crate::path::{PathSpec, TypeIndicator};
use crate::resolver::{Resolver, ResolverHelper};

/// Opens `GZIP` nodes by decompressing the whole parent stream.
///
/// The decompressed bytes are held in memory for as long as the cache entry
/// lives, so opening fails with `Format` once the output would exceed
/// `max_size` (see [`Config::max_decompressed_size`]). Concatenated members
/// are decoded as one stream.
///
/// [`Config::max_decompressed_size`]: crate::config::Config::max_decompressed_size
#[derive(Debug, Clone, Copy)]
pub struct GzipHelper {
    max_size: u64,
}

impl GzipHelper {
    /// Create a helper that decompresses at most `max_size` bytes per stream.
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    /// Largest decompressed stream this helper accepts.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

impl Default for GzipHelper {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECOMPRESSED_SIZE)
    }
}

impl ResolverHelper for GzipHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::GZIP
    }

    fn open_file_object(
        &self,
        path_spec: &PathSpec,
        resolver: &Resolver,
    ) -> VfsResult<Arc<dyn DataSource>> {
        let parent = resolver.open_parent(path_spec)?;
        let compressed = parent.size();

        let mut data = Vec::new();
        MultiGzDecoder::new(parent)
            .take(self.max_size.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(decode_error)?;
        if data.len() as u64 > self.max_size {
            return Err(VfsError::format(format!(
                "decompressed stream exceeds {} bytes",
                self.max_size
            )));
        }

        tracing::debug!(compressed, uncompressed = data.len(), "decompressed gzip stream");
        Ok(Arc::new(MemorySource::new(data)))
    }
}

fn decode_error(e: io::Error) -> VfsError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            VfsError::format(format!("invalid gzip stream: {e}"))
        }
        _ => VfsError::Io(e),
    }
}
