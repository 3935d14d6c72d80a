//! Files on the host file system.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::diagnostic::VfsResult;
use crate::file_io::DataSource;
use crate::path::{PathSpec, TypeIndicator};
use crate::resolver::{Resolver, ResolverHelper};

/// An open host file shared between cursors.
#[derive(Debug)]
pub struct OsFile {
    file: Mutex<File>,
    size: u64,
}

impl OsFile {
    /// Open the file at `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl DataSource for OsFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// Opens `OS` nodes: `location` is a host path.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsHelper;

impl ResolverHelper for OsHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::OS
    }

    fn open_file_object(
        &self,
        path_spec: &PathSpec,
        _resolver: &Resolver,
    ) -> VfsResult<Arc<dyn DataSource>> {
        let location: String = path_spec.require("location")?;
        let file = OsFile::open(&location)?;
        tracing::debug!(%location, size = file.size, "opened host file");
        Ok(Arc::new(file))
    }
}
