//! Parallel resolution of many chains over one shared cache.

use rayon::prelude::*;

use super::Resolver;
use crate::diagnostic::VfsResult;
use crate::file_io::FileObject;
use crate::path::PathSpec;

impl Resolver {
    /// Open many chains in parallel.
    ///
    /// Results come back in input order. Chains with a common prefix still
    /// open that prefix once, since every worker goes through the same cache.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let files = resolver.open_file_objects(&specs);
    /// for (spec, file) in specs.iter().zip(files) {
    ///     match file {
    ///         Ok(file) => println!("{spec}: {} bytes", file.size()),
    ///         Err(e) => eprintln!("{}", format_error(&e)),
    ///     }
    /// }
    /// ```
    pub fn open_file_objects(&self, path_specs: &[PathSpec]) -> Vec<VfsResult<FileObject>> {
        tracing::debug!(count = path_specs.len(), "opening file objects in parallel");
        path_specs
            .par_iter()
            .map(|path_spec| self.open_file_object(path_spec))
            .collect()
    }
}
