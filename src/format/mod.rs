//! Built-in resolver helpers.
//!
//! | Type         | Parent    | Parameters                  | Source                         |
//! |--------------|-----------|-----------------------------|--------------------------------|
//! | `OS`         | forbidden | `location`                  | file on the host file system   |
//! | `DATA_RANGE` | required  | `range_offset`, `range_size`| byte window of the parent      |
//! | `GZIP`       | required  | none                        | decompressed parent (`gzip`)   |
//!
//! Other built-in type definitions (`RAW`, `QCOW`, `PARTITION`, `FS`) have
//! no helper here; register one with [`Resolver::register_helper`].
//!
//! [`Resolver::register_helper`]: crate::resolver::Resolver::register_helper

mod data_range;
#[cfg(feature = "gzip")]
mod gzip;
mod os;

use std::sync::Arc;

use crate::config::Config;
use crate::resolver::ResolverHelper;

pub use data_range::{DataRange, DataRangeHelper};
#[cfg(feature = "gzip")]
pub use gzip::GzipHelper;
pub use os::{OsFile, OsHelper};

/// Helpers registered by resolvers built with `builtin_helpers` enabled.
pub fn builtin_helpers(config: &Config) -> Vec<Arc<dyn ResolverHelper>> {
    let always: [Arc<dyn ResolverHelper>; 2] = [Arc::new(OsHelper), Arc::new(DataRangeHelper)];
    always.into_iter().chain(gzip_helper(config)).collect()
}

#[cfg(feature = "gzip")]
fn gzip_helper(config: &Config) -> Option<Arc<dyn ResolverHelper>> {
    Some(Arc::new(GzipHelper::new(config.max_decompressed_size)))
}

#[cfg(not(feature = "gzip"))]
fn gzip_helper(_config: &Config) -> Option<Arc<dyn ResolverHelper>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::TypeIndicator;

    #[test]
    fn test_builtin_helpers() {
        let indicators: Vec<TypeIndicator> = builtin_helpers(&Config::default())
            .iter()
            .map(|helper| helper.type_indicator())
            .collect();

        assert_eq!(indicators[..2], [TypeIndicator::OS, TypeIndicator::DATA_RANGE]);
        assert_eq!(
            indicators.contains(&TypeIndicator::GZIP),
            cfg!(feature = "gzip")
        );
    }
}
