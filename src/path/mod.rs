//! Path specifications: composite addresses through nested storage layers.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ OS, location=/img.qcow2      │  root: opened first
//! └──────────────▲───────────────┘
//!                │ parent
//! ┌──────────────┴───────────────┐
//! │ QCOW                         │
//! └──────────────▲───────────────┘
//!                │ parent
//! ┌──────────────┴───────────────┐
//! │ FS, inode=128                │  leaf: what the caller wants
//! └──────────────────────────────┘
//! ```
//!
//! Each node names its format with a [`TypeIndicator`]; the accepted
//! parameters and parent rule come from the type's [`TypeDefinition`].

pub(crate) mod comparable;
mod spec;
mod types;

pub use comparable::{parse, FIELD_SEPARATOR, LINE_PREFIX};
pub use spec::{Ancestors, PathSpec, PathSpecBuilder};
pub use types::{
    deregister_type_definition, register_type_definition, type_definition, ParentRule,
    TypeDefinition, TypeIndicator,
};
