//! Type indicators and the type definition registry.
//!
//! A type definition is the schema for one layer kind: which parameters a
//! node of that type accepts, which of them are required, and whether the
//! node must (or must not) have a parent.
//!
//! ```text
//! TYPE_DEFINITIONS (process-wide, pre-seeded with built-ins)
//! └── FxHashMap<TypeIndicator, TypeDefinition>
//!     └── TypeDefinition
//!         ├── parent: ParentRule        ── Required | Forbidden | Optional
//!         ├── keys: accepted parameter names
//!         ├── required: must all be present
//!         └── required_any: at least one must be present
//! ```

use std::borrow::{Borrow, Cow};
use std::sync::LazyLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::comparable::FIELD_SEPARATOR;
use crate::diagnostic::{RegistryKind, VfsError, VfsResult};

// =============================================================================
// TypeIndicator
// =============================================================================

/// Short tag naming a layer's format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndicator(Cow<'static, str>);

impl TypeIndicator {
    /// Operating-system file, the only root type.
    pub const OS: Self = Self::from_static("OS");
    /// Mount point reference, substituted by the resolver.
    pub const MOUNT: Self = Self::from_static("MOUNT");
    /// Byte range of the parent stream.
    pub const DATA_RANGE: Self = Self::from_static("DATA_RANGE");
    /// Gzip-compressed stream.
    pub const GZIP: Self = Self::from_static("GZIP");
    /// Raw storage media image.
    pub const RAW: Self = Self::from_static("RAW");
    /// QCOW storage media image.
    pub const QCOW: Self = Self::from_static("QCOW");
    /// Partition inside a volume system.
    pub const PARTITION: Self = Self::from_static("PARTITION");
    /// File inside a file system.
    pub const FS: Self = Self::from_static("FS");

    /// Create a type indicator from a static string.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Get the indicator as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the indicator can appear in a comparable line.
    pub(crate) fn validate(&self) -> VfsResult<()> {
        let valid = !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(VfsError::invalid_parameter(
                self.as_str(),
                "type indicator must be non-empty and consist of [A-Za-z0-9_-]",
            ))
        }
    }
}

impl std::fmt::Display for TypeIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for TypeIndicator {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for TypeIndicator {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Borrow<str> for TypeIndicator {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TypeIndicator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// TypeDefinition
// =============================================================================

/// Whether a node of some type takes a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRule {
    /// The layer is read through its parent.
    Required,
    /// The layer is a physical root.
    Forbidden,
    /// Either is accepted.
    Optional,
}

/// Schema for the nodes of one type indicator.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    type_indicator: TypeIndicator,
    parent: ParentRule,
    keys: Vec<Cow<'static, str>>,
    required: Vec<Cow<'static, str>>,
    required_any: Vec<Cow<'static, str>>,
}

impl TypeDefinition {
    /// Create a definition accepting no parameters.
    pub fn new(type_indicator: impl Into<TypeIndicator>, parent: ParentRule) -> Self {
        Self {
            type_indicator: type_indicator.into(),
            parent,
            keys: Vec::new(),
            required: Vec::new(),
            required_any: Vec::new(),
        }
    }

    /// Accept an optional parameter.
    pub fn optional(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Accept a parameter that must always be present.
    pub fn required(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        let key = key.into();
        self.keys.push(key.clone());
        self.required.push(key);
        self
    }

    /// Accept a parameter from a group of which at least one must be present.
    pub fn one_of(mut self, key: impl Into<Cow<'static, str>>) -> Self {
        let key = key.into();
        self.keys.push(key.clone());
        self.required_any.push(key);
        self
    }

    /// Get the type indicator this definition describes.
    pub fn type_indicator(&self) -> &TypeIndicator {
        &self.type_indicator
    }

    /// Get the parent rule.
    pub fn parent_rule(&self) -> ParentRule {
        self.parent
    }

    /// Check if `key` is an accepted parameter.
    pub fn accepts(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Validate a node's parameter names and parent presence.
    pub(crate) fn check<'a>(
        &self,
        has_parent: bool,
        keys: impl Iterator<Item = &'a str> + Clone,
    ) -> VfsResult<()> {
        let invalid = |message: String| VfsError::invalid_parameter(self.type_indicator.as_str(), message);

        match (self.parent, has_parent) {
            (ParentRule::Required, false) => return Err(invalid("missing parent".into())),
            (ParentRule::Forbidden, true) => {
                return Err(invalid("root type does not take a parent".into()));
            }
            _ => {}
        }

        if let Some(unknown) = keys.clone().find(|k| !self.accepts(k)) {
            return Err(invalid(format!("unsupported parameter: {unknown}")));
        }

        let present = |name: &str| keys.clone().any(|k| k == name);

        if let Some(missing) = self.required.iter().find(|req| !present(req)) {
            return Err(invalid(format!("missing parameter: {missing}")));
        }

        if !self.required_any.is_empty() && !self.required_any.iter().any(|req| present(req)) {
            let names: Vec<&str> = self.required_any.iter().map(|k| &**k).collect();
            return Err(invalid(format!("missing parameter: one of {}", names.join(", "))));
        }

        Ok(())
    }

    /// Reject a value that would read back as the start of another
    /// accepted parameter in the comparable form.
    pub(crate) fn check_value(&self, key: &str, value: &str) -> VfsResult<()> {
        let clash = self
            .keys
            .iter()
            .map(|k| format!("{FIELD_SEPARATOR}{k}="))
            .find(|marker| value.contains(marker.as_str()));
        match clash {
            Some(other) => Err(VfsError::invalid_parameter(
                self.type_indicator.as_str(),
                format!("value of {key} contains {other:?}"),
            )),
            None => Ok(()),
        }
    }
}

fn builtin_definitions() -> Vec<TypeDefinition> {
    use ParentRule::*;
    vec![
        TypeDefinition::new(TypeIndicator::OS, Forbidden).required("location"),
        TypeDefinition::new(TypeIndicator::MOUNT, Optional).required("identifier"),
        TypeDefinition::new(TypeIndicator::DATA_RANGE, Required)
            .required("range_offset")
            .required("range_size"),
        TypeDefinition::new(TypeIndicator::GZIP, Required),
        TypeDefinition::new(TypeIndicator::RAW, Required),
        TypeDefinition::new(TypeIndicator::QCOW, Required),
        TypeDefinition::new(TypeIndicator::PARTITION, Required)
            .optional("location")
            .optional("part_index")
            .optional("start_offset"),
        TypeDefinition::new(TypeIndicator::FS, Required)
            .one_of("location")
            .one_of("inode"),
    ]
}

// =============================================================================
// Global Type Definition Registry
// =============================================================================

/// Process-wide type definitions, pre-seeded with the built-in layer kinds.
static TYPE_DEFINITIONS: LazyLock<RwLock<FxHashMap<TypeIndicator, TypeDefinition>>> =
    LazyLock::new(|| {
        let map = builtin_definitions()
            .into_iter()
            .map(|def| (def.type_indicator.clone(), def))
            .collect();
        RwLock::new(map)
    });

/// Register the schema for a new layer kind.
///
/// Fails with `AlreadyRegistered` if the type indicator is already defined.
pub fn register_type_definition(definition: TypeDefinition) -> VfsResult<()> {
    definition.type_indicator.validate()?;
    let mut definitions = TYPE_DEFINITIONS.write();
    if definitions.contains_key(definition.type_indicator.as_str()) {
        return Err(VfsError::already_registered(
            RegistryKind::TypeDefinition,
            definition.type_indicator.as_str(),
        ));
    }
    tracing::debug!(type_indicator = %definition.type_indicator, "registered type definition");
    definitions.insert(definition.type_indicator.clone(), definition);
    Ok(())
}

/// Remove the schema for a layer kind.
///
/// Fails with `NotRegistered` if the type indicator is not defined.
pub fn deregister_type_definition(type_indicator: &str) -> VfsResult<TypeDefinition> {
    TYPE_DEFINITIONS
        .write()
        .remove(type_indicator)
        .ok_or_else(|| VfsError::not_registered(RegistryKind::TypeDefinition, type_indicator))
}

/// Look up the schema for a type indicator.
pub fn type_definition(type_indicator: &str) -> Option<TypeDefinition> {
    TYPE_DEFINITIONS.read().get(type_indicator).cloned()
}

/// Run `f` against the schema for a type indicator without cloning it.
pub(crate) fn with_type_definition<R>(
    type_indicator: &str,
    f: impl FnOnce(&TypeDefinition) -> R,
) -> Option<R> {
    TYPE_DEFINITIONS.read().get(type_indicator).map(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_seeded() {
        let os = type_definition("OS").unwrap();
        assert_eq!(os.parent_rule(), ParentRule::Forbidden);
        assert!(os.accepts("location"));
        assert!(!os.accepts("inode"));

        assert!(type_definition("GZIP").is_some());
        assert!(type_definition("NOPE").is_none());
    }

    #[test]
    fn test_check_parent_rule() {
        let def = TypeDefinition::new("T_CHECK", ParentRule::Required);
        assert!(def.check(true, std::iter::empty()).is_ok());
        assert!(def.check(false, std::iter::empty()).is_err());

        let def = TypeDefinition::new("T_CHECK", ParentRule::Forbidden);
        assert!(def.check(true, std::iter::empty()).is_err());
    }

    #[test]
    fn test_check_value_against_accepted_keys() {
        let part = type_definition("PARTITION").unwrap();
        assert!(part.check_value("location", "/p1, part two").is_ok());
        assert!(part.check_value("location", "/p1, bogus=1").is_ok());
        assert!(part.check_value("location", "/p1,part_index=1").is_ok());
        assert!(part.check_value("location", "/p1, part_index=1").is_err());
    }

    #[test]
    fn test_check_one_of() {
        let fs = type_definition("FS").unwrap();
        assert!(fs.check(true, ["inode"].into_iter()).is_ok());
        assert!(fs.check(true, ["location", "inode"].into_iter()).is_ok());

        let err = fs.check(true, std::iter::empty()).unwrap_err();
        assert!(err.to_string().contains("one of location, inode"));
    }

    #[test]
    fn test_register_and_deregister() {
        let def = TypeDefinition::new("T_REGISTRY", ParentRule::Optional).optional("name");
        register_type_definition(def.clone()).unwrap();

        let err = register_type_definition(def).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyRegistered { .. }));

        deregister_type_definition("T_REGISTRY").unwrap();
        let err = deregister_type_definition("T_REGISTRY").unwrap_err();
        assert!(matches!(err, VfsError::NotRegistered { .. }));
    }

    #[test]
    fn test_invalid_indicator_rejected() {
        let def = TypeDefinition::new(String::from("BAD, NAME"), ParentRule::Optional);
        assert!(register_type_definition(def).is_err());
    }
}
