//! Immutable path specification nodes.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use super::comparable;
use super::types::{with_type_definition, TypeIndicator};
use crate::diagnostic::{VfsError, VfsResult};

/// One layer of a composite address, plus the layer it is read through.
///
/// Nodes are reference counted: cloning a `PathSpec` is cheap and chains
/// built on top of the same parent share it. Equality and hashing use the
/// [comparable](Self::comparable) form, so two independently built chains
/// with the same content are equal.
///
/// # Example
///
/// ```
/// use layered_vfs::PathSpec;
///
/// let os = PathSpec::builder("OS").param("location", "/img.raw").build()?;
/// let gzip = PathSpec::builder("GZIP").parent(os).build()?;
///
/// assert_eq!(gzip.comparable(), "type: OS, location=/img.raw\ntype: GZIP\n");
/// # Ok::<(), layered_vfs::VfsError>(())
/// ```
#[derive(Clone)]
pub struct PathSpec {
    node: Arc<Node>,
}

struct Node {
    type_indicator: TypeIndicator,
    params: BTreeMap<String, String>,
    parent: Option<PathSpec>,
    /// Comparable form of the whole chain ending at this node.
    comparable: String,
}

impl PathSpec {
    /// Construct a node, validating it against its type definition.
    ///
    /// Fails with `InvalidParameter` if the type indicator is unknown, a
    /// parameter is not accepted by the type, a required parameter is missing,
    /// or the parent's presence violates the type's parent rule.
    pub fn new<K, V>(
        type_indicator: impl Into<TypeIndicator>,
        parent: Option<PathSpec>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> VfsResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let type_indicator = type_indicator.into();
        let mut map = BTreeMap::new();
        for (key, value) in params {
            let key = key.into();
            if map.insert(key.clone(), value.into()).is_some() {
                return Err(VfsError::invalid_parameter(
                    type_indicator.as_str(),
                    format!("duplicate parameter: {key}"),
                ));
            }
        }
        Self::from_parts(type_indicator, parent, map)
    }

    /// Start building a node of the given type.
    pub fn builder(type_indicator: impl Into<TypeIndicator>) -> PathSpecBuilder {
        PathSpecBuilder {
            type_indicator: type_indicator.into(),
            parent: None,
            params: Vec::new(),
        }
    }

    /// Parse a chain from its comparable form.
    pub fn parse(text: &str) -> VfsResult<Self> {
        comparable::parse(text)
    }

    pub(crate) fn from_parts(
        type_indicator: TypeIndicator,
        parent: Option<PathSpec>,
        params: BTreeMap<String, String>,
    ) -> VfsResult<Self> {
        type_indicator.validate()?;
        for (key, value) in &params {
            validate_param(&type_indicator, key, value)?;
        }

        with_type_definition(type_indicator.as_str(), |def| {
            def.check(parent.is_some(), params.keys().map(String::as_str))?;
            params
                .iter()
                .try_for_each(|(key, value)| def.check_value(key, value))
        })
        .unwrap_or_else(|| {
            Err(VfsError::invalid_parameter(
                type_indicator.as_str(),
                "unknown type indicator",
            ))
        })?;

        let mut comparable = parent
            .as_ref()
            .map(|p| p.comparable().to_owned())
            .unwrap_or_default();
        comparable::write_line(&mut comparable, &type_indicator, &params);

        Ok(Self {
            node: Arc::new(Node {
                type_indicator,
                params,
                parent,
                comparable,
            }),
        })
    }

    /// Get the type indicator of this node.
    pub fn type_indicator(&self) -> &TypeIndicator {
        &self.node.type_indicator
    }

    /// Get the parent node, `None` for a root.
    pub fn parent(&self) -> Option<&PathSpec> {
        self.node.parent.as_ref()
    }

    /// Check if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    /// Get a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.node.params.get(key).map(String::as_str)
    }

    /// Get a parameter value parsed as `T`.
    ///
    /// Returns `Ok(None)` if the parameter is absent and `InvalidParameter`
    /// if it does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> VfsResult<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    VfsError::invalid_parameter(
                        self.type_indicator().as_str(),
                        format!("cannot parse {key}={raw}"),
                    )
                })
            })
            .transpose()
    }

    /// Get a parameter that the caller requires to be present and parseable.
    pub fn require<T: FromStr>(&self, key: &str) -> VfsResult<T> {
        self.get_parsed(key)?.ok_or_else(|| {
            VfsError::invalid_parameter(
                self.type_indicator().as_str(),
                format!("missing parameter: {key}"),
            )
        })
    }

    /// Iterate over the parameters in key order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.node
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical text form of the chain, root first, one line per node.
    pub fn comparable(&self) -> &str {
        &self.node.comparable
    }

    /// Walk from this node toward the root, starting with `self`.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Collect the chain from the root down to this node.
    pub fn chain(&self) -> Vec<&PathSpec> {
        let mut chain: Vec<&PathSpec> = self.ancestors().collect();
        chain.reverse();
        chain
    }

    /// Get the root node of the chain.
    pub fn root(&self) -> &PathSpec {
        self.ancestors().last().unwrap_or(self)
    }

    /// Number of nodes in the chain.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Find the node closest to this one (inclusive) with the given type.
    pub fn find(&self, type_indicator: &str) -> Option<&PathSpec> {
        self.ancestors()
            .find(|spec| spec.type_indicator().as_str() == type_indicator)
    }

    /// Rebuild this node on top of a different parent.
    ///
    /// The node's own type and parameters are kept; only the chain below it
    /// changes. Validation runs again against the new parent.
    pub fn with_parent(&self, parent: Option<PathSpec>) -> VfsResult<PathSpec> {
        Self::from_parts(
            self.node.type_indicator.clone(),
            parent,
            self.node.params.clone(),
        )
    }

    /// Check if both values point at the same node.
    pub fn ptr_eq(&self, other: &PathSpec) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

fn validate_param(type_indicator: &TypeIndicator, key: &str, value: &str) -> VfsResult<()> {
    let valid_key = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_key {
        return Err(VfsError::invalid_parameter(
            type_indicator.as_str(),
            format!("invalid parameter name: {key:?}"),
        ));
    }
    if value.contains('\n') {
        return Err(VfsError::invalid_parameter(
            type_indicator.as_str(),
            format!("value of {key} contains a line break"),
        ));
    }
    Ok(())
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl PartialEq for PathSpec {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.comparable() == other.comparable()
    }
}

impl Eq for PathSpec {}

impl Hash for PathSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparable().hash(state);
    }
}

impl std::fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PathSpec").field(&self.comparable()).finish()
    }
}

impl std::fmt::Display for PathSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.comparable())
    }
}

impl FromStr for PathSpec {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Ancestors
// =============================================================================

/// Iterator from a node toward the root of its chain.
pub struct Ancestors<'a> {
    next: Option<&'a PathSpec>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a PathSpec;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

// =============================================================================
// PathSpecBuilder
// =============================================================================

/// Fluent construction of a [`PathSpec`] node.
#[derive(Debug, Clone)]
pub struct PathSpecBuilder {
    type_indicator: TypeIndicator,
    parent: Option<PathSpec>,
    params: Vec<(String, String)>,
}

impl PathSpecBuilder {
    /// Set the parent node.
    pub fn parent(mut self, parent: PathSpec) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set or clear the parent node.
    pub fn maybe_parent(mut self, parent: Option<PathSpec>) -> Self {
        self.parent = parent;
        self
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Validate and build the node.
    pub fn build(self) -> VfsResult<PathSpec> {
        PathSpec::new(self.type_indicator, self.parent, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(location: &str) -> PathSpec {
        PathSpec::builder(TypeIndicator::OS)
            .param("location", location)
            .build()
            .unwrap()
    }

    #[test]
    fn test_gzip_comparable() {
        let spec = PathSpec::builder("GZIP").parent(os("/img.raw")).build().unwrap();
        assert_eq!(
            spec.comparable(),
            "type: OS, location=/img.raw\ntype: GZIP\n"
        );
    }

    #[test]
    fn test_gzip_requires_parent() {
        let err = PathSpec::new("GZIP", None, Vec::<(String, String)>::new()).unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let err = PathSpec::builder("GZIP")
            .parent(os("/img.raw"))
            .param("bogus", "BOGUS")
            .build()
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_root_type_rejects_parent() {
        let err = PathSpec::builder("OS")
            .parent(os("/a"))
            .param("location", "/b")
            .build()
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = PathSpec::new("OS", None, Vec::<(String, String)>::new()).unwrap_err();
        assert!(err.to_string().contains("missing parameter: location"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = PathSpec::builder("NO_SUCH_TYPE").build().unwrap_err();
        assert!(err.to_string().contains("unknown type indicator"));
    }

    #[test]
    fn test_separator_in_value() {
        let os = PathSpec::builder("OS")
            .param("location", "/cases/Smith, John.E01")
            .build()
            .unwrap();
        assert_eq!(os.get("location"), Some("/cases/Smith, John.E01"));

        let err = PathSpec::builder("OS")
            .param("location", "/a, location=/b")
            .build()
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));

        let err = PathSpec::builder("OS")
            .param("location", "/a\nb")
            .build()
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidParameter { .. }));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = PathSpec::new(
            "OS",
            None,
            [("location", "/a"), ("location", "/b")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn test_params_sorted_in_comparable() {
        let spec = PathSpec::builder("PARTITION")
            .parent(os("/img"))
            .param("start_offset", 1024)
            .param("location", "/p1")
            .build()
            .unwrap();
        assert_eq!(
            spec.comparable(),
            "type: OS, location=/img\ntype: PARTITION, location=/p1, start_offset=1024\n"
        );
    }

    #[test]
    fn test_equality_by_content() {
        let a = PathSpec::builder("GZIP").parent(os("/x")).build().unwrap();
        let b = PathSpec::builder("GZIP").parent(os("/x")).build().unwrap();
        let c = PathSpec::builder("GZIP").parent(os("/y")).build().unwrap();

        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shared_parent() {
        let base = os("/img");
        let a = PathSpec::builder("GZIP").parent(base.clone()).build().unwrap();
        let b = PathSpec::builder("RAW").parent(base.clone()).build().unwrap();

        assert!(a.parent().unwrap().ptr_eq(&base));
        assert!(b.parent().unwrap().ptr_eq(&base));
    }

    #[test]
    fn test_chain_traversal() {
        let leaf = PathSpec::builder("GZIP")
            .parent(PathSpec::builder("RAW").parent(os("/img")).build().unwrap())
            .build()
            .unwrap();

        let types: Vec<&str> = leaf.ancestors().map(|s| s.type_indicator().as_str()).collect();
        assert_eq!(types, ["GZIP", "RAW", "OS"]);

        let types: Vec<&str> = leaf.chain().iter().map(|s| s.type_indicator().as_str()).collect();
        assert_eq!(types, ["OS", "RAW", "GZIP"]);

        assert_eq!(leaf.depth(), 3);
        assert_eq!(leaf.root().get("location"), Some("/img"));
        assert!(leaf.root().is_root());
        assert_eq!(leaf.find("RAW").map(PathSpec::depth), Some(2));
    }

    #[test]
    fn test_get_parsed() {
        let spec = PathSpec::builder("DATA_RANGE")
            .parent(os("/img"))
            .param("range_offset", 512)
            .param("range_size", "lots")
            .build()
            .unwrap();

        assert_eq!(spec.get_parsed::<u64>("range_offset").unwrap(), Some(512));
        assert!(spec.get_parsed::<u64>("range_size").is_err());
        assert_eq!(spec.get_parsed::<u64>("absent").unwrap(), None);
        assert!(spec.require::<u64>("absent").is_err());
    }

    #[test]
    fn test_with_parent() {
        let gzip = PathSpec::builder("GZIP").parent(os("/a")).build().unwrap();
        let moved = gzip.with_parent(Some(os("/b"))).unwrap();
        assert_eq!(moved.comparable(), "type: OS, location=/b\ntype: GZIP\n");
        assert!(gzip.with_parent(None).is_err());
    }
}
