//! Canonical text form of a path specification chain.
//!
//! ```text
//! type: OS, location=/img.qcow2
//! type: QCOW
//! type: PARTITION, location=/p1
//! type: FS, inode=128
//! ```
//!
//! One line per node, root first, parameters sorted by key, every line
//! terminated by `\n`. The same text is the cache key, the equality test and
//! the input accepted by [`parse`].

use std::collections::BTreeMap;

use super::spec::PathSpec;
use super::types::{with_type_definition, TypeIndicator};
use crate::diagnostic::{VfsError, VfsResult};

/// Prefix of every comparable line.
pub const LINE_PREFIX: &str = "type: ";

/// Separator between the type indicator and each parameter.
pub const FIELD_SEPARATOR: &str = ", ";

/// Append the comparable line for one node.
pub(crate) fn write_line(out: &mut String, type_indicator: &TypeIndicator, params: &BTreeMap<String, String>) {
    out.push_str(LINE_PREFIX);
    out.push_str(type_indicator.as_str());
    for (key, value) in params {
        out.push_str(FIELD_SEPARATOR);
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push('\n');
}

/// Parse a chain from its comparable form.
///
/// Every line is validated exactly as if the node were built directly, so
/// the result obeys the same type definitions. A missing final newline is
/// tolerated; blank lines are not.
pub fn parse(text: &str) -> VfsResult<PathSpec> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.is_empty() {
        return Err(malformed(1, "empty path specification"));
    }

    let mut parent: Option<PathSpec> = None;
    for (index, line) in body.split('\n').enumerate() {
        let line_no = index + 1;
        let rest = line
            .strip_prefix(LINE_PREFIX)
            .ok_or_else(|| malformed(line_no, format!("expected {LINE_PREFIX:?} prefix")))?;

        let (type_indicator, fields) = match rest.split_once(FIELD_SEPARATOR) {
            Some((type_indicator, fields)) => (type_indicator, Some(fields)),
            None => (rest, None),
        };
        if type_indicator.is_empty() {
            return Err(malformed(line_no, "missing type indicator"));
        }

        let params = match fields {
            Some(fields) => parse_fields(type_indicator, fields)
                .map_err(|message| malformed(line_no, message))?,
            None => BTreeMap::new(),
        };

        let node = PathSpec::from_parts(
            TypeIndicator::from(type_indicator.to_owned()),
            parent.take(),
            params,
        )
        .map_err(|e| malformed(line_no, e.to_string()))?;
        parent = Some(node);
    }

    parent.ok_or_else(|| malformed(1, "empty path specification"))
}

/// Split `k=v, k=v` fields of one line.
///
/// A field only starts a new parameter when it begins with `key=` for a key
/// the type accepts (or when it is the first field); anything else belongs
/// to the previous value, which may itself contain the separator.
fn parse_fields(type_indicator: &str, fields: &str) -> Result<BTreeMap<String, String>, String> {
    let accepts = |key: &str| {
        with_type_definition(type_indicator, |def| def.accepts(key)).unwrap_or(false)
    };

    let mut params = BTreeMap::new();
    let mut current: Option<(&str, String)> = None;
    for field in fields.split(FIELD_SEPARATOR) {
        let starts_param = field
            .split_once('=')
            .filter(|(key, _)| current.is_none() || accepts(*key));
        match starts_param {
            Some((key, value)) => {
                if let Some((key, value)) = current.replace((key, value.to_owned())) {
                    insert_param(&mut params, key, value)?;
                }
            }
            None => match current.as_mut() {
                Some((_, value)) => {
                    value.push_str(FIELD_SEPARATOR);
                    value.push_str(field);
                }
                None => return Err(format!("expected key=value, got {field:?}")),
            },
        }
    }
    if let Some((key, value)) = current {
        insert_param(&mut params, key, value)?;
    }
    Ok(params)
}

fn insert_param(params: &mut BTreeMap<String, String>, key: &str, value: String) -> Result<(), String> {
    match params.insert(key.to_owned(), value) {
        Some(_) => Err(format!("duplicate parameter: {key}")),
        None => Ok(()),
    }
}

fn malformed(line: usize, message: impl Into<String>) -> VfsError {
    VfsError::MalformedComparable {
        line,
        message: message.into(),
    }
}
