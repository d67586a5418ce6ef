//! Normalization of the polymorphic JSON-Schema `type` field.
//!
//! `type` may be absent, a single string, or an array of strings, and OpenAPI adds a separate
//! `nullable` flag. All of these collapse into one [`TypeSet`].

use crate::error::{Result, SchemaTreeError};
use crate::model::{NodeId, SchemaArena};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;

pub const TYPE_STRING: &str = "string";
pub const TYPE_NUMBER: &str = "number";
pub const TYPE_INTEGER: &str = "integer";
pub const TYPE_BOOLEAN: &str = "boolean";
pub const TYPE_OBJECT: &str = "object";
pub const TYPE_ARRAY: &str = "array";
pub const TYPE_NULL: &str = "null";

/// Set of primitive type tags of one schema node.
///
/// Empty means "unspecified". `null` may sit next to one other tag to mark a nullable scalar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(BTreeSet<String>);

impl TypeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw `type` value plus the `nullable` flag.
    ///
    /// # Errors
    ///
    /// Returns a parse error if `raw` is present but is neither a string nor an array of strings.
    pub fn from_json(raw: Option<&Value>, nullable: bool) -> Result<Self> {
        let mut set = BTreeSet::new();
        match raw {
            None => {}
            Some(Value::String(s)) => {
                set.insert(s.clone());
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let Some(s) = item.as_str() else {
                        return Err(SchemaTreeError::Parse(format!(
                            "unexpected value in \"type\" array: {item}"
                        )));
                    };
                    set.insert(s.to_string());
                }
            }
            Some(other) => {
                return Err(SchemaTreeError::Parse(format!(
                    "unexpected type for property \"type\": {other}"
                )));
            }
        }

        if nullable {
            set.insert(TYPE_NULL.to_string());
        }
        Ok(Self(set))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The single non-null tag, `"null"` for a null-only set, or `None` when undetermined.
    ///
    /// `None` covers both the empty set and ambiguous unions such as `["string", "number"]`.
    #[must_use]
    pub fn base_type(&self) -> Option<&str> {
        if self.0.is_empty() {
            return None;
        }

        let mut non_null = self.iter().filter(|t| *t != TYPE_NULL);
        match (non_null.next(), non_null.next()) {
            (None, _) => Some(TYPE_NULL),
            (Some(only), None) => Some(only),
            (Some(_), Some(_)) => None,
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TypeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// A one-element set is written as a bare string so conventional JSON-Schema consumers accept it.
impl Serialize for TypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.len() == 1
            && let Some(only) = self.0.first()
        {
            return serializer.serialize_str(only);
        }
        serializer.collect_seq(self.0.iter())
    }
}

/// Base type of the node at `id`; see [`TypeSet::base_type`].
#[must_use]
pub fn base_type(arena: &SchemaArena, id: NodeId) -> Option<&str> {
    arena.get(id).types.base_type()
}
