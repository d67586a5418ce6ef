//! Parsing schemas from JSON and serializing them back.

use crate::error::{Result, SchemaTreeError};
use crate::model::{NodeId, SchemaArena, SchemaNode, SchemaTree};
use crate::resolve::{LocalResolver, resolve_references};
use crate::types::TypeSet;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parse one JSON schema (recursively) into `arena`, returning the id of its root node.
///
/// Recognized keys: `type`, `nullable`, `properties`, `items`, `format`, `oneOf`, `$id`, `$ref`.
/// Other keys are ignored.
///
/// # Errors
///
/// Returns a parse error if the value (or any nested schema) is not an object, or if a
/// recognized key holds a value of the wrong JSON type.
pub fn parse_schema(arena: &mut SchemaArena, value: &Value) -> Result<NodeId> {
    let Value::Object(obj) = value else {
        return Err(SchemaTreeError::Parse(format!(
            "schema must be a JSON object, got {}",
            json_kind(value)
        )));
    };

    let nullable = match obj.get("nullable") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(SchemaTreeError::Parse(format!(
                "\"nullable\" must be a boolean, got {}",
                json_kind(other)
            )));
        }
    };
    let types = TypeSet::from_json(obj.get("type"), nullable)?;

    let properties = match obj.get("properties") {
        None | Some(Value::Null) => None,
        Some(Value::Object(props)) => {
            let mut parsed = BTreeMap::new();
            for (name, schema) in props {
                let child = parse_schema(arena, schema).map_err(|e| nested(&e, name))?;
                parsed.insert(name.clone(), child);
            }
            (!parsed.is_empty()).then_some(parsed)
        }
        Some(other) => {
            return Err(SchemaTreeError::Parse(format!(
                "\"properties\" must be an object, got {}",
                json_kind(other)
            )));
        }
    };

    let items = match obj.get("items") {
        None | Some(Value::Null) => None,
        Some(schema) => Some(parse_schema(arena, schema).map_err(|e| nested(&e, "items"))?),
    };

    let one_of = match obj.get("oneOf") {
        None | Some(Value::Null) => None,
        Some(Value::Array(alternatives)) => {
            let parsed = alternatives
                .iter()
                .map(|alt| parse_schema(arena, alt).map_err(|e| nested(&e, "oneOf")))
                .collect::<Result<Vec<_>>>()?;
            (!parsed.is_empty()).then_some(parsed)
        }
        Some(other) => {
            return Err(SchemaTreeError::Parse(format!(
                "\"oneOf\" must be an array, got {}",
                json_kind(other)
            )));
        }
    };

    Ok(arena.insert(SchemaNode {
        types,
        properties,
        items,
        format: optional_string(obj, "format")?,
        one_of,
        id: optional_string(obj, "$id")?,
        reference: optional_string(obj, "$ref")?,
    }))
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SchemaTreeError::Parse(format!(
            "\"{key}\" must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn nested(err: &SchemaTreeError, at: &str) -> SchemaTreeError {
    match err {
        SchemaTreeError::Parse(msg) => SchemaTreeError::Parse(format!("{at}: {msg}")),
        other => other.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serializable view of one node and everything below it.
#[derive(Debug, Clone, Copy)]
pub struct SchemaView<'a> {
    arena: &'a SchemaArena,
    id: NodeId,
}

impl<'a> SchemaView<'a> {
    #[must_use]
    pub fn new(arena: &'a SchemaArena, id: NodeId) -> Self {
        Self { arena, id }
    }

    fn child(&self, id: NodeId) -> Self {
        Self::new(self.arena, id)
    }
}

impl Serialize for SchemaView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let node = self.arena.get(self.id);
        let mut map = serializer.serialize_map(None)?;
        if !node.types.is_empty() {
            map.serialize_entry("type", &node.types)?;
        }
        if let Some(props) = &node.properties {
            let props: BTreeMap<&str, SchemaView<'_>> = props
                .iter()
                .map(|(name, id)| (name.as_str(), self.child(*id)))
                .collect();
            map.serialize_entry("properties", &props)?;
        }
        if let Some(items) = node.items {
            map.serialize_entry("items", &self.child(items))?;
        }
        if let Some(format) = &node.format {
            map.serialize_entry("format", format)?;
        }
        if let Some(alts) = &node.one_of {
            let alts: Vec<SchemaView<'_>> = alts.iter().map(|id| self.child(*id)).collect();
            map.serialize_entry("oneOf", &alts)?;
        }
        if let Some(id) = &node.id {
            map.serialize_entry("$id", id)?;
        }
        if let Some(reference) = &node.reference {
            map.serialize_entry("$ref", reference)?;
        }
        map.end()
    }
}

impl SchemaTree {
    /// Parse a standalone schema.
    ///
    /// # Errors
    ///
    /// See [`parse_schema`].
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut arena = SchemaArena::new();
        let root = parse_schema(&mut arena, value)?;
        Ok(Self::new(arena, root))
    }

    /// Parse a standalone schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a parse error for invalid JSON or an invalid schema.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    #[must_use]
    pub fn view(&self) -> SchemaView<'_> {
        SchemaView::new(&self.arena, self.root)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        // Only non-string map keys make this fail, and views never emit them.
        serde_json::to_value(self.view()).unwrap_or(Value::Null)
    }
}

impl Serialize for SchemaTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.view().serialize(serializer)
    }
}

/// A metadata catalog document: `{"components": {"schemas": {<name>: <schema>}}}`.
///
/// All named schemas share one arena so local `$ref`s resolve to the same nodes.
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    arena: SchemaArena,
    schemas: BTreeMap<String, NodeId>,
}

impl SchemaDocument {
    /// Parse a catalog document. A document without `components.schemas` parses as empty.
    ///
    /// # Errors
    ///
    /// Returns a parse error if `components` or `components.schemas` is not an object, or if any
    /// named schema is invalid.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut doc = Self::default();
        let Some(components) = value.get("components") else {
            return Ok(doc);
        };
        let Some(schemas) = components.get("schemas") else {
            if components.is_object() {
                return Ok(doc);
            }
            return Err(SchemaTreeError::Parse(format!(
                "\"components\" must be an object, got {}",
                json_kind(components)
            )));
        };
        let Value::Object(schemas) = schemas else {
            return Err(SchemaTreeError::Parse(format!(
                "\"components.schemas\" must be an object, got {}",
                json_kind(schemas)
            )));
        };

        for (name, schema) in schemas {
            let id = parse_schema(&mut doc.arena, schema).map_err(|e| nested(&e, name))?;
            doc.schemas.insert(name.clone(), id);
        }
        Ok(doc)
    }

    /// # Errors
    ///
    /// Returns a parse error for invalid JSON or an invalid document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<NodeId> {
        self.schemas.get(name).copied()
    }

    #[must_use]
    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    /// Owned copy of a named schema, references left as they are.
    #[must_use]
    pub fn tree(&self, name: &str) -> Option<SchemaTree> {
        self.schema(name).map(|id| self.arena.extract(id))
    }

    /// Resolve every `$ref` below the named schema against this document and return an owned,
    /// reference-free copy of it.
    ///
    /// The document itself is left as parsed, whether or not resolution succeeds.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if `name` is unknown or a reference cannot be resolved, and a
    /// shape error if the schema cannot be walked.
    pub fn resolve(&self, name: &str) -> Result<SchemaTree> {
        let root = self.schema(name).ok_or_else(|| {
            SchemaTreeError::unresolved(name, "schema not found in document")
        })?;
        let mut arena = self.arena.clone();
        let mut resolver = LocalResolver::new(&self.schemas);
        resolve_references(&mut arena, root, &mut resolver)?;
        Ok(arena.extract(root))
    }
}
