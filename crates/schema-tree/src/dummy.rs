//! Placeholder schemas for records that expose no formal schema.

use crate::model::{NodeId, SchemaArena, SchemaNode, SchemaTree};
use crate::types::{TYPE_NULL, TYPE_OBJECT, TYPE_STRING, TypeSet};
use std::collections::BTreeMap;

/// Allocate a leaf node carrying only the given type tags.
pub fn prepare_dummy_schema<I, S>(arena: &mut SchemaArena, types: I) -> NodeId
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    arena.insert(SchemaNode::with_types(types.into_iter().collect::<TypeSet>()))
}

/// Object schema whose properties are `{"string", "null"}` placeholders, one per field.
///
/// Duplicate field names collapse into one property.
pub fn dummy_record_schema<I, S>(fields: I) -> SchemaTree
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut arena = SchemaArena::new();
    let properties: BTreeMap<String, NodeId> = fields
        .into_iter()
        .map(|field| {
            let column = prepare_dummy_schema(&mut arena, [TYPE_STRING, TYPE_NULL]);
            (field.into(), column)
        })
        .collect();

    let root = prepare_dummy_schema(&mut arena, [TYPE_OBJECT]);
    arena.get_mut(root).properties = (!properties.is_empty()).then_some(properties);
    SchemaTree::new(arena, root)
}
