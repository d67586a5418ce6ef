//! Depth-first traversal over a schema tree.
//!
//! The walk keeps its own work stack instead of recursing, so depth is bounded by heap rather
//! than by the host call stack, and every item carries the path used to reach it.

use crate::error::{Result, SchemaTreeError};
use crate::model::{NodeId, PathSegment, SchemaArena, SchemaPath, SchemaTree};
use crate::types::{TYPE_ARRAY, TYPE_OBJECT};
use tracing::trace;

/// Outcome of visiting one sub-schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Leave the parent's slot untouched.
    Keep,
    /// Point the parent's slot at another node and continue the walk from there.
    Replace(NodeId),
}

/// Callback invoked for every sub-schema reached by [`walk`].
pub trait SchemaVisitor {
    /// # Errors
    ///
    /// Any error aborts the enclosing walk.
    fn visit(&mut self, arena: &mut SchemaArena, node: NodeId, path: &SchemaPath)
    -> Result<Visit>;
}

impl<F> SchemaVisitor for F
where
    F: FnMut(&mut SchemaArena, NodeId, &SchemaPath) -> Result<Visit>,
{
    fn visit(
        &mut self,
        arena: &mut SchemaArena,
        node: NodeId,
        path: &SchemaPath,
    ) -> Result<Visit> {
        self(arena, node, path)
    }
}

struct WorkItem {
    node: NodeId,
    path: SchemaPath,
    /// `$ref`s expanded on the way to this node.
    lineage: Vec<String>,
    /// Arena nodes the queued nodes on the way here were taken from, including this one.
    ancestors: Vec<NodeId>,
    /// Whether the nodes this one points at belong to the walked tree and may be rewritten.
    owns_children: bool,
}

impl WorkItem {
    fn child(&self, claimed: Claimed, path: SchemaPath, lineage: Vec<String>) -> Result<Self> {
        if self.ancestors.contains(&claimed.origin) {
            let reference = lineage.last().cloned().unwrap_or_else(|| path.to_string());
            return Err(SchemaTreeError::unresolved(
                reference,
                format!("cyclic schema detected at '{path}'"),
            ));
        }
        let mut ancestors = self.ancestors.clone();
        ancestors.push(claimed.origin);
        Ok(Self {
            node: claimed.node,
            path,
            lineage,
            ancestors,
            owns_children: claimed.owns_children,
        })
    }
}

/// Result of visiting one slot.
struct Visited {
    node: NodeId,
    lineage: Vec<String>,
    replaced: bool,
    /// The replacement was allocated by the visitor during this visit.
    fresh: bool,
}

/// A node the walk may rewrite slots of.
#[derive(Clone, Copy)]
struct Claimed {
    node: NodeId,
    origin: NodeId,
    owns_children: bool,
}

/// Take ownership of `visited` before descending into it.
///
/// Nodes reached through a replacement are shared with the referent, so they are copied and the
/// copy is rewired instead.
fn claim(arena: &mut SchemaArena, visited: &Visited, parent_owns_children: bool) -> Claimed {
    if visited.fresh {
        Claimed {
            node: visited.node,
            origin: visited.node,
            owns_children: false,
        }
    } else if parent_owns_children && !visited.replaced {
        Claimed {
            node: visited.node,
            origin: visited.node,
            owns_children: true,
        }
    } else {
        let copy = arena.get(visited.node).clone();
        Claimed {
            node: arena.insert(copy),
            origin: visited.node,
            owns_children: false,
        }
    }
}

/// Walk every sub-schema reachable from `root`'s properties, calling `visitor` on each property
/// schema, each `oneOf` alternative and each array `items` schema.
///
/// `root` itself is never visited. Property order is not significant. Slots are rewritten in
/// `root` and its inline sub-schemas; anything reached through a replaced node is copied before
/// one of its slots changes, so nodes shared with other parents keep their content.
///
/// # Errors
///
/// - a shape error when a property's base type cannot be determined, or an array property has
///   no `items`
/// - a resolution error when a node re-expands a `$ref` already expanded by one of its
///   ancestors, or is reached again through its own descendants
/// - whatever the visitor returns
pub fn walk<V>(arena: &mut SchemaArena, root: NodeId, visitor: &mut V) -> Result<()>
where
    V: SchemaVisitor + ?Sized,
{
    let mut stack = vec![WorkItem {
        node: root,
        path: SchemaPath::root(),
        lineage: Vec::new(),
        ancestors: vec![root],
        owns_children: true,
    }];

    while let Some(item) = stack.pop() {
        // Snapshot: slot rewrites below go back into this node's own map.
        let Some(properties) = arena.get(item.node).properties.clone() else {
            continue;
        };

        for (name, original) in properties {
            let path = item.path.child(PathSegment::Property(name.clone()));
            let visited = visit_slot(arena, visitor, original, &path, &item.lineage)?;

            let node = arena.get(visited.node);
            let union = node.has_one_of();
            let base_type = node.types.base_type().map(str::to_string);
            if !union {
                match base_type.as_deref() {
                    None => {
                        return Err(SchemaTreeError::shape(
                            &path,
                            format!("key \"type\" not found on property \"{name}\""),
                        ));
                    }
                    Some(TYPE_ARRAY) if node.items.is_none() => {
                        return Err(SchemaTreeError::shape(
                            &path,
                            format!("key \"items\" not found on property \"{name}\""),
                        ));
                    }
                    _ => {}
                }
            }

            let descends =
                union || matches!(base_type.as_deref(), Some(TYPE_ARRAY | TYPE_OBJECT));
            let schema = if descends {
                claim(arena, &visited, item.owns_children)
            } else {
                Claimed {
                    node: visited.node,
                    origin: visited.node,
                    owns_children: false,
                }
            };
            if schema.node != original
                && let Some(props) = arena.get_mut(item.node).properties.as_mut()
            {
                props.insert(name.clone(), schema.node);
            }

            if union {
                // Unions bypass the base type dispatch, even when `type` is also given.
                let alternatives = arena.get(schema.node).one_of.clone().unwrap_or_default();
                let alt_path = path.child(PathSegment::OneOf);
                for (index, alternative) in alternatives.into_iter().enumerate() {
                    let alt =
                        visit_slot(arena, visitor, alternative, &alt_path, &visited.lineage)?;
                    let claimed = claim(arena, &alt, schema.owns_children);
                    if claimed.node != alternative
                        && let Some(alts) = arena.get_mut(schema.node).one_of.as_mut()
                    {
                        alts[index] = claimed.node;
                    }
                    push(
                        &mut stack,
                        item.child(claimed, alt_path.clone(), alt.lineage)?,
                    );
                }
                continue;
            }

            match base_type.as_deref() {
                Some(TYPE_ARRAY) => {
                    let Some(items) = arena.get(schema.node).items else {
                        continue;
                    };
                    let items_path = path.child(PathSegment::Items);
                    let visited_items =
                        visit_slot(arena, visitor, items, &items_path, &visited.lineage)?;
                    let claimed = claim(arena, &visited_items, schema.owns_children);
                    if claimed.node != items {
                        arena.get_mut(schema.node).items = Some(claimed.node);
                    }
                    push(
                        &mut stack,
                        item.child(claimed, items_path, visited_items.lineage)?,
                    );
                }
                Some(TYPE_OBJECT) => {
                    push(&mut stack, item.child(schema, path, visited.lineage)?);
                }
                _ => {}
            }
        }
    }

    Ok(())
}

fn push(stack: &mut Vec<WorkItem>, item: WorkItem) {
    trace!(path = %item.path, node = %item.node, "queue sub-schema");
    stack.push(item);
}

fn visit_slot<V>(
    arena: &mut SchemaArena,
    visitor: &mut V,
    node: NodeId,
    path: &SchemaPath,
    lineage: &[String],
) -> Result<Visited>
where
    V: SchemaVisitor + ?Sized,
{
    let reference = arena.get(node).unresolved_reference().map(str::to_string);
    let allocated_before = arena.len();
    let visited = match visitor.visit(arena, node, path)? {
        Visit::Keep => node,
        Visit::Replace(replacement) => replacement,
    };
    let replaced = visited != node;

    let mut lineage = lineage.to_vec();
    if let Some(reference) = reference
        && replaced
    {
        if lineage.contains(&reference) {
            return Err(SchemaTreeError::unresolved(
                reference,
                format!("cyclic $ref detected at '{path}'"),
            ));
        }
        lineage.push(reference);
    }
    Ok(Visited {
        node: visited,
        lineage,
        replaced,
        fresh: replaced && visited.index() >= allocated_before,
    })
}

impl SchemaTree {
    /// Walk this tree; see [`walk`].
    ///
    /// # Errors
    ///
    /// See [`walk`].
    pub fn walk<V>(&mut self, visitor: &mut V) -> Result<()>
    where
        V: SchemaVisitor + ?Sized,
    {
        walk(&mut self.arena, self.root, visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> SchemaTree {
        SchemaTree::from_json(&value).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        paths: Vec<String>,
    }

    impl SchemaVisitor for Recorder {
        fn visit(
            &mut self,
            _arena: &mut SchemaArena,
            _node: NodeId,
            path: &SchemaPath,
        ) -> Result<Visit> {
            self.paths.push(path.to_string());
            Ok(Visit::Keep)
        }
    }

    #[test]
    fn visits_properties_items_and_nested_objects_but_not_root() {
        let mut tree = tree(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "address": {
                    "type": ["object", "null"],
                    "properties": {"city": {"type": "string"}}
                }
            }
        }));

        let mut recorder = Recorder::default();
        tree.walk(&mut recorder).unwrap();

        let mut paths = recorder.paths;
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "properties/address",
                "properties/address/properties/city",
                "properties/name",
                "properties/tags",
                "properties/tags/items",
            ]
        );
    }

    #[test]
    fn array_without_items_is_a_shape_error_until_items_are_added() {
        let mut broken = tree(json!({"properties": {"tags": {"type": "array"}}}));
        let err = broken.walk(&mut Recorder::default()).unwrap_err();
        assert!(err.is_shape(), "unexpected error: {err}");
        assert!(err.to_string().contains("items"));
        assert!(err.to_string().contains("properties/tags"));

        let mut fixed = tree(json!({
            "properties": {"tags": {"type": "array", "items": {"type": "string"}}}
        }));
        fixed.walk(&mut Recorder::default()).unwrap();
    }

    #[test]
    fn undeterminable_property_type_is_a_shape_error() {
        let mut ambiguous = tree(json!({
            "properties": {"amount": {"type": ["string", "number"]}}
        }));
        let err = ambiguous.walk(&mut Recorder::default()).unwrap_err();
        assert!(err.is_shape());
        assert!(err.to_string().contains("\"amount\""));

        let mut untyped = tree(json!({"properties": {"memo": {"format": "text"}}}));
        assert!(untyped.walk(&mut Recorder::default()).unwrap_err().is_shape());
    }

    #[test]
    fn one_of_visits_each_alternative_and_skips_base_type() {
        // `type` next to a non-empty `oneOf` is ignored, so the ambiguous set is no error here.
        let mut tree = tree(json!({
            "properties": {
                "entity": {
                    "type": ["string", "number"],
                    "oneOf": [
                        {"type": "string"},
                        {"type": "object", "properties": {"id": {"type": "string"}}}
                    ]
                }
            }
        }));

        let mut recorder = Recorder::default();
        tree.walk(&mut recorder).unwrap();

        let one_of_visits = recorder
            .paths
            .iter()
            .filter(|p| p.as_str() == "properties/entity/oneOf")
            .count();
        assert_eq!(one_of_visits, 2);
        assert!(
            recorder
                .paths
                .contains(&"properties/entity/oneOf/properties/id".to_string())
        );
        assert_eq!(recorder.paths.len(), 4);
    }

    #[test]
    fn visitor_errors_abort_the_walk() {
        let mut tree = tree(json!({
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string"}
            }
        }));

        let mut calls = 0;
        let mut failing = |_: &mut SchemaArena, _: NodeId, _: &SchemaPath| -> Result<Visit> {
            calls += 1;
            Err(SchemaTreeError::Visitor("stop".to_string()))
        };
        let err = tree.walk(&mut failing).unwrap_err();
        assert_eq!(err, SchemaTreeError::Visitor("stop".to_string()));
        assert_eq!(calls, 1);
    }

    #[test]
    fn leaf_root_is_a_no_op() {
        let mut tree = tree(json!({"type": "string"}));
        let mut recorder = Recorder::default();
        tree.walk(&mut recorder).unwrap();
        assert!(recorder.paths.is_empty());
    }
}
