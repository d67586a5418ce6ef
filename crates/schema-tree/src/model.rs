//! Schema node model.
//!
//! Nodes are stored in a [`SchemaArena`] and refer to their children by [`NodeId`], so sharing
//! one sub-schema between several parents is explicit rather than an aliasing accident.

use crate::types::TypeSet;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Index of a node inside the [`SchemaArena`] that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of a JSON-Schema-like document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaNode {
    pub types: TypeSet,
    /// Declared properties. `None` (never an empty map) when the node declares none.
    pub properties: Option<BTreeMap<String, NodeId>>,
    pub items: Option<NodeId>,
    pub format: Option<String>,
    pub one_of: Option<Vec<NodeId>>,
    /// `$id`
    pub id: Option<String>,
    /// `$ref`
    pub reference: Option<String>,
}

impl SchemaNode {
    #[must_use]
    pub fn with_types(types: TypeSet) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    /// The non-empty `$ref` of this node, if it still needs resolving.
    #[must_use]
    pub fn unresolved_reference(&self) -> Option<&str> {
        self.reference.as_deref().filter(|r| !r.is_empty())
    }

    #[must_use]
    pub fn has_one_of(&self) -> bool {
        self.one_of.as_ref().is_some_and(|alts| !alts.is_empty())
    }

    /// All direct children: properties, items, then `oneOf` alternatives.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.properties
            .iter()
            .flat_map(BTreeMap::values)
            .copied()
            .chain(self.items)
            .chain(self.one_of.iter().flatten().copied())
    }

    fn remap_children(&mut self, remap: &HashMap<NodeId, NodeId>) {
        if let Some(props) = self.properties.as_mut() {
            for child in props.values_mut() {
                *child = remap[&*child];
            }
        }
        if let Some(items) = self.items.as_mut() {
            *items = remap[&*items];
        }
        if let Some(alts) = self.one_of.as_mut() {
            for alt in alts {
                *alt = remap[&*alt];
            }
        }
    }
}

/// Owner of every [`SchemaNode`] of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaArena {
    nodes: Vec<SchemaNode>,
}

impl SchemaArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: SchemaNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// # Panics
    ///
    /// Panics if `id` was not allocated by this arena.
    #[must_use]
    pub fn get(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` was not allocated by this arena.
    pub fn get_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every non-empty `$ref` reachable from `root` (including `root` itself).
    #[must_use]
    pub fn references(&self, root: NodeId) -> Vec<String> {
        let mut refs = Vec::new();
        self.for_each_reachable(root, |_, node| {
            if let Some(r) = node.unresolved_reference() {
                refs.push(r.to_string());
            }
        });
        refs
    }

    /// Copy the subtree reachable from `root` into a fresh arena.
    ///
    /// Sharing inside the subtree is preserved; nodes outside it are dropped.
    #[must_use]
    pub fn extract(&self, root: NodeId) -> SchemaTree {
        let mut order = Vec::new();
        let mut remap = HashMap::new();
        self.for_each_reachable(root, |id, _| {
            remap.insert(id, NodeId(order.len()));
            order.push(id);
        });

        let nodes = order
            .into_iter()
            .map(|old| {
                let mut node = self.get(old).clone();
                node.remap_children(&remap);
                node
            })
            .collect();

        SchemaTree {
            arena: SchemaArena { nodes },
            root: NodeId(0),
        }
    }

    fn for_each_reachable(&self, root: NodeId, mut f: impl FnMut(NodeId, &SchemaNode)) {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            let node = self.get(id);
            f(id, node);
            // Reverse so children are reported in declaration order.
            let children: Vec<NodeId> = node.children().collect();
            stack.extend(children.into_iter().rev());
        }
    }
}

/// A self-contained schema: an arena plus the id of its root node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTree {
    pub(crate) arena: SchemaArena,
    pub(crate) root: NodeId,
}

impl SchemaTree {
    #[must_use]
    pub fn new(arena: SchemaArena, root: NodeId) -> Self {
        Self { arena, root }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_node(&self) -> &SchemaNode {
        self.arena.get(self.root)
    }

    #[must_use]
    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut SchemaArena {
        &mut self.arena
    }

    #[must_use]
    pub fn into_parts(self) -> (SchemaArena, NodeId) {
        (self.arena, self.root)
    }

    /// Look up a direct property of the root.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        let id = self.root_node().properties.as_ref()?.get(name)?;
        Some(self.arena.get(*id))
    }

    /// Names of the root's properties, sorted.
    #[must_use]
    pub fn property_names(&self) -> Vec<&str> {
        self.root_node()
            .properties
            .iter()
            .flat_map(BTreeMap::keys)
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.arena.references(self.root)
    }
}

/// One step of the route from the walk root to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Property(String),
    Items,
    OneOf,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Property(name) => write!(f, "properties/{name}"),
            PathSegment::Items => f.write_str("items"),
            PathSegment::OneOf => f.write_str("oneOf"),
        }
    }
}

/// Route from the walk root to a node, rendered as `properties/a/items/...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaPath(Vec<PathSegment>);

impl SchemaPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut SchemaArena, tag: &str) -> NodeId {
        arena.insert(SchemaNode::with_types([tag].into_iter().collect()))
    }

    #[test]
    fn extract_keeps_only_reachable_nodes() {
        let mut arena = SchemaArena::new();
        let unrelated = leaf(&mut arena, "boolean");
        let name = leaf(&mut arena, "string");
        let tag = leaf(&mut arena, "string");
        let tags = arena.insert(SchemaNode {
            types: ["array"].into_iter().collect(),
            items: Some(tag),
            ..SchemaNode::default()
        });
        let root = arena.insert(SchemaNode {
            types: ["object"].into_iter().collect(),
            properties: Some(BTreeMap::from([
                ("name".to_string(), name),
                ("tags".to_string(), tags),
            ])),
            ..SchemaNode::default()
        });

        let tree = arena.extract(root);
        assert_eq!(tree.arena().len(), 4);
        assert_eq!(tree.root(), NodeId(0));
        assert_eq!(tree.property_names(), vec!["name", "tags"]);

        let tags = tree.property("tags").unwrap();
        let items = tree.arena().get(tags.items.unwrap());
        assert_eq!(items.types.base_type(), Some("string"));
        assert!(arena.get(unrelated).types.contains("boolean"));
        assert!(
            (0..tree.arena().len())
                .all(|i| !tree.arena().get(NodeId(i)).types.contains("boolean"))
        );
    }

    #[test]
    fn extract_preserves_sharing_within_subtree() {
        let mut arena = SchemaArena::new();
        let shared = leaf(&mut arena, "string");
        let root = arena.insert(SchemaNode {
            properties: Some(BTreeMap::from([
                ("a".to_string(), shared),
                ("b".to_string(), shared),
            ])),
            ..SchemaNode::default()
        });

        let tree = arena.extract(root);
        assert_eq!(tree.arena().len(), 2);
        let props = tree.root_node().properties.as_ref().unwrap();
        assert_eq!(props["a"], props["b"]);
    }

    #[test]
    fn path_renders_segments() {
        let path = SchemaPath::root()
            .child(PathSegment::Property("addressbook".to_string()))
            .child(PathSegment::Items)
            .child(PathSegment::OneOf);
        assert_eq!(path.to_string(), "properties/addressbook/items/oneOf");
        assert_eq!(SchemaPath::root().to_string(), "/");
    }
}
