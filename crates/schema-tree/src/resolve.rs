//! `$ref` resolution.
//!
//! A [`ReferenceResolver`] maps a reference string to a node in the arena. The
//! [`ReferenceResolvingVisitor`] plugs it into [`walk`](crate::walk::walk): every referencing
//! node is replaced by a newly allocated node that carries the referent's shape, so referents
//! shared by several parents are never overwritten.

use crate::error::{Result, SchemaTreeError};
use crate::model::{NodeId, SchemaArena, SchemaNode, SchemaPath, SchemaTree};
use crate::walk::{SchemaVisitor, Visit, walk};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Resolves a `$ref` string to a node of the arena being walked.
pub trait ReferenceResolver {
    /// # Errors
    ///
    /// Returns an error when `reference` cannot be resolved. Errors other than
    /// [`SchemaTreeError::Resolution`] are wrapped into one by the resolving visitor.
    fn resolve(&mut self, reference: &str, arena: &mut SchemaArena) -> Result<NodeId>;
}

impl<F> ReferenceResolver for F
where
    F: FnMut(&str, &mut SchemaArena) -> Result<NodeId>,
{
    fn resolve(&mut self, reference: &str, arena: &mut SchemaArena) -> Result<NodeId> {
        self(reference, arena)
    }
}

/// Resolver backed by a name -> node map, such as a catalog's `components.schemas`.
///
/// Accepts `#/components/schemas/<name>`, `#/definitions/<name>`, `#/<name>` and bare names.
#[derive(Debug, Clone, Copy)]
pub struct LocalResolver<'a> {
    schemas: &'a BTreeMap<String, NodeId>,
}

impl<'a> LocalResolver<'a> {
    #[must_use]
    pub fn new(schemas: &'a BTreeMap<String, NodeId>) -> Self {
        Self { schemas }
    }

    /// Schema name addressed by a local reference.
    #[must_use]
    pub fn schema_name(reference: &str) -> String {
        let name = ["#/components/schemas/", "#/definitions/", "#/"]
            .iter()
            .find_map(|prefix| reference.strip_prefix(prefix))
            .unwrap_or(reference);
        // JSON pointer escapes.
        name.replace("~1", "/").replace("~0", "~")
    }
}

impl ReferenceResolver for LocalResolver<'_> {
    fn resolve(&mut self, reference: &str, _arena: &mut SchemaArena) -> Result<NodeId> {
        let name = Self::schema_name(reference);
        self.schemas.get(&name).copied().ok_or_else(|| {
            SchemaTreeError::unresolved(reference, format!("unknown schema '{name}'"))
        })
    }
}

/// Visitor that replaces every node carrying a `$ref` with a resolved copy.
///
/// The resolved node takes `$id`, `type`, `properties` and `items` from the referent and keeps
/// `format` and `oneOf` from the referencing node.
pub struct ReferenceResolvingVisitor<'r, R: ?Sized> {
    resolver: &'r mut R,
    resolved: usize,
}

impl<'r, R> ReferenceResolvingVisitor<'r, R>
where
    R: ReferenceResolver + ?Sized,
{
    pub fn new(resolver: &'r mut R) -> Self {
        Self {
            resolver,
            resolved: 0,
        }
    }

    /// Number of references resolved so far.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved
    }

    /// Follow `reference` until it lands on a node that is not itself a reference.
    fn resolve_chain(&mut self, reference: &str, arena: &mut SchemaArena) -> Result<NodeId> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut current = reference.to_string();
        loop {
            if !seen.insert(current.clone()) {
                return Err(SchemaTreeError::unresolved(
                    reference,
                    format!("cyclic $ref chain through '{current}'"),
                ));
            }

            let target = self
                .resolver
                .resolve(&current, arena)
                .map_err(|e| match e {
                    SchemaTreeError::Resolution { .. } => e,
                    other => SchemaTreeError::unresolved(current.as_str(), other.to_string()),
                })?;

            match arena.get(target).unresolved_reference() {
                Some(next) => current = next.to_string(),
                None => return Ok(target),
            }
        }
    }
}

impl<R> SchemaVisitor for ReferenceResolvingVisitor<'_, R>
where
    R: ReferenceResolver + ?Sized,
{
    fn visit(
        &mut self,
        arena: &mut SchemaArena,
        node: NodeId,
        path: &SchemaPath,
    ) -> Result<Visit> {
        let Some(reference) = arena.get(node).unresolved_reference().map(str::to_string) else {
            return Ok(Visit::Keep);
        };

        let target = self.resolve_chain(&reference, arena)?;
        let referent = arena.get(target);
        let source = arena.get(node);
        let resolved = SchemaNode {
            types: referent.types.clone(),
            properties: referent.properties.clone(),
            items: referent.items,
            format: source.format.clone(),
            one_of: source.one_of.clone(),
            id: referent.id.clone(),
            reference: None,
        };

        let replacement = arena.insert(resolved);
        self.resolved += 1;
        debug!(%path, %reference, %replacement, "resolved $ref");
        Ok(Visit::Replace(replacement))
    }
}

/// Resolve every `$ref` reachable from `root`'s properties; equivalent to walking with a
/// [`ReferenceResolvingVisitor`].
///
/// Resolving a tree that has no references left is a no-op.
///
/// # Errors
///
/// Returns the first resolution or shape error; the walk is not continued past it.
pub fn resolve_references<R>(arena: &mut SchemaArena, root: NodeId, resolver: &mut R) -> Result<()>
where
    R: ReferenceResolver + ?Sized,
{
    let mut visitor = ReferenceResolvingVisitor::new(resolver);
    walk(arena, root, &mut visitor)?;
    debug!(resolved = visitor.resolved(), "finished $ref resolution");
    Ok(())
}

impl SchemaTree {
    /// Resolve every `$ref` of this tree in place; see [`resolve_references`].
    ///
    /// On failure the tree is left exactly as it was.
    ///
    /// # Errors
    ///
    /// See [`resolve_references`].
    pub fn resolve_references<R>(&mut self, resolver: &mut R) -> Result<()>
    where
        R: ReferenceResolver + ?Sized,
    {
        let mut arena = self.arena.clone();
        resolve_references(&mut arena, self.root, resolver)?;
        self.arena = arena;
        Ok(())
    }
}
