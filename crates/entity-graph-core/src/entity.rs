//! The entity model (§3): identity, lineage, ownership and the
//! [`GraphEntity`] trait every domain record implements (normally via
//! `#[derive(GraphEntity)]` from `entity-graph-macros`).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::GraphResult;
use crate::field::{AttributeSource, EntityField, PlainValue};
use crate::id::{EcsId, LineageId, LiveId};

/// Nanoseconds since the Unix epoch. Matches the timestamp convention the
/// teacher's own storage tests use (`SystemTime::now().duration_since(UNIX_EPOCH)`)
/// rather than pulling in a datetime crate the rest of the core has no other
/// use for.
#[must_use]
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as u64
}

/// Identity, lineage and history fields every entity carries. Embedded as a
/// `meta` field by every type implementing [`GraphEntity`]; user code must
/// never hand-edit it directly (§6).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EntityMeta {
    pub ecs_id: EcsId,
    pub live_id: LiveId,
    pub lineage_id: LineageId,
    pub previous_ecs_id: Option<EcsId>,
    pub old_ecs_id: Option<EcsId>,
    pub old_ids: Vec<EcsId>,
    pub root_ecs_id: Option<EcsId>,
    pub root_live_id: Option<LiveId>,
    pub created_at: u64,
    pub forked_at: u64,
    pub from_storage: bool,
    pub attribute_source: HashMap<String, AttributeSource>,
}

impl EntityMeta {
    /// A freshly created, orphaned entity: its own lineage, no root, no
    /// history.
    #[must_use]
    pub fn new() -> Self {
        let now = now_nanos();
        Self {
            ecs_id: EcsId::new(),
            live_id: LiveId::new(),
            lineage_id: LineageId::new(),
            previous_ecs_id: None,
            old_ecs_id: None,
            old_ids: Vec::new(),
            root_ecs_id: None,
            root_live_id: None,
            created_at: now,
            forked_at: now,
            from_storage: false,
            attribute_source: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.root_ecs_id == Some(self.ecs_id)
    }

    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.root_ecs_id.is_none() && self.root_live_id.is_none()
    }

    /// Re-stamps `ecs_id`, pushing the old value onto the history fields.
    /// Called by the versioning engine only; `forked_at` advances, `created_at`
    /// never does.
    pub(crate) fn restamp_ecs_id(&mut self) -> EcsId {
        let old = self.ecs_id;
        self.old_ecs_id = Some(old);
        self.previous_ecs_id = Some(old);
        self.old_ids.push(old);
        self.ecs_id = EcsId::new();
        self.forked_at = now_nanos();
        old
    }
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A live, shared, interior-mutable handle to an entity participating in an
/// in-memory object graph. Children of an entity are held as `EntityHandle`s
/// rather than by value so that the tree builder, diff engine and versioning
/// engine can all traverse the same live graph without taking ownership of
/// it. The registry only ever stores independently cloned copies (see
/// [`crate::tree::EntityTree`]).
pub type EntityHandle = Rc<RefCell<dyn GraphEntity>>;

/// Implemented by every domain record type that participates in the graph.
/// Ordinarily generated by `#[derive(GraphEntity)]`; see `entity-graph-macros`.
pub trait GraphEntity: Any + fmt::Debug {
    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// The domain type name, used for the registry's type index and for
    /// diagnostics. Distinct from any Rust `TypeId` so dynamically created
    /// entity types (the callable layer's wrapper types) can report a name
    /// without being a statically known Rust type.
    fn entity_type(&self) -> &'static str;

    /// Every entity-bearing field this value currently declares, in
    /// declaration order.
    fn entity_fields(&self) -> Vec<EntityField>;

    /// The complement of `entity_fields`: every plain-data field, used by
    /// the diff engine's attribute comparison (§4.3 stage 3) and ignoring
    /// identity/history fields, which are never diffed.
    fn plain_fields(&self) -> Vec<(&'static str, PlainValue)>;

    /// Produces an independent copy of this node's own data (meta + plain
    /// fields + freshly cloned entity-valued fields, recursively). Used by
    /// the registry to cut aliasing between the live object graph and a
    /// persisted snapshot, and again on every retrieval to decouple
    /// successive snapshots from each other (§4.5).
    fn clone_node(&self) -> Box<dyn GraphEntity>;

    /// Overwrites a single plain-data field by name with a deep-copied
    /// value. The only mutation surface `borrow_attribute_from` (§4.6) needs
    /// on the target side of a scalar/plain-container borrow; returns
    /// [`GraphError::FieldNotFound`] for a name the type does not declare.
    fn set_plain_field(&mut self, name: &str, value: PlainValue) -> GraphResult<()>;

    /// Overwrites an entity-bearing field named `name`, assigning the
    /// handles carried by `field` by reference (no cloning): the "entity
    /// references are assigned by reference" half of `borrow_attribute_from`
    /// (§4.6). `field`'s own embedded field name is ignored; `name` is
    /// authoritative, since a borrow's source and target field names may
    /// differ.
    fn set_entity_field(&mut self, name: &str, field: EntityField) -> GraphResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Equality key used throughout the core: `(ecs_id, root_ecs_id)` only.
    /// `live_id` never participates, and hashing must agree with this:
    /// two retrievals of the same snapshot compare equal here even though
    /// their `live_id`s differ (§4.5, §8 property 8).
    fn identity_key(&self) -> EntityKey {
        EntityKey(self.meta().ecs_id, self.meta().root_ecs_id)
    }
}

/// Equality/hash key for an entity: `(ecs_id, root_ecs_id)`. Two entities
/// with this pair equal compare equal regardless of `live_id`, matching the
/// source's `__eq__`/`__hash__` override (DESIGN NOTES, "Equality and
/// hashing"). Note this also means the *same* sub-entity, retrieved before
/// and after its root was versioned, compares unequal: its `root_ecs_id`
/// changed even though its own `ecs_id` may not have (§9 Open Question).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityKey(pub EcsId, pub Option<EcsId>);

/// Recursively clones a live subtree into a brand new, independent
/// `EntityHandle` tree. `GraphEntity::clone_node` clones one node's own
/// plain data; the derive macro's generated implementation calls this
/// helper on every entity-valued field so the whole subtree comes along.
#[must_use]
pub fn clone_handle(handle: &EntityHandle) -> EntityHandle {
    let cloned = handle.borrow().clone_node();
    Rc::new(RefCell::new(BoxedEntity(cloned)))
}

/// Wraps a `Box<dyn GraphEntity>` so it can be stored behind the same
/// `Rc<RefCell<dyn GraphEntity>>` handle type as a live, statically typed
/// entity. `clone_node`'s generated implementations build their
/// entity-valued fields directly as `EntityHandle`s via `clone_handle`, so
/// this wrapper is only ever the outermost shell produced by `clone_handle`
/// itself, not something derive authors need to construct by hand.
struct BoxedEntity(Box<dyn GraphEntity>);

impl fmt::Debug for BoxedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl GraphEntity for BoxedEntity {
    fn meta(&self) -> &EntityMeta {
        self.0.meta()
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        self.0.meta_mut()
    }

    fn entity_type(&self) -> &'static str {
        self.0.entity_type()
    }

    fn entity_fields(&self) -> Vec<EntityField> {
        self.0.entity_fields()
    }

    fn plain_fields(&self) -> Vec<(&'static str, PlainValue)> {
        self.0.plain_fields()
    }

    fn clone_node(&self) -> Box<dyn GraphEntity> {
        self.0.clone_node()
    }

    fn set_plain_field(&mut self, name: &str, value: PlainValue) -> GraphResult<()> {
        self.0.set_plain_field(name, value)
    }

    fn set_entity_field(&mut self, name: &str, field: EntityField) -> GraphResult<()> {
        self.0.set_entity_field(name, field)
    }

    fn as_any(&self) -> &dyn Any {
        self.0.as_any()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self.0.as_any_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(key: EntityKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn fresh_meta_is_orphan_but_not_root() {
        let meta = EntityMeta::new();
        assert!(meta.is_orphan());
        assert!(!meta.is_root());
    }

    #[test]
    fn restamp_pushes_old_id_onto_history() {
        let mut meta = EntityMeta::new();
        let original = meta.ecs_id;
        let returned = meta.restamp_ecs_id();
        assert_eq!(returned, original);
        assert_ne!(meta.ecs_id, original);
        assert_eq!(meta.old_ids, vec![original]);
        assert_eq!(meta.previous_ecs_id, Some(original));
        assert_eq!(meta.old_ecs_id, Some(original));
    }

    #[test]
    fn becomes_root_once_root_ecs_id_matches_self() {
        let mut meta = EntityMeta::new();
        meta.root_ecs_id = Some(meta.ecs_id);
        meta.root_live_id = Some(meta.live_id);
        assert!(meta.is_root());
        assert!(!meta.is_orphan());
    }

    /// §8 property 8: equality and hashing key on `(ecs_id, root_ecs_id)`
    /// only, ignoring `live_id`.
    #[test]
    fn identity_key_ignores_live_id() {
        let ecs_id = EcsId::new();
        let root_ecs_id = Some(EcsId::new());
        let a = EntityKey(ecs_id, root_ecs_id);
        let b = EntityKey(ecs_id, root_ecs_id);
        assert_eq!(a, b);
        assert_eq!(hash_of(a), hash_of(b));
    }

    /// §9 open question: the same sub-entity retrieved before and after its
    /// root was re-versioned compares unequal, because `root_ecs_id` changed
    /// even though the sub-entity's own `ecs_id` did not.
    #[test]
    fn identity_key_changes_when_root_is_reversioned() {
        let ecs_id = EcsId::new();
        let before = EntityKey(ecs_id, Some(EcsId::new()));
        let after = EntityKey(ecs_id, Some(EcsId::new()));
        assert_ne!(before, after);
    }
}
