//! The registry (§4.5): four cross-indices over snapshots, plus immutable
//! retrieval. The coarse [`parking_lot::Mutex`] around [`RegistryInner`]
//! satisfies the atomicity contract of §5: a reader observing
//! `tree_by_root` also observes the matching `root_by_ecs_id` entries,
//! because both are mutated under the same guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::diff;
use crate::entity::{EntityHandle, GraphEntity};
use crate::error::{GraphError, GraphResult};
use crate::event::{EventSink, NoopEventSink, Operation, Outcome};
use crate::id::{EcsId, LineageId, LiveId};
use crate::tree::{build_tree, EntityTree};

#[derive(Default)]
struct RegistryInner {
    tree_by_root: HashMap<EcsId, EntityTree>,
    roots_by_lineage: HashMap<LineageId, Vec<EcsId>>,
    live_by_live_id: HashMap<LiveId, EntityHandle>,
    root_by_ecs_id: HashMap<EcsId, EcsId>,
    lineages_by_type: HashMap<&'static str, Vec<LineageId>>,
}

impl RegistryInner {
    /// Inserts `tree` into all five indices, failing if its root is already
    /// present. Called by both `register_root` and the first-registration
    /// path of `version_entity`.
    fn insert_tree(&mut self, tree: EntityTree) -> GraphResult<()> {
        if self.tree_by_root.contains_key(&tree.root_ecs_id) {
            return Err(GraphError::DuplicateRegistration(tree.root_ecs_id));
        }

        let root_type = tree
            .nodes
            .get(&tree.root_ecs_id)
            .ok_or(GraphError::MissingEntity(tree.root_ecs_id))?
            .borrow()
            .entity_type();

        for (&ecs_id, handle) in &tree.nodes {
            self.root_by_ecs_id.insert(ecs_id, tree.root_ecs_id);
            self.live_by_live_id
                .insert(handle.borrow().meta().live_id, handle.clone());
        }

        self.roots_by_lineage
            .entry(tree.lineage_id)
            .or_default()
            .push(tree.root_ecs_id);

        let lineages = self.lineages_by_type.entry(root_type).or_default();
        if !lineages.contains(&tree.lineage_id) {
            lineages.push(tree.lineage_id);
        }

        self.tree_by_root.insert(tree.root_ecs_id, tree);
        Ok(())
    }

    /// Removes every index entry for `old_id` that `new_tree` is about to
    /// supersede, then inserts `new_tree` fresh. `old_id` is the root's
    /// pre-versioning `ecs_id`; entities whose own `ecs_id` did not change
    /// simply get overwritten with identical values.
    fn replace_tree(&mut self, old_root_id: EcsId, new_tree: EntityTree) -> GraphResult<()> {
        self.tree_by_root.remove(&old_root_id);
        self.root_by_ecs_id.retain(|_, root| *root != old_root_id);

        for (&ecs_id, handle) in &new_tree.nodes {
            self.root_by_ecs_id.insert(ecs_id, new_tree.root_ecs_id);
            self.live_by_live_id
                .insert(handle.borrow().meta().live_id, handle.clone());
        }

        self.roots_by_lineage
            .entry(new_tree.lineage_id)
            .or_default()
            .push(new_tree.root_ecs_id);

        self.tree_by_root.insert(new_tree.root_ecs_id, new_tree);
        Ok(())
    }
}

/// The process-wide versioned-graph store (§3 "Registry state"). Cheap to
/// clone: clones share the same underlying indices via `Arc`.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
    sink: Arc<dyn EventSink>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            sink: Arc::new(NoopEventSink),
        }
    }

    #[must_use]
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            sink,
        }
    }

    pub(crate) fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    fn emit<T>(&self, op: Operation, subject: EcsId, start: Instant, result: &GraphResult<T>) {
        let outcome = match result {
            Ok(_) => Outcome::Applied,
            Err(_) => Outcome::Failed,
        };
        self.sink.on_completed(op, subject, start.elapsed(), outcome);
    }

    /// Registers a brand-new root (§4.5). Fails if `root` is not its own
    /// root, or a snapshot under its `ecs_id` already exists.
    #[instrument(skip(self, root))]
    pub fn register_root(&self, root: &EntityHandle) -> GraphResult<()> {
        let subject = root.borrow().meta().ecs_id;
        let start = Instant::now();
        self.sink.on_start(Operation::RegisterRoot, subject);

        let result = (|| {
            if !root.borrow().meta().is_root() {
                return Err(GraphError::NotARoot(subject));
            }
            let tree = build_tree(root)?;
            self.register_tree(tree)
        })();

        self.emit(Operation::RegisterRoot, subject, start, &result);
        result
    }

    /// Inserts an already-built tree into all indices. Fails if its root is
    /// already present.
    pub fn register_tree(&self, tree: EntityTree) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        inner.insert_tree(tree)
    }

    /// Returns a deep copy of the stored snapshot with every node's
    /// `live_id` re-stamped (§4.5 "Re-stamping on retrieval"), or `None` if
    /// no snapshot is registered under `root_ecs_id`.
    #[must_use]
    pub fn get_tree(&self, root_ecs_id: EcsId) -> Option<EntityTree> {
        let inner = self.inner.lock();
        let tree = inner.tree_by_root.get(&root_ecs_id)?;
        let mut copy = tree.deep_clone_structural();
        copy.restamp_live_ids();
        Some(copy)
    }

    #[must_use]
    pub fn get_entity(&self, root_ecs_id: EcsId, ecs_id: EcsId) -> Option<EntityHandle> {
        self.get_tree(root_ecs_id)?.nodes.remove(&ecs_id)
    }

    pub fn get_tree_from_entity(&self, entity: &EntityHandle) -> GraphResult<Option<EntityTree>> {
        let root_ecs_id = entity
            .borrow()
            .meta()
            .root_ecs_id
            .ok_or_else(|| GraphError::OrphanOperation(entity.borrow().meta().ecs_id))?;
        Ok(self.get_tree(root_ecs_id))
    }

    /// Lookup only (no copy): the live object currently registered under
    /// `live_id`, if any.
    #[must_use]
    pub fn get_live_entity(&self, live_id: LiveId) -> Option<EntityHandle> {
        self.inner.lock().live_by_live_id.get(&live_id).cloned()
    }

    #[must_use]
    pub fn get_live_root_from_entity(&self, entity: &EntityHandle) -> Option<EntityHandle> {
        let root_live_id = entity.borrow().meta().root_live_id?;
        self.get_live_entity(root_live_id)
    }

    /// The algorithm of §4.4. `None` is accepted and returns `false` with no
    /// side effects, matching §4.5's documented signature.
    #[instrument(skip(self, root))]
    pub fn version_entity(&self, root: Option<&EntityHandle>, force: bool) -> GraphResult<bool> {
        let Some(root) = root else {
            return Ok(false);
        };

        let subject = root.borrow().meta().ecs_id;
        let start = Instant::now();
        self.sink.on_start(Operation::VersionEntity, subject);

        let result = self.version_entity_inner(root, force);

        let outcome = match &result {
            Ok(true) => Outcome::Applied,
            Ok(false) => Outcome::NoChange,
            Err(_) => Outcome::Failed,
        };
        self.sink
            .on_completed(Operation::VersionEntity, subject, start.elapsed(), outcome);
        result
    }

    fn version_entity_inner(&self, root: &EntityHandle, force: bool) -> GraphResult<bool> {
        if !root.borrow().meta().is_root() {
            return Err(GraphError::NotARoot(root.borrow().meta().ecs_id));
        }
        let old_root_id = root.borrow().meta().ecs_id;

        let new_tree = build_tree(root)?;

        let has_previous = self.inner.lock().tree_by_root.contains_key(&old_root_id);
        if !has_previous {
            self.register_tree(new_tree)?;
            return Ok(true);
        }

        let modified = {
            let inner = self.inner.lock();
            let old_tree = inner
                .tree_by_root
                .get(&old_root_id)
                .ok_or(GraphError::MissingEntity(old_root_id))?;
            if force {
                new_tree.nodes.keys().copied().collect()
            } else {
                diff::compute(old_tree, &new_tree).modified
            }
        };

        if modified.is_empty() {
            debug!(root = %old_root_id, "version_entity: no changes");
            return Ok(false);
        }

        if !modified.contains(&new_tree.root_ecs_id) {
            return Err(GraphError::InvariantViolation(format!(
                "modified set is non-empty but does not contain root {old_root_id}"
            )));
        }

        let versioned = crate::versioning::apply(new_tree, &modified)?;
        let new_root_id = versioned.tree.root_ecs_id;

        {
            let mut inner = self.inner.lock();
            inner.replace_tree(old_root_id, versioned.tree)?;
        }

        debug_assert!(
            self.verify_tree_consistency(new_root_id).is_ok(),
            "version_entity produced a snapshot that diverges from the live tree it was built from"
        );

        Ok(true)
    }

    /// Rebuilds the tree from the live root currently owning `root_ecs_id`
    /// and checks it is structurally equal to the stored snapshot: same
    /// node id set, same edge set, same ancestry paths, same live-id map
    /// (§4.4 correctness property, §8 property 7).
    pub fn verify_tree_consistency(&self, root_ecs_id: EcsId) -> GraphResult<()> {
        let inner = self.inner.lock();
        let stored = inner
            .tree_by_root
            .get(&root_ecs_id)
            .ok_or(GraphError::MissingEntity(root_ecs_id))?;
        let root_handle = stored
            .nodes
            .get(&root_ecs_id)
            .ok_or(GraphError::MissingEntity(root_ecs_id))?
            .clone();
        drop(inner);

        let rebuilt = build_tree(&root_handle)?;
        let inner = self.inner.lock();
        let stored = inner
            .tree_by_root
            .get(&root_ecs_id)
            .ok_or(GraphError::MissingEntity(root_ecs_id))?;

        let stored_nodes: std::collections::HashSet<EcsId> = stored.nodes.keys().copied().collect();
        let rebuilt_nodes: std::collections::HashSet<EcsId> = rebuilt.nodes.keys().copied().collect();
        if stored_nodes != rebuilt_nodes {
            return Err(GraphError::InvariantViolation(
                "rebuilt tree's node set diverges from the stored snapshot".into(),
            ));
        }

        let stored_edges: std::collections::HashSet<(EcsId, EcsId)> =
            stored.edges.keys().copied().collect();
        let rebuilt_edges: std::collections::HashSet<(EcsId, EcsId)> =
            rebuilt.edges.keys().copied().collect();
        if stored_edges != rebuilt_edges {
            return Err(GraphError::InvariantViolation(
                "rebuilt tree's edge set diverges from the stored snapshot".into(),
            ));
        }

        if stored.ancestry_paths != rebuilt.ancestry_paths {
            return Err(GraphError::InvariantViolation(
                "rebuilt tree's ancestry paths diverge from the stored snapshot".into(),
            ));
        }

        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
