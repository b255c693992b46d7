//! The tree builder (§4.2) and the [`EntityTree`] snapshot shape (§3).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::{clone_handle, EntityHandle};
use crate::error::{GraphError, GraphResult};
use crate::id::{EcsId, LineageId, LiveId};

/// The container that carried a reference when the tree builder discovered
/// it. `Hierarchical` is *not* a member here; it is an orthogonal marker
/// recorded on [`EntityEdge::is_hierarchical`], not a container shape (§3).
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum EdgeKind {
    Direct,
    List,
    Dict,
    Set,
    Tuple,
}

/// One discovered reference from `source` to `target`. Dedup identity is
/// `(source, target, field_name)`; the tree itself indexes by `(source,
/// target)` only, which is sufficient because the builder never emits two
/// edges for the same field/target pair and a source referencing the same
/// target from two different fields is vanishingly rare in practice and, if
/// it does happen, the later field simply wins the slot (documented as a
/// known simplification in DESIGN.md).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EntityEdge {
    pub source_ecs_id: EcsId,
    pub target_ecs_id: EcsId,
    pub kind: EdgeKind,
    pub field_name: String,
    pub container_index: Option<usize>,
    pub container_key: Option<String>,
    pub is_hierarchical: bool,
    pub ownership: bool,
}

/// An immutable-by-convention snapshot of an entity graph rooted at
/// `root_ecs_id` (§3). Every invariant listed in spec §3/§8 is established
/// by [`build_tree`] and preserved by the versioning engine's index rewrite.
#[derive(Debug)]
pub struct EntityTree {
    pub root_ecs_id: EcsId,
    pub lineage_id: LineageId,
    pub nodes: HashMap<EcsId, EntityHandle>,
    pub edges: HashMap<(EcsId, EcsId), EntityEdge>,
    pub outgoing: HashMap<EcsId, Vec<EcsId>>,
    pub incoming: HashMap<EcsId, Vec<EcsId>>,
    pub ancestry_paths: HashMap<EcsId, Vec<EcsId>>,
    pub live_id_index: HashMap<LiveId, EcsId>,
}

impl EntityTree {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.ancestry_paths
            .values()
            .map(|path| path.len().saturating_sub(1))
            .max()
            .unwrap_or(0)
    }

    /// Deep-clones the object graph starting from the root and rebuilds the
    /// node/live-id indices by walking that single clone, rather than
    /// cloning each `nodes` entry independently: `clone_node` recursively
    /// clones entity-valued fields, so cloning per-entry would give each
    /// parent its own clone of a child, disjoint from the `nodes[child]`
    /// entry. Walking one clone keeps `nodes` and the live object graph
    /// pointing at the same handles, so `restamp_live_ids` re-stamps the
    /// objects callers actually traverse.
    #[must_use]
    pub(crate) fn deep_clone_structural(&self) -> Self {
        let cloned_root = clone_handle(&self.nodes[&self.root_ecs_id]);

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        let mut live_id_index = HashMap::with_capacity(self.live_id_index.len());
        nodes.insert(self.root_ecs_id, cloned_root.clone());
        live_id_index.insert(cloned_root.borrow().meta().live_id, self.root_ecs_id);

        let mut queue: VecDeque<EntityHandle> = VecDeque::new();
        queue.push_back(cloned_root);

        while let Some(entity) = queue.pop_front() {
            for field in entity.borrow().entity_fields() {
                for (child, _, _) in field.children() {
                    let child_ecs_id = child.borrow().meta().ecs_id;
                    if nodes.contains_key(&child_ecs_id) {
                        continue;
                    }
                    live_id_index.insert(child.borrow().meta().live_id, child_ecs_id);
                    nodes.insert(child_ecs_id, child.clone());
                    queue.push_back(child);
                }
            }
        }

        Self {
            root_ecs_id: self.root_ecs_id,
            lineage_id: self.lineage_id,
            nodes,
            edges: self.edges.clone(),
            outgoing: self.outgoing.clone(),
            incoming: self.incoming.clone(),
            ancestry_paths: self.ancestry_paths.clone(),
            live_id_index,
        }
    }

    /// Re-stamps every node's `live_id` (and, for non-root nodes,
    /// `root_live_id`) with fresh values and rewrites `live_id_index`
    /// accordingly. This is the "re-stamping on retrieval" contract of §4.5:
    /// `ecs_id`, `lineage_id`, history and domain fields are left untouched.
    pub(crate) fn restamp_live_ids(&mut self) {
        let new_root_live_id = crate::id::LiveId::new();
        let mut new_index = HashMap::with_capacity(self.live_id_index.len());

        if let Some(root_handle) = self.nodes.get(&self.root_ecs_id) {
            root_handle.borrow_mut().meta_mut().live_id = new_root_live_id;
            new_index.insert(new_root_live_id, self.root_ecs_id);
        }

        for (ecs_id, handle) in &self.nodes {
            if *ecs_id == self.root_ecs_id {
                continue;
            }
            let fresh = crate::id::LiveId::new();
            let mut entity = handle.borrow_mut();
            entity.meta_mut().live_id = fresh;
            entity.meta_mut().root_live_id = Some(new_root_live_id);
            new_index.insert(fresh, *ecs_id);
        }

        self.live_id_index = new_index;
    }
}

/// Breadth-first, single-pass construction of an [`EntityTree`] rooted at
/// `root` (§4.2). `O(N + E)`.
pub fn build_tree(root: &EntityHandle) -> GraphResult<EntityTree> {
    let root_ecs_id = root.borrow().meta().ecs_id;
    let lineage_id = root.borrow().meta().lineage_id;

    let mut nodes: HashMap<EcsId, EntityHandle> = HashMap::new();
    let mut edges: HashMap<(EcsId, EcsId), EntityEdge> = HashMap::new();
    let mut outgoing: HashMap<EcsId, Vec<EcsId>> = HashMap::new();
    let mut incoming: HashMap<EcsId, Vec<EcsId>> = HashMap::new();
    let mut ancestry_paths: HashMap<EcsId, Vec<EcsId>> = HashMap::new();
    let mut live_id_index: HashMap<LiveId, EcsId> = HashMap::new();
    let mut scanned: HashSet<EcsId> = HashSet::new();

    nodes.insert(root_ecs_id, root.clone());
    live_id_index.insert(root.borrow().meta().live_id, root_ecs_id);
    ancestry_paths.insert(root_ecs_id, vec![root_ecs_id]);

    let mut queue: VecDeque<(EntityHandle, Option<EcsId>)> = VecDeque::new();
    queue.push_back((root.clone(), None));

    while let Some((entity, parent_id)) = queue.pop_front() {
        let entity_ecs_id = entity.borrow().meta().ecs_id;

        if let Some(parent) = parent_id {
            // A node reached via a parent edge that was already scanned (the
            // root included) has two distinct parent chains reaching it.
            if scanned.contains(&entity_ecs_id) {
                return Err(GraphError::CycleDetected(entity_ecs_id));
            }

            let edge = edges
                .get_mut(&(parent, entity_ecs_id))
                .ok_or(GraphError::MissingEntity(entity_ecs_id))?;
            edge.is_hierarchical = true;

            let parent_path = ancestry_paths
                .get(&parent)
                .ok_or(GraphError::MissingEntity(parent))?
                .clone();
            let mut candidate = parent_path;
            candidate.push(entity_ecs_id);
            let shorter = ancestry_paths
                .get(&entity_ecs_id)
                .is_none_or(|existing| candidate.len() < existing.len());
            if shorter {
                ancestry_paths.insert(entity_ecs_id, candidate);
            }

            outgoing.entry(parent).or_default().push(entity_ecs_id);
            incoming.entry(entity_ecs_id).or_default().push(parent);
        }

        if scanned.contains(&entity_ecs_id) {
            continue;
        }
        scanned.insert(entity_ecs_id);

        for field in entity.borrow().entity_fields() {
            let kind = match &field {
                crate::field::EntityField::Single(..) => EdgeKind::Direct,
                crate::field::EntityField::List(..) => EdgeKind::List,
                crate::field::EntityField::Dict(..) => EdgeKind::Dict,
                crate::field::EntityField::Set(..) => EdgeKind::Set,
                crate::field::EntityField::Tuple(..) => EdgeKind::Tuple,
            };
            let field_name = field.name();

            for (child, index, key) in field.children() {
                let child_ecs_id = child.borrow().meta().ecs_id;
                let child_live_id = child.borrow().meta().live_id;

                if !nodes.contains_key(&child_ecs_id) {
                    nodes.insert(child_ecs_id, child.clone());
                    live_id_index.insert(child_live_id, child_ecs_id);
                }

                edges.insert(
                    (entity_ecs_id, child_ecs_id),
                    EntityEdge {
                        source_ecs_id: entity_ecs_id,
                        target_ecs_id: child_ecs_id,
                        kind,
                        field_name: field_name.to_string(),
                        container_index: index,
                        container_key: key,
                        is_hierarchical: false,
                        ownership: true,
                    },
                );

                queue.push_back((child, Some(entity_ecs_id)));
            }
        }
    }

    for ecs_id in nodes.keys() {
        if !ancestry_paths.contains_key(ecs_id) {
            return Err(GraphError::InvariantViolation(format!(
                "entity {ecs_id} has no ancestry path after tree construction"
            )));
        }
    }

    Ok(EntityTree {
        root_ecs_id,
        lineage_id,
        nodes,
        edges,
        outgoing,
        incoming,
        ancestry_paths,
        live_id_index,
    })
}

#[cfg(test)]
mod tests {
    use claims::assert_err;

    use super::*;
    use crate::test_support::{ChildEntity, RootEntity};

    #[test]
    fn single_node_tree_has_trivial_ancestry() {
        let root = RootEntity::new_handle("root");
        let tree = build_tree(&root).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.edge_count(), 0);
        assert_eq!(tree.ancestry_paths[&tree.root_ecs_id], vec![tree.root_ecs_id]);
    }

    #[test]
    fn child_gets_hierarchical_edge_and_two_step_ancestry() {
        let root = RootEntity::new_handle("root");
        let child = ChildEntity::new_handle("child");
        RootEntity::attach_child(&root, child.clone());

        let tree = build_tree(&root).unwrap();
        let child_ecs_id = child.borrow().meta().ecs_id;

        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.edge_count(), 1);
        let edge = &tree.edges[&(tree.root_ecs_id, child_ecs_id)];
        assert!(edge.is_hierarchical);
        assert_eq!(edge.kind, EdgeKind::Direct);
        assert_eq!(
            tree.ancestry_paths[&child_ecs_id],
            vec![tree.root_ecs_id, child_ecs_id]
        );
    }

    #[test]
    fn list_children_get_ascending_container_index() {
        let root = RootEntity::new_handle("root");
        let c1 = ChildEntity::new_handle("c1");
        let c2 = ChildEntity::new_handle("c2");
        let c3 = ChildEntity::new_handle("c3");
        RootEntity::push_list_child(&root, c1.clone());
        RootEntity::push_list_child(&root, c2.clone());
        RootEntity::push_list_child(&root, c3.clone());

        let tree = build_tree(&root).unwrap();
        for (expected_index, child) in [c1, c2, c3].iter().enumerate() {
            let child_ecs_id = child.borrow().meta().ecs_id;
            let edge = &tree.edges[&(tree.root_ecs_id, child_ecs_id)];
            assert_eq!(edge.kind, EdgeKind::List);
            assert_eq!(edge.container_index, Some(expected_index));
            assert_eq!(edge.container_key, None);
        }
    }

    #[test]
    fn edge_endpoints_and_adjacency_and_hierarchical_fanin_hold() {
        // Exercises §3 invariants 2, 4 and 5 (and §8 properties 2-3) directly:
        // every edge's endpoints are tracked nodes, outgoing/incoming agree
        // with the edge set, and every non-root node has exactly one
        // hierarchical incoming edge while the root has none.
        let root = RootEntity::new_handle("root");
        let branch_a = ChildEntity::new_handle("a");
        let branch_b = ChildEntity::new_handle("b");
        let leaf = ChildEntity::new_handle("leaf");
        ChildEntity::attach_leaf(&branch_a, leaf.clone());
        RootEntity::attach_branch_a(&root, branch_a.clone());
        RootEntity::attach_branch_b(&root, branch_b.clone());

        let tree = build_tree(&root).unwrap();

        for (&(s, t), edge) in &tree.edges {
            assert!(tree.nodes.contains_key(&s));
            assert!(tree.nodes.contains_key(&t));
            assert_eq!(edge.source_ecs_id, s);
            assert_eq!(edge.target_ecs_id, t);
            assert!(tree.outgoing[&s].contains(&t));
            assert!(tree.incoming[&t].contains(&s));
        }

        let mut hierarchical_fanin: HashMap<EcsId, usize> = HashMap::new();
        for edge in tree.edges.values().filter(|e| e.is_hierarchical) {
            *hierarchical_fanin.entry(edge.target_ecs_id).or_default() += 1;
        }
        for &id in tree.nodes.keys() {
            if id == tree.root_ecs_id {
                assert_eq!(hierarchical_fanin.get(&id), None);
            } else {
                assert_eq!(hierarchical_fanin.get(&id), Some(&1));
            }
        }
        let _ = leaf;
    }

    #[test]
    fn cycle_is_rejected() {
        let a = RootEntity::new_handle("a");
        let b = ChildEntity::new_handle("b");
        RootEntity::attach_child(&a, b.clone());
        // Force a cycle: b's (test-only) back edge points at a.
        ChildEntity::attach_back_edge(&b, a.clone());

        let result = build_tree(&a);
        assert_err!(&result);
        assert!(matches!(result, Err(GraphError::CycleDetected(_))));
    }
}
