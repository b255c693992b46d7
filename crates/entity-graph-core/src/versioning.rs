//! The versioning engine (§4.4): re-stamps exactly the modified set and
//! rewrites a freshly built tree's indices to match, preserving lineage.

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, GraphResult};
use crate::id::EcsId;
use crate::tree::EntityTree;

/// `old -> new` for every `ecs_id` the versioning pass re-stamped.
pub type IdMap = HashMap<EcsId, EcsId>;

/// Stamps a fresh `ecs_id` on the root first (per §4.4 step 5), then on
/// every other entity in `modified` (step 6), mutating the live entities
/// reachable from `tree` in place. Returns the `old -> new` id map used to
/// rewrite the tree's indices.
///
/// `modified` must contain `tree.root_ecs_id`; callers check this before
/// calling (the invariant is re-checked here as a `debug_assert` only,
/// since by the time we get here it has already been validated and turned
/// into a caller-facing [`GraphError::InvariantViolation`] once).
fn restamp_entities(tree: &EntityTree, modified: &HashSet<EcsId>) -> GraphResult<IdMap> {
    debug_assert!(modified.contains(&tree.root_ecs_id));

    let mut id_map = IdMap::with_capacity(modified.len());

    let root_handle = tree
        .nodes
        .get(&tree.root_ecs_id)
        .ok_or(GraphError::MissingEntity(tree.root_ecs_id))?;
    let old_root_id = {
        let mut entity = root_handle.borrow_mut();
        let old_id = entity.meta_mut().restamp_ecs_id();
        let new_id = entity.meta().ecs_id;
        entity.meta_mut().root_ecs_id = Some(new_id);
        old_id
    };
    id_map.insert(old_root_id, tree.nodes[&tree.root_ecs_id].borrow().meta().ecs_id);

    for &old_id in modified {
        if old_id == old_root_id {
            continue;
        }
        let handle = tree
            .nodes
            .get(&old_id)
            .ok_or(GraphError::MissingEntity(old_id))?;
        let mut entity = handle.borrow_mut();
        let returned_old = entity.meta_mut().restamp_ecs_id();
        debug_assert_eq!(returned_old, old_id);
        let new_id = entity.meta().ecs_id;
        id_map.insert(old_id, new_id);
    }

    Ok(id_map)
}

fn remap(id: EcsId, id_map: &IdMap) -> EcsId {
    id_map.get(&id).copied().unwrap_or(id)
}

/// Rewrites every index of `tree` through `id_map` (§4.4 step 7-8): node
/// keys, edge endpoints, adjacency, ancestry paths, the live-id index, the
/// root id, and (for every node, not just the re-stamped ones) each
/// entity's own `root_ecs_id` back-pointer, since the whole tree now hangs
/// off a new root regardless of which individual entities changed.
fn rewrite_tree(mut tree: EntityTree, id_map: &IdMap) -> GraphResult<EntityTree> {
    for handle in tree.nodes.values() {
        let mut entity = handle.borrow_mut();
        if let Some(root_id) = entity.meta().root_ecs_id {
            let mapped = remap(root_id, id_map);
            if mapped != root_id {
                entity.meta_mut().root_ecs_id = Some(mapped);
            }
        }
    }

    let nodes = tree
        .nodes
        .drain()
        .map(|(old_id, handle)| (remap(old_id, id_map), handle))
        .collect();

    let edges = tree
        .edges
        .drain()
        .map(|((s, t), mut edge)| {
            let s2 = remap(s, id_map);
            let t2 = remap(t, id_map);
            edge.source_ecs_id = s2;
            edge.target_ecs_id = t2;
            ((s2, t2), edge)
        })
        .collect();

    let outgoing = tree
        .outgoing
        .drain()
        .map(|(s, targets)| {
            (
                remap(s, id_map),
                targets.into_iter().map(|t| remap(t, id_map)).collect(),
            )
        })
        .collect();

    let incoming = tree
        .incoming
        .drain()
        .map(|(t, sources)| {
            (
                remap(t, id_map),
                sources.into_iter().map(|s| remap(s, id_map)).collect(),
            )
        })
        .collect();

    let ancestry_paths = tree
        .ancestry_paths
        .drain()
        .map(|(id, path)| {
            (
                remap(id, id_map),
                path.into_iter().map(|p| remap(p, id_map)).collect(),
            )
        })
        .collect();

    let live_id_index = tree
        .live_id_index
        .drain()
        .map(|(live_id, ecs_id)| (live_id, remap(ecs_id, id_map)))
        .collect();

    tree.root_ecs_id = remap(tree.root_ecs_id, id_map);
    tree.nodes = nodes;
    tree.edges = edges;
    tree.outgoing = outgoing;
    tree.incoming = incoming;
    tree.ancestry_paths = ancestry_paths;
    tree.live_id_index = live_id_index;

    Ok(tree)
}

/// Outcome of versioning a freshly built tree against the modified set a
/// diff (or a force-version) produced.
pub struct Versioned {
    pub tree: EntityTree,
    pub id_map: IdMap,
}

/// Re-stamps every entity in `modified` and rewrites `new_tree`'s indices to
/// match (§4.4 steps 5-8). Caller has already established that `modified`
/// is non-empty and contains `new_tree.root_ecs_id`.
pub fn apply(new_tree: EntityTree, modified: &HashSet<EcsId>) -> GraphResult<Versioned> {
    let id_map = restamp_entities(&new_tree, modified)?;
    let tree = rewrite_tree(new_tree, &id_map)?;
    Ok(Versioned { tree, id_map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{set_untyped_data, ChildEntity, RootEntity};
    use crate::tree::build_tree;

    #[test]
    fn single_field_change_propagates_to_root_s1() {
        let root = RootEntity::new_handle("root");
        let child = ChildEntity::new_handle("child");
        RootEntity::attach_child(&root, child.clone());

        let u0 = root.borrow().meta().ecs_id;
        let c0 = child.borrow().meta().ecs_id;

        set_untyped_data(&child, "x");
        let new_tree = build_tree(&root).unwrap();
        let modified: HashSet<EcsId> = [new_tree.root_ecs_id, c0].into_iter().collect();

        let versioned = apply(new_tree, &modified).unwrap();

        let u1 = root.borrow().meta().ecs_id;
        let c1 = child.borrow().meta().ecs_id;
        assert_ne!(u1, u0);
        assert_ne!(c1, c0);
        assert_eq!(child.borrow().meta().root_ecs_id, Some(u1));
        assert_eq!(versioned.id_map.get(&u0), Some(&u1));
        assert_eq!(versioned.id_map.get(&c0), Some(&c1));
        assert_eq!(versioned.tree.root_ecs_id, u1);
        assert!(versioned.tree.nodes.contains_key(&c1));
        assert!(!versioned.tree.nodes.contains_key(&c0));
    }

    #[test]
    fn unchanged_nodes_still_get_new_root_back_pointer() {
        let root = RootEntity::new_handle("root");
        let branch_a = ChildEntity::new_handle("a");
        RootEntity::attach_branch_a(&root, branch_a.clone());

        let a0 = branch_a.borrow().meta().ecs_id;
        let u0 = root.borrow().meta().ecs_id;

        let new_tree = build_tree(&root).unwrap();
        let modified: HashSet<EcsId> = [new_tree.root_ecs_id].into_iter().collect();
        let versioned = apply(new_tree, &modified).unwrap();

        // branch_a was not in the modified set: its ecs_id is unchanged...
        assert_eq!(branch_a.borrow().meta().ecs_id, a0);
        // ...but its root_ecs_id now points at the new root, not u0.
        assert_ne!(branch_a.borrow().meta().root_ecs_id, Some(u0));
        assert_eq!(branch_a.borrow().meta().root_ecs_id, Some(versioned.tree.root_ecs_id));
    }
}
