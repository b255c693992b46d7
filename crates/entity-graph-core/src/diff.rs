//! The structural diff engine (§4.3): compares two trees rooted in the same
//! lineage and produces the modified set `version_entity` will re-stamp.

use std::collections::{HashMap, HashSet};

use crate::field::PlainValue;
use crate::id::EcsId;
use crate::tree::EntityTree;

/// Output of [`compute`]: the modified set plus the diagnostic sets named in
/// §4.3. `comparison_count` is the number of attribute comparisons stage 3
/// actually performed (nodes skipped because an earlier stage already
/// claimed them do not count).
#[derive(Debug, Default)]
pub struct DiffResult {
    pub modified: HashSet<EcsId>,
    pub added: HashSet<EcsId>,
    pub removed: HashSet<EcsId>,
    pub moved: HashSet<EcsId>,
    pub unchanged: HashSet<EcsId>,
    pub comparison_count: usize,
}

fn plain_field_map(
    tree: &EntityTree,
    ecs_id: EcsId,
) -> Option<HashMap<&'static str, PlainValue>> {
    tree.nodes
        .get(&ecs_id)
        .map(|handle| handle.borrow().plain_fields().into_iter().collect())
}

/// Computes the modified set between `old_tree` and `new_tree` (§4.3).
/// Both trees must be rooted in the same lineage; this is not asserted here
/// because a caller mismatching lineages is itself an upstream bug the
/// versioning engine catches via the root-in-modified-set invariant.
#[must_use]
pub fn compute(old_tree: &EntityTree, new_tree: &EntityTree) -> DiffResult {
    let mut result = DiffResult::default();

    // Stage 1: node set difference.
    for &id in new_tree.nodes.keys() {
        if !old_tree.nodes.contains_key(&id) {
            result.added.insert(id);
        }
    }
    for &id in old_tree.nodes.keys() {
        if !new_tree.nodes.contains_key(&id) {
            result.removed.insert(id);
        }
    }
    for &added in &result.added {
        if let Some(path) = new_tree.ancestry_paths.get(&added) {
            result.modified.extend(path.iter().copied());
        }
    }

    // Stage 2: edge-induced moves. A common node's incoming-edge source set
    // differing between old and new means it was re-parented.
    let common: Vec<EcsId> = new_tree
        .nodes
        .keys()
        .copied()
        .filter(|id| old_tree.nodes.contains_key(id))
        .collect();

    for &id in &common {
        let old_sources: HashSet<EcsId> = old_tree
            .incoming
            .get(&id)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default();
        let new_sources: HashSet<EcsId> = new_tree
            .incoming
            .get(&id)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default();

        if old_sources != new_sources {
            result.moved.insert(id);
            if let Some(path) = new_tree.ancestry_paths.get(&id) {
                result.modified.extend(path.iter().copied());
            }
        }
    }

    // A moved node's *former* parent lost a child edge but, by itself, has
    // an unchanged incoming-edge set and no plain-field change, so the loop
    // above never visits it. Catch it by walking the removed edges and
    // pulling in any source that is still a common node (the edge
    // disappeared because its target was re-parented, not because the
    // source itself was removed).
    for &(s, t) in old_tree.edges.keys() {
        if new_tree.edges.contains_key(&(s, t)) {
            continue;
        }
        if new_tree.nodes.contains_key(&s) {
            if let Some(path) = new_tree.ancestry_paths.get(&s) {
                result.modified.extend(path.iter().copied());
            }
        }
    }

    // Stage 3: attribute comparison of remaining commons, leaves first so a
    // descendant's modification already pulls in its ancestors before we get
    // to them (the "skip further ancestor comparisons" greedy shortcut).
    let mut remaining: Vec<EcsId> = common
        .into_iter()
        .filter(|id| !result.modified.contains(id) && !result.moved.contains(id))
        .collect();
    remaining.sort_by_key(|id| {
        std::cmp::Reverse(new_tree.ancestry_paths.get(id).map_or(0, Vec::len))
    });

    for id in remaining {
        if result.modified.contains(&id) {
            // Pulled in by a descendant's path while we were iterating.
            continue;
        }

        result.comparison_count += 1;
        let old_fields = plain_field_map(old_tree, id);
        let new_fields = plain_field_map(new_tree, id);

        let differs = match (old_fields, new_fields) {
            (Some(old), Some(new)) => old != new,
            _ => true,
        };

        if differs {
            if let Some(path) = new_tree.ancestry_paths.get(&id) {
                result.modified.extend(path.iter().copied());
            }
        } else {
            result.unchanged.insert(id);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{set_untyped_data, ChildEntity, RootEntity};
    use crate::tree::build_tree;

    #[test]
    fn no_changes_yields_empty_modified_set() {
        let root = RootEntity::new_handle("root");
        let child = ChildEntity::new_handle("child");
        RootEntity::attach_child(&root, child);

        let old_tree = build_tree(&root).unwrap();
        let new_tree = build_tree(&root).unwrap();

        let diff = compute(&old_tree, &new_tree);
        assert!(diff.modified.is_empty());
        assert_eq!(diff.unchanged.len(), 2);
    }

    #[test]
    fn leaf_change_propagates_to_root() {
        let root = RootEntity::new_handle("root");
        let child = ChildEntity::new_handle("child");
        RootEntity::attach_child(&root, child.clone());

        let old_tree = build_tree(&root).unwrap();
        set_untyped_data(&child, "x");
        let new_tree = build_tree(&root).unwrap();

        let diff = compute(&old_tree, &new_tree);
        assert_eq!(diff.modified.len(), 2);
        assert!(diff.modified.contains(&new_tree.root_ecs_id));
        assert!(diff.modified.contains(&child.borrow().meta().ecs_id));
    }

    #[test]
    fn only_touched_branch_is_modified() {
        let root = RootEntity::new_handle("root");
        let branch_a = ChildEntity::new_handle("a");
        let branch_b = ChildEntity::new_handle("b");
        let leaf_a = ChildEntity::new_handle("leaf_a");
        let leaf_b = ChildEntity::new_handle("leaf_b");
        ChildEntity::attach_leaf(&branch_a, leaf_a.clone());
        ChildEntity::attach_leaf(&branch_b, leaf_b.clone());
        RootEntity::attach_branch_a(&root, branch_a.clone());
        RootEntity::attach_branch_b(&root, branch_b.clone());

        let old_tree = build_tree(&root).unwrap();
        set_untyped_data(&leaf_b, "changed");
        let new_tree = build_tree(&root).unwrap();

        let diff = compute(&old_tree, &new_tree);
        let expected: HashSet<EcsId> = [
            new_tree.root_ecs_id,
            branch_b.borrow().meta().ecs_id,
            leaf_b.borrow().meta().ecs_id,
        ]
        .into_iter()
        .collect();
        assert_eq!(diff.modified, expected);
        assert!(!diff.modified.contains(&branch_a.borrow().meta().ecs_id));
        assert!(!diff.modified.contains(&leaf_a.borrow().meta().ecs_id));
    }

    #[test]
    fn added_node_pulls_in_its_ancestry_path() {
        let root = RootEntity::new_handle("root");
        let old_tree = build_tree(&root).unwrap();

        let c3 = ChildEntity::new_handle("c3");
        RootEntity::push_list_child(&root, c3.clone());
        let new_tree = build_tree(&root).unwrap();

        let diff = compute(&old_tree, &new_tree);
        assert!(diff.added.contains(&c3.borrow().meta().ecs_id));
        assert!(diff.modified.contains(&new_tree.root_ecs_id));
        assert!(diff.modified.contains(&c3.borrow().meta().ecs_id));
    }

    #[test]
    fn moving_a_grandchild_between_branches_is_reported_as_moved() {
        let root = RootEntity::new_handle("root");
        let branch_a = ChildEntity::new_handle("a");
        let branch_b = ChildEntity::new_handle("b");
        let grandchild = ChildEntity::new_handle("g");
        ChildEntity::attach_leaf(&branch_a, grandchild.clone());
        RootEntity::attach_branch_a(&root, branch_a.clone());
        RootEntity::attach_branch_b(&root, branch_b.clone());

        let old_tree = build_tree(&root).unwrap();

        // Move the grandchild from branch_a to branch_b.
        ChildEntity::clear_leaf(&branch_a);
        ChildEntity::attach_leaf(&branch_b, grandchild.clone());

        let new_tree = build_tree(&root).unwrap();
        let diff = compute(&old_tree, &new_tree);

        let grandchild_ecs_id = grandchild.borrow().meta().ecs_id;
        assert!(diff.moved.contains(&grandchild_ecs_id));

        let expected: HashSet<EcsId> = [
            new_tree.root_ecs_id,
            branch_a.borrow().meta().ecs_id,
            branch_b.borrow().meta().ecs_id,
            grandchild_ecs_id,
        ]
        .into_iter()
        .collect();
        assert_eq!(diff.modified, expected);
    }
}
