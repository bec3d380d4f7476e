//! Lineage traversal over the derived-from relation.
//!
//! The graph is never materialized: asset A is a child of asset B iff
//! A's metadata `inputs` list contains B's id. Traversal builds an
//! adjacency view per call and walks it breadth-first in both
//! directions, guarded only by a visited set, so cycles and diamonds
//! terminate and dangling input ids are skipped.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::db::Asset;

/// Connected subgraph around `root_id`: the root itself, every ancestor
/// reachable through `inputs`, and every descendant reachable through
/// the reverse relation. Root first, each node exactly once. An unknown
/// root id yields an empty result.
pub fn ancestors_and_descendants(assets: &[Asset], root_id: i64) -> Vec<Asset> {
    let by_id: HashMap<i64, &Asset> = assets.iter().map(|a| (a.id, a)).collect();
    if !by_id.contains_key(&root_id) {
        return Vec::new();
    }

    // reverse adjacency: parent id -> child ids
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for asset in assets {
        for &input in &asset.metadata.inputs {
            children.entry(input).or_default().push(asset.id);
        }
    }

    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(root_id);
    let mut ordered: Vec<i64> = vec![root_id];

    // upward: ancestors via inputs
    let mut queue: VecDeque<i64> = VecDeque::from([root_id]);
    while let Some(id) = queue.pop_front() {
        let asset = match by_id.get(&id) {
            Some(asset) => asset,
            None => continue,
        };
        for &input in &asset.metadata.inputs {
            if by_id.contains_key(&input) && visited.insert(input) {
                ordered.push(input);
                queue.push_back(input);
            }
        }
    }

    // downward: descendants via the reverse adjacency
    let mut queue: VecDeque<i64> = VecDeque::from([root_id]);
    while let Some(id) = queue.pop_front() {
        if let Some(kids) = children.get(&id) {
            for &kid in kids {
                if visited.insert(kid) {
                    ordered.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }

    ordered
        .iter()
        .filter_map(|id| by_id.get(id).map(|a| (*a).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AssetKind, AssetMetadata, AssetStatus};

    fn asset(id: i64, inputs: Vec<i64>) -> Asset {
        Asset {
            id,
            path: format!("{id}.png"),
            kind: AssetKind::Image,
            status: AssetStatus::Unsorted,
            created_at: id,
            updated_at: id,
            metadata: AssetMetadata {
                inputs,
                ..AssetMetadata::default()
            },
            tags: Vec::new(),
            distance: None,
        }
    }

    fn ids(result: &[Asset]) -> Vec<i64> {
        result.iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_parent_and_child() {
        let assets = vec![asset(1, vec![]), asset(2, vec![1])];
        let result = ancestors_and_descendants(&assets, 1);
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_walks_both_directions() {
        // grandparent 1 -> parent 2 -> root 3 -> child 4
        let assets = vec![
            asset(1, vec![]),
            asset(2, vec![1]),
            asset(3, vec![2]),
            asset(4, vec![3]),
            asset(5, vec![]), // disconnected
        ];
        let result = ancestors_and_descendants(&assets, 3);
        let mut found = ids(&result);
        assert_eq!(found[0], 3, "root comes first");
        found.sort();
        assert_eq!(found, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_terminates_on_cycles() {
        let assets = vec![asset(1, vec![2]), asset(2, vec![1])];
        let result = ancestors_and_descendants(&assets, 1);
        let mut found = ids(&result);
        found.sort();
        assert_eq!(found, vec![1, 2], "each node exactly once");
    }

    #[test]
    fn test_diamond_visits_shared_ancestor_once() {
        // 1 is the shared ancestor of 2 and 3; 4 merges both
        let assets = vec![
            asset(1, vec![]),
            asset(2, vec![1]),
            asset(3, vec![1]),
            asset(4, vec![2, 3]),
        ];
        let result = ancestors_and_descendants(&assets, 4);
        let mut found = ids(&result);
        found.sort();
        assert_eq!(found, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dangling_inputs_are_ignored() {
        let assets = vec![asset(1, vec![99]), asset(2, vec![1])];
        let result = ancestors_and_descendants(&assets, 1);
        let mut found = ids(&result);
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn test_unknown_root_is_empty() {
        let assets = vec![asset(1, vec![])];
        assert!(ancestors_and_descendants(&assets, 42).is_empty());
    }
}
