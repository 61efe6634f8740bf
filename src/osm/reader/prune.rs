// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet, VecDeque};

use super::collector::Network;

/// Outcome of [prune].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    /// Nodes not referenced by any way with at least 2 nodes.
    pub isolated_nodes: usize,

    /// Number of connected components found among the remaining nodes.
    pub components: usize,

    /// Nodes outside of the largest component.
    pub island_nodes: usize,
}

/// Removes nodes which can't be part of the street network: nodes not used by
/// any way with 2 or more nodes, and then all nodes outside of the largest connected component.
///
/// Two nodes are connected if they appear anywhere in the same way,
/// not only if they are consecutive in that way.
pub(crate) fn prune(network: &mut Network) -> PruneStats {
    let isolated_nodes = retain_way_nodes(network);
    let (components, island_nodes) = retain_largest_component(network);

    let stats = PruneStats {
        isolated_nodes,
        components,
        island_nodes,
    };
    log::info!(
        "pruned {} isolated nodes and {} nodes from {} smaller components, {} nodes left",
        stats.isolated_nodes,
        stats.island_nodes,
        stats.components.saturating_sub(1),
        network.nodes.len(),
    );
    stats
}

/// Keeps only nodes referenced by ways with at least 2 nodes.
/// Returns the number of removed nodes.
fn retain_way_nodes(network: &mut Network) -> usize {
    let used: HashSet<i64> = network
        .ways
        .values()
        .filter(|w| w.nodes.len() > 1)
        .flat_map(|w| w.nodes.iter().copied())
        .collect();

    let before = network.nodes.len();
    network.nodes.retain(|id, _| used.contains(id));
    before - network.nodes.len()
}

/// Keeps only the nodes of the largest connected component. Component size counts
/// every id referenced by its ways, even ids missing from the data. On ties, the component
/// discovered first (by node order) wins. Returns the number of found components and
/// the number of removed nodes.
fn retain_largest_component(network: &mut Network) -> (usize, usize) {
    let ways: Vec<&[i64]> = network.ways.values().map(|w| w.nodes.as_slice()).collect();

    // Instead of linking every node with every other node of a way,
    // link nodes with ways. Nodes sharing a way are still neighbors.
    let mut ways_by_node: HashMap<i64, Vec<usize>> = HashMap::default();
    for (way_idx, nodes) in ways.iter().enumerate() {
        for &node_id in nodes.iter() {
            let node_ways = ways_by_node.entry(node_id).or_default();
            if node_ways.last() != Some(&way_idx) {
                node_ways.push(way_idx);
            }
        }
    }

    let mut visited_nodes: HashSet<i64> = HashSet::default();
    let mut visited_ways: HashSet<usize> = HashSet::default();
    let mut components = 0;
    let mut largest: Option<(usize, HashSet<i64>)> = None;

    for &start in network.nodes.keys() {
        if visited_nodes.contains(&start) {
            continue;
        }

        let component = explore_component(
            start,
            &ways,
            &ways_by_node,
            &mut visited_nodes,
            &mut visited_ways,
        );
        components += 1;

        let size = component.len();
        if largest.as_ref().map_or(true, |(largest_size, _)| size > *largest_size) {
            largest = Some((size, component));
        }
    }

    let keep = largest.map(|(_, c)| c).unwrap_or_default();
    let before = network.nodes.len();
    network.nodes.retain(|id, _| keep.contains(id));
    (components, before - network.nodes.len())
}

/// Breadth-first search over all node ids reachable from `start` through shared ways.
fn explore_component(
    start: i64,
    ways: &[&[i64]],
    ways_by_node: &HashMap<i64, Vec<usize>>,
    visited_nodes: &mut HashSet<i64>,
    visited_ways: &mut HashSet<usize>,
) -> HashSet<i64> {
    let mut component = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    visited_nodes.insert(start);

    while let Some(node_id) = queue.pop_front() {
        let Some(node_ways) = ways_by_node.get(&node_id) else {
            continue;
        };

        for &way_idx in node_ways {
            if !visited_ways.insert(way_idx) {
                continue;
            }

            for &neighbor in ways[way_idx] {
                if visited_nodes.insert(neighbor) {
                    component.insert(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
    }

    component
}
