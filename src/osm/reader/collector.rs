// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use indexmap::map::Entry;
use indexmap::IndexMap;

use super::model::{Feature, Node, Relation, Way};

/// Progress is logged every time this many nodes have been seen.
const NODE_PROGRESS_INTERVAL: u64 = 5_000_000;

/// Progress is logged every time this many ways have been seen.
const WAY_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Decoded features retained for graph building, in the order they were first seen.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Network {
    pub nodes: IndexMap<i64, Node>,
    pub ways: IndexMap<i64, Way>,
    pub relations: IndexMap<i64, Relation>,
}

/// Accumulates [features](Feature) from one or more sources into a [Network].
///
/// Only [routable](Way::is_routable) ways are kept. All nodes are kept, it's up to
/// [prune](super::prune::prune) to drop the unnecessary ones. Relations are stored,
/// but are not used when building the graph.
///
/// If a feature with the same id is seen more than once, the first one wins.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    network: Network,
    nodes_seen: u64,
    ways_seen: u64,
}

impl Collector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add all features from the provided iterator, stopping on the first error.
    pub(crate) fn add_features<I, E>(&mut self, features: I) -> Result<(), E>
    where
        I: IntoIterator<Item = Result<Feature, E>>,
    {
        for f in features {
            self.add_feature(f?);
        }
        Ok(())
    }

    pub(crate) fn add_feature(&mut self, f: Feature) {
        match f {
            Feature::Node(n) => self.add_node(n),
            Feature::Way(w) => self.add_way(w),
            Feature::Relation(r) => self.add_relation(r),
        }
    }

    fn add_node(&mut self, n: Node) {
        if self.nodes_seen % NODE_PROGRESS_INTERVAL == 0 {
            log::debug!("node {}", human(self.nodes_seen));
        }
        self.nodes_seen += 1;

        if let Entry::Vacant(e) = self.network.nodes.entry(n.id) {
            e.insert(n);
        }
    }

    fn add_way(&mut self, w: Way) {
        if self.ways_seen % WAY_PROGRESS_INTERVAL == 0 {
            log::debug!("way {}", human(self.ways_seen));
        }
        self.ways_seen += 1;

        if !w.is_routable() {
            return;
        }

        if let Entry::Vacant(e) = self.network.ways.entry(w.id) {
            e.insert(w);
        }
    }

    fn add_relation(&mut self, r: Relation) {
        if let Entry::Vacant(e) = self.network.relations.entry(r.id) {
            e.insert(r);
        }
    }

    pub(crate) fn finish(self) -> Network {
        log::info!(
            "collected {} nodes ({} seen), {} ways ({} seen), {} relations",
            human(self.network.nodes.len() as u64),
            human(self.nodes_seen),
            human(self.network.ways.len() as u64),
            human(self.ways_seen),
            human(self.network.relations.len() as u64),
        );
        self.network
    }
}

/// Formats a count for humans, e.g. `1.2M`, `35k` or `999`.
fn human(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{}k", n / 1_000)
    } else {
        n.to_string()
    }
}
