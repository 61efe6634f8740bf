// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::graph::{Coordinate, Edge, EdgeId, Graph, Street, Turn, Vertex, VertexId, VertexLabel};
use crate::osm::rules::PermissionError;
use crate::Permission;

use super::collector::Network;
use super::model::{Node, Tags, Way};
use super::prune::PruneStats;
use super::Options;

/// Outcome of building a [Graph] from OSM data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// What was removed from the network before building.
    pub pruning: PruneStats,

    /// Ways which no travel mode may use.
    pub skipped_ways: usize,

    /// Way segments with a missing node, or with the same node at both ends.
    pub skipped_segments: usize,

    pub vertices_created: usize,
    pub vertices_merged: usize,
    pub streets: usize,
    pub turns: usize,
}

/// Exact position of a vertex, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CoordinateKey(u64, u64);

impl CoordinateKey {
    fn new(c: Coordinate) -> Self {
        // -0.0 and 0.0 compare equal, but have different bit patterns
        Self((c.lat + 0.0).to_bits(), (c.lon + 0.0).to_bits())
    }
}

/// Deduplicates strings shared by many [Streets](Street), like way names.
#[derive(Debug, Default)]
struct Interner(HashSet<Rc<str>>);

impl Interner {
    fn intern(&mut self, s: &str) -> Rc<str> {
        if let Some(existing) = self.0.get(s) {
            return existing.clone();
        }
        let new: Rc<str> = Rc::from(s);
        self.0.insert(new.clone());
        new
    }
}

/// Properties shared by all [Streets](Street) created for a single way.
struct WayAttributes {
    way: Rc<str>,
    name: Rc<str>,
    permission: Permission,
    wheelchair_accessible: bool,
}

impl WayAttributes {
    fn street(&self, from: VertexId, to: VertexId, geometry: [Coordinate; 2], length: f64) -> Edge {
        Edge::Street(Street {
            from,
            to,
            way: self.way.clone(),
            name: self.name.clone(),
            length,
            permission: self.permission,
            wheelchair_accessible: self.wheelchair_accessible,
            geometry,
        })
    }
}

/// Helper object used for storing state related to converting a pruned [Network]
/// into a [Graph].
///
/// Every way segment gets its own pair of vertices and a pair of opposite [Streets](Street).
/// Once all ways are added, vertices at the same position are connected by
/// [merging](Graph::merge_vertices) them (where a street simply continues)
/// or with [Turns](Turn) (at intersections).
pub(super) struct GraphBuilder<'a> {
    g: &'a mut Graph,
    options: &'a Options<'a>,
    strings: Interner,
    edges_by_origin: IndexMap<CoordinateKey, Vec<EdgeId>>,
    stats: BuildStats,
}

impl<'a> GraphBuilder<'a> {
    pub(super) fn new(g: &'a mut Graph, options: &'a Options<'a>) -> Self {
        Self {
            g,
            options,
            strings: Interner::default(),
            edges_by_origin: IndexMap::default(),
            stats: BuildStats::default(),
        }
    }

    /// Adds all ways of the network (in order) into the graph and connects them at junctions.
    pub(super) fn build(mut self, network: &Network) -> Result<BuildStats, PermissionError> {
        for w in network.ways.values() {
            self.add_way(w, &network.nodes)?;
        }
        self.add_junctions();

        let s = self.stats;
        log::info!(
            "built graph: {} vertices ({} merged), {} streets, {} turns; skipped {} ways and {} segments",
            s.vertices_created - s.vertices_merged,
            s.vertices_merged,
            s.streets,
            s.turns,
            s.skipped_ways,
            s.skipped_segments,
        );
        Ok(s)
    }

    fn add_way(&mut self, w: &Way, nodes: &IndexMap<i64, Node>) -> Result<(), PermissionError> {
        let permission = self.options.rules.resolve(&w.tags)?;
        if permission.is_none() {
            self.stats.skipped_ways += 1;
            return Ok(());
        }

        let attributes = self.way_attributes(w, permission);
        for (segment, pair) in w.nodes.windows(2).enumerate() {
            let (from_id, to_id) = (pair[0], pair[1]);

            let (Some(from), Some(to)) = (nodes.get(&from_id), nodes.get(&to_id)) else {
                log::debug!("way {} segment {segment}: reference to a missing node", w.id);
                self.stats.skipped_segments += 1;
                continue;
            };

            if from_id == to_id {
                log::debug!("way {} segment {segment}: node {from_id} repeated", w.id);
                self.stats.skipped_segments += 1;
                continue;
            }

            self.add_segment(&attributes, w.id, segment, from, to);
        }

        Ok(())
    }

    fn way_attributes(&mut self, w: &Way, permission: Permission) -> WayAttributes {
        let way = self.strings.intern(&format!("way {}", w.id));
        let name = match w.tags.get("name") {
            Some(name) => self.strings.intern(name),
            None => way.clone(),
        };

        WayAttributes {
            way,
            name,
            permission,
            wheelchair_accessible: is_wheelchair_accessible(&w.tags),
        }
    }

    /// Creates two new vertices and a pair of opposite streets between them.
    fn add_segment(
        &mut self,
        attributes: &WayAttributes,
        way_id: i64,
        segment: usize,
        from: &Node,
        to: &Node,
    ) {
        let from_coordinate = Coordinate::new(from.lat, from.lon);
        let to_coordinate = Coordinate::new(to.lat, to.lon);
        let length = from_coordinate.distance_to(&to_coordinate);

        let from_vertex = self.g.add_vertex(
            VertexLabel {
                node_id: from.id,
                segment,
                way_id,
            },
            from_coordinate,
        );
        let to_vertex = self.g.add_vertex(
            VertexLabel {
                node_id: to.id,
                segment,
                way_id,
            },
            to_coordinate,
        );
        self.stats.vertices_created += 2;

        let forward = self.g.add_edge(attributes.street(
            from_vertex,
            to_vertex,
            [from_coordinate, to_coordinate],
            length,
        ));
        let backward = self.g.add_edge(attributes.street(
            to_vertex,
            from_vertex,
            [to_coordinate, from_coordinate],
            length,
        ));
        self.stats.streets += 2;

        self.edges_by_origin
            .entry(CoordinateKey::new(from_coordinate))
            .or_default()
            .push(forward);
        self.edges_by_origin
            .entry(CoordinateKey::new(to_coordinate))
            .or_default()
            .push(backward);
    }

    /// Connects streets meeting at the same position, for every street in the order
    /// of the position index.
    fn add_junctions(&mut self) {
        let index = std::mem::take(&mut self.edges_by_origin);
        for incoming in index.values().flatten().copied() {
            self.add_junction(incoming, &index);
        }
    }

    /// Connects the end of the `incoming` street with the streets starting at the same position.
    ///
    /// If exactly 2 streets start there and one of them has the same name as `incoming`
    /// (but starts at a different vertex than `incoming` ends), the street simply continues:
    /// its start vertex is merged into the end of `incoming`. Otherwise, a [Turn] is added onto
    /// every street starting at that position from a different vertex.
    fn add_junction(&mut self, incoming: EdgeId, index: &IndexMap<CoordinateKey, Vec<EdgeId>>) {
        let Some(Edge::Street(street)) = self.g.get_edge(incoming) else {
            return;
        };
        let (end, name) = (street.to, street.name.clone());

        let Some(c) = self.g.get_vertex(end).map(Vertex::coordinate) else {
            return;
        };
        let Some(candidates) = index.get(&CoordinateKey::new(c)) else {
            return;
        };

        if candidates.len() == 2 {
            let continuation = candidates.iter().find_map(|&out| {
                let out = self.g.get_edge(out)?;
                let start = out.from_vertex();
                (start != end && out.name() == Some(&*name)).then_some(start)
            });

            if let Some(start) = continuation {
                let before = self.g.vertex_count();
                self.g.merge_vertices(end, start);
                self.stats.vertices_merged += before - self.g.vertex_count();
                return;
            }
        }

        for &outgoing in candidates {
            let Some(Edge::Street(out)) = self.g.get_edge(outgoing) else {
                continue;
            };
            let start = out.from;
            if start == end {
                continue;
            }

            let same_position = self
                .g
                .get_vertex(start)
                .is_some_and(|v| v.coordinate() == c);
            if same_position {
                self.g.add_edge(Edge::Turn(Turn {
                    from: end,
                    to: start,
                    from_street: incoming,
                    to_street: outgoing,
                }));
                self.stats.turns += 1;
            }
        }
    }
}

/// Steps are only accessible by wheelchairs if explicitly tagged so,
/// other ways unless explicitly tagged otherwise.
fn is_wheelchair_accessible(tags: &Tags) -> bool {
    let wheelchair = tags.get("wheelchair").map(String::as_str);
    let highway = tags.get("highway").map(String::as_str);
    !(wheelchair == Some("no") || (highway == Some("steps") && wheelchair != Some("yes")))
}
