// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::{earth_distance, Permission};

/// A WGS84 position, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Crow-flies distance to another coordinate, in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        earth_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Synthetic identifier of a [Vertex]: the OSM node it was created for,
/// the index of the way segment and the OSM way.
///
/// Labels are only used for bookkeeping. Vertices are never looked up
/// by label when building the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLabel {
    pub node_id: i64,
    pub segment: usize,
    pub way_id: i64,
}

impl fmt::Display for VertexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "osm node {}_{}_{}", self.node_id, self.segment, self.way_id)
    }
}

/// Handle to a [Vertex] in a [Graph].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

/// Handle to an [Edge] in a [Graph].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// An intersection (or any other point) of the street network.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    label: VertexLabel,
    merged_labels: Vec<VertexLabel>,
    coordinate: Coordinate,
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

impl Vertex {
    pub fn label(&self) -> VertexLabel {
        self.label
    }

    /// Labels of all vertices which were [merged](Graph::merge_vertices) into this one.
    pub fn merged_labels(&self) -> &[VertexLabel] {
        &self.merged_labels
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Crow-flies distance to another vertex, in meters.
    pub fn distance_to(&self, other: &Vertex) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    fn all_labels(&self) -> impl Iterator<Item = &VertexLabel> {
        std::iter::once(&self.label).chain(self.merged_labels.iter())
    }
}

/// A directed stretch of an OSM way between two consecutive nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Street {
    pub from: VertexId,
    pub to: VertexId,

    /// Identifier of the source way, e.g. `way 42`.
    pub way: Rc<str>,

    /// Value of the `name` tag, or [Street::way] for unnamed ways.
    pub name: Rc<str>,

    /// Length in meters.
    pub length: f64,

    pub permission: Permission,
    pub wheelchair_accessible: bool,

    /// Straight line from the `from` to the `to` vertex.
    pub geometry: [Coordinate; 2],
}

/// A legal movement from one [Street] onto another at a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub from: VertexId,
    pub to: VertexId,
    pub from_street: EdgeId,
    pub to_street: EdgeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Street(Street),
    Turn(Turn),
}

impl Edge {
    pub fn from_vertex(&self) -> VertexId {
        match self {
            Self::Street(s) => s.from,
            Self::Turn(t) => t.from,
        }
    }

    pub fn to_vertex(&self) -> VertexId {
        match self {
            Self::Street(s) => s.to,
            Self::Turn(t) => t.to,
        }
    }

    /// Name of the street; turns have no names.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Street(s) => Some(&s.name),
            Self::Turn(_) => None,
        }
    }

    pub fn is_street(&self) -> bool {
        matches!(self, Self::Street(_))
    }

    pub fn as_street(&self) -> Option<&Street> {
        match self {
            Self::Street(s) => Some(s),
            Self::Turn(_) => None,
        }
    }

    pub fn as_turn(&self) -> Option<&Turn> {
        match self {
            Self::Street(_) => None,
            Self::Turn(t) => Some(t),
        }
    }

    fn endpoints_mut(&mut self) -> (&mut VertexId, &mut VertexId) {
        match self {
            Self::Street(s) => (&mut s.from, &mut s.to),
            Self::Turn(t) => (&mut t.from, &mut t.to),
        }
    }
}

/// Represents a street network as a set of [Vertices](Vertex)
/// and directed [Edges](Edge) between them.
///
/// Vertices are never deduplicated - two vertices may share a [Coordinate]
/// until they are explicitly [merged](Graph::merge_vertices).
#[derive(Debug, Default, Clone)]
pub struct Graph {
    vertices: Vec<Option<Vertex>>,
    edges: Vec<Edge>,
    labels: HashMap<VertexLabel, VertexId>,
    vertex_count: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of vertices in the graph.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Returns the number of edges (streets and turns) in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Creates a new [Vertex], even if another one with the same label or coordinate exists.
    pub fn add_vertex(&mut self, label: VertexLabel, coordinate: Coordinate) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Some(Vertex {
            label,
            merged_labels: Vec::default(),
            coordinate,
            outgoing: Vec::default(),
            incoming: Vec::default(),
        }));
        self.labels.insert(label, id);
        self.vertex_count += 1;
        id
    }

    pub fn get_vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0).and_then(|v| v.as_ref())
    }

    /// Finds the vertex created with the provided label, following merges.
    pub fn find_vertex(&self, label: &VertexLabel) -> Option<VertexId> {
        self.labels.get(label).copied()
    }

    /// Returns an iterator over all live [Vertices](Vertex) in the graph.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(idx, v)| v.as_ref().map(|v| (VertexId(idx), v)))
    }

    /// Deletes a [Vertex] with the given id.
    ///
    /// Edges are not touched - any edge still referring to the removed vertex
    /// must be redirected by the caller (see [Graph::merge_vertices]).
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<Vertex> {
        let removed = self.vertices.get_mut(id.0).and_then(Option::take)?;
        for label in removed.all_labels() {
            if self.labels.get(label) == Some(&id) {
                self.labels.remove(label);
            }
        }
        self.vertex_count -= 1;
        Some(removed)
    }

    /// Adds a new [Edge], registering it with both of its vertices.
    pub fn add_edge(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId(self.edges.len());
        let (from, to) = (edge.from_vertex(), edge.to_vertex());
        assert!(self.get_vertex(from).is_some(), "edge from a missing vertex");
        assert!(self.get_vertex(to).is_some(), "edge to a missing vertex");

        self.edges.push(edge);
        self.vertex_mut(from).outgoing.push(id);
        self.vertex_mut(to).incoming.push(id);
        id
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    /// Returns an iterator over all [Edges](Edge) in the graph, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().map(|(idx, e)| (EdgeId(idx), e))
    }

    /// Returns an iterator over all [Streets](Street) in the graph.
    pub fn streets(&self) -> impl Iterator<Item = (EdgeId, &Street)> {
        self.edges().filter_map(|(id, e)| e.as_street().map(|s| (id, s)))
    }

    /// Returns an iterator over all [Turns](Turn) in the graph.
    pub fn turns(&self) -> impl Iterator<Item = (EdgeId, &Turn)> {
        self.edges().filter_map(|(id, e)| e.as_turn().map(|t| (id, t)))
    }

    /// Moves all edges of `from` onto `into` and removes `from`.
    ///
    /// The label of `from`, and the labels of all vertices previously merged into `from`,
    /// keep resolving (through [Graph::find_vertex]) to `into`.
    /// Does nothing if both ids are the same or any of the vertices doesn't exist.
    pub fn merge_vertices(&mut self, into: VertexId, from: VertexId) {
        if into == from || self.get_vertex(into).is_none() {
            return;
        }
        let Some(removed) = self.remove_vertex(from) else {
            return;
        };

        for &edge_id in &removed.outgoing {
            let (edge_from, _) = self.edges[edge_id.0].endpoints_mut();
            *edge_from = into;
        }
        for &edge_id in &removed.incoming {
            let (_, edge_to) = self.edges[edge_id.0].endpoints_mut();
            *edge_to = into;
        }

        for &label in removed.all_labels() {
            self.labels.insert(label, into);
        }

        let target = self.vertex_mut(into);
        target.outgoing.extend_from_slice(&removed.outgoing);
        target.incoming.extend_from_slice(&removed.incoming);
        target.merged_labels.push(removed.label);
        target.merged_labels.extend(removed.merged_labels);
    }

    fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        self.vertices[id.0]
            .as_mut()
            .expect("vertex_mut can only be called with live vertices")
    }
}
