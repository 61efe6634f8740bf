// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Street network graphs from [OpenStreetMap](https://www.openstreetmap.org/) data.
//!
//! It decodes [OSM PBF](https://wiki.openstreetmap.org/wiki/PBF_Format) files and converts
//! the ways into a directed [Graph] of [Streets](Street), with [Turns](Turn) describing
//! the possible movements at intersections. Which travel modes may use which streets is
//! described by [permission rules](crate::osm::PermissionRules).
//!
//! Before building the graph, nodes not used by any way and nodes outside
//! of the largest connected part of the network are dropped.
//!
//! # Example
//!
//! ```no_run
//! let mut g = streetgraph::Graph::new();
//! let rules = streetgraph::osm::PermissionRules::default();
//! let osm_options = streetgraph::osm::Options { rules: &rules };
//! let stats = streetgraph::osm::add_features_from_file(
//!     &mut g,
//!     &osm_options,
//!     "path/to/monaco.osm.pbf",
//! ).expect("failed to load monaco.osm.pbf");
//!
//! println!("{} vertices, {} streets, {} turns", g.vertex_count(), stats.streets, stats.turns);
//! ```

mod distance;
mod graph;
pub mod osm;
mod permission;

pub use distance::earth_distance;
pub use graph::{Coordinate, Edge, EdgeId, Graph, Street, Turn, Vertex, VertexId, VertexLabel};
pub use permission::{Permission, UnknownPermission};
