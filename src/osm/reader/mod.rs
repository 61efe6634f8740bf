// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io;
use std::path::Path;

use collector::Collector;
use graph_builder::GraphBuilder;

use crate::osm::rules::{PermissionError, PermissionRules};
use crate::Graph;

mod collector;
mod graph_builder;
mod model;
pub(super) mod pbf;
mod prune;

pub use graph_builder::BuildStats;
pub use model::{Feature, FeatureType, Node, Relation, RelationMember, Tags, Way};
pub use pbf::{features_from_io, Error as PbfError, RetainedKeys};
pub use prune::PruneStats;

/// Additional controls for interpreting OSM data as a street [Graph].
#[derive(Debug, Clone, Copy)]
pub struct Options<'a> {
    /// Which travel modes may use which ways.
    pub rules: &'a PermissionRules,
}

impl Options<'_> {
    /// Tag keys which need to survive decoding for the [rules](Options::rules) to work.
    pub fn retained_keys(&self) -> RetainedKeys {
        RetainedKeys::with_defaults(self.rules.keys())
    }
}

/// Error which can occur when building a [Graph] from OSM data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pbf: {0}")]
    Pbf(#[from] PbfError),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("permission: {0}")]
    Permission(#[from] PermissionError),
}

/// Parse an [OSM PBF](https://wiki.openstreetmap.org/wiki/PBF_Format) stream
/// into a [Graph] as per the provided [Options].
///
/// The provided stream will be automatically wrapped in a buffered reader.
pub fn add_features_from_io<R: io::Read>(
    g: &mut Graph,
    options: &Options,
    reader: R,
) -> Result<BuildStats, Error> {
    let mut c = Collector::new();
    collect_from_io(&mut c, options, reader)?;
    build(g, options, c)
}

/// Parse an OSM PBF file at the provided path into a [Graph] as per the provided [Options].
pub fn add_features_from_file<P: AsRef<Path>>(
    g: &mut Graph,
    options: &Options,
    path: P,
) -> Result<BuildStats, Error> {
    add_features_from_files(g, options, [path])
}

/// Parse several OSM PBF files into a single [Graph] as per the provided [Options].
///
/// Features from all files are combined before building the graph,
/// so ways may reference nodes from a different file. If a feature with the same id
/// appears in several files, the first one wins.
pub fn add_features_from_files<I, P>(
    g: &mut Graph,
    options: &Options,
    paths: I,
) -> Result<BuildStats, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut c = Collector::new();
    for path in paths {
        log::info!("reading {}", path.as_ref().display());
        let f = File::open(path)?;
        collect_from_io(&mut c, options, f)?;
    }
    build(g, options, c)
}

/// Parse OSM PBF data from a static buffer into a [Graph] as per the provided [Options].
pub fn add_features_from_buffer(
    g: &mut Graph,
    options: &Options,
    data: &[u8],
) -> Result<BuildStats, Error> {
    let mut c = Collector::new();
    c.add_features(features_from_io(data, options.retained_keys()))?;
    build(g, options, c)
}

fn collect_from_io<R: io::Read>(
    c: &mut Collector,
    options: &Options,
    reader: R,
) -> Result<(), Error> {
    let b = io::BufReader::new(reader);
    c.add_features(features_from_io(b, options.retained_keys()))?;
    Ok(())
}

fn build(g: &mut Graph, options: &Options, c: Collector) -> Result<BuildStats, Error> {
    let mut network = c.finish();
    let pruning = prune::prune(&mut network);
    let stats = GraphBuilder::new(g, options).build(&network)?;
    Ok(BuildStats { pruning, ..stats })
}
