// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{json, Value};
use streetgraph::osm::PermissionRules;
use streetgraph::{Graph, Street};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct RulesLoadError(PathBuf, #[source] Box<dyn Error>);

#[derive(Parser)]
#[command(about = "Builds a street graph from OpenStreetMap PBF files")]
struct Cli {
    /// Paths to the OSM PBF files
    #[arg(required = true)]
    osm_files: Vec<PathBuf>,

    /// Path to the permission rules, with a "selector PERMISSION" pair on every line.
    /// Built-in rules for common highway values are used by default.
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Print street edges as GeoJSON instead of a summary
    #[arg(long)]
    geojson: bool,

    /// Log debug messages
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    colog::default_builder().filter_level(level).init();

    let rules = match &cli.rules {
        Some(path) => load_rules(path)?,
        None => PermissionRules::default(),
    };

    let mut g = Graph::new();
    let options = streetgraph::osm::Options { rules: &rules };
    let stats = streetgraph::osm::add_features_from_files(&mut g, &options, &cli.osm_files)?;

    if cli.geojson {
        print_geojson(&g)?;
    } else {
        println!("vertices: {}", g.vertex_count());
        println!("streets:  {}", stats.streets);
        println!("turns:    {}", stats.turns);
    }

    Ok(())
}

fn load_rules(path: &Path) -> Result<PermissionRules, RulesLoadError> {
    std::fs::read_to_string(path)
        .map_err(Box::<dyn Error>::from)
        .and_then(|text| PermissionRules::parse(&text).map_err(Box::<dyn Error>::from))
        .map_err(|e| RulesLoadError(path.to_path_buf(), e))
}

fn print_geojson(g: &Graph) -> serde_json::Result<()> {
    let features: Vec<Value> = g.streets().map(|(_, s)| street_feature(s)).collect();
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    println!("{}", serde_json::to_string_pretty(&collection)?);
    Ok(())
}

fn street_feature(s: &Street) -> Value {
    let [from, to] = s.geometry;
    json!({
        "type": "Feature",
        "properties": {
            "name": &*s.name,
            "permission": s.permission.to_string(),
            "wheelchair": s.wheelchair_accessible,
        },
        "geometry": {
            "type": "LineString",
            "coordinates": [[from.lon, from.lat], [to.lon, to.lat]],
        },
    })
}
