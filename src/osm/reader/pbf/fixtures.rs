// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! In-memory OSM PBF writer for tests.

use std::io::Write;

use protobuf::{EnumOrUnknown, Message, MessageField};

use super::proto::{fileformat, osmformat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compression {
    Raw,
    Zlib,
    Bzip2,
}

/// Builds a [osmformat::PrimitiveBlock], one [osmformat::PrimitiveGroup] per call.
pub(crate) struct BlockBuilder {
    block: osmformat::PrimitiveBlock,
    strings: Vec<String>,
}

impl BlockBuilder {
    pub(crate) fn new() -> Self {
        Self {
            block: osmformat::PrimitiveBlock::new(),
            strings: vec![String::new()], // id 0 is reserved as a delimiter
        }
    }

    pub(crate) fn granularity(mut self, granularity: i32, lat_offset: i64, lon_offset: i64) -> Self {
        self.block.set_granularity(granularity);
        self.block.set_lat_offset(lat_offset);
        self.block.set_lon_offset(lon_offset);
        self
    }

    /// Returns the id of a string in the block's string table, adding it if necessary.
    pub(crate) fn string(&mut self, s: &str) -> u32 {
        match self.strings.iter().position(|existing| existing == s) {
            Some(idx) => idx as u32,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u32
            }
        }
    }

    fn raw_lat(&self, lat: f64) -> i64 {
        ((lat * 1e9 - self.block.lat_offset() as f64) / self.block.granularity() as f64).round()
            as i64
    }

    fn raw_lon(&self, lon: f64) -> i64 {
        ((lon * 1e9 - self.block.lon_offset() as f64) / self.block.granularity() as f64).round()
            as i64
    }

    fn tag_ids(&mut self, tags: &[(&str, &str)]) -> (Vec<u32>, Vec<u32>) {
        tags.iter()
            .map(|&(k, v)| (self.string(k), self.string(v)))
            .unzip()
    }

    pub(crate) fn dense_nodes(mut self, nodes: &[(i64, f64, f64, &[(&str, &str)])]) -> Self {
        let mut dense = osmformat::DenseNodes::new();
        let (mut last_id, mut last_lat, mut last_lon) = (0, 0, 0);

        for &(id, lat, lon, tags) in nodes {
            let (lat, lon) = (self.raw_lat(lat), self.raw_lon(lon));
            dense.id.push(id - last_id);
            dense.lat.push(lat - last_lat);
            dense.lon.push(lon - last_lon);
            (last_id, last_lat, last_lon) = (id, lat, lon);

            let (keys, vals) = self.tag_ids(tags);
            for (k, v) in keys.into_iter().zip(vals) {
                dense.keys_vals.push(k as i32);
                dense.keys_vals.push(v as i32);
            }
            dense.keys_vals.push(0);
        }

        let mut group = osmformat::PrimitiveGroup::new();
        group.dense = MessageField::some(dense);
        self.block.primitivegroup.push(group);
        self
    }

    pub(crate) fn node(mut self, id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> Self {
        let mut node = osmformat::Node::new();
        node.set_id(id);
        node.set_lat(self.raw_lat(lat));
        node.set_lon(self.raw_lon(lon));
        (node.keys, node.vals) = self.tag_ids(tags);

        let mut group = osmformat::PrimitiveGroup::new();
        group.nodes.push(node);
        self.block.primitivegroup.push(group);
        self
    }

    pub(crate) fn way(mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Self {
        let mut way = osmformat::Way::new();
        way.set_id(id);
        way.refs = deltas(refs);
        (way.keys, way.vals) = self.tag_ids(tags);

        let mut group = osmformat::PrimitiveGroup::new();
        group.ways.push(way);
        self.block.primitivegroup.push(group);
        self
    }

    /// Adds a relation with (member id, raw member type, role) members.
    pub(crate) fn relation(
        mut self,
        id: i64,
        members: &[(i64, i32, &str)],
        tags: &[(&str, &str)],
    ) -> Self {
        let mut relation = osmformat::Relation::new();
        relation.set_id(id);
        relation.memids = deltas(&members.iter().map(|m| m.0).collect::<Vec<_>>());
        relation.types = members
            .iter()
            .map(|m| EnumOrUnknown::from_i32(m.1))
            .collect();
        relation.roles_sid = members.iter().map(|m| self.string(m.2) as i32).collect();
        (relation.keys, relation.vals) = self.tag_ids(tags);

        let mut group = osmformat::PrimitiveGroup::new();
        group.relations.push(relation);
        self.block.primitivegroup.push(group);
        self
    }

    pub(crate) fn build(mut self) -> osmformat::PrimitiveBlock {
        let mut table = osmformat::StringTable::new();
        table.s = self.strings.into_iter().map(String::into_bytes).collect();
        self.block.stringtable = MessageField::some(table);
        self.block
    }
}

fn deltas(values: &[i64]) -> Vec<i64> {
    let mut last = 0;
    values
        .iter()
        .map(|&v| {
            let delta = v - last;
            last = v;
            delta
        })
        .collect()
}

/// Encodes a complete OSM PBF file: an OSMHeader followed by an OSMData blob per block.
pub(crate) fn encode_file(
    required_features: &[&str],
    blocks: Vec<osmformat::PrimitiveBlock>,
    compression: Compression,
) -> Vec<u8> {
    let mut header = osmformat::HeaderBlock::new();
    header.required_features = required_features.iter().map(|f| f.to_string()).collect();
    header.set_writingprogram("streetgraph-tests".to_string());

    let mut out = Vec::new();
    write_blob(&mut out, "OSMHeader", header.write_to_bytes().unwrap(), compression);
    for block in blocks {
        write_blob(&mut out, "OSMData", block.write_to_bytes().unwrap(), compression);
    }
    out
}

fn write_blob(out: &mut Vec<u8>, type_: &str, payload: Vec<u8>, compression: Compression) {
    let mut blob = fileformat::Blob::new();
    blob.set_raw_size(payload.len() as i32);
    blob.data = Some(match compression {
        Compression::Raw => fileformat::blob::Data::Raw(payload),
        Compression::Zlib => {
            let mut e = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            e.write_all(&payload).unwrap();
            fileformat::blob::Data::ZlibData(e.finish().unwrap())
        }
        Compression::Bzip2 => {
            let mut e = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            e.write_all(&payload).unwrap();
            fileformat::blob::Data::OBSOLETEBzip2Data(e.finish().unwrap())
        }
    });
    let blob = blob.write_to_bytes().unwrap();

    let mut blob_header = fileformat::BlobHeader::new();
    blob_header.set_type(type_.to_string());
    blob_header.set_datasize(blob.len() as i32);
    let blob_header = blob_header.write_to_bytes().unwrap();

    out.extend_from_slice(&(blob_header.len() as u32).to_be_bytes());
    out.extend_from_slice(&blob_header);
    out.extend_from_slice(&blob);
}
