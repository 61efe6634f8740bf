// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Streaming decoder of [OSM PBF](https://wiki.openstreetmap.org/wiki/PBF_Format) files.

#[cfg(test)]
pub(crate) mod fixtures;

mod proto {
    include!(concat!(env!("OUT_DIR"), "/osmpbf/mod.rs"));
}

use super::model::{Feature, FeatureType, Node, Relation, RelationMember, Tags, Way};
use proto::{fileformat, osmformat};

use protobuf::Message;
use std::collections::HashSet;
use std::io;
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;

/// Max permitted size for a serialized [blob header](https://wiki.openstreetmap.org/wiki/PBF_Format#File_format) -
/// 64 KiB.
const MAX_BLOB_HEADER_SIZE: u32 = 64 * 1024;

/// Max permitted size for a serialized & decompressed [blob](https://wiki.openstreetmap.org/wiki/PBF_Format#File_format) -
/// 32 MiB.
const MAX_BLOB_SIZE: u32 = 32 * 1024 * 1024;

/// Required features which this decoder understands.
const SUPPORTED_FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

/// All strings used by an [OSM PBF Block](https://wiki.openstreetmap.org/wiki/PBF_Format#Definition_of_OSMData_fileblock),
/// reference-counted as this table is referred to by multiple coexisting iterators and
/// closures without any concrete ownership.
type StringTable = Rc<Vec<String>>;

/// Error which can occur when reading a PBF file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("protobuf: {0}")]
    Protobuf(#[from] Arc<protobuf::Error>),

    #[error("io: {0}")]
    Io(#[from] Arc<io::Error>),

    #[error("BlobHeader too large: {0} > {MAX_BLOB_HEADER_SIZE}")]
    BlobHeaderTooLarge(u32),

    #[error("Blob too large: {0} > {MAX_BLOB_SIZE}")]
    BlobTooLarge(u32),

    #[error("BlobHeader.type: got {got:?}, expected {expected:?}")]
    UnexpectedBlobHeaderType { got: String, expected: &'static str },

    #[error("BlobHeader.datasize is negative")]
    NegativeBlobHeaderSize,

    #[error("Blob has no data")]
    MissingBlobData,

    #[error("unsupported compression: {0} (supported: raw, zlib and bzip2)")]
    UnsupportedCompression(&'static str),

    #[error("file requires unsupported features: {0:?}")]
    UnsupportedFeatures(Vec<String>),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<protobuf::Error> for Error {
    fn from(e: protobuf::Error) -> Self {
        Error::Protobuf(Arc::new(e))
    }
}

/// Set of tag keys which survive decoding. Tags with any other key are dropped
/// as soon as they are read.
#[derive(Debug, Clone)]
pub struct RetainedKeys(Rc<HashSet<String>>);

impl RetainedKeys {
    /// Keys needed to interpret ways and nodes as streets.
    pub const DEFAULT: [&'static str; 9] = [
        "highway",
        "railway",
        "name",
        "parking",
        "access",
        "motorcar",
        "bicycle",
        "foot",
        "wheelchair",
    ];

    /// Retains exactly the provided keys.
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self(Rc::new(keys.into_iter().map(Into::into).collect()))
    }

    /// Retains the [RetainedKeys::DEFAULT] keys and the provided ones.
    pub fn with_defaults<I: IntoIterator<Item = S>, S: Into<String>>(extra: I) -> Self {
        Self::new(
            Self::DEFAULT
                .iter()
                .map(|&k| k.to_string())
                .chain(extra.into_iter().map(Into::into)),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl Default for RetainedKeys {
    fn default() -> Self {
        Self::with_defaults::<_, String>([])
    }
}

/// Returns an iterator over all features from an OSM PBF file.
///
/// The iterator stops after the first error.
pub fn features_from_io<R: io::Read>(
    reader: R,
    retained: RetainedKeys,
) -> impl Iterator<Item = Result<Feature, Error>> {
    File(reader).features(retained)
}

/// File abstracts away a whole OSM PBF file, a file encoding multiple [blocks](osmformat::PrimitiveBlock).
/// [fileformat::Blob] pairs, into a friendly interface.
struct File<R: io::Read>(R);

impl<R: io::Read> File<R> {
    /// Returns an iterator over all [Blocks](Block) in this file.
    fn blocks(self) -> impl Iterator<Item = Result<Block, Error>> {
        FileBlocks {
            reader: self.0,
            header_checked: false,
            done: false,
        }
    }

    /// Returns a flattened iterator over all [Features](Feature) from all
    /// [Groups](Group) from all [Blocks](Block) in this file.
    fn features(self, retained: RetainedKeys) -> impl Iterator<Item = Result<Feature, Error>> {
        self.blocks()
            .flat_map(move |b| block_result_features(b, retained.clone()))
    }
}

/// Iterator over [Blocks](Block) in a [File].
struct FileBlocks<R: io::Read> {
    reader: R,
    header_checked: bool,
    done: bool,
}

impl<R: io::Read> Iterator for FileBlocks<R> {
    type Item = Result<Block, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = if self.header_checked {
            self.read_data().transpose()
        } else {
            match self.read_and_check_header() {
                Ok(true) => {
                    self.header_checked = true;
                    self.read_data().transpose()
                }
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        };

        self.done = match &result {
            None | Some(Err(_)) => true,
            Some(Ok(_)) => false,
        };

        result
    }
}

impl<R: io::Read> FileBlocks<R> {
    /// Reads the first size + [fileformat::BlobHeader] + [fileformat::Blob] sequence,
    /// expecting an `OSMHeader` block containing an [osmformat::HeaderBlock].
    ///
    /// Returns `Ok(true)` if a header block was successfully read and validated,
    /// `Ok(false)` on EOF, or an [Error] if anything bad has happened.
    fn read_and_check_header(&mut self) -> Result<bool, Error> {
        // 1. Read the BlobHeader size
        let blob_header_size = match self.read_blob_header_size()? {
            Some(size) => size,
            None => return Ok(false), // empty file
        };

        // 2. Read the BlobHeader
        let blob_header = self.read_blob_header(blob_header_size)?;

        // 2.1. Verify the BlobHeader.type
        if blob_header.type_() != "OSMHeader" {
            return Err(Error::UnexpectedBlobHeaderType {
                got: blob_header.type_.unwrap_or_default(),
                expected: "OSMHeader",
            });
        }

        // 3. Read the OSMHeader blob
        let blob = self.read_blob(blob_header.datasize())?;
        let header = osmformat::HeaderBlock::parse_from_bytes(&blob)?;

        // 3.1. Check required features
        let unknown_features: Vec<String> = header
            .required_features
            .iter()
            .filter(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
            .cloned()
            .collect();
        if !unknown_features.is_empty() {
            return Err(Error::UnsupportedFeatures(unknown_features));
        }

        log::debug!(
            "OSMHeader ok, writing program: {:?}",
            header.writingprogram.as_deref().unwrap_or("unknown")
        );
        Ok(true)
    }

    /// Reads the next size + [fileformat::BlobHeader] + [fileformat::Blob] sequence,
    /// expecting an `OSMData` block containing an [Block] ([osmformat::PrimitiveBlock]).
    ///
    /// Returns `Ok(None)` on EOF.
    fn read_data(&mut self) -> Result<Option<Block>, Error> {
        // 1. Read the BlobHeader size
        let blob_header_size = match self.read_blob_header_size()? {
            Some(size) => size,
            None => return Ok(None), // no more blobs
        };

        // 2. Read the BlobHeader
        let blob_header = self.read_blob_header(blob_header_size)?;

        // 2.1. Verify the BlobHeader.type
        if blob_header.type_() != "OSMData" {
            return Err(Error::UnexpectedBlobHeaderType {
                got: blob_header.type_.unwrap_or_default(),
                expected: "OSMData",
            });
        }

        // 3. Read the PrimitiveBlock blob
        let blob = self.read_blob(blob_header.datasize())?;
        let block = osmformat::PrimitiveBlock::parse_from_bytes(&blob)?;
        Ok(Some(Block(block)))
    }

    /// Reads the next 4 bytes to read the size of the subsequent [fileformat::BlobHeader].
    ///
    /// Returns `Ok(Some(_))` on success, `Ok(None)` on EOF, or an [Error].
    fn read_blob_header_size(&mut self) -> Result<Option<u32>, Error> {
        let mut buf = [0u8; 4];
        match self.reader.read_exact(&mut buf) {
            Ok(_) => Ok(Some(u32::from_be_bytes(buf))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the next [fileformat::BlobHeader] of a given size.
    fn read_blob_header(&mut self, size: u32) -> Result<fileformat::BlobHeader, Error> {
        if size > MAX_BLOB_HEADER_SIZE {
            return Err(Error::BlobHeaderTooLarge(size));
        }
        let mut buf = vec![0u8; size as usize];
        self.reader.read_exact(&mut buf)?;
        let header = fileformat::BlobHeader::parse_from_bytes(&buf)?;
        Ok(header)
    }

    /// Reads the next [fileformat::Blob] and returns the decompressed contents of it.
    fn read_blob(&mut self, size: i32) -> Result<Vec<u8>, Error> {
        if size < 0 {
            return Err(Error::NegativeBlobHeaderSize);
        }
        if size as u32 > MAX_BLOB_SIZE {
            return Err(Error::BlobTooLarge(size as u32));
        }

        let mut buf = vec![0u8; size as usize];
        self.reader.read_exact(&mut buf)?;

        let blob = fileformat::Blob::parse_from_bytes(&buf)?;

        let blob_size = blob.raw_size().max(0) as u32;
        if blob_size > MAX_BLOB_SIZE {
            return Err(Error::BlobTooLarge(blob_size));
        }

        // Decompression is capped at MAX_BLOB_SIZE + 1 bytes, so that lying
        // about raw_size can't be used to exhaust memory.
        let limit = MAX_BLOB_SIZE as u64 + 1;
        let decompressed = match blob.data.ok_or(Error::MissingBlobData)? {
            fileformat::blob::Data::Raw(data) => data,

            fileformat::blob::Data::ZlibData(data) => {
                let mut d = flate2::read::ZlibDecoder::new(&data[..]).take(limit);
                let mut decompressed = Vec::with_capacity(blob_size as usize);
                d.read_to_end(&mut decompressed)?;
                decompressed
            }

            fileformat::blob::Data::LzmaData(_) => {
                return Err(Error::UnsupportedCompression("lzma"))
            }

            fileformat::blob::Data::OBSOLETEBzip2Data(data) => {
                let mut d = bzip2::read::BzDecoder::new(&data[..]).take(limit);
                let mut decompressed = Vec::with_capacity(blob_size as usize);
                d.read_to_end(&mut decompressed)?;
                decompressed
            }

            fileformat::blob::Data::Lz4Data(_) => return Err(Error::UnsupportedCompression("lz4")),

            fileformat::blob::Data::ZstdData(_) => {
                return Err(Error::UnsupportedCompression("zstd"))
            }
        };

        if decompressed.len() as u64 > MAX_BLOB_SIZE as u64 {
            return Err(Error::BlobTooLarge(decompressed.len() as u32));
        }
        Ok(decompressed)
    }
}

/// Wrapper for a union of any [Feature] iterator with `std::iter::once<Error>`.
enum BlockResultFeatureIterator<I: Iterator<Item = Feature>> {
    Iterating(I),
    Done(Option<Error>),
}

impl<I: Iterator<Item = Feature>> Iterator for BlockResultFeatureIterator<I> {
    type Item = Result<Feature, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Iterating(i) => match i.next() {
                Some(f) => Some(Ok(f)),
                None => {
                    *self = Self::Done(None);
                    None
                }
            },

            Self::Done(e) => e.take().map(Err),
        }
    }
}

fn block_result_features(
    block_result: Result<Block, Error>,
    retained: RetainedKeys,
) -> BlockResultFeatureIterator<impl Iterator<Item = Feature>> {
    match block_result {
        Ok(block) => BlockResultFeatureIterator::Iterating(block.features(retained)),
        Err(e) => BlockResultFeatureIterator::Done(Some(e)),
    }
}

/// Block abstracts away an [osmformat::PrimitiveBlock] into a friendly interface.
struct Block(osmformat::PrimitiveBlock);

impl Block {
    /// Returns an iterator over all [Groups](Group) in this block.
    fn groups(self, retained: RetainedKeys) -> impl Iterator<Item = Group> {
        let coordinate_converter = self.build_coordinate_converter();
        let string_table = Rc::new(self.build_string_table());
        self.0.primitivegroup.into_iter().map(move |g| Group {
            primitive_group: g,
            coordinate_converter,
            string_table: string_table.clone(),
            retained: retained.clone(),
        })
    }

    /// Returns a flattened iterator over all [Features](Feature) from all [Groups](Group) in this block.
    fn features(self, retained: RetainedKeys) -> impl Iterator<Item = Feature> {
        self.groups(retained).flat_map(|g| g.features())
    }

    /// Converts the [osmformat::StringTable] into a simpler `Vec<String>`.
    fn build_string_table(&self) -> Vec<String> {
        self.0
            .stringtable
            .s
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Builds a [CoordinateConverter] for this block.
    fn build_coordinate_converter(&self) -> CoordinateConverter {
        CoordinateConverter {
            lat_offset: self.0.lat_offset(),
            lon_offset: self.0.lon_offset(),
            granularity: self.0.granularity() as i64,
        }
    }
}

/// Group abstracts away an [osmformat::PrimitiveGroup] into a friendly interface.
struct Group {
    primitive_group: osmformat::PrimitiveGroup,
    coordinate_converter: CoordinateConverter,
    string_table: StringTable,
    retained: RetainedKeys,
}

impl Group {
    /// Returns a flattened iterator over all [Features](Feature) in this group.
    fn features(self) -> impl Iterator<Item = Feature> {
        let nodes = Self::nodes(
            self.primitive_group.nodes,
            self.coordinate_converter,
            self.string_table.clone(),
            self.retained.clone(),
        )
        .map(Feature::Node);

        let dense_nodes = DenseNodes::new(
            self.primitive_group.dense.unwrap_or_default(),
            self.coordinate_converter,
            self.string_table.clone(),
            self.retained.clone(),
        )
        .map(Feature::Node);

        let ways = Self::ways(
            self.primitive_group.ways,
            self.string_table.clone(),
            self.retained.clone(),
        )
        .map(Feature::Way);

        let relations =
            Self::relations(self.primitive_group.relations, self.string_table, self.retained)
                .map(Feature::Relation);

        nodes.chain(dense_nodes).chain(ways).chain(relations)
    }

    /// Returns an iterator over all standard (non-dense-encoded) [nodes](Node) from a moved
    /// vector of [raw nodes](osmformat::Node).
    fn nodes(
        raw_nodes: Vec<osmformat::Node>,
        coordinate_converter: CoordinateConverter,
        string_table: StringTable,
        retained: RetainedKeys,
    ) -> impl Iterator<Item = Node> {
        raw_nodes.into_iter().map(move |node| Node {
            id: node.id(),
            lat: coordinate_converter.convert_lat(node.lat()),
            lon: coordinate_converter.convert_lon(node.lon()),
            tags: collect_tags(&node.keys, &node.vals, &string_table, &retained),
        })
    }

    /// Returns an iterator over all [ways](Way) from a moved vector of [raw ways](osmformat::Way).
    fn ways(
        raw_ways: Vec<osmformat::Way>,
        string_table: StringTable,
        retained: RetainedKeys,
    ) -> impl Iterator<Item = Way> {
        raw_ways.into_iter().map(move |way| Way {
            id: way.id(),
            nodes: collect_way_nodes(&way.refs),
            tags: collect_tags(&way.keys, &way.vals, &string_table, &retained),
        })
    }

    /// Returns an iterator over all [relations](Relation) from a moved vector of [raw relations](osmformat::Relation).
    fn relations(
        raw_relations: Vec<osmformat::Relation>,
        string_table: StringTable,
        retained: RetainedKeys,
    ) -> impl Iterator<Item = Relation> {
        raw_relations.into_iter().map(move |relation| Relation {
            id: relation.id(),
            members: collect_relation_members(
                relation.id(),
                &relation.memids,
                &relation.roles_sid,
                &relation.types,
                &string_table,
            ),
            tags: collect_tags(&relation.keys, &relation.vals, &string_table, &retained),
        })
    }
}

/// Iterator over dense-encoded [nodes](Node) of a single [osmformat::DenseNodes].
///
/// Ids and coordinates are delta-coded. Tags of all nodes are stored in one flat
/// `keys_vals` stream of (key, value) string ids, where every node's tags are
/// terminated by a `0`. The position in that stream carries over from node to node.
struct DenseNodes {
    raw: osmformat::DenseNodes,
    coordinate_converter: CoordinateConverter,
    string_table: StringTable,
    retained: RetainedKeys,
    idx: usize,
    keys_vals_idx: usize,
    last_id: i64,
    last_lat: i64,
    last_lon: i64,
}

impl DenseNodes {
    fn new(
        raw: osmformat::DenseNodes,
        coordinate_converter: CoordinateConverter,
        string_table: StringTable,
        retained: RetainedKeys,
    ) -> Self {
        Self {
            raw,
            coordinate_converter,
            string_table,
            retained,
            idx: 0,
            keys_vals_idx: 0,
            last_id: 0,
            last_lat: 0,
            last_lon: 0,
        }
    }

    /// Reads the tags of the current node, advancing past its `0` delimiter.
    fn next_tags(&mut self) -> Tags {
        let mut tags = Tags::default();
        let keys_vals = &self.raw.keys_vals;

        while let Some(&key_idx) = keys_vals.get(self.keys_vals_idx) {
            self.keys_vals_idx += 1;
            if key_idx == 0 {
                break;
            }

            let Some(&value_idx) = keys_vals.get(self.keys_vals_idx) else {
                break; // truncated stream
            };
            self.keys_vals_idx += 1;

            let key = get_str(&self.string_table, key_idx as u32);
            if self.retained.contains(key) {
                tags.insert(
                    key.to_string(),
                    get_str(&self.string_table, value_idx as u32).to_string(),
                );
            }
        }

        tags
    }
}

impl Iterator for DenseNodes {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let id_delta = *self.raw.id.get(self.idx)?;
        let lat_delta = *self.raw.lat.get(self.idx)?;
        let lon_delta = *self.raw.lon.get(self.idx)?;
        self.idx += 1;

        self.last_id += id_delta;
        self.last_lat += lat_delta;
        self.last_lon += lon_delta;

        Some(Node {
            id: self.last_id,
            lat: self.coordinate_converter.convert_lat(self.last_lat),
            lon: self.coordinate_converter.convert_lon(self.last_lon),
            tags: self.next_tags(),
        })
    }
}

/// Converts latitudes and longitudes from OSM PBF representation to standard `f64` degrees.
#[derive(Debug, Clone, Copy)]
struct CoordinateConverter {
    lat_offset: i64,
    lon_offset: i64,
    granularity: i64,
}

impl CoordinateConverter {
    fn convert_lat(&self, value: i64) -> f64 {
        (self.lat_offset + self.granularity * value) as f64 * 1e-9
    }

    fn convert_lon(&self, value: i64) -> f64 {
        (self.lon_offset + self.granularity * value) as f64 * 1e-9
    }
}

fn collect_tags(
    keys: &[u32],
    values: &[u32],
    string_table: &[String],
    retained: &RetainedKeys,
) -> Tags {
    keys.iter()
        .zip(values.iter())
        .filter_map(|(&key_idx, &value_idx)| {
            let key = get_str(string_table, key_idx);
            if retained.contains(key) {
                Some((key.to_string(), get_str(string_table, value_idx).to_string()))
            } else {
                None
            }
        })
        .collect()
}

fn collect_way_nodes(ref_deltas: &[i64]) -> Vec<i64> {
    ref_deltas
        .iter()
        .scan(0, |acc, &delta| {
            *acc += delta;
            Some(*acc)
        })
        .collect()
}

fn collect_relation_members(
    relation_id: i64,
    member_id_deltas: &[i64],
    roles: &[i32],
    types: &[protobuf::EnumOrUnknown<osmformat::relation::MemberType>],
    string_table: &[String],
) -> Vec<RelationMember> {
    member_id_deltas
        .iter()
        .scan(0, |acc, &delta| {
            *acc += delta;
            Some(*acc)
        })
        .zip(roles.iter().zip(types.iter()))
        .filter_map(|(ref_, (&role_idx, type_))| {
            let type_ = match type_.enum_value() {
                Ok(osmformat::relation::MemberType::NODE) => FeatureType::Node,
                Ok(osmformat::relation::MemberType::WAY) => FeatureType::Way,
                Ok(osmformat::relation::MemberType::RELATION) => FeatureType::Relation,
                Err(unknown) => {
                    log::error!(
                        "relation {relation_id}: unexpected member type {unknown} of member {ref_} - dropping it"
                    );
                    return None;
                }
            };
            Some(RelationMember {
                ref_,
                type_,
                role: get_str(string_table, role_idx as u32).to_string(),
            })
        })
        .collect()
}

#[inline]
fn get_str(table: &[String], idx: u32) -> &str {
    table.get(idx as usize).map(String::as_str).unwrap_or_default()
}
