//! MMDB Binary Format Parsing
//!
//! Locates the metadata block by scanning backward for the marker, decodes
//! it into [`Metadata`], and derives the section boundaries of the file.

use super::types::{
    IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER, METADATA_SEARCH_WINDOW,
};
use crate::data_section::{DataDecoder, DataValue};
use crate::error::{GeoIpError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Database metadata stored after the marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Schema identifier
    pub database_type: String,
    /// 4 or 6
    pub ip_version: u16,
    /// Bits per record
    pub record_size: u16,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Declared language (country code) list
    pub languages: Vec<String>,
    /// Language -> description text
    pub description: BTreeMap<String, String>,
    /// Format major version (always 2)
    pub binary_format_major_version: u16,
    /// Format minor version
    pub binary_format_minor_version: u16,
}

impl Metadata {
    /// Encode as the metadata map
    pub fn to_value(&self) -> DataValue {
        let mut map = BTreeMap::new();
        map.insert(
            "binary_format_major_version".to_string(),
            DataValue::Uint16(self.binary_format_major_version),
        );
        map.insert(
            "binary_format_minor_version".to_string(),
            DataValue::Uint16(self.binary_format_minor_version),
        );
        map.insert("build_epoch".to_string(), DataValue::Uint64(self.build_epoch));
        map.insert(
            "database_type".to_string(),
            DataValue::String(self.database_type.clone()),
        );
        map.insert(
            "description".to_string(),
            DataValue::Map(
                self.description
                    .iter()
                    .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
                    .collect(),
            ),
        );
        map.insert("ip_version".to_string(), DataValue::Uint16(self.ip_version));
        map.insert(
            "languages".to_string(),
            DataValue::Array(
                self.languages
                    .iter()
                    .map(|l| DataValue::String(l.clone()))
                    .collect(),
            ),
        );
        map.insert("node_count".to_string(), DataValue::Uint32(self.node_count));
        map.insert("record_size".to_string(), DataValue::Uint16(self.record_size));
        DataValue::Map(map)
    }

    /// Parse from a decoded metadata map
    ///
    /// `node_count`, `record_size`, `ip_version` and `database_type` are
    /// required; everything else falls back to an empty/zero value.
    pub fn from_value(value: &DataValue) -> Result<Self> {
        let map = match value {
            DataValue::Map(map) => map,
            _ => return Err(GeoIpError::CorruptData("metadata is not a map".to_string())),
        };

        let database_type = map
            .get("database_type")
            .and_then(DataValue::as_str)
            .ok_or_else(|| missing("database_type"))?
            .to_string();

        let languages = match map.get("languages") {
            Some(DataValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        GeoIpError::CorruptData("language is not a string".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(GeoIpError::CorruptData(
                    "'languages' is not an array".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let description = match map.get("description") {
            Some(DataValue::Map(desc)) => desc
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };

        let node_count = extract_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count)
            .map_err(|_| GeoIpError::CorruptData(format!("node count {} too large", node_count)))?;

        Ok(Metadata {
            database_type,
            ip_version: narrow("ip_version", extract_uint(map, "ip_version")?)?,
            record_size: narrow("record_size", extract_uint(map, "record_size")?)?,
            node_count,
            build_epoch: optional_uint(map, "build_epoch"),
            languages,
            description,
            binary_format_major_version: narrow(
                "binary_format_major_version",
                optional_uint(map, "binary_format_major_version"),
            )?,
            binary_format_minor_version: narrow(
                "binary_format_minor_version",
                optional_uint(map, "binary_format_minor_version"),
            )?,
        })
    }
}

/// Section boundaries of a database file
#[derive(Debug, Clone)]
pub struct Layout {
    /// Parsed metadata
    pub metadata: Metadata,
    /// Record size of the search tree
    pub record_size: RecordSize,
    /// IP version of the search tree
    pub ip_version: IpVersion,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Offset of the first data section byte
    pub data_start: usize,
    /// Offset one past the last data section byte (start of the marker)
    pub data_end: usize,
}

impl Layout {
    /// Parse the metadata of a complete file and compute section offsets
    pub fn parse(data: &[u8]) -> Result<Self> {
        let marker_offset = find_metadata_marker(data)?;
        let metadata_bytes = &data[marker_offset + METADATA_MARKER.len()..];

        let value = DataDecoder::new(metadata_bytes)
            .decode(0)
            .map_err(|e| GeoIpError::CorruptData(format!("failed to decode metadata: {}", e)))?;
        let metadata = Metadata::from_value(&value)?;

        let record_size = RecordSize::from_bits(metadata.record_size as u64)?;
        let ip_version = IpVersion::from_number(metadata.ip_version as u64)?;
        let node_count = metadata.node_count;

        let tree_size = (node_count as usize)
            .checked_mul(record_size.node_bytes())
            .ok_or_else(|| GeoIpError::CorruptData("search tree size overflow".to_string()))?;
        let data_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;

        if node_count == 0 {
            return Err(GeoIpError::CorruptData("search tree has no nodes".to_string()));
        }
        if data_start > marker_offset {
            return Err(GeoIpError::CorruptData(format!(
                "search tree of {} bytes does not fit before metadata at {}",
                tree_size, marker_offset
            )));
        }

        Ok(Layout {
            metadata,
            record_size,
            ip_version,
            node_count,
            tree_size,
            data_start,
            data_end: marker_offset,
        })
    }

    /// Search tree bytes
    pub fn tree<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[..self.tree_size]
    }

    /// Data section bytes
    pub fn data_section<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.data_start..self.data_end]
    }
}

/// Find the last metadata marker in the file
///
/// Only the final 128KB are searched, matching libmaxminddb.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize> {
    let window_start = data.len().saturating_sub(METADATA_SEARCH_WINDOW);
    memchr::memmem::rfind(&data[window_start..], METADATA_MARKER)
        .map(|pos| window_start + pos)
        .ok_or_else(|| GeoIpError::CorruptData("metadata marker not found".to_string()))
}

fn missing(key: &str) -> GeoIpError {
    GeoIpError::CorruptData(format!("required metadata field '{}' not found", key))
}

fn extract_uint(map: &BTreeMap<String, DataValue>, key: &str) -> Result<u64> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            GeoIpError::CorruptData(format!("field '{}' is not an unsigned integer", key))
        }),
        None => Err(missing(key)),
    }
}

fn optional_uint(map: &BTreeMap<String, DataValue>, key: &str) -> u64 {
    map.get(key).and_then(DataValue::as_u64).unwrap_or(0)
}

fn narrow(key: &str, value: u64) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        GeoIpError::CorruptData(format!("field '{}' value {} out of range", key, value))
    })
}
