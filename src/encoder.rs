//! Binary encoder
//!
//! Serializes a [`Trie`] into an MMDB file. Forks are numbered in pre-order
//! starting with the root as node 0; leaf values are written to the data
//! section in the order their first reference is emitted. Both orders only
//! depend on the trie's shape, so encoding is reproducible.
//!
//! The whole file is assembled in memory and handed to the writer only once
//! encoding has succeeded.

use crate::data_section::DataEncoder;
use crate::error::{GeoIpError, Result};
use crate::mmdb::{
    IpVersion, Metadata, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::trie::{Slot, Trie};
use std::io::Write;
use std::path::Path;

/// Pointer values of one node
type NodeRecords = [u32; 2];

impl Trie {
    /// Encode into `writer`, returning the number of bytes written
    ///
    /// Nothing is written when encoding fails.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Encode and atomically replace the file at `path`
    ///
    /// The database is written to a temporary file in the destination
    /// directory and renamed into place after a successful flush.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| GeoIpError::Io(e.error.to_string()))?;

        Ok(bytes.len() as u64)
    }

    /// Encode into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record_size = self.options.record_size;
        let (order, node_index) = self.preorder();
        let node_count = order.len() as u32;

        // Leaf pointers are resolved against the data section offsets
        let mut data = DataEncoder::new();
        let mut offsets: Vec<Option<u32>> = vec![None; self.values.len()];
        let mut max_offset: Option<u32> = None;
        let mut nodes: Vec<[Pointer; 2]> = Vec::with_capacity(order.len());

        for children in &order {
            let mut pair = [Pointer::Empty; 2];
            for (side, slot) in children.iter().enumerate() {
                pair[side] = match *slot {
                    Slot::Empty => Pointer::Empty,
                    Slot::Fork(id) => Pointer::Node(node_index[id as usize]),
                    Slot::Leaf(id) => {
                        let offset = match offsets[id as usize] {
                            Some(offset) => offset,
                            None => {
                                let offset = data.encode(&self.values[id as usize])?;
                                offsets[id as usize] = Some(offset);
                                offset
                            }
                        };
                        max_offset = Some(max_offset.map_or(offset, |m| m.max(offset)));
                        Pointer::Data(offset)
                    }
                };
            }
            nodes.push(pair);
        }

        check_capacity(node_count, max_offset, record_size)?;

        let data_section = data.into_bytes();
        let metadata = Metadata {
            database_type: self.options.database_type.clone(),
            ip_version: IpVersion::V6.number(),
            record_size: record_size.bits(),
            node_count,
            build_epoch: self.options.build_epoch,
            languages: self.options.languages.clone(),
            description: self.options.description.clone(),
            binary_format_major_version: 2,
            binary_format_minor_version: 0,
        }
        .to_value()
        .to_bytes()?;

        let tree_size = order.len() * record_size.node_bytes();
        let mut out = Vec::with_capacity(
            tree_size
                + DATA_SECTION_SEPARATOR_SIZE
                + data_section.len()
                + METADATA_MARKER.len()
                + metadata.len(),
        );

        for pair in &nodes {
            let records: NodeRecords = [
                pair[0].resolve(node_count),
                pair[1].resolve(node_count),
            ];
            write_node(&mut out, record_size, records);
        }
        out.extend_from_slice(&[0u8; DATA_SECTION_SEPARATOR_SIZE]);
        out.extend_from_slice(&data_section);
        out.extend_from_slice(METADATA_MARKER);
        out.extend_from_slice(&metadata);

        Ok(out)
    }

    /// Children of every emitted node in pre-order, plus fork id -> node index
    ///
    /// An empty or leaf root still needs one node so readers have a tree
    /// to walk.
    fn preorder(&self) -> (Vec<[Slot; 2]>, Vec<u32>) {
        let mut node_index = vec![u32::MAX; self.forks.len()];
        let root = match self.root {
            Slot::Empty => return (vec![[Slot::Empty, Slot::Empty]], node_index),
            Slot::Leaf(id) => return (vec![[Slot::Leaf(id), Slot::Leaf(id)]], node_index),
            Slot::Fork(root) => root,
        };

        let mut order = Vec::with_capacity(self.fork_count());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children = self.forks[id as usize].children;
            node_index[id as usize] = order.len() as u32;
            order.push(children);
            if let Slot::Fork(right) = children[1] {
                stack.push(right);
            }
            if let Slot::Fork(left) = children[0] {
                stack.push(left);
            }
        }
        (order, node_index)
    }
}

/// A record before the node count is known
#[derive(Debug, Clone, Copy)]
enum Pointer {
    Empty,
    Node(u32),
    Data(u32),
}

impl Pointer {
    fn resolve(self, node_count: u32) -> u32 {
        match self {
            Pointer::Empty => node_count,
            Pointer::Node(index) => index,
            Pointer::Data(offset) => node_count + DATA_SECTION_SEPARATOR_SIZE as u32 + offset,
        }
    }
}

/// Fail if the largest pointer does not fit in a record
fn check_capacity(node_count: u32, max_offset: Option<u32>, record_size: RecordSize) -> Result<()> {
    let limit = record_size.max_pointer();
    let required = match max_offset {
        Some(offset) => node_count as u64 + DATA_SECTION_SEPARATOR_SIZE as u64 + offset as u64,
        None => node_count as u64,
    };
    if required > limit {
        return Err(GeoIpError::EncodingOverflow { required, limit });
    }
    Ok(())
}

/// Append one node (two big-endian records)
fn write_node(out: &mut Vec<u8>, record_size: RecordSize, [left, right]: NodeRecords) {
    match record_size {
        RecordSize::Bits24 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits28 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits32 => {
            out.extend_from_slice(&left.to_be_bytes());
            out.extend_from_slice(&right.to_be_bytes());
        }
    }
}
