//! MMDB Search Tree Traversal
//!
//! Each node holds two records (left for bit 0, right for bit 1). A record
//! value below `node_count` is another node, exactly `node_count` means "no
//! data", and anything above points into the data section at
//! `value - node_count - 16`.

use super::format::Layout;
use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::{GeoIpError, Result};
use crate::prefix::{Address, IPV4_OFFSET};

/// Decoded meaning of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// Continue at this node
    Node(u32),
    /// No assignment below this point
    Empty,
    /// Offset into the data section
    Data(u32),
}

/// Read-only view of a serialized search tree
pub struct SearchTree<'a> {
    tree: &'a [u8],
    node_count: u32,
    record_size: RecordSize,
    ip_version: IpVersion,
}

impl<'a> SearchTree<'a> {
    /// Create a view over raw tree bytes
    pub fn new(
        tree: &'a [u8],
        node_count: u32,
        record_size: RecordSize,
        ip_version: IpVersion,
    ) -> Self {
        Self {
            tree,
            node_count,
            record_size,
            ip_version,
        }
    }

    /// Create a view over the tree section of a parsed file
    pub fn from_layout(data: &'a [u8], layout: &Layout) -> Self {
        Self::new(
            layout.tree(data),
            layout.node_count,
            layout.record_size,
            layout.ip_version,
        )
    }

    /// Read and classify a record
    pub fn record(&self, node: u32, side: usize) -> Result<Record> {
        let raw = self.raw_record(node, side)?;
        if raw < self.node_count {
            Ok(Record::Node(raw))
        } else if raw == self.node_count {
            Ok(Record::Empty)
        } else {
            let offset = raw
                .checked_sub(self.node_count)
                .and_then(|v| v.checked_sub(DATA_SECTION_SEPARATOR_SIZE as u32))
                .ok_or_else(|| {
                    GeoIpError::CorruptData(format!(
                        "record {} points into the data section separator (node_count = {})",
                        raw, self.node_count
                    ))
                })?;
            Ok(Record::Data(offset))
        }
    }

    /// Read the raw record value of `node` on `side` (0 = left, 1 = right)
    pub fn raw_record(&self, node: u32, side: usize) -> Result<u32> {
        if node >= self.node_count {
            return Err(GeoIpError::CorruptData(format!(
                "node index {} exceeds node count {}",
                node, self.node_count
            )));
        }

        let node_bytes = self.record_size.node_bytes();
        let start = node as usize * node_bytes;
        let bytes = self.tree.get(start..start + node_bytes).ok_or_else(|| {
            GeoIpError::CorruptData(format!("node {} lies beyond the search tree", node))
        })?;

        let be = |b: &[u8]| b.iter().fold(0u32, |acc, &x| (acc << 8) | x as u32);

        let value = match (self.record_size, side) {
            (RecordSize::Bits24, 0) => be(&bytes[0..3]),
            (RecordSize::Bits24, _) => be(&bytes[3..6]),
            // Middle byte: high nibble belongs to the left record, low nibble to the right
            (RecordSize::Bits28, 0) => ((bytes[3] as u32 & 0xF0) << 20) | be(&bytes[0..3]),
            (RecordSize::Bits28, _) => ((bytes[3] as u32 & 0x0F) << 24) | be(&bytes[4..7]),
            (RecordSize::Bits32, 0) => be(&bytes[0..4]),
            (RecordSize::Bits32, _) => be(&bytes[4..8]),
        };
        Ok(value)
    }

    /// Longest-prefix lookup
    ///
    /// Returns the data section offset and the unified-space prefix length
    /// of the matching network, or `None` when the address is unassigned.
    pub fn lookup(&self, addr: Address) -> Result<Option<(u32, u8)>> {
        let start_depth = match self.ip_version {
            IpVersion::V6 => 0,
            IpVersion::V4 if addr.is_embedded_ipv4() => IPV4_OFFSET,
            IpVersion::V4 => return Ok(None),
        };

        let mut node = 0u32;
        for depth in start_depth..128 {
            match self.record(node, addr.bit(depth) as usize)? {
                Record::Node(next) => node = next,
                Record::Empty => return Ok(None),
                Record::Data(offset) => return Ok(Some((offset, depth + 1))),
            }
        }

        Err(GeoIpError::CorruptData(
            "search tree deeper than the address width".to_string(),
        ))
    }
}
