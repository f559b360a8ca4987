//! Trie loader
//!
//! Rebuilds a mutable [`Trie`] from a serialized database so new networks
//! can be merged into the result of an earlier build. Every tree node
//! becomes a fork, every data record becomes a leaf with its decoded value,
//! and every "no data" record becomes an empty slot.
//!
//! IPv4-only databases are grafted under `::/96`, the same place fresh IPv4
//! inserts go.

use crate::data_section::DataDecoder;
use crate::error::{GeoIpError, Result};
use crate::mmdb::{IpVersion, Layout, Record, SearchTree};
use crate::options::{merge_languages, now_epoch, BuildOptions, LoadOptions};
use crate::prefix::{Address, Prefix, IPV4_OFFSET};
use crate::trie::{Slot, Trie, ValueId};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Forks allowed per tree node before a file is treated as cyclic.
/// MaxMind's own databases alias the IPv4 subtree from up to three places.
const MAX_FORKS_PER_NODE: usize = 4;

impl Trie {
    /// Rebuild a trie from database bytes
    pub fn load(bytes: &[u8], options: LoadOptions) -> Result<Self> {
        let layout = Layout::parse(bytes)?;

        if layout.metadata.database_type != options.expected_database_type {
            return Err(GeoIpError::FormatMismatch {
                expected: options.expected_database_type,
                found: layout.metadata.database_type,
            });
        }

        let build = BuildOptions {
            database_type: layout.metadata.database_type.clone(),
            languages: merge_languages(&layout.metadata.languages, &options.languages),
            description: layout.metadata.description.clone(),
            record_size: layout.record_size,
            build_epoch: options.build_epoch.unwrap_or_else(now_epoch),
        };

        let mut loader = Loader {
            tree: SearchTree::from_layout(bytes, &layout),
            data: DataDecoder::new(layout.data_section(bytes)),
            depth_limit: layout.ip_version.depth(),
            fork_budget: (layout.node_count as usize).saturating_mul(MAX_FORKS_PER_NODE),
            values: FxHashMap::default(),
            trie: Trie::new(build),
        };

        let root = loader.convert(0, 0)?;
        let mut trie = loader.trie;
        match layout.ip_version {
            IpVersion::V6 => trie.root = root,
            IpVersion::V4 => {
                let embedded = Prefix::new(Address::from_bits(0), IPV4_OFFSET)?;
                trie.replace_subtree(embedded, root);
            }
        }
        Ok(trie)
    }

    /// Read and rebuild a database file
    pub fn load_path(path: impl AsRef<Path>, options: LoadOptions) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            GeoIpError::Io(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::load(&bytes, options)
    }
}

struct Loader<'a> {
    tree: SearchTree<'a>,
    data: DataDecoder<'a>,
    depth_limit: u8,
    fork_budget: usize,
    /// Data offset -> interned value, so shared records decode once
    values: FxHashMap<u32, ValueId>,
    trie: Trie,
}

impl Loader<'_> {
    /// Convert tree node `node` at `depth` into a fork slot
    fn convert(&mut self, node: u32, depth: u8) -> Result<Slot> {
        if depth >= self.depth_limit {
            return Err(GeoIpError::CorruptData(format!(
                "node {} lies deeper than {} bits",
                node, self.depth_limit
            )));
        }
        if self.fork_budget == 0 {
            return Err(GeoIpError::CorruptData(
                "search tree references form a cycle".to_string(),
            ));
        }
        self.fork_budget -= 1;

        let mut children = [Slot::Empty; 2];
        for (side, child) in children.iter_mut().enumerate() {
            *child = match self.tree.record(node, side)? {
                Record::Empty => Slot::Empty,
                Record::Node(next) => self.convert(next, depth + 1)?,
                Record::Data(offset) => Slot::Leaf(self.value_at(offset)?),
            };
        }
        Ok(Slot::Fork(self.trie.alloc(children)))
    }

    fn value_at(&mut self, offset: u32) -> Result<ValueId> {
        if let Some(&id) = self.values.get(&offset) {
            return Ok(id);
        }
        let value = self.data.decode(offset).map_err(|e| {
            GeoIpError::CorruptData(format!("data record at offset {}: {}", offset, e))
        })?;
        let id = self.trie.intern(value);
        self.values.insert(offset, id);
        Ok(id)
    }
}
