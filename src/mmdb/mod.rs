//! MaxMind DB (MMDB) file layout
//!
//! The output of this crate is a standard MMDB file:
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Search tree (node_count × 6 bytes)  │
//! │  16-byte zero separator              │
//! │  Data section (deduplicated values)  │
//! │  "\xAB\xCD\xEFMaxMind.com"           │
//! │  Metadata map                        │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Architecture
//!
//! - **types**: constants, record sizes and IP versions
//! - **format**: metadata marker search and metadata parsing
//! - **tree**: search tree record access and lookups over raw bytes

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, Layout, Metadata};
pub use tree::{Record, SearchTree};
pub use types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
