//! sing-geoip - Country-code GeoIP database builder
//!
//! Builds compact, memory-mappable MMDB files that map IP networks to
//! lower-case country codes. Networks are collected in a binary radix trie
//! over a single 128-bit address space (IPv4 lives under `::/96`), then
//! serialized as a search tree plus a deduplicated data section.
//!
//! # Quick Start
//!
//! ```rust
//! use sing_geoip::{BuildOptions, Database, Trie};
//!
//! let mut trie = Trie::new(BuildOptions::new(["jp", "us"]));
//! trie.insert("1.1.1.0/24".parse()?, "us");
//! trie.insert("1.1.1.128/25".parse()?, "jp");
//!
//! let db = Database::from_bytes(trie.to_bytes()?)?;
//! assert_eq!(db.lookup_label("1.1.1.1".parse()?)?.as_deref(), Some("us"));
//! assert_eq!(db.lookup_label("1.1.1.200".parse()?)?.as_deref(), Some("jp"));
//! assert_eq!(db.lookup_label("8.8.8.8".parse()?)?, None);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Incremental Builds
//!
//! An existing database can be reopened as a trie, extended and written
//! back. Later inserts replace every overlapping earlier assignment.
//!
//! ```rust,no_run
//! use sing_geoip::{LoadOptions, Trie};
//!
//! let mut trie = Trie::load_path("geoip.db", LoadOptions::default().with_languages(["jp"]))?;
//! trie.insert("1.2.0.0/16".parse()?, "jp");
//! trie.write_to_path("geoip.db")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  1. Search tree (node_count nodes)   │
//! │  2. 16 zero bytes                    │
//! │  3. Data section (deduplicated)      │
//! │  4. "\xAB\xCD\xEFMaxMind.com"        │
//! │  5. Metadata map                     │
//! └──────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Self-describing value encoding for the data section
pub mod data_section;
/// Read-only database access
pub mod database;
/// Build driver: country lists to database files
pub mod driver;
mod encoder;
/// Error types
pub mod error;
/// Country list readers
pub mod input;
mod loader;
/// MMDB format constants, metadata and search tree reader
pub mod mmdb;
/// Build and load options
pub mod options;
/// Address and prefix model
pub mod prefix;
/// Allow-list selection
pub mod selection;
/// Radix trie
pub mod trie;

// Re-exports for Rust consumers

pub use crate::data_section::DataValue;
pub use crate::database::{Database, LookupResult};
pub use crate::driver::{build_database, BuildConfig, BuildReport, Variant};
pub use crate::error::{GeoIpError, Result};
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
pub use crate::options::{BuildOptions, LoadOptions, DATABASE_TYPE};
pub use crate::prefix::{Address, Prefix};
pub use crate::selection::{insert_selected, select_codes, CountryMap};
pub use crate::trie::{ForkView, Trie, TrieNode};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
