//! Read-only database access
//!
//! Opens an encoded database (memory-mapped or from an owned buffer) and
//! answers longest-prefix lookups without rebuilding a trie.
//!
//! # Examples
//!
//! ```no_run
//! use sing_geoip::Database;
//!
//! let db = Database::open("geoip.db")?;
//! if let Some(code) = db.lookup_label("1.1.1.1".parse()?)? {
//!     println!("1.1.1.1 is in {}", code);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::data_section::{DataDecoder, DataValue};
use crate::error::{GeoIpError, Result};
use crate::mmdb::{Layout, Metadata, SearchTree};
use crate::prefix::{Address, Prefix};
use memmap2::Mmap;
use std::fs::File;
use std::net::IpAddr;
use std::path::Path;

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// Value stored for the matching network
    pub value: DataValue,
    /// The matching network
    pub prefix: Prefix,
    /// Address that was looked up
    pub address: IpAddr,
}

impl LookupResult {
    /// The matching network written in the family of the queried address
    ///
    /// `::5` and `0.0.0.5` share a leaf, but only the IPv4 query gets the
    /// network back as `0.0.0.0/8`.
    pub fn network(&self) -> String {
        match self.address {
            IpAddr::V4(_) => self.prefix.to_string(),
            IpAddr::V6(_) => self.prefix.to_ipv6_string(),
        }
    }
}

/// Storage for database bytes, either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// An opened database
pub struct Database {
    storage: Storage,
    layout: Layout,
}

impl Database {
    /// Open a database file using memory mapping
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| GeoIpError::Io(format!("failed to open {}: {}", path.display(), e)))?;

        // SAFETY: the map is read-only; databases are replaced by rename,
        // never rewritten in place.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| GeoIpError::Io(format!("failed to mmap {}: {}", path.display(), e)))?;

        Self::from_storage(Storage::Mmap(mmap))
    }

    /// Create a database from an owned buffer
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(Storage::Owned(data))
    }

    fn from_storage(storage: Storage) -> Result<Self> {
        let layout = Layout::parse(storage.as_slice())?;
        Ok(Self { storage, layout })
    }

    /// Parsed metadata
    pub fn metadata(&self) -> &Metadata {
        &self.layout.metadata
    }

    /// Size of the underlying file in bytes
    pub fn size(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// Size of the data section in bytes
    pub fn data_section_size(&self) -> usize {
        self.layout.data_end - self.layout.data_start
    }

    /// Look up the value for an address
    pub fn lookup(&self, addr: IpAddr) -> Result<Option<LookupResult>> {
        let data = self.storage.as_slice();
        let address = Address::from(addr);

        let tree = SearchTree::from_layout(data, &self.layout);
        let (offset, len) = match tree.lookup(address)? {
            Some(hit) => hit,
            None => return Ok(None),
        };

        let value = DataDecoder::new(self.layout.data_section(data))
            .decode(offset)
            .map_err(|e| {
                GeoIpError::CorruptData(format!("data record at offset {}: {}", offset, e))
            })?;

        Ok(Some(LookupResult {
            value,
            prefix: Prefix::new(address, len)?,
            address: addr,
        }))
    }

    /// Look up the country code string for an address
    ///
    /// Returns `None` when the address is unassigned or its value is not
    /// a string.
    pub fn lookup_label(&self, addr: IpAddr) -> Result<Option<String>> {
        Ok(self
            .lookup(addr)?
            .and_then(|hit| hit.value.as_str().map(str::to_string)))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.size())
            .field("metadata", &self.layout.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BuildOptions;
    use crate::trie::Trie;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn sample() -> Vec<u8> {
        let mut trie = Trie::new(BuildOptions::new(["cn", "us"]).with_build_epoch(7));
        trie.insert("1.0.0.0/8".parse().unwrap(), "cn");
        trie.insert("2001:db8::/32".parse().unwrap(), "us");
        trie.to_bytes().unwrap()
    }

    #[test]
    fn test_lookup_ipv4() {
        let db = Database::from_bytes(sample()).unwrap();
        let hit = db.lookup(ip("1.2.3.4")).unwrap().unwrap();
        assert_eq!(hit.value, DataValue::from("cn"));
        assert_eq!(hit.prefix.to_string(), "1.0.0.0/8");
    }

    #[test]
    fn test_lookup_ipv6() {
        let db = Database::from_bytes(sample()).unwrap();
        let hit = db.lookup(ip("2001:db8::1")).unwrap().unwrap();
        assert_eq!(hit.value, DataValue::from("us"));
        assert_eq!(hit.prefix.len(), 32);
    }

    #[test]
    fn test_network_follows_query_family() {
        let mut trie = Trie::new(BuildOptions::new(["private"]).with_build_epoch(7));
        trie.insert("0.0.0.0/8".parse().unwrap(), "private");
        let db = Database::from_bytes(trie.to_bytes().unwrap()).unwrap();

        let v4 = db.lookup(ip("0.0.0.5")).unwrap().unwrap();
        assert_eq!(v4.network(), "0.0.0.0/8");

        // Same leaf, asked as IPv6
        let v6 = db.lookup(ip("::5")).unwrap().unwrap();
        assert_eq!(v6.prefix, v4.prefix);
        assert_eq!(v6.network(), "::/104");

        let db = Database::from_bytes(sample()).unwrap();
        let hit = db.lookup(ip("2001:db8::1")).unwrap().unwrap();
        assert_eq!(hit.network(), "2001:db8::/32");
    }

    #[test]
    fn test_lookup_not_found() {
        let db = Database::from_bytes(sample()).unwrap();
        assert_eq!(db.lookup(ip("8.8.8.8")).unwrap(), None);
        assert_eq!(db.lookup_label(ip("::ffff:1.2.3.4")).unwrap(), None);
    }

    #[test]
    fn test_metadata() {
        let db = Database::from_bytes(sample()).unwrap();
        let metadata = db.metadata();
        assert_eq!(metadata.database_type, "sing-geoip");
        assert_eq!(metadata.languages, vec!["cn", "us"]);
        assert_eq!(metadata.build_epoch, 7);
        assert_eq!(db.data_section_size(), 6);
    }

    #[test]
    fn test_open_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.db");
        std::fs::write(&path, sample()).unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(db.lookup_label(ip("1.1.1.1")).unwrap().as_deref(), Some("cn"));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            Database::open("/nonexistent/geoip.db"),
            Err(GeoIpError::Io(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            Database::from_bytes(b"definitely not a database".to_vec()),
            Err(GeoIpError::CorruptData(_))
        ));
    }
}
