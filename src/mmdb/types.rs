//! MMDB-specific type definitions

use crate::error::{GeoIpError, Result};

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Metadata must start within this many bytes of the end of the file
pub const METADATA_SEARCH_WINDOW: usize = 128 * 1024;

/// IP version declared by a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only, 32-bit tree
    V4,
    /// IPv6, 128-bit tree with IPv4 under `::/96`
    V6,
}

impl IpVersion {
    /// Tree depth in bits
    pub fn depth(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Numeric value stored in metadata
    pub fn number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Parse from the metadata value
    pub fn from_number(n: u64) -> Result<Self> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(GeoIpError::CorruptData(format!("invalid IP version: {}", n))),
        }
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    #[default]
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record width in bits
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Largest value a single record can hold
    pub fn max_pointer(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Create from bit size
    pub fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(GeoIpError::CorruptData(format!(
                "invalid record size: {} bits",
                bits
            ))),
        }
    }
}
