//! Country list readers
//!
//! Builds a [`CountryMap`] from either
//!
//! - CSV rows of `cidr,code` (an optional `cidr,code` header row is skipped,
//!   `#` starts a comment line), or
//! - a JSON object mapping each code to its CIDR list:
//!   `{"us": ["1.0.0.0/8", "2001:db8::/32"]}`.
//!
//! Paths ending in `.gz` are decompressed on the fly and `-` reads stdin.
//!
//! ```rust,no_run
//! use sing_geoip::input;
//!
//! let map = input::read_country_list("country.csv.gz", None)?;
//! println!("{} codes", map.len());
//! # Ok::<(), sing_geoip::GeoIpError>(())
//! ```

use crate::error::{GeoIpError, Result};
use crate::prefix::Prefix;
use crate::selection::CountryMap;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader, Read};
use std::path::Path;

/// Buffer size for file reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Country list encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `cidr,code` rows
    Csv,
    /// `{code: [cidr, ...]}`
    Json,
}

impl InputFormat {
    /// Guess the format from the file name, ignoring a trailing `.gz`
    ///
    /// Anything that is not `.json` is read as CSV.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".json") {
            InputFormat::Json
        } else {
            InputFormat::Csv
        }
    }
}

impl std::str::FromStr for InputFormat {
    type Err = GeoIpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "json" => Ok(InputFormat::Json),
            other => Err(GeoIpError::InvalidInput(format!(
                "unknown input format '{}', expected csv or json",
                other
            ))),
        }
    }
}

/// Open a file with gzip detection based on its extension
///
/// The path `-` reads from stdin.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file = File::open(path)?;
    let is_gzip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// Read a country list from `path`
///
/// `format` overrides detection by file name.
pub fn read_country_list(
    path: impl AsRef<Path>,
    format: Option<InputFormat>,
) -> Result<CountryMap> {
    let path = path.as_ref();
    let format = format.unwrap_or_else(|| InputFormat::from_path(path));
    let reader = open(path)
        .map_err(|e| GeoIpError::Io(format!("failed to open {}: {}", path.display(), e)))?;

    match format {
        InputFormat::Csv => read_csv(reader),
        InputFormat::Json => read_json(reader),
    }
}

/// Parse `cidr,code` rows
pub fn read_csv<R: Read>(reader: R) -> Result<CountryMap> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut map = CountryMap::new();
    for (index, result) in csv.records().enumerate() {
        let record = result.map_err(|e| GeoIpError::InvalidInput(e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let (cidr, code) = match (record.get(0), record.get(1)) {
            (Some(cidr), Some(code)) if !cidr.is_empty() && !code.is_empty() => (cidr, code),
            (Some(""), None) => continue,
            _ => {
                return Err(GeoIpError::InvalidInput(format!(
                    "line {}: expected 'cidr,code'",
                    line
                )))
            }
        };

        if index == 0 && cidr.eq_ignore_ascii_case("cidr") {
            continue;
        }

        let prefix: Prefix = cidr.parse().map_err(|e: GeoIpError| {
            GeoIpError::InvalidPrefix(format!("line {}: {}", line, e))
        })?;
        map.insert(code, prefix);
    }
    Ok(map)
}

/// Parse a `{code: [cidr, ...]}` object
///
/// Entries are taken code by code in sorted code order.
pub fn read_json<R: Read>(reader: R) -> Result<CountryMap> {
    let raw: BTreeMap<String, Vec<String>> = serde_json::from_reader(reader)
        .map_err(|e| GeoIpError::InvalidInput(format!("invalid country list: {}", e)))?;

    let mut map = CountryMap::new();
    for (code, cidrs) in &raw {
        for (index, cidr) in cidrs.iter().enumerate() {
            let prefix: Prefix = cidr.parse().map_err(|e: GeoIpError| {
                GeoIpError::InvalidPrefix(format!("{}[{}]: {}", code, index, e))
            })?;
            map.insert(code, prefix);
        }
    }
    Ok(map)
}
