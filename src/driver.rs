//! Build driver
//!
//! Turns a country list into one or more database files. The primary
//! output is updated incrementally when it already exists; variants are
//! always built fresh from the same input.

use crate::error::{GeoIpError, Result};
use crate::input::{read_country_list, InputFormat};
use crate::mmdb::RecordSize;
use crate::options::{BuildOptions, LoadOptions, DATABASE_TYPE};
use crate::selection::{insert_selected, normalize_code, select_codes, CountryMap};
use crate::trie::Trie;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An extra output built from the same input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Destination file
    pub path: PathBuf,
    /// Allow-list; empty keeps every code
    pub codes: Vec<String>,
}

impl FromStr for Variant {
    type Err = GeoIpError;

    /// Parse `PATH` or `PATH=code,code`
    fn from_str(s: &str) -> Result<Self> {
        let (path, codes): (&str, Vec<String>) = match s.split_once('=') {
            Some((path, codes)) => (
                path,
                codes
                    .split(',')
                    .map(normalize_code)
                    .filter(|c| !c.is_empty())
                    .collect(),
            ),
            None => (s, Vec::new()),
        };
        if path.is_empty() {
            return Err(GeoIpError::InvalidInput(format!(
                "variant '{}' has no output path",
                s
            )));
        }
        Ok(Variant {
            path: PathBuf::from(path),
            codes,
        })
    }
}

/// Everything needed for one build run
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Country list to read (`-` for stdin)
    pub input: PathBuf,
    /// Input encoding; detected from the file name when `None`
    pub input_format: Option<InputFormat>,
    /// Primary output
    pub output: PathBuf,
    /// Allow-list for the primary output; empty keeps every code
    pub codes: Vec<String>,
    /// Additional fresh outputs
    pub variants: Vec<Variant>,
    /// Schema identifier written to and expected from outputs
    pub database_type: String,
    /// Record size for fresh builds
    pub record_size: RecordSize,
    /// Fixed build epoch; the current time when `None`
    pub build_epoch: Option<u64>,
}

impl BuildConfig {
    /// Config with default database type and record size
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            input_format: None,
            output: output.into(),
            codes: Vec::new(),
            variants: Vec::new(),
            database_type: DATABASE_TYPE.to_string(),
            record_size: RecordSize::Bits24,
            build_epoch: None,
        }
    }

    /// Restrict the primary output to `codes`
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.codes = codes.into_iter().map(|c| normalize_code(c.as_ref())).collect();
        self
    }

    /// Add a variant output
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Pin the build epoch
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }
}

/// Outcome of writing one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// File written
    pub path: PathBuf,
    /// True if an existing database was loaded and extended
    pub incremental: bool,
    /// Codes whose prefixes were inserted
    pub codes: Vec<String>,
    /// Language list recorded in the output
    pub languages: Vec<String>,
    /// Number of prefixes inserted
    pub inserted: usize,
    /// Search tree forks after compaction
    pub forks: usize,
    /// Size of the output in bytes
    pub bytes: u64,
}

/// Run a build: the primary output followed by every variant
pub fn build_database(config: &BuildConfig) -> Result<Vec<BuildReport>> {
    let map = read_country_list(&config.input, config.input_format)?;

    let mut reports = Vec::with_capacity(1 + config.variants.len());
    reports.push(build_primary(config, &map)?);
    for variant in &config.variants {
        reports.push(build_fresh(config, &map, &variant.path, &variant.codes)?);
    }
    Ok(reports)
}

/// Build the primary output, extending it when it already exists
///
/// A new file declares every code seen in the input, even when the
/// allow-list narrows what is inserted. An existing file keeps its
/// languages and gains only the explicitly requested codes.
pub fn build_primary(config: &BuildConfig, map: &CountryMap) -> Result<BuildReport> {
    let codes = select_codes(map, Some(config.codes.as_slice()));

    if !config.output.exists() {
        let trie = Trie::new(fresh_options(config, map.codes()));
        return finish(trie, map, &config.output, codes, false);
    }

    let mut load = LoadOptions::default()
        .with_expected_database_type(config.database_type.clone())
        .with_languages(config.codes.iter().cloned());
    if let Some(epoch) = config.build_epoch {
        load = load.with_build_epoch(epoch);
    }

    let trie = Trie::load_path(&config.output, load)?;
    finish(trie, map, &config.output, codes, true)
}

/// Build `path` from scratch
///
/// With an allow-list the language list is exactly those codes; without
/// one it is every code in the input.
pub fn build_fresh(
    config: &BuildConfig,
    map: &CountryMap,
    path: &Path,
    allow: &[String],
) -> Result<BuildReport> {
    let codes = select_codes(map, Some(allow));
    let trie = Trie::new(fresh_options(config, codes.iter().cloned()));
    finish(trie, map, path, codes, false)
}

fn fresh_options(
    config: &BuildConfig,
    languages: impl IntoIterator<Item = String>,
) -> BuildOptions {
    let options = BuildOptions::new(languages)
        .with_database_type(config.database_type.clone())
        .with_record_size(config.record_size);
    match config.build_epoch {
        Some(epoch) => options.with_build_epoch(epoch),
        None => options,
    }
}

fn finish(
    mut trie: Trie,
    map: &CountryMap,
    path: &Path,
    codes: Vec<String>,
    incremental: bool,
) -> Result<BuildReport> {
    let inserted = insert_selected(&mut trie, map, &codes);
    trie.compact();
    let bytes = trie.write_to_path(path)?;

    Ok(BuildReport {
        path: path.to_path_buf(),
        incremental,
        languages: trie.languages().to_vec(),
        codes,
        inserted,
        forks: trie.fork_count(),
        bytes,
    })
}
