//! Build and load options
//!
//! Options are plain values handed to [`Trie::new`](crate::Trie::new) and
//! [`Trie::load`](crate::Trie::load); nothing is read from the environment
//! here.

use crate::mmdb::RecordSize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Schema identifier written to and expected from every database
pub const DATABASE_TYPE: &str = "sing-geoip";

/// Options for a fresh build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Schema identifier stored in metadata
    pub database_type: String,
    /// Declared country codes, in output order
    pub languages: Vec<String>,
    /// Language -> description text
    pub description: BTreeMap<String, String>,
    /// Bits per search tree record
    pub record_size: RecordSize,
    /// Seconds since the Unix epoch recorded in metadata
    pub build_epoch: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            database_type: DATABASE_TYPE.to_string(),
            languages: Vec::new(),
            description: BTreeMap::new(),
            record_size: RecordSize::Bits24,
            build_epoch: now_epoch(),
        }
    }
}

impl BuildOptions {
    /// Default options with the given language list
    ///
    /// The build epoch is captured here, so encoding the same trie twice
    /// yields identical bytes.
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set a custom database type name
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Add a description in a specific language
    pub fn with_description(
        mut self,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Pin the build epoch (reproducible builds)
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = epoch;
        self
    }

    /// Use a different record size
    pub fn with_record_size(mut self, record_size: RecordSize) -> Self {
        self.record_size = record_size;
        self
    }
}

/// Options for reopening an existing database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// The file must declare exactly this database type
    pub expected_database_type: String,
    /// Codes appended to the file's language list when missing from it
    pub languages: Vec<String>,
    /// Epoch for the next encode; `None` stamps the load time
    pub build_epoch: Option<u64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            expected_database_type: DATABASE_TYPE.to_string(),
            languages: Vec::new(),
            build_epoch: None,
        }
    }
}

impl LoadOptions {
    /// Request additional language codes
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Expect a different database type
    pub fn with_expected_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.expected_database_type = db_type.into();
        self
    }

    /// Pin the build epoch of the reloaded trie
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }
}

/// Append every code from `extra` that `existing` does not already contain
pub fn merge_languages(existing: &[String], extra: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for code in extra {
        if !merged.contains(code) {
            merged.push(code.clone());
        }
    }
    merged
}

pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
