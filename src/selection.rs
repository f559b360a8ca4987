//! Selection and filtering
//!
//! Country labels are compared case-insensitively and stored lower-cased.
//! Selection narrows a [`CountryMap`] to an allow-list before anything is
//! inserted; without an allow-list every observed label is kept.

use crate::prefix::Prefix;
use crate::trie::Trie;
use std::collections::BTreeMap;

/// Lower-case a country code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// `(code, prefix)` pairs in input order
///
/// Codes are lower-cased on insert. Input order is kept across codes so
/// overlapping entries resolve the way they were listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryMap {
    entries: Vec<(String, Prefix)>,
    counts: BTreeMap<String, usize>,
}

impl CountryMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prefix under `code`
    pub fn insert(&mut self, code: &str, prefix: Prefix) {
        let code = normalize_code(code);
        *self.counts.entry(code.clone()).or_default() += 1;
        self.entries.push((code, prefix));
    }

    /// Prefixes listed for `code`, in input order
    pub fn prefixes(&self, code: &str) -> Vec<Prefix> {
        let code = normalize_code(code);
        self.entries
            .iter()
            .filter(|(c, _)| *c == code)
            .map(|(_, prefix)| *prefix)
            .collect()
    }

    /// All codes, sorted
    pub fn codes(&self) -> Vec<String> {
        self.counts.keys().cloned().collect()
    }

    /// Iterate `(code, prefix)` in input order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Prefix)> {
        self.entries
            .iter()
            .map(|(code, prefix)| (code.as_str(), *prefix))
    }

    /// Number of distinct codes
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no code has been added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of prefixes across all codes
    pub fn prefix_count(&self) -> usize {
        self.entries.len()
    }
}

/// Resolve the codes to emit
///
/// With an allow-list, returns its lower-cased entries; an empty or missing
/// allow-list selects every code in `map`. The result is sorted and free of
/// duplicates. Allowed codes absent from the map are kept so they still
/// appear in the language list.
pub fn select_codes(map: &CountryMap, allow: Option<&[String]>) -> Vec<String> {
    let mut codes: Vec<String> = match allow {
        Some(allow) if !allow.is_empty() => allow.iter().map(|c| normalize_code(c)).collect(),
        _ => map.codes(),
    };
    codes.sort();
    codes.dedup();
    codes
}

/// Insert every entry whose code is in `codes`, returning how many were inserted
///
/// Entries go in in input order, so a later overlapping entry replaces an
/// earlier one.
pub fn insert_selected(trie: &mut Trie, map: &CountryMap, codes: &[String]) -> usize {
    let mut inserted = 0;
    for (code, prefix) in map.iter() {
        if codes.iter().any(|c| c == code) {
            trie.insert(prefix, code);
            inserted += 1;
        }
    }
    inserted
}
