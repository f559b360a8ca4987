//! Property-based tests for insertion order semantics and encode/decode.
//!
//! Run with: `cargo test --test round_trip`

use proptest::prelude::*;
use sing_geoip::{Address, BuildOptions, Database, LoadOptions, Prefix, Trie};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const CODES: &[&str] = &["cn", "jp", "us", "private"];

// =============================================================================
// Strategies
// =============================================================================

fn ipv4_prefix() -> impl Strategy<Value = Prefix> {
    (any::<u32>(), 0u8..=32)
        .prop_map(|(addr, len)| Prefix::from_ip(IpAddr::V4(Ipv4Addr::from(addr)), len).unwrap())
}

fn ipv6_prefix() -> impl Strategy<Value = Prefix> {
    // Keep most networks inside 2001:db8::/32 so they overlap
    (any::<u128>(), 32u8..=128).prop_map(|(bits, len)| {
        let addr = (0x2001_0db8u128 << 96) | (bits >> 32);
        Prefix::from_ip(IpAddr::V6(Ipv6Addr::from(addr)), len).unwrap()
    })
}

fn entry() -> impl Strategy<Value = (Prefix, &'static str)> {
    (
        prop_oneof![3 => ipv4_prefix(), 1 => ipv6_prefix()],
        prop::sample::select(CODES),
    )
}

fn entries() -> impl Strategy<Value = Vec<(Prefix, &'static str)>> {
    prop::collection::vec(entry(), 0..40)
}

// =============================================================================
// Helpers
// =============================================================================

fn build(entries: &[(Prefix, &'static str)]) -> Trie {
    let mut trie = Trie::new(BuildOptions::new(CODES.iter().copied()).with_build_epoch(1));
    for (prefix, code) in entries {
        trie.insert(*prefix, *code);
    }
    trie
}

/// The most recently inserted prefix containing `addr`
fn expected(entries: &[(Prefix, &'static str)], addr: Address) -> Option<&'static str> {
    entries
        .iter()
        .rev()
        .find(|(prefix, _)| prefix.contains_address(addr))
        .map(|(_, code)| *code)
}

/// First and last address of every prefix plus the extra probes
fn probes(entries: &[(Prefix, &'static str)], extra: &[u128]) -> Vec<Address> {
    let mut out: Vec<Address> = extra.iter().map(|&bits| Address::from_bits(bits)).collect();
    for (prefix, _) in entries {
        let first = prefix.address().bits();
        let host_mask = u128::MAX.checked_shr(prefix.len() as u32).unwrap_or(0);
        out.push(Address::from_bits(first));
        out.push(Address::from_bits(first | host_mask));
    }
    out
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// The trie answers like "last inserted covering prefix wins"
    #[test]
    fn prop_last_write_wins(entries in entries(), extra in prop::collection::vec(any::<u128>(), 0..16)) {
        let trie = build(&entries);
        for addr in probes(&entries, &extra) {
            let got = trie.lookup(addr).and_then(|v| v.as_str());
            prop_assert_eq!(got, expected(&entries, addr));
        }
    }

    /// Reading the encoded file gives the same answers as the trie
    #[test]
    fn prop_encode_decode_matches_trie(entries in entries(), extra in prop::collection::vec(any::<u128>(), 0..16)) {
        let trie = build(&entries);
        let db = Database::from_bytes(trie.to_bytes().unwrap()).unwrap();
        for addr in probes(&entries, &extra) {
            let direct = trie.lookup(addr).cloned();
            let decoded = db.lookup(addr.to_ip()).unwrap().map(|hit| hit.value);
            prop_assert_eq!(decoded, direct);
        }
    }

    /// Compaction never changes an answer
    #[test]
    fn prop_compact_preserves_lookups(entries in entries()) {
        let trie = build(&entries);
        let mut compacted = trie.clone();
        compacted.compact();
        prop_assert!(compacted.fork_count() <= trie.fork_count());
        for addr in probes(&entries, &[]) {
            prop_assert_eq!(compacted.lookup(addr), trie.lookup(addr));
        }
    }

    /// Same input in the same order encodes to the same bytes
    #[test]
    fn prop_deterministic(entries in entries()) {
        prop_assert_eq!(build(&entries).to_bytes().unwrap(), build(&entries).to_bytes().unwrap());
    }

    /// Loading an encoded trie and encoding it again is lossless
    #[test]
    fn prop_load_reencode_identical(entries in entries()) {
        let bytes = build(&entries).to_bytes().unwrap();
        let reloaded = Trie::load(&bytes, LoadOptions::default().with_build_epoch(1)).unwrap();
        prop_assert_eq!(reloaded.to_bytes().unwrap(), bytes);
    }

    /// `networks` lists disjoint prefixes in ascending address order
    #[test]
    fn prop_networks_sorted_and_disjoint(entries in entries()) {
        let trie = build(&entries);
        let networks = trie.networks();
        for pair in networks.windows(2) {
            let (a, _) = pair[0];
            let (b, _) = pair[1];
            prop_assert!(a.address() < b.address());
            prop_assert!(!a.contains(&b));
        }
        for (prefix, value) in &networks {
            prop_assert_eq!(trie.lookup(prefix.address()), Some(*value));
        }
    }
}
