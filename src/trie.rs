//! Radix trie over the unified 128-bit address space
//!
//! Forks live in an arena and are addressed by index. A slot (the root or
//! either child of a fork) is `Empty`, a `Leaf` referring to an interned
//! value, or a `Fork`. Each fork is owned by exactly one slot, so replacing
//! a slot releases the whole subtree below it onto the free list.
//!
//! Insertion follows the replace policy: the most recent insert wins for
//! every address it covers, whether the earlier assignment was broader or
//! narrower.

use crate::data_section::DataValue;
use crate::options::BuildOptions;
use crate::prefix::{Address, Prefix, ADDRESS_BITS};
use rustc_hash::FxHashMap;

/// Index of an interned value
pub(crate) type ValueId = u32;

/// Index of a fork in the arena
pub(crate) type ForkId = u32;

/// Contents of a root or child position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Empty,
    Leaf(ValueId),
    Fork(ForkId),
}

/// Arena entry: children for bit 0 and bit 1
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fork {
    pub(crate) children: [Slot; 2],
}

/// Where a slot lives
#[derive(Debug, Clone, Copy)]
enum Location {
    Root,
    Child(ForkId, usize),
}

/// Borrowed view of one trie node
#[derive(Debug, Clone, Copy)]
pub enum TrieNode<'a> {
    /// No assignment for this subtree
    Empty,
    /// Every address in this subtree maps to the value
    Leaf(&'a DataValue),
    /// Subtree splits on the next bit
    Fork(ForkView<'a>),
}

/// Borrowed view of a fork
#[derive(Debug, Clone, Copy)]
pub struct ForkView<'a> {
    trie: &'a Trie,
    id: ForkId,
}

impl<'a> ForkView<'a> {
    /// Child for bit 0
    pub fn left(&self) -> TrieNode<'a> {
        self.trie.view(self.trie.forks[self.id as usize].children[0])
    }

    /// Child for bit 1
    pub fn right(&self) -> TrieNode<'a> {
        self.trie.view(self.trie.forks[self.id as usize].children[1])
    }
}

/// Mutable radix trie plus the metadata it will be encoded with
#[derive(Debug, Clone)]
pub struct Trie {
    pub(crate) options: BuildOptions,
    pub(crate) root: Slot,
    pub(crate) forks: Vec<Fork>,
    free: Vec<ForkId>,
    pub(crate) values: Vec<DataValue>,
    value_ids: FxHashMap<Vec<u8>, ValueId>,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

impl Trie {
    /// Create an empty trie
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            root: Slot::Empty,
            forks: Vec::new(),
            free: Vec::new(),
            values: Vec::new(),
            value_ids: FxHashMap::default(),
        }
    }

    /// Options the trie will be encoded with
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Declared language list
    pub fn languages(&self) -> &[String] {
        &self.options.languages
    }

    /// Insert a prefix, replacing every overlapping earlier assignment
    pub fn insert(&mut self, prefix: Prefix, value: impl Into<DataValue>) {
        let id = self.intern(value.into());
        self.replace_subtree(prefix, Slot::Leaf(id));
    }

    /// Value assigned to `addr`, if any
    pub fn lookup(&self, addr: impl Into<Address>) -> Option<&DataValue> {
        self.lookup_prefix(addr).map(|(value, _)| value)
    }

    /// Value assigned to `addr` together with the covering leaf's prefix
    pub fn lookup_prefix(&self, addr: impl Into<Address>) -> Option<(&DataValue, Prefix)> {
        let addr = addr.into();
        let mut slot = self.root;
        for depth in 0..=ADDRESS_BITS {
            match slot {
                Slot::Empty => return None,
                Slot::Leaf(id) => {
                    let prefix = Prefix::new(addr, depth).ok()?;
                    return Some((&self.values[id as usize], prefix));
                }
                Slot::Fork(fork) => {
                    if depth == ADDRESS_BITS {
                        break;
                    }
                    slot = self.forks[fork as usize].children[addr.bit(depth) as usize];
                }
            }
        }
        None
    }

    /// Value covering the whole of `prefix`
    ///
    /// Returns `None` when part or all of the prefix is unassigned or when
    /// it is split between different values.
    pub fn get(&self, prefix: &Prefix) -> Option<&DataValue> {
        let mut slot = self.root;
        for depth in 0..prefix.len() {
            match slot {
                Slot::Fork(fork) => {
                    slot = self.forks[fork as usize].children[prefix.address().bit(depth) as usize];
                }
                _ => break,
            }
        }
        match slot {
            Slot::Leaf(id) => Some(&self.values[id as usize]),
            _ => None,
        }
    }

    /// Root node view
    pub fn root(&self) -> TrieNode<'_> {
        self.view(self.root)
    }

    /// Every assigned network with its value, in address order
    pub fn networks(&self) -> Vec<(Prefix, &DataValue)> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, 0u128, 0u8)];

        while let Some((slot, bits, depth)) = stack.pop() {
            match slot {
                Slot::Empty => {}
                Slot::Leaf(id) => {
                    if let Ok(prefix) = Prefix::new(Address::from_bits(bits), depth) {
                        out.push((prefix, &self.values[id as usize]));
                    }
                }
                Slot::Fork(fork) => {
                    let [left, right] = self.forks[fork as usize].children;
                    let one = 1u128 << (127 - depth as u32);
                    // Right first so the left branch is popped first
                    stack.push((right, bits | one, depth + 1));
                    stack.push((left, bits, depth + 1));
                }
            }
        }
        out
    }

    /// Merge sibling leaves with equal values and sibling empties
    ///
    /// Lookups are unaffected; the encoded tree gets smaller.
    pub fn compact(&mut self) {
        self.root = self.compact_slot(self.root);
    }

    /// Number of live forks
    pub fn fork_count(&self) -> usize {
        self.forks.len() - self.free.len()
    }

    /// True if nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.root == Slot::Empty
    }

    /// Replace the slot at `prefix` with `slot`, splitting leaves on the way
    pub(crate) fn replace_subtree(&mut self, prefix: Prefix, slot: Slot) {
        let mut at = Location::Root;

        for depth in 0..prefix.len() {
            let fork = match self.get_slot(at) {
                Slot::Fork(id) => id,
                Slot::Empty => {
                    let id = self.alloc([Slot::Empty, Slot::Empty]);
                    self.set_slot(at, Slot::Fork(id));
                    id
                }
                Slot::Leaf(value) => {
                    // Push the covering value down to both halves
                    let id = self.alloc([Slot::Leaf(value), Slot::Leaf(value)]);
                    self.set_slot(at, Slot::Fork(id));
                    id
                }
            };
            at = Location::Child(fork, prefix.address().bit(depth) as usize);
        }

        let old = self.get_slot(at);
        self.set_slot(at, slot);
        self.release(old);
    }

    /// Intern a value, returning the id shared by all equal values
    ///
    /// A value too large to encode gets an id of its own; encoding the trie
    /// then fails with `EncodingOverflow`.
    pub(crate) fn intern(&mut self, value: DataValue) -> ValueId {
        let key = value.to_bytes().ok();
        if let Some(&id) = key.as_ref().and_then(|k| self.value_ids.get(k)) {
            return id;
        }
        let id = self.values.len() as ValueId;
        self.values.push(value);
        if let Some(key) = key {
            self.value_ids.insert(key, id);
        }
        id
    }

    /// Allocate a fork, reusing a released index when possible
    pub(crate) fn alloc(&mut self, children: [Slot; 2]) -> ForkId {
        let fork = Fork { children };
        match self.free.pop() {
            Some(id) => {
                self.forks[id as usize] = fork;
                id
            }
            None => {
                self.forks.push(fork);
                (self.forks.len() - 1) as ForkId
            }
        }
    }

    /// Return every fork under `slot` to the free list
    fn release(&mut self, slot: Slot) {
        let mut stack = vec![slot];
        while let Some(slot) = stack.pop() {
            if let Slot::Fork(id) = slot {
                stack.extend(self.forks[id as usize].children);
                self.forks[id as usize].children = [Slot::Empty, Slot::Empty];
                self.free.push(id);
            }
        }
    }

    fn compact_slot(&mut self, slot: Slot) -> Slot {
        let id = match slot {
            Slot::Fork(id) => id,
            other => return other,
        };

        let [left, right] = self.forks[id as usize].children;
        let left = self.compact_slot(left);
        let right = self.compact_slot(right);

        match (left, right) {
            (Slot::Empty, Slot::Empty) => {
                self.free.push(id);
                Slot::Empty
            }
            (Slot::Leaf(a), Slot::Leaf(b)) if a == b => {
                self.free.push(id);
                Slot::Leaf(a)
            }
            _ => {
                self.forks[id as usize].children = [left, right];
                Slot::Fork(id)
            }
        }
    }

    fn get_slot(&self, at: Location) -> Slot {
        match at {
            Location::Root => self.root,
            Location::Child(fork, side) => self.forks[fork as usize].children[side],
        }
    }

    fn set_slot(&mut self, at: Location, slot: Slot) {
        match at {
            Location::Root => self.root = slot,
            Location::Child(fork, side) => self.forks[fork as usize].children[side] = slot,
        }
    }

    fn view(&self, slot: Slot) -> TrieNode<'_> {
        match slot {
            Slot::Empty => TrieNode::Empty,
            Slot::Leaf(id) => TrieNode::Leaf(&self.values[id as usize]),
            Slot::Fork(id) => TrieNode::Fork(ForkView { trie: self, id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn p(s: &str) -> Prefix {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn label<'a>(trie: &'a Trie, addr: &str) -> Option<&'a str> {
        trie.lookup(ip(addr)).and_then(DataValue::as_str)
    }

    #[test]
    fn test_empty_trie() {
        let trie = Trie::default();
        assert!(trie.is_empty());
        assert!(matches!(trie.root(), TrieNode::Empty));
        assert_eq!(label(&trie, "1.1.1.1"), None);
        assert_eq!(trie.fork_count(), 0);
    }

    #[test]
    fn test_insert_builds_path_of_forks() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/8"), "a");
        // 96 embedding bits + 8 prefix bits
        assert_eq!(trie.fork_count(), 104);
        assert_eq!(label(&trie, "10.200.0.1"), Some("a"));
        assert_eq!(label(&trie, "11.0.0.1"), None);
    }

    #[test]
    fn test_narrower_insert_splits_leaf() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/8"), "a");
        trie.insert(p("10.1.0.0/16"), "b");

        assert_eq!(label(&trie, "10.1.0.0"), Some("b"));
        assert_eq!(label(&trie, "10.1.255.255"), Some("b"));
        assert_eq!(label(&trie, "10.0.255.255"), Some("a"));
        assert_eq!(label(&trie, "10.2.0.0"), Some("a"));
        assert_eq!(label(&trie, "10.255.255.255"), Some("a"));
    }

    #[test]
    fn test_broader_insert_replaces_subtree() {
        let mut trie = Trie::default();
        trie.insert(p("10.1.0.0/16"), "b");
        let forks_before = trie.fork_count();
        trie.insert(p("10.0.0.0/8"), "a");

        assert_eq!(label(&trie, "10.1.2.3"), Some("a"));
        // The /16 path below the /8 was released
        assert_eq!(trie.fork_count(), forks_before - 8);
    }

    #[test]
    fn test_released_forks_are_reused() {
        let mut trie = Trie::default();
        trie.insert(p("10.1.0.0/16"), "b");
        trie.insert(p("10.0.0.0/8"), "a");
        let arena = trie.forks.len();
        trie.insert(p("10.2.0.0/16"), "c");
        assert_eq!(trie.forks.len(), arena);
    }

    #[test]
    fn test_exact_overwrite() {
        let mut trie = Trie::default();
        trie.insert(p("192.0.2.0/24"), "x");
        trie.insert(p("198.51.100.0/24"), "unrelated");
        trie.insert(p("192.0.2.0/24"), "y");
        assert_eq!(label(&trie, "192.0.2.77"), Some("y"));
        assert_eq!(label(&trie, "198.51.100.1"), Some("unrelated"));
    }

    #[test]
    fn test_lookup_prefix_reports_leaf_depth() {
        let mut trie = Trie::default();
        trie.insert(p("1.1.1.0/24"), "us");
        trie.insert(p("1.1.1.128/25"), "jp");

        let (value, prefix) = trie.lookup_prefix(ip("1.1.1.1")).unwrap();
        assert_eq!(value.as_str(), Some("us"));
        assert_eq!(prefix.to_string(), "1.1.1.0/25");

        let (value, prefix) = trie.lookup_prefix(ip("1.1.1.200")).unwrap();
        assert_eq!(value.as_str(), Some("jp"));
        assert_eq!(prefix.to_string(), "1.1.1.128/25");
    }

    #[test]
    fn test_get_whole_prefix() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/8"), "a");
        trie.insert(p("10.1.0.0/16"), "b");

        assert_eq!(trie.get(&p("10.1.2.0/24")).and_then(|v| v.as_str()), Some("b"));
        assert_eq!(trie.get(&p("10.200.0.0/16")).and_then(|v| v.as_str()), Some("a"));
        // Mixed
        assert_eq!(trie.get(&p("10.0.0.0/8")), None);
        assert_eq!(trie.get(&p("11.0.0.0/8")), None);
    }

    #[test]
    fn test_zero_length_prefix() {
        let mut trie = Trie::default();
        trie.insert(p("::/0"), "world");
        assert_eq!(label(&trie, "8.8.8.8"), Some("world"));
        assert_eq!(label(&trie, "2001:db8::1"), Some("world"));
        assert!(matches!(trie.root(), TrieNode::Leaf(_)));
    }

    #[test]
    fn test_host_route() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/8"), "a");
        trie.insert(p("10.0.0.1/32"), "host");
        assert_eq!(label(&trie, "10.0.0.1"), Some("host"));
        assert_eq!(label(&trie, "10.0.0.0"), Some("a"));
        assert_eq!(label(&trie, "10.0.0.2"), Some("a"));
    }

    #[test]
    fn test_ipv4_and_ipv6_coexist() {
        let mut trie = Trie::default();
        trie.insert(p("1.0.0.0/8"), "v4");
        trie.insert(p("2001:db8::/32"), "v6");
        trie.insert(p("::ffff:0:0/96"), "mapped");

        assert_eq!(label(&trie, "1.2.3.4"), Some("v4"));
        assert_eq!(label(&trie, "2001:db8::5"), Some("v6"));
        assert_eq!(label(&trie, "::ffff:1.2.3.4"), Some("mapped"));
    }

    #[test]
    fn test_networks_in_address_order() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/8"), "a");
        trie.insert(p("10.128.0.0/9"), "b");
        trie.insert(p("1.0.0.0/8"), "c");

        let networks: Vec<_> = trie
            .networks()
            .into_iter()
            .map(|(prefix, value)| (prefix.to_string(), value.as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            networks,
            vec![
                ("1.0.0.0/8".to_string(), "c".to_string()),
                ("10.0.0.0/9".to_string(), "a".to_string()),
                ("10.128.0.0/9".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_compact_merges_equal_siblings() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/9"), "a");
        trie.insert(p("10.128.0.0/9"), "a");
        let before = trie.fork_count();
        trie.compact();

        assert_eq!(trie.fork_count(), before - 1);
        assert_eq!(trie.get(&p("10.0.0.0/8")).and_then(|v| v.as_str()), Some("a"));
        assert_eq!(label(&trie, "10.1.1.1"), Some("a"));
        assert_eq!(label(&trie, "10.200.1.1"), Some("a"));
    }

    #[test]
    fn test_compact_keeps_distinct_values() {
        let mut trie = Trie::default();
        trie.insert(p("10.0.0.0/9"), "a");
        trie.insert(p("10.128.0.0/9"), "b");
        let before = trie.fork_count();
        trie.compact();
        assert_eq!(trie.fork_count(), before);
    }

    #[test]
    fn test_values_are_interned() {
        let mut trie = Trie::default();
        for i in 0..50u8 {
            trie.insert(p(&format!("10.{}.0.0/16", i)), "us");
        }
        assert_eq!(trie.values.len(), 1);
    }

    #[test]
    fn test_fork_view_walk() {
        let mut trie = Trie::default();
        trie.insert(p("8000::/1"), "upper");
        match trie.root() {
            TrieNode::Fork(fork) => {
                assert!(matches!(fork.left(), TrieNode::Empty));
                assert!(matches!(fork.right(), TrieNode::Leaf(v) if v.as_str() == Some("upper")));
            }
            _ => panic!("expected fork at root"),
        }
    }
}
