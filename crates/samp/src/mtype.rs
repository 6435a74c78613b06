// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MType identifiers, subscription patterns, and the matching trie.
//!
//! An MType is a dotted identifier (`table.load.votable`). Subscription
//! patterns add two wildcard forms: a trailing `.*` on a dotted prefix
//! (`table.*`) and the bare `*`. When several of one client's patterns match
//! a given MType, the most specific pattern's configuration wins.

use crate::error::HubError;
use crate::value::{SampMap, SampValue};
use std::collections::HashMap;

fn atom_ok(atom: &str) -> bool {
    !atom.is_empty()
        && atom
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A concrete MType: one or more dotted atoms, no wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MType {
    atoms: Vec<String>,
}

impl MType {
    /// Parse and validate a concrete MType.
    pub fn parse(text: &str) -> Result<Self, HubError> {
        let atoms: Vec<String> = text.split('.').map(str::to_string).collect();
        if atoms.iter().any(|a| !atom_ok(a)) {
            return Err(HubError::malformed(
                format!("invalid MType {:?}", text),
                "",
            ));
        }
        Ok(Self { atoms })
    }

    pub fn as_atoms(&self) -> &[String] {
        &self.atoms
    }
}

impl std::fmt::Display for MType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.atoms.join("."))
    }
}

/// A subscription pattern: a concrete MType, a dotted prefix followed by
/// `.*`, or the bare `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MTypePattern {
    prefix: Vec<String>,
    wildcard: bool,
}

impl MTypePattern {
    /// Parse and validate a pattern.
    pub fn parse(text: &str) -> Result<Self, HubError> {
        if text == "*" {
            return Ok(Self {
                prefix: Vec::new(),
                wildcard: true,
            });
        }
        if let Some(stem) = text.strip_suffix(".*") {
            let prefix: Vec<String> = stem.split('.').map(str::to_string).collect();
            if prefix.iter().any(|a| !atom_ok(a)) {
                return Err(HubError::malformed(
                    format!("invalid subscription pattern {:?}", text),
                    "",
                ));
            }
            return Ok(Self {
                prefix,
                wildcard: true,
            });
        }
        let mtype = MType::parse(text)?;
        Ok(Self {
            prefix: mtype.atoms,
            wildcard: false,
        })
    }

    /// Does this pattern match the given MType?
    pub fn matches(&self, mtype: &MType) -> bool {
        if self.wildcard {
            mtype.atoms.len() >= self.prefix.len() && mtype.atoms[..self.prefix.len()] == self.prefix[..]
        } else {
            mtype.atoms == self.prefix
        }
    }

    /// Specificity rank: exact patterns outrank every wildcard; longer
    /// wildcard prefixes outrank shorter ones.
    fn specificity(&self) -> usize {
        if self.wildcard {
            self.prefix.len()
        } else {
            usize::MAX
        }
    }
}

impl std::fmt::Display for MTypePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.wildcard {
            return f.write_str(&self.prefix.join("."));
        }
        if self.prefix.is_empty() {
            f.write_str("*")
        } else {
            write!(f, "{}.*", self.prefix.join("."))
        }
    }
}

/// A client's declared subscriptions: pattern -> config mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subscriptions {
    entries: Vec<(MTypePattern, SampMap)>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire form: a mapping MType-pattern -> config mapping.
    pub fn from_value(value: &SampValue) -> Result<Self, HubError> {
        let map = value
            .as_map()
            .ok_or_else(|| HubError::malformed("subscriptions must be a mapping", ""))?;
        let mut subs = Self::new();
        for (key, config) in map.iter() {
            let pattern = MTypePattern::parse(key)?;
            let config = match config {
                SampValue::Map(m) => m.clone(),
                // Non-map configs are tolerated as empty.
                _ => SampMap::new(),
            };
            subs.insert(pattern, config);
        }
        Ok(subs)
    }

    /// Render the wire form.
    pub fn to_value(&self) -> SampValue {
        let mut map = SampMap::new();
        for (pattern, config) in &self.entries {
            map.insert(pattern.to_string(), SampValue::Map(config.clone()));
        }
        SampValue::Map(map)
    }

    pub fn insert(&mut self, pattern: MTypePattern, config: SampMap) {
        if let Some(slot) = self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            slot.1 = config;
        } else {
            self.entries.push((pattern, config));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MTypePattern, &SampMap)> {
        self.entries.iter().map(|(p, c)| (p, c))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The config of the most specific pattern matching `mtype`, if any.
    pub fn best_match(&self, mtype: &MType) -> Option<&SampMap> {
        self.entries
            .iter()
            .filter(|(p, _)| p.matches(mtype))
            .max_by_key(|(p, _)| p.specificity())
            .map(|(_, c)| c)
    }
}

/// Subscription index over all clients: a trie of MType atoms.
///
/// Each node records, per client, the config of a pattern terminating there.
/// Exact patterns terminate at a leaf node; wildcard patterns terminate at
/// the node of their prefix (the bare `*` at the root). Lookup walks the
/// MType's atoms once, so it is O(atoms).
#[derive(Debug)]
pub struct SubscriptionTrie<C: Clone + Eq + std::hash::Hash> {
    root: TrieNode<C>,
}

#[derive(Debug)]
struct TrieNode<C> {
    children: HashMap<String, TrieNode<C>>,
    /// Clients with an exact pattern ending at this node.
    exact: HashMap<C, SampMap>,
    /// Clients with a wildcard pattern whose prefix ends at this node.
    wildcard: HashMap<C, SampMap>,
}

impl<C> Default for TrieNode<C> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            exact: HashMap::new(),
            wildcard: HashMap::new(),
        }
    }
}

impl<C: Clone + Eq + std::hash::Hash> SubscriptionTrie<C> {
    pub fn new() -> Self {
        Self {
            root: TrieNode::default(),
        }
    }

    /// Replace a client's subscriptions wholesale.
    pub fn set_subscriptions(&mut self, client: &C, subs: &Subscriptions) {
        self.remove_client(client);
        for (pattern, config) in subs.iter() {
            let node = pattern
                .prefix
                .iter()
                .fold(&mut self.root, |node, atom| {
                    node.children.entry(atom.clone()).or_default()
                });
            if pattern.wildcard {
                node.wildcard.insert(client.clone(), config.clone());
            } else {
                node.exact.insert(client.clone(), config.clone());
            }
        }
    }

    /// Remove every pattern belonging to a client.
    pub fn remove_client(&mut self, client: &C) {
        Self::remove_from(&mut self.root, client);
    }

    fn remove_from(node: &mut TrieNode<C>, client: &C) {
        node.exact.remove(client);
        node.wildcard.remove(client);
        node.children
            .retain(|_, child| {
                Self::remove_from(child, client);
                !(child.children.is_empty() && child.exact.is_empty() && child.wildcard.is_empty())
            });
    }

    /// All clients subscribed to `mtype`, each with the config of its most
    /// specific matching pattern.
    pub fn subscribers(&self, mtype: &MType) -> HashMap<C, SampMap> {
        // (specificity, config) per client; higher specificity shadows lower.
        let mut found: HashMap<C, (usize, SampMap)> = HashMap::new();
        let mut collect = |bucket: &HashMap<C, SampMap>, rank: usize| {
            for (client, config) in bucket {
                let slot = found.entry(client.clone()).or_insert((rank, config.clone()));
                if rank >= slot.0 {
                    *slot = (rank, config.clone());
                }
            }
        };

        let mut node = &self.root;
        collect(&node.wildcard, 0);
        let atoms = mtype.as_atoms();
        for (depth, atom) in atoms.iter().enumerate() {
            match node.children.get(atom) {
                Some(child) => {
                    node = child;
                    collect(&node.wildcard, depth + 1);
                    if depth + 1 == atoms.len() {
                        collect(&node.exact, usize::MAX);
                    }
                }
                None => break,
            }
        }

        found.into_iter().map(|(c, (_, cfg))| (c, cfg)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(patterns: &[&str]) -> Subscriptions {
        let mut s = Subscriptions::new();
        for p in patterns {
            s.insert(MTypePattern::parse(p).unwrap(), SampMap::new());
        }
        s
    }

    #[test]
    fn test_mtype_parse() {
        assert!(MType::parse("samp.hub.event.shutdown").is_ok());
        assert!(MType::parse("a").is_ok());
        assert!(MType::parse("").is_err());
        assert!(MType::parse("a..b").is_err());
        assert!(MType::parse("a.b c").is_err());
        assert!(MType::parse("a.*").is_err());
    }

    #[test]
    fn test_pattern_parse() {
        assert!(MTypePattern::parse("*").is_ok());
        assert!(MTypePattern::parse("table.*").is_ok());
        assert!(MTypePattern::parse("table.load.votable").is_ok());
        assert!(MTypePattern::parse("table.*.votable").is_err());
        assert!(MTypePattern::parse(".*").is_err());
        assert!(MTypePattern::parse("**").is_err());
    }

    #[test]
    fn test_pattern_matching() {
        let m = MType::parse("test.a.b").unwrap();
        assert!(MTypePattern::parse("*").unwrap().matches(&m));
        assert!(MTypePattern::parse("test.*").unwrap().matches(&m));
        assert!(MTypePattern::parse("test.a.*").unwrap().matches(&m));
        assert!(MTypePattern::parse("test.a.b").unwrap().matches(&m));
        assert!(!MTypePattern::parse("test.a.b.*").unwrap().matches(&m));
        assert!(!MTypePattern::parse("other.*").unwrap().matches(&m));
        assert!(!MTypePattern::parse("test.a").unwrap().matches(&m));
    }

    #[test]
    fn test_subscriptions_wire_round_trip() {
        let mut map = SampMap::new();
        map.insert("test.ping", SampValue::Map(SampMap::new()));
        map.insert("test.*", SampValue::Map(SampMap::new()));
        let subs = Subscriptions::from_value(&SampValue::Map(map.clone())).unwrap();
        assert_eq!(subs.to_value(), SampValue::Map(map));
    }

    #[test]
    fn test_subscriptions_reject_bad_pattern() {
        let mut map = SampMap::new();
        map.insert("not a pattern", SampValue::Map(SampMap::new()));
        assert!(Subscriptions::from_value(&SampValue::Map(map)).is_err());
    }

    #[test]
    fn test_trie_exact_and_wildcard_union() {
        let mut trie = SubscriptionTrie::new();
        trie.set_subscriptions(&"x", &subs(&["test.ping"]));
        trie.set_subscriptions(&"y", &subs(&["test.*"]));
        trie.set_subscriptions(&"z", &subs(&["*"]));
        trie.set_subscriptions(&"w", &subs(&["other.thing"]));

        let hits = trie.subscribers(&MType::parse("test.ping").unwrap());
        let mut ids: Vec<_> = hits.keys().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, ["x", "y", "z"]);
    }

    #[test]
    fn test_trie_most_specific_config_wins() {
        let mut broad = SampMap::new();
        broad.insert("which", SampValue::string("broad"));
        let mut narrow = SampMap::new();
        narrow.insert("which", SampValue::string("narrow"));

        let mut s = Subscriptions::new();
        s.insert(MTypePattern::parse("*").unwrap(), broad);
        s.insert(MTypePattern::parse("test.a.*").unwrap(), narrow);

        let mut trie = SubscriptionTrie::new();
        trie.set_subscriptions(&"c", &s);

        let hits = trie.subscribers(&MType::parse("test.a.b").unwrap());
        assert_eq!(hits[&"c"].get_str("which"), Some("narrow"));

        // Outside the narrow prefix the broad config applies.
        let hits = trie.subscribers(&MType::parse("other.x").unwrap());
        assert_eq!(hits[&"c"].get_str("which"), Some("broad"));
    }

    #[test]
    fn test_trie_exact_outranks_wildcard() {
        let mut wild = SampMap::new();
        wild.insert("which", SampValue::string("wild"));
        let mut exact = SampMap::new();
        exact.insert("which", SampValue::string("exact"));

        let mut s = Subscriptions::new();
        s.insert(MTypePattern::parse("test.*").unwrap(), wild);
        s.insert(MTypePattern::parse("test.ping").unwrap(), exact);

        let mut trie = SubscriptionTrie::new();
        trie.set_subscriptions(&"c", &s);

        let hits = trie.subscribers(&MType::parse("test.ping").unwrap());
        assert_eq!(hits[&"c"].get_str("which"), Some("exact"));
    }

    #[test]
    fn test_trie_replace_and_remove() {
        let mut trie = SubscriptionTrie::new();
        trie.set_subscriptions(&"c", &subs(&["a.b", "a.*"]));
        assert_eq!(trie.subscribers(&MType::parse("a.b").unwrap()).len(), 1);

        trie.set_subscriptions(&"c", &subs(&["other.thing"]));
        assert!(trie.subscribers(&MType::parse("a.b").unwrap()).is_empty());

        trie.remove_client(&"c");
        assert!(trie
            .subscribers(&MType::parse("other.thing").unwrap())
            .is_empty());
    }

    #[test]
    fn test_best_match_on_subscriptions() {
        let mut narrow = SampMap::new();
        narrow.insert("k", SampValue::string("n"));
        let mut s = Subscriptions::new();
        s.insert(MTypePattern::parse("*").unwrap(), SampMap::new());
        s.insert(MTypePattern::parse("test.*").unwrap(), narrow);

        let got = s.best_match(&MType::parse("test.x").unwrap()).unwrap();
        assert_eq!(got.get_str("k"), Some("n"));
        assert!(s.best_match(&MType::parse("zzz").unwrap()).is_some());
    }
}
