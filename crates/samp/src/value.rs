// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SAMP value model.
//!
//! A SAMP value is a recursive tree of strings, lists, and mappings. Scalars
//! travel as strings by convention: integers in decimal, floats in a decimal
//! form excluding infinities and NaN, booleans as `"0"`/`"1"`. The JSON
//! surface mirrors the same discipline: double-quoted strings only, never
//! bare numbers, booleans, or nulls.

use crate::error::HubError;
use std::fmt;

/// Characters permitted in a SAMP string: TAB, LF, CR, and 0x20..=0x7F.
fn char_ok(c: char) -> bool {
    matches!(c, '\u{09}' | '\u{0A}' | '\u{0D}') || ('\u{20}'..='\u{7F}').contains(&c)
}

/// A SAMP value: string, list, or mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampValue {
    Str(String),
    List(Vec<SampValue>),
    Map(SampMap),
}

impl SampValue {
    /// Convenience constructor for the string variant.
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Encode an integer in SAMP scalar form.
    pub fn from_int(i: i64) -> Self {
        Self::Str(i.to_string())
    }

    /// Encode a boolean in SAMP scalar form (`"0"` / `"1"`).
    pub fn from_bool(b: bool) -> Self {
        Self::Str(if b { "1" } else { "0" }.into())
    }

    /// Encode a float in SAMP scalar form. Fails on NaN and infinities.
    pub fn from_float(f: f64) -> Result<Self, HubError> {
        if !f.is_finite() {
            return Err(HubError::malformed("non-finite float", ""));
        }
        Ok(Self::Str(format!("{}", f)))
    }

    /// Decode a SAMP integer scalar.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decode a SAMP boolean scalar (`"0"` / `"1"`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Str(s) => match s.trim() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            },
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The mapping payload, if this is a map.
    pub fn as_map(&self) -> Option<&SampMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The list payload, if this is a list.
    pub fn as_list(&self) -> Option<&[SampValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Depth-first validation. Checks string charsets at every leaf and key.
    ///
    /// The error path is a `/`-joined trail of map keys and list indices
    /// from the root to the offending node.
    pub fn validate(&self) -> Result<(), HubError> {
        self.validate_at("")
    }

    fn validate_at(&self, path: &str) -> Result<(), HubError> {
        match self {
            Self::Str(s) => {
                if let Some(c) = s.chars().find(|c| !char_ok(*c)) {
                    return Err(HubError::malformed(
                        format!("character {:?} outside SAMP charset", c),
                        path,
                    ));
                }
                Ok(())
            }
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.validate_at(&format!("{}/{}", path, i))?;
                }
                Ok(())
            }
            Self::Map(map) => {
                for (key, val) in map.iter() {
                    if let Some(c) = key.chars().find(|c| !char_ok(*c)) {
                        return Err(HubError::malformed(
                            format!("character {:?} outside SAMP charset in key", c),
                            format!("{}/{}", path, key),
                        ));
                    }
                    val.validate_at(&format!("{}/{}", path, key))?;
                }
                Ok(())
            }
        }
    }

    /// Deterministic multiline rendering for diagnostics. Not round-trippable.
    pub fn format_pretty(&self, indent: usize) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, indent);
        out
    }

    fn pretty_into(&self, out: &mut String, level: usize) {
        let pad = "  ".repeat(level);
        match self {
            Self::Str(s) => {
                out.push_str(&pad);
                out.push_str(s);
                out.push('\n');
            }
            Self::List(items) => {
                out.push_str(&pad);
                out.push_str("[\n");
                for item in items {
                    item.pretty_into(out, level + 1);
                }
                out.push_str(&pad);
                out.push_str("]\n");
            }
            Self::Map(map) => {
                out.push_str(&pad);
                out.push_str("{\n");
                for (key, val) in map.iter() {
                    match val {
                        Self::Str(s) => {
                            out.push_str(&"  ".repeat(level + 1));
                            out.push_str(key);
                            out.push_str(": ");
                            out.push_str(s);
                            out.push('\n');
                        }
                        _ => {
                            out.push_str(&"  ".repeat(level + 1));
                            out.push_str(key);
                            out.push_str(":\n");
                            val.pretty_into(out, level + 2);
                        }
                    }
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
        }
    }

    /// Render as JSON text. Strings-only discipline: every leaf is a
    /// double-quoted JSON string.
    pub fn to_json(&self, multiline: bool) -> String {
        let json = self.to_json_value();
        if multiline {
            serde_json::to_string_pretty(&json).expect("JSON encoding of string tree")
        } else {
            serde_json::to_string(&json).expect("JSON encoding of string tree")
        }
    }

    fn to_json_value(&self) -> serde_json::Value {
        match self {
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json_value).collect())
            }
            Self::Map(map) => {
                let mut obj = serde_json::Map::new();
                for (key, val) in map.iter() {
                    obj.insert(key.clone(), val.to_json_value());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Parse JSON text into a SAMP value. Bare numbers, booleans, and nulls
    /// are rejected, so `from_json` composed with [`SampValue::to_json`] is
    /// the identity on validated values.
    pub fn from_json(text: &str) -> Result<Self, HubError> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| HubError::malformed(format!("invalid JSON: {}", e), ""))?;
        Self::from_json_value(&json, "")
    }

    fn from_json_value(json: &serde_json::Value, path: &str) -> Result<Self, HubError> {
        match json {
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    list.push(Self::from_json_value(item, &format!("{}/{}", path, i))?);
                }
                Ok(Self::List(list))
            }
            serde_json::Value::Object(obj) => {
                let mut map = SampMap::new();
                for (key, val) in obj {
                    map.insert(
                        key.clone(),
                        Self::from_json_value(val, &format!("{}/{}", path, key))?,
                    );
                }
                Ok(Self::Map(map))
            }
            serde_json::Value::Null => Err(HubError::malformed("null is not a SAMP value", path)),
            serde_json::Value::Bool(_) => Err(HubError::malformed(
                "bare boolean is not a SAMP value (use \"0\"/\"1\")",
                path,
            )),
            serde_json::Value::Number(_) => Err(HubError::malformed(
                "bare number is not a SAMP value (encode as string)",
                path,
            )),
        }
    }
}

impl From<&str> for SampValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for SampValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<SampMap> for SampValue {
    fn from(m: SampMap) -> Self {
        Self::Map(m)
    }
}

impl From<Vec<SampValue>> for SampValue {
    fn from(l: Vec<SampValue>) -> Self {
        Self::List(l)
    }
}

/// A string-keyed mapping with insertion order preserved.
///
/// Backed by a vector of pairs; SAMP mappings are small (metadata,
/// subscriptions, message params) so linear key lookup is fine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SampMap {
    entries: Vec<(String, SampValue)>,
}

impl SampMap {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Replacement keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: SampValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&SampValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a key expecting a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SampValue::as_str)
    }

    /// Look up a key expecting a mapping value.
    pub fn get_map(&self, key: &str) -> Option<&SampMap> {
        self.get(key).and_then(SampValue::as_map)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<SampValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SampValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }
}

impl FromIterator<(String, SampValue)> for SampMap {
    fn from_iter<T: IntoIterator<Item = (String, SampValue)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for SampMap {
    type Item = (String, SampValue);
    type IntoIter = std::vec::IntoIter<(String, SampValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for SampValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json(false))
    }
}
