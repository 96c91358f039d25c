//! Case-insensitive header map.

use std::collections::HashMap;
use std::collections::hash_map;

/// Header name/value mapping with case-insensitive keys.
///
/// Keys are stored lowercased; lookups accept any casing. Repeated names fold
/// by list-append: values are joined with `", "` in arrival order, per the
/// HTTP list-field rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: HashMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header value, folding into an existing value for the same
    /// (case-insensitive) name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let key = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.entries.entry(key) {
            hash_map::Entry::Occupied(mut slot) => {
                let folded = slot.get_mut();
                folded.push_str(", ");
                folded.push_str(&value);
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(lowercased-name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn repeated_names_fold_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", "text/html");
        headers.insert("accept", "application/json");

        assert_eq!(headers.get("Accept"), Some("text/html, application/json"));
        assert_eq!(headers.len(), 1);
    }
}
