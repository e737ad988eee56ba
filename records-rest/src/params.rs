//! Query string parameters
//!
//! Keys may repeat; bracket suffixes are folded into the key so that
//! `filter[1]` and `filter1` address the same parameter.

use std::collections::BTreeMap;

/// Multi-valued query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (percent-encoded) query string
    #[must_use]
    pub fn parse(query_string: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
            params.add(&key, value.into_owned());
        }
        params
    }

    /// Append a value under `key`
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.params
            .entry(normalize_key(key))
            .or_default()
            .push(value.into());
    }

    /// Replace all values under `key`
    pub fn set(&mut self, key: &str, values: Vec<String>) {
        self.params.insert(normalize_key(key), values);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.params.remove(&normalize_key(key))
    }

    /// All values under `key`, in order of appearance
    #[must_use]
    pub fn get(&self, key: &str) -> &[String] {
        self.params.get(key).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Comma separated items of the first value under `key`
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.first(key)
            .map(|value| value.split(',').filter(|item| !item.is_empty()).collect())
            .unwrap_or_default()
    }
}

fn normalize_key(key: &str) -> String {
    key.chars().filter(|c| !matches!(c, '[' | ']')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_keys() {
        let params = QueryParams::parse("order=id,desc&order=name&page=2");
        assert_eq!(params.get("order"), &["id,desc", "name"]);
        assert_eq!(params.first("page"), Some("2"));
        assert!(params.get("missing").is_empty());
    }

    #[test]
    fn test_bracket_keys_are_folded() {
        let params = QueryParams::parse("filter%5B%5D=id,eq,1&filter[2]=id,eq,2&join[]=users");
        assert_eq!(params.get("filter"), &["id,eq,1"]);
        assert_eq!(params.get("filter2"), &["id,eq,2"]);
        assert_eq!(params.get("join"), &["users"]);
    }

    #[test]
    fn test_percent_decoding() {
        let params = QueryParams::parse("filter=content,cs,hello%20world%2C%20again");
        assert_eq!(params.get("filter"), &["content,cs,hello world, again"]);
    }

    #[test]
    fn test_list() {
        let mut params = QueryParams::new();
        params.add("include", "id,,name");
        assert_eq!(params.list("include"), vec!["id", "name"]);
        params.set("include", vec![]);
        assert!(params.list("include").is_empty());
        assert!(params.remove("include").is_some());
        assert!(!params.contains("include"));
    }
}
