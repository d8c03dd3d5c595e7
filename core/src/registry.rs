//! Case-insensitive, insertion-ordered URL registries for miners and validators.
//!
//! Grounded on the source's `RegisterMiner`/`RegisterValidator`: lower-case the URL, look it up
//! in a map, and if it's new, append it to an ordered list so the index can be recovered later.
//! Indices are dense, never reused, never retracted.

use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct UrlRegistry {
    by_url: HashMap<String, u64>,
    by_index: Vec<String>,
}

impl UrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `url`, returning its index. Idempotent: registering the same URL twice (after
    /// lower-casing) returns the same index both times.
    pub fn register(&mut self, url: &str) -> Result<u64> {
        url::Url::parse(url).map_err(|_| Error::InvalidTokenUrl(url.to_string()))?;
        let key = url.to_lowercase();

        if let Some(&idx) = self.by_url.get(&key) {
            return Ok(idx);
        }

        let idx = self.by_index.len() as u64;
        self.by_index.push(key.clone());
        self.by_url.insert(key, idx);
        Ok(idx)
    }

    pub fn url_for(&self, index: u64) -> Option<&str> {
        self.by_index.get(index as usize).map(String::as_str)
    }

    pub fn contains_index(&self, index: u64) -> bool {
        (index as usize) < self.by_index.len()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let mut reg = UrlRegistry::new();
        let a = reg.register("https://Example.com/Wallet").unwrap();
        let b = reg.register("https://example.com/wallet").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn indices_are_dense_and_ordered() {
        let mut reg = UrlRegistry::new();
        let a = reg.register("https://miner-a.example/").unwrap();
        let b = reg.register("https://miner-b.example/").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(reg.url_for(0), Some("https://miner-a.example/"));
        assert_eq!(reg.url_for(1), Some("https://miner-b.example/"));
    }

    #[test]
    fn rejects_malformed_url() {
        let mut reg = UrlRegistry::new();
        assert!(reg.register("not a url").is_err());
    }
}
