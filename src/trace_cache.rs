//! Completed traces, persisted per content hash.
//!
//! Cache entries live as `<hash>.json` files (a JSON array of trace
//! elements) inside a process-managed temporary directory that is removed
//! when the cache is dropped. The key is a digest of the file *content*, so
//! a relocated or renamed-but-unchanged file still hits the cache. There is
//! no eviction: entries persist for the lifetime of the session.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::warn;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::errors::CacheError;
use crate::types::Trace;

/// Computes the cache key for a target file's exact content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut res = String::with_capacity(digest.len() * 2);
    for byte in digest {
        res.push_str(&format!("{byte:02x}"));
    }
    res
}

#[derive(Debug)]
pub struct TraceCache {
    cache_dir: TempDir,
    cached: HashSet<String>,
}

impl TraceCache {
    pub fn new() -> io::Result<Self> {
        let cache_dir = tempfile::Builder::new().prefix("flow-replay").tempdir()?;
        Ok(Self {
            cache_dir,
            cached: HashSet::new(),
        })
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.path().join(format!("{hash}.json"))
    }

    /// Returns `true` if a completed trace was stored for this hash.
    pub fn exists(&self, hash: &str) -> bool {
        self.cached.contains(hash)
    }

    /// Loads the stored trace for `hash`; fails if it was never stored.
    pub fn load(&self, hash: &str) -> Result<Trace, CacheError> {
        if !self.cached.contains(hash) {
            return Err(CacheError::Missing {
                hash: hash.to_string(),
            });
        }
        let content = fs::read_to_string(self.entry_path(hash))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persists a completed trace under `hash`.
    ///
    /// Must be called at most once per hash — only after a run completes
    /// normally. A repeated store for the same hash is a caller bug; it is
    /// refused, leaving the first entry intact.
    pub fn store(&mut self, hash: &str, trace: &Trace) -> Result<(), CacheError> {
        if self.cached.contains(hash) {
            warn!("trace for hash {hash} is already cached, refusing to overwrite");
            return Ok(());
        }
        let json = serde_json::to_string(trace)?;
        fs::write(self.entry_path(hash), json)?;
        self.cached.insert(hash.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraceElement;
    use pretty_assertions::{assert_eq, assert_ne};
    use serde_json::json;

    fn sample_trace(lines: &[i64]) -> Trace {
        lines
            .iter()
            .map(|line| {
                serde_json::from_value::<TraceElement>(json!({
                    "line": line,
                    "filePath": "/work/example.py",
                    "stack": [{"frameName": "<module>", "locals": []}],
                    "heap": {},
                    "stdout": format!("line {line}\n"),
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_content_hash_is_stable_and_content_keyed() {
        let a = content_hash("x = 1\n");
        let b = content_hash("x = 1\n");
        let c = content_hash("x = 2\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_store_then_load_round_trips() {
        let mut cache = TraceCache::new().unwrap();
        let trace = sample_trace(&[1, 2, 3, 4, 5]);
        let hash = content_hash("abc123 source");

        assert!(!cache.exists(&hash));
        cache.store(&hash, &trace).unwrap();
        assert!(cache.exists(&hash));

        let loaded = cache.load(&hash).unwrap();
        assert_eq!(loaded, trace);
    }

    #[test]
    fn test_load_missing_hash_fails() {
        let cache = TraceCache::new().unwrap();
        let result = cache.load("deadbeef");
        assert!(matches!(result, Err(CacheError::Missing { .. })));
    }

    #[test]
    fn test_repeated_store_is_refused() {
        let mut cache = TraceCache::new().unwrap();
        let hash = content_hash("source");
        let first = sample_trace(&[1, 2]);
        let second = sample_trace(&[9]);

        cache.store(&hash, &first).unwrap();
        cache.store(&hash, &second).unwrap();

        // The first entry survives.
        assert_eq!(cache.load(&hash).unwrap(), first);
    }

    #[test]
    fn test_cache_dir_removed_on_drop() {
        let cache = TraceCache::new().unwrap();
        let dir = cache.cache_dir.path().to_path_buf();
        assert!(dir.exists());
        drop(cache);
        assert!(!dir.exists());
    }
}
