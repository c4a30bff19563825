//! Memo of verified token to host pairs.

use std::num::NonZeroUsize;

use blob_store::{BlobError, BlobResult};
use lru::LruCache;
use parking_lot::Mutex;

pub const DEFAULT_SIGNATURE_CACHE_CAPACITY: usize = 10_000;

/// Bounded, least-recently-used memo of successful verifications.
///
/// A miss means "unknown", never "invalid". A hit only counts when the
/// remembered host is the one being claimed.
pub struct SignatureCache {
    entries: Mutex<LruCache<String, String>>,
}

impl SignatureCache {
    pub fn new(capacity: usize) -> BlobResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| BlobError::invalid_config("signature cache capacity must be positive"))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn lookup(&self, token: &str) -> Option<String> {
        self.entries.lock().get(token).cloned()
    }

    /// Whether `token` was already verified for exactly `host`.
    pub fn is_verified(&self, token: &str, host: &str) -> bool {
        self.entries
            .lock()
            .get(token)
            .is_some_and(|cached| cached == host)
    }

    pub fn remember(&self, token: &str, host: &str) {
        self.entries.lock().put(token.to_string(), host.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_host_match() {
        let cache = SignatureCache::new(4).unwrap();
        assert_eq!(cache.lookup("tok"), None);

        cache.remember("tok", "cdn.example.com");
        assert_eq!(cache.lookup("tok").as_deref(), Some("cdn.example.com"));
        assert!(cache.is_verified("tok", "cdn.example.com"));
        assert!(!cache.is_verified("tok", "evil.example.com"));
        assert!(!cache.is_verified("other", "cdn.example.com"));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = SignatureCache::new(2).unwrap();
        cache.remember("a", "a.example.com");
        cache.remember("b", "b.example.com");
        // Touch "a" so "b" is the eviction candidate.
        assert!(cache.lookup("a").is_some());
        cache.remember("c", "c.example.com");

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("c").is_some());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(SignatureCache::new(0).is_err());
    }
}
