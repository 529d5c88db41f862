use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Cache key for an extraction: the subject plus the requested fields,
/// order-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject: String,
    pub fields: Vec<String>,
}

impl CacheKey {
    pub fn new<S: AsRef<str>>(subject: &str, fields: &[S]) -> Self {
        let mut fields: Vec<String> = fields
            .iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .collect();
        fields.sort();
        fields.dedup();
        Self {
            subject: subject.trim().to_string(),
            fields,
        }
    }
}

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Short-lived cache for extraction results.
///
/// Entries expire a fixed time after they were stored. Expiry is decided
/// when an entry is read; nothing sweeps in the background.
pub struct ExtractionCache<V> {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
}

impl<V: Clone> ExtractionCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Look up `key` as of `now`. Expired entries are dropped on the way.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = match entries.get(key) {
            Some(entry) => now.signed_duration_since(entry.stored_at) < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(key).map(|e| e.value.clone())
        } else {
            debug!(subject = %key.subject, "Cache entry expired");
            entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    pub fn insert_at(&self, key: CacheKey, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            Entry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_field_order_and_case() {
        assert_eq!(
            CacheKey::new("client-1", &["Weight", "sleep"]),
            CacheKey::new("client-1", &["sleep", "weight", "weight"])
        );
        assert_ne!(
            CacheKey::new("client-1", &["weight"]),
            CacheKey::new("client-2", &["weight"])
        );
    }

    #[test]
    fn test_entry_expires_at_read_time() {
        let cache = ExtractionCache::new(Duration::from_secs(30 * 60));
        let key = CacheKey::new("client-1", &["weight"]);
        let t0 = Utc::now();
        cache.insert_at(key.clone(), "81.5".to_string(), t0);

        let within = t0 + chrono::Duration::minutes(29);
        assert_eq!(cache.get_at(&key, within).as_deref(), Some("81.5"));
        assert_eq!(cache.len(), 1);

        let after = t0 + chrono::Duration::minutes(30);
        assert_eq!(cache.get_at(&key, after), None);
        assert!(cache.is_empty());
    }
}
