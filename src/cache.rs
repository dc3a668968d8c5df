//! TTL response cache keyed by endpoint plus canonicalized parameters.
//!
//! Entries expire lazily: a read at or after `expires_at` evicts the entry and reports a miss.
//! The cache is unbounded (no size cap, no LRU), which suits a client with modest request
//! variety; call [`ResponseCache::purge_expired`] to sweep stale entries explicitly.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, clock::Clock};

/// Deterministic identity of a logical request.
///
/// The fingerprint is a base64 (no padding) SHA-256 digest of the canonical JSON form of the
/// parameters, so `{a:1,b:2}` and `{b:2,a:1}` collide to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Endpoint path the key belongs to.
	pub endpoint: String,
	/// Digest of the canonical parameters.
	pub fingerprint: String,
}
impl CacheKey {
	/// Builds a key for `endpoint` with the given parameters (`Value::Null` for none).
	pub fn new(endpoint: impl Into<String>, params: &Value) -> Self {
		Self { endpoint: endpoint.into(), fingerprint: fingerprint(params) }
	}

	/// Prefixes the key with a method label, yielding a deduplication key.
	pub fn scoped(&self, scope: &str) -> String {
		format!("{scope} {self}")
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}#{}", self.endpoint, self.fingerprint)
	}
}

/// Serializes `value` as JSON with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
	let mut buf = String::new();

	write_canonical(value, &mut buf);

	buf
}

fn write_canonical(value: &Value, buf: &mut String) {
	match value {
		Value::Object(map) => {
			let mut entries = map.iter().collect::<Vec<_>>();

			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			buf.push('{');

			for (idx, (key, inner)) in entries.into_iter().enumerate() {
				if idx > 0 {
					buf.push(',');
				}

				buf.push_str(&Value::String(key.clone()).to_string());
				buf.push(':');
				write_canonical(inner, buf);
			}

			buf.push('}');
		},
		Value::Array(items) => {
			buf.push('[');

			for (idx, inner) in items.iter().enumerate() {
				if idx > 0 {
					buf.push(',');
				}

				write_canonical(inner, buf);
			}

			buf.push(']');
		},
		scalar => buf.push_str(&scalar.to_string()),
	}
}

/// Stable digest of the canonical JSON form of `value`.
pub fn fingerprint(value: &Value) -> String {
	let digest = Sha256::digest(canonical_json(value).as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}

/// Which entries [`ResponseCache::clear`] removes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheClear {
	/// Every entry.
	All,
	/// Entries whose endpoint contains the pattern.
	Matching(String),
}
impl CacheClear {
	/// Convenience constructor for [`CacheClear::Matching`].
	pub fn matching(pattern: impl Into<String>) -> Self {
		Self::Matching(pattern.into())
	}
}

/// Snapshot returned by [`ResponseCache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	/// Entries currently stored, including ones not yet lazily evicted.
	pub entries: usize,
	/// Reads that returned a live value.
	pub hits: u64,
	/// Reads that found nothing or an expired value.
	pub misses: u64,
	/// Entries removed on expiry or by [`ResponseCache::clear`].
	pub evictions: u64,
	/// Deduplicated requests currently in flight or held.
	pub in_flight: usize,
}
impl CacheStats {
	/// Fraction of reads served from the cache.
	pub fn hit_ratio(&self) -> f64 {
		let total = self.hits + self.misses;

		if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
	}
}

#[derive(Clone, Debug)]
struct CacheEntry {
	data: Value,
	expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct CacheCounters {
	hits: AtomicU64,
	misses: AtomicU64,
	evictions: AtomicU64,
}

/// Key → (value, expiry) map with lazy TTL eviction.
pub struct ResponseCache {
	clock: Arc<dyn Clock>,
	default_ttl: Duration,
	entries: RwLock<HashMap<CacheKey, CacheEntry>>,
	counters: CacheCounters,
}
impl ResponseCache {
	/// Creates an empty cache whose [`insert`](Self::insert) uses `default_ttl`.
	pub fn new(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
		Self { clock, default_ttl, entries: Default::default(), counters: Default::default() }
	}

	/// Returns the live value for `key`, evicting it if it has expired.
	pub fn get(&self, key: &CacheKey) -> Option<Value> {
		let now = self.clock.now();
		let expired = match self.entries.read().get(key) {
			Some(entry) if now < entry.expires_at => {
				self.counters.hits.fetch_add(1, Ordering::Relaxed);

				return Some(entry.data.clone());
			},
			Some(_) => true,
			None => false,
		};

		if expired {
			let mut entries = self.entries.write();

			// Re-check under the write lock; a concurrent `set` may have refreshed it.
			if entries.get(key).is_some_and(|entry| now >= entry.expires_at) {
				entries.remove(key);
				self.counters.evictions.fetch_add(1, Ordering::Relaxed);
			}
		}

		self.counters.misses.fetch_add(1, Ordering::Relaxed);

		None
	}

	/// Stores `data` under `key` for `ttl`, replacing any previous entry.
	pub fn set(&self, key: CacheKey, data: Value, ttl: Duration) {
		let expires_at = self.clock.now() + ttl;

		self.entries.write().insert(key, CacheEntry { data, expires_at });
	}

	/// Stores `data` with the default TTL.
	pub fn insert(&self, key: CacheKey, data: Value) {
		self.set(key, data, self.default_ttl);
	}

	/// Removes every entry or those whose endpoint matches; returns how many were removed.
	pub fn clear(&self, which: &CacheClear) -> usize {
		let mut entries = self.entries.write();
		let before = entries.len();

		match which {
			CacheClear::All => entries.clear(),
			CacheClear::Matching(pattern) =>
				entries.retain(|key, _| !key.endpoint.contains(pattern.as_str())),
		}

		let removed = before - entries.len();

		self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);

		removed
	}

	/// Drops every expired entry; returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| now < entry.expires_at);

		let removed = before - entries.len();

		self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);

		removed
	}

	/// Number of stored entries (expired ones included until they are read or purged).
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Default TTL used by [`insert`](Self::insert).
	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	/// Snapshot of entry count and hit/miss/eviction counters.
	pub fn stats(&self) -> CacheStats {
		CacheStats {
			entries: self.len(),
			hits: self.counters.hits.load(Ordering::Relaxed),
			misses: self.counters.misses.load(Ordering::Relaxed),
			evictions: self.counters.evictions.load(Ordering::Relaxed),
			in_flight: 0,
		}
	}
}
impl Debug for ResponseCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseCache")
			.field("default_ttl", &self.default_ttl)
			.field("entries", &self.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::clock::ManualClock;

	fn cache() -> (ResponseCache, ManualClock) {
		let clock = ManualClock::default();
		let cache = ResponseCache::new(Arc::new(clock.clone()), Duration::minutes(5));

		(cache, clock)
	}

	#[test]
	fn entries_expire_after_ttl() {
		let (cache, clock) = cache();
		let key = CacheKey::new("/api/feed", &Value::Null);

		cache.set(key.clone(), json!({ "posts": [1, 2] }), Duration::milliseconds(100));

		assert_eq!(cache.get(&key), Some(json!({ "posts": [1, 2] })));

		clock.advance(Duration::milliseconds(150));

		assert_eq!(cache.get(&key), None);
		assert!(cache.is_empty());

		let stats = cache.stats();

		assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
	}

	#[test]
	fn entry_is_dead_exactly_at_expiry() {
		let (cache, clock) = cache();
		let key = CacheKey::new("/api/feed", &Value::Null);

		cache.set(key.clone(), json!(1), Duration::seconds(1));
		clock.advance(Duration::seconds(1));

		assert_eq!(cache.get(&key), None);
	}

	#[test]
	fn key_ignores_param_order() {
		let (cache, _clock) = cache();
		let written = CacheKey::new("/x", &json!({ "b": 2, "a": 1 }));
		let read = CacheKey::new("/x", &json!({ "a": 1, "b": 2 }));

		cache.insert(written, json!("hit"));

		assert_eq!(read, CacheKey::new("/x", &json!({ "a": 1, "b": 2 })));
		assert_eq!(cache.get(&read), Some(json!("hit")));
	}

	#[test]
	fn canonical_json_sorts_nested_objects() {
		let value = json!({ "z": { "y": 1, "x": [ { "b": true, "a": null } ] }, "a": "s\"q" });

		assert_eq!(canonical_json(&value), r#"{"a":"s\"q","z":{"x":[{"a":null,"b":true}],"y":1}}"#);
	}

	#[test]
	fn distinct_params_produce_distinct_keys() {
		let first = CacheKey::new("/x", &json!({ "a": 1 }));
		let second = CacheKey::new("/x", &json!({ "a": 2 }));

		assert_ne!(first, second);
		assert_ne!(first.scoped("GET"), first.scoped("POST"));
	}

	#[test]
	fn clear_by_pattern_keeps_other_endpoints() {
		let (cache, _clock) = cache();

		cache.insert(CacheKey::new("/api/groups", &json!({ "page": 1 })), json!([]));
		cache.insert(CacheKey::new("/api/groups/7", &Value::Null), json!({}));
		cache.insert(CacheKey::new("/api/events", &Value::Null), json!([]));

		assert_eq!(cache.clear(&CacheClear::matching("groups")), 2);
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.clear(&CacheClear::All), 1);
		assert!(cache.is_empty());
	}

	#[test]
	fn purge_expired_sweeps_only_stale_entries() {
		let (cache, clock) = cache();

		cache.set(CacheKey::new("/short", &Value::Null), json!(1), Duration::seconds(1));
		cache.set(CacheKey::new("/long", &Value::Null), json!(2), Duration::hours(1));
		clock.advance(Duration::seconds(2));

		assert_eq!(cache.purge_expired(), 1);
		assert_eq!(cache.get(&CacheKey::new("/long", &Value::Null)), Some(json!(2)));
	}
}
