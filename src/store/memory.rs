//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenKey, TokenSecret},
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<TokenKey, TokenSecret>>>;

/// Storage backend that keeps tokens in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Creates a store pre-seeded with an access token and optional refresh token.
	pub fn with_tokens(access: impl Into<TokenSecret>, refresh: Option<TokenSecret>) -> Self {
		let store = Self::default();

		{
			let mut map = store.0.write();

			map.insert(TokenKey::Access, access.into());

			if let Some(refresh) = refresh {
				map.insert(TokenKey::Refresh, refresh);
			}
		}

		store
	}

	/// Synchronous peek used by tests and diagnostics.
	pub fn snapshot(&self, key: TokenKey) -> Option<TokenSecret> {
		self.0.read().get(&key).cloned()
	}

	fn cas_now(
		map: StoreMap,
		key: TokenKey,
		expected: Option<&str>,
		replacement: TokenSecret,
	) -> CompareAndSwapOutcome {
		let mut guard = map.write();

		if super::secret_matches(guard.get(&key), expected) {
			guard.insert(key, replacement);

			CompareAndSwapOutcome::Updated
		} else {
			CompareAndSwapOutcome::Mismatch
		}
	}
}
impl TokenStore for MemoryStore {
	fn load(&self, key: TokenKey) -> StoreFuture<'_, Option<TokenSecret>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn save(&self, key: TokenKey, secret: TokenSecret) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key, secret);

			Ok::<_, StoreError>(())
		})
	}

	fn remove(&self, key: TokenKey) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(&key);

			Ok(())
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: TokenKey,
		expected: Option<&'a str>,
		replacement: TokenSecret,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::cas_now(map, key, expected, replacement)) })
	}
}
