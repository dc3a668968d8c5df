//! Token store contract and built-in implementations.
//!
//! The client reads the access token before every request and only the refresh flow mutates
//! tokens, so the contract is a tiny key-value surface over [`TokenKey`].

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenKey, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persisted key-value storage for the access and refresh tokens.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the secret stored under `key`, if present.
	fn load(&self, key: TokenKey) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists or replaces the secret stored under `key`.
	fn save(&self, key: TokenKey, secret: TokenSecret) -> StoreFuture<'_, ()>;

	/// Removes the secret stored under `key`; missing keys are not an error.
	fn remove(&self, key: TokenKey) -> StoreFuture<'_, ()>;

	/// Atomically replaces `key` if its current value matches `expected`.
	fn compare_and_swap<'a>(
		&'a self,
		key: TokenKey,
		expected: Option<&'a str>,
		replacement: TokenSecret,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes both tokens (logical logout).
	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			for key in TokenKey::ALL {
				self.remove(key).await?;
			}

			Ok(())
		})
	}
}

/// Result of a [`TokenStore::compare_and_swap`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored value matched the expected value and was replaced.
	Updated,
	/// The stored value differed from the expected value; nothing changed.
	Mismatch,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

fn secret_matches(current: Option<&TokenSecret>, expected: Option<&str>) -> bool {
	match (current.map(TokenSecret::expose), expected) {
		(None, None) => true,
		(Some(cur), Some(exp)) => cur == exp,
		_ => false,
	}
}
