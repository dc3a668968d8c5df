//! Content generation on top of the cache and flight machinery.
//!
//! Generation calls are expensive, so results are cached for the longer content TTL and keyed
//! by what was asked for (prompt, platform, tone) rather than by when.

// self
use crate::{
	_prelude::*,
	cache::CacheKey,
	client::{ApiClient, record_result},
	error::{self, ConfigError},
	http::{ApiTransport, Method},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
};

/// Prompt submitted to the content endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRequest {
	/// What to write about.
	pub prompt: String,
	/// Target platform, e.g. `ig` or `x`.
	pub platform: String,
	/// Desired voice, e.g. `casual`.
	pub tone: String,
}
impl ContentRequest {
	/// Creates a request from its three fields.
	pub fn new(
		prompt: impl Into<String>,
		platform: impl Into<String>,
		tone: impl Into<String>,
	) -> Self {
		Self { prompt: prompt.into(), platform: platform.into(), tone: tone.into() }
	}
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Generates content for `request`, reusing a cached or in-flight result for the same
	/// prompt, platform, and tone.
	pub async fn generate_content<R>(&self, request: &ContentRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		const KIND: RequestKind = RequestKind::GenerateContent;

		let endpoint = self.config.content_endpoint.as_str();
		let span = RequestSpan::new(KIND, endpoint);

		obs::record_request_outcome(KIND, RequestOutcome::Attempt);

		let result = span
			.instrument(async move {
				let body = serde_json::to_value(request).map_err(ConfigError::from)?;
				let key = CacheKey::new(endpoint, &body);

				if let Some(hit) = self.cache.get(&key) {
					obs::record_request_outcome(KIND, RequestOutcome::CacheHit);
					obs::debug_event("Serving cached generated content.");

					return error::decode_value(hit);
				}

				let flight_key = key.scoped(Method::Post.as_str());
				let ttl = self.config.content_ttl;
				let (body, key) = (&body, &key);
				let value = self
					.shared_call(
						KIND,
						endpoint,
						&flight_key,
						self.config.post_dedupe_hold,
						move || async move {
							let value =
								self.execute(Method::Post, endpoint, None, Some(body)).await?;

							self.cache.set(key.clone(), value.clone(), ttl);

							Ok::<_, Error>(value)
						},
					)
					.await?;

				error::decode_value(value)
			})
			.await;

		record_result(KIND, &result);

		result
	}
}
