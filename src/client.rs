//! Client facade composing the response cache, request deduplicator, rate limiter, token
//! store, and transport.
//!
//! Every read goes cache → flight registry → rate limiter → network. Only the caller that
//! actually reaches the network consumes rate-limit budget; cache hits and callers joining a
//! shared flight do not. Writes skip the cache but are deduplicated by body, with a short hold
//! after settling so double submits collapse.

pub mod content;
pub mod health;

pub use content::*;
pub use health::*;

// self
use crate::{
	_prelude::*,
	auth::{RefreshMetrics, TokenKey, TokenRefresher},
	cache::{CacheClear, CacheKey, CacheStats, ResponseCache},
	clock::Clock,
	config::ClientConfig,
	dedupe::RequestDeduplicator,
	envelope,
	error::{self, ConfigError},
	http::{ApiRequest, ApiTransport, Method},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
	rate_limit::{RateLimitDecision, SlidingWindowLimiter},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{clock::SystemClock, http::ReqwestTransport};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Per-call overrides for [`ApiClient::get_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOptions {
	/// Read from and write to the response cache.
	pub use_cache: bool,
	/// TTL for the stored response; the configured default when `None`.
	pub ttl: Option<Duration>,
}
impl RequestOptions {
	/// Options that bypass the cache entirely.
	pub fn uncached() -> Self {
		Self { use_cache: false, ttl: None }
	}

	/// Options that cache the response for `ttl`.
	pub fn with_ttl(ttl: Duration) -> Self {
		Self { use_cache: true, ttl: Some(ttl) }
	}

	/// Flight scope for a GET issued with these options.
	fn get_scope(&self) -> String {
		match (self.use_cache, self.ttl) {
			(false, _) => format!("{} uncached", Method::Get.as_str()),
			(true, None) => Method::Get.as_str().to_owned(),
			(true, Some(ttl)) =>
				format!("{} ttl={}ms", Method::Get.as_str(), ttl.whole_milliseconds()),
		}
	}
}
impl Default for RequestOptions {
	fn default() -> Self {
		Self { use_cache: true, ttl: None }
	}
}

/// HTTP client for the unified backend.
///
/// The client owns the cache, flight registry, rate limiter, and refresher; the transport,
/// token store, clock, and config are injected. Clones share all of that state, so one client
/// value can be handed to every task that talks to the backend.
pub struct ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	store: Arc<dyn TokenStore>,
	clock: Arc<dyn Clock>,
	config: Arc<ClientConfig>,
	cache: Arc<ResponseCache>,
	flights: Arc<RequestDeduplicator<Result<Value>>>,
	limiter: Arc<SlidingWindowLimiter>,
	refresher: Arc<TokenRefresher>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client over the caller-provided transport, store, and clock.
	pub fn with_transport(
		config: ClientConfig,
		transport: impl Into<Arc<T>>,
		store: Arc<dyn TokenStore>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			cache: Arc::new(ResponseCache::new(clock.clone(), config.default_cache_ttl)),
			flights: Arc::new(RequestDeduplicator::new(clock.clone())),
			limiter: Arc::new(SlidingWindowLimiter::new(config.rate_limit, clock.clone())),
			clock,
			refresher: Default::default(),
			config: Arc::new(config),
		}
	}

	/// Active configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Token store backing bearer injection and refresh.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Transport executing every request.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Counters for the refresh flow.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.refresher.metrics()
	}

	/// Cached GET with the default TTL.
	///
	/// `params` must serialize to a JSON object (or to nothing, e.g. `()`); its fields become
	/// the query string and, in canonical form, part of the cache key.
	pub async fn get<R>(&self, endpoint: &str, params: impl Serialize) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.get_with(endpoint, params, RequestOptions::default()).await
	}

	/// GET with explicit cache options.
	///
	/// Concurrent calls share a flight only when their options match as well, so an uncached
	/// call never stands in for one that wants its response stored, and each TTL is honored.
	pub async fn get_with<R>(
		&self,
		endpoint: &str,
		params: impl Serialize,
		options: RequestOptions,
	) -> Result<R>
	where
		R: DeserializeOwned,
	{
		const KIND: RequestKind = RequestKind::Get;

		let span = RequestSpan::new(KIND, endpoint);

		obs::record_request_outcome(KIND, RequestOutcome::Attempt);

		let result = span
			.instrument(async move {
				let params = query_params(params)?;
				let key = CacheKey::new(endpoint, &params);

				let cached = if options.use_cache { self.cache.get(&key) } else { None };

				if let Some(hit) = cached {
					obs::record_request_outcome(KIND, RequestOutcome::CacheHit);
					obs::debug_event("Serving cached response.");

					return error::decode_value(hit);
				}

				let ttl = options.ttl.unwrap_or(self.config.default_cache_ttl);
				let flight_key = key.scoped(&options.get_scope());
				let (params, key) = (&params, &key);
				let value = self
					.shared_call(KIND, endpoint, &flight_key, Duration::ZERO, move || async move {
						let value = self.execute(Method::Get, endpoint, Some(params), None).await?;

						if options.use_cache {
							self.cache.set(key.clone(), value.clone(), ttl);
						}

						Ok::<_, Error>(value)
					})
					.await?;

				error::decode_value(value)
			})
			.await;

		record_result(KIND, &result);

		result
	}

	/// Deduplicated POST; never cached.
	///
	/// Identical bodies sent to the same endpoint while a call is in flight, or within the
	/// configured hold after it settles, share that call's outcome.
	pub async fn post<R>(&self, endpoint: &str, body: impl Serialize) -> Result<R>
	where
		R: DeserializeOwned,
	{
		const KIND: RequestKind = RequestKind::Post;

		let span = RequestSpan::new(KIND, endpoint);

		obs::record_request_outcome(KIND, RequestOutcome::Attempt);

		let result = span
			.instrument(async move {
				let body = serde_json::to_value(body).map_err(ConfigError::from)?;
				let key = CacheKey::new(endpoint, &body).scoped(Method::Post.as_str());
				let body = &body;
				let value = self
					.shared_call(KIND, endpoint, &key, self.config.post_dedupe_hold, move || {
						self.execute(Method::Post, endpoint, None, Some(body))
					})
					.await?;

				error::decode_value(value)
			})
			.await;

		record_result(KIND, &result);

		result
	}

	/// Drops every cached response, or those whose endpoint contains the pattern.
	pub fn clear_cache(&self, which: CacheClear) -> usize {
		let removed = self.cache.clear(&which);

		obs::debug_event("Cleared cached responses.");

		removed
	}

	/// Cache counters plus the number of live flights.
	pub fn cache_stats(&self) -> CacheStats {
		CacheStats { in_flight: self.flights.in_flight(), ..self.cache.stats() }
	}

	/// Runs `call` under the flight registered for `key`, admitting it through the rate
	/// limiter only when this caller is the one reaching the network.
	async fn shared_call<F, Fut>(
		&self,
		kind: RequestKind,
		endpoint: &str,
		key: &str,
		hold: Duration,
		call: F,
	) -> Result<Value>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Value>>,
	{
		let flight = self
			.flights
			.dedupe(key, hold, Result::is_ok, || async move {
				self.admit(kind, endpoint)?;

				call().await
			})
			.await;

		if flight.shared {
			obs::record_request_outcome(kind, RequestOutcome::Shared);
			obs::debug_event("Joined an in-flight request.");
		}

		flight.value
	}

	fn admit(&self, kind: RequestKind, endpoint: &str) -> Result<()> {
		match self.limiter.check(endpoint) {
			RateLimitDecision::Allow => Ok(()),
			RateLimitDecision::Delay(directive) => {
				obs::record_request_outcome(kind, RequestOutcome::RateLimited);
				obs::debug_event("Rate limit reached; rejecting before the network call.");

				Err(Error::RateLimited { endpoint: endpoint.to_owned(), directive })
			},
		}
	}

	/// Sends one request with the stored bearer token and classifies the response.
	async fn execute(
		&self,
		method: Method,
		endpoint: &str,
		params: Option<&Value>,
		body: Option<&Value>,
	) -> Result<Value> {
		let mut url = self.config.resolve(endpoint)?;

		if let Some(params) = params {
			append_query(&mut url, params);
		}

		let bearer = self.store.load(TokenKey::Access).await?;
		let mut request = ApiRequest::new(method, endpoint, url).with_bearer(bearer.clone());

		if let Some(body) = body {
			request = request.with_json_body(serde_json::to_vec(body).map_err(ConfigError::from)?);
		}

		let response = self.transport.send(request).await?;

		if response.status == 401 {
			let session = self
				.refresher
				.refresh(self.transport.as_ref(), self.store.as_ref(), &self.config, bearer.as_ref())
				.await;

			return Err(Error::AuthExpired { session });
		}
		if !response.is_success() {
			return Err(Error::Http {
				status: response.status,
				message: envelope::error_message(&response.body),
				retry_after: response.retry_after,
			});
		}

		Ok(response.json(endpoint)?)
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client over a reqwest transport bounded by the configured timeout, reading
	/// time from the system clock.
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let transport = ReqwestTransport::new(config.request_timeout)?;

		Ok(Self::with_transport(config, transport, store, Arc::new(SystemClock)))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			clock: self.clock.clone(),
			config: self.config.clone(),
			cache: self.cache.clone(),
			flights: self.flights.clone(),
			limiter: self.limiter.clone(),
			refresher: self.refresher.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("cache", &self.cache)
			.field("flights", &self.flights)
			.field("limiter", &self.limiter)
			.finish()
	}
}

fn record_result<R>(kind: RequestKind, result: &Result<R>) {
	match result {
		Ok(_) => obs::record_request_outcome(kind, RequestOutcome::Success),
		Err(e) => {
			obs::record_request_outcome(kind, RequestOutcome::Failure);
			obs::warn_event("Request failed.", e);
		},
	}
}

/// Normalizes query params to a JSON object; `null` (from `()` or `None`) means no params.
fn query_params(params: impl Serialize) -> Result<Value> {
	match serde_json::to_value(params).map_err(ConfigError::from)? {
		Value::Null => Ok(Value::Object(Default::default())),
		params @ Value::Object(_) => Ok(params),
		_ => Err(ConfigError::InvalidParams.into()),
	}
}

fn append_query(url: &mut Url, params: &Value) {
	let Value::Object(params) = params else {
		return;
	};
	let pairs = params
		.iter()
		.filter_map(|(name, value)| match value {
			Value::Null => None,
			Value::String(text) => Some((name.as_str(), text.clone())),
			other => Some((name.as_str(), other.to_string())),
		})
		.collect::<Vec<_>>();

	if !pairs.is_empty() {
		url.query_pairs_mut().extend_pairs(pairs);
	}
}
