//! Client configuration and its validating builder.

// crates.io
use url::Host;
// self
use crate::{_prelude::*, error::ConfigError, rate_limit::RateLimitConfig};

/// Immutable settings consumed by [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Backend origin (and optional path prefix) every endpoint is resolved against.
	pub base_url: Url,
	/// Upper bound for a single transport call.
	pub request_timeout: Duration,
	/// TTL for cached GET responses.
	pub default_cache_ttl: Duration,
	/// TTL for cached content-generation results.
	pub content_ttl: Duration,
	/// How long a settled POST keeps absorbing identical submits.
	pub post_dedupe_hold: Duration,
	/// Per-endpoint sliding-window limits.
	pub rate_limit: RateLimitConfig,
	/// Endpoint exchanging a refresh token for a new access token.
	pub refresh_endpoint: String,
	/// Endpoint generating content from a prompt.
	pub content_endpoint: String,
	/// Liveness endpoint probed by `health_check`.
	pub health_endpoint: String,
}
impl ClientConfig {
	/// Default transport timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);
	/// Default GET cache TTL.
	pub const DEFAULT_CACHE_TTL: Duration = Duration::minutes(5);
	/// Default content-generation cache TTL.
	pub const DEFAULT_CONTENT_TTL: Duration = Duration::hours(1);
	/// Default POST hold window.
	pub const DEFAULT_POST_DEDUPE_HOLD: Duration = Duration::seconds(1);

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Parses `base_url` and builds a config with every other setting at its default.
	pub fn from_base_url(base_url: &str) -> Result<Self, ConfigError> {
		let base_url =
			Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

		Self::builder(base_url).build()
	}

	/// Resolves an endpoint path (`/api/...`) against the base URL, keeping any path prefix.
	pub fn resolve(&self, endpoint: &str) -> Result<Url, ConfigError> {
		if !endpoint.starts_with('/') || endpoint.contains(['?', '#']) {
			return Err(ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned() });
		}

		let mut url = self.base_url.clone();
		let path = format!("{}{endpoint}", self.base_url.path().trim_end_matches('/'));

		url.set_path(&path);
		url.set_query(None);
		url.set_fragment(None);

		Ok(url)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.base_url.cannot_be_a_base() {
			return Err(ConfigError::InsecureBaseUrl { url: self.base_url.to_string() });
		}
		if self.base_url.scheme() != "https" && !is_loopback(&self.base_url) {
			return Err(ConfigError::InsecureBaseUrl { url: self.base_url.to_string() });
		}

		for (setting, value) in [
			("request_timeout", self.request_timeout),
			("default_cache_ttl", self.default_cache_ttl),
			("content_ttl", self.content_ttl),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveDuration { setting });
			}
		}

		if self.post_dedupe_hold.is_negative() {
			return Err(ConfigError::NonPositiveDuration { setting: "post_dedupe_hold" });
		}

		self.rate_limit.validate()?;

		for endpoint in [&self.refresh_endpoint, &self.content_endpoint, &self.health_endpoint] {
			self.resolve(endpoint)?;
		}

		Ok(())
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			config: ClientConfig {
				base_url,
				request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
				default_cache_ttl: ClientConfig::DEFAULT_CACHE_TTL,
				content_ttl: ClientConfig::DEFAULT_CONTENT_TTL,
				post_dedupe_hold: ClientConfig::DEFAULT_POST_DEDUPE_HOLD,
				rate_limit: RateLimitConfig::default(),
				refresh_endpoint: "/api/auth/refresh".into(),
				content_endpoint: "/api/content/generate".into(),
				health_endpoint: "/health".into(),
			},
		}
	}

	/// Overrides the transport timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;

		self
	}

	/// Overrides the GET cache TTL.
	pub fn default_cache_ttl(mut self, ttl: Duration) -> Self {
		self.config.default_cache_ttl = ttl;

		self
	}

	/// Overrides the content-generation cache TTL.
	pub fn content_ttl(mut self, ttl: Duration) -> Self {
		self.config.content_ttl = ttl;

		self
	}

	/// Overrides the POST hold window; zero disables holding.
	pub fn post_dedupe_hold(mut self, hold: Duration) -> Self {
		self.config.post_dedupe_hold = hold;

		self
	}

	/// Overrides the per-endpoint rate limit.
	pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.config.rate_limit = rate_limit;

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.refresh_endpoint = endpoint.into();

		self
	}

	/// Overrides the content-generation endpoint path.
	pub fn content_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.content_endpoint = endpoint.into();

		self
	}

	/// Overrides the health endpoint path.
	pub fn health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.config.health_endpoint = endpoint.into();

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		self.config.validate()?;

		Ok(self.config)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse config fixture URL.")
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = ClientConfig::from_base_url("https://api.example.com")
			.expect("Default config should build.");

		assert_eq!(config.request_timeout, Duration::seconds(30));
		assert_eq!(config.content_ttl, Duration::hours(1));
		assert_eq!(config.post_dedupe_hold, Duration::seconds(1));
		assert_eq!(config.rate_limit.max_requests, 60);
		assert_eq!(config.rate_limit.window, Duration::seconds(60));
	}

	#[test]
	fn plain_http_is_only_allowed_for_loopback() {
		let err = ClientConfig::builder(url("http://api.example.com"))
			.build()
			.expect_err("Remote plain-HTTP base URLs should be rejected.");

		assert!(matches!(err, ConfigError::InsecureBaseUrl { .. }));
		assert!(ClientConfig::builder(url("http://127.0.0.1:8080")).build().is_ok());
		assert!(ClientConfig::builder(url("http://localhost:3000")).build().is_ok());
	}

	#[test]
	fn resolve_keeps_base_path_prefix() {
		let config = ClientConfig::builder(url("https://api.example.com/v2/"))
			.build()
			.expect("Prefixed base URL should build.");

		assert_eq!(
			config.resolve("/api/groups").expect("Endpoint should resolve.").as_str(),
			"https://api.example.com/v2/api/groups"
		);
		assert!(matches!(
			config.resolve("api/groups"),
			Err(ConfigError::InvalidEndpoint { .. })
		));
		assert!(matches!(
			config.resolve("/api/groups?page=2"),
			Err(ConfigError::InvalidEndpoint { .. })
		));
	}

	#[test]
	fn invalid_durations_and_limits_are_rejected() {
		let err = ClientConfig::builder(url("https://api.example.com"))
			.request_timeout(Duration::ZERO)
			.build()
			.expect_err("A zero timeout should be rejected.");

		assert!(matches!(err, ConfigError::NonPositiveDuration { setting: "request_timeout" }));

		let err = ClientConfig::builder(url("https://api.example.com"))
			.rate_limit(RateLimitConfig::new(0, Duration::seconds(60)))
			.build()
			.expect_err("A zero request budget should be rejected.");

		assert!(matches!(err, ConfigError::InvalidRateLimit));
		assert!(
			ClientConfig::builder(url("https://api.example.com"))
				.post_dedupe_hold(Duration::ZERO)
				.build()
				.is_ok()
		);
	}
}
