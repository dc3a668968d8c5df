//! Client-level error types shared by the cache, deduplicator, rate limiter, and transport.
//!
//! Every variant is `Clone` because a single deduplicated network call hands its outcome to
//! all waiting callers; foreign sources are kept behind `Arc`.

// self
use crate::{_prelude::*, auth::SessionState, rate_limit::RetryDirective};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Token store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request-shape problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// The sliding window for the endpoint is full; no network call was made.
	#[error("Rate limit exceeded for `{endpoint}`; retry after {}ms.", .directive.recommended_backoff.whole_milliseconds())]
	RateLimited {
		/// Endpoint whose budget was exhausted.
		endpoint: String,
		/// When the caller may retry.
		directive: RetryDirective,
	},
	/// Backend answered with a non-success status other than 401.
	#[error("Backend returned HTTP {status}: {message}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Envelope error string or a preview of the response body.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Backend rejected the bearer token; the refresh flow already ran.
	#[error("Access token was rejected ({session}); re-issue the request.")]
	AuthExpired {
		/// Session state after the refresh attempt.
		session: SessionState,
	},
}
impl Error {
	/// Returns `true` when waiting and retrying may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::RateLimited { .. } | Self::Transport(_) => true,
			Self::Http { status, .. } => *status == 429 || *status >= 500,
			Self::AuthExpired { session } => matches!(session, SessionState::Refreshed),
			_ => false,
		}
	}

	/// Returns the retry hint carried by the error, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { directive, .. } => Some(directive.recommended_backoff),
			Self::Http { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and request-shape failures raised by the client.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL must use HTTPS unless it points at a loopback host.
	#[error("The base URL must use HTTPS: {url}.")]
	InsecureBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint cannot be joined onto the base URL.
	#[error("Endpoint `{endpoint}` cannot be resolved against the base URL.")]
	InvalidEndpoint {
		/// Offending endpoint path.
		endpoint: String,
	},
	/// Rate limit settings are unusable.
	#[error("Rate limit must allow at least one request over a positive window.")]
	InvalidRateLimit,
	/// A duration setting is zero or negative.
	#[error("The {setting} duration must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		setting: &'static str,
	},
	/// A 401 arrived but no refresh token is stored.
	#[error("No refresh token is stored.")]
	MissingRefreshToken,
	/// Query params must serialize to a JSON object (or nothing).
	#[error("Query params must serialize to a JSON object.")]
	InvalidParams,
	/// Request payload could not be serialized.
	#[error("Request payload could not be serialized: {message}.")]
	Serialize {
		/// Serializer message.
		message: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
impl From<serde_json::Error> for ConfigError {
	fn from(e: serde_json::Error) -> Self {
		Self::Serialize { message: e.to_string() }
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{endpoint}`.")]
	Network {
		/// Endpoint being called.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Request exceeded the configured timeout.
	#[error("Request to `{endpoint}` timed out.")]
	Timeout {
		/// Endpoint being called.
		endpoint: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + StdError,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}

/// Response decoding failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// Body was not valid JSON.
	#[error("Response from `{endpoint}` is not valid JSON: {message}.")]
	Json {
		/// Endpoint that produced the body.
		endpoint: String,
		/// Parser message.
		message: String,
	},
	/// Body was JSON but did not match the requested type.
	#[error("Response field `{path}` does not match the expected shape: {message}.")]
	Shape {
		/// Path to the failing field (`.` for the root).
		path: String,
		/// Deserializer message.
		message: String,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for DecodeError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Shape { path: e.path().to_string(), message: e.inner().to_string() }
	}
}

/// Decodes a JSON value into `T`, reporting the failing field path.
pub(crate) fn decode_value<T>(value: Value) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|e| Error::from(DecodeError::from(e)))
}
