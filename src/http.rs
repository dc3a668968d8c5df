//! Transport primitives for backend calls.
//!
//! [`ApiTransport`] is the client's only dependency on an HTTP stack. The client resolves the
//! URL, serializes the JSON body, and attaches the bearer token before handing an
//! [`ApiRequest`] over; the transport returns the raw [`ApiResponse`] with its status and
//! `Retry-After` hint so the client can classify failures itself. Non-2xx statuses are
//! responses, not transport errors.

// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{DecodeError, TransportError},
};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing JSON requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back every clone of
/// the client, and the returned future must be `Send` so callers can drive it from any
/// executor thread.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the response, whatever its status.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods the client issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	/// Idempotent read; cacheable.
	Get,
	/// Mutating call; deduplicated, never cached.
	Post,
}
impl Method {
	/// Returns the canonical upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Endpoint path as supplied by the caller, used for logging and errors.
	pub endpoint: String,
	/// Absolute URL including the query string.
	pub url: Url,
	/// Bearer token to attach, if the store holds one.
	pub bearer: Option<TokenSecret>,
	/// Serialized JSON body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a body-less request.
	pub fn new(method: Method, endpoint: impl Into<String>, url: Url) -> Self {
		Self { method, endpoint: endpoint.into(), url, bearer: None, body: None }
	}

	/// Attaches a bearer token.
	pub fn with_bearer(mut self, bearer: Option<TokenSecret>) -> Self {
		self.bearer = bearer;

		self
	}

	/// Attaches a serialized JSON body.
	pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
		self.body = Some(body);

		self
	}
}

/// Raw response captured by the transport.
///
/// Additional metadata fields may be added in future releases, so downstream code should
/// construct values using field names instead of struct update syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ApiResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into(), retry_after: None }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Parses the body as JSON; an empty body decodes as `null`.
	pub fn json(&self, endpoint: &str) -> Result<Value, DecodeError> {
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return Ok(Value::Null);
		}

		serde_json::from_slice(&self.body)
			.map_err(|e| DecodeError::Json { endpoint: endpoint.to_owned(), message: e.to_string() })
	}
}

/// Default transport backed by a shared [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client whose every request is bounded by `timeout`.
	pub fn new(timeout: Duration) -> Result<Self, crate::error::ConfigError> {
		let timeout = std::time::Duration::try_from(timeout).map_err(|_| {
			crate::error::ConfigError::NonPositiveDuration { setting: "request_timeout" }
		})?;
		let client = ReqwestClient::builder().timeout(timeout).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn map_error(endpoint: &str, e: ReqwestError) -> TransportError {
		if e.is_timeout() {
			TransportError::Timeout { endpoint: endpoint.to_owned() }
		} else {
			TransportError::network(endpoint, e)
		}
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let ApiRequest { method, endpoint, url, bearer, body } = request;
			let mut builder = match method {
				Method::Get => client.get(url),
				Method::Post => client.post(url),
			}
			.header(ACCEPT, "application/json");

			if let Some(bearer) = bearer {
				builder = builder.header(AUTHORIZATION, bearer.bearer());
			}
			if let Some(body) = body {
				builder = builder.header(CONTENT_TYPE, "application/json").body(body);
			}

			let response =
				builder.send().await.map_err(|e| Self::map_error(&endpoint, e))?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body =
				response.bytes().await.map_err(|e| Self::map_error(&endpoint, e))?.to_vec();

			Ok(ApiResponse { status, body, retry_after })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
