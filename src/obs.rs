//! Optional observability helpers for client operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `unified_api_client.request` with the `kind`
//!   (operation) and `endpoint` fields, plus events for cache hits, shared flights, rate-limit
//!   rejections, and refresh failures.
//! - Enable `metrics` to increment the `unified_api_client_request_total` counter for every
//!   outcome, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Client operations observed by the instrumentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// `ApiClient::get`.
	Get,
	/// `ApiClient::post`.
	Post,
	/// `ApiClient::generate_content`.
	GenerateContent,
	/// Token refresh after a 401.
	Refresh,
	/// `ApiClient::health_check`.
	Health,
}
impl RequestKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestKind::Get => "get",
			RequestKind::Post => "post",
			RequestKind::GenerateContent => "generate_content",
			RequestKind::Refresh => "refresh",
			RequestKind::Health => "health",
		}
	}
}
impl Display for RequestKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// Entry to a client operation.
	Attempt,
	/// Served from the response cache.
	CacheHit,
	/// Joined another caller's in-flight request.
	Shared,
	/// Rejected by the rate limiter before reaching the network.
	RateLimited,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl RequestOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestOutcome::Attempt => "attempt",
			RequestOutcome::CacheHit => "cache_hit",
			RequestOutcome::Shared => "shared",
			RequestOutcome::RateLimited => "rate_limited",
			RequestOutcome::Success => "success",
			RequestOutcome::Failure => "failure",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
