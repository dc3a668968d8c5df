//! Per-endpoint sliding-window rate limiting applied before outbound calls.
//!
//! The limiter keeps the timestamps of accepted calls for each endpoint and rejects a call once
//! the trailing window already holds `max_requests` of them. This is a sliding-window counter,
//! not a token bucket: it self-throttles the client but only approximates the nominal rate.
//!
//! The window is `(now - window, now]`: a call accepted exactly `window` ago no longer counts,
//! which is also the instant [`RetryDirective::earliest_retry_at`] points at.

// self
use crate::{_prelude::*, clock::Clock, error::ConfigError};

/// Limits applied to every endpoint independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
	/// Accepted calls allowed inside one window.
	pub max_requests: usize,
	/// Trailing window length.
	pub window: Duration,
}
impl RateLimitConfig {
	/// Creates a config allowing `max_requests` per `window`.
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self { max_requests, window }
	}

	pub(crate) fn validate(&self) -> Result<(), ConfigError> {
		if self.max_requests == 0 || !self.window.is_positive() {
			Err(ConfigError::InvalidRateLimit)
		} else {
			Ok(())
		}
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { max_requests: 60, window: Duration::seconds(60) }
	}
}

/// Result emitted by [`SlidingWindowLimiter::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately; it has been recorded.
	Allow,
	/// The window is full; nothing was recorded.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDirective {
	/// Instant when the oldest accepted call leaves the window.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration measured from the rejected attempt.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Sliding-window counter keyed by endpoint.
pub struct SlidingWindowLimiter {
	config: RateLimitConfig,
	clock: Arc<dyn Clock>,
	windows: Mutex<HashMap<String, VecDeque<OffsetDateTime>>>,
}
impl SlidingWindowLimiter {
	/// Creates a limiter reading time from `clock`.
	pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
		Self { config, clock, windows: Default::default() }
	}

	/// Returns the active limits.
	pub fn config(&self) -> RateLimitConfig {
		self.config
	}

	/// Records and accepts the call when the window has room; returns `false` otherwise.
	pub fn allow(&self, endpoint: &str) -> bool {
		self.check(endpoint).is_allowed()
	}

	/// Prunes expired calls, then records the call or explains when to retry.
	///
	/// Endpoints left without a counted call are forgotten.
	pub fn check(&self, endpoint: &str) -> RateLimitDecision {
		let now = self.clock.now();
		let horizon = now - self.config.window;
		let mut windows = self.windows.lock();

		windows.retain(|_, window| {
			while window.front().is_some_and(|accepted| *accepted <= horizon) {
				window.pop_front();
			}

			!window.is_empty()
		});

		let window = windows.entry(endpoint.to_owned()).or_default();

		if window.len() < self.config.max_requests {
			window.push_back(now);

			return RateLimitDecision::Allow;
		}

		// A full window is never empty because `max_requests` is at least one.
		let oldest = window.front().copied().unwrap_or(now);
		let earliest_retry_at = oldest + self.config.window;

		RateLimitDecision::Delay(
			RetryDirective::new(earliest_retry_at, earliest_retry_at - now).with_reason(format!(
				"{} requests already accepted within the last {}s",
				window.len(),
				self.config.window.whole_seconds()
			)),
		)
	}

	/// Number of calls currently counted for `endpoint` (without pruning).
	///
	/// Zero once the endpoint has been forgotten.
	pub fn recorded(&self, endpoint: &str) -> usize {
		self.windows.lock().get(endpoint).map_or(0, VecDeque::len)
	}

	/// Number of endpoints with at least one counted call as of the last check.
	pub fn tracked_endpoints(&self) -> usize {
		self.windows.lock().len()
	}

	/// Forgets every recorded call.
	pub fn reset(&self) {
		self.windows.lock().clear();
	}
}
impl Debug for SlidingWindowLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SlidingWindowLimiter")
			.field("config", &self.config)
			.field("endpoints", &self.windows.lock().len())
			.finish()
	}
}
